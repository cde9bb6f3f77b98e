use serde_json::{Map, Value};

use crate::types::InstanceInfo;

/// Flatten an observed instance into the mapping returned to the caller.
/// An instance that does not exist yields an empty mapping.
pub fn serialize(observed: Option<&InstanceInfo>) -> Map<String, Value> {
    let mut map = Map::new();
    let Some(info) = observed else {
        return map;
    };

    map.insert("name".into(), Value::from(info.name.as_str()));
    map.insert("state".into(), Value::from(info.state.as_str()));
    map.insert(
        "ipaddresses".into(),
        Value::from(info.ipaddresses.clone()),
    );
    map.insert("cpus".into(), Value::from(info.details.cpus));
    map.insert("memory".into(), Value::from(info.details.memory));
    map.insert("disk".into(), Value::from(info.details.disk));
    map
}
