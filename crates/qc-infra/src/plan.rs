//! Desired-state resolution.
//!
//! Turns what the caller asked for and what the controller reports into the
//! set of lifecycle actions for one pass. Actions always run in the order
//! create, start, stop, delete.

use serde::Serialize;

use crate::types::{DesiredState, InstanceInfo, ObservedState};

/// Actions to perform for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub create: bool,
    pub start: bool,
    pub stop: bool,
    pub delete: bool,
    /// Reported on success whether or not anything had to change.
    pub message: &'static str,
}

impl Plan {
    fn noop(message: &'static str) -> Self {
        Self {
            create: false,
            start: false,
            stop: false,
            delete: false,
            message,
        }
    }

    pub fn is_noop(&self) -> bool {
        !(self.create || self.start || self.stop || self.delete)
    }

    /// Names of the planned actions in execution order.
    pub fn actions(&self) -> Vec<&'static str> {
        [
            (self.create, "create"),
            (self.start, "start"),
            (self.stop, "stop"),
            (self.delete, "delete"),
        ]
        .into_iter()
        .filter_map(|(planned, name)| planned.then_some(name))
        .collect()
    }
}

pub fn message_for(desired: DesiredState) -> &'static str {
    match desired {
        DesiredState::Present => "VM successfully created",
        DesiredState::Running => "VM successfully started",
        DesiredState::Stopped => "VM successfully stopped",
        DesiredState::Absent => "VM successfully deleted",
    }
}

/// Compute the plan that moves `observed` to `desired`.
///
/// `observed` is `None` when the controller has no record of the instance.
pub fn resolve(desired: DesiredState, observed: Option<&InstanceInfo>) -> Plan {
    let mut plan = Plan::noop(message_for(desired));
    let state = observed.map(|info| &info.state);

    match (desired, state) {
        (DesiredState::Present, None) => plan.create = true,
        (DesiredState::Present, Some(_)) => {}

        (DesiredState::Running, None) => {
            plan.create = true;
            plan.start = true;
        }
        (DesiredState::Running, Some(state)) => plan.start = *state != ObservedState::Running,

        (DesiredState::Stopped, None) => {}
        (DesiredState::Stopped, Some(state)) => plan.stop = *state != ObservedState::Stopped,

        (DesiredState::Absent, None) => {}
        (DesiredState::Absent, Some(state)) => {
            plan.stop = *state != ObservedState::Stopped;
            plan.delete = true;
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hardware;

    fn observed(state: ObservedState) -> InstanceInfo {
        InstanceInfo {
            name: "vm1".into(),
            state,
            ipaddresses: vec![],
            details: Hardware::default(),
        }
    }

    fn all_observations() -> Vec<Option<InstanceInfo>> {
        let mut out = vec![None];
        out.extend(
            [
                ObservedState::Unspecified,
                ObservedState::Created,
                ObservedState::Starting,
                ObservedState::Running,
                ObservedState::Stopping,
                ObservedState::Stopped,
                ObservedState::Failed,
                ObservedState::Other("STATE_PAUSED".into()),
            ]
            .into_iter()
            .map(|s| Some(observed(s))),
        );
        out
    }

    #[test]
    fn present_creates_only_when_absent() {
        let plan = resolve(DesiredState::Present, None);
        assert_eq!(plan.actions(), ["create"]);
        assert_eq!(plan.message, "VM successfully created");

        let plan = resolve(DesiredState::Present, Some(&observed(ObservedState::Stopped)));
        assert!(plan.is_noop());
        assert_eq!(plan.message, "VM successfully created");
    }

    #[test]
    fn running_creates_then_starts() {
        assert_eq!(resolve(DesiredState::Running, None).actions(), ["create", "start"]);

        let stopped = observed(ObservedState::Stopped);
        assert_eq!(resolve(DesiredState::Running, Some(&stopped)).actions(), ["start"]);

        let running = observed(ObservedState::Running);
        assert!(resolve(DesiredState::Running, Some(&running)).is_noop());
    }

    #[test]
    fn stopped_never_creates() {
        assert!(resolve(DesiredState::Stopped, None).is_noop());

        let running = observed(ObservedState::Running);
        assert_eq!(resolve(DesiredState::Stopped, Some(&running)).actions(), ["stop"]);

        let stopped = observed(ObservedState::Stopped);
        assert!(resolve(DesiredState::Stopped, Some(&stopped)).is_noop());
    }

    #[test]
    fn absent_stops_before_deleting() {
        assert!(resolve(DesiredState::Absent, None).is_noop());

        let running = observed(ObservedState::Running);
        let plan = resolve(DesiredState::Absent, Some(&running));
        assert_eq!(plan.actions(), ["stop", "delete"]);
        assert_eq!(plan.message, "VM successfully deleted");

        let stopped = observed(ObservedState::Stopped);
        assert_eq!(resolve(DesiredState::Absent, Some(&stopped)).actions(), ["delete"]);
    }

    #[test]
    fn transient_states_are_not_running_or_stopped() {
        let starting = observed(ObservedState::Starting);
        assert_eq!(resolve(DesiredState::Running, Some(&starting)).actions(), ["start"]);

        let stopping = observed(ObservedState::Stopping);
        assert_eq!(resolve(DesiredState::Stopped, Some(&stopping)).actions(), ["stop"]);
    }

    #[test]
    fn invariants_hold_for_every_input() {
        for desired in DesiredState::ALL {
            for obs in all_observations() {
                let plan = resolve(desired, obs.as_ref());

                assert_eq!(plan, resolve(desired, obs.as_ref()));
                assert_eq!(plan.message, message_for(desired));
                assert!(!(plan.create && plan.delete), "{desired} {obs:?}");
                if plan.delete {
                    assert_eq!(desired, DesiredState::Absent);
                }
                if plan.create {
                    assert!(obs.is_none());
                }
                if plan.stop && plan.delete {
                    assert_ne!(obs.as_ref().unwrap().state, ObservedState::Stopped);
                }
                if plan.start {
                    assert_eq!(desired, DesiredState::Running);
                }
            }
        }
    }
}
