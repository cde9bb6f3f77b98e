//! Caller-supplied parameters and their validation.
//!
//! [`VmParams`] mirrors the argument names the tool has always accepted, all
//! optional so that values from several sources can be layered with
//! [`VmParams::merge`]. [`VmParams::validate`] turns them into a
//! [`ReconcileRequest`] before anything talks to the controller.

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{CloudInit, DesiredState, Hardware, ImageSource, Instance};
use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CloudInitParams {
    pub userdata: Option<String>,
    pub network_config: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VmParams {
    pub name: Option<String>,
    pub image: Option<String>,
    pub file: Option<PathBuf>,
    pub cpus: Option<i64>,
    pub memory: Option<i64>,
    pub disk: Option<i64>,
    pub cloud_init: Option<CloudInitParams>,
    pub overwrite: Option<bool>,
    pub force: Option<bool>,
    pub state: Option<String>,
    pub timeout: Option<i64>,
    pub qcontroller_host: Option<String>,
    pub qcontroller_port: Option<u16>,
}

/// A validated request for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub name: String,
    pub state: DesiredState,
    /// Only needed when the instance has to be created.
    pub hardware: Option<Hardware>,
    pub cloudinit: CloudInit,
    pub image: ImageSource,
    pub force: bool,
    pub timeout_secs: u64,
}

impl ReconcileRequest {
    /// The instance to create, or a validation error naming what is missing.
    pub fn instance(&self) -> Result<Instance> {
        let hardware = self.hardware.ok_or_else(|| {
            Error::Validation(format!(
                "parameters 'cpus', 'memory' and 'disk' are required to create VM {}",
                self.name
            ))
        })?;

        Ok(Instance {
            id: self.name.clone(),
            hardware,
            cloudinit: self.cloudinit.clone(),
        })
    }
}

fn positive(name: &str, value: Option<i64>) -> Result<Option<u64>> {
    match value {
        Some(v) if v <= 0 => Err(Error::Validation(format!(
            "Parameter '{name}' must be greater than 0"
        ))),
        Some(v) => Ok(Some(v.unsigned_abs())),
        None => Ok(None),
    }
}

impl VmParams {
    /// Layer `overrides` on top of `self`: every value set in `overrides` wins.
    pub fn merge(self, overrides: VmParams) -> VmParams {
        let cloud_init = match (self.cloud_init, overrides.cloud_init) {
            (Some(base), Some(over)) => Some(CloudInitParams {
                userdata: over.userdata.or(base.userdata),
                network_config: over.network_config.or(base.network_config),
            }),
            (base, over) => over.or(base),
        };

        VmParams {
            name: overrides.name.or(self.name),
            image: overrides.image.or(self.image),
            file: overrides.file.or(self.file),
            cpus: overrides.cpus.or(self.cpus),
            memory: overrides.memory.or(self.memory),
            disk: overrides.disk.or(self.disk),
            cloud_init,
            overwrite: overrides.overwrite.or(self.overwrite),
            force: overrides.force.or(self.force),
            state: overrides.state.or(self.state),
            timeout: overrides.timeout.or(self.timeout),
            qcontroller_host: overrides.qcontroller_host.or(self.qcontroller_host),
            qcontroller_port: overrides.qcontroller_port.or(self.qcontroller_port),
        }
    }

    pub fn host(&self) -> &str {
        self.qcontroller_host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.qcontroller_port.unwrap_or(DEFAULT_PORT)
    }

    pub fn validate(&self) -> Result<ReconcileRequest> {
        let name = match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(Error::Validation("missing required arguments: name".into())),
        };

        let state: DesiredState = self
            .state
            .as_deref()
            .ok_or_else(|| Error::Validation("missing required arguments: state".into()))?
            .parse()?;

        let cpus = positive("cpus", self.cpus)?;
        let memory = positive("memory", self.memory)?;
        let disk = positive("disk", self.disk)?;
        let timeout_secs = positive("timeout", self.timeout)?.unwrap_or(DEFAULT_TIMEOUT_SECS);

        if state == DesiredState::Present {
            let missing: Vec<&str> = [
                ("image", self.image.is_none()),
                ("cpus", cpus.is_none()),
                ("memory", memory.is_none()),
                ("disk", disk.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();

            if !missing.is_empty() {
                return Err(Error::Validation(format!(
                    "state is present but all of the following are missing: {}",
                    missing.join(", ")
                )));
            }
        }

        let hardware = match (cpus, memory, disk) {
            (Some(cpus), Some(memory), Some(disk)) => Some(Hardware {
                cpus: u32::try_from(cpus).map_err(|_| {
                    Error::Validation(format!("Parameter 'cpus' is out of range: {cpus}"))
                })?,
                memory,
                disk,
            }),
            _ => None,
        };

        let cloud_init = self.cloud_init.clone().unwrap_or_default();

        Ok(ReconcileRequest {
            name,
            state,
            hardware,
            cloudinit: CloudInit {
                userdata: cloud_init.userdata.unwrap_or_default(),
                network_config: cloud_init.network_config.unwrap_or_default(),
            },
            image: ImageSource {
                image: self.image.clone(),
                file: self.file.clone(),
                overwrite: self.overwrite.unwrap_or(false),
            },
            force: self.force.unwrap_or(false),
            timeout_secs,
        })
    }
}
