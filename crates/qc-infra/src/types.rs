use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;

/// Hardware allocation for a new instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hardware {
    pub cpus: u32,
    /// Memory in MB.
    pub memory: u64,
    /// Disk size in GB.
    pub disk: u64,
}

/// Boot-time configuration passed through to cloud-init unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInit {
    pub userdata: String,
    pub network_config: String,
}

/// Everything needed to create an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub hardware: Hardware,
    pub cloudinit: CloudInit,
}

/// Where the image for a new instance comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSource {
    /// Registry id of the image.
    pub image: Option<String>,
    /// Local file to register under `image` before creating.
    pub file: Option<PathBuf>,
    /// Re-upload `file` even if the registry already has `image`.
    pub overwrite: bool,
}

/// Controller-reported instance state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedState {
    Unspecified,
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
    /// A state this client does not know about, kept verbatim.
    Other(String),
}

impl ObservedState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unspecified => "STATE_UNSPECIFIED",
            Self::Created => "STATE_CREATED",
            Self::Starting => "STATE_STARTING",
            Self::Running => "STATE_RUNNING",
            Self::Stopping => "STATE_STOPPING",
            Self::Stopped => "STATE_STOPPED",
            Self::Failed => "STATE_FAILED",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "STATE_UNSPECIFIED" => Self::Unspecified,
            "STATE_CREATED" => Self::Created,
            "STATE_STARTING" => Self::Starting,
            "STATE_RUNNING" => Self::Running,
            "STATE_STOPPING" => Self::Stopping,
            "STATE_STOPPED" => Self::Stopped,
            "STATE_FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance as reported by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceInfo {
    pub name: String,
    pub state: ObservedState,
    pub ipaddresses: Vec<String>,
    pub details: Hardware,
}

/// The end condition a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesiredState {
    Present,
    Running,
    Stopped,
    Absent,
}

impl DesiredState {
    pub const ALL: [Self; 4] = [Self::Present, Self::Running, Self::Stopped, Self::Absent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "present" => Ok(Self::Present),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "absent" => Ok(Self::Absent),
            other => Err(Error::Validation(format!(
                "value of state must be one of: present, running, stopped, absent, got: {other}"
            ))),
        }
    }
}
