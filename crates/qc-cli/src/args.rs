use std::path::{Path, PathBuf};

use clap::Parser;
use qc_infra::VmParams;
use qc_infra::params::CloudInitParams;

use crate::error::CliError;

const HOST_ENV: &str = "QCONTROLLER_HOST";
const PORT_ENV: &str = "QCONTROLLER_PORT";

#[derive(Parser, Debug)]
#[command(name = "qcontroller-vm")]
#[command(about = "Reconcile a qcontroller VM to a desired state")]
#[command(version)]
pub struct Args {
    /// JSON file with module-style arguments; command-line flags override it
    #[arg(long)]
    pub args_file: Option<PathBuf>,

    /// Instance name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Desired state: present, running, stopped or absent
    #[arg(short, long)]
    pub state: Option<String>,

    /// Image id in the registry
    #[arg(short, long)]
    pub image: Option<String>,

    /// Local image file to register under --image before creating
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Number of vCPUs
    #[arg(long, allow_negative_numbers = true)]
    pub cpus: Option<i64>,

    /// Memory in MB
    #[arg(long, allow_negative_numbers = true)]
    pub memory: Option<i64>,

    /// Disk size in GB
    #[arg(long, allow_negative_numbers = true)]
    pub disk: Option<i64>,

    /// cloud-init user data
    #[arg(long)]
    pub userdata: Option<String>,

    /// cloud-init network config
    #[arg(long)]
    pub network_config: Option<String>,

    /// Re-upload --file even if the registry already has the image
    #[arg(long)]
    pub overwrite: bool,

    /// Force the stop
    #[arg(long)]
    pub force: bool,

    /// Seconds to allow for start/stop to take effect
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// qcontroller host [env: QCONTROLLER_HOST]
    #[arg(long)]
    pub host: Option<String>,

    /// qcontroller port [env: QCONTROLLER_PORT]
    #[arg(long)]
    pub port: Option<u16>,

    /// Only report what would change
    #[arg(long)]
    pub check: bool,
}

impl Args {
    /// Parameters given as flags. Unset flags stay `None` so that values from
    /// an args file are not overridden by defaults.
    fn flag_params(&self) -> VmParams {
        let cloud_init = if self.userdata.is_some() || self.network_config.is_some() {
            Some(CloudInitParams {
                userdata: self.userdata.clone(),
                network_config: self.network_config.clone(),
            })
        } else {
            None
        };

        VmParams {
            name: self.name.clone(),
            image: self.image.clone(),
            file: self.file.clone(),
            cpus: self.cpus,
            memory: self.memory,
            disk: self.disk,
            cloud_init,
            overwrite: self.overwrite.then_some(true),
            force: self.force.then_some(true),
            state: self.state.clone(),
            timeout: self.timeout,
            qcontroller_host: self.host.clone(),
            qcontroller_port: self.port,
        }
    }

    /// Combine the environment, the args file (if any) and the flags.
    pub fn params(&self) -> Result<VmParams, CliError> {
        self.params_with_env(|var| std::env::var(var).ok())
    }

    /// Flags win over the args file, which wins over the environment.
    fn params_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<VmParams, CliError> {
        let file = match &self.args_file {
            Some(path) => load_args_file(path)?,
            None => VmParams::default(),
        };
        Ok(env_params(env)?.merge(file).merge(self.flag_params()))
    }
}

fn env_params(env: impl Fn(&str) -> Option<String>) -> Result<VmParams, CliError> {
    let qcontroller_port = match env(PORT_ENV) {
        Some(value) => Some(value.parse().map_err(|source| CliError::EnvPort {
            var: PORT_ENV,
            value,
            source,
        })?),
        None => None,
    };

    Ok(VmParams {
        qcontroller_host: env(HOST_ENV),
        qcontroller_port,
        ..VmParams::default()
    })
}

fn load_args_file(path: &Path) -> Result<VmParams, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::ArgsFile {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| CliError::ArgsJson {
        path: path.to_path_buf(),
        source,
    })
}
