use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot read args file {}: {source}", path.display())]
    ArgsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid args file {}: {source}", path.display())]
    ArgsJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid {var} value {value:?}: {source}")]
    EnvPort {
        var: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },

    #[error(transparent)]
    Infra(#[from] qc_infra::Error),
}
