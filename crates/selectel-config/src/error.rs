use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("token or credentials with domain name must be specified")]
    MissingCredentials,

    #[error("region is invalid: {0}")]
    InvalidRegion(String),

    #[error("{0} must be set for the resource import")]
    MissingImportSetting(&'static str),

    #[error("config directory not found")]
    ConfigDirNotFound,

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
