use std::path::PathBuf;

use read_filter_core::rewrite::{ExitStatus, RewriteError};
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Config file not found or not readable: {}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Config file {} is not JSON: {source}", path.display()))]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Invalid config file {}: {source}", path.display()))]
    ParseConfig {
        path: PathBuf,
        #[snafu(source(from(RewriteError, Box::new)))]
        source: Box<RewriteError>,
    },

    #[snafu(display("{source}"))]
    Rewrite {
        #[snafu(source(from(RewriteError, Box::new)))]
        source: Box<RewriteError>,
    },
}

impl CliError {
    /// Process exit status for this failure.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CliError::ReadConfig { .. } => ExitStatus::Io,
            CliError::ParseJson { .. } => ExitStatus::Software,
            CliError::ParseConfig { source, .. } | CliError::Rewrite { source } => {
                source.exit_status()
            }
        }
    }
}
