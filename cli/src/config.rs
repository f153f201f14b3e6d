use crate::error::CliError;
use apcp_core::ProtocolConfig;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Load the protocol configuration.
///
/// An explicit path must exist. Without one, `config.json` in the working
/// directory is used if present, otherwise the built-in defaults. Keys missing
/// from the file keep their default values.
pub fn load_config(explicit: Option<&Path>) -> Result<ProtocolConfig, CliError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !fallback.is_file() {
                log::debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                return Ok(ProtocolConfig::default());
            }
            fallback
        }
    };

    let text = std::fs::read_to_string(&path)?;
    let config = parse_config(&text).map_err(|source| CliError::Config {
        path: path.clone(),
        source,
    })?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn parse_config(text: &str) -> Result<ProtocolConfig, serde_json::Error> {
    serde_json::from_str(text)
}
