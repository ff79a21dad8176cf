use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Bare credential variables honoured alongside the prefixed ones.
const CLIENT_ID_VAR: &str = "APS_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "APS_CLIENT_SECRET";

/// Load configuration from file with environment variable overrides
///
/// Precedence (lowest first): the TOML file, `DARUNNER_`-prefixed variables
/// nested on `__` (e.g. `DARUNNER_POLLER__INTERVAL_MS`), then the bare
/// `APS_CLIENT_ID` / `APS_CLIENT_SECRET` pair.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("DARUNNER_").split("__"))
        .merge(
            Env::raw()
                .only(&[CLIENT_ID_VAR, CLIENT_SECRET_VAR])
                .map(|key| {
                    if key.as_str().eq_ignore_ascii_case(CLIENT_ID_VAR) {
                        "aps.client_id".into()
                    } else {
                        "aps.client_secret".into()
                    }
                }),
        )
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
