// Copyright (c) 2023 The Cocoon Authors

//! Build the settings of a cocoon component
//!
//! ---
//! The configuration is merged from, in order of increasing priority:
//! 1. the file at `COCOON_CONFIG_PATH` (`base_config/config.toml` by default),
//!    which must exist,
//! 2. the optional file at `COCOON_CONFIG_OVERRIDE_PATH` (`config/config.toml` by default),
//! 3. the user configuration directory of the application, if it exists,
//! 4. environment variables prefixed with `env_prefix`, nested keys separated by `__`.

use crate::error::ModelsError;
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Reads an environment variable, falling back to `default` when unset or empty
pub fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// Merge the settings, see the module documentation
pub fn build_cocoon_settings<T: DeserializeOwned>(
    app_name: &str,
    env_prefix: &str,
) -> Result<T, ModelsError> {
    let mut builder = config::Config::builder();
    let config_path = env_or("COCOON_CONFIG_PATH", "base_config/config.toml");
    builder = builder.add_source(config::File::with_name(&config_path));

    let config_override_path = env_or("COCOON_CONFIG_OVERRIDE_PATH", "config/config.toml");
    if Path::new(&config_override_path).is_file() {
        builder = builder.add_source(config::File::with_name(&config_override_path));
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "Cocoon", app_name) {
        let user_config_path = proj_dirs.config_dir();
        if user_config_path.is_file() {
            if let Some(path_str) = user_config_path.to_str() {
                builder = builder.add_source(config::File::with_name(path_str));
            }
        }
    }

    let settings = builder
        .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}
