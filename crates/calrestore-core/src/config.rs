use std::path::Path;

use anyhow::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, FileFormat};
use serde::Deserialize;

use crate::constants;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub roots: RootsConfig,
    pub restore: RestoreConfig,
    pub logging: LoggingConfig,
}

/// Principal root prefixes of the target system.
#[derive(Debug, Clone, Deserialize)]
pub struct RootsConfig {
    pub principal_root: String,
    pub user_principal_root: String,
    pub group_principal_root: String,
    pub admin_group_principal_root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestoreConfig {
    /// Turn entity-level errors into a run abort.
    pub fail_on_error: bool,
    /// Entities per sink transaction. Zero commits after every entity.
    pub batch_size: usize,
    pub public_user: String,
    pub admin_groups_id_prefix: String,
    pub legacy_user0_id: i64,
    pub principal_cache_flush_secs: u64,
    pub eliminate_private_timezones: bool,
    pub default_public_access: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("roots.principal_root", constants::PRINCIPAL_ROOT)?
            .set_default("roots.user_principal_root", constants::USER_PRINCIPAL_ROOT)?
            .set_default("roots.group_principal_root", constants::GROUP_PRINCIPAL_ROOT)?
            .set_default(
                "roots.admin_group_principal_root",
                constants::ADMIN_GROUP_PRINCIPAL_ROOT,
            )?
            .set_default("restore.fail_on_error", false)?
            .set_default("restore.batch_size", 0)?
            .set_default("restore.public_user", constants::DEFAULT_PUBLIC_USER)?
            .set_default(
                "restore.admin_groups_id_prefix",
                constants::DEFAULT_ADMIN_GROUPS_ID_PREFIX,
            )?
            .set_default("restore.legacy_user0_id", constants::DEFAULT_LEGACY_USER0_ID)?
            .set_default(
                "restore.principal_cache_flush_secs",
                constants::DEFAULT_PRINCIPAL_CACHE_FLUSH_SECS,
            )?
            .set_default("restore.eliminate_private_timezones", true)?
            .set_default(
                "restore.default_public_access",
                constants::DEFAULT_PUBLIC_ACCESS,
            )?
            .set_default("logging.level", "info")?)
    }

    /// ## Summary
    /// Loads configuration from built-in defaults, an optional TOML file and
    /// `CALRESTORE`-prefixed environment variables, in increasing precedence.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("calrestore.toml").required(false),
        };

        Ok(Self::defaults()?
            // TOML file
            .add_source(file_source)
            // Env, e.g. CALRESTORE_RESTORE__FAIL_ON_ERROR=true
            .add_source(
                config::Environment::with_prefix("CALRESTORE")
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// ## Summary
    /// Builds settings from an in-memory TOML document layered over the defaults.
    ///
    /// ## Errors
    /// Returns an error if the TOML is invalid or a value has the wrong type.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(Self::defaults()?
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables, a `.env` file and an
/// optional explicit config file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config(file: Option<&Path>) -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load(file)
}
