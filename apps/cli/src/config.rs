//! CLI configuration
//!
//! Defaults, then an optional TOML file, then `TREEVIEW_` environment
//! variables (`__` separates nested keys, e.g.
//! `TREEVIEW_TREEVIEW__STRIP_REMOVED_ELEMENTS=true`).

use config::{Config, ConfigError, Environment, File, FileFormat};
use ferrum_treeview::TreeViewConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub treeview: TreeViewConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl CliConfig {
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(file, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("TREEVIEW")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("treeview.permitted_missing_extension_prefixes")
            .with_list_parse_key("treeview.logical_url_prefixes")
            .try_parsing(true)
    }

    fn load_with(file: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder.add_source(environment).build()?.try_deserialize()
    }
}
