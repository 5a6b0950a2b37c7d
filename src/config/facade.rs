//! Config loading entry points: layered workspace loading and single-file loading.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::LoaderConfig;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Loads [`LoaderConfig`] from defaults, files and environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Sources, lowest precedence first: defaults, global file, workspace
    /// `config/config.toml`, workspace `config/{BUGS_LOADER_ENV}.toml`, environment.
    pub fn load(workspace_root: &Path) -> Result<LoaderConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load configuration from one explicit file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<LoaderConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    /// Defaults only, without reading files or the environment.
    pub fn defaults() -> Result<LoaderConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .build()?
            .try_deserialize()
    }
}
