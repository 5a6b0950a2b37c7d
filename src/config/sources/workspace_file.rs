//! Workspace config files under `<root>/config/`: the shared `config.toml`, then the
//! profile file named by `BUGS_LOADER_ENV` (default `development`).

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PROFILE_VAR: &str = "BUGS_LOADER_ENV";
const DEFAULT_PROFILE: &str = "development";

/// Existing workspace config files, lowest precedence first.
pub fn workspace_config_files(workspace_root: &Path, profile: &str) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", profile)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let profile = std::env::var(PROFILE_VAR).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());

    let files = workspace_config_files(workspace_root, &profile);
    if files.is_empty() {
        debug!(workspace = %workspace_root.display(), %profile, "No workspace configuration");
    }
    Ok(files.iter().fold(builder, |builder, path| {
        debug!(config_path = %path.display(), "Adding workspace configuration");
        builder.add_source(File::from(path.as_path()).format(FileFormat::Toml))
    }))
}
