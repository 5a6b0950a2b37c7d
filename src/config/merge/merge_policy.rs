//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key: defaults, global file,
/// workspace files, environment.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("run.source", "bugs.yaml")?
        .set_default("run.concurrency", 1_i64)?
        .set_default("run.release", "vulas-")?
        .set_default("run.namespace", "vulnerability-assessment-tool-core")?
        .set_default("run.skip_on_error", false)?
        .set_default("run.dry_run", true)?
        .set_default("run.max_in_flight", 1_i64)?
        .set_default("unit.image", "ichbinfrog/patchanalyzer:v0.0.1")?
        .set_default("unit.active_deadline_secs", 100_i64)?
        .set_default("unit.completion_timeout_secs", 600_i64)?
        .set_default("unit.poll_interval_ms", 2000_i64)?
        .set_default("cluster.request_timeout_secs", 30_i64)
}
