//! Unit Payload Builder
//!
//! Turns a chunk into the script run by its job: one patch-analyzer invocation per
//! work item, each terminated with `|| :` so a failing item never stops the rest of
//! the chunk. Invocations are kept structured (program + arguments) until rendering,
//! where every argument is shell-quoted.

use crate::backend::{ConfigResource, ExecutionUnitSpec};
use crate::partition::Chunk;
use crate::run::{OrchestrationRun, RUN_KIND};
use crate::source::WorkItem;
use std::collections::BTreeMap;

/// Key of the script inside the configuration resource
pub const SCRIPT_KEY: &str = "patcheval.sh";
pub const SCRIPT_DIR: &str = "/vulas";
pub const CONTINUE_MARKER: &str = "|| :";

const BACKEND_SERVICE_SUFFIX: &str = "restbackend-service";
const BACKEND_SERVICE_PORT: u16 = 8091;
const BACKEND_SERVICE_PATH: &str = "backend";
const ANALYZER_JAR: &str = "patch-analyzer-jar-with-dependencies.jar";

/// Name shared by the configuration resource and the job of chunk `index`.
pub fn chunk_name(index: usize) -> String {
    format!("{}-{}", RUN_KIND, index)
}

/// Address of the vulas REST backend deployed under `release`.
pub fn callback_endpoint(release: &str) -> String {
    format!(
        "{}{}:{}/{}",
        release, BACKEND_SERVICE_SUFFIX, BACKEND_SERVICE_PORT, BACKEND_SERVICE_PATH
    )
}

/// Quote `arg` for POSIX sh. Arguments made only of safe characters stay bare.
pub fn shell_quote(arg: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c);
    if !arg.is_empty() && arg.chars().all(is_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// One program invocation with its argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag_with(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Render as a single shell command line.
    pub fn render(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Everything created on the cluster for one chunk
#[derive(Debug, Clone)]
pub struct UnitPayload {
    pub index: usize,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub invocations: Vec<Invocation>,
}

impl UnitPayload {
    /// `#!/bin/sh` followed by one `<invocation> || :` line per work item.
    pub fn script(&self) -> String {
        let mut script = String::from("#!/bin/sh\n");
        for invocation in &self.invocations {
            script.push_str(&invocation.render());
            script.push(' ');
            script.push_str(CONTINUE_MARKER);
            script.push('\n');
        }
        script
    }

    pub fn config_resource(&self) -> ConfigResource {
        ConfigResource {
            name: self.name.clone(),
            labels: self.labels.clone(),
            data: BTreeMap::from([(SCRIPT_KEY.to_string(), self.script())]),
        }
    }
}

/// Builds chunk payloads and job specs for one run
pub struct PayloadBuilder<'a> {
    run: &'a OrchestrationRun,
    endpoint: String,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(run: &'a OrchestrationRun) -> Self {
        Self {
            run,
            endpoint: callback_endpoint(&run.release),
        }
    }

    pub fn build(&self, chunk: &Chunk) -> UnitPayload {
        UnitPayload {
            index: chunk.index,
            name: chunk_name(chunk.index),
            labels: self.run.labels(chunk.index),
            invocations: chunk.items.iter().map(|item| self.invocation(item)).collect(),
        }
    }

    fn invocation(&self, item: &WorkItem) -> Invocation {
        let mut invocation = Invocation::new("java")
            .arg(format!("-Dvulas.shared.backend.serviceUrl={}", self.endpoint))
            .flag_with("-jar", ANALYZER_JAR)
            .flag_with("-b", item.reference.as_str())
            .flag_with("-r", item.repo.as_str())
            .flag_with("-e", item.commit.as_str())
            .flag_with("-desc", item.description.as_str())
            .flag_with("-links", item.links.as_str());

        if !self.run.dry_run {
            invocation = invocation.arg("-u");
        }
        if self.run.skip_on_error {
            invocation = invocation.arg("-sie");
        }
        invocation
    }

    /// Job spec running `payload`'s script from its mounted configuration resource.
    pub fn unit_spec(&self, payload: &UnitPayload) -> ExecutionUnitSpec {
        let script_path = format!("{}/{}", SCRIPT_DIR, SCRIPT_KEY);
        ExecutionUnitSpec {
            name: payload.name.clone(),
            labels: payload.labels.clone(),
            config_name: payload.name.clone(),
            script_key: SCRIPT_KEY.to_string(),
            script_path: script_path.clone(),
            image: self.run.image.clone(),
            command: vec!["sh".to_string(), script_path],
            active_deadline: self.run.active_deadline,
            backoff_limit: 0,
            parallelism: 1,
        }
    }
}
