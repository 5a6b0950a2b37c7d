//! Bugs Loader: chunked vulnerability loading through cluster jobs
//!
//! Reads a list of vulnerability records, splits it into chunks, runs one
//! patch-analyzer job per chunk on a cluster and removes every resource it created
//! once the jobs are done, whether the run succeeded or not.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod partition;
pub mod payload;
pub mod run;
pub mod source;
pub mod sweep;

pub use error::{BackendError, LoadError, ResourceKind};
pub use orchestrator::{LoadReport, Orchestrator};
pub use run::OrchestrationRun;
