pub mod artifacts;
pub mod compile;
mod environment;
mod error;
pub mod packages;
pub mod process;
pub mod script_runner;

pub use compile::{CompilerPipeline, CompilerStatus, PipelineOutcome, RunMode};
pub use environment::{EnvironmentProvisioner, RuntimeEnvironment};
pub use error::EngineError;
pub use packages::{InstallReport, PackageInstaller, PackageListing};
pub use script_runner::ScriptRunner;

use std::time::Duration;

use serde::Serialize;

/// Result of one scripting-language job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    pub exit_code: i32,
    /// Wall time in seconds, millisecond precision
    pub execution_time: f64,
    pub plots: usize,
    #[serde(skip)]
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Result of a job that exceeded `budget`; partial output is dropped
    pub fn timed_out(budget: Duration) -> Self {
        Self {
            output: String::new(),
            error: format!(
                "Code execution timed out ({} seconds limit)",
                budget.as_secs()
            ),
            exit_code: -1,
            execution_time: budget.as_secs_f64(),
            plots: 0,
            timed_out: true,
        }
    }
}
