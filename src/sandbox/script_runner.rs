use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use super::artifacts::extract;
use super::process::{ProcessOutcome, run_with_timeout};
use super::{EngineError, EnvironmentProvisioner, ExecutionResult};

/// Wall-clock budget of a script
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Prepended to every script. Forces the non-interactive plotting backend,
/// turns `plt.show()` into a sentinel-wrapped PNG on stdout and flushes any
/// figure still open at interpreter exit. Scripts run unchanged when the
/// plotting library is not installed.
const INSTRUMENTATION_PREAMBLE: &str = r#"
try:
    import matplotlib as _pg_matplotlib
    _pg_matplotlib.use("Agg")
    import matplotlib.pyplot as _pg_plt
except ImportError:
    _pg_plt = None

if _pg_plt is not None:
    import atexit as _pg_atexit
    import base64 as _pg_base64
    import io as _pg_io

    def _pg_emit_figure():
        if not _pg_plt.get_fignums():
            return
        _pg_buffer = _pg_io.BytesIO()
        _pg_plt.savefig(_pg_buffer, format="png", dpi=100, bbox_inches="tight")
        _pg_plt.close("all")
        _pg_payload = _pg_base64.b64encode(_pg_buffer.getvalue()).decode("ascii")
        print("<PLOT_DATA:" + _pg_payload + ":PLOT_DATA>", flush=True)

    def _pg_show(*args, **kwargs):
        _pg_emit_figure()

    _pg_plt.show = _pg_show
    _pg_atexit.register(_pg_emit_figure)
"#;

/// Wraps `code` with the instrumentation preamble
pub fn instrument(code: &str) -> String {
    format!("{INSTRUMENTATION_PREAMBLE}\n\n# User code:\n{code}")
}

/// Runs scripting-language jobs inside the isolated runtime
pub struct ScriptRunner {
    provisioner: Arc<EnvironmentProvisioner>,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(provisioner: Arc<EnvironmentProvisioner>) -> Self {
        Self {
            provisioner,
            timeout: SCRIPT_TIMEOUT,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Overrides the wall-clock budget. Only meant for embedding and tests;
    /// the HTTP surface always uses [`SCRIPT_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory that receives the ephemeral script files
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Executes instrumented `code` and returns its raw, unprocessed streams
    pub async fn run_raw(&self, code: &str) -> Result<ProcessOutcome, EngineError> {
        let env = self.provisioner.ensure_async().await?;

        // Removed when dropped, whichever way this function returns
        let mut script = tempfile::Builder::new()
            .prefix("playground-")
            .suffix(".py")
            .tempfile_in(&self.scratch_dir)?;
        write_script(&mut script, &instrument(code))?;

        let outcome = run_with_timeout(
            env.interpreter(),
            &[script.path()],
            None,
            self.timeout,
        )
        .await?;

        script.close()?;
        Ok(outcome)
    }

    /// Executes `code` and turns embedded plots into image references
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult, EngineError> {
        match self.run_raw(code).await? {
            ProcessOutcome::Exited(captured) => {
                let extracted = extract(&captured.stdout);
                log::info!(
                    "Script finished with exit code {} in {:.3}s ({} plots)",
                    captured.exit_code,
                    captured.elapsed.as_secs_f64(),
                    extracted.artifact_count
                );

                Ok(ExecutionResult {
                    output: extracted.output,
                    error: captured.stderr,
                    exit_code: captured.exit_code,
                    execution_time: round_seconds(captured.elapsed),
                    plots: extracted.artifact_count,
                    timed_out: false,
                })
            }
            ProcessOutcome::TimedOut { .. } => {
                log::warn!("Script timed out after {} seconds", self.timeout.as_secs());
                Ok(ExecutionResult::timed_out(self.timeout))
            }
        }
    }
}

fn write_script(file: &mut NamedTempFile, source: &str) -> std::io::Result<()> {
    file.write_all(source.as_bytes())?;
    file.flush()
}

/// Seconds with millisecond precision
fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
