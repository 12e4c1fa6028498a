use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use super::EngineError;
use super::process::{CapturedOutput, ProcessOutcome, run_with_timeout};

/// Budget of the compiler invocation
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Budget of the compiled program
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);
/// Budget of `<compiler> --version`
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const SOURCE_NAME: &str = "main.c";
const EXECUTABLE_STEM: &str = "program";

/// Phrases in stdout that suggest the program printed a prompt and then hit
/// the end of its (empty) input
const PROMPT_MARKERS: &[&str] = &["enter"];
/// Phrases in stderr that point at an input-reading call
const INPUT_CALL_MARKERS: &[&str] = &["scanf"];

/// Terminal state of one compile-then-run job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    CompileFailed { diagnostics: String },
    CompileTimedOut,
    RunTimedOut,
    /// The program seems to be waiting for input that was never supplied
    NeedsInput { output: String, error_output: String },
    Completed {
        output: String,
        error_output: String,
        return_code: i32,
    },
}

/// How stdin is provided to the compiled program
#[derive(Debug, Clone, Copy)]
pub enum RunMode<'a> {
    /// Empty stdin, followed by the blocked-on-input check
    Batch,
    /// The given lines, newline-joined, as the whole of stdin
    WithInputs(&'a [String]),
}

/// Result of probing the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerStatus {
    Available { version: String },
    Unavailable { error: String },
}

/// Scratch directory holding the source file and the compiled binary.
/// Everything in it is removed when the value is dropped.
struct BuildDir {
    dir: TempDir,
    source: PathBuf,
    executable: PathBuf,
}

impl BuildDir {
    fn create(source_code: &str) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("playground-c-").tempdir()?;
        let source = dir.path().join(SOURCE_NAME);
        std::fs::write(&source, source_code)?;
        let executable = dir.path().join(executable_name());

        Ok(Self {
            dir,
            source,
            executable,
        })
    }
}

/// File name of the compiled program on this platform
pub fn executable_name() -> String {
    format!("{EXECUTABLE_STEM}{}", std::env::consts::EXE_SUFFIX)
}

/// Standard input fed to a program run with explicit inputs
pub fn join_inputs(inputs: &[String]) -> String {
    let mut stdin = inputs.join("\n");
    stdin.push('\n');
    stdin
}

/// Whether captured streams look like a program stuck on reading input
pub fn looks_blocked_on_input(stdout: &str, stderr: &str) -> bool {
    let stdout = stdout.to_lowercase();
    let stderr = stderr.to_lowercase();
    PROMPT_MARKERS.iter().any(|m| stdout.contains(m))
        || INPUT_CALL_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Compiles C sources and runs the resulting binary
pub struct CompilerPipeline {
    compiler: String,
}

impl CompilerPipeline {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
        }
    }

    /// Compiles `source_code` and, if that succeeds, runs it according to `mode`
    pub async fn run(
        &self,
        source_code: &str,
        mode: RunMode<'_>,
    ) -> Result<PipelineOutcome, EngineError> {
        if source_code.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "C code cannot be empty".to_string(),
            ));
        }

        let build = BuildDir::create(source_code)?;
        log::debug!("Compiling in {}", build.dir.path().display());

        if let Some(failed) = self.compile_source_code(&build).await? {
            return Ok(failed);
        }
        log::debug!("Compiled {}", build.executable.display());

        self.run_program(&build, mode).await
        // `build` is dropped here, taking the source and binary with it
    }

    /// Returns the terminal outcome when compilation did not succeed
    async fn compile_source_code(
        &self,
        build: &BuildDir,
    ) -> Result<Option<PipelineOutcome>, EngineError> {
        let args = [
            OsStr::new("-o"),
            build.executable.as_os_str(),
            build.source.as_os_str(),
            OsStr::new("-lm"),
        ];

        match run_with_timeout(&self.compiler, &args, None, COMPILE_TIMEOUT).await? {
            ProcessOutcome::Exited(output) if output.success() => Ok(None),
            ProcessOutcome::Exited(output) => {
                log::info!("Compilation failed with exit code {}", output.exit_code);
                Ok(Some(PipelineOutcome::CompileFailed {
                    diagnostics: output.stderr,
                }))
            }
            ProcessOutcome::TimedOut { .. } => {
                log::warn!("Compilation timed out after {} seconds", COMPILE_TIMEOUT.as_secs());
                Ok(Some(PipelineOutcome::CompileTimedOut))
            }
        }
    }

    async fn run_program(
        &self,
        build: &BuildDir,
        mode: RunMode<'_>,
    ) -> Result<PipelineOutcome, EngineError> {
        let stdin = match mode {
            RunMode::Batch => String::new(),
            RunMode::WithInputs(inputs) => join_inputs(inputs),
        };

        log::debug!("Running {}", build.executable.display());
        let outcome = run_with_timeout(
            &build.executable,
            &[] as &[&str],
            Some(stdin.as_str()),
            RUN_TIMEOUT,
        )
        .await?;

        let CapturedOutput {
            stdout,
            stderr,
            exit_code,
            elapsed,
        } = match outcome {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut { .. } => {
                log::warn!("Program timed out after {} seconds", RUN_TIMEOUT.as_secs());
                return Ok(PipelineOutcome::RunTimedOut);
            }
        };

        if matches!(mode, RunMode::Batch) && looks_blocked_on_input(&stdout, &stderr) {
            log::info!("Program appears to wait for input");
            return Ok(PipelineOutcome::NeedsInput {
                output: stdout,
                error_output: stderr,
            });
        }

        log::info!(
            "Program finished with exit code {exit_code} in {:.3}s",
            elapsed.as_secs_f64()
        );
        Ok(PipelineOutcome::Completed {
            output: stdout,
            error_output: stderr,
            return_code: exit_code,
        })
    }

    /// Checks whether the compiler can be launched and reports its version
    pub async fn probe(&self) -> CompilerStatus {
        match run_with_timeout(&self.compiler, &["--version"], None, PROBE_TIMEOUT).await {
            Ok(ProcessOutcome::Exited(output)) if output.success() => CompilerStatus::Available {
                version: output.stdout.lines().next().unwrap_or_default().to_string(),
            },
            Ok(ProcessOutcome::Exited(_)) => CompilerStatus::Unavailable {
                error: format!("{} not found or not working", self.compiler),
            },
            Ok(ProcessOutcome::TimedOut { .. }) => CompilerStatus::Unavailable {
                error: format!("Error checking {}: timed out", self.compiler),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CompilerStatus::Unavailable {
                error: format!("{} not installed", self.compiler),
            },
            Err(e) => CompilerStatus::Unavailable {
                error: format!("Error checking {}: {e}", self.compiler),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SUM_PROGRAM: &str = r#"
#include <stdio.h>
int main(void) {
    int a, b;
    printf("Enter two numbers: ");
    if (scanf("%d %d", &a, &b) != 2) return 1;
    printf("%d\n", a + b);
    return 0;
}
"#;

    async fn gcc() -> Option<CompilerPipeline> {
        let pipeline = CompilerPipeline::new("gcc");
        match pipeline.probe().await {
            CompilerStatus::Available { .. } => Some(pipeline),
            CompilerStatus::Unavailable { error } => {
                eprintln!("skipping: {error}");
                None
            }
        }
    }

    #[test]
    fn test_join_inputs() {
        let inputs = vec!["3".to_string(), "4".to_string()];
        assert_eq!(join_inputs(&inputs), "3\n4\n");
        assert_eq!(join_inputs(&[]), "\n");
    }

    #[test]
    fn test_executable_name_has_platform_suffix() {
        let name = executable_name();
        assert!(name.starts_with("program"));
        if cfg!(windows) {
            assert!(name.ends_with(".exe"));
        } else {
            assert_eq!(name, "program");
        }
    }

    #[test]
    fn test_input_block_heuristic() {
        assert!(looks_blocked_on_input("Enter a number: ", ""));
        assert!(looks_blocked_on_input("PLEASE ENTER YOUR NAME", ""));
        assert!(looks_blocked_on_input("", "warning: ignoring return value of 'SCANF'"));
        assert!(!looks_blocked_on_input("Hello, World!\n", ""));
        assert!(!looks_blocked_on_input("", "segmentation fault"));
        // stream-specific: a prompt word in stderr alone is not enough
        assert!(!looks_blocked_on_input("", "enter"));
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected() {
        let pipeline = CompilerPipeline::new("definitely-not-a-compiler");
        let err = pipeline.run("  \n", RunMode::Batch).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_probe_missing_compiler() {
        let pipeline = CompilerPipeline::new("definitely-not-a-compiler");
        assert_eq!(
            pipeline.probe().await,
            CompilerStatus::Unavailable {
                error: "definitely-not-a-compiler not installed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_hello_world_completes() {
        let Some(pipeline) = gcc().await else { return };
        let outcome = pipeline
            .run(
                "#include <stdio.h>\nint main(void) { printf(\"Hello\\n\"); return 0; }\n",
                RunMode::Batch,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Completed {
                output: "Hello\n".to_string(),
                error_output: String::new(),
                return_code: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_math_library_is_linked() {
        let Some(pipeline) = gcc().await else { return };
        let source = "#include <stdio.h>\n#include <math.h>\nint main(int argc, char **argv) { volatile double x = argc + 3.0; printf(\"%.0f\\n\", sqrt(x * x)); return 0; }\n";
        let outcome = pipeline.run(source, RunMode::Batch).await.unwrap();

        let PipelineOutcome::Completed { output, return_code, .. } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(output, "4\n");
        assert_eq!(return_code, 0);
    }

    #[tokio::test]
    async fn test_syntax_error_stops_before_run() {
        let Some(pipeline) = gcc().await else { return };
        let outcome = pipeline
            .run("int main(void) { return 0 }\n", RunMode::Batch)
            .await
            .unwrap();

        let PipelineOutcome::CompileFailed { diagnostics } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(!diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_failed_compile_leaves_no_binary() {
        let Some(pipeline) = gcc().await else { return };
        let build = BuildDir::create("int main(void) { return 0 }\n").unwrap();

        let failed = pipeline.compile_source_code(&build).await.unwrap();
        assert!(matches!(failed, Some(PipelineOutcome::CompileFailed { .. })));
        assert!(build.source.exists());
        assert!(!build.executable.exists());
    }

    #[tokio::test]
    async fn test_sum_with_inputs() {
        let Some(pipeline) = gcc().await else { return };
        let inputs = vec!["3".to_string(), "4".to_string()];
        let outcome = pipeline
            .run(SUM_PROGRAM, RunMode::WithInputs(&inputs))
            .await
            .unwrap();

        let PipelineOutcome::Completed { output, return_code, .. } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert!(output.contains('7'));
        assert_eq!(return_code, 0);
    }

    #[tokio::test]
    async fn test_prompt_without_inputs_needs_input() {
        let Some(pipeline) = gcc().await else { return };
        let outcome = pipeline.run(SUM_PROGRAM, RunMode::Batch).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::NeedsInput { .. }));
    }

    #[tokio::test]
    async fn test_runtime_fault_is_completed_outcome() {
        let Some(pipeline) = gcc().await else { return };
        let outcome = pipeline
            .run("int main(void) { return 42; }\n", RunMode::Batch)
            .await
            .unwrap();

        let PipelineOutcome::Completed { return_code, .. } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(return_code, 42);
    }
}
