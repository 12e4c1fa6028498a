use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured streams of a process that exited on its own
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub elapsed: Duration,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How a bounded subprocess ended
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Exited(CapturedOutput),
    /// The wall-clock budget ran out; the process group was killed and its
    /// partial output discarded.
    TimedOut { elapsed: Duration },
}

/// Runs `program` with `args` and waits at most `limit` for it to finish.
///
/// When `stdin` is `Some`, the text is written to the child's standard input
/// up front and the pipe is closed; `None` attaches the null device. The
/// child is placed in its own process group so a timeout takes down every
/// descendant, not only the direct child.
pub async fn run_with_timeout<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    stdin: Option<&str>,
    limit: Duration,
) -> std::io::Result<ProcessOutcome> {
    let mut std_cmd = std::process::Command::new(program);
    std_cmd
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    let start_time = Instant::now();
    let mut child = cmd.spawn()?;
    // Also fires when this future is dropped before the child exits
    let mut group = GroupGuard { pid: child.id() };

    // Feed stdin concurrently so a child that fills its stdout pipe before
    // reading all input cannot deadlock us.
    if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
        let input = input.to_owned();
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                log::debug!("Child closed stdin early: {e}");
            }
        });
    }

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            group.disarm();
            Ok(ProcessOutcome::Exited(CapturedOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: exit_code(output.status),
                elapsed: start_time.elapsed(),
            }))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            drop(group);
            Ok(ProcessOutcome::TimedOut {
                elapsed: start_time.elapsed(),
            })
        }
    }
}

/// Kills the child's process group on drop unless the child exited normally
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

/// Exit code of a finished process; a signal death is reported as the
/// negated signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // SAFETY: kill(2) has no memory-safety preconditions. A negative pid
    // addresses the process group created by `process_group(0)`.
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if ret != 0 {
        log::debug!(
            "killpg({pid}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {
    // kill_on_drop terminates the direct child once the wait future is dropped
}
