// 外部プロセス実行: spawn -> ポーリング -> タイムアウト時kill
//
// Shared by the pdftoppm rasterizer and the external enhancer.

use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a supervised child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(ExitStatus),
    /// The deadline passed; the child was killed and reaped.
    TimedOut(Duration),
}

/// Spawn `command` and wait for it, killing it once `timeout` elapses.
///
/// `None` waits indefinitely. The caller is responsible for routing stdout and
/// stderr somewhere that cannot fill up (null or a file), since nothing reads
/// pipes while polling.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
) -> std::io::Result<ProcessOutcome> {
    let mut child = command.spawn()?;

    let Some(timeout) = timeout else {
        return child.wait().map(ProcessOutcome::Exited);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ProcessOutcome::Exited(status));
        }
        if started.elapsed() >= timeout {
            warn!(
                program = ?command.get_program(),
                "process exceeded {:?}, killing",
                timeout
            );
            // kill fails only if the child already exited; wait reaps it either way
            let _ = child.kill();
            child.wait()?;
            return Ok(ProcessOutcome::TimedOut(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Human-readable exit code for error messages.
pub fn describe_status(status: &ExitStatus) -> String {
    status
        .code()
        .map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn exit_status_is_reported() {
        let outcome = run_with_timeout(
            Command::new("sh").args(["-c", "exit 3"]),
            Some(Duration::from_secs(10)),
        )
        .expect("spawn sh");
        match outcome {
            ProcessOutcome::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected exit, got {other:?}"),
        }
    }

    #[test]
    fn slow_process_is_killed() {
        let started = Instant::now();
        let outcome = run_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Some(Duration::from_millis(200)),
        )
        .expect("spawn sh");
        assert!(matches!(outcome, ProcessOutcome::TimedOut(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
