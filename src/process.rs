/// Child process wrapper
///
/// Owns one long-running service process: keeps a bounded tail of its stderr
/// (used only to diagnose startup failures), runs an optional per-line
/// classifier over that stream, and joins the OS exit event on stop.
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// Rolling stderr retention per process.
pub const STDERR_TAIL_LIMIT: usize = 8 * 1024;

pub struct ServiceProcess {
    service: &'static str,
    child: Child,
    pid: Option<u32>,
    stderr_tail: Arc<Mutex<String>>,
    flagged: Arc<AtomicBool>,
    stdout_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl ServiceProcess {
    /// Spawn the command with both output streams piped into the log sink.
    /// `classify` is run against every stderr line; a match latches the
    /// one-shot flag readable through [`stderr_flagged`](Self::stderr_flagged).
    pub fn spawn(
        service: &'static str,
        mut command: Command,
        classify: Option<fn(&str) -> bool>,
    ) -> std::io::Result<Self> {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = command.spawn()?;
        let pid = child.id();
        log::info!("Started {} (pid {:?})", service, pid);

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        let flagged = Arc::new(AtomicBool::new(false));

        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[{}] {}", service, line);
                }
            })
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&stderr_tail);
            let flag = Arc::clone(&flagged);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[{}] {}", service, line);
                    if let Some(classify) = classify {
                        if classify(&line) {
                            flag.store(true, Ordering::SeqCst);
                        }
                    }
                    if let Ok(mut buf) = tail.lock() {
                        buf.push_str(&line);
                        buf.push('\n');
                        if buf.len() > STDERR_TAIL_LIMIT {
                            // Drop the oldest text, keeping the most recent tail.
                            let excess = buf.len() - STDERR_TAIL_LIMIT;
                            let mut cut = excess;
                            while !buf.is_char_boundary(cut) {
                                cut += 1;
                            }
                            buf.drain(..cut);
                        }
                    }
                }
            })
        });

        Ok(Self {
            service,
            child,
            pid,
            stderr_tail,
            flagged,
            stdout_task,
            stderr_task,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True while the OS process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// The most recent stderr output (bounded).
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Whether the stderr classifier matched any line so far.
    pub fn stderr_flagged(&self) -> bool {
        self.flagged.load(Ordering::SeqCst)
    }

    /// Join the output-reader tasks so the tail and classifier flag reflect
    /// everything the process wrote. The pipes reach EOF at process exit;
    /// call this only after observing the exit.
    pub async fn drain_output(&mut self) {
        if let Some(task) = self.stdout_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
    }

    /// Request graceful termination, wait up to `grace`, then escalate to a
    /// forced kill. Resolves only once the OS exit event has fired.
    pub async fn stop(mut self, grace: Duration) -> std::io::Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            log::debug!("{} already exited ({})", self.service, status);
            return Ok(());
        }

        self.request_termination();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                log::info!("{} stopped ({})", self.service, status?);
                Ok(())
            }
            Err(_) => {
                log::warn!(
                    "{} did not exit within {:?}; killing it",
                    self.service,
                    grace
                );
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                log::info!("{} killed ({})", self.service, status);
                Ok(())
            }
        }
    }

    #[cfg(unix)]
    fn request_termination(&mut self) {
        if let Some(pid) = self.pid {
            // SAFETY: plain kill(2) on a pid we spawned and still own.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) {
        // No graceful signal available; the grace timer degenerates to a kill.
        let _ = self.child.start_kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_stderr_tail_and_flag() {
        let proc = ServiceProcess::spawn(
            "test-svc",
            sh("echo boom >&2; echo 'failed to open index' >&2"),
            Some(|line| line.contains("failed to open index")),
        )
        .unwrap();

        // Give the reader task a moment to drain the pipe.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(proc.stderr_tail().contains("boom"));
        assert!(proc.stderr_flagged());
    }

    #[tokio::test]
    async fn test_liveness_and_stop() {
        let mut proc = ServiceProcess::spawn("test-svc", sh("exec sleep 30"), None).unwrap();
        assert!(proc.is_alive());
        proc.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_after_exit_is_noop() {
        let mut proc = ServiceProcess::spawn("test-svc", sh("true"), None).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!proc.is_alive());
        proc.stop(Duration::from_millis(10)).await.unwrap();
    }
}
