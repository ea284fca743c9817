use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{TexforgeError, TexforgeResult};
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Captured result of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Tool exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    /// Full standard output, lossily decoded.
    pub stdout: String,
    /// Full standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessOutcome {
    /// Return `true` for exit code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Sidecar file names written on timeout, preserving whatever output the
/// killed process had produced.
pub const TIMEOUT_STDOUT_SIDECAR: &str = "timeout.stdout.log";
/// See [`TIMEOUT_STDOUT_SIDECAR`].
pub const TIMEOUT_STDERR_SIDECAR: &str = "timeout.stderr.log";

/// Executes one external program with a wall-clock deadline and cooperative
/// cancellation.
///
/// Exit is polled at `poll_interval` rather than waited on, so a cancelled
/// request is noticed within one interval. On deadline the process is
/// force-killed and its drained output is written to sidecar files in the
/// working directory before the timeout fault is raised. No internal retry;
/// retry policy belongs to callers.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Wall-clock deadline for one invocation.
    pub timeout: Duration,
    /// Exit/cancellation poll granularity.
    pub poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ProcessRunner {
    /// Run `program` with `args` in `workdir`, overlaying `env` on the
    /// inherited environment.
    ///
    /// Checks cancellation before spawning (an already-cancelled request
    /// never starts a process) and after exit (a cancelled request surfaces
    /// as cancelled, not as a stale result).
    pub fn run<I, S>(
        &self,
        workdir: &Path,
        program: &Path,
        args: I,
        env: &[(OsString, OsString)],
        token: &CancelToken,
    ) -> TexforgeResult<ProcessOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        token.checkpoint()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(program, &e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_drain = std::thread::spawn(move || drain(stdout));
        let err_drain = std::thread::spawn(move || drain(stderr));

        let started = Instant::now();
        let status = loop {
            match child.try_wait().map_err(|e| {
                TexforgeError::from(anyhow::Error::new(e).context("failed to poll child process"))
            })? {
                Some(status) => break status,
                None => {
                    if token.is_cancelled() {
                        kill_and_reap(&mut child);
                        let _ = out_drain.join();
                        let _ = err_drain.join();
                        return Err(TexforgeError::Cancelled);
                    }
                    if started.elapsed() >= self.timeout {
                        kill_and_reap(&mut child);
                        let stdout_bytes = out_drain.join().unwrap_or_default();
                        let stderr_bytes = err_drain.join().unwrap_or_default();
                        write_sidecar(workdir, TIMEOUT_STDOUT_SIDECAR, &stdout_bytes);
                        write_sidecar(workdir, TIMEOUT_STDERR_SIDECAR, &stderr_bytes);
                        return Err(TexforgeError::Timeout {
                            program: program.display().to_string(),
                            timeout: self.timeout,
                        });
                    }
                    std::thread::sleep(self.poll_interval);
                }
            }
        };

        let stdout_bytes = out_drain.join().unwrap_or_default();
        let stderr_bytes = err_drain.join().unwrap_or_default();

        token.checkpoint()?;

        Ok(ProcessOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        })
    }
}

fn spawn_error(program: &Path, e: &std::io::Error) -> TexforgeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        // An explicit override is resolved without an existence check; this
        // is where a missing binary surfaces.
        return TexforgeError::BinaryNotFound {
            name: program.display().to_string(),
            detail: "the configured path does not exist or is not executable".into(),
        };
    }
    TexforgeError::from(anyhow::anyhow!(
        "failed to spawn '{}': {e}",
        program.display()
    ))
}

fn drain(stream: Option<impl Read>) -> Vec<u8> {
    let mut bytes = Vec::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_end(&mut bytes);
    }
    bytes
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn write_sidecar(workdir: &Path, name: &str, bytes: &[u8]) {
    if let Err(e) = std::fs::write(workdir.join(name), bytes) {
        tracing::warn!("failed to write timeout sidecar '{name}': {e}");
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::foundation::cancel::CancelSource;
    use std::os::unix::fs::PermissionsExt;

    fn fast_runner() -> ProcessRunner {
        ProcessRunner {
            timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        }
    }

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn captures_exit_code_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "ok.sh", "echo out; echo err >&2; exit 3");
        let outcome = ProcessRunner::default()
            .run(dir.path(), &bin, Vec::<&str>::new(), &[], &CancelToken::never())
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");
    }

    #[test]
    fn cancelled_before_spawn_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let bin = script(
            dir.path(),
            "mark.sh",
            &format!("touch {}", marker.display()),
        );
        let src = CancelSource::new();
        src.cancel();
        let err = ProcessRunner::default()
            .run(dir.path(), &bin, Vec::<&str>::new(), &[], &src.token())
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!marker.exists());
    }

    #[test]
    fn timeout_kills_and_preserves_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "hang.sh", "echo partial\nexec sleep 30");
        let runner = fast_runner();

        let started = Instant::now();
        let err = runner
            .run(dir.path(), &bin, Vec::<&str>::new(), &[], &CancelToken::never())
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, TexforgeError::Timeout { .. }));
        // Deadline plus a few poll intervals, never the child's 30s sleep.
        assert!(elapsed < runner.timeout + Duration::from_secs(2));

        let sidecar = dir.path().join(TIMEOUT_STDOUT_SIDECAR);
        let contents = std::fs::read_to_string(sidecar).unwrap();
        assert!(contents.contains("partial"));
        assert!(dir.path().join(TIMEOUT_STDERR_SIDECAR).exists());
    }

    #[test]
    fn cancel_during_run_surfaces_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "hang.sh", "exec sleep 30");
        let src = CancelSource::new();
        let token = src.token();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            src.cancel();
        });

        let started = Instant::now();
        let err = ProcessRunner::default()
            .run(dir.path(), &bin, Vec::<&str>::new(), &[], &token)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn missing_program_maps_to_binary_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProcessRunner::default()
            .run(
                dir.path(),
                Path::new("/nonexistent/texforge-no-such-tool"),
                Vec::<&str>::new(),
                &[],
                &CancelToken::never(),
            )
            .unwrap_err();
        assert!(matches!(err, TexforgeError::BinaryNotFound { .. }));
    }

    #[test]
    fn env_overlay_reaches_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "env.sh", "printf '%s' \"$TEXFORGE_PROBE\"");
        let env = [(
            OsString::from("TEXFORGE_PROBE"),
            OsString::from("overlaid"),
        )];
        let outcome = ProcessRunner::default()
            .run(dir.path(), &bin, Vec::<&str>::new(), &env, &CancelToken::never())
            .unwrap();
        assert_eq!(outcome.stdout, "overlaid");
    }
}
