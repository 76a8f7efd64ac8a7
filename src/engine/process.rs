//! External process runner.
//!
//! `run` always produces exactly one `RunResult`. Spawn failures, timeouts and
//! cancellation are folded into a non-zero exit code plus a stderr explanation,
//! so callers never see a raw process error.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long to keep reading pipes after the child is gone. A killed process can
/// leave descendants holding the write ends open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One external invocation. Built fresh per call.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: OsString,
    pub args: Vec<OsString>,
    pub cancel: Option<CancellationToken>,
    /// `None` or zero disables the timer.
    pub timeout: Option<Duration>,
}

impl RunRequest {
    pub fn new<C, I, S>(command: C, args: I) -> Self
    where
        C: Into<OsString>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            cancel: None,
            timeout: None,
        }
    }

    pub fn cancel_on(mut self, token: &CancellationToken) -> Self {
        self.cancel = Some(token.clone());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Set only when the cancellation token stopped this run (before spawn or
    /// by killing the child). A child that exited on its own never sets it.
    pub cancelled: bool,
}

impl RunResult {
    fn failed(stderr: impl Into<String>) -> Self {
        Self {
            code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
            cancelled: false,
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Which of the racing branches settled the run.
enum Settle {
    Exited(std::io::Result<std::process::ExitStatus>),
    Killed(KillReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillReason {
    TimedOut,
    Cancelled,
}

/// Launch `req.command`, capture its output and wait for it under the optional
/// timeout and cancellation token.
pub async fn run(req: RunRequest) -> RunResult {
    let RunRequest {
        command,
        args,
        cancel,
        timeout,
    } = req;

    if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        return RunResult {
            cancelled: true,
            ..RunResult::failed("Cancelled.")
        };
    }

    tracing::debug!(command = ?command, args = ?args, "spawning process");

    let spawned = Command::new(&command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(command = ?command, error = %e, "spawn failed");
            return RunResult::failed(e.to_string());
        }
    };

    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let timeout = timeout.filter(|d| !d.is_zero());
    let timer = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => futures::future::pending::<()>().await,
        }
    };
    let cancelled = async {
        match cancel.as_ref() {
            Some(c) => c.cancelled().await,
            None => futures::future::pending::<()>().await,
        }
    };

    // Only one branch can win; the losing timer and listener futures are dropped
    // with the select, which is what unregisters them.
    let settle = tokio::select! {
        biased;
        status = child.wait() => Settle::Exited(status),
        _ = cancelled => Settle::Killed(KillReason::Cancelled),
        _ = timer => Settle::Killed(KillReason::TimedOut),
    };

    let (status, killed_by) = match settle {
        Settle::Exited(status) => (status, None),
        Settle::Killed(reason) => (kill_and_reap(&mut child).await, Some(reason)),
    };

    let stdout = drain(stdout_reader).await;
    let mut stderr = drain(stderr_reader).await;

    let code = match status {
        Ok(s) => s.code().unwrap_or(1),
        Err(e) => {
            return RunResult {
                code: 1,
                stdout,
                stderr: e.to_string(),
                cancelled: killed_by == Some(KillReason::Cancelled),
            };
        }
    };

    match killed_by {
        Some(KillReason::Cancelled) => {
            tracing::warn!(command = ?command, "process cancelled");
            stderr = format!("{stderr}\nCancelled.").trim().to_string();
        }
        Some(KillReason::TimedOut) => {
            let secs = timeout.map(|d| d.as_secs_f64().round() as u64).unwrap_or(0);
            tracing::warn!(command = ?command, secs, "process timed out");
            stderr = format!("{stderr}\nTimed out after {secs}s.").trim().to_string();
        }
        None => {}
    }

    RunResult {
        // A signal-killed child has no code; the kill path must still read as failure.
        code: if killed_by.is_some() && code == 0 { 1 } else { code },
        stdout,
        stderr,
        cancelled: killed_by == Some(KillReason::Cancelled),
    }
}

async fn kill_and_reap(
    child: &mut tokio::process::Child,
) -> std::io::Result<std::process::ExitStatus> {
    // start_kill sends SIGKILL on unix and TerminateProcess on windows.
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "kill failed; process probably already exited");
    }
    child.wait().await
}

/// Streams one pipe into a shared buffer so partial output survives an
/// abandoned drain.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

fn spawn_reader<R>(mut pipe: R) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    });
    PipeReader { buf, handle }
}

async fn drain(reader: Option<PipeReader>) -> String {
    let Some(PipeReader { buf, mut handle }) = reader else {
        return String::new();
    };
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle)
        .await
        .is_err()
    {
        handle.abort();
    }
    let bytes = buf.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}
