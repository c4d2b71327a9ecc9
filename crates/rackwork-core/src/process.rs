// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for running external commands with their output bound to a log.

use std::process::Stdio;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::object_store::LogWriter;

/// Run a command, streaming stdout and stderr to `out`.
pub async fn stream(cmd: &mut Command, out: &LogWriter) -> Result<()> {
    run(cmd, out, None, false, false).await.map(|_| ())
}

/// Run a command with `input` on stdin, streaming both outputs to `out`.
pub async fn stream_with_input(cmd: &mut Command, input: &[u8], out: &LogWriter) -> Result<()> {
    run(cmd, out, Some(input), false, false).await.map(|_| ())
}

/// Run a command, streaming both outputs and relaying SIGINT/SIGTERM
/// received by this process to the child.
pub async fn stream_forwarding_signals(cmd: &mut Command, out: &LogWriter) -> Result<()> {
    run(cmd, out, None, false, true).await.map(|_| ())
}

/// Run a command, returning stdout and streaming stderr to `out`.
pub async fn capture(cmd: &mut Command, out: &LogWriter) -> Result<String> {
    run(cmd, out, None, true, false).await
}

async fn run(
    cmd: &mut Command,
    out: &LogWriter,
    input: Option<&[u8]>,
    capture_stdout: bool,
    forward_signals: bool,
) -> Result<String> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    cmd.stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        Error::Other(format!("failed to start {}: {}", program, e))
    })?;
    debug!(program = %program, pid = ?child.id(), "Started command");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Other(format!("{}: stdout not captured", program)))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Other(format!("{}: stderr not captured", program)))?;

    let stdout_task = {
        let out = out.clone();
        tokio::spawn(async move {
            if capture_stdout {
                collect(stdout).await
            } else {
                pump(stdout, &out).await.map(|_| Vec::new())
            }
        })
    };
    let stderr_task = {
        let out = out.clone();
        tokio::spawn(async move { pump(stderr, &out).await })
    };

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(input).await?;
        // Dropping the handle closes the pipe so the child sees EOF.
        drop(stdin);
    }

    let status = if forward_signals {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let pid = child.id().map(|id| Pid::from_raw(id as i32));

        loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = interrupt.recv() => relay(pid, Signal::SIGINT),
                _ = terminate.recv() => relay(pid, Signal::SIGTERM),
            }
        }
    } else {
        child.wait().await?
    };

    let stdout = stdout_task
        .await
        .map_err(|e| Error::Other(format!("{}: output task failed: {}", program, e)))??;
    stderr_task
        .await
        .map_err(|e| Error::Other(format!("{}: output task failed: {}", program, e)))??;

    if !status.success() {
        return Err(Error::ProcessFailed {
            program,
            status: status.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn relay(pid: Option<Pid>, sig: Signal) {
    if let Some(pid) = pid {
        info!(pid = %pid, signal = %sig, "Forwarding signal to child");
        // The child may already be gone; its exit status is reported by wait.
        let _ = kill(pid, sig);
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, out: &LogWriter) -> Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.write(&buf[..n]).await?;
    }
}

async fn collect<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(data)
}

/// Join arguments into a single shell-safe command line.
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;
    use std::sync::Arc;

    #[test]
    fn test_shell_join() {
        assert_eq!(shell_join(&["rack", "install", "abc-123"]), "rack install abc-123");
        assert_eq!(shell_join(&["echo", "a b", ""]), "echo 'a b' ''");
        assert_eq!(shell_join(&["it's"]), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_stream_writes_both_outputs() {
        let store = Arc::new(MemoryObjectStore::new());
        let out = LogWriter::new(store.clone(), "log");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2"]);
        stream(&mut cmd, &out).await.unwrap();

        let text = store.text("log");
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
    }

    #[tokio::test]
    async fn test_capture_returns_stdout_only() {
        let store = Arc::new(MemoryObjectStore::new());
        let out = LogWriter::new(store.clone(), "log");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo '{\"ok\":true}'; echo warning 1>&2"]);
        let stdout = capture(&mut cmd, &out).await.unwrap();

        assert_eq!(stdout.trim(), "{\"ok\":true}");
        assert_eq!(store.text("log"), "warning\n");
    }

    #[tokio::test]
    async fn test_stream_with_input() {
        let store = Arc::new(MemoryObjectStore::new());
        let out = LogWriter::new(store.clone(), "log");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "tr a-z A-Z"]);
        stream_with_input(&mut cmd, b"FOO=bar\n", &out).await.unwrap();

        assert_eq!(store.text("log"), "FOO=BAR\n");
    }

    #[tokio::test]
    async fn test_failure_status_is_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let err = stream(&mut cmd, &LogWriter::discard()).await.unwrap_err();
        assert!(matches!(err, Error::ProcessFailed { ref program, .. } if program == "sh"));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let mut cmd = Command::new("definitely-not-a-real-binary");
        assert!(stream(&mut cmd, &LogWriter::discard()).await.is_err());
    }
}
