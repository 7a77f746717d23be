//! Drives a worker binary as a child process over the line protocol.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::worker::protocol::{Command as ControlCommand, Reply};

#[derive(Serialize)]
struct Control {
    cmd: ControlCommand,
}

/// A running worker process. One request is in flight at a time, enforced by `&mut self`.
pub struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    /// Spawns `program` with piped stdin/stdout; its stderr (logs) is inherited.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start worker {}", program.to_string_lossy()))?;
        let stdin = child.stdin.take().context("Worker stdin is not piped")?;
        let stdout = child.stdout.take().context("Worker stdout is not piped")?;
        debug!("Started worker {} (pid {})", program.to_string_lossy(), child.id());

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    /// Sends one request and waits for its reply.
    pub fn request<Req, Resp>(&mut self, request: &Req) -> Result<Reply<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let line = serde_json::to_string(request).context("Failed to encode request")?;
        let reply = self.exchange(&line)?;
        serde_json::from_str(&reply).with_context(|| format!("Unexpected worker reply: {reply}"))
    }

    /// Sends the control signal and waits for the acknowledgment and the process exit.
    pub fn shutdown(mut self) -> Result<ExitStatus> {
        let ack: Reply<serde_json::Value> = self.request(&Control {
            cmd: ControlCommand::Shutdown,
        })?;
        if ack != Reply::ack() {
            bail!("Worker did not acknowledge shutdown: {ack:?}");
        }
        self.stdin.take();
        self.child.wait().context("Failed to wait for worker exit")
    }

    fn exchange(&mut self, line: &str) -> Result<String> {
        let stdin = self.stdin.as_mut().context("Worker stdin is closed")?;
        writeln!(stdin, "{line}").context("Failed to send request to worker")?;
        stdin.flush().context("Failed to send request to worker")?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .context("Failed to read worker reply")?;
        if read == 0 {
            bail!("Worker closed its output");
        }
        Ok(reply.trim_end().to_string())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        let Some(mut stdin) = self.stdin.take() else {
            return;
        };
        if let Ok(line) = serde_json::to_string(&Control {
            cmd: ControlCommand::Shutdown,
        }) {
            writeln!(stdin, "{line}").ok();
        }
        drop(stdin);
        if let Err(err) = self.child.kill() {
            warn!("Failed to stop worker: {err}");
        }
        self.child.wait().ok();
    }
}
