// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The build/deploy CLI as seen by pipeline steps.
//!
//! Every invocation targets one rack through `RACK_URL` and echoes a
//! `$ convox ...` line into the step log before running, so task logs read
//! like a terminal session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use rackwork_core::LogWriter;
use rackwork_core::process;

use crate::error::{PipelineError, Result};

/// Runs CLI commands against a rack.
#[async_trait]
pub trait RackCli: Send + Sync {
    /// Run `args` against the rack at `rack_url`, streaming output to `out`.
    async fn run(
        &self,
        rack_url: &str,
        args: &[String],
        input: Option<&str>,
        out: &LogWriter,
    ) -> Result<()>;

    /// Run `args` and return stdout. Only stderr is written to `out`.
    async fn output(&self, rack_url: &str, args: &[String], out: &LogWriter) -> Result<String>;
}

/// The `convox` binary.
///
/// The child sees only `RACK_URL` and `PATH`; the program is looked up on
/// that `PATH`.
#[derive(Debug, Clone)]
pub struct ConvoxCli {
    program: String,
    path: String,
}

impl ConvoxCli {
    /// CLI at `program`, searched on this process's `PATH`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            path: std::env::var("PATH").unwrap_or_default(),
        }
    }

    /// Search `path` for the program instead of this process's `PATH`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn command(&self, rack_url: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env_clear()
            .env("PATH", &self.path)
            .env("RACK_URL", rack_url);
        cmd
    }
}

#[async_trait]
impl RackCli for ConvoxCli {
    async fn run(
        &self,
        rack_url: &str,
        args: &[String],
        input: Option<&str>,
        out: &LogWriter,
    ) -> Result<()> {
        out.writeln(&echo(args)).await?;

        let mut cmd = self.command(rack_url, args);
        match input {
            Some(input) => process::stream_with_input(&mut cmd, input.as_bytes(), out).await?,
            None => process::stream(&mut cmd, out).await?,
        }
        Ok(())
    }

    async fn output(&self, rack_url: &str, args: &[String], out: &LogWriter) -> Result<String> {
        out.writeln(&echo(args)).await?;

        let mut cmd = self.command(rack_url, args);
        Ok(process::capture(&mut cmd, out).await?)
    }
}

fn echo(args: &[String]) -> String {
    format!("$ convox {}", process::shell_join(args))
}

/// One recorded [`MockCli`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCall {
    /// Rack the command targeted.
    pub rack_url: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Stdin, if any.
    pub input: Option<String>,
}

/// Scripted CLI for tests.
///
/// Responses are matched by argument prefix in registration order; an
/// unmatched command succeeds with empty output.
#[derive(Clone, Default)]
pub struct MockCli {
    responses: Vec<(Vec<String>, std::result::Result<String, String>)>,
    calls: Arc<Mutex<Vec<CliCall>>>,
}

impl MockCli {
    /// CLI where every command succeeds silently.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` print `output`.
    pub fn respond(mut self, prefix: &[&str], output: &str) -> Self {
        self.responses
            .push((to_args(prefix), Ok(output.to_string())));
        self
    }

    /// Commands starting with `prefix` fail with `message`.
    pub fn fail(mut self, prefix: &[&str], message: &str) -> Self {
        self.responses
            .push((to_args(prefix), Err(message.to_string())));
        self
    }

    /// Invocations so far.
    pub async fn calls(&self) -> Vec<CliCall> {
        self.calls.lock().await.clone()
    }

    async fn invoke(
        &self,
        rack_url: &str,
        args: &[String],
        input: Option<&str>,
        out: &LogWriter,
    ) -> Result<String> {
        out.writeln(&echo(args)).await?;

        self.calls.lock().await.push(CliCall {
            rack_url: rack_url.to_string(),
            args: args.to_vec(),
            input: input.map(str::to_string),
        });

        let response = self
            .responses
            .iter()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, response)| response.clone());

        match response {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => {
                out.writeln(&message).await?;
                Err(PipelineError::Core(rackwork_core::Error::ProcessFailed {
                    program: "convox".to_string(),
                    status: "exit status: 1".to_string(),
                }))
            }
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl RackCli for MockCli {
    async fn run(
        &self,
        rack_url: &str,
        args: &[String],
        input: Option<&str>,
        out: &LogWriter,
    ) -> Result<()> {
        let output = self.invoke(rack_url, args, input, out).await?;
        out.write_str(&output).await?;
        Ok(())
    }

    async fn output(&self, rack_url: &str, args: &[String], out: &LogWriter) -> Result<String> {
        self.invoke(rack_url, args, None, out).await
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
