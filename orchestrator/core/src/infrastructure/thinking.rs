// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Thinking handlers
//!
//! The reasoning an agent performs inside a request lives outside the
//! coordinator. [`ProcessThinkingHandler`] reaches it by running a configured
//! command once per request; [`UnavailableHandler`] answers with an error
//! when none is configured so agents never wait forever.

use crate::domain::channel::ChannelHandler;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Environment variable naming the requesting agent for the child process.
pub const AGENT_ENV: &str = "COLONY_AGENT";

pub struct ProcessThinkingHandler {
    program: String,
    args: Vec<String>,
}

impl ProcessThinkingHandler {
    /// `command[0]` is the program, the rest are its arguments.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("thinking command must name a program")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl ChannelHandler for ProcessThinkingHandler {
    async fn handle(&self, agent: &str, request: String) -> Result<String> {
        debug!(agent = %agent, program = %self.program, "Running thinking command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(AGENT_ENV, agent)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start thinking command '{}'", self.program))?;

        // Feed stdin while draining stdout so large payloads cannot deadlock.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(request.as_bytes()).await {
                    // The child may exit without reading its input.
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                // Dropping stdin closes the pipe so the child sees EOF.
            }
            Ok(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.context("failed to write request to thinking command")?;
        let output = output.context("thinking command did not complete")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "thinking command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("thinking command produced non-UTF-8 output")
    }
}

/// Fails every request.
pub struct UnavailableHandler;

#[async_trait]
impl ChannelHandler for UnavailableHandler {
    async fn handle(&self, _agent: &str, _request: String) -> Result<String> {
        bail!("no thinking subsystem is configured for this coordinator")
    }
}
