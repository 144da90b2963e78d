// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent-side half of the thinking channel.
//!
//! Writes one request, waits for the coordinator's response frame, returns
//! the channel to its idle sentinel and hands back the payload. Response
//! payloads arrive with control tokens neutralized (`<<<` as `<<\<`).

use crate::domain::agent::AgentKind;
use crate::domain::channel::{
    encode_request, idle_sentinel, parse_channel, ChannelError, ChannelState, REQUEST_END_MARKER,
    RESPONSE_END_MARKER,
};
use crate::domain::config::ChannelConfig;
use crate::infrastructure::atomic_file::write_atomic_async;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ChannelClient {
    path: PathBuf,
    kind: AgentKind,
    poll_interval: Duration,
    response_timeout: Option<Duration>,
}

impl ChannelClient {
    pub fn new(path: impl Into<PathBuf>, kind: AgentKind) -> Self {
        let defaults = ChannelConfig::default();
        Self {
            path: path.into(),
            kind,
            poll_interval: defaults.poll_interval,
            response_timeout: defaults.response_timeout,
        }
    }

    pub fn from_config(path: impl Into<PathBuf>, kind: AgentKind, config: &ChannelConfig) -> Self {
        Self::new(path, kind)
            .with_poll_interval(config.poll_interval)
            .with_response_timeout(config.response_timeout)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` waits until the coordinator answers or cancels.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String, ChannelError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ChannelError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }

    async fn write(&self, contents: String) -> Result<(), ChannelError> {
        write_atomic_async(self.path.clone(), contents.into_bytes())
            .await
            .map_err(|source| ChannelError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Current state; malformed frames read as idle.
    pub async fn state(&self) -> Result<ChannelState, ChannelError> {
        let content = self.read().await?;
        Ok(parse_channel(&content).unwrap_or(ChannelState::Idle))
    }

    /// Put the idle sentinel back.
    pub async fn reset(&self) -> Result<(), ChannelError> {
        self.write(idle_sentinel(self.kind)).await
    }

    /// Send one request and wait for its response.
    ///
    /// On timeout the request is left in place; the coordinator may still
    /// answer it, and [`reset`](Self::reset) discards whatever is there.
    pub async fn request(&self, payload: &str) -> Result<String, ChannelError> {
        // The coordinator reads up to the first marker; anything after it would be lost.
        if let Some(marker) = [REQUEST_END_MARKER, RESPONSE_END_MARKER]
            .into_iter()
            .find(|m| payload.contains(m))
        {
            return Err(ChannelError::ProtocolViolation(format!(
                "request payload contains the frame marker {}",
                marker
            )));
        }

        match self.state().await? {
            ChannelState::Idle => {}
            ChannelState::RequestPending(_) => {
                return Err(ChannelError::ProtocolViolation(
                    "a request is already pending on this channel".to_string(),
                ))
            }
            ChannelState::ResponseReady(_) => {
                return Err(ChannelError::ProtocolViolation(
                    "the previous response has not been consumed".to_string(),
                ))
            }
        }

        self.write(encode_request(payload)).await?;
        debug!(path = %self.path.display(), bytes = payload.len(), "Channel request written");

        let started = Instant::now();
        loop {
            if let ChannelState::ResponseReady(response) = self.state().await? {
                self.reset().await?;
                return response.into_result();
            }

            if let Some(limit) = self.response_timeout {
                if started.elapsed() >= limit {
                    return Err(ChannelError::Timeout(limit));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
