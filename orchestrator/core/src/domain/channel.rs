// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Channel Protocol
//!
//! Framing and state machine for one request/response exchange carried by a
//! single plain file shared between an agent and the coordinator.
//!
//! ```text
//!   Idle ──agent writes payload + REQUEST_END──▶ RequestPending
//!    ▲                                                │
//!    │ agent writes sentinel          coordinator writes payload + RESPONSE_END
//!    │                                                ▼
//!    └──────────────────────────────────────── ResponseReady
//! ```
//!
//! The agent is the only writer of requests and the only reader of responses;
//! the coordinator is the only reader of requests and the only writer of
//! responses. Every write is a whole-file replacement.
//!
//! [`ChannelTracker`] is the coordinator-side bookkeeping that guarantees a
//! request is dispatched to the handler exactly once.

use crate::domain::agent::AgentKind;
use async_trait::async_trait;
use thiserror::Error;

pub const REQUEST_END_MARKER: &str = "<<<END_THOUGHT>>>";
pub const RESPONSE_END_MARKER: &str = "<<<THOUGHT_COMPLETE>>>";

/// Response payload written when the coordinator shuts down with a request outstanding.
pub const CANCELLED_RESPONSE: &str = "<<<CANCELLED>>>";

/// Prefix of a response payload reporting a handler failure.
pub const ERROR_RESPONSE_PREFIX: &str = "<<<ERROR>>>";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Request cancelled by coordinator shutdown")]
    Cancelled,

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Timed out after {0:?} waiting for a response")]
    Timeout(std::time::Duration),

    #[error("Filesystem watch failed: {0}")]
    Watch(String),

    #[error("I/O error on channel {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Human-readable idle text written into a fresh or reset channel.
pub fn idle_sentinel(kind: AgentKind) -> String {
    match kind {
        AgentKind::General => format!(
            "This is your thinking channel. Write your request and end it with {}.\n",
            REQUEST_END_MARKER
        ),
        AgentKind::Gateway => format!(
            "This is the gateway thinking channel. Write your request and end it with {}.\n",
            REQUEST_END_MARKER
        ),
    }
}

fn is_sentinel(content: &str) -> bool {
    let trimmed = content.trim();
    [AgentKind::General, AgentKind::Gateway]
        .iter()
        .any(|kind| idle_sentinel(*kind).trim() == trimmed)
}

/// Terminal outcome carried by a response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelResponse {
    Completed(String),
    Failed(String),
    Cancelled,
}

impl ChannelResponse {
    pub fn into_result(self) -> Result<String, ChannelError> {
        match self {
            ChannelResponse::Completed(payload) => Ok(payload),
            ChannelResponse::Failed(reason) => Err(ChannelError::Handler(reason)),
            ChannelResponse::Cancelled => Err(ChannelError::Cancelled),
        }
    }
}

/// Logical state of a channel file, decoded from its full contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    RequestPending(String),
    ResponseReady(ChannelResponse),
}

impl ChannelState {
    pub fn is_request_pending(&self) -> bool {
        matches!(self, ChannelState::RequestPending(_))
    }
}

/// Decode a channel file.
///
/// An empty file or a sentinel is `Idle`. A file ending (trailing whitespace
/// ignored) with [`RESPONSE_END_MARKER`] is `ResponseReady`. A file containing
/// [`REQUEST_END_MARKER`] is `RequestPending` and its payload is the text
/// before the first marker. Anything else is a protocol violation; callers
/// treat it as idle.
pub fn parse_channel(content: &str) -> Result<ChannelState, ChannelError> {
    if content.trim().is_empty() || is_sentinel(content) {
        return Ok(ChannelState::Idle);
    }

    if let Some(body) = content.trim_end().strip_suffix(RESPONSE_END_MARKER) {
        return Ok(ChannelState::ResponseReady(decode_response(body)));
    }

    if let Some(idx) = content.find(REQUEST_END_MARKER) {
        return Ok(ChannelState::RequestPending(content[..idx].to_string()));
    }

    Err(ChannelError::ProtocolViolation(format!(
        "frame of {} bytes has no end marker",
        content.len()
    )))
}

fn decode_response(body: &str) -> ChannelResponse {
    if body == CANCELLED_RESPONSE {
        ChannelResponse::Cancelled
    } else if let Some(reason) = body.strip_prefix(ERROR_RESPONSE_PREFIX) {
        ChannelResponse::Failed(reason.trim_start().to_string())
    } else {
        ChannelResponse::Completed(body.to_string())
    }
}

/// Neutralize every control token inside response data (`<<<` becomes `<<\<`)
/// so handler output can never terminate the frame early or pose as a
/// cancellation/error frame.
pub fn escape_payload(payload: &str) -> String {
    payload.replace("<<<", "<<\\<")
}

pub fn encode_request(payload: &str) -> String {
    format!("{}{}", payload, REQUEST_END_MARKER)
}

pub fn encode_response(response: &ChannelResponse) -> String {
    let body = match response {
        ChannelResponse::Completed(payload) => escape_payload(payload),
        ChannelResponse::Failed(reason) => {
            format!("{} {}", ERROR_RESPONSE_PREFIX, escape_payload(reason))
        }
        ChannelResponse::Cancelled => CANCELLED_RESPONSE.to_string(),
    };
    format!("{}{}", body, RESPONSE_END_MARKER)
}

/// What the monitor should do after observing a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A fresh request: invoke the handler with this payload.
    Dispatch(String),
    /// A request is in flight or the read predates the last completion.
    Busy,
    /// Nothing to do.
    Quiet,
}

/// Coordinator-side bookkeeping for one channel.
///
/// `epoch` advances every time a response is written. Reads are tagged with
/// the epoch current when they started; a read that started before the last
/// completion may still show the old request and is discarded.
#[derive(Debug, Default, Clone)]
pub struct ChannelTracker {
    in_flight: bool,
    epoch: u64,
    dispatched: u64,
}

impl ChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn observe(&mut self, read_epoch: u64, state: &ChannelState) -> Observation {
        if read_epoch != self.epoch {
            return Observation::Busy;
        }
        match state {
            ChannelState::RequestPending(payload) => {
                if self.in_flight {
                    Observation::Busy
                } else {
                    self.in_flight = true;
                    self.dispatched += 1;
                    Observation::Dispatch(payload.clone())
                }
            }
            _ if self.in_flight => Observation::Busy,
            _ => Observation::Quiet,
        }
    }

    /// The response for the in-flight request is on disk.
    pub fn complete(&mut self) {
        self.in_flight = false;
        self.epoch += 1;
    }

    /// The in-flight request was abandoned without a response; it may be dispatched again.
    pub fn abandon(&mut self) {
        self.in_flight = false;
    }
}

/// Pluggable processor for completed requests (the "thinking" subsystem).
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, agent: &str, request: String) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_idle_states() {
        assert_eq!(parse_channel("").unwrap(), ChannelState::Idle);
        assert_eq!(
            parse_channel(&idle_sentinel(AgentKind::General)).unwrap(),
            ChannelState::Idle
        );
        assert_eq!(
            parse_channel(&idle_sentinel(AgentKind::Gateway)).unwrap(),
            ChannelState::Idle
        );
    }

    #[test]
    fn test_parse_request_takes_text_before_marker() {
        let state = parse_channel(&encode_request("{\"q\":\"2+2\"}")).unwrap();
        assert_eq!(state, ChannelState::RequestPending("{\"q\":\"2+2\"}".to_string()));

        let trailing = format!("hello{}junk", REQUEST_END_MARKER);
        assert_eq!(
            parse_channel(&trailing).unwrap(),
            ChannelState::RequestPending("hello".to_string())
        );
    }

    #[test]
    fn test_parse_response_variants() {
        let done = encode_response(&ChannelResponse::Completed("{\"a\":\"4\"}".into()));
        assert_eq!(
            parse_channel(&done).unwrap(),
            ChannelState::ResponseReady(ChannelResponse::Completed("{\"a\":\"4\"}".into()))
        );

        let cancelled = encode_response(&ChannelResponse::Cancelled);
        assert_eq!(
            parse_channel(&cancelled).unwrap(),
            ChannelState::ResponseReady(ChannelResponse::Cancelled)
        );

        let failed = encode_response(&ChannelResponse::Failed("model offline".into()));
        assert_eq!(
            parse_channel(&failed).unwrap(),
            ChannelState::ResponseReady(ChannelResponse::Failed("model offline".into()))
        );
    }

    #[test]
    fn test_missing_marker_is_protocol_violation() {
        let result = parse_channel("half a thought");
        assert!(matches!(result, Err(ChannelError::ProtocolViolation(_))));
    }

    #[test]
    fn test_embedded_markers_are_neutralized() {
        let sneaky = format!("before{}after{}tail", RESPONSE_END_MARKER, REQUEST_END_MARKER);
        let framed = encode_response(&ChannelResponse::Completed(sneaky));

        assert_eq!(framed.matches(RESPONSE_END_MARKER).count(), 1);
        assert!(!framed.contains(REQUEST_END_MARKER));
        match parse_channel(&framed).unwrap() {
            ChannelState::ResponseReady(ChannelResponse::Completed(body)) => {
                assert!(body.starts_with("before"));
                assert!(body.ends_with("tail"));
            }
            other => panic!("expected completed response, got {:?}", other),
        }
    }

    #[test]
    fn test_tracker_dispatches_once_per_request() {
        let mut tracker = ChannelTracker::new();
        let pending = ChannelState::RequestPending("x".into());

        let epoch = tracker.epoch();
        assert_eq!(tracker.observe(epoch, &pending), Observation::Dispatch("x".into()));
        assert_eq!(tracker.observe(epoch, &pending), Observation::Busy);

        tracker.complete();
        // A read that started before completion still shows the request.
        assert_eq!(tracker.observe(epoch, &pending), Observation::Busy);

        let fresh = tracker.epoch();
        let ready = ChannelState::ResponseReady(ChannelResponse::Completed("y".into()));
        assert_eq!(tracker.observe(fresh, &ready), Observation::Quiet);
        assert_eq!(tracker.observe(fresh, &pending), Observation::Dispatch("x".into()));
        assert_eq!(tracker.dispatched(), 2);
    }

    #[test]
    fn test_abandon_allows_redispatch() {
        let mut tracker = ChannelTracker::new();
        let pending = ChannelState::RequestPending("x".into());
        let epoch = tracker.epoch();
        assert!(matches!(tracker.observe(epoch, &pending), Observation::Dispatch(_)));
        tracker.abandon();
        assert!(matches!(tracker.observe(epoch, &pending), Observation::Dispatch(_)));
    }

    /// Steps of a simulated agent/coordinator interleaving.
    #[derive(Debug, Clone)]
    enum Step {
        AgentWrite,
        AgentReset,
        Observe,
        StaleObserve,
        Complete,
    }

    fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::AgentWrite),
            Just(Step::AgentReset),
            Just(Step::Observe),
            Just(Step::StaleObserve),
            Just(Step::Complete),
        ]
    }

    proptest! {
        #[test]
        fn prop_handler_invocations_match_completed_cycles(
            steps in prop::collection::vec(arb_step(), 1..200)
        ) {
            let mut tracker = ChannelTracker::new();
            let mut file = ChannelState::Idle;
            let mut written_requests: u64 = 0;
            let mut completed_cycles: u64 = 0;
            let mut stale: Option<(u64, ChannelState)> = None;

            for step in steps {
                match step {
                    Step::AgentWrite => {
                        // Agents only write a new request from Idle.
                        if file == ChannelState::Idle {
                            written_requests += 1;
                            file = ChannelState::RequestPending(format!("req-{}", written_requests));
                        }
                    }
                    Step::AgentReset => {
                        if matches!(file, ChannelState::ResponseReady(_)) {
                            file = ChannelState::Idle;
                        }
                    }
                    Step::Observe => {
                        let epoch = tracker.epoch();
                        stale = Some((epoch, file.clone()));
                        tracker.observe(epoch, &file);
                    }
                    Step::StaleObserve => {
                        if let Some((epoch, snapshot)) = stale.take() {
                            tracker.observe(epoch, &snapshot);
                        }
                    }
                    Step::Complete => {
                        if tracker.is_in_flight() {
                            file = ChannelState::ResponseReady(
                                ChannelResponse::Completed("ok".into()),
                            );
                            tracker.complete();
                            completed_cycles += 1;
                        }
                    }
                }
                let outstanding = u64::from(tracker.is_in_flight());
                prop_assert_eq!(tracker.dispatched(), completed_cycles + outstanding);
                prop_assert!(tracker.dispatched() <= written_requests);
            }
        }
    }
}
