// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Channel Monitor
//!
//! One loop per coordinator covering every watched channel file. Each pass
//! reads all idle channels on the blocking pool, advances each channel's
//! [`ChannelTracker`], and spawns an independent task per fresh request so a
//! slow handler never stalls the other channels.
//!
//! Strategies share this loop and differ only in what wakes it:
//! - **Polling**: a two-speed ticker, `busy_interval` while any channel has a
//!   request pending or in flight, `idle_interval` otherwise.
//! - **Event-driven**: filesystem notifications on each agent's channel
//!   directory, with a slow safety poll behind them.
//!
//! On shutdown every channel still holding an unanswered request receives a
//! cancellation response so the agent's wait loop unblocks.

use super::watcher::ChannelWatcher;
use crate::domain::channel::{
    encode_response, parse_channel, ChannelError, ChannelHandler, ChannelResponse, ChannelState,
    ChannelTracker, Observation,
};
use crate::domain::config::{MonitorConfig, MonitorStrategy};
use crate::domain::events::ChannelEvent;
use crate::domain::sandbox::THINKING_CHANNEL;
use crate::infrastructure::atomic_file::write_atomic;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Idle safety poll in event-driven mode, as a multiple of `idle_interval`.
const EVENT_SAFETY_FACTOR: u32 = 10;

struct WatchedChannel {
    path: PathBuf,
    handler: Arc<dyn ChannelHandler>,
    tracker: ChannelTracker,
    /// Serializes coordinator-side writes to this channel.
    gate: Arc<Mutex<()>>,
    task: Option<JoinHandle<()>>,
    violation_reported: bool,
}

type ChannelTable = Arc<Mutex<HashMap<String, WatchedChannel>>>;

pub struct ChannelMonitor {
    channels: ChannelTable,
    config: MonitorConfig,
    event_bus: EventBus,
    watcher: Option<ChannelWatcher>,
    events: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    wake: Arc<Notify>,
    closing: Arc<AtomicBool>,
}

impl ChannelMonitor {
    pub fn new(config: MonitorConfig, event_bus: EventBus) -> Result<Self, ChannelError> {
        let (watcher, events) = match config.strategy {
            MonitorStrategy::Poll => (None, None),
            MonitorStrategy::Event => {
                let (watcher, rx) = ChannelWatcher::new(THINKING_CHANNEL)
                    .map_err(|e| ChannelError::Watch(e.to_string()))?;
                (Some(watcher), Some(rx))
            }
            MonitorStrategy::Auto => match ChannelWatcher::new(THINKING_CHANNEL) {
                Ok((watcher, rx)) => (Some(watcher), Some(rx)),
                Err(e) => {
                    warn!(error = %e, "Filesystem notifications unavailable, falling back to polling");
                    (None, None)
                }
            },
        };

        Ok(Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            config,
            event_bus,
            watcher,
            events: Mutex::new(events),
            wake: Arc::new(Notify::new()),
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_event_driven(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start (or re-point) monitoring of an agent's channel file.
    pub fn watch(
        &self,
        agent: &str,
        path: impl Into<PathBuf>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<(), ChannelError> {
        let path = path.into();
        if let (Some(watcher), Some(dir)) = (&self.watcher, path.parent()) {
            watcher
                .watch_dir(dir)
                .map_err(|e| ChannelError::Watch(format!("{}: {}", dir.display(), e)))?;
        }

        {
            let mut channels = self.channels.lock();
            match channels.get_mut(agent) {
                Some(existing) => {
                    existing.path = path.clone();
                    existing.handler = handler;
                }
                None => {
                    channels.insert(
                        agent.to_string(),
                        WatchedChannel {
                            path: path.clone(),
                            handler,
                            tracker: ChannelTracker::new(),
                            gate: Arc::new(Mutex::new(())),
                            task: None,
                            violation_reported: false,
                        },
                    );
                }
            }
        }

        info!(agent = %agent, path = %path.display(), "Watching channel");
        self.wake.notify_one();
        Ok(())
    }

    /// Stop monitoring. An in-flight handler is aborted; its request stays
    /// pending on disk and is dispatched again if the agent is re-watched.
    pub fn unwatch(&self, agent: &str) -> bool {
        let removed = self.channels.lock().remove(agent);
        let Some(channel) = removed else {
            return false;
        };

        if let Some(task) = channel.task {
            task.abort();
        }
        if let (Some(watcher), Some(dir)) = (&self.watcher, channel.path.parent()) {
            watcher.unwatch_dir(dir);
        }
        info!(agent = %agent, "Stopped watching channel");
        true
    }

    pub fn is_watching(&self, agent: &str) -> bool {
        self.channels.lock().contains_key(agent)
    }

    pub fn watched_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.channels.lock().keys().cloned().collect();
        agents.sort();
        agents
    }

    /// Handler invocations started for this agent since it was watched.
    pub fn dispatched_count(&self, agent: &str) -> Option<u64> {
        self.channels
            .lock()
            .get(agent)
            .map(|channel| channel.tracker.dispatched())
    }

    /// One pass over every watched channel. Returns true while any channel is busy.
    pub async fn tick(&self) -> bool {
        if self.closing.load(Ordering::SeqCst) {
            return false;
        }

        let (targets, mut busy) = {
            let channels = self.channels.lock();
            let mut busy = false;
            let mut targets = Vec::with_capacity(channels.len());
            for (agent, channel) in channels.iter() {
                if channel.tracker.is_in_flight() {
                    busy = true;
                } else {
                    // The epoch is taken before the read starts.
                    targets.push((agent.clone(), channel.path.clone(), channel.tracker.epoch()));
                }
            }
            (targets, busy)
        };

        if targets.is_empty() {
            return busy;
        }

        let reads = match tokio::task::spawn_blocking(move || {
            targets
                .into_iter()
                .map(|(agent, path, epoch)| {
                    let read = std::fs::read_to_string(&path);
                    (agent, epoch, read)
                })
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(reads) => reads,
            Err(e) => {
                warn!(error = %e, "Channel read task failed");
                return true;
            }
        };

        for (agent, epoch, read) in reads {
            let content = match read {
                Ok(content) => content,
                Err(e) => {
                    warn!(agent = %agent, error = %e, "Failed to read channel");
                    continue;
                }
            };
            let parsed = parse_channel(&content);

            let mut channels = self.channels.lock();
            let Some(channel) = channels.get_mut(&agent) else {
                continue;
            };

            let state = match parsed {
                Ok(state) => {
                    channel.violation_reported = false;
                    state
                }
                Err(e) => {
                    if !channel.violation_reported {
                        warn!(agent = %agent, error = %e, "Malformed channel frame, treating as idle");
                        self.event_bus
                            .publish_channel_event(ChannelEvent::ProtocolViolation {
                                agent: agent.clone(),
                                detail: e.to_string(),
                            });
                        channel.violation_reported = true;
                    }
                    ChannelState::Idle
                }
            };

            match channel.tracker.observe(epoch, &state) {
                Observation::Dispatch(payload) => {
                    busy = true;
                    let task = self.dispatch(&agent, channel, payload);
                    channel.task = Some(task);
                }
                Observation::Busy => busy = true,
                Observation::Quiet => busy |= state.is_request_pending(),
            }
        }

        busy
    }

    fn dispatch(&self, agent: &str, channel: &WatchedChannel, payload: String) -> JoinHandle<()> {
        debug!(agent = %agent, bytes = payload.len(), "Dispatching channel request");
        self.event_bus
            .publish_channel_event(ChannelEvent::RequestDispatched {
                agent: agent.to_string(),
                request_bytes: payload.len(),
                dispatched_at: Utc::now(),
            });

        let exchange = Exchange {
            agent: agent.to_string(),
            path: channel.path.clone(),
            handler: channel.handler.clone(),
            gate: channel.gate.clone(),
            channels: self.channels.clone(),
            event_bus: self.event_bus.clone(),
            closing: self.closing.clone(),
            wake: self.wake.clone(),
        };
        tokio::spawn(exchange.serve(payload))
    }

    /// Drive the monitor until `shutdown` fires, then cancel outstanding requests.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ChannelError> {
        let mut events = self.events.lock().take();
        info!(
            strategy = ?self.config.strategy,
            event_driven = events.is_some(),
            "Channel monitor started"
        );

        loop {
            let busy = self.tick().await;
            let interval = if busy {
                self.config.busy_interval
            } else if events.is_some() {
                self.config.idle_interval * EVENT_SAFETY_FACTOR
            } else {
                self.config.idle_interval
            };

            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => None,
                _ = self.wake.notified() => None,
                alive = next_event(&mut events) => Some(alive),
            };

            if event == Some(false) {
                warn!("Filesystem watcher stopped, continuing with polling");
                events = None;
            }
        }

        let cancelled = self.cancel_pending().await;
        info!(cancelled, "Channel monitor stopped");
        Ok(())
    }

    /// Abort in-flight handlers and answer every pending request with a
    /// cancellation. No request is dispatched afterwards.
    pub async fn cancel_pending(&self) -> usize {
        self.closing.store(true, Ordering::SeqCst);

        let targets: Vec<(String, PathBuf, Arc<Mutex<()>>)> = {
            let mut channels = self.channels.lock();
            channels
                .iter_mut()
                .map(|(agent, channel)| {
                    if let Some(task) = channel.task.take() {
                        task.abort();
                    }
                    channel.tracker.abandon();
                    (agent.clone(), channel.path.clone(), channel.gate.clone())
                })
                .collect()
        };

        let results = match tokio::task::spawn_blocking(move || {
            targets
                .into_iter()
                .map(|(agent, path, gate)| {
                    let result = cancel_if_pending(&path, &gate);
                    (agent, result)
                })
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Cancellation task failed");
                return 0;
            }
        };

        let mut cancelled = 0;
        for (agent, result) in results {
            match result {
                Ok(true) => {
                    cancelled += 1;
                    info!(agent = %agent, "Pending request cancelled");
                    self.event_bus
                        .publish_channel_event(ChannelEvent::RequestCancelled {
                            agent,
                            cancelled_at: Utc::now(),
                        });
                }
                Ok(false) => {}
                Err(e) => warn!(agent = %agent, error = %e, "Failed to write cancellation"),
            }
        }
        cancelled
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<()>>) -> bool {
    match events {
        Some(rx) => {
            let alive = rx.recv().await.is_some();
            // Coalesce a burst into one pass.
            while rx.try_recv().is_ok() {}
            alive
        }
        None => std::future::pending().await,
    }
}

fn cancel_if_pending(path: &Path, gate: &Mutex<()>) -> io::Result<bool> {
    let _gate = gate.lock();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    match parse_channel(&content) {
        Ok(ChannelState::RequestPending(_)) => {
            write_atomic(path, encode_response(&ChannelResponse::Cancelled).as_bytes())?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Everything a spawned handler task needs to answer one request.
struct Exchange {
    agent: String,
    path: PathBuf,
    handler: Arc<dyn ChannelHandler>,
    gate: Arc<Mutex<()>>,
    channels: ChannelTable,
    event_bus: EventBus,
    closing: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl Exchange {
    async fn serve(self, payload: String) {
        let started = Instant::now();
        let response = match self.handler.handle(&self.agent, payload).await {
            Ok(output) => ChannelResponse::Completed(output),
            Err(e) => {
                warn!(agent = %self.agent, error = %format!("{:#}", e), "Channel handler failed");
                ChannelResponse::Failed(format!("{:#}", e))
            }
        };
        let failed = !matches!(response, ChannelResponse::Completed(_));
        let frame = encode_response(&response);
        let response_bytes = frame.len();

        let path = self.path.clone();
        let gate = self.gate.clone();
        let closing = self.closing.clone();
        let written = tokio::task::spawn_blocking(move || -> io::Result<bool> {
            let _gate = gate.lock();
            if closing.load(Ordering::SeqCst) {
                return Ok(false);
            }
            write_atomic(&path, frame.as_bytes())?;
            Ok(true)
        })
        .await
        .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));

        self.settle(written, failed, response_bytes, started.elapsed());
        self.wake.notify_one();
    }

    fn settle(&self, written: io::Result<bool>, failed: bool, response_bytes: usize, elapsed: Duration) {
        let mut channels = self.channels.lock();
        // The agent may have been unwatched, or unwatched and watched again.
        let channel = channels
            .get_mut(&self.agent)
            .filter(|channel| Arc::ptr_eq(&channel.gate, &self.gate));

        match written {
            Ok(true) => {
                if let Some(channel) = channel {
                    channel.tracker.complete();
                    channel.task = None;
                }
                drop(channels);
                debug!(agent = %self.agent, failed, elapsed_ms = elapsed.as_millis() as u64, "Channel response written");
                self.event_bus
                    .publish_channel_event(ChannelEvent::ResponseWritten {
                        agent: self.agent.clone(),
                        response_bytes,
                        failed,
                        duration_ms: elapsed.as_millis() as u64,
                        written_at: Utc::now(),
                    });
            }
            Ok(false) => {
                if let Some(channel) = channel {
                    channel.task = None;
                }
                debug!(agent = %self.agent, "Response dropped during shutdown");
            }
            Err(e) => {
                if let Some(channel) = channel {
                    channel.tracker.abandon();
                    channel.task = None;
                }
                warn!(agent = %self.agent, error = %e, "Failed to write channel response, will retry");
            }
        }
    }
}
