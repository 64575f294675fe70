//! Event system for paginated sync runs.
//!
//! The orchestrator emits a [`SyncEvent`] for every log line, every completed task and the final
//! page report. Handlers registered with the [`EventDispatcher`] decide what to do with them: the
//! tracing handler mirrors them into the log, the channel forwarder streams them to a consumer.
//!
//! A forwarder whose consumer has gone away reports [`TrackerError::Cancelled`]. The dispatcher
//! records that instead of failing, and the orchestrator checks it between batches.

use crate::error::TrackerError;
use crate::sync::orchestrator::PageReport;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Cumulative task progress within a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Events emitted during a sync page, serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum SyncEvent {
    /// A human-readable log line
    Log(String),
    /// A task finished
    Progress(Progress),
    /// The page is finished; always the last event
    Done(PageReport),
}

/// Trait for handling sync events.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), TrackerError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order. A failing handler is logged and skipped so the
/// others still see every event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
    cancelled: bool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&mut self, event: &SyncEvent) {
        for handler in &mut self.handlers {
            match handler.handle(event).await {
                Ok(()) => {}
                Err(TrackerError::Cancelled) => {
                    if !self.cancelled {
                        info!("Handler {} reports the consumer is gone", handler.name());
                    }
                    self.cancelled = true;
                }
                Err(e) => {
                    tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
                }
            }
        }
    }

    /// Whether a consumer has abandoned the run.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Mirrors events into `tracing`.
pub struct TracingHandler;

#[async_trait::async_trait]
impl SyncEventHandler for TracingHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), TrackerError> {
        match event {
            SyncEvent::Log(line) => info!("{}", line),
            SyncEvent::Progress(progress) => {
                debug!("Progress {}/{}", progress.current, progress.total)
            }
            SyncEvent::Done(report) => info!("{}", report.summary()),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingHandler"
    }
}

/// Forwards events onto a channel read by a separate consumer task.
pub struct ChannelForwarder {
    sender: mpsc::Sender<SyncEvent>,
}

impl ChannelForwarder {
    pub fn new(sender: mpsc::Sender<SyncEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait::async_trait]
impl SyncEventHandler for ChannelForwarder {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), TrackerError> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| TrackerError::Cancelled)
    }

    fn name(&self) -> &'static str {
        "ChannelForwarder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait::async_trait]
    impl SyncEventHandler for Failing {
        async fn handle(&mut self, _event: &SyncEvent) -> Result<(), TrackerError> {
            Err(TrackerError::Validation("boom".to_string()))
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[test]
    fn wire_format_is_tagged() {
        let log = serde_json::to_value(SyncEvent::Log("hello".to_string())).unwrap();
        assert_eq!(log, serde_json::json!({"event": "log", "data": "hello"}));

        let progress =
            serde_json::to_value(SyncEvent::Progress(Progress { current: 2, total: 5 })).unwrap();
        assert_eq!(
            progress,
            serde_json::json!({"event": "progress", "data": {"current": 2, "total": 5}})
        );
    }

    #[tokio::test]
    async fn forwarder_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(Failing));
        dispatcher.register_handler(Box::new(ChannelForwarder::new(tx)));

        dispatcher.dispatch(&SyncEvent::Log("a".to_string())).await;
        dispatcher.dispatch(&SyncEvent::Log("b".to_string())).await;

        assert_eq!(rx.recv().await, Some(SyncEvent::Log("a".to_string())));
        assert_eq!(rx.recv().await, Some(SyncEvent::Log("b".to_string())));
        assert!(!dispatcher.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_consumer_marks_cancelled() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(Box::new(ChannelForwarder::new(tx)));

        dispatcher.dispatch(&SyncEvent::Log("lost".to_string())).await;
        assert!(dispatcher.is_cancelled());
    }
}
