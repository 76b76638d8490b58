//! Notification sinks for alert triggers
//!
//! Delivery is best-effort: the evaluator logs a failed delivery and carries on.

use crate::{error::SinkError, types::TriggerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Receives trigger events for user-facing display
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &TriggerEvent) -> Result<(), SinkError>;
}

/// Writes triggers to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &TriggerEvent) -> Result<(), SinkError> {
        tracing::info!(
            alert_id = %event.alert_id,
            coin_id = %event.coin_id,
            price = %event.price,
            "Price alert triggered: {}",
            event.message()
        );
        Ok(())
    }
}

/// Publishes triggers on a broadcast channel
pub struct ChannelSink {
    tx: broadcast::Sender<TriggerEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, event: &TriggerEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| SinkError::Delivery("no subscribers".to_string()))
    }
}

/// Fans a trigger out to several sinks
///
/// Every sink is tried; the first error is returned.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

#[async_trait]
impl NotificationSink for CompositeSink {
    async fn notify(&self, event: &TriggerEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every event it is given
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<TriggerEvent>>,
        fail: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records events but reports every delivery as failed
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn events(&self) -> Vec<TriggerEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &TriggerEvent) -> Result<(), SinkError> {
            self.events.lock().unwrap().push(event.clone());
            if self.fail {
                return Err(SinkError::Delivery("recording sink set to fail".to_string()));
            }
            Ok(())
        }
    }
}
