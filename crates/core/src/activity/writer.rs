use std::sync::Arc;

use tokio::sync::mpsc;

use super::{ActivityEnvelope, ActivityRecord, ActivityStore, LogDispatcher};

/// Callback invoked for every record after it is persisted.
pub type ActivityListener = Arc<dyn Fn(&ActivityRecord) + Send + Sync>;

/// Background task that drains the activity channel into storage.
pub struct ActivityWriter {
    rx: mpsc::Receiver<ActivityEnvelope>,
    store: Arc<dyn ActivityStore>,
    listeners: Vec<ActivityListener>,
}

impl ActivityWriter {
    pub fn new(rx: mpsc::Receiver<ActivityEnvelope>, store: Arc<dyn ActivityStore>) -> Self {
        Self {
            rx,
            store,
            listeners: Vec::new(),
        }
    }

    /// Register a listener that sees every record (live streaming).
    pub fn with_listener(mut self, listener: ActivityListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run the writer until every dispatcher is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Activity writer started");

        while let Some(envelope) = self.rx.recv().await {
            let mut record = ActivityRecord {
                id: 0,
                timestamp: envelope.timestamp,
                level: envelope.event.level(),
                event: envelope.event,
            };

            match self.store.insert(&record) {
                Ok(id) => record.id = id,
                Err(e) => tracing::error!("Failed to write activity record: {}", e),
            }

            for listener in &self.listeners {
                listener(&record);
            }
        }

        tracing::info!("Activity writer shutting down");
    }
}

/// Create a complete activity log system
///
/// Returns:
/// - `LogDispatcher` - for pushing events (clone this to share across tasks)
/// - `ActivityWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
pub fn create_activity_system(
    store: Arc<dyn ActivityStore>,
    buffer_size: usize,
) -> (LogDispatcher, ActivityWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (LogDispatcher::new(tx), ActivityWriter::new(rx, store))
}
