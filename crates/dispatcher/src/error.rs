//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Queue full - result dropped
    #[error("queue full for sink '{sink_name}', frame {frame_id} dropped")]
    QueueFull { sink_name: String, frame_id: u64 },

    /// Worker task gone
    #[error("sink '{sink_name}' worker is closed")]
    WorkerClosed { sink_name: String },

    /// Error raised by a sink
    #[error("sink error: {0}")]
    Road(#[from] contracts::RoadError),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
