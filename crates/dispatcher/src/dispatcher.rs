//! Dispatcher - fan-out of analysis results to isolated sinks

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use contracts::{AnalysisResult, ResultSink, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::{SinkHandle, SinkSender};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{HazardSink, LogSink};

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::Hazard => {
            let sink = HazardSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Owner of all sink workers
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
}

impl Dispatcher {
    /// Spawn one worker per configured sink
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        name = "dispatcher_from_configs",
        skip(configs),
        fields(sink_count = configs.len())
    )]
    pub fn from_configs(configs: &[SinkConfig]) -> Result<Self, DispatcherError> {
        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            match create_sink_handle(config) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // stop what was already spawned before bailing out
                    for handle in handles {
                        tokio::spawn(handle.shutdown());
                    }
                    return Err(e);
                }
            }
        }
        info!(sinks = handles.len(), "Dispatcher started");
        Ok(Self { handles })
    }

    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>) -> Self {
        Self { handles }
    }

    pub fn sink_count(&self) -> usize {
        self.handles.len()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Synchronous front end to register with the engine
    pub fn result_sink(&self) -> FanOut {
        FanOut {
            senders: self.handles.iter().map(SinkHandle::sender).collect(),
            dispatched: 0,
        }
    }

    /// Drain every queue and close the sinks
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
        info!("Dispatcher shutdown complete");
    }
}

/// Convenience function to create a dispatcher from sink configs
pub fn create_dispatcher(sink_configs: Vec<SinkConfig>) -> Result<Dispatcher, DispatcherError> {
    Dispatcher::from_configs(&sink_configs)
}

/// `ResultSink` that forwards each result to every sink queue without waiting
pub struct FanOut {
    senders: Vec<SinkSender>,
    dispatched: u64,
}

impl FanOut {
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl ResultSink for FanOut {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn on_result(&mut self, result: &AnalysisResult) {
        let shared = Arc::new(result.clone());
        for sender in &self.senders {
            match sender.try_send(Arc::clone(&shared)) {
                Ok(()) | Err(DispatcherError::QueueFull { .. }) => {}
                Err(e) => warn!(sink = sender.name(), error = %e, "Dispatch failed"),
            }
        }
        self.dispatched += 1;
        if self.dispatched.is_multiple_of(100) {
            debug!(results = self.dispatched, "Dispatcher progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::ChannelSink;
    use crate::test_support::result;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_dispatcher_fanout() {
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);

        let handles = vec![
            SinkHandle::spawn(ChannelSink::new("sink1", tx1), 10),
            SinkHandle::spawn(ChannelSink::new("sink2", tx2), 10),
        ];
        let dispatcher = Dispatcher::with_handles(handles);
        let mut fanout = dispatcher.result_sink();

        for i in 0..5 {
            fanout.on_result(&result(i));
        }
        assert_eq!(fanout.dispatched(), 5);

        dispatcher.shutdown().await;

        for rx in [&mut rx1, &mut rx2] {
            let mut ids = Vec::new();
            while let Ok(r) = rx.try_recv() {
                ids.push(r.frame_id);
            }
            assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        }
    }

    #[tokio::test]
    async fn test_create_dispatcher_from_config() {
        let configs = vec![
            SinkConfig {
                name: "test_log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 50,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "hazards".to_string(),
                sink_type: SinkType::Hazard,
                queue_capacity: 50,
                params: HashMap::from([("min_severity".to_string(), "0.3".to_string())]),
            },
        ];

        let dispatcher = create_dispatcher(configs).unwrap();
        assert_eq!(dispatcher.sink_count(), 2);

        let mut fanout = dispatcher.result_sink();
        fanout.on_result(&result(1));
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_sink_params_rejected() {
        let configs = vec![SinkConfig {
            name: "hazards".to_string(),
            sink_type: SinkType::Hazard,
            queue_capacity: 10,
            params: HashMap::from([("min_severity".to_string(), "loud".to_string())]),
        }];

        let err = create_dispatcher(configs).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { ref name, .. } if name == "hazards"));
    }

    #[tokio::test]
    async fn test_fanout_survives_closed_sink() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (tx_ok, mut rx_ok) = mpsc::channel(16);

        let handles = vec![
            SinkHandle::spawn(ChannelSink::new("closed", tx), 10),
            SinkHandle::spawn(ChannelSink::new("open", tx_ok), 10),
        ];
        let dispatcher = Dispatcher::with_handles(handles);
        let mut fanout = dispatcher.result_sink();
        fanout.on_result(&result(7));
        fanout.on_result(&result(8));

        dispatcher.shutdown().await;

        assert_eq!(rx_ok.try_recv().unwrap().frame_id, 7);
        assert_eq!(rx_ok.try_recv().unwrap().frame_id, 8);
    }
}
