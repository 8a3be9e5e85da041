//! ChannelSink - forwards results to an in-process consumer

use contracts::{AnalysisResult, AsyncResultSink, RoadError};
use tokio::sync::mpsc;

/// Sink that hands each result to a tokio channel
///
/// Used by embedders (and tests) that want the result stream itself.
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<AnalysisResult>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<AnalysisResult>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

impl AsyncResultSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, result: &AnalysisResult) -> Result<(), RoadError> {
        self.tx
            .send(result.clone())
            .await
            .map_err(|_| RoadError::sink_write(&self.name, "receiver dropped"))
    }

    async fn flush(&mut self) -> Result<(), RoadError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RoadError> {
        Ok(())
    }
}
