//! Result sink traits - engine output interface
//!
//! `ResultSink` is what the fusion engine calls once per tick. Slow collaborators
//! implement `AsyncResultSink` and are wrapped by the dispatcher behind a bounded queue.

use crate::{AnalysisResult, RoadError};

/// Synchronous result sink, called by the engine once per tick
///
/// Implementations must return promptly; anything slow has to be buffered internally.
pub trait ResultSink: Send {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Receive one analysis result
    fn on_result(&mut self, result: &AnalysisResult);
}

/// Asynchronous result writer
///
/// All storage/visualisation sinks run behind the dispatcher implement this trait.
#[trait_variant::make(AsyncResultSink: Send)]
pub trait LocalAsyncResultSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one analysis result
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, result: &AnalysisResult) -> Result<(), RoadError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), RoadError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), RoadError>;
}

