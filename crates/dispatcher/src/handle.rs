//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{AnalysisResult, AsyncResultSink};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// Cloneable, non-blocking sending side of a sink queue
#[derive(Debug, Clone)]
pub struct SinkSender {
    name: String,
    tx: mpsc::Sender<Arc<AnalysisResult>>,
    metrics: Arc<SinkMetrics>,
}

impl SinkSender {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a result without waiting
    ///
    /// # Errors
    /// `QueueFull` (result dropped and counted) or `WorkerClosed`
    pub fn try_send(&self, result: Arc<AnalysisResult>) -> Result<(), DispatcherError> {
        match self.tx.try_send(result) {
            Ok(()) => {
                self.metrics
                    .record_queued(self.tx.max_capacity() - self.tx.capacity());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.metrics.record_dropped();
                observability::record_result_dispatched(&self.name, false);
                warn!(sink = %self.name, frame_id = r.frame_id, "Queue full, result dropped");
                Err(DispatcherError::QueueFull {
                    sink_name: self.name.clone(),
                    frame_id: r.frame_id,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                Err(DispatcherError::WorkerClosed {
                    sink_name: self.name.clone(),
                })
            }
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    sender: SinkSender,
    stop: oneshot::Sender<()>,
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: AsyncResultSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, stop_rx, worker_metrics, worker_name).await;
        });

        Self {
            sender: SinkSender { name, tx, metrics },
            stop: stop_tx,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.sender.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.sender.metrics
    }

    /// Sending side, for the fan-out given to the engine
    pub fn sender(&self) -> SinkSender {
        self.sender.clone()
    }

    /// Send a result to the sink (non-blocking)
    pub fn try_send(&self, result: Arc<AnalysisResult>) -> Result<(), DispatcherError> {
        self.sender.try_send(result)
    }

    /// Stop the worker after it has drained what is already queued
    ///
    /// Outstanding `SinkSender` clones see `WorkerClosed` afterwards.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.sender.name))]
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.sender.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.sender.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes results and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, stop, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: AsyncResultSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<AnalysisResult>>,
    mut stop: oneshot::Receiver<()>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    loop {
        let result = tokio::select! {
            biased;
            result = rx.recv() => result,
            _ = &mut stop => {
                // refuse new results, drain the queued ones below
                rx.close();
                None
            }
        };
        let Some(result) = result else { break };
        write_one(&mut sink, &result, &metrics, &name).await;
        metrics.set_depth(rx.len());
    }

    while let Some(result) = rx.recv().await {
        write_one(&mut sink, &result, &metrics, &name).await;
    }
    metrics.set_depth(0);

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}

async fn write_one<S: AsyncResultSink>(
    sink: &mut S,
    result: &AnalysisResult,
    metrics: &SinkMetrics,
    name: &str,
) {
    match sink.write(result).await {
        Ok(()) => {
            metrics.record_written(result.frame_id);
            observability::record_result_dispatched(name, true);
        }
        Err(e) => {
            metrics.record_failed();
            observability::record_result_dispatched(name, false);
            error!(
                sink = %name,
                frame_id = result.frame_id,
                error = %e,
                "Write failed"
            );
        }
    }
}
