//! # Dispatcher
//!
//! 结果分发模块。
//!
//! 负责：
//! - 接收 `AnalysisResult` (作为引擎的 `ResultSink`)
//! - Fan-out 到多个异步 sinks
//! - 隔离慢 sink，不阻塞 tick 循环

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{AnalysisResult, AsyncResultSink, ResultSink};
pub use dispatcher::{create_dispatcher, Dispatcher, FanOut};
pub use error::DispatcherError;
pub use handle::{SinkHandle, SinkSender};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{ChannelSink, HazardSink, LogSink};
