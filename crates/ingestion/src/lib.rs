//! # Ingestion
//!
//! Sensor-side collaborators of the fusion engine.
//!
//! Responsibilities:
//! - Decode raw LiDAR frames into `LidarScan`
//! - Scripted road surfaces and deterministic synthetic drives (mock drivers)
//! - Push samples into the engine's `IngestHandle`
//! - Ingestion counters
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{DriveConfig, MockSensorSource, RoadScript, SyntheticDrive};
//!
//! let drive = SyntheticDrive::new(RoadScript::demo(), DriveConfig::default())?;
//! let source = MockSensorSource::new(Duration::from_millis(10));
//! let task = source.start(drive, engine.ingest_handle(), clock);
//! ```

mod decoder;
mod error;
mod metrics;
mod mock;
mod road;

// Re-exports
pub use decoder::{LidarFrameDecoder, RECORD_SIZE};
pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use mock::{DriveConfig, MockSensorSource, SyntheticDrive};
pub use road::{RoadScript, Segment, SegmentKind};
