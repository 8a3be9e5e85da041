//! # Fusion Engine
//!
//! Road-surface sensor fusion and analysis core.
//!
//! Responsibilities:
//! - Per-sensor bounded sample buffers (drop-oldest on overflow)
//! - Time alignment of accelerometer / GPS / LiDAR onto one tick grid
//! - Roughness index, quality label, ranging surface profile
//! - Adaptive-threshold anomaly detection (pothole / bump)
//! - Per-scan LiDAR ground hazards (pothole / bump / crack), opt-in
//! - Copy-on-write configuration snapshots, swapped between ticks
//!
//! ## Usage
//!
//! ```ignore
//! use fusion_engine::{ConfigStore, FusionEngine};
//!
//! let store = ConfigStore::new(AnalysisConfig::default())?;
//! let mut engine = FusionEngine::new(store);
//! let ingest = engine.ingest_handle();
//!
//! // sensor drivers push from their own threads
//! ingest.submit(SensorKind::Accel, t, SamplePayload::Accel(reading));
//!
//! // one analysis result per tick
//! let result = engine.tick(t)?;
//! ```

mod aligner;
mod anomaly;
mod buffer;
mod classifier;
mod config_store;
mod driver;
mod engine;
mod geo;
mod ingest;
mod profile;
mod roughness;

pub use aligner::{Alignment, TimeAligner};
pub use anomaly::{AnomalyDetector, DetectorCounters, FrameObservation};
pub use buffer::SampleBuffer;
pub use classifier::{classify, classify_profile, fused_label};
pub use config_store::ConfigStore;
pub use driver::{DriverStats, MonotonicClock, SystemClock, TickClock, TickDriver};
pub use engine::{EngineStats, FusionEngine};
pub use geo::{haversine_m, interpolate};
pub use ingest::{IngestHandle, SampleBuffers, SubmitOutcome};
pub use profile::{detect_hazards, extract as extract_surface_profile, SurfaceHazard};
pub use roughness::{estimate as estimate_roughness, RoughnessEstimate};

// Re-export contracts types
pub use contracts::{AnalysisConfig, AnalysisResult, FusedFrame, ResultSink, RoadError};
