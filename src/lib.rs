//! Ephys Scan - Sliding-window event detection for electrophysiological traces
//!
//! Ephys Scan turns a per-window classifier probability stream into a compact
//! list of non-overlapping events through a deterministic pipeline: window
//! planning → classifier scoring → thresholding → event aggregation → run
//! summary.
//!
//! ## Modules
//!
//! - **Windower**: lazy, restartable overlapping windows over a signal
//! - **Classifier**: the pluggable scoring capability and its validation
//! - **Scorer**: sequential or parallel scoring, released in window order
//! - **Aggregator**: single-pass merge of detections into events
//! - **Summary**: counts, timings, and parameters of a run

pub mod aggregator;
pub mod cancel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scorer;
pub mod summary;
pub mod threshold;
pub mod types;
pub mod windower;

pub use aggregator::{aggregate_detections, EventAggregator};
pub use cancel::CancelToken;
pub use classifier::{ClassifierInfo, FnClassifier, WindowClassifier};
pub use config::{ClassifierFailurePolicy, ScanConfig, TrailingPolicy};
pub use error::{ClassifierError, ScanError};
pub use pipeline::{scan_signal, EventScanner};
pub use summary::{RunSummary, ScanParameters};
pub use threshold::{is_detection, Thresholder};
pub use types::{Detection, Event, ScanOutput, Signal, StopReason, Window, WindowScore};
pub use windower::{generate_windows, WindowPlan, Windows};

/// Engine version embedded in every run summary
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name for provenance
pub const ENGINE_NAME: &str = "ephys-scan";
