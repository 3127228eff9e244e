//! Limeout Pipeline - wiring the per-frame stages together
//!
//! Source frame -> stabilize -> crop -> key, then either composited for
//! preview or written to an export session.

pub mod batch;
pub mod config;
pub mod processor;

pub use batch::{export_video, BatchExport, ExportEvent, ExportReport};
pub use config::{LoggingConfig, PipelineConfig};
pub use processor::{FrameProcessor, PreviewOptions, ProcessedFrame};
