//! Real-time scanner for grids of binary fiducial tags.
//!
//! The scanner reads frames from an [`ImageSource`] on one thread, decodes the
//! tag grid inside a region of interest on a second, rate-limited thread, and
//! notifies listeners from the caller's thread whenever the decoded grid
//! changes. Threads hand data to each other only through single-slot
//! [`Mailbox`]es, so a slow stage never builds up a backlog.
//!
//! ## Quickstart
//!
//! ```no_run
//! use taggrid::{Scanner, ScannerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScannerConfig::load_validated("scanner.json")?;
//! let mut scanner = Scanner::from_config(&config)?;
//! scanner.run(None);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `taggrid::core`: images, homography rectification, resize, threshold, grid geometry.
//! - `taggrid::tags`: tiles, tag patterns, the rotation-invariant catalog, grid decoding.
//! - [`acquisition`], [`pipeline`], [`notify`], [`scanner`]: the runtime.

pub use taggrid_core as core;
pub use taggrid_tags as tags;

pub mod acquisition;
pub mod config;
mod mailbox;
pub mod notify;
pub mod pipeline;
mod rate_limit;
mod roi;
pub mod scanner;
pub mod source;
mod stop;
mod worker;

pub use acquisition::{
    blend_frames, AcquisitionSettings, AcquisitionStatus, AcquisitionWorker, Backoff,
    ConnectionStatus, FrameReader,
};
pub use config::{store_roi, ConfigError, ConfigIoError, ScannerConfig};
pub use mailbox::{Mailbox, Retrieved};
pub use notify::{
    ConsoleSink, ConsoleTarget, HttpSink, NotificationManager, NotificationSink,
    NotificationTemplate, NotifyError,
};
pub use pipeline::{
    ChangeDetector, FrameFeed, PipelineControls, PipelineSettings, PipelineWorker, ScanOutput,
    ScanStage, ScanVisualization,
};
pub use rate_limit::RateLimiter;
pub use roi::Roi;
pub use scanner::{ScanError, ScanSummary, Scanner};
pub use source::{
    load_gray, open_source, save_gray, CaptureProperty, ImageFileSource, ImageSequenceSource,
    ImageSource, SourceError,
};
pub use stop::StopSignal;
pub use taggrid_tags::{DecodedGrid, TagCatalog, TagMatch};
pub use worker::WorkerHandle;
