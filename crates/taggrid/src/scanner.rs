//! Consumer loop tying acquisition, decoding and notifications together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;

use crate::acquisition::{AcquisitionSettings, AcquisitionStatus, AcquisitionWorker};
use crate::config::{ConfigError, ScannerConfig};
use crate::notify::{NotificationManager, NotificationSink, NotificationTemplate, NotifyError};
use crate::pipeline::{ChangeDetector, PipelineSettings, PipelineWorker, ScanOutput, ScanStage};
use crate::source::{open_source, ImageSource, SourceError};
use crate::{RateLimiter, Roi, StopSignal};

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Counters reported when a scan ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub results: u64,
    pub notifications: u64,
    pub last_cycle: Option<u64>,
}

/// Runs the whole scanner: an acquisition thread, a decode thread, and the
/// caller's thread consuming results at the display rate.
///
/// Only grids that differ from the last forwarded grid are notified.
pub struct Scanner {
    acquisition: AcquisitionWorker,
    pipeline: PipelineWorker,
    notifier: NotificationManager,
    template: NotificationTemplate,
    changes: ChangeDetector,
    display: RateLimiter,
    stop: Arc<StopSignal>,
    visualize: bool,
    auto_hide: Option<Duration>,
    last_interaction: Instant,
    latest: Option<Arc<ScanOutput>>,
    summary: ScanSummary,
}

impl Scanner {
    /// Validate `config` and start every worker it describes.
    pub fn from_config(config: &ScannerConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let source = open_source(&config.camera)?;
        let notifier = NotificationManager::from_config(&config.notify)?;
        Self::with_parts(config, source, notifier)
    }

    /// Start with a caller-provided source and sinks.
    pub fn with_sinks(
        config: &ScannerConfig,
        source: Box<dyn ImageSource>,
        sinks: Vec<Box<dyn NotificationSink>>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        let repeat = config
            .notify
            .repeat
            .then(|| Duration::from_secs_f64(config.notify.interval));
        Self::with_parts(config, source, NotificationManager::new(sinks, repeat))
    }

    fn with_parts(
        config: &ScannerConfig,
        source: Box<dyn ImageSource>,
        notifier: NotificationManager,
    ) -> Result<Self, ScanError> {
        let stage = ScanStage::from_config(config)?;
        info!(
            "scanning a {}x{} grid of {}x{} tags ({} registered), rectified to {}x{}",
            config.dimensions.grid.rows,
            config.dimensions.grid.cols,
            config.dimensions.tile.width,
            config.dimensions.tile.height,
            stage.catalog().len(),
            stage.rect_size().0,
            stage.rect_size().1,
        );

        let acquisition =
            AcquisitionWorker::spawn(source, AcquisitionSettings::from_config(&config.camera))?;
        let pipeline = PipelineWorker::spawn(
            Arc::new(acquisition.reader()),
            stage,
            PipelineSettings {
                rate: config.scan.rate,
                roi: config.dimensions.roi,
                visualize: config.scan.visualize,
            },
        )?;

        Ok(Self {
            acquisition,
            pipeline,
            notifier,
            template: NotificationTemplate::from_config(&config.notify),
            changes: ChangeDetector::new(),
            display: RateLimiter::new(config.scan.display_rate),
            stop: Arc::new(StopSignal::new()),
            visualize: config.scan.visualize,
            auto_hide: config.scan.auto_hide.map(Duration::from_secs_f64),
            last_interaction: Instant::now(),
            latest: None,
            summary: ScanSummary::default(),
        })
    }

    /// Raising this signal ends [`Scanner::run`].
    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    pub fn pipeline(&self) -> &PipelineWorker {
        &self.pipeline
    }

    pub fn acquisition_status(&self) -> AcquisitionStatus {
        self.acquisition.status()
    }

    pub fn set_roi(&mut self, roi: Roi) {
        self.last_interaction = Instant::now();
        self.pipeline.set_roi(roi);
    }

    pub fn set_visualization(&mut self, on: bool) {
        self.last_interaction = Instant::now();
        if self.visualize != on {
            self.visualize = on;
            self.pipeline.set_visualize(on);
        }
    }

    pub fn toggle_visualization(&mut self) {
        self.set_visualization(!self.visualize);
    }

    pub fn latest(&self) -> Option<&Arc<ScanOutput>> {
        self.latest.as_ref()
    }

    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    /// One consumer iteration: pick up a fresh result, notify on change,
    /// serve the repeat timer. Returns the fresh result, if any.
    pub fn step(&mut self) -> Option<Arc<ScanOutput>> {
        if let Some(timeout) = self.auto_hide {
            if self.visualize && self.last_interaction.elapsed() >= timeout {
                info!("hiding visualization after {:.0}s without input", timeout.as_secs_f64());
                self.set_visualization(false);
            }
        }

        let fresh = self.pipeline.fresh_result();
        if let Some(output) = &fresh {
            self.summary.results += 1;
            self.summary.last_cycle = Some(output.cycle);
            if self.changes.offer(&output.grid) {
                match self.template.render(&output.grid) {
                    Ok(payload) => {
                        self.notifier.notify(payload);
                        self.summary.notifications += 1;
                    }
                    Err(err) => warn!("cannot build notification: {err}"),
                }
            }
            self.latest = Some(Arc::clone(output));
        }
        self.notifier.tick();
        fresh
    }

    /// Run the consumer loop until stopped or `deadline` passes. `on_step`
    /// runs once per iteration with the fresh result, if there was one.
    pub fn run_with<F>(&mut self, deadline: Option<Instant>, mut on_step: F) -> ScanSummary
    where
        F: FnMut(&mut Self, Option<&ScanOutput>),
    {
        loop {
            self.display.begin();
            let fresh = self.step();
            on_step(self, fresh.as_deref());
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if self.display.pace(&self.stop) {
                break;
            }
        }
        self.summary
    }

    pub fn run(&mut self, deadline: Option<Instant>) -> ScanSummary {
        self.run_with(deadline, |_, _| {})
    }

    /// Stop every worker and wait for the threads to exit.
    pub fn shutdown(mut self) -> ScanSummary {
        self.stop.stop();
        self.pipeline.stop();
        self.acquisition.stop();
        self.summary
    }
}
