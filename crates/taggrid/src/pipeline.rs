//! Rate-limited decode loop: latest frame → rectified ROI → decoded grid.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use taggrid_core::{GrayImage, HomographyRectifier, Rectifier};
use taggrid_tags::{render_tiles, DecodedGrid, GridDecoder, GridScan, TagCatalog};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::acquisition::FrameReader;
use crate::config::{ConfigError, ScannerConfig};
use crate::{Mailbox, RateLimiter, Roi, StopSignal, WorkerHandle};

/// Pixels per tile bit in the tile mosaic.
pub const MOSAIC_SCALE: usize = 10;

/// Anything the decode loop can take frames from.
pub trait FrameFeed: Send + Sync + 'static {
    /// Newest frame, `None` until the first one arrives.
    fn latest(&self) -> Option<Arc<GrayImage>>;
}

impl FrameFeed for FrameReader {
    fn latest(&self) -> Option<Arc<GrayImage>> {
        FrameReader::latest(self)
    }
}

impl FrameFeed for Mailbox<Arc<GrayImage>> {
    fn latest(&self) -> Option<Arc<GrayImage>> {
        self.retrieve_nowait().into_option()
    }
}

/// One frame's worth of work: rectify the ROI, then decode the grid.
#[derive(Clone)]
pub struct ScanStage {
    decoder: GridDecoder,
    rectifier: Arc<dyn Rectifier>,
    rect_size: (usize, usize),
}

impl std::fmt::Debug for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStage")
            .field("decoder", &self.decoder)
            .field("rect_size", &self.rect_size)
            .finish_non_exhaustive()
    }
}

impl ScanStage {
    pub fn new(decoder: GridDecoder, rect_size: (usize, usize)) -> Self {
        Self {
            decoder,
            rectifier: Arc::new(HomographyRectifier),
            rect_size,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Result<Self, ConfigError> {
        let dims = &config.dimensions;
        let catalog = Arc::new(config.build_catalog()?);
        for c in catalog.collisions() {
            warn!(
                "tag {:?} shares encoding {:#x} with tag {:?}; {:?} wins",
                catalog.name(c.replaced_by).unwrap_or("?"),
                c.code,
                catalog.name(c.previous).unwrap_or("?"),
                catalog.name(c.replaced_by).unwrap_or("?"),
            );
        }
        let decoder = GridDecoder::new(dims.grid, dims.gap, catalog)
            .with_crop(dims.crop.x, dims.crop.y);
        Ok(Self::new(decoder, dims.rectified_size()?))
    }

    pub fn with_rectifier(mut self, rectifier: Arc<dyn Rectifier>) -> Self {
        self.rectifier = rectifier;
        self
    }

    pub fn rect_size(&self) -> (usize, usize) {
        self.rect_size
    }

    pub fn catalog(&self) -> &Arc<TagCatalog> {
        self.decoder.catalog()
    }

    pub fn set_catalog(&mut self, catalog: Arc<TagCatalog>) {
        self.decoder.set_catalog(catalog);
    }

    /// Rectify `roi` out of `frame`. `None` if the ROI has no valid projection.
    pub fn rectify(&self, frame: &GrayImage, roi: &Roi) -> Option<GrayImage> {
        let quad = roi.to_quad(frame.width, frame.height);
        let (w, h) = self.rect_size;
        self.rectifier.rectify(&frame.view(), &quad, w, h)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, roi), fields(w = frame.width, h = frame.height))
    )]
    pub fn run(&self, frame: &GrayImage, roi: &Roi) -> Option<(GrayImage, GridScan)> {
        let rectified = self.rectify(frame, roi)?;
        let scan = self.decoder.decode(&rectified.view());
        Some((rectified, scan))
    }

    pub fn unmatched(&self) -> DecodedGrid {
        DecodedGrid::unmatched(self.decoder.shape())
    }
}

/// Intermediate images of one decode cycle.
#[derive(Clone, Debug)]
pub struct ScanVisualization {
    pub rectified: GrayImage,
    /// Reduced tiles, each bit drawn as a [`MOSAIC_SCALE`] pixel block.
    pub tiles: GrayImage,
}

/// Result of one decode cycle.
#[derive(Clone, Debug)]
pub struct ScanOutput {
    pub cycle: u64,
    pub grid: DecodedGrid,
    pub roi: Roi,
    pub visualization: Option<Arc<ScanVisualization>>,
}

/// Inputs the decode loop picks up at the start of every cycle.
#[derive(Debug, Default)]
pub struct PipelineControls {
    pub roi: Mailbox<Roi>,
    pub catalog: Mailbox<Arc<TagCatalog>>,
    pub visualize: Mailbox<bool>,
}

/// Forwards a grid only when it differs from the last forwarded one.
#[derive(Clone, Debug, Default)]
pub struct ChangeDetector {
    last: Option<DecodedGrid>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` (and remember `grid`) if it differs from the last forwarded grid.
    pub fn offer(&mut self, grid: &DecodedGrid) -> bool {
        if self.last.as_ref() == Some(grid) {
            return false;
        }
        self.last = Some(grid.clone());
        true
    }

    pub fn last(&self) -> Option<&DecodedGrid> {
        self.last.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub rate: f64,
    pub roi: Roi,
    pub visualize: bool,
}

struct DecodeState {
    stage: ScanStage,
    roi: Roi,
    visualize: bool,
    cycle: u64,
    warned_cells: HashSet<(usize, usize)>,
    roi_warned: bool,
}

impl DecodeState {
    fn apply_controls(&mut self, controls: &PipelineControls) {
        if let Some(roi) = controls.roi.retrieve_fresh() {
            debug!("ROI updated to {:?}", roi.corners);
            self.roi = roi;
            self.roi_warned = false;
        }
        if let Some(catalog) = controls.catalog.retrieve_fresh() {
            debug!("catalog replaced ({} tags)", catalog.len());
            self.stage.set_catalog(catalog);
        }
        if let Some(visualize) = controls.visualize.retrieve_fresh() {
            self.visualize = visualize;
        }
    }

    fn cycle(&mut self, frame: &GrayImage) -> ScanOutput {
        let cycle = self.cycle;
        self.cycle += 1;

        let Some((rectified, scan)) = self.stage.run(frame, &self.roi) else {
            if !self.roi_warned {
                warn!("ROI {:?} cannot be rectified", self.roi.corners);
                self.roi_warned = true;
            }
            return ScanOutput {
                cycle,
                grid: self.stage.unmatched(),
                roi: self.roi,
                visualization: None,
            };
        };

        for cell in scan.degenerate_cells() {
            if self.warned_cells.insert(cell) {
                warn!(
                    "cell ({}, {}) has an empty pixel window; reported as unmatched",
                    cell.0, cell.1
                );
            }
        }

        let visualization = self.visualize.then(|| {
            Arc::new(ScanVisualization {
                tiles: render_tiles(&scan, MOSAIC_SCALE),
                rectified,
            })
        });

        ScanOutput {
            cycle,
            grid: scan.grid,
            roi: self.roi,
            visualization,
        }
    }
}

/// Runs [`ScanStage`] on the newest frame at a fixed maximum rate and
/// publishes every result to a single-slot mailbox.
///
/// Cycles run strictly one after another. A cycle that takes longer than the
/// period is followed immediately by the next one.
#[derive(Debug)]
pub struct PipelineWorker {
    controls: Arc<PipelineControls>,
    results: Arc<Mailbox<Arc<ScanOutput>>>,
    worker: WorkerHandle,
}

impl PipelineWorker {
    pub fn spawn<F: FrameFeed>(
        feed: Arc<F>,
        stage: ScanStage,
        settings: PipelineSettings,
    ) -> io::Result<Self> {
        let controls = Arc::new(PipelineControls::default());
        let results = Arc::new(Mailbox::new());
        let thread_controls = Arc::clone(&controls);
        let thread_results = Arc::clone(&results);

        let worker = WorkerHandle::spawn("decode", move |stop| {
            let mut state = DecodeState {
                stage,
                roi: settings.roi,
                visualize: settings.visualize,
                cycle: 0,
                warned_cells: HashSet::new(),
                roi_warned: false,
            };
            decode_loop(
                feed.as_ref(),
                &mut state,
                settings.rate,
                &thread_controls,
                &thread_results,
                &stop,
            );
        })?;

        Ok(Self {
            controls,
            results,
            worker,
        })
    }

    pub fn controls(&self) -> &PipelineControls {
        &self.controls
    }

    pub fn set_roi(&self, roi: Roi) {
        self.controls.roi.set(roi);
    }

    pub fn set_catalog(&self, catalog: Arc<TagCatalog>) {
        self.controls.catalog.set(catalog);
    }

    pub fn set_visualize(&self, on: bool) {
        self.controls.visualize.set(on);
    }

    pub fn results(&self) -> &Arc<Mailbox<Arc<ScanOutput>>> {
        &self.results
    }

    /// Wait up to `timeout` for the first result.
    pub fn wait_result(&self, timeout: Duration) -> Option<Arc<ScanOutput>> {
        self.results.wait_timeout(timeout)
    }

    /// Newest result if one was published since the last read.
    pub fn fresh_result(&self) -> Option<Arc<ScanOutput>> {
        self.results.retrieve_fresh()
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

fn decode_loop(
    feed: &dyn FrameFeed,
    state: &mut DecodeState,
    rate: f64,
    controls: &PipelineControls,
    results: &Mailbox<Arc<ScanOutput>>,
    stop: &StopSignal,
) {
    let mut limiter = RateLimiter::new(rate);
    let mut waiting_logged = false;

    loop {
        limiter.begin();
        state.apply_controls(controls);

        match feed.latest() {
            Some(frame) => {
                let output = state.cycle(&frame);
                results.set(Arc::new(output));
            }
            None if !waiting_logged => {
                debug!("waiting for the first frame");
                waiting_logged = true;
            }
            None => {}
        }

        if limiter.pace(stop) {
            break;
        }
    }
}
