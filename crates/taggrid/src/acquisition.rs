//! Background frame acquisition with reconnection and temporal smoothing.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use taggrid_core::GrayImage;

use crate::config::CameraConfig;
use crate::source::{CaptureProperty, ImageSource};
use crate::{RateLimiter, StopSignal, WorkerHandle};

/// Acquisition rate used when the source does not report one.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionSettings {
    pub reconnection_delay: Duration,
    /// Weight of the previous frame in `[0, 1)`; `0` disables smoothing.
    pub smooth: f64,
    pub properties: Vec<CaptureProperty>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            reconnection_delay: Duration::from_millis(500),
            smooth: 0.0,
            properties: Vec::new(),
        }
    }
}

impl AcquisitionSettings {
    pub fn from_config(camera: &CameraConfig) -> Self {
        Self {
            reconnection_delay: Duration::from_secs_f64(camera.reconnection_delay.max(0.0)),
            smooth: camera.smooth,
            properties: CaptureProperty::from_config(camera),
        }
    }
}

/// Blend `next` into `prev`: `smooth·prev + (1 − smooth)·next`, rounded.
///
/// Falls back to `next` when smoothing is off or the frames differ in size.
pub fn blend_frames(prev: &GrayImage, next: GrayImage, smooth: f64) -> GrayImage {
    if smooth <= 0.0 || !prev.same_shape(&next) {
        return next;
    }
    let keep = 1.0 - smooth;
    let data = prev
        .data
        .iter()
        .zip(&next.data)
        .map(|(&p, &n)| (smooth * p as f64 + keep * n as f64).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage {
        width: next.width,
        height: next.height,
        data,
    }
}

/// Spacing between reconnection attempts.
#[derive(Clone, Debug)]
pub struct Backoff {
    delay: Duration,
    last_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_attempt: None,
        }
    }

    /// Time to wait before the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        self.last_attempt
            .map_or(Duration::ZERO, |t| self.delay.saturating_sub(t.elapsed()))
    }

    /// Wait out the remaining delay and mark an attempt. Returns `true` if
    /// stopped while waiting.
    pub fn wait(&mut self, stop: &StopSignal) -> bool {
        let remaining = self.remaining();
        let stopped = if remaining.is_zero() {
            stop.is_stopped()
        } else {
            stop.sleep(remaining)
        };
        self.last_attempt = Some(Instant::now());
        stopped
    }
}

#[derive(Debug)]
struct FrameState {
    frame: Option<Arc<GrayImage>>,
    status: ConnectionStatus,
    frame_rate: Option<f64>,
    frames: u64,
    reconnects: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<FrameState>,
    first_frame: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time view of the acquisition state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AcquisitionStatus {
    pub connection: ConnectionStatus,
    pub frame_rate: Option<f64>,
    pub frames: u64,
    pub reconnects: u64,
}

/// Read-only handle on the acquired frames, cheap to clone into other threads.
#[derive(Clone, Debug)]
pub struct FrameReader {
    shared: Arc<Shared>,
}

impl FrameReader {
    /// The newest frame, if any has been acquired yet.
    pub fn latest(&self) -> Option<Arc<GrayImage>> {
        self.shared.lock().frame.clone()
    }

    /// Wait up to `timeout` for the first frame.
    pub fn wait_first(&self, timeout: Duration) -> Option<Arc<GrayImage>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(frame) = &state.frame {
                return Some(Arc::clone(frame));
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .shared
                .first_frame
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn status(&self) -> AcquisitionStatus {
        let state = self.shared.lock();
        AcquisitionStatus {
            connection: state.status,
            frame_rate: state.frame_rate,
            frames: state.frames,
            reconnects: state.reconnects,
        }
    }
}

/// Owns an [`ImageSource`] on a dedicated thread and keeps the newest
/// (optionally smoothed) frame available to readers.
///
/// Readers never wait on camera I/O: they take a snapshot of the stored frame
/// under the state lock. A failed read switches to `Disconnected` and the
/// thread keeps re-opening the source, at most once per reconnection delay,
/// until a frame can be read again. Dropping the worker stops the thread and
/// releases the source.
#[derive(Debug)]
pub struct AcquisitionWorker {
    reader: FrameReader,
    worker: WorkerHandle,
}

impl AcquisitionWorker {
    pub fn spawn(source: Box<dyn ImageSource>, settings: AcquisitionSettings) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(FrameState {
                frame: None,
                status: ConnectionStatus::Disconnected,
                frame_rate: None,
                frames: 0,
                reconnects: 0,
            }),
            first_frame: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let worker = WorkerHandle::spawn("acquisition", move |stop| {
            acquisition_loop(source, settings, &thread_shared, &stop);
            // Readers blocked on the first frame must not wait forever.
            thread_shared.first_frame.notify_all();
        })?;
        Ok(Self {
            reader: FrameReader { shared },
            worker,
        })
    }

    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    /// Block until the first frame exists, then return the newest frame.
    ///
    /// Returns `None` only if the worker stopped before any frame was read.
    pub fn read(&self) -> Option<Arc<GrayImage>> {
        let shared = &self.reader.shared;
        let mut state = shared.lock();
        loop {
            if let Some(frame) = &state.frame {
                return Some(Arc::clone(frame));
            }
            if self.worker.stop_signal().is_stopped() || self.worker.is_finished() {
                return None;
            }
            state = shared
                .first_frame
                .wait_timeout(state, Duration::from_millis(50))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn latest(&self) -> Option<Arc<GrayImage>> {
        self.reader.latest()
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.reader.status()
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }
}

fn acquisition_loop(
    mut source: Box<dyn ImageSource>,
    settings: AcquisitionSettings,
    shared: &Shared,
    stop: &StopSignal,
) {
    let mut backoff = Backoff::new(settings.reconnection_delay);
    let mut limiter = RateLimiter::new(DEFAULT_FRAME_RATE);
    info!("acquiring from {}", source.describe());

    loop {
        limiter.begin();
        let frame = match source.read() {
            Ok(frame) => Some(frame),
            Err(err) => {
                let was_connected = {
                    let mut state = shared.lock();
                    let was = state.status == ConnectionStatus::Connected;
                    state.status = ConnectionStatus::Disconnected;
                    was
                };
                if was_connected {
                    warn!("{} disconnected: {err}", source.describe());
                } else {
                    debug!("{} not readable: {err}", source.describe());
                }
                if !reconnect(source.as_mut(), &settings, &mut backoff, stop) {
                    break;
                }
                shared.lock().reconnects += 1;
                match source.read() {
                    Ok(frame) => Some(frame),
                    Err(err) => {
                        warn!("{} opened but not readable: {err}", source.describe());
                        None
                    }
                }
            }
        };

        if let Some(frame) = frame {
            publish(shared, frame, settings.smooth, source.frame_rate());
        }

        limiter.set_rate(source.frame_rate().unwrap_or(DEFAULT_FRAME_RATE));
        if limiter.pace(stop) {
            break;
        }
    }

    source.release();
    debug!("released {}", source.describe());
}

/// Re-open the source until it succeeds. Returns `false` if stopped first.
fn reconnect(
    source: &mut dyn ImageSource,
    settings: &AcquisitionSettings,
    backoff: &mut Backoff,
    stop: &StopSignal,
) -> bool {
    loop {
        if backoff.wait(stop) {
            return false;
        }
        source.release();
        match source.open() {
            Ok(()) => {
                for property in &settings.properties {
                    if let Err(err) = source.set_property(property) {
                        debug!("{}: cannot apply {property:?}: {err}", source.describe());
                    }
                }
                info!("connected to {}", source.describe());
                return true;
            }
            Err(err) => debug!("{}: open failed: {err}", source.describe()),
        }
    }
}

fn publish(shared: &Shared, frame: GrayImage, smooth: f64, frame_rate: Option<f64>) {
    // Only the acquisition thread writes `frame`.
    let prev = shared.lock().frame.clone();
    let next = match prev {
        Some(prev) => blend_frames(&prev, frame, smooth),
        None => frame,
    };
    let mut state = shared.lock();
    let first = state.frame.is_none();
    state.frame = Some(Arc::new(next));
    state.status = ConnectionStatus::Connected;
    state.frame_rate = frame_rate;
    state.frames += 1;
    if first {
        shared.first_frame.notify_all();
    }
}
