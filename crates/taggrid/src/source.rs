//! Frame sources consumed by the acquisition worker.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use taggrid_core::{resize_area, GrayImage};

use crate::config::CameraConfig;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source is not open")]
    NotOpen,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: ::image::ImageError,
    },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        source: ::image::ImageError,
    },
    #[error("no images found in {0}")]
    NoImages(PathBuf),
    #[error("end of image sequence")]
    EndOfSequence,
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Capture setting applied after every (re)connect.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureProperty {
    FrameSize { width: usize, height: usize },
    Fps(f64),
    FourCc([u8; 4]),
}

impl CaptureProperty {
    /// The properties requested by a camera configuration, in application order.
    pub fn from_config(camera: &CameraConfig) -> Vec<CaptureProperty> {
        let mut props = Vec::new();
        if let Some(fourcc) = camera.fourcc.as_deref() {
            let bytes = fourcc.as_bytes();
            if let [a, b, c, d] = bytes {
                props.push(CaptureProperty::FourCc([*a, *b, *c, *d]));
            }
        }
        if let Some([height, width]) = camera.size {
            props.push(CaptureProperty::FrameSize {
                width: width as usize,
                height: height as usize,
            });
        }
        if let Some(fps) = camera.fps {
            props.push(CaptureProperty::Fps(fps));
        }
        props
    }
}

/// A device or file that yields grayscale frames.
///
/// Owned by exactly one thread. `read` failing is the signal that the source
/// is disconnected; the caller then releases and re-opens it.
pub trait ImageSource: Send {
    fn open(&mut self) -> Result<(), SourceError>;
    fn read(&mut self) -> Result<GrayImage, SourceError>;
    fn set_property(&mut self, property: &CaptureProperty) -> Result<(), SourceError>;
    fn release(&mut self);
    /// Frames per second reported by the source, if it knows.
    fn frame_rate(&self) -> Option<f64>;
    fn describe(&self) -> String;
}

/// Decode an image file into a grayscale frame.
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, SourceError> {
    let path = path.as_ref();
    let img = ::image::open(path)
        .map_err(|source| SourceError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    Ok(GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.into_raw(),
    })
}

/// Encode a grayscale frame; the format follows the file extension.
pub fn save_gray(img: &GrayImage, path: impl AsRef<Path>) -> Result<(), SourceError> {
    let path = path.as_ref();
    let buf = ::image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .ok_or_else(|| SourceError::Unsupported(format!("{}x{} buffer", img.width, img.height)))?;
    buf.save(path).map_err(|source| SourceError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

/// Frame size and rate overrides shared by the file-backed sources.
#[derive(Clone, Debug, Default)]
struct Overrides {
    size: Option<(usize, usize)>,
    fps: Option<f64>,
}

impl Overrides {
    fn apply(&mut self, property: &CaptureProperty) -> Result<(), SourceError> {
        match *property {
            CaptureProperty::FrameSize { width, height } => {
                self.size = Some((width, height));
                Ok(())
            }
            CaptureProperty::Fps(fps) => {
                self.fps = Some(fps);
                Ok(())
            }
            CaptureProperty::FourCc(code) => Err(SourceError::Unsupported(format!(
                "fourcc {:?} on a file source",
                String::from_utf8_lossy(&code)
            ))),
        }
    }

    fn resize(&self, frame: GrayImage) -> GrayImage {
        match self.size {
            Some((w, h)) if (w, h) != (frame.width, frame.height) => {
                resize_area(&frame.view(), w, h)
            }
            _ => frame,
        }
    }
}

/// A still image served as an endless stream of identical frames.
#[derive(Debug)]
pub struct ImageFileSource {
    path: PathBuf,
    frame: Option<GrayImage>,
    overrides: Overrides,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: None,
            overrides: Overrides::default(),
        }
    }
}

impl ImageSource for ImageFileSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let frame = load_gray(&self.path)?;
        self.frame = Some(self.overrides.resize(frame));
        Ok(())
    }

    fn read(&mut self) -> Result<GrayImage, SourceError> {
        self.frame.clone().ok_or(SourceError::NotOpen)
    }

    fn set_property(&mut self, property: &CaptureProperty) -> Result<(), SourceError> {
        self.overrides.apply(property)?;
        if let Some(frame) = self.frame.take() {
            self.frame = Some(self.overrides.resize(frame));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.frame = None;
    }

    fn frame_rate(&self) -> Option<f64> {
        self.overrides.fps
    }

    fn describe(&self) -> String {
        format!("image {}", self.path.display())
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "pnm", "tif", "tiff"];

/// A directory of images played in file-name order.
///
/// Running past the last image is reported as a read failure, so the
/// reconnect path re-opens the directory and playback starts over.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    open: bool,
    overrides: Overrides,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            next: 0,
            open: false,
            overrides: Overrides::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let io_err = |source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

impl ImageSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let files = list_images(&self.dir)?;
        if files.is_empty() {
            return Err(SourceError::NoImages(self.dir.clone()));
        }
        debug!("{} images in {}", files.len(), self.dir.display());
        self.files = files;
        self.next = 0;
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<GrayImage, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        let path = self.files.get(self.next).ok_or(SourceError::EndOfSequence)?;
        self.next += 1;
        let frame = load_gray(path)?;
        Ok(self.overrides.resize(frame))
    }

    fn set_property(&mut self, property: &CaptureProperty) -> Result<(), SourceError> {
        self.overrides.apply(property)
    }

    fn release(&mut self) {
        self.open = false;
        self.next = 0;
    }

    fn frame_rate(&self) -> Option<f64> {
        self.overrides.fps
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

/// Create the source named by a camera configuration.
///
/// Camera devices are not built in; only file and directory sources are.
pub fn open_source(camera: &CameraConfig) -> Result<Box<dyn ImageSource>, SourceError> {
    match (&camera.filename, camera.id) {
        (Some(path), _) if path.is_dir() => Ok(Box::new(ImageSequenceSource::new(path))),
        (Some(path), _) => Ok(Box::new(ImageFileSource::new(path))),
        (None, Some(id)) => Err(SourceError::Unsupported(format!(
            "camera device {id}; configure `filename` with an image or a directory of images"
        ))),
        (None, None) => Err(SourceError::Unsupported("no frame source configured".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: usize, h: usize, offset: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| (x * 10 + y) as u8 + offset)
    }

    #[test]
    fn file_source_requires_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.png");
        save_gray(&gradient(8, 4, 0), &path).expect("save");

        let mut src = ImageFileSource::new(&path);
        assert!(matches!(src.read(), Err(SourceError::NotOpen)));
        src.open().expect("open");
        assert_eq!(src.read().expect("frame"), gradient(8, 4, 0));
        src.release();
        assert!(src.read().is_err());
    }

    #[test]
    fn frame_size_property_resizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.png");
        save_gray(&GrayImage::filled(8, 8, 40), &path).expect("save");

        let mut src = ImageFileSource::new(&path);
        src.set_property(&CaptureProperty::FrameSize {
            width: 4,
            height: 2,
        })
        .expect("size");
        src.set_property(&CaptureProperty::Fps(12.0)).expect("fps");
        assert!(src.set_property(&CaptureProperty::FourCc(*b"MJPG")).is_err());
        src.open().expect("open");
        let frame = src.read().expect("frame");
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(src.frame_rate(), Some(12.0));
    }

    #[test]
    fn sequence_ends_and_restarts_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..3u8 {
            save_gray(&gradient(4, 4, i), dir.path().join(format!("f{i}.png"))).expect("save");
        }
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let mut src = ImageSequenceSource::new(dir.path());
        src.open().expect("open");
        assert_eq!(src.len(), 3);
        for i in 0..3u8 {
            assert_eq!(src.read().expect("frame"), gradient(4, 4, i));
        }
        assert!(matches!(src.read(), Err(SourceError::EndOfSequence)));
        src.release();
        src.open().expect("reopen");
        assert_eq!(src.read().expect("frame"), gradient(4, 4, 0));
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut src = ImageSequenceSource::new(dir.path());
        assert!(matches!(src.open(), Err(SourceError::NoImages(_))));
    }

    #[test]
    fn devices_are_rejected() {
        let cam = CameraConfig {
            id: Some(0),
            ..CameraConfig::default()
        };
        assert!(matches!(open_source(&cam), Err(SourceError::Unsupported(_))));
    }

    #[test]
    fn properties_follow_config() {
        let cam = CameraConfig {
            size: Some([480, 640]),
            fps: Some(30.0),
            fourcc: Some("MJPG".into()),
            ..CameraConfig::default()
        };
        assert_eq!(
            CaptureProperty::from_config(&cam),
            vec![
                CaptureProperty::FourCc(*b"MJPG"),
                CaptureProperty::FrameSize {
                    width: 640,
                    height: 480
                },
                CaptureProperty::Fps(30.0),
            ]
        );
    }
}
