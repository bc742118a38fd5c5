//! Text extraction from inventory images.
//!
//! OCR itself is an external capability behind [`OcrBackend`]; the shipped
//! backend shells out to the `tesseract` binary. [`OcrExtractor`] runs two
//! passes per image (as-is and contrast-normalized) and keeps the longer
//! result, which recovers noticeably more label text on low-contrast photos.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

const OCR_LANGUAGE: &str = "eng";
// LSTM engine, uniform-block segmentation: suited to short label-like text.
const TESSERACT_OEM: &str = "3";
const TESSERACT_PSM: &str = "6";
const TESSERACT_CMD_ENV: &str = "TESSERACT_CMD";

const UPSCALE_THRESHOLD_PX: u32 = 1400;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("tesseract not found (install tesseract-ocr or set TESSERACT_CMD)")]
    BackendNotAvailable,

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The opaque text-recognition capability.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_path: &Path) -> Result<String, OcrError>;
}

/// Runs the `tesseract` command-line binary on an image file.
pub struct TesseractBackend {
    command: PathBuf,
}

impl TesseractBackend {
    /// Resolves the binary from `TESSERACT_CMD`, falling back to `PATH`.
    pub fn resolve() -> Result<Self, OcrError> {
        if let Ok(raw) = std::env::var(TESSERACT_CMD_ENV) {
            let candidate = PathBuf::from(raw.trim());
            if candidate.is_file() {
                return Ok(Self { command: candidate });
            }
        }

        match which::which("tesseract") {
            Ok(command) => Ok(Self { command }),
            Err(_) => Err(OcrError::BackendNotAvailable),
        }
    }
}

impl OcrBackend for TesseractBackend {
    fn recognize(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.command)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", OCR_LANGUAGE])
            .args(["--oem", TESSERACT_OEM])
            .args(["--psm", TESSERACT_PSM])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::OcrFailed(stderr.trim().to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable)
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

/// Grayscale + contrast stretch, upscaling small images 2x so short codes
/// render enough pixels for recognition.
pub fn preprocess(img: &DynamicImage) -> GrayImage {
    let gray = stretch_contrast(&img.to_luma8());
    let (w, h) = gray.dimensions();
    if w.max(h) < UPSCALE_THRESHOLD_PX {
        image::imageops::resize(&gray, (w * 2).max(1), (h * 2).max(1), FilterType::Lanczos3)
    } else {
        gray
    }
}

fn stretch_contrast(gray: &GrayImage) -> GrayImage {
    let (mut min, mut max) = (u8::MAX, u8::MIN);
    for pixel in gray.pixels() {
        min = min.min(pixel.0[0]);
        max = max.max(pixel.0[0]);
    }

    if min >= max {
        return gray.clone();
    }

    let range = (max - min) as f32;
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let value = (pixel.0[0] - min) as f32;
        pixel.0[0] = (value * 255.0 / range).round() as u8;
    }
    out
}

/// Extraction capability the indexer dispatches to its worker pool. A failed
/// extraction degrades to an empty-text result with the error preserved.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image_path: &Path) -> (String, Option<String>);
}

pub struct OcrExtractor {
    backend: Arc<dyn OcrBackend>,
    retries: u32,
    backoff: Duration,
}

impl OcrExtractor {
    pub fn new(backend: Arc<dyn OcrBackend>, retries: u32, backoff: Duration) -> Self {
        Self {
            backend,
            retries,
            backoff,
        }
    }

    fn extract_inner(&self, image_path: &Path) -> Result<String, OcrError> {
        let img = image::open(image_path)?;

        let raw_text = self.recognize_with_retry(image_path)?;

        let processed = preprocess(&img);
        let tmp = tempfile::Builder::new()
            .prefix("partfinder-ocr-")
            .suffix(".png")
            .tempfile()?;
        processed.save(tmp.path())?;
        let processed_text = self.recognize_with_retry(tmp.path())?;

        // Tie goes to the processed pass.
        let keep_processed =
            processed_text.trim().chars().count() >= raw_text.trim().chars().count();
        Ok(if keep_processed {
            processed_text
        } else {
            raw_text
        })
    }

    fn recognize_with_retry(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut attempt = 0u32;
        loop {
            match self.backend.recognize(image_path) {
                Ok(text) => return Ok(text),
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "ocr attempt {attempt} failed for {}: {err}, retrying",
                        image_path.display()
                    );
                    std::thread::sleep(self.backoff * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl TextExtractor for OcrExtractor {
    fn extract(&self, image_path: &Path) -> (String, Option<String>) {
        match self.extract_inner(image_path) {
            Ok(text) => (text, None),
            Err(err) => {
                tracing::debug!("extraction failed for {}: {err}", image_path.display());
                (String::new(), Some(err.to_string()))
            }
        }
    }
}
