/*!
 * Audio extraction from video containers.
 *
 * The ASR engine consumes 16kHz mono WAV, so the first pipeline stage
 * shells out to ffmpeg to pull the audio track out of the input video into
 * a temporary file. A stub extractor is provided for running the backend
 * against mock engines without ffmpeg installed.
 */

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tempfile::TempDir;
use tokio::process::Command;

use crate::errors::{AppError, AppResult};

/// Sample rate the ASR engines expect
const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Hard cap on ffmpeg runtime for a single extraction
const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Extracted audio, deleted from disk when dropped
#[derive(Debug)]
pub struct ExtractedAudio {
    path: PathBuf,
    /// Owns the temporary directory holding the WAV file
    _dir: TempDir,
}

impl ExtractedAudio {
    /// Path to the extracted WAV file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Extracts an audio track suitable for speech recognition
#[async_trait]
pub trait AudioExtractor: Send + Sync + Debug {
    /// Extract the audio track of `video_path` to a 16kHz mono WAV file
    async fn extract(&self, video_path: &Path) -> AppResult<ExtractedAudio>;
}

/// Extractor backed by the system ffmpeg binary
#[derive(Debug, Default)]
pub struct FfmpegExtractor;

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video_path: &Path) -> AppResult<ExtractedAudio> {
        if !video_path.exists() {
            return Err(AppError::InvalidInput(format!(
                "video file not found: {}",
                video_path.display()
            )));
        }

        let dir = TempDir::new()?;
        let wav_path = dir.path().join("audio.wav");

        debug!(
            "Extracting audio: {} -> {}",
            video_path.display(),
            wav_path.display()
        );

        let output = tokio::time::timeout(
            EXTRACTION_TIMEOUT,
            Command::new("ffmpeg")
                .arg("-y")
                .arg("-i")
                .arg(video_path)
                .arg("-vn")
                .arg("-acodec")
                .arg("pcm_s16le")
                .arg("-ar")
                .arg(TARGET_SAMPLE_RATE.to_string())
                .arg("-ac")
                .arg("1")
                .arg(&wav_path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| {
            AppError::IoFailure(format!(
                "ffmpeg timed out after {}s extracting {}",
                EXTRACTION_TIMEOUT.as_secs(),
                video_path.display()
            ))
        })?
        .map_err(|e| AppError::IoFailure(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("unknown error");
            warn!("ffmpeg failed on {}: {}", video_path.display(), detail);
            return Err(AppError::IoFailure(format!(
                "audio extraction failed: {}",
                detail
            )));
        }

        if !wav_path.exists() {
            return Err(AppError::IoFailure(
                "ffmpeg reported success but produced no audio file".to_string(),
            ));
        }

        Ok(ExtractedAudio {
            path: wav_path,
            _dir: dir,
        })
    }
}

/// Extractor that writes an empty WAV header instead of invoking ffmpeg
///
/// Used with the mock engine factory for development and tests.
#[derive(Debug, Default)]
pub struct StubExtractor;

#[async_trait]
impl AudioExtractor for StubExtractor {
    async fn extract(&self, video_path: &Path) -> AppResult<ExtractedAudio> {
        if !video_path.exists() {
            return Err(AppError::InvalidInput(format!(
                "video file not found: {}",
                video_path.display()
            )));
        }

        let dir = TempDir::new()?;
        let wav_path = dir.path().join("audio.wav");
        tokio::fs::write(&wav_path, wav_header()).await?;

        Ok(ExtractedAudio {
            path: wav_path,
            _dir: dir,
        })
    }
}

/// Minimal RIFF/WAVE header for a zero-sample 16kHz mono PCM file
fn wav_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&36u32.to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&TARGET_SAMPLE_RATE.to_le_bytes());
    header.extend_from_slice(&(TARGET_SAMPLE_RATE * 2).to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&0u32.to_le_bytes());
    header
}
