//! Shared test helpers: WAV fixtures, stub tool adapters, app builder
#![allow(dead_code)]

pub mod log_capture;

pub use log_capture::LogCapture;

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use vsplit_server::arena::{ActiveSessions, SessionArena};
use vsplit_server::pipeline::SessionPipeline;
use vsplit_server::tools::separator::{locate_stems, StemFilenames};
use vsplit_server::tools::{
    ExtractionFailed, SeparationFailed, StemPaths, StemSeparator, WaveformExtractor,
    CANONICAL_BITS_PER_SAMPLE, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE,
};
use vsplit_server::AppState;

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 5.0,
            sample_rate: 44100,
            channels: 1,
            frequency: 440.0,
        }
    }
}

/// Pure tone as an in-memory 16-bit WAV file
pub fn tone_wav_bytes(config: &AudioConfig) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let total_frames = (config.duration_seconds * config.sample_rate as f64) as usize;
        for i in 0..total_frames {
            let t = i as f32 / config.sample_rate as f32;
            let sample =
                (0.3 * (2.0 * std::f32::consts::PI * config.frequency * t).sin() * i16::MAX as f32) as i16;
            for _ in 0..config.channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn canonical_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CANONICAL_CHANNELS,
        sample_rate: CANONICAL_SAMPLE_RATE,
        bits_per_sample: CANONICAL_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Decodes a 44.1 kHz 16-bit WAV upload and rewrites it as canonical stereo
#[derive(Debug, Default)]
pub struct WavExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl WaveformExtractor for WavExtractor {
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ExtractionFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut reader =
            hound::WavReader::open(input).map_err(|e| ExtractionFailed::new(e.to_string()))?;
        let spec = reader.spec();
        if spec.sample_rate != CANONICAL_SAMPLE_RATE || spec.bits_per_sample != 16 {
            return Err(ExtractionFailed::new("stub only handles 44.1 kHz 16-bit input"));
        }
        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| ExtractionFailed::new(e.to_string()))?;

        let mut writer = hound::WavWriter::create(output, canonical_spec())
            .map_err(|e| ExtractionFailed::new(e.to_string()))?;
        for frame in samples.chunks(spec.channels as usize) {
            let left = frame[0];
            let right = *frame.get(1).unwrap_or(&left);
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer
            .finalize()
            .map_err(|e| ExtractionFailed::new(e.to_string()))
    }
}

/// Copies the upload verbatim; for non-WAV payloads
#[derive(Debug, Default)]
pub struct CopyExtractor;

#[async_trait]
impl WaveformExtractor for CopyExtractor {
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ExtractionFailed> {
        tokio::fs::copy(input, output)
            .await
            .map(|_| ())
            .map_err(|e| ExtractionFailed::new(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct FailingExtractor;

#[async_trait]
impl WaveformExtractor for FailingExtractor {
    async fn extract(&self, _input: &Path, _output: &Path) -> Result<(), ExtractionFailed> {
        Err(ExtractionFailed::new("Invalid data found when processing input"))
    }
}

/// Writes both stems into a nested `<out>/stub-model/<track>/` layout
///
/// The vocal stem copies the waveform; the background stem is silence of
/// the same length.
#[derive(Debug)]
pub struct NestedSeparator {
    pub names: StemFilenames,
}

impl Default for NestedSeparator {
    fn default() -> Self {
        Self {
            names: StemFilenames {
                vocals: "vocals.wav".to_string(),
                background: "no_vocals.wav".to_string(),
            },
        }
    }
}

#[async_trait]
impl StemSeparator for NestedSeparator {
    async fn separate(
        &self,
        waveform: &Path,
        output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        let track = waveform
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string());
        let track_dir = output_dir.join("stub-model").join(track);
        std::fs::create_dir_all(&track_dir).map_err(|e| SeparationFailed::new(e.to_string()))?;

        let bytes = std::fs::read(waveform).map_err(|e| SeparationFailed::new(e.to_string()))?;
        std::fs::write(track_dir.join(&self.names.vocals), &bytes)
            .map_err(|e| SeparationFailed::new(e.to_string()))?;

        match hound::WavReader::open(waveform) {
            Ok(reader) => {
                let spec = reader.spec();
                let frames = reader.duration();
                let mut writer = hound::WavWriter::create(track_dir.join(&self.names.background), spec)
                    .map_err(|e| SeparationFailed::new(e.to_string()))?;
                for _ in 0..(frames as usize * spec.channels as usize) {
                    writer.write_sample(0i16).unwrap();
                }
                writer
                    .finalize()
                    .map_err(|e| SeparationFailed::new(e.to_string()))?;
            }
            // Not a WAV: background is a copy too
            Err(_) => std::fs::write(track_dir.join(&self.names.background), &bytes)
                .map_err(|e| SeparationFailed::new(e.to_string()))?,
        }

        locate_stems(output_dir, &self.names)
    }
}

/// Reports success without writing anything
#[derive(Debug, Default)]
pub struct EmptySeparator;

#[async_trait]
impl StemSeparator for EmptySeparator {
    async fn separate(
        &self,
        _waveform: &Path,
        output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        std::fs::create_dir_all(output_dir).map_err(|e| SeparationFailed::new(e.to_string()))?;
        locate_stems(output_dir, &StemFilenames::default())
    }
}

#[derive(Debug, Default)]
pub struct FailingSeparator;

#[async_trait]
impl StemSeparator for FailingSeparator {
    async fn separate(
        &self,
        _waveform: &Path,
        output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        // Leave partial output behind, like a model that died halfway
        std::fs::create_dir_all(output_dir.join("model")).ok();
        std::fs::write(output_dir.join("model/vocals.wav"), b"half").ok();
        Err(SeparationFailed::new("CUDA out of memory"))
    }
}

#[derive(Debug, Default)]
pub struct PanickingSeparator;

#[async_trait]
impl StemSeparator for PanickingSeparator {
    async fn separate(
        &self,
        _waveform: &Path,
        _output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        panic!("model crashed");
    }
}

/// Blocks inside separation until released
#[derive(Debug, Default)]
pub struct GatedSeparator {
    pub entered: Notify,
    pub release: Notify,
    pub inner: NestedSeparator,
}

#[async_trait]
impl StemSeparator for GatedSeparator {
    async fn separate(
        &self,
        waveform: &Path,
        output_dir: &Path,
    ) -> Result<StemPaths, SeparationFailed> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.separate(waveform, output_dir).await
    }
}

/// Pipeline over a fresh arena root
pub fn pipeline(
    root: &Path,
    extractor: Arc<dyn WaveformExtractor>,
    separator: Arc<dyn StemSeparator>,
) -> SessionPipeline {
    let arena = SessionArena::new(root);
    arena.ensure_root().unwrap();
    SessionPipeline::new(arena, ActiveSessions::new(), extractor, separator)
}

/// App state with a generous upload cap
pub fn app_state(
    root: &Path,
    extractor: Arc<dyn WaveformExtractor>,
    separator: Arc<dyn StemSeparator>,
) -> AppState {
    AppState::new(pipeline(root, extractor, separator), 64 * 1024 * 1024)
}

/// Number of session directories under `root`
pub fn session_dir_count(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|rd| rd.flatten().filter(|e| e.path().is_dir()).count())
        .unwrap_or(0)
}

pub const BOUNDARY: &str = "vsplit-test-boundary";

/// multipart/form-data body with a single file field
pub fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    match filename {
        Some(name) => body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            )
            .as_bytes(),
        ),
        None => body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n", field).as_bytes(),
        ),
    }
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}
