//! Engine backed by the whisper.cpp command line tool.
//!
//! Input audio is normalised to 16 kHz mono PCM with `ffmpeg` and then
//! handed to `whisper-cli`, which writes a JSON transcript next to the
//! scratch WAV.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::sync::Arc;

use log::{debug, warn};

use crate::engine::{
    DecodeOptions, EngineError, ModelTier, Segment, SpeechEngine, SpeechModel, Transcript,
};
use crate::sanitize::redact_path;

const OOM_MARKERS: &[&str] = &[
    "out of memory",
    "failed to allocate",
    "cannot allocate memory",
    "bad_alloc",
];

#[derive(Debug, Clone)]
pub struct WhisperCliEngine {
    whisper_bin: PathBuf,
    ffmpeg_bin: PathBuf,
    model_directory: PathBuf,
    scratch_directory: PathBuf,
}

impl WhisperCliEngine {
    pub fn new(
        whisper_bin: impl Into<PathBuf>,
        ffmpeg_bin: impl Into<PathBuf>,
        model_directory: impl Into<PathBuf>,
        scratch_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            whisper_bin: whisper_bin.into(),
            ffmpeg_bin: ffmpeg_bin.into(),
            model_directory: model_directory.into(),
            scratch_directory: scratch_directory.into(),
        }
    }

    pub fn model_path(&self, tier: ModelTier) -> PathBuf {
        self.model_directory.join(tier.model_file_name())
    }
}

impl SpeechEngine for WhisperCliEngine {
    fn name(&self) -> &str {
        "whisper-cli"
    }

    fn load(&self, tier: ModelTier) -> Result<Arc<dyn SpeechModel>, EngineError> {
        let model_path = self.model_path(tier);

        let metadata = match std::fs::metadata(&model_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::ModelNotFound(model_path));
            }
            Err(e) => return Err(EngineError::io(&model_path, &e)),
        };

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(EngineError::Load(format!(
                "'{}' is not a usable model file",
                redact_path(&model_path)
            )));
        }

        std::fs::create_dir_all(&self.scratch_directory)
            .map_err(|e| EngineError::io(&self.scratch_directory, &e))?;

        debug!(
            "Using whisper model {} ({} MB)",
            redact_path(&model_path),
            metadata.len() / (1024 * 1024)
        );

        Ok(Arc::new(WhisperCliModel {
            model_path,
            whisper_bin: self.whisper_bin.clone(),
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            scratch_directory: self.scratch_directory.clone(),
        }))
    }
}

struct WhisperCliModel {
    model_path: PathBuf,
    whisper_bin: PathBuf,
    ffmpeg_bin: PathBuf,
    scratch_directory: PathBuf,
}

/// Removes the listed scratch files when dropped.
struct ScratchFiles(Vec<PathBuf>);

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch file {}: {}", redact_path(path), e);
                }
            }
        }
    }
}

impl SpeechModel for WhisperCliModel {
    fn transcribe(
        &self,
        input: &Path,
        options: &DecodeOptions,
    ) -> Result<Transcript, EngineError> {
        let stem = format!("scratch-{}", uuid::Uuid::new_v4());
        let wav_path = self.scratch_directory.join(format!("{}.wav", stem));
        let output_prefix = self.scratch_directory.join(&stem);
        let json_path = self.scratch_directory.join(format!("{}.json", stem));
        let _scratch = ScratchFiles(vec![wav_path.clone(), json_path.clone()]);

        let mut ffmpeg = Command::new(&self.ffmpeg_bin);
        ffmpeg
            .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"])
            .arg(&wav_path);
        run_tool(&mut ffmpeg, "ffmpeg")?;

        let mut whisper = Command::new(&self.whisper_bin);
        whisper
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(&wav_path)
            .arg("-oj")
            .arg("-of")
            .arg(&output_prefix)
            .arg("-np")
            .args(whisper_args(options));
        run_tool(&mut whisper, "whisper-cli")?;

        let raw = std::fs::read_to_string(&json_path).map_err(|e| EngineError::io(&json_path, &e))?;
        parse_output(&raw)
    }
}

fn whisper_args(options: &DecodeOptions) -> Vec<String> {
    let threads = options.threads.unwrap_or_else(|| num_cpus::get().min(4));
    let mut args = vec![
        "-l".to_string(),
        options.language.clone().unwrap_or_else(|| "auto".to_string()),
        "-t".to_string(),
        threads.to_string(),
        "-tp".to_string(),
        options.temperature.to_string(),
    ];

    if !options.condition_on_previous_text {
        args.extend(["-mc".to_string(), "0".to_string()]);
    }
    if options.word_timestamps {
        args.extend(["-ml".to_string(), "1".to_string(), "-sow".to_string()]);
    }

    args
}

fn run_tool(command: &mut Command, program: &str) -> Result<Output, EngineError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| EngineError::Execution(format!("failed to start {}: {}", program, e)))?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(program, output.status, &stderr))
    }
}

fn classify_failure(program: &str, status: ExitStatus, stderr: &str) -> EngineError {
    let detail = stderr_tail(stderr);

    if killed_by_sigkill(status) {
        return EngineError::OutOfMemory(format!("{} was killed (SIGKILL)", program));
    }

    let lowered = stderr.to_lowercase();
    if OOM_MARKERS.iter().any(|m| lowered.contains(m)) {
        return EngineError::OutOfMemory(format!("{}: {}", program, detail));
    }

    EngineError::Execution(format!("{} exited with {}: {}", program, status, detail))
}

#[cfg(unix)]
fn killed_by_sigkill(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(9)
}

#[cfg(not(unix))]
fn killed_by_sigkill(_status: ExitStatus) -> bool {
    false
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}

#[derive(Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperResult {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

/// Milliseconds.
#[derive(Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

fn parse_output(raw: &str) -> Result<Transcript, EngineError> {
    let output: WhisperOutput = serde_json::from_str(raw)
        .map_err(|e| EngineError::Execution(format!("unreadable whisper output: {}", e)))?;

    let segments = output
        .transcription
        .into_iter()
        .map(|s| Segment {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text,
        })
        .collect();

    Ok(Transcript {
        segments,
        language: output.result.and_then(|r| r.language),
    })
}
