//! FFmpeg-based audio adapters.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::ConverterError;
use super::process::{probe_tool, run_tool, spawn_error};
use super::traits::ConverterAdapter;
use super::types::{ConversionOutput, ConversionProgress, ConversionRequest};
use crate::config::ConvertersConfig;
use crate::registry::{ConverterId, TargetFormat};

/// What the ffmpeg invocation does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    /// Audio in, audio out.
    Transcode,
    /// Drop the video streams and re-encode the audio track.
    ExtractAudio,
}

/// Encoder settings for an audio target.
fn audio_codec_args(target: TargetFormat) -> Option<&'static [&'static str]> {
    match target {
        TargetFormat::Mp3 => Some(&["-c:a", "libmp3lame", "-b:a", "192k", "-f", "mp3"]),
        TargetFormat::Wav => Some(&["-c:a", "pcm_s16le", "-f", "wav"]),
        TargetFormat::Ogg => Some(&["-c:a", "libvorbis", "-q:a", "5", "-f", "ogg"]),
        TargetFormat::Flac => Some(&["-c:a", "flac", "-f", "flac"]),
        _ => None,
    }
}

/// Drives `ffmpeg` for audio transcoding and audio extraction.
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    timeout_secs: u64,
    log_level: String,
    mode: FfmpegMode,
}

impl FfmpegAdapter {
    pub fn new(config: &ConvertersConfig, mode: FfmpegMode) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout_secs: config.timeout_secs,
            log_level: config.ffmpeg_log_level.clone(),
            mode,
        }
    }

    pub fn transcoder(config: &ConvertersConfig) -> Self {
        Self::new(config, FfmpegMode::Transcode)
    }

    pub fn audio_extractor(config: &ConvertersConfig) -> Self {
        Self::new(config, FfmpegMode::ExtractAudio)
    }

    /// Builds ffmpeg arguments for the request.
    fn build_args(&self, request: &ConversionRequest) -> Result<Vec<String>, ConverterError> {
        let codec = audio_codec_args(request.target).ok_or_else(|| {
            ConverterError::unsupported(request.source.to_string(), request.target.to_string())
        })?;

        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-i".to_string(),
            request.input_path.to_string_lossy().to_string(),
        ];

        match self.mode {
            FfmpegMode::ExtractAudio => {
                args.extend(["-vn".to_string(), "-map".to_string(), "0:a:0".to_string()]);
            }
            FfmpegMode::Transcode => {
                // Cover art in mp3 sources would otherwise become a video stream.
                args.extend(["-map".to_string(), "0:a".to_string()]);
            }
        }

        args.extend(codec.iter().map(|s| s.to_string()));
        args.extend([
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);
        args.push(request.output_path.to_string_lossy().to_string());

        Ok(args)
    }

    /// Parses the duration out of ffprobe's JSON output.
    fn parse_duration(output: &str) -> Option<f64> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).ok()?;
        probe
            .format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    }

    /// Input duration in seconds, when ffprobe can tell.
    async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path);
        let output = run_tool("ffprobe", &self.ffprobe_path, command, 30)
            .await
            .ok()?;
        Self::parse_duration(&String::from_utf8_lossy(&output.stdout))
    }

    /// Runs the conversion with optional progress reporting.
    async fn run_conversion(
        &self,
        request: &ConversionRequest,
        progress_tx: Option<mpsc::Sender<ConversionProgress>>,
    ) -> Result<ConversionOutput, ConverterError> {
        let start = Instant::now();
        let args = self.build_args(request)?;

        if !tokio::fs::try_exists(&request.input_path).await? {
            return Err(ConverterError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        let duration_secs = match progress_tx {
            Some(_) => self.probe_duration(&request.input_path).await,
            None => None,
        };

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", &self.ffmpeg_path, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConverterError::tool_failed("ffmpeg", "stderr not captured", None))?;
        let mut reader = BufReader::new(stderr);

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();

        let timeout_duration = Duration::from_secs(self.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut last_progress_send = Instant::now();
            let progress_interval = Duration::from_millis(500);
            let mut error_output = String::new();
            let mut buf = Vec::new();

            // Read raw bytes so a non-UTF-8 line never stops draining the pipe.
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();

                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(line);
                    error_output.push('\n');
                }

                let (Some(tx), Some(dur), Some(re)) = (&progress_tx, duration_secs, &time_regex)
                else {
                    continue;
                };
                let Some(micros) = re
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok())
                else {
                    continue;
                };

                if last_progress_send.elapsed() >= progress_interval {
                    // out_time_ms is reported in microseconds
                    let percent = (micros / 1_000_000.0 / dur * 100.0) as f32;
                    let _ = tx.try_send(ConversionProgress::new(&request.job_id, percent));
                    last_progress_send = Instant::now();
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(ConverterError::tool_failed(
                        "ffmpeg",
                        format!("exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Ok(Err(e)) => return Err(ConverterError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(ConverterError::Timeout {
                    tool: "ffmpeg".to_string(),
                    timeout_secs: self.timeout_secs,
                });
            }
        }

        let size_bytes = match tokio::fs::metadata(&request.output_path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(ConverterError::OutputNotFound {
                    path: request.output_path.clone(),
                    waited_ms: 0,
                })
            }
        };

        debug!(
            job_id = %request.job_id,
            mode = ?self.mode,
            target = %request.target,
            size_bytes,
            "ffmpeg finished"
        );

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ConverterAdapter for FfmpegAdapter {
    fn id(&self) -> ConverterId {
        match self.mode {
            FfmpegMode::Transcode => ConverterId::AudioTranscode,
            FfmpegMode::ExtractAudio => ConverterId::AudioExtract,
        }
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        self.run_conversion(request, None).await
    }

    async fn convert_with_progress(
        &self,
        request: &ConversionRequest,
        progress_tx: mpsc::Sender<ConversionProgress>,
    ) -> Result<ConversionOutput, ConverterError> {
        self.run_conversion(request, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        probe_tool("ffmpeg", &self.ffmpeg_path, "-version").await?;
        probe_tool("ffprobe", &self.ffprobe_path, "-version").await
    }
}
