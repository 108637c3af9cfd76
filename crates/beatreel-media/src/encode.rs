//! Frame sequence + audio encoding.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Encoder settings.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    /// 4:2:0 keeps the output playable everywhere
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Kill FFmpeg after this long
    pub timeout: Duration,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 20,
            preset: "veryfast".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl EncoderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("ENCODER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        }
    }
}

/// Everything one encode pass needs.
#[derive(Debug, Clone)]
pub struct EncodeSpec {
    /// Directory holding the numbered frame images
    pub frames_dir: PathBuf,
    /// printf-style file name pattern inside `frames_dir`
    pub frame_pattern: String,
    pub frame_rate: u32,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
    /// Used only for progress logging
    pub expected_frames: u64,
}

/// Multiplexes a frame sequence and an audio file into one video.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, spec: &EncodeSpec) -> MediaResult<()>;
}

/// [`VideoEncoder`] backed by the `ffmpeg` CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Single pass from image sequence + audio to MP4, truncated to the
    /// shorter stream.
    pub fn build_command(&self, spec: &EncodeSpec, output: &Path) -> FfmpegCommand {
        let c = &self.config;
        let frame_rate = spec.frame_rate.to_string();

        FfmpegCommand::new(output)
            .input_with_args(
                spec.frames_dir.join(&spec.frame_pattern),
                ["-framerate", frame_rate.as_str(), "-start_number", "0"],
            )
            .input(&spec.audio_path)
            .map("0:v:0")
            .map("1:a:0")
            .video_codec(c.video_codec.as_str())
            .preset(c.preset.as_str())
            .crf(c.crf)
            .pixel_format(c.pixel_format.as_str())
            .frame_rate(spec.frame_rate)
            .audio_codec(c.audio_codec.as_str())
            .audio_bitrate(c.audio_bitrate.as_str())
            .shortest()
            .faststart()
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, spec: &EncodeSpec) -> MediaResult<()> {
        if !spec.audio_path.exists() {
            return Err(MediaError::FileNotFound(spec.audio_path.clone()));
        }
        if !spec.frames_dir.is_dir() {
            return Err(MediaError::FileNotFound(spec.frames_dir.clone()));
        }

        // Write next to the final file so a failed pass never leaves
        // something that looks like a finished output.
        let partial = partial_path(&spec.output_path);
        let cmd = self.build_command(spec, &partial);
        let runner = FfmpegRunner::new().with_timeout(self.config.timeout);

        let expected = spec.expected_frames;
        let started = Instant::now();
        let result = runner
            .run_with_progress(&cmd, move |p| {
                debug!(
                    frame = p.frame,
                    fraction = p.fraction(expected),
                    speed = p.speed,
                    "Encoding progress"
                );
            })
            .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, &spec.output_path).await?;
        info!(
            output = %spec.output_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Encode finished"
        );
        Ok(())
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = output
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    output.with_file_name(format!("{}.partial.{}", stem, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(root: &Path) -> EncodeSpec {
        EncodeSpec {
            frames_dir: root.join("frames"),
            frame_pattern: "frame_%06d.png".to_string(),
            frame_rate: 30,
            audio_path: root.join("audio.mp3"),
            output_path: root.join("output.mp4"),
            expected_frames: 300,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn test_command_enforces_output_contract() {
        let root = Path::new("/work/job");
        let spec = spec(root);
        let encoder = FfmpegEncoder::default();
        let args = encoder
            .build_command(&spec, &partial_path(&spec.output_path))
            .build_args();

        assert_eq!(value_after(&args, "-framerate"), "30");
        assert_eq!(value_after(&args, "-i"), "/work/job/frames/frame_%06d.png");
        assert_eq!(value_after(&args, "-pix_fmt"), "yuv420p");
        assert_eq!(value_after(&args, "-r"), "30");
        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(value_after(&args, "-c:a"), "aac");
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().unwrap(), "/work/job/output.partial.mp4");
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/a/output.mp4")),
            PathBuf::from("/a/output.partial.mp4")
        );
    }

    #[tokio::test]
    async fn test_missing_audio_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("frames")).unwrap();

        let err = FfmpegEncoder::default().encode(&spec(dir.path())).await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!dir.path().join("output.mp4").exists());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_encode_truncates_to_shorter_stream() {
        use tokio::process::Command;

        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        std::fs::create_dir_all(&spec.frames_dir).unwrap();

        // 1 s of frames against 3 s of audio
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "lavfi", "-i", "color=c=red:s=64x64:r=30"])
            .args(["-frames:v", "30", "-start_number", "0"])
            .arg(spec.frames_dir.join("frame_%06d.png"))
            .status()
            .await
            .unwrap();
        assert!(status.success());
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "lavfi", "-i", "sine=d=3"])
            .arg(&spec.audio_path)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        FfmpegEncoder::default().encode(&spec).await.unwrap();
        assert!(spec.output_path.exists());
        assert!(!partial_path(&spec.output_path).exists());
    }
}
