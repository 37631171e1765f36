//! The media runner interface over ffmpeg/ffprobe.
//!
//! Every ffmpeg touchpoint of the analyzer and the pipeline goes through
//! [`MediaRunner`]; tests substitute a tracking fake that records argument
//! vectors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::command::run_command_with_logs;
use crate::{Error, Result};

/// Media engine capability set.
#[async_trait]
pub trait MediaRunner: Send + Sync {
    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;
    /// Whether the file carries a video stream.
    async fn probe_has_video(&self, path: &Path) -> Result<bool>;
    /// Trim `head_secs` off the front of a video, re-encoded (frame-accurate).
    async fn trim_video_head(&self, input: &Path, output: &Path, head_secs: f64) -> Result<()>;
    /// Trim `head_secs` off the front of an audio file to 44.1 kHz stereo PCM.
    async fn trim_audio_head(&self, input: &Path, output: &Path, head_secs: f64) -> Result<()>;
    /// Extract `[start, start+duration)` from a video, re-encoded with a
    /// compatible pixel format and fast-start.
    async fn slice_video_reencode(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()>;
    /// Extract `[start, start+duration)` from a video by stream copy (preview
    /// slices, where speed beats frame accuracy).
    async fn slice_video_copy(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()>;
    /// Extract `[start, start+duration)` of audio as 44.1 kHz stereo PCM WAV.
    async fn extract_audio_slice(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()>;
    /// Transcode any audio container to 44.1 kHz stereo PCM WAV.
    async fn transcode_to_wav(&self, input: &Path, output: &Path) -> Result<()>;
    /// Extract the mono 16 kHz PCM alignment track from a video.
    async fn extract_alignment_track(&self, input: &Path, output: &Path) -> Result<()>;
    /// Mux a video stream with an audio slice. H.264 veryfast, AAC 192k,
    /// stops at the shorter stream. No delay filter: pre-trim has already
    /// aligned the streams.
    async fn mux_segment(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
    /// Concatenate segments by stream copy via a concat manifest.
    async fn concat_copy(&self, segments: &[PathBuf], output: &Path) -> Result<()>;
}

/// ffmpeg/ffprobe-backed [`MediaRunner`].
pub struct FfmpegRunner {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!("ffmpeg args: {:?}", args);
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(args);

        let output = run_command_with_logs(&mut cmd).await?;
        if !output.status.success() {
            return Err(Error::media(format!(
                "ffmpeg exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                output.last_error().unwrap_or("unknown ffmpeg error")
            )));
        }
        Ok(())
    }

    async fn run_ffprobe(&self, args: &[String]) -> Result<String> {
        debug!("ffprobe args: {:?}", args);
        let output = Command::new(&self.ffprobe_path)
            .args(args)
            .env("LC_ALL", "C")
            .output()
            .await
            .map_err(|e| Error::media(format!("Failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr.lines().rev().take(5).collect::<Vec<_>>();
            return Err(Error::media(format!(
                "ffprobe exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Argument builders, factored out so tests can assert the exact vectors.
pub(crate) mod args {
    use super::path_arg;
    use std::path::Path;

    pub fn probe_duration(input: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            path_arg(input),
        ]
    }

    pub fn probe_has_video(input: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            "stream=codec_type".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            path_arg(input),
        ]
    }

    pub fn trim_video_head(input: &Path, output: &Path, head_secs: f64) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-ss".into(),
            format!("{:.3}", head_secs),
            "-i".into(),
            path_arg(input),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            path_arg(output),
        ]
    }

    pub fn trim_audio_head(input: &Path, output: &Path, head_secs: f64) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-ss".into(),
            format!("{:.3}", head_secs),
            "-i".into(),
            path_arg(input),
            "-ac".into(),
            "2".into(),
            "-ar".into(),
            "44100".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
            path_arg(output),
        ]
    }

    pub fn slice_video_reencode(
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-ss".into(),
            format!("{:.3}", start),
            "-i".into(),
            path_arg(input),
            "-t".into(),
            format!("{:.3}", duration),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(output),
        ]
    }

    pub fn slice_video_copy(input: &Path, output: &Path, start: f64, duration: f64) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            path_arg(input),
            "-ss".into(),
            format!("{:.3}", start),
            "-t".into(),
            format!("{:.3}", duration),
            "-c".into(),
            "copy".into(),
            path_arg(output),
        ]
    }

    pub fn extract_audio_slice(
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-ss".into(),
            format!("{:.3}", start),
            "-i".into(),
            path_arg(input),
            "-t".into(),
            format!("{:.3}", duration),
            "-ac".into(),
            "2".into(),
            "-ar".into(),
            "44100".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
            path_arg(output),
        ]
    }

    pub fn transcode_to_wav(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            path_arg(input),
            "-ac".into(),
            "2".into(),
            "-ar".into(),
            "44100".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
            path_arg(output),
        ]
    }

    pub fn extract_alignment_track(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            path_arg(input),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            "16000".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
            path_arg(output),
        ]
    }

    pub fn mux_segment(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-shortest".into(),
            path_arg(output),
        ]
    }

    pub fn concat_copy(manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(manifest),
            "-c".into(),
            "copy".into(),
            path_arg(output),
        ]
    }
}

#[async_trait]
impl MediaRunner for FfmpegRunner {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let stdout = self.run_ffprobe(&args::probe_duration(path)).await?;
        stdout
            .parse::<f64>()
            .map_err(|_| Error::media(format!("Unparsable duration from ffprobe: {:?}", stdout)))
    }

    async fn probe_has_video(&self, path: &Path) -> Result<bool> {
        let stdout = self.run_ffprobe(&args::probe_has_video(path)).await?;
        Ok(stdout.contains("video"))
    }

    async fn trim_video_head(&self, input: &Path, output: &Path, head_secs: f64) -> Result<()> {
        self.run_ffmpeg(&args::trim_video_head(input, output, head_secs))
            .await
    }

    async fn trim_audio_head(&self, input: &Path, output: &Path, head_secs: f64) -> Result<()> {
        self.run_ffmpeg(&args::trim_audio_head(input, output, head_secs))
            .await
    }

    async fn slice_video_reencode(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.run_ffmpeg(&args::slice_video_reencode(input, output, start, duration))
            .await
    }

    async fn slice_video_copy(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.run_ffmpeg(&args::slice_video_copy(input, output, start, duration))
            .await
    }

    async fn extract_audio_slice(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.run_ffmpeg(&args::extract_audio_slice(input, output, start, duration))
            .await
    }

    async fn transcode_to_wav(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(&args::transcode_to_wav(input, output)).await
    }

    async fn extract_alignment_track(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(&args::extract_alignment_track(input, output))
            .await
    }

    async fn mux_segment(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(&args::mux_segment(video, audio, output)).await
    }

    async fn concat_copy(&self, segments: &[PathBuf], output: &Path) -> Result<()> {
        let manifest = output.with_extension("txt");
        let mut contents = String::new();
        for segment in segments {
            let absolute = if segment.is_absolute() {
                segment.clone()
            } else {
                std::env::current_dir()?.join(segment)
            };
            contents.push_str(&format!("file '{}'\n", absolute.display()));
        }
        tokio::fs::write(&manifest, contents).await?;

        let result = self.run_ffmpeg(&args::concat_copy(&manifest, output)).await;
        let _ = tokio::fs::remove_file(&manifest).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mux_args_have_no_delay_filter() {
        let argv = args::mux_segment(
            Path::new("/w/synth_000.mp4"),
            Path::new("/w/audio_000.wav"),
            Path::new("/w/segment_000.mp4"),
        );
        // Streams are already aligned by the pre-trim; the mux must not
        // reintroduce per-chunk delay.
        assert!(!argv.iter().any(|a| a.contains("adelay") || a.contains("itsoffset")));
        assert!(argv.contains(&"-shortest".to_string()));
        assert!(argv.contains(&"192k".to_string()));
        assert!(argv.windows(2).any(|w| w[0] == "-map" && w[1] == "0:v:0"));
        assert!(argv.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a:0"));
    }

    #[test]
    fn test_video_slice_is_reencoded_with_compat_pixfmt() {
        let argv = args::slice_video_reencode(
            Path::new("/w/in.mp4"),
            Path::new("/w/chunk_001.mp4"),
            8.0,
            8.0,
        );
        assert!(argv.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(argv.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv420p"));
        assert!(argv.windows(2).any(|w| w[0] == "-ss" && w[1] == "8.000"));
        assert!(argv.windows(2).any(|w| w[0] == "-t" && w[1] == "8.000"));
        assert!(!argv.contains(&"copy".to_string()));
    }

    #[test]
    fn test_audio_slice_is_pcm_stereo_44k1() {
        let argv = args::extract_audio_slice(
            Path::new("/w/master.wav"),
            Path::new("/w/audio_001.wav"),
            8.0,
            6.5,
        );
        assert!(argv.windows(2).any(|w| w[0] == "-ar" && w[1] == "44100"));
        assert!(argv.windows(2).any(|w| w[0] == "-ac" && w[1] == "2"));
        assert!(argv.windows(2).any(|w| w[0] == "-c:a" && w[1] == "pcm_s16le"));
        assert!(argv.windows(2).any(|w| w[0] == "-t" && w[1] == "6.500"));
    }

    #[test]
    fn test_alignment_track_is_mono_16k() {
        let argv = args::extract_alignment_track(
            Path::new("/w/video.mp4"),
            Path::new("/w/video_audio.wav"),
        );
        assert!(argv.windows(2).any(|w| w[0] == "-ar" && w[1] == "16000"));
        assert!(argv.windows(2).any(|w| w[0] == "-ac" && w[1] == "1"));
    }

    #[test]
    fn test_concat_is_stream_copy() {
        let argv = args::concat_copy(Path::new("/w/final.txt"), Path::new("/w/final.mp4"));
        assert!(argv.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(argv.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
    }
}
