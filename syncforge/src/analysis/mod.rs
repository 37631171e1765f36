//! Media analyzer: sync-offset estimation and tempo-driven chunk duration.

pub mod dsp;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::database::repositories::{GenerationRepository, JobRepository};
use crate::domain::types::CHUNK_LIMIT_SECS;
use crate::domain::{AnalysisStatus, GenerationStage};
use crate::media::MediaRunner;
use crate::storage::AssetFetcher;
use crate::{Error, Result};

/// Sentinel job id that skips persistence (debug requests).
pub const DEBUG_JOB_ID: &str = "debug";

/// Overall ceiling on one analysis run, downloads included.
const ANALYSIS_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(600);

/// Cross-correlation offsets below this magnitude trigger the onset fallback.
const NEAR_ZERO_OFFSET_SECS: f64 = 0.1;

/// Minimum first-onset time for the fallback to replace the offset.
const MIN_FALLBACK_ONSET_SECS: f64 = 0.3;

/// Diagnostics for the onset-based fallback decision.
#[derive(Debug, Clone, Serialize)]
pub struct OnsetDiagnostics {
    pub fallback_used: bool,
    pub first_onset: Option<f64>,
    pub reason: String,
}

/// Full analysis result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Signed seconds between music start in the master and in the video.
    pub sync_offset: f64,
    /// Tempo used for chunking (user-declared when valid).
    pub bpm: f64,
    /// Whole-measure chunk duration, at most 9.0 s.
    pub chunk_duration: f64,
    pub measures_per_chunk: u32,
    /// Normalized correlation strength (1.0 = perfect match).
    pub correlation_strength: f64,
    /// Library tempo estimate, computed even when the user value wins.
    pub estimated_bpm: f64,
    pub onset_detection: OnsetDiagnostics,
}

/// Tempo-driven chunk duration: whole 4/4 measures, never above the 9 s
/// ceiling, never below one measure.
pub fn compute_chunk_duration(bpm: f64) -> (u32, f64) {
    let seconds_per_beat = 60.0 / bpm;
    let seconds_per_measure = 4.0 * seconds_per_beat;

    let mut measures_per_chunk = ((CHUNK_LIMIT_SECS / seconds_per_measure).floor() as u32).max(1);
    let mut chunk_duration = measures_per_chunk as f64 * seconds_per_measure;

    if chunk_duration > CHUNK_LIMIT_SECS {
        measures_per_chunk = measures_per_chunk.saturating_sub(1);
        chunk_duration = measures_per_chunk as f64 * seconds_per_measure;
    }

    if chunk_duration < seconds_per_measure {
        measures_per_chunk = 1;
        chunk_duration = seconds_per_measure;
    }

    (measures_per_chunk, chunk_duration)
}

/// Apply the onset fallback rule to the primary cross-correlation offset.
///
/// The fallback fires iff the primary offset is near zero AND the first
/// detected onset in the video track is late enough to indicate dead space
/// the correlation missed.
pub fn resolve_sync_offset(primary: f64, first_onset: Option<f64>) -> (f64, OnsetDiagnostics) {
    if primary.abs() >= NEAR_ZERO_OFFSET_SECS {
        return (
            primary,
            OnsetDiagnostics {
                fallback_used: false,
                first_onset,
                reason: "cross-correlation offset accepted".to_string(),
            },
        );
    }

    match first_onset {
        Some(onset) if onset > MIN_FALLBACK_ONSET_SECS => (
            onset,
            OnsetDiagnostics {
                fallback_used: true,
                first_onset: Some(onset),
                reason: format!(
                    "near-zero correlation offset; first onset at {:.3}s indicates dead space",
                    onset
                ),
            },
        ),
        Some(onset) => (
            primary,
            OnsetDiagnostics {
                fallback_used: false,
                first_onset: Some(onset),
                reason: format!("first onset at {:.3}s is too early to be dead space", onset),
            },
        ),
        None => (
            primary,
            OnsetDiagnostics {
                fallback_used: false,
                first_onset: None,
                reason: "no onsets detected in the video track".to_string(),
            },
        ),
    }
}

/// Whether a URL's file extension (query/fragment stripped) is `.wav`.
pub fn has_wav_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".wav")
}

/// The analyzer service.
pub struct MediaAnalyzer {
    fetcher: Arc<dyn AssetFetcher>,
    media: Arc<dyn MediaRunner>,
    jobs: Arc<dyn JobRepository>,
    generations: Arc<dyn GenerationRepository>,
}

impl MediaAnalyzer {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        media: Arc<dyn MediaRunner>,
        jobs: Arc<dyn JobRepository>,
        generations: Arc<dyn GenerationRepository>,
    ) -> Self {
        Self {
            fetcher,
            media,
            jobs,
            generations,
        }
    }

    /// Analyze the (video, audio) pair and persist the result against the
    /// job and its generation rollup. A `None` or `"debug"` job id skips
    /// persistence but still returns the report.
    pub async fn analyze(
        &self,
        job_id: Option<&str>,
        video_url: &str,
        audio_url: &str,
        user_bpm: Option<f64>,
    ) -> Result<AnalysisReport> {
        let persisted_job = job_id.filter(|id| *id != DEBUG_JOB_ID);

        let outcome = tokio::time::timeout(
            ANALYSIS_TIMEOUT,
            self.analyze_inner(persisted_job, video_url, audio_url, user_bpm),
        )
        .await
        .unwrap_or_else(|_| {
            Err(Error::Timeout(format!(
                "Analysis exceeded {}s",
                ANALYSIS_TIMEOUT.as_secs()
            )))
        });

        match outcome {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Some(job_id) = persisted_job {
                    let msg = e.user_message();
                    if let Err(db_err) = self.jobs.mark_analysis_failed(job_id, &msg).await {
                        warn!(job_id, "Failed to record analysis failure: {}", db_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn analyze_inner(
        &self,
        job_id: Option<&str>,
        video_url: &str,
        audio_url: &str,
        user_bpm: Option<f64>,
    ) -> Result<AnalysisReport> {
        let mut generation_id = None;
        if let Some(job_id) = job_id {
            let job = self.jobs.get_job(job_id).await?;
            generation_id = job.generation_id.clone();

            self.jobs
                .set_analysis_status(job_id, AnalysisStatus::Analyzing.as_str())
                .await?;
            if let Some(generation_id) = &generation_id {
                self.generations
                    .update_progress(generation_id, GenerationStage::Analyzing, 5)
                    .await?;
            }
        }

        let workdir = tempfile::tempdir()?;
        let video_path = workdir.path().join("video.mp4");
        let audio_download_path = workdir.path().join("audio_download");
        let video_audio_path = workdir.path().join("video_audio.wav");

        info!(video_url, audio_url, "Analyzing media pair");
        self.fetcher.fetch(video_url, &video_path).await?;
        self.fetcher.fetch(audio_url, &audio_download_path).await?;

        // Normalize the master to 44.1 kHz stereo PCM unless it is already a
        // WAV.
        let master_audio_path = if has_wav_extension(audio_url) {
            let wav = workdir.path().join("master_audio.wav");
            tokio::fs::rename(&audio_download_path, &wav).await?;
            wav
        } else {
            let wav = workdir.path().join("master_audio.wav");
            self.media
                .transcode_to_wav(&audio_download_path, &wav)
                .await?;
            wav
        };

        self.media
            .extract_alignment_track(&video_path, &video_audio_path)
            .await?;

        let report = self
            .compute_report(&master_audio_path, &video_audio_path, user_bpm)
            .await?;

        if let Some(job_id) = job_id {
            self.jobs
                .update_job_analysis(
                    job_id,
                    report.sync_offset,
                    report.bpm,
                    report.chunk_duration,
                )
                .await?;
            if let Some(generation_id) = &generation_id {
                self.generations
                    .update_progress(generation_id, GenerationStage::Analyzing, 10)
                    .await?;
            }
        }

        info!(
            sync_offset = report.sync_offset,
            bpm = report.bpm,
            chunk_duration = report.chunk_duration,
            fallback = report.onset_detection.fallback_used,
            "Analysis complete"
        );
        Ok(report)
    }

    /// The sample-math half over already-extracted alignment tracks. Runs on
    /// a blocking thread since FFT over 15 s windows is CPU work.
    pub async fn compute_report(
        &self,
        master_audio_path: &Path,
        video_audio_path: &Path,
        user_bpm: Option<f64>,
    ) -> Result<AnalysisReport> {
        let master_path = master_audio_path.to_path_buf();
        let video_path = video_audio_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let master = dsp::load_alignment_signal(&master_path)?;
            let video = dsp::load_alignment_signal(&video_path)?;

            let (primary, correlation_strength) =
                dsp::cross_correlate_offset(&master, &video, dsp::ANALYSIS_SAMPLE_RATE)?;

            let first_onset = if primary.abs() < NEAR_ZERO_OFFSET_SECS {
                dsp::detect_onsets(&video, dsp::ANALYSIS_SAMPLE_RATE)
                    .first()
                    .copied()
            } else {
                None
            };
            let (sync_offset, onset_detection) = resolve_sync_offset(primary, first_onset);

            // The library estimate is always computed for diagnostics, even
            // when a valid user tempo wins.
            let estimated_bpm = dsp::estimate_bpm(&master, dsp::ANALYSIS_SAMPLE_RATE);
            let bpm = match user_bpm {
                Some(user) if user > 0.0 && user <= 300.0 => user,
                _ => estimated_bpm,
            };

            let (measures_per_chunk, chunk_duration) = compute_chunk_duration(bpm);

            Ok(AnalysisReport {
                sync_offset,
                bpm,
                chunk_duration,
                measures_per_chunk,
                correlation_strength,
                estimated_bpm,
                onset_detection,
            })
        })
        .await
        .map_err(|e| Error::Other(format!("Analysis task panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    // 120 BPM: 2 s measures, four to a chunk.
    #[case(120.0, 4, 8.0)]
    // 90 BPM: 2.6667 s measures, three to a chunk.
    #[case(90.0, 3, 8.0)]
    // 200 BPM: 1.2 s measures, seven to a chunk.
    #[case(200.0, 7, 8.4)]
    // 30 BPM: a single 8 s measure.
    #[case(30.0, 1, 8.0)]
    // 60 BPM: 4 s measures, two to a chunk.
    #[case(60.0, 2, 8.0)]
    fn test_chunk_duration_law(
        #[case] bpm: f64,
        #[case] expected_measures: u32,
        #[case] expected_duration: f64,
    ) {
        let (measures, duration) = compute_chunk_duration(bpm);
        assert_eq!(measures, expected_measures);
        assert!((duration - expected_duration).abs() < 1e-9);
    }

    #[test]
    fn test_chunk_duration_never_exceeds_ceiling() {
        for bpm_tenths in 270..3000 {
            let bpm = bpm_tenths as f64 / 10.0;
            let (measures, duration) = compute_chunk_duration(bpm);
            assert!(
                duration <= CHUNK_LIMIT_SECS + 1e-9,
                "bpm {} gave duration {}",
                bpm,
                duration
            );
            let seconds_per_measure = 240.0 / bpm;
            assert!(duration + 1e-9 >= seconds_per_measure);
            assert!(measures >= 1);
        }
    }

    #[test]
    fn test_onset_fallback_decision_table() {
        // Strong correlation offset: fallback never fires.
        let (offset, diag) = resolve_sync_offset(2.0, Some(1.5));
        assert_eq!(offset, 2.0);
        assert!(!diag.fallback_used);

        // Near-zero offset with a late first onset: fallback replaces it.
        let (offset, diag) = resolve_sync_offset(0.05, Some(1.2));
        assert_eq!(offset, 1.2);
        assert!(diag.fallback_used);

        // Exactly at the onset boundary: 0.3 is not "greater than 0.3".
        let (offset, diag) = resolve_sync_offset(0.0, Some(0.3));
        assert_eq!(offset, 0.0);
        assert!(!diag.fallback_used);

        // Near-zero offset, early onset: keep the primary.
        let (offset, diag) = resolve_sync_offset(-0.02, Some(0.1));
        assert_eq!(offset, -0.02);
        assert!(!diag.fallback_used);

        // No onsets at all.
        let (offset, diag) = resolve_sync_offset(0.0, None);
        assert_eq!(offset, 0.0);
        assert!(!diag.fallback_used);

        // Negative near-zero still consults the fallback.
        let (offset, diag) = resolve_sync_offset(-0.09, Some(0.5));
        assert_eq!(offset, 0.5);
        assert!(diag.fallback_used);
    }

    #[test]
    fn test_boundary_at_point_one() {
        // |0.1| is not near-zero; the fallback must not fire.
        let (offset, diag) = resolve_sync_offset(0.1, Some(2.0));
        assert_eq!(offset, 0.1);
        assert!(!diag.fallback_used);
    }

    fn write_tone_wav(path: &std::path::Path, duration_secs: f64) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: dsp::ANALYSIS_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let len = (duration_secs * dsp::ANALYSIS_SAMPLE_RATE as f64) as usize;
        for i in 0..len {
            let t = i as f32 / dsp::ANALYSIS_SAMPLE_RATE as f32;
            let sample = (std::f32::consts::TAU * 220.0 * t).sin();
            writer.write_sample((sample * i16::MAX as f32 * 0.5) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_compute_report_user_bpm_override() {
        use crate::testing::*;
        use std::sync::Arc;

        let workdir = tempfile::tempdir().unwrap();
        let master = workdir.path().join("master.wav");
        let video = workdir.path().join("video_audio.wav");
        write_tone_wav(&master, 2.0);
        write_tone_wav(&video, 2.0);

        let analyzer = MediaAnalyzer::new(
            Arc::new(FakeAssetFetcher::new()),
            Arc::new(FakeMediaRunner::new(8.0)),
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(InMemoryGenerationRepository::new()),
        );

        // A valid user tempo wins; the library estimate is still computed.
        let report = analyzer
            .compute_report(&master, &video, Some(90.0))
            .await
            .unwrap();
        assert_eq!(report.bpm, 90.0);
        assert_eq!(report.measures_per_chunk, 3);
        assert!((report.chunk_duration - 8.0).abs() < 1e-9);
        assert!(report.estimated_bpm > 0.0);
        assert!(report.correlation_strength > 0.5);

        // An out-of-range user tempo falls back to the estimate.
        let report = analyzer
            .compute_report(&master, &video, Some(400.0))
            .await
            .unwrap();
        assert_eq!(report.bpm, report.estimated_bpm);
    }

    #[test]
    fn test_wav_extension_detection() {
        assert!(has_wav_extension("https://cdn/x/master.wav"));
        assert!(has_wav_extension("https://cdn/x/master.WAV?token=abc"));
        assert!(!has_wav_extension("https://cdn/x/master.mp3"));
        assert!(!has_wav_extension("https://cdn/x/video.mp4?e=.wav"));
    }
}
