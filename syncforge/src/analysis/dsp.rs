//! Sample-level analysis math: WAV loading, resampling, cross-correlation,
//! onset detection and tempo estimation.
//!
//! Everything here is pure with respect to the filesystem except
//! [`load_alignment_signal`], which reads a PCM WAV written by the media
//! runner.

use std::path::Path;

use rustfft::{FftPlanner, num_complex::Complex};

use crate::{Error, Result};

/// Common sample rate both alignment tracks are loaded at.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// Correlation window: the first 15 s are enough to locate the downbeat
/// region.
pub const CORRELATION_WINDOW_SECS: f64 = 15.0;

/// STFT window size for onset strength.
const STFT_WINDOW: usize = 2048;

/// STFT hop size for onset strength.
const STFT_HOP: usize = 512;

/// Tempo search range in BPM.
const BPM_MIN: f64 = 30.0;
const BPM_MAX: f64 = 300.0;

/// Fallback tempo when the envelope carries no periodicity.
const DEFAULT_BPM: f64 = 120.0;

/// Load a WAV file as mono f32 samples, averaging channels.
pub fn load_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| Error::media(format!("Failed to open WAV {}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::media(format!("WAV read failed: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::media(format!("WAV read failed: {}", e)))?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

/// Linear resampling. Sufficient for alignment work: correlation peaks are
/// insensitive to interpolation error at these rates.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx = src as usize;
        let frac = (src - idx as f64) as f32;
        let a = samples[idx];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }

    out
}

/// Load a WAV and bring it to the common analysis rate.
pub fn load_alignment_signal(path: &Path) -> Result<Vec<f32>> {
    let (samples, rate) = load_wav_mono(path)?;
    Ok(resample_linear(&samples, rate, ANALYSIS_SAMPLE_RATE))
}

fn truncate_to_window(samples: &[f32], sample_rate: u32) -> &[f32] {
    let max = (CORRELATION_WINDOW_SECS * sample_rate as f64) as usize;
    &samples[..samples.len().min(max)]
}

fn norm(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>().sqrt()
}

/// Full-mode cross-correlation between the master track and the video track.
///
/// Returns `(sync_offset_secs, normalized_strength)`. A positive offset means
/// the music begins that many seconds into the video (dead space leads the
/// video); a negative offset means the video starts mid-song.
pub fn cross_correlate_offset(master: &[f32], video: &[f32], sample_rate: u32) -> Result<(f64, f64)> {
    let master = truncate_to_window(master, sample_rate);
    let video = truncate_to_window(video, sample_rate);

    if master.is_empty() || video.is_empty() {
        return Err(Error::media("Empty alignment track"));
    }

    let full_len = master.len() + video.len() - 1;
    let fft_len = full_len.next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut video_buf: Vec<Complex<f32>> = video
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();
    let mut master_buf: Vec<Complex<f32>> = master
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    fft.process(&mut video_buf);
    fft.process(&mut master_buf);

    // corr[k] = sum_m video[m + k] * master[m]; a positive peak lag k means
    // the video content lags the master by k samples.
    let mut product: Vec<Complex<f32>> = video_buf
        .iter()
        .zip(master_buf.iter())
        .map(|(v, m)| v * m.conj())
        .collect();
    ifft.process(&mut product);

    let scale = fft_len as f32;
    let mut best_lag = 0i64;
    let mut best_value = f64::MIN;
    for lag in -(master.len() as i64 - 1)..=(video.len() as i64 - 1) {
        let index = lag.rem_euclid(fft_len as i64) as usize;
        let value = (product[index].re / scale).abs() as f64;
        if value > best_value {
            best_value = value;
            best_lag = lag;
        }
    }

    let offset_secs = best_lag as f64 / sample_rate as f64;
    let denom = norm(master) * norm(video);
    let strength = if denom > 0.0 { best_value / denom } else { 0.0 };

    Ok((offset_secs, strength))
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = std::f32::consts::TAU * i as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Spectral-flux onset strength envelope. One value per STFT hop.
pub fn onset_envelope(samples: &[f32], _sample_rate: u32) -> Vec<f32> {
    if samples.len() < STFT_WINDOW {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(STFT_WINDOW);
    let window = hann_window(STFT_WINDOW);

    let bins = STFT_WINDOW / 2 + 1;
    let mut previous = vec![0.0f32; bins];
    let mut envelope = Vec::new();
    let mut buf = vec![Complex::new(0.0f32, 0.0); STFT_WINDOW];

    let mut start = 0usize;
    while start + STFT_WINDOW <= samples.len() {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(samples[start + i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        // Half-wave rectified magnitude increase across bins.
        let mut flux = 0.0f32;
        for (bin, prev) in previous.iter_mut().enumerate().take(bins) {
            let magnitude = buf[bin].norm();
            let diff = magnitude - *prev;
            if diff > 0.0 {
                flux += diff;
            }
            *prev = magnitude;
        }
        envelope.push(flux);
        start += STFT_HOP;
    }

    // The first frame's flux is the raw spectrum; it is not an onset.
    if let Some(first) = envelope.first_mut() {
        *first = 0.0;
    }
    envelope
}

/// Time in seconds of an envelope frame.
fn frame_time(frame: usize, sample_rate: u32) -> f64 {
    frame as f64 * STFT_HOP as f64 / sample_rate as f64
}

/// Detect onset times with local-maximum peak picking and backtracking to
/// the preceding energy minimum.
pub fn detect_onsets(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let envelope = onset_envelope(samples, sample_rate);
    if envelope.len() < 3 {
        return Vec::new();
    }

    let max = envelope.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = 0.3 * max;

    // Enforce a 50 ms refractory gap between detections.
    let min_gap = (0.05 * sample_rate as f64 / STFT_HOP as f64).ceil() as usize;

    let mut onsets = Vec::new();
    let mut last_frame: Option<usize> = None;

    for t in 1..envelope.len() - 1 {
        let value = envelope[t];
        if value < threshold || value <= envelope[t - 1] || value < envelope[t + 1] {
            continue;
        }
        if let Some(last) = last_frame
            && t - last < min_gap
        {
            continue;
        }

        // Backtrack to the preceding local minimum so the reported time sits
        // at the attack start rather than the flux peak.
        let mut frame = t;
        while frame > 0 && envelope[frame - 1] < envelope[frame] {
            frame -= 1;
        }

        onsets.push(frame_time(frame, sample_rate));
        last_frame = Some(t);
    }

    onsets
}

/// Estimate tempo from the autocorrelation of the onset envelope, constrained
/// to the plausible BPM range.
pub fn estimate_bpm(samples: &[f32], sample_rate: u32) -> f64 {
    let envelope = onset_envelope(samples, sample_rate);
    if envelope.is_empty() {
        return DEFAULT_BPM;
    }

    let frames_per_sec = sample_rate as f64 / STFT_HOP as f64;
    let min_lag = ((60.0 / BPM_MAX) * frames_per_sec).floor().max(1.0) as usize;
    let max_lag = ((60.0 / BPM_MIN) * frames_per_sec).ceil() as usize;
    if envelope.len() <= min_lag + 1 {
        return DEFAULT_BPM;
    }
    let max_lag = max_lag.min(envelope.len() - 1);

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f64> = envelope.iter().map(|&v| (v - mean) as f64).collect();

    let mut best_lag = 0usize;
    let mut best_value = f64::MIN;
    for lag in min_lag..=max_lag {
        let mut acc = 0.0f64;
        for i in lag..centered.len() {
            acc += centered[i] * centered[i - lag];
        }
        if acc > best_value {
            best_value = acc;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_value <= 0.0 {
        return DEFAULT_BPM;
    }

    60.0 * frames_per_sec / best_lag as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic broadband test signal.
    fn test_signal(duration_secs: f64, sample_rate: u32) -> Vec<f32> {
        let len = (duration_secs * sample_rate as f64) as usize;
        let mut state = 0x2545f491u32;
        (0..len)
            .map(|i| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                let noise = (state >> 16) as f32 / 32768.0 - 1.0;
                let tone = (std::f32::consts::TAU * 220.0 * i as f32 / sample_rate as f32).sin();
                0.5 * tone + 0.2 * noise
            })
            .collect()
    }

    #[test]
    fn test_resample_preserves_duration() {
        let samples = vec![0.5f32; 16_000];
        let out = resample_linear(&samples, 16_000, ANALYSIS_SAMPLE_RATE);
        assert_eq!(out.len(), 22_050);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));

        let same = resample_linear(&samples, 16_000, 16_000);
        assert_eq!(same.len(), samples.len());
    }

    #[test]
    fn test_dead_space_gives_positive_offset() {
        let sr = ANALYSIS_SAMPLE_RATE;
        let master = test_signal(5.0, sr);

        // Two seconds of silence, then the song: music starts 2 s into the
        // video.
        let mut video = vec![0.0f32; (2.0 * sr as f64) as usize];
        video.extend_from_slice(&master[..(3 * sr as usize).min(master.len())]);

        let (offset, strength) = cross_correlate_offset(&master, &video, sr).unwrap();
        assert!((offset - 2.0).abs() < 0.01, "offset was {}", offset);
        assert!(strength > 0.1);
    }

    #[test]
    fn test_mid_song_start_gives_negative_offset() {
        let sr = ANALYSIS_SAMPLE_RATE;
        let master = test_signal(8.0, sr);

        // The video picks up 3 s into the song.
        let video = master[(3 * sr as usize)..].to_vec();

        let (offset, _) = cross_correlate_offset(&master, &video, sr).unwrap();
        assert!((offset + 3.0).abs() < 0.01, "offset was {}", offset);
    }

    #[test]
    fn test_aligned_signals_give_zero_offset() {
        let sr = ANALYSIS_SAMPLE_RATE;
        let master = test_signal(6.0, sr);
        let (offset, strength) = cross_correlate_offset(&master, &master, sr).unwrap();
        assert!(offset.abs() < 0.005, "offset was {}", offset);
        assert!(strength > 0.9);
    }

    #[test]
    fn test_empty_track_rejected() {
        assert!(cross_correlate_offset(&[], &[0.1], ANALYSIS_SAMPLE_RATE).is_err());
    }

    #[test]
    fn test_first_onset_after_silence() {
        let sr = ANALYSIS_SAMPLE_RATE;
        let mut samples = vec![0.0f32; sr as usize / 2];
        let tone: Vec<f32> = (0..sr as usize)
            .map(|i| (std::f32::consts::TAU * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        samples.extend(tone);

        let onsets = detect_onsets(&samples, sr);
        assert!(!onsets.is_empty());
        assert!(
            (onsets[0] - 0.5).abs() < 0.1,
            "first onset at {}",
            onsets[0]
        );
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let samples = vec![0.0f32; ANALYSIS_SAMPLE_RATE as usize * 2];
        assert!(detect_onsets(&samples, ANALYSIS_SAMPLE_RATE).is_empty());
    }

    #[test]
    fn test_click_train_tempo() {
        let sr = ANALYSIS_SAMPLE_RATE;
        let mut samples = vec![0.0f32; sr as usize * 10];
        // A click every 10240 samples, i.e. 60 * 22050 / 10240 = 129.2 BPM.
        let period = 10_240usize;
        let mut i = 0;
        while i < samples.len() {
            for j in 0..64.min(samples.len() - i) {
                samples[i + j] = 1.0 - j as f32 / 64.0;
            }
            i += period;
        }

        let expected = 60.0 * sr as f64 / period as f64;
        let bpm = estimate_bpm(&samples, sr);
        assert!((bpm - expected).abs() < 2.0, "estimated {}", bpm);
    }

    #[test]
    fn test_silent_input_falls_back_to_default_bpm() {
        let samples = vec![0.0f32; ANALYSIS_SAMPLE_RATE as usize];
        assert_eq!(estimate_bpm(&samples, ANALYSIS_SAMPLE_RATE), 120.0);
    }
}
