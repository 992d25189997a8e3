//! WAV rendering
//!
//! Renders a [`ChipParams`] patch through a [`Chip`] with the chosen
//! sampling method and writes 16-bit mono WAV files with `hound`.

use std::path::Path;

use crate::config::SamplingConfig;
use crate::nodes::{load_patch, ChipParams};
use crate::sid::Chip;
use crate::{Result, SidError};

/// Samples requested from the chip per call
const RENDER_CHUNK: usize = 4096;

/// Render `seconds` of a patch.
///
/// All three gates open at the first sample and close at three quarters of
/// the duration, leaving the rest for the release.
///
/// # Arguments
///
/// * `params` - Patch to play
/// * `config` - Clock, rate and sampling method
/// * `seconds` - Duration, positive and finite
///
/// # Returns
///
/// Mono 16-bit samples at `config.sample_rate`
pub fn render_patch(params: &ChipParams, config: &SamplingConfig, seconds: f64) -> Result<Vec<i16>> {
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(SidError::ConfigError(format!("invalid duration {seconds} s")));
    }
    let mut chip = Chip::new(params.chip_model);
    config.apply(&mut chip)?;

    let total = (seconds * config.sample_rate).round() as usize;
    let release_at = total * 3 / 4;
    log::info!(
        "rendering {total} samples at {} Hz ({:?}), release at {release_at}",
        config.sample_rate,
        config.method
    );

    let mut samples = vec![0i16; total];
    let (held, released) = samples.split_at_mut(release_at);
    load_patch(&mut chip, params, [true; 3]);
    render_into(&mut chip, held)?;
    load_patch(&mut chip, params, [false; 3]);
    render_into(&mut chip, released)?;
    Ok(samples)
}

/// Fill `buffer` completely from `chip`.
///
/// Fails instead of looping when a chunk of cycles yields no samples.
fn render_into(chip: &mut Chip, buffer: &mut [i16]) -> Result<()> {
    let cycles_per_sample = chip.clock_frequency() / chip.sample_rate();
    let mut written = 0;
    while written < buffer.len() {
        let end = (written + RENDER_CHUNK).min(buffer.len());
        let wanted = end - written;
        let mut delta = (wanted as f64 * cycles_per_sample).ceil() as u32 + 1;
        let count = chip.clock_samples(&mut delta, &mut buffer[written..end], 1);
        if count == 0 {
            return Err(SidError::Other(format!(
                "no samples rendered at {} Hz from {} Hz clock",
                chip.sample_rate(),
                chip.clock_frequency()
            )));
        }
        written += count;
    }
    Ok(())
}

/// Write mono 16-bit samples to a WAV file.
///
/// # Arguments
///
/// * `path` - Output file, created or truncated
/// * `samples` - Mono samples
/// * `sample_rate` - Rate in Hz
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    log::info!(
        "wrote {} samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::EnvelopeParams;
    use crate::sid::{ChipModel, SamplingMethod};

    fn patch() -> ChipParams {
        let mut params = ChipParams {
            chip_model: ChipModel::Mos8580,
            cutoff: 1.0,
            ..ChipParams::default()
        };
        params.voices[0].envelope = EnvelopeParams::new(0, 0, 15, 0);
        params
    }

    #[test]
    fn test_render_length_per_method() {
        for method in [
            SamplingMethod::Fast,
            SamplingMethod::Interpolate,
            SamplingMethod::Resample,
        ] {
            let config = SamplingConfig::pal(44_100.0).with_method(method);
            let samples = render_patch(&patch(), &config, 0.25).expect("render");
            assert_eq!(samples.len(), 11_025, "{method} length");
            assert!(samples.iter().any(|&s| s != samples[0]), "{method} silent");
        }
    }

    #[test]
    fn test_release_reaches_silence() {
        let config = SamplingConfig::pal(48_000.0);
        let samples = render_patch(&patch(), &config, 0.5).expect("render");
        let tail = &samples[samples.len() - 2000..];
        let spread = tail.iter().max().copied().unwrap_or(0) - tail.iter().min().copied().unwrap_or(0);
        assert!(spread < 64, "only DC left after release, spread {spread}");
    }

    #[test]
    fn test_rejects_bad_duration() {
        let config = SamplingConfig::default();
        assert!(matches!(
            render_patch(&patch(), &config, 0.0),
            Err(SidError::ConfigError(_))
        ));
        assert!(render_patch(&patch(), &config, f64::NAN).is_err());
    }

    #[test]
    fn test_low_rates() {
        for rate in [20.0, 40.0] {
            let config = SamplingConfig::pal(rate);
            assert!(
                matches!(render_patch(&patch(), &config, 1.0), Err(SidError::ConfigError(_))),
                "{rate} Hz rejected"
            );
        }
        for method in [SamplingMethod::Fast, SamplingMethod::Interpolate] {
            let config = SamplingConfig::pal(61.0).with_method(method);
            let samples = render_patch(&patch(), &config, 2.0).expect("render");
            assert_eq!(samples.len(), 122, "{method} length");
        }
    }

    #[test]
    fn test_render_into_spans_chunks() {
        let mut chip = Chip::new(ChipModel::Mos6581);
        chip.write(0x18, 0x0f);
        let mut buffer = vec![i16::MIN; RENDER_CHUNK * 2 + 7];
        render_into(&mut chip, &mut buffer).expect("48 kHz renders");
        assert!(buffer.iter().all(|&s| s != i16::MIN), "every sample written");
        assert!(render_into(&mut chip, &mut []).is_ok(), "nothing to fill");
    }

    #[test]
    fn test_write_wav_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("patch.wav");
        let samples: Vec<i16> = (0..480).map(|i| (i * 64 - 15_000) as i16).collect();
        write_wav(&path, &samples, 48_000).expect("write");

        let mut reader = hound::WavReader::open(&path).expect("open");
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 48_000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.expect("sample")).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_write_wav_bad_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("out.wav");
        assert!(write_wav(path, &[0; 16], 48_000).is_err());
    }
}
