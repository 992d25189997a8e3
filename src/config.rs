//! Sampling configuration
//!
//! Clock domains and render path for a [`Chip`](crate::Chip), loadable from
//! JSON with any subset of fields.

use serde::{Deserialize, Serialize};

use crate::clock::{DEFAULT_SAMPLE_RATE, NTSC_CLOCK_HZ, PAL_CLOCK_HZ};
use crate::sid::sampler::{check_parameters, DEFAULT_FILTER_SCALE};
use crate::sid::{Chip, SamplingMethod};
use crate::Result;

/// Clock domains and render path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Chip clock in Hz
    pub clock_frequency: f64,
    /// Host sample rate in Hz
    pub sample_rate: f64,
    /// Render path
    pub method: SamplingMethod,
    /// Resampler passband edge in Hz, `None` for 20 kHz or 90% of Nyquist
    pub pass_frequency: Option<f64>,
    /// Resampler FIR gain, 0.9 to 1.0
    pub filter_scale: f64,
}

impl SamplingConfig {
    /// PAL clock at `sample_rate`
    pub fn pal(sample_rate: f64) -> Self {
        SamplingConfig {
            clock_frequency: PAL_CLOCK_HZ,
            sample_rate,
            ..Self::default()
        }
    }

    /// NTSC clock at `sample_rate`
    pub fn ntsc(sample_rate: f64) -> Self {
        SamplingConfig {
            clock_frequency: NTSC_CLOCK_HZ,
            sample_rate,
            ..Self::default()
        }
    }

    /// Same configuration with another render path
    pub fn with_method(mut self, method: SamplingMethod) -> Self {
        self.method = method;
        self
    }

    /// Chip cycles per host sample
    pub fn cycles_per_sample(&self) -> f64 {
        self.clock_frequency / self.sample_rate
    }

    /// Check rates and resampler constraints without touching a chip.
    pub fn validate(&self) -> Result<()> {
        check_parameters(
            self.method,
            self.clock_frequency,
            self.sample_rate,
            self.pass_frequency,
            self.filter_scale,
        )
        .map(|_| ())
    }

    /// Validate and apply to `chip`.
    pub fn apply(&self, chip: &mut Chip) -> Result<()> {
        self.validate()?;
        chip.set_sampling_parameters(
            self.method,
            self.clock_frequency,
            self.sample_rate,
            self.pass_frequency,
            self.filter_scale,
        )
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            clock_frequency: PAL_CLOCK_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            method: SamplingMethod::Fast,
            pass_frequency: None,
            filter_scale: DEFAULT_FILTER_SCALE,
        }
    }
}
