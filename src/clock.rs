//! Clock-domain conversion
//!
//! Maps the SID's ~1 MHz clock onto an arbitrary host sample rate. Each host
//! sample consumes a whole number of chip cycles; the fractional remainder is
//! carried forward so the long-run cycle rate is exact.

use crate::{Result, SidError};

/// PAL C64 system clock in Hz
pub const PAL_CLOCK_HZ: f64 = 985_248.0;

/// NTSC C64 system clock in Hz
pub const NTSC_CLOCK_HZ: f64 = 1_022_727.0;

/// Default host sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

/// Check that a rate is usable for clock conversion.
///
/// # Arguments
///
/// * `name` - Parameter name reported in the error
/// * `value` - Rate in Hz
///
/// # Returns
///
/// The rate unchanged, or `SidError::InvalidRate` if it is non-positive or non-finite
pub fn validate_rate(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SidError::InvalidRate { name, value })
    }
}

/// Fractional cycle accumulator
///
/// Returns the number of chip cycles to run for every host sample. Over N
/// calls the returned cycles sum to `N * clock_rate / sample_rate` with an
/// error below one cycle.
#[derive(Debug, Clone, Copy)]
pub struct ClockAccumulator {
    sample_rate: f64,
    clock_rate: f64,
    cycles_per_sample: f64,
    residual: f64,
}

impl ClockAccumulator {
    /// Create an accumulator for the given host and chip rates.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Host audio rate in Hz
    /// * `clock_rate` - Chip clock in Hz
    pub fn new(sample_rate: f64, clock_rate: f64) -> Result<Self> {
        let mut acc = Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: PAL_CLOCK_HZ,
            cycles_per_sample: PAL_CLOCK_HZ / DEFAULT_SAMPLE_RATE,
            residual: 0.0,
        };
        acc.set_rates(sample_rate, clock_rate)?;
        Ok(acc)
    }

    /// Change both rates. The residual is kept so no phase jump occurs.
    pub fn set_rates(&mut self, sample_rate: f64, clock_rate: f64) -> Result<()> {
        let sample_rate = validate_rate("sample_rate", sample_rate)?;
        let clock_rate = validate_rate("clock_rate", clock_rate)?;
        self.sample_rate = sample_rate;
        self.clock_rate = clock_rate;
        self.cycles_per_sample = clock_rate / sample_rate;
        log::debug!(
            "clock accumulator: {} Hz chip / {} Hz host = {:.4} cycles per sample",
            clock_rate,
            sample_rate,
            self.cycles_per_sample
        );
        Ok(())
    }

    /// Whole cycles to clock for the next host sample.
    #[inline]
    pub fn cycles_for_next_sample(&mut self) -> u32 {
        self.residual += self.cycles_per_sample;
        let whole = self.residual.floor();
        self.residual -= whole;
        whole as u32
    }

    /// Zero the carried fraction.
    pub fn reset(&mut self) {
        self.residual = 0.0;
    }

    /// Average chip cycles per host sample
    pub fn cycles_per_sample(&self) -> f64 {
        self.cycles_per_sample
    }

    /// Carried fractional cycle, always in `[0, 1)`
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Host sample rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Chip clock rate in Hz
    pub fn clock_rate(&self) -> f64 {
        self.clock_rate
    }
}

impl Default for ClockAccumulator {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: PAL_CLOCK_HZ,
            cycles_per_sample: PAL_CLOCK_HZ / DEFAULT_SAMPLE_RATE,
            residual: 0.0,
        }
    }
}
