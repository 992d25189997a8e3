//! Sample-rate conversion from the chip clock to the host rate
//!
//! Three render paths share a 16.16 fixed point sample offset:
//!
//! - `Fast` clocks in blocks and picks the nearest cycle's output.
//! - `Interpolate` clocks single cycles and interpolates linearly between
//!   the two cycles around each sample point.
//! - `Resample` clocks single cycles into a ring buffer and convolves it
//!   with a Kaiser windowed sinc, using two shifted FIR tables with linear
//!   interpolation between them (J. O. Smith, "Digital Audio Resampling").

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::synth::Synth;
use crate::clock::{validate_rate, DEFAULT_SAMPLE_RATE, PAL_CLOCK_HZ};
use crate::{Result, SidError};

// Error in interpolated table lookup is bounded by 1.234/L^2, so L >= 285
// gives 16 bits.
const FIR_RES_INTERPOLATE: i32 = 285;
const FIR_SHIFT: i32 = 15;
/// Longest filter order the ring buffer must hold, in output samples
pub const FIR_N: i32 = 125;

/// Chip cycles the resampler ring holds
pub const RING_SIZE: usize = 16384;
const RING_MASK: usize = RING_SIZE - 1;

const FIXP_SHIFT: i32 = 16;
const FIXP_MASK: i32 = 0xffff;

/// Largest clock to sample rate ratio the 16.16 sample offset can carry
pub const MAX_CYCLES_PER_SAMPLE: f64 = (i32::MAX / 2) as f64 / (1 << FIXP_SHIFT) as f64;

/// Default upper passband edge for the resampler
pub const DEFAULT_PASS_FREQ: f64 = 20_000.0;
/// Default FIR gain
pub const DEFAULT_FILTER_SCALE: f64 = 0.97;

/// Render path used by [`Sampler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMethod {
    /// Nearest cycle, block clocked
    #[default]
    Fast,
    /// Linear interpolation between cycles
    Interpolate,
    /// Band-limited FIR resampling
    Resample,
}

impl std::str::FromStr for SamplingMethod {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "interpolate" => Ok(Self::Interpolate),
            "resample" => Ok(Self::Resample),
            other => Err(SidError::ConfigError(format!(
                "unknown sampling method '{other}' (expected fast, interpolate or resample)"
            ))),
        }
    }
}

impl std::fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Interpolate => write!(f, "interpolate"),
            Self::Resample => write!(f, "resample"),
        }
    }
}

#[derive(Clone, Default)]
struct Fir {
    data: Vec<i16>,
    n: i32,
    res: i32,
}

/// Synth plus the state of the active render path
#[derive(Clone)]
pub struct Sampler {
    /// Cycle engine
    pub synth: Synth,
    cycles_per_sample: u32,
    method: SamplingMethod,
    fir: Fir,
    ring: Box<[i16]>,
    index: usize,
    offset: i32,
    prev_sample: i16,
}

/// Check that `method` can convert a `clock_freq` chip clock to
/// `sample_freq`.
///
/// # Returns
///
/// The resampler passband edge when `method` is `Resample`, `None`
/// otherwise. `InvalidRate` for a rate that is not positive and finite,
/// `ConfigError` for a ratio or resampler setting that cannot be rendered.
pub fn check_parameters(
    method: SamplingMethod,
    clock_freq: f64,
    sample_freq: f64,
    pass_freq: Option<f64>,
    filter_scale: f64,
) -> Result<Option<f64>> {
    let clock_freq = validate_rate("clock_rate", clock_freq)?;
    let sample_freq = validate_rate("sample_rate", sample_freq)?;

    let ratio = clock_freq / sample_freq;
    if ratio > MAX_CYCLES_PER_SAMPLE {
        return Err(SidError::ConfigError(format!(
            "sample rate {sample_freq} Hz is below the {:.1} Hz minimum for a {clock_freq} Hz clock",
            clock_freq / MAX_CYCLES_PER_SAMPLE
        )));
    }
    if method != SamplingMethod::Resample {
        return Ok(None);
    }

    if FIR_N as f64 * ratio >= RING_SIZE as f64 {
        return Err(SidError::ConfigError(format!(
            "sample rate {sample_freq} Hz is too low to resample a {clock_freq} Hz clock"
        )));
    }
    let pass = match pass_freq.filter(|&p| p >= 0.0) {
        Some(p) if p > 0.9 * sample_freq / 2.0 => {
            return Err(SidError::ConfigError(format!(
                "pass frequency {p} Hz exceeds 90% of Nyquist at {sample_freq} Hz"
            )));
        }
        Some(p) => p,
        None => DEFAULT_PASS_FREQ.min(0.9 * sample_freq / 2.0),
    };
    if !(0.9..=1.0).contains(&filter_scale) {
        return Err(SidError::ConfigError(format!(
            "filter scale {filter_scale} outside 0.9..=1.0"
        )));
    }
    Ok(Some(pass))
}

/// 16.16 cycles per sample. The ratio must already be checked.
#[inline]
fn fixed_ratio(clock_freq: f64, sample_freq: f64) -> u32 {
    (clock_freq / sample_freq * (1 << FIXP_SHIFT) as f64 + 0.5) as u32
}

impl Sampler {
    /// Wrap `synth` with the fast path at PAL clock and 48 kHz.
    pub fn new(synth: Synth) -> Self {
        Self {
            synth,
            cycles_per_sample: fixed_ratio(PAL_CLOCK_HZ, DEFAULT_SAMPLE_RATE),
            method: SamplingMethod::Fast,
            fir: Fir::default(),
            ring: vec![0; RING_SIZE * 2].into_boxed_slice(),
            index: 0,
            offset: 0,
            prev_sample: 0,
        }
    }

    /// Select a render path and rates.
    ///
    /// # Arguments
    ///
    /// * `method` - Render path
    /// * `clock_freq` - Chip clock in Hz
    /// * `sample_freq` - Host sample rate in Hz
    /// * `pass_freq` - Resampler passband edge, `None` for the default
    /// * `filter_scale` - Resampler FIR gain, 0.9 to 1.0
    ///
    /// # Returns
    ///
    /// The error from [`check_parameters`]. The previous configuration is
    /// kept in that case.
    pub fn set_parameters(
        &mut self,
        method: SamplingMethod,
        clock_freq: f64,
        sample_freq: f64,
        pass_freq: Option<f64>,
        filter_scale: f64,
    ) -> Result<()> {
        let fir_pass =
            check_parameters(method, clock_freq, sample_freq, pass_freq, filter_scale)?;

        self.cycles_per_sample = fixed_ratio(clock_freq, sample_freq);
        self.method = method;
        if let Some(pass) = fir_pass {
            self.init_fir(clock_freq, sample_freq, pass, filter_scale);
        }

        self.ring.fill(0);
        self.index = 0;
        self.offset = 0;
        self.prev_sample = 0;
        log::debug!(
            "sampler: {} at {:.0} Hz -> {:.0} Hz, {:.3} cycles/sample",
            method,
            clock_freq,
            sample_freq,
            clock_freq / sample_freq
        );
        Ok(())
    }

    /// Active render path
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    /// Chip cycles per output sample in 16.16 fixed point
    pub fn cycles_per_sample(&self) -> u32 {
        self.cycles_per_sample
    }

    /// Taps per FIR table (0 unless resampling)
    pub fn fir_length(&self) -> i32 {
        self.fir.n
    }

    /// Reset the synth and the render position.
    pub fn reset(&mut self) {
        self.synth.reset();
        self.ring.fill(0);
        self.index = 0;
        self.offset = 0;
        self.prev_sample = 0;
    }

    /// Cycles to clock before the next sample is due
    #[inline]
    pub fn cycles_to_next_sample(&self) -> u32 {
        let next = match self.method {
            SamplingMethod::Fast => {
                self.offset + self.cycles_per_sample as i32 + (1 << (FIXP_SHIFT - 1))
            }
            SamplingMethod::Interpolate | SamplingMethod::Resample => {
                self.offset + self.cycles_per_sample as i32
            }
        };
        (next >> FIXP_SHIFT).max(0) as u32
    }

    /// Clock up to `delta` cycles, writing samples to `buffer` with stride
    /// `interleave`.
    ///
    /// # Returns
    ///
    /// Number of samples written. When the buffer fills first, `delta` is
    /// left holding the cycles still owed; otherwise it ends at 0.
    #[inline]
    pub fn clock(&mut self, delta: &mut u32, buffer: &mut [i16], interleave: usize) -> usize {
        let interleave = interleave.max(1);
        let capacity = buffer.len().div_ceil(interleave);
        match self.method {
            SamplingMethod::Fast => self.clock_fast(delta, buffer, capacity, interleave),
            SamplingMethod::Interpolate => {
                self.clock_interpolate(delta, buffer, capacity, interleave)
            }
            SamplingMethod::Resample => self.clock_resample(delta, buffer, capacity, interleave),
        }
    }

    // === Render paths ===

    fn clock_fast(
        &mut self,
        delta: &mut u32,
        buffer: &mut [i16],
        capacity: usize,
        interleave: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.offset + self.cycles_per_sample as i32 + (1 << (FIXP_SHIFT - 1));
            let delta_sample = (next >> FIXP_SHIFT) as u32;
            if delta_sample > *delta {
                break;
            }
            if s >= capacity {
                return s;
            }
            self.synth.clock_delta(delta_sample);
            *delta -= delta_sample;
            self.offset = (next & FIXP_MASK) - (1 << (FIXP_SHIFT - 1));
            buffer[s * interleave] = self.synth.output();
            s += 1;
        }
        self.synth.clock_delta(*delta);
        self.offset -= (*delta as i32) << FIXP_SHIFT;
        *delta = 0;
        s
    }

    /// Clock `cycles` single cycles, remembering the output just before the
    /// last one.
    #[inline]
    fn clock_keep_prev(&mut self, cycles: u32) {
        for _ in 0..cycles.saturating_sub(1) {
            self.synth.clock();
        }
        if cycles > 0 {
            self.prev_sample = self.synth.output();
            self.synth.clock();
        }
    }

    fn clock_interpolate(
        &mut self,
        delta: &mut u32,
        buffer: &mut [i16],
        capacity: usize,
        interleave: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.offset + self.cycles_per_sample as i32;
            let delta_sample = (next >> FIXP_SHIFT) as u32;
            if delta_sample > *delta {
                break;
            }
            if s >= capacity {
                return s;
            }
            self.clock_keep_prev(delta_sample);
            *delta -= delta_sample;
            self.offset = next & FIXP_MASK;

            let now = self.synth.output();
            let step = (self.offset as i64 * (now as i64 - self.prev_sample as i64)) >> FIXP_SHIFT;
            buffer[s * interleave] = (self.prev_sample as i64 + step) as i16;
            s += 1;
            self.prev_sample = now;
        }
        self.clock_keep_prev(*delta);
        self.offset -= (*delta as i32) << FIXP_SHIFT;
        *delta = 0;
        s
    }

    /// Clock one cycle into the ring. The ring is stored twice so every
    /// convolution window is contiguous.
    #[inline]
    fn clock_into_ring(&mut self) {
        self.synth.clock();
        let output = self.synth.output();
        self.ring[self.index] = output;
        self.ring[self.index + RING_SIZE] = output;
        self.index = (self.index + 1) & RING_MASK;
    }

    fn clock_resample(
        &mut self,
        delta: &mut u32,
        buffer: &mut [i16],
        capacity: usize,
        interleave: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.offset + self.cycles_per_sample as i32;
            let delta_sample = (next >> FIXP_SHIFT) as u32;
            if delta_sample > *delta {
                break;
            }
            if s >= capacity {
                return s;
            }
            for _ in 0..delta_sample {
                self.clock_into_ring();
            }
            *delta -= delta_sample;
            self.offset = next & FIXP_MASK;
            buffer[s * interleave] = self.convolve();
            s += 1;
        }
        for _ in 0..*delta {
            self.clock_into_ring();
        }
        self.offset -= (*delta as i32) << FIXP_SHIFT;
        *delta = 0;
        s
    }

    /// FIR output at the current sample offset.
    #[inline]
    fn convolve(&self) -> i16 {
        let n = self.fir.n as usize;
        let scaled = self.offset * self.fir.res;
        let mut fir_offset = (scaled >> FIXP_SHIFT) as usize;
        let rmd = (scaled & FIXP_MASK) as i64;

        let mut start = self.index + RING_SIZE - n;
        let v1 = convolution(&self.ring[start..start + n], self.fir_table(fir_offset)) as i64;

        // Past the last table, wrap to the first one a sample earlier.
        fir_offset += 1;
        if fir_offset == self.fir.res as usize {
            fir_offset = 0;
            start -= 1;
        }
        let v2 = convolution(&self.ring[start..start + n], self.fir_table(fir_offset)) as i64;

        let v = (v1 + ((rmd * (v2 - v1)) >> FIXP_SHIFT)) >> FIR_SHIFT;
        v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
    }

    #[inline]
    fn fir_table(&self, table: usize) -> &[i16] {
        let n = self.fir.n as usize;
        &self.fir.data[table * n..(table + 1) * n]
    }

    fn init_fir(&mut self, clock_freq: f64, sample_freq: f64, pass_freq: f64, filter_scale: f64) {
        let samples_per_cycle = sample_freq / clock_freq;
        let cycles_per_sample = clock_freq / sample_freq;

        // 16 bits -> -96 dB stopband attenuation.
        let atten = -20.0 * (1.0 / (1i32 << 16) as f64).log10();
        // Transition band width; the cutoff sits in its middle.
        let dw = (1.0 - 2.0 * pass_freq / sample_freq) * PI;
        let wc = (2.0 * pass_freq / sample_freq + 1.0) * PI / 2.0;

        // kaiserord
        let beta = 0.1102 * (atten - 8.7);
        let i0_beta = i0(beta);

        // Filter order is the number of zero crossings, so even.
        let mut order = ((atten - 7.95) / (2.285 * dw) + 0.5) as i32;
        order += order & 1;

        // Length is order + 1 in output samples, odd in cycles.
        self.fir.n = ((order as f64 * cycles_per_sample) as i32 + 1) | 1;

        // Resolution is a power of two so the 16-bit offset maps onto whole
        // tables.
        let bits = (FIR_RES_INTERPOLATE as f64 / cycles_per_sample).log2().ceil() as i32;
        self.fir.res = 1 << bits.max(0);

        let n = self.fir.n;
        self.fir.data.clear();
        self.fir.data.resize((n * self.fir.res) as usize, 0);

        let half = n / 2;
        for i in 0..self.fir.res {
            let base = i * n + half;
            let j_offset = i as f64 / self.fir.res as f64;
            for j in -half..=half {
                let jx = j as f64 - j_offset;
                let wt = wc * jx / cycles_per_sample;
                let temp = jx / half as f64;
                let kaiser = if temp.abs() <= 1.0 {
                    i0(beta * (1.0 - temp * temp).sqrt()) / i0_beta
                } else {
                    0.0
                };
                let sincwt = if wt.abs() >= 1e-6 { wt.sin() / wt } else { 1.0 };
                let val = (1i32 << FIR_SHIFT) as f64 * filter_scale * samples_per_cycle * wc / PI
                    * sincwt
                    * kaiser;
                self.fir.data[(base + j) as usize] = (val + 0.5) as i16;
            }
        }
        log::debug!(
            "sampler: FIR {} taps x {} tables, pass band {:.0} Hz",
            self.fir.n,
            self.fir.res,
            pass_freq
        );
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("method", &self.method)
            .field("cycles_per_sample", &self.cycles_per_sample)
            .field("fir_n", &self.fir.n)
            .field("fir_res", &self.fir.res)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[inline]
fn convolution(samples: &[i16], fir: &[i16]) -> i32 {
    samples
        .iter()
        .zip(fir)
        .fold(0i32, |sum, (&s, &f)| sum.wrapping_add(s as i32 * f as i32))
}

/// Zeroth order modified Bessel function of the first kind, by power series.
fn i0(x: f64) -> f64 {
    const EPSILON: f64 = 1e-6;
    let half_x = x / 2.0;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1;
    loop {
        let temp = half_x / n as f64;
        n += 1;
        u *= temp * temp;
        sum += u;
        if u < EPSILON * sum {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PAL_CLOCK_HZ;
    use crate::sid::ChipModel;
    use approx::assert_relative_eq;

    fn sampler(method: SamplingMethod) -> Sampler {
        let mut synth = Synth::new(ChipModel::Mos8580);
        synth.write(0x00, 0x45);
        synth.write(0x01, 0x1d);
        synth.write(0x05, 0x00);
        synth.write(0x06, 0xf0);
        synth.write(0x04, 0x21);
        synth.write(0x18, 0x0f);
        let mut sampler = Sampler::new(synth);
        sampler
            .set_parameters(method, PAL_CLOCK_HZ, 48_000.0, None, DEFAULT_FILTER_SCALE)
            .expect("valid parameters");
        sampler
    }

    #[test]
    fn test_i0_known_values() {
        assert_relative_eq!(i0(0.0), 1.0);
        assert_relative_eq!(i0(1.0), 1.266_065_877_752_008, epsilon = 1e-5);
    }

    #[test]
    fn test_sample_counts_match_ratio() {
        for method in [
            SamplingMethod::Fast,
            SamplingMethod::Interpolate,
            SamplingMethod::Resample,
        ] {
            let mut sampler = sampler(method);
            let mut buffer = vec![0i16; 8192];
            let mut delta = PAL_CLOCK_HZ as u32 / 10;
            let written = sampler.clock(&mut delta, &mut buffer, 1);
            assert_eq!(delta, 0, "{method}: all cycles consumed");
            assert!(
                (written as f64 - 4800.0).abs() <= 1.0,
                "{method}: wrote {written}"
            );
        }
    }

    #[test]
    fn test_full_buffer_leaves_cycles_owed() {
        let mut sampler = sampler(SamplingMethod::Fast);
        let mut buffer = [0i16; 10];
        let mut delta = 10_000;
        let written = sampler.clock(&mut delta, &mut buffer, 1);
        assert_eq!(written, 10);
        assert!(delta > 0 && delta < 10_000 - 9 * 20);
    }

    #[test]
    fn test_interleave_strides_output() {
        let mut sampler = sampler(SamplingMethod::Interpolate);
        let mut buffer = [i16::MIN; 20];
        let mut delta = 200;
        let written = sampler.clock(&mut delta, &mut buffer, 2);
        assert!(written >= 9);
        for i in 0..written {
            assert_eq!(buffer[i * 2 + 1], i16::MIN, "odd slots untouched");
        }
    }

    #[test]
    fn test_resample_produces_signal() {
        let mut sampler = sampler(SamplingMethod::Resample);
        assert!(sampler.fir_length() > 1);
        assert_eq!(sampler.fir_length() & 1, 1, "odd FIR length");
        let mut buffer = vec![0i16; 4800];
        let mut delta = PAL_CLOCK_HZ as u32 / 10;
        let written = sampler.clock(&mut delta, &mut buffer, 1);
        let peak = buffer[..written].iter().map(|s| (*s as i32).abs()).max();
        assert!(peak.unwrap_or(0) > 1000, "sawtooth should be audible");
    }

    #[test]
    fn test_resample_validation() {
        let mut sampler = Sampler::new(Synth::default());
        assert!(sampler
            .set_parameters(SamplingMethod::Resample, PAL_CLOCK_HZ, 7_000.0, None, 0.97)
            .is_err());
        assert!(sampler
            .set_parameters(SamplingMethod::Resample, PAL_CLOCK_HZ, 44_100.0, Some(21_000.0), 0.97)
            .is_err());
        assert!(sampler
            .set_parameters(SamplingMethod::Resample, PAL_CLOCK_HZ, 44_100.0, None, 0.5)
            .is_err());
        assert!(sampler
            .set_parameters(SamplingMethod::Fast, PAL_CLOCK_HZ, 0.0, None, 0.97)
            .is_err());
        assert_eq!(sampler.method(), SamplingMethod::Fast);
    }

    #[test]
    fn test_rejects_ratio_beyond_offset_range() {
        let mut sampler = sampler(SamplingMethod::Interpolate);
        let before = sampler.cycles_per_sample();
        for rate in [20.0, 40.0] {
            for method in [SamplingMethod::Fast, SamplingMethod::Interpolate] {
                assert!(
                    matches!(
                        sampler.set_parameters(method, PAL_CLOCK_HZ, rate, None, 0.97),
                        Err(SidError::ConfigError(_))
                    ),
                    "{method} at {rate} Hz"
                );
            }
        }
        assert_eq!(sampler.method(), SamplingMethod::Interpolate);
        assert_eq!(sampler.cycles_per_sample(), before, "previous ratio kept");
        assert!(PAL_CLOCK_HZ / 61.0 < MAX_CYCLES_PER_SAMPLE);
    }

    #[test]
    fn test_low_rate_sample_counts() {
        for method in [SamplingMethod::Fast, SamplingMethod::Interpolate] {
            let mut sampler = sampler(method);
            sampler
                .set_parameters(method, 500_000.0, 40.0, None, 0.97)
                .expect("ratio 12500");
            let mut buffer = [0i16; 64];
            let mut delta = 500_000;
            assert_eq!(sampler.clock(&mut delta, &mut buffer, 1), 40, "{method}");
            assert_eq!(delta, 0);

            sampler
                .set_parameters(method, PAL_CLOCK_HZ, 61.0, None, 0.97)
                .expect("just inside the offset range");
            let mut delta = PAL_CLOCK_HZ as u32;
            let written = sampler.clock(&mut delta, &mut buffer, 1);
            assert!((60..=61).contains(&written), "{method}: wrote {written}");
        }
    }

    #[test]
    fn test_odd_ratio_resample_counts() {
        let mut sampler = sampler(SamplingMethod::Resample);
        sampler
            .set_parameters(SamplingMethod::Resample, 1_022_727.0, 22_050.0, None, 0.97)
            .expect("ntsc at 22.05 kHz");
        let mut buffer = vec![0i16; 4096];
        let mut delta = 1_022_727 / 10;
        let written = sampler.clock(&mut delta, &mut buffer, 1);
        assert!((written as f64 - 2205.0).abs() <= 1.0, "wrote {written}");
    }

    #[test]
    fn test_cycles_to_next_sample_yields_one_sample() {
        for method in [
            SamplingMethod::Fast,
            SamplingMethod::Interpolate,
            SamplingMethod::Resample,
        ] {
            let mut sampler = sampler(method);
            let mut buffer = [0i16; 1];
            for _ in 0..1000 {
                let mut delta = sampler.cycles_to_next_sample();
                assert!((20..=21).contains(&delta), "{method}: {delta} cycles");
                assert_eq!(sampler.clock(&mut delta, &mut buffer, 1), 1, "{method}");
                assert_eq!(delta, 0);
            }
        }
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "Resample".parse::<SamplingMethod>().ok(),
            Some(SamplingMethod::Resample)
        );
        assert!("cubic".parse::<SamplingMethod>().is_err());
        assert_eq!(SamplingMethod::Interpolate.to_string(), "interpolate");
    }
}
