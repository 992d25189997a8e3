//! Phase-accumulator waveform generator
//!
//! A 24-bit accumulator advances by the 16-bit frequency register every chip
//! cycle. The top 12 bits drive the sawtooth, triangle and pulse outputs; bit
//! 19 clocks a 23-bit LFSR whose selected taps form the noise output.

use bitflags::bitflags;

use super::wave_tables::{combined_tables, Combination, CombinedTables};
use super::ChipModel;

const ACC_MASK: u32 = 0x00ff_ffff;
const ACC_MSB: u32 = 0x0080_0000;
const ACC_NOISE_CLOCK: u32 = 0x0008_0000;
const LFSR_MASK: u32 = 0x007f_ffff;
const LFSR_SEED: u32 = 0x007f_fff8;

bitflags! {
    /// Voice control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Control: u8 {
        /// Envelope gate
        const GATE = 0x01;
        /// Hard sync to the previous voice
        const SYNC = 0x02;
        /// Ring modulate the triangle with the previous voice
        const RING_MOD = 0x04;
        /// Hold the oscillator in reset
        const TEST = 0x08;
        /// Triangle waveform
        const TRIANGLE = 0x10;
        /// Sawtooth waveform
        const SAWTOOTH = 0x20;
        /// Pulse waveform
        const PULSE = 0x40;
        /// Noise waveform
        const NOISE = 0x80;
    }
}

/// Frequency register value for a pitch.
///
/// Computes `round(freq_hz * 2^24 / clock_hz)`, saturated to the 16-bit
/// register. Negative or NaN pitches give 0.
///
/// # Arguments
///
/// * `freq_hz` - Desired oscillator frequency in Hz
/// * `clock_hz` - Chip clock in Hz
pub fn frequency_register(freq_hz: f64, clock_hz: f64) -> u16 {
    let value = (freq_hz * (1u32 << 24) as f64 / clock_hz).round();
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= u16::MAX as f64 {
        u16::MAX
    } else {
        value as u16
    }
}

/// Waveform generator for one voice
#[derive(Clone, Copy)]
pub struct Oscillator {
    accumulator: u32,
    shift_register: u32,
    freq: u16,
    pw: u16,
    waveform: u8,
    ring_mod: bool,
    sync: bool,
    test: bool,
    msb_rising: bool,
    tables: &'static CombinedTables,
}

impl Oscillator {
    /// Create an oscillator in its power-on state.
    pub fn new(model: ChipModel) -> Self {
        let mut osc = Self {
            accumulator: 0,
            shift_register: LFSR_SEED,
            freq: 0,
            pw: 0,
            waveform: 0,
            ring_mod: false,
            sync: false,
            test: false,
            msb_rising: false,
            tables: combined_tables(model),
        };
        osc.reset();
        osc
    }

    /// Switch combined waveform tables. Running state is untouched.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.tables = combined_tables(model);
    }

    /// Reset to power-on state.
    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.shift_register = LFSR_SEED;
        self.freq = 0;
        self.pw = 0;
        self.waveform = 0;
        self.ring_mod = false;
        self.sync = false;
        self.test = false;
        self.msb_rising = false;
    }

    // === Register interface ===

    /// FREQ_LO
    pub fn write_freq_lo(&mut self, value: u8) {
        self.freq = (self.freq & 0xff00) | value as u16;
    }

    /// FREQ_HI
    pub fn write_freq_hi(&mut self, value: u8) {
        self.freq = ((value as u16) << 8) | (self.freq & 0x00ff);
    }

    /// PW_LO
    pub fn write_pw_lo(&mut self, value: u8) {
        self.pw = (self.pw & 0x0f00) | value as u16;
    }

    /// PW_HI (low nibble only)
    pub fn write_pw_hi(&mut self, value: u8) {
        self.pw = (((value as u16) << 8) & 0x0f00) | (self.pw & 0x00ff);
    }

    /// Control register: waveform nibble, test, ring mod and sync bits.
    ///
    /// Setting TEST clears the accumulator and the noise LFSR. Releasing it
    /// reseeds the LFSR.
    pub fn write_control(&mut self, value: u8) {
        let control = Control::from_bits_retain(value);
        let test_next = control.contains(Control::TEST);
        self.waveform = (value >> 4) & 0x0f;
        self.ring_mod = control.contains(Control::RING_MOD);
        self.sync = control.contains(Control::SYNC);

        if test_next {
            self.accumulator = 0;
            self.shift_register = 0;
        } else if self.test {
            self.shift_register = LFSR_SEED;
        }
        self.test = test_next;
    }

    /// Control bits held by the oscillator (everything but GATE).
    pub fn control(&self) -> u8 {
        let mut control = Control::from_bits_retain(self.waveform << 4);
        control.set(Control::TEST, self.test);
        control.set(Control::RING_MOD, self.ring_mod);
        control.set(Control::SYNC, self.sync);
        control.bits()
    }

    /// 16-bit frequency register
    #[inline]
    pub fn frequency(&self) -> u16 {
        self.freq
    }

    /// Set the frequency register directly, bypassing the byte registers.
    pub fn set_frequency(&mut self, freq: u16) {
        self.freq = freq;
    }

    /// 12-bit pulse width register
    #[inline]
    pub fn pulse_width(&self) -> u16 {
        self.pw
    }

    /// Set the pulse width directly (masked to 12 bits).
    pub fn set_pulse_width(&mut self, pw: u16) {
        self.pw = pw & 0x0fff;
    }

    /// Waveform select nibble (bit 0 = triangle .. bit 3 = noise)
    #[inline]
    pub fn waveform(&self) -> u8 {
        self.waveform
    }

    // === Clocking ===

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            return;
        }
        let acc_prev = self.accumulator;
        self.accumulator = (self.accumulator + self.freq as u32) & ACC_MASK;
        self.msb_rising = acc_prev & ACC_MSB == 0 && self.accumulator & ACC_MSB != 0;

        if acc_prev & ACC_NOISE_CLOCK == 0 && self.accumulator & ACC_NOISE_CLOCK != 0 {
            self.clock_noise();
        }
    }

    /// Advance `delta` cycles, clocking the LFSR once per bit 19 rising edge.
    #[inline]
    pub fn clock_delta(&mut self, delta: u32) {
        if self.test {
            return;
        }
        let acc_prev = self.accumulator;
        let mut delta_acc = delta as u64 * self.freq as u64;
        self.accumulator = ((self.accumulator as u64 + delta_acc) & ACC_MASK as u64) as u32;
        self.msb_rising = acc_prev & ACC_MSB == 0 && self.accumulator & ACC_MSB != 0;

        // Bit 19 rises once every 2^20 accumulator steps. Walk back from the
        // final value in whole periods to count the edges that were crossed.
        let mut shift_period: u64 = 0x10_0000;
        while delta_acc != 0 {
            if delta_acc < shift_period {
                shift_period = delta_acc;
                let before = self.accumulator.wrapping_sub(shift_period as u32) & ACC_NOISE_CLOCK;
                let now = self.accumulator & ACC_NOISE_CLOCK;
                if shift_period <= ACC_NOISE_CLOCK as u64 {
                    if before != 0 || now == 0 {
                        break;
                    }
                } else if before != 0 && now == 0 {
                    break;
                }
            }
            self.clock_noise();
            delta_acc -= shift_period;
        }
    }

    #[inline]
    fn clock_noise(&mut self) {
        let bit0 = ((self.shift_register >> 22) ^ (self.shift_register >> 17)) & 1;
        self.shift_register = ((self.shift_register << 1) & LFSR_MASK) | bit0;
    }

    /// True if the accumulator MSB went 0 -> 1 on the last clock.
    #[inline]
    pub fn msb_rising(&self) -> bool {
        self.msb_rising
    }

    /// Overwrite the MSB edge flag (snapshot restore).
    pub fn set_msb_rising(&mut self, rising: bool) {
        self.msb_rising = rising;
    }

    /// SYNC bit
    #[inline]
    pub fn sync_enabled(&self) -> bool {
        self.sync
    }

    /// Hard sync: zero the accumulator.
    #[inline]
    pub fn reset_accumulator(&mut self) {
        self.accumulator = 0;
    }

    /// 24-bit phase accumulator
    #[inline]
    pub fn accumulator(&self) -> u32 {
        self.accumulator
    }

    /// Overwrite the accumulator (snapshot restore).
    pub fn set_accumulator(&mut self, value: u32) {
        self.accumulator = value & ACC_MASK;
    }

    /// 23-bit noise LFSR
    pub fn shift_register(&self) -> u32 {
        self.shift_register
    }

    /// Overwrite the LFSR (snapshot restore).
    pub fn set_shift_register(&mut self, value: u32) {
        self.shift_register = value & LFSR_MASK;
    }

    // === Waveform output ===

    #[inline]
    fn triangle(&self, ring_source_acc: u32) -> u16 {
        let msb = if self.ring_mod {
            self.accumulator ^ ring_source_acc
        } else {
            self.accumulator
        } & ACC_MSB;
        let folded = if msb != 0 {
            !self.accumulator
        } else {
            self.accumulator
        };
        ((folded >> 11) & 0x0fff) as u16
    }

    #[inline]
    fn sawtooth(&self) -> u16 {
        (self.accumulator >> 12) as u16
    }

    #[inline]
    fn pulse(&self) -> u16 {
        if self.test || (self.accumulator >> 12) as u16 >= self.pw {
            0x0fff
        } else {
            0x0000
        }
    }

    #[inline]
    fn noise(&self) -> u16 {
        let sr = self.shift_register;
        (((sr & 0x40_0000) >> 11)
            | ((sr & 0x10_0000) >> 10)
            | ((sr & 0x01_0000) >> 7)
            | ((sr & 0x00_2000) >> 5)
            | ((sr & 0x00_0800) >> 4)
            | ((sr & 0x00_0080) >> 1)
            | ((sr & 0x00_0010) << 1)
            | ((sr & 0x00_0004) << 2)) as u16
    }

    #[inline]
    fn combined(&self, combination: Combination, ring_source_acc: u32) -> u16 {
        // Ring modulation only reaches the triangle fold when the sawtooth
        // is not also selected.
        let acc = if self.ring_mod && self.waveform & 0x3 == 0x1 {
            self.accumulator ^ (ring_source_acc & ACC_MSB)
        } else {
            self.accumulator
        };
        let value = self.tables.lookup(combination, acc >> 12);
        if self.waveform & 0x4 != 0 {
            value & self.pulse()
        } else {
            value
        }
    }

    #[inline]
    fn tonal(&self, bits: u8, ring_source_acc: u32) -> u16 {
        match bits & 0x7 {
            0x0 => 0,
            0x1 => self.triangle(ring_source_acc),
            0x2 => self.sawtooth(),
            0x4 => self.pulse(),
            other => match Combination::from_waveform(other) {
                Some(combination) => self.combined(combination, ring_source_acc),
                None => 0,
            },
        }
    }

    /// 12-bit waveform output.
    ///
    /// # Arguments
    ///
    /// * `ring_source_acc` - Accumulator of the ring modulation source voice
    ///
    /// # Returns
    ///
    /// Unsigned sample in `0..=0xfff`. Noise combined with other waveforms
    /// is ANDed with their output.
    #[inline]
    pub fn output(&self, ring_source_acc: u32) -> u16 {
        match self.waveform {
            0x8 => self.noise(),
            w if w & 0x8 != 0 => self.noise() & self.tonal(w, ring_source_acc),
            w => self.tonal(w, ring_source_acc),
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

impl std::fmt::Debug for Oscillator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oscillator")
            .field("accumulator", &self.accumulator)
            .field("shift_register", &self.shift_register)
            .field("freq", &self.freq)
            .field("pw", &self.pw)
            .field("waveform", &self.waveform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PAL_CLOCK_HZ;

    fn osc_with(freq: u16, control: u8) -> Oscillator {
        let mut osc = Oscillator::new(ChipModel::Mos6581);
        osc.set_frequency(freq);
        osc.write_control(control);
        osc
    }

    #[test]
    fn test_frequency_register_rounding() {
        let mut f = 0.1;
        while f <= 3848.0 {
            let reg = frequency_register(f, PAL_CLOCK_HZ);
            let exact = f * 16_777_216.0 / PAL_CLOCK_HZ;
            assert!(
                (reg as f64 - exact).abs() <= 0.5,
                "{} Hz -> {} (exact {})",
                f,
                reg,
                exact
            );
            f *= 1.37;
        }
        assert_eq!(frequency_register(440.0, PAL_CLOCK_HZ), 7493);
    }

    #[test]
    fn test_frequency_register_saturates() {
        assert_eq!(frequency_register(20_000.0, PAL_CLOCK_HZ), 0xffff);
        assert_eq!(frequency_register(-5.0, PAL_CLOCK_HZ), 0);
        assert_eq!(frequency_register(f64::NAN, PAL_CLOCK_HZ), 0);
    }

    #[test]
    fn test_frequency_writes_idempotent() {
        let mut osc = Oscillator::default();
        osc.write_freq_lo(0x12);
        osc.write_freq_hi(0x34);
        let reg = frequency_register(1000.0, PAL_CLOCK_HZ);
        for _ in 0..3 {
            osc.write_freq_lo((reg & 0xff) as u8);
            osc.write_freq_hi((reg >> 8) as u8);
            assert_eq!(osc.frequency(), reg);
        }
    }

    #[test]
    fn test_accumulator_wraps_24_bits() {
        let mut osc = osc_with(0xffff, 0x20);
        osc.set_accumulator(0xff_fff0);
        osc.clock();
        assert_eq!(osc.accumulator(), (0xff_fff0 + 0xffff) & 0xff_ffff);
    }

    #[test]
    fn test_sawtooth_tracks_accumulator() {
        let mut osc = osc_with(0x1000, 0x20);
        for _ in 0..100 {
            osc.clock();
            assert_eq!(osc.output(0), (osc.accumulator() >> 12) as u16);
        }
    }

    #[test]
    fn test_triangle_folds_about_msb() {
        let mut osc = osc_with(0, 0x10);
        osc.set_accumulator(0x40_0000);
        assert_eq!(osc.output(0), 0x800);
        osc.set_accumulator(0xc0_0000);
        assert_eq!(osc.output(0), 0x7ff);
        osc.set_accumulator(0xff_ffff);
        assert_eq!(osc.output(0), 0x000);
    }

    #[test]
    fn test_ring_mod_flips_triangle() {
        let mut osc = osc_with(0, 0x14);
        osc.set_accumulator(0x40_0000);
        let plain = osc.output(0);
        let ringed = osc.output(ACC_MSB);
        assert_eq!(plain, 0x800);
        assert_eq!(ringed, 0x7ff);
    }

    #[test]
    fn test_pulse_width_compare() {
        let mut osc = osc_with(0, 0x40);
        osc.set_pulse_width(0x800);
        osc.set_accumulator(0x7f_f000);
        assert_eq!(osc.output(0), 0x000);
        osc.set_accumulator(0x80_0000);
        assert_eq!(osc.output(0), 0xfff);
    }

    #[test]
    fn test_test_bit_resets_and_reseeds_lfsr() {
        let mut osc = osc_with(0x4000, 0x80);
        for _ in 0..5000 {
            osc.clock();
        }
        osc.write_control(0x88);
        assert_eq!(osc.accumulator(), 0);
        assert_eq!(osc.shift_register(), 0);
        osc.clock();
        assert_eq!(osc.accumulator(), 0, "test bit holds the accumulator");
        osc.write_control(0x80);
        assert_eq!(osc.shift_register(), LFSR_SEED);
    }

    #[test]
    fn test_noise_deterministic() {
        let mut a = osc_with(7493, 0x80);
        let mut b = osc_with(7493, 0x80);
        for _ in 0..20_000 {
            a.clock();
            b.clock();
            assert_eq!(a.output(0), b.output(0));
        }
    }

    #[test]
    fn test_noise_changes_over_time() {
        let mut osc = osc_with(0x8000, 0x80);
        for _ in 0..100 {
            osc.clock();
        }
        assert_ne!(osc.shift_register(), LFSR_SEED);
    }

    #[test]
    fn test_clock_delta_matches_single_steps() {
        for &freq in &[1u16, 0x1234, 0x8000, 0xffff] {
            let mut single = osc_with(freq, 0x80);
            let mut multi = osc_with(freq, 0x80);
            for step in [1u32, 7, 19, 100, 333, 1000] {
                for _ in 0..step {
                    single.clock();
                }
                multi.clock_delta(step);
                assert_eq!(single.accumulator(), multi.accumulator(), "freq {:#x}", freq);
                assert_eq!(
                    single.shift_register(),
                    multi.shift_register(),
                    "LFSR mismatch at freq {:#x} step {}",
                    freq,
                    step
                );
            }
        }
    }

    #[test]
    fn test_msb_rising_detected() {
        let mut osc = osc_with(0x100, 0x20);
        osc.set_accumulator(0x7f_ff80);
        osc.clock();
        assert!(osc.msb_rising());
        osc.clock();
        assert!(!osc.msb_rising());
    }

    #[test]
    fn test_zero_waveform_is_silent() {
        let mut osc = osc_with(0x1000, 0x00);
        osc.clock_delta(1234);
        assert_eq!(osc.output(0), 0);
    }

    #[test]
    fn test_combined_pulse_gated_by_pulse() {
        let mut osc = osc_with(0, 0x60);
        osc.set_pulse_width(0xfff);
        osc.set_accumulator(0x80_0000);
        assert_eq!(osc.output(0), 0, "pulse low masks the combined waveform");
    }

    #[test]
    fn test_control_readback() {
        let mut osc = Oscillator::default();
        osc.write_control(0x47);
        assert_eq!(osc.control(), 0x46, "gate belongs to the envelope");
    }
}
