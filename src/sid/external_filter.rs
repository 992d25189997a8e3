//! C64 audio output stage
//!
//! Two RC networks follow the SID on the mainboard: a ~16 kHz low-pass
//! (10 kOhm, 1 nF) and a ~1.6 Hz DC-blocking high-pass (10 kOhm, 10 uF).
//! Both are first order IIR sections in fixed point.

use super::ChipModel;
use crate::clock::PAL_CLOCK_HZ;

/// Largest DC level the 6581 mixer can produce at full volume:
/// `((wave DC + voice DC) * voices + mixer DC) * volume`
const MIXER_DC_6581: i32 = ((((0x800 - 0x380) + 0x800) * 0xff * 3 - 0xfff * 0xff / 18) >> 7) * 0x0f;

const LP_RC: f64 = 10e3 * 1000e-12;
const HP_RC: f64 = 10e3 * 10e-6;

const LP_SHIFT: u32 = 7;
const HP_SHIFT: u32 = 17;
const STATE_SHIFT: u32 = 11;

// Same stability bound as the filter's multi-cycle step.
const MAX_STEP: u32 = 8;

/// Output RC filter pair
#[derive(Debug, Clone, Copy)]
pub struct ExternalFilter {
    enabled: bool,
    mixer_dc: i32,
    lp_coeff: i64,
    hp_coeff: i64,
    lp: i64,
    hp: i64,
}

impl ExternalFilter {
    /// Create an enabled output stage clocked at the PAL rate.
    pub fn new(model: ChipModel) -> Self {
        let mut filter = Self {
            enabled: true,
            mixer_dc: 0,
            lp_coeff: 0,
            hp_coeff: 0,
            lp: 0,
            hp: 0,
        };
        filter.set_chip_model(model);
        filter.set_clock_frequency(PAL_CLOCK_HZ);
        filter
    }

    /// DC removed when the stage is bypassed.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.mixer_dc = match model {
            ChipModel::Mos6581 => MIXER_DC_6581,
            ChipModel::Mos8580 => 0,
        };
    }

    /// Bypass both RC sections.
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the RC sections are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Recompute coefficients, `alpha = dt / (dt + RC)`.
    pub fn set_clock_frequency(&mut self, clock_hz: f64) {
        let dt = 1.0 / clock_hz;
        self.lp_coeff = (dt / (dt + LP_RC) * (1u32 << LP_SHIFT) as f64 + 0.5) as i64;
        self.hp_coeff = (dt / (dt + HP_RC) * (1u32 << HP_SHIFT) as f64 + 0.5) as i64;
    }

    /// Clear both integrators.
    pub fn reset(&mut self) {
        self.lp = 0;
        self.hp = 0;
    }

    /// Advance one cycle with filter output `vi`.
    #[inline]
    pub fn clock(&mut self, vi: i32) {
        self.clock_delta(1, vi);
    }

    /// Advance `delta` cycles with constant input.
    #[inline]
    pub fn clock_delta(&mut self, mut delta: u32, vi: i32) {
        if !self.enabled {
            self.lp = (vi as i64 - self.mixer_dc as i64) << STATE_SHIFT;
            self.hp = 0;
            return;
        }

        let vi = (vi as i64) << STATE_SHIFT;
        while delta != 0 {
            let step = delta.min(MAX_STEP) as i64;
            let dvlp = (self.lp_coeff * step * (vi - self.lp)) >> LP_SHIFT;
            let dvhp = (self.hp_coeff * step * (self.lp - self.hp)) >> HP_SHIFT;
            self.lp += dvlp;
            self.hp += dvhp;
            delta -= step as u32;
        }
    }

    /// Integrator state for snapshots
    pub fn state(&self) -> (i64, i64) {
        (self.lp, self.hp)
    }

    /// Restore integrator state.
    pub fn set_state(&mut self, (lp, hp): (i64, i64)) {
        self.lp = lp;
        self.hp = hp;
    }

    /// Filtered output, `lp - hp`
    #[inline]
    pub fn output(&self) -> i32 {
        ((self.lp - self.hp) >> STATE_SHIFT) as i32
    }
}

impl Default for ExternalFilter {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dc_is_blocked() {
        let mut filter = ExternalFilter::new(ChipModel::Mos8580);
        for _ in 0..2_000 {
            filter.clock_delta(1000, 100_000);
        }
        assert!(filter.output().abs() < 1_000, "DC leaks: {}", filter.output());
    }

    #[test]
    fn test_step_passes_initially() {
        let mut filter = ExternalFilter::new(ChipModel::Mos8580);
        for _ in 0..200 {
            filter.clock(100_000);
        }
        assert!(filter.output() > 90_000, "low-pass should settle in microseconds");
    }

    #[test]
    fn test_bypass_removes_mixer_dc() {
        let mut filter = ExternalFilter::new(ChipModel::Mos6581);
        filter.enable(false);
        filter.clock(MIXER_DC_6581 + 1234);
        assert_eq!(filter.output(), 1234);
    }

    #[test]
    fn test_single_and_delta_steps_agree_for_one_cycle() {
        let mut a = ExternalFilter::default();
        let mut b = ExternalFilter::default();
        for i in 0..1000 {
            a.clock(i * 37);
            b.clock_delta(1, i * 37);
        }
        assert_eq!(a.output(), b.output());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = ExternalFilter::default();
        filter.clock_delta(500, 50_000);
        filter.reset();
        assert_eq!(filter.output(), 0);
    }
}
