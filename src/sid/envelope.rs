//! ADSR envelope generator
//!
//! A 15-bit rate counter divides the chip clock by the period selected from
//! the active rate nibble. Each time it matches, the 8-bit envelope counter
//! steps once (attack) or, after a further exponential prescaler, once
//! (decay/release). The prescaler period grows as the level falls, which
//! gives the characteristic piecewise-exponential decay.
//!
//! The rate counter compares for equality only. Lowering the period below
//! the current count lets the counter run on until bit 15 wraps it back to
//! zero, up to 32768 cycles later. This "ADSR delay bug" is part of the
//! chip's audible behavior and is reproduced exactly.

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::oscillator::Control;

const RATE_COUNTER_MASK: u16 = 0x7fff;
const RATE_COUNTER_MSB: u16 = 0x8000;

/// Rate counter periods (cycles per envelope step) for rate nibbles 0-15.
/// One more than the datasheet timings at 1 MHz / 256 steps, as measured
/// on real chips.
pub const RATE_COUNTER_PERIOD: [u16; 16] = [
    9, 32, 63, 95, 149, 220, 267, 313, 392, 977, 1954, 3126, 3907, 11720, 19532, 31251,
];

/// Sustain comparison levels; the nibble is matched against both halves of
/// the counter.
pub const SUSTAIN_LEVEL: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

/// Envelope phase
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive, Serialize, Deserialize,
)]
pub enum EnvelopeState {
    /// Rising towards 0xff
    Attack = 0,
    /// Falling to the sustain level, then holding while gated
    DecaySustain = 1,
    /// Falling to zero after gate off
    #[default]
    Release = 2,
}

/// SID ADSR envelope generator
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeGenerator {
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    gate: bool,

    state: EnvelopeState,
    envelope_counter: u8,
    rate_counter: u16,
    rate_counter_period: u16,
    exponential_counter: u8,
    exponential_counter_period: u8,
    hold_zero: bool,
}

impl EnvelopeGenerator {
    /// Create a silent envelope in the release state.
    pub fn new() -> Self {
        let mut envelope = Self {
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            gate: false,
            state: EnvelopeState::Release,
            envelope_counter: 0,
            rate_counter: 0,
            rate_counter_period: RATE_COUNTER_PERIOD[0],
            exponential_counter: 0,
            exponential_counter_period: 1,
            hold_zero: true,
        };
        envelope.reset();
        envelope
    }

    /// Return to the power-on state: released, level 0, held at zero.
    pub fn reset(&mut self) {
        self.attack = 0;
        self.decay = 0;
        self.sustain = 0;
        self.release = 0;
        self.gate = false;
        self.state = EnvelopeState::Release;
        self.envelope_counter = 0;
        self.rate_counter = 0;
        self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
        self.exponential_counter = 0;
        self.exponential_counter_period = 1;
        self.hold_zero = true;
    }

    // === Register interface ===

    /// Control register. Only the gate bit is used; a rising gate starts the
    /// attack, a falling gate starts the release.
    pub fn write_control(&mut self, value: u8) {
        let gate_next = Control::from_bits_retain(value).contains(Control::GATE);

        if !self.gate && gate_next {
            self.state = EnvelopeState::Attack;
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.attack as usize];
            // Entering attack releases the zero freeze.
            self.hold_zero = false;
        } else if self.gate && !gate_next {
            self.state = EnvelopeState::Release;
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
        }
        self.gate = gate_next;
    }

    /// ATTACK_DECAY register
    pub fn write_attack_decay(&mut self, value: u8) {
        self.attack = (value >> 4) & 0x0f;
        self.decay = value & 0x0f;
        match self.state {
            EnvelopeState::Attack => {
                self.rate_counter_period = RATE_COUNTER_PERIOD[self.attack as usize]
            }
            EnvelopeState::DecaySustain => {
                self.rate_counter_period = RATE_COUNTER_PERIOD[self.decay as usize]
            }
            EnvelopeState::Release => {}
        }
    }

    /// SUSTAIN_RELEASE register
    pub fn write_sustain_release(&mut self, value: u8) {
        self.sustain = (value >> 4) & 0x0f;
        self.release = value & 0x0f;
        if self.state == EnvelopeState::Release {
            self.rate_counter_period = RATE_COUNTER_PERIOD[self.release as usize];
        }
    }

    /// Packed attack/decay nibbles
    pub fn attack_decay(&self) -> u8 {
        (self.attack << 4) | self.decay
    }

    /// Packed sustain/release nibbles
    pub fn sustain_release(&self) -> u8 {
        (self.sustain << 4) | self.release
    }

    /// Gate bit as last written
    pub fn gate(&self) -> bool {
        self.gate
    }

    // === Clocking ===

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        self.rate_counter += 1;
        if self.rate_counter & RATE_COUNTER_MSB != 0 {
            self.rate_counter = (self.rate_counter + 1) & RATE_COUNTER_MASK;
        }
        if self.rate_counter != self.rate_counter_period {
            return;
        }
        self.rate_counter = 0;
        self.rate_period_elapsed();
    }

    /// Advance `delta` cycles. Equivalent to `delta` calls to `clock`.
    #[inline]
    pub fn clock_delta(&mut self, mut delta: u32) {
        // Cycles until the next match. A period below the current count
        // only matches after the counter wraps through bit 15.
        let mut rate_step = self.rate_counter_period as i32 - self.rate_counter as i32;
        if rate_step <= 0 {
            rate_step += RATE_COUNTER_MASK as i32;
        }

        while delta != 0 {
            if delta < rate_step as u32 {
                self.rate_counter += delta as u16;
                if self.rate_counter & RATE_COUNTER_MSB != 0 {
                    self.rate_counter = (self.rate_counter + 1) & RATE_COUNTER_MASK;
                }
                return;
            }

            self.rate_counter = 0;
            delta -= rate_step as u32;
            self.rate_period_elapsed();
            rate_step = self.rate_counter_period as i32;
        }
    }

    #[inline]
    fn rate_period_elapsed(&mut self) {
        // Attack ignores the exponential prescaler.
        if self.state != EnvelopeState::Attack {
            self.exponential_counter = self.exponential_counter.wrapping_add(1);
            if self.exponential_counter != self.exponential_counter_period {
                return;
            }
        }
        self.exponential_counter = 0;

        if self.hold_zero {
            return;
        }
        self.step();
        self.update_exponential_period();
    }

    #[inline]
    fn step(&mut self) {
        match self.state {
            EnvelopeState::Attack => {
                // 0xff can flip to 0x00 if the gate toggles at the top.
                self.envelope_counter = self.envelope_counter.wrapping_add(1);
                if self.envelope_counter == 0xff {
                    self.state = EnvelopeState::DecaySustain;
                    self.rate_counter_period = RATE_COUNTER_PERIOD[self.decay as usize];
                }
            }
            EnvelopeState::DecaySustain => {
                if self.envelope_counter != SUSTAIN_LEVEL[self.sustain as usize] {
                    self.envelope_counter = self.envelope_counter.wrapping_sub(1);
                }
            }
            EnvelopeState::Release => {
                self.envelope_counter = self.envelope_counter.wrapping_sub(1);
            }
        }
    }

    #[inline]
    fn update_exponential_period(&mut self) {
        match self.envelope_counter {
            0xff => self.exponential_counter_period = 1,
            0x5d => self.exponential_counter_period = 2,
            0x36 => self.exponential_counter_period = 4,
            0x1a => self.exponential_counter_period = 8,
            0x0e => self.exponential_counter_period = 16,
            0x06 => self.exponential_counter_period = 30,
            0x00 => {
                self.exponential_counter_period = 1;
                // Frozen until the next attack.
                self.hold_zero = true;
            }
            _ => {}
        }
    }

    // === Output and state ===

    /// Envelope level 0-255
    #[inline]
    pub fn output(&self) -> u8 {
        self.envelope_counter
    }

    /// Current phase
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Raw counters for snapshots: (rate counter, rate period,
    /// exponential counter, exponential period, hold zero)
    pub fn counters(&self) -> (u16, u16, u8, u8, bool) {
        (
            self.rate_counter,
            self.rate_counter_period,
            self.exponential_counter,
            self.exponential_counter_period,
            self.hold_zero,
        )
    }

    /// Restore internal counters from a snapshot.
    pub fn restore(
        &mut self,
        state: EnvelopeState,
        envelope_counter: u8,
        counters: (u16, u16, u8, u8, bool),
    ) {
        self.state = state;
        self.envelope_counter = envelope_counter;
        self.rate_counter = counters.0 & RATE_COUNTER_MASK;
        self.rate_counter_period = counters.1 & RATE_COUNTER_MASK;
        self.exponential_counter = counters.2;
        self.exponential_counter_period = counters.3;
        self.hold_zero = counters.4;
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}
