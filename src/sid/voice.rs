//! One SID voice: waveform generator times envelope
//!
//! The waveform DAC output is multiplied by the envelope DAC. On the 6581
//! neither DAC is centred: the waveform "zero" sits at 0x380 and the envelope
//! multiplier adds roughly half a voice of DC. The 8580 has neither offset.

use super::envelope::EnvelopeGenerator;
use super::oscillator::Oscillator;
use super::ChipModel;

// Measured waveform zero level on the 6581 ($D41B = 0x38 at 5.94 V).
const WAVE_ZERO_6581: i32 = 0x0380;
const WAVE_ZERO_8580: i32 = 0x0800;

// Envelope DAC offset on the 6581, about half the dynamic range of a voice.
const VOICE_DC_6581: i32 = 0x800 * 0xff;

/// Oscillator and envelope pair
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    /// Waveform generator
    pub osc: Oscillator,
    /// ADSR envelope
    pub envelope: EnvelopeGenerator,
    wave_zero: i32,
    voice_dc: i32,
}

impl Voice {
    /// Create a silent voice for `model`.
    pub fn new(model: ChipModel) -> Self {
        let mut voice = Self {
            osc: Oscillator::new(model),
            envelope: EnvelopeGenerator::new(),
            wave_zero: WAVE_ZERO_6581,
            voice_dc: VOICE_DC_6581,
        };
        voice.set_chip_model(model);
        voice
    }

    /// Switch DAC offsets and waveform tables.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.osc.set_chip_model(model);
        (self.wave_zero, self.voice_dc) = match model {
            ChipModel::Mos6581 => (WAVE_ZERO_6581, VOICE_DC_6581),
            ChipModel::Mos8580 => (WAVE_ZERO_8580, 0),
        };
    }

    /// Control register: the oscillator takes the waveform bits, the
    /// envelope takes the gate.
    pub fn write_control(&mut self, value: u8) {
        self.osc.write_control(value);
        self.envelope.write_control(value);
    }

    /// 20-bit voice output for a given 12-bit waveform sample, in
    /// `[-2048*255, 2047*255]` plus the chip's voice DC.
    #[inline]
    pub fn mix(&self, wave: u16) -> i32 {
        (wave as i32 - self.wave_zero) * self.envelope.output() as i32 + self.voice_dc
    }

    /// 20-bit voice output.
    ///
    /// # Arguments
    ///
    /// * `ring_source_acc` - Accumulator of the ring modulation source voice
    #[inline]
    pub fn output(&self, ring_source_acc: u32) -> i32 {
        self.mix(self.osc.output(ring_source_acc))
    }

    /// Waveform value with the envelope fully open and no DC
    #[inline]
    pub fn wave_zero(&self) -> i32 {
        self.wave_zero
    }

    /// Return to power-on state.
    pub fn reset(&mut self) {
        self.osc.reset();
        self.envelope.reset();
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}
