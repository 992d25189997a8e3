//! Single voice node: waveform times envelope

use super::params::VoiceParams;
use super::Node;
use crate::clock::{ClockAccumulator, PAL_CLOCK_HZ};
use crate::sid::{ChipModel, Control, Voice};
use crate::Result;

/// Full-scale voice product, `2048 * 255`
const VOICE_SCALE: f32 = 2048.0 * 255.0;

/// One oscillator and envelope without the chip's DAC offsets
///
/// Output is `(wave - 2048) * env / (2048 * 255)`. Triggers toggle the
/// gate; waveform and pitch changes apply at the next block.
#[derive(Debug, Clone)]
pub struct VoiceNode {
    params: VoiceParams,
    chip_model: ChipModel,
    voice: Voice,
    clock: ClockAccumulator,
    gate: bool,
}

impl VoiceNode {
    /// Create a released voice at the PAL chip clock.
    pub fn new(params: VoiceParams, chip_model: ChipModel, sample_rate: f64) -> Result<Self> {
        let clock = ClockAccumulator::new(sample_rate, PAL_CLOCK_HZ)?;
        log::debug!("voice node at {sample_rate} Hz, {chip_model}: {params:?}");
        let mut node = VoiceNode {
            params,
            chip_model,
            voice: Voice::new(chip_model),
            clock,
            gate: false,
        };
        node.update();
        Ok(node)
    }

    /// Whether the gate is currently open
    pub fn gate(&self) -> bool {
        self.gate
    }

    /// Underlying voice
    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    /// Chip revision of the waveform tables and DAC
    pub fn chip_model(&self) -> ChipModel {
        self.chip_model
    }

    /// Switch chip revision from the next block.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.chip_model = chip_model;
    }

    fn control(&self) -> u8 {
        let mut control = Control::from_bits_retain(self.params.oscillator.waveform.control_bits());
        control.set(Control::GATE, self.gate);
        control.bits()
    }
}

impl Node for VoiceNode {
    type Params = VoiceParams;

    fn params(&self) -> &VoiceParams {
        &self.params
    }

    fn set_params(&mut self, params: VoiceParams) {
        self.params = params;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.clock.set_rates(sample_rate, PAL_CLOCK_HZ)
    }

    fn reset(&mut self) {
        self.voice.reset();
        self.clock.reset();
        self.gate = false;
        self.update();
    }

    fn toggle_gate(&mut self) {
        self.gate = !self.gate;
        self.voice.write_control(self.control());
    }

    fn update(&mut self) {
        let osc = self.params.oscillator;
        let env = self.params.envelope;
        self.voice.set_chip_model(self.chip_model);
        self.voice
            .osc
            .set_frequency(osc.frequency_register(self.clock.clock_rate()));
        self.voice.osc.set_pulse_width(osc.pulse_width_register());
        self.voice.envelope.write_attack_decay(env.attack_decay());
        self.voice.envelope.write_sustain_release(env.sustain_release());
        // Same gate as before, so no envelope edge.
        self.voice.write_control(self.control());
    }

    fn render(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            let cycles = self.clock.cycles_for_next_sample();
            self.voice.envelope.clock_delta(cycles);
            self.voice.osc.clock_delta(cycles);
            let wave = self.voice.osc.output(self.voice.osc.accumulator()) as i32 - 0x800;
            let env = self.voice.envelope.output() as i32;
            *sample = (wave * env) as f32 / VOICE_SCALE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{EnvelopeParams, OscillatorParams, Waveform};

    fn sustained(waveform: Waveform) -> VoiceParams {
        VoiceParams {
            oscillator: OscillatorParams {
                waveform,
                ..OscillatorParams::default()
            },
            envelope: EnvelopeParams::new(0, 0, 15, 0),
        }
    }

    fn voice(waveform: Waveform) -> Result<VoiceNode> {
        VoiceNode::new(sustained(waveform), ChipModel::Mos6581, 48_000.0)
    }

    #[test]
    fn test_gated_voice_is_audible() {
        let mut node = voice(Waveform::Sawtooth).expect("valid");
        let mut out = vec![0.0; 4800];
        node.process(&[0], &mut out);
        assert!(node.gate());
        let peak = out[2400..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.9, "full sustain sawtooth, peak {peak}");
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_ungated_voice_is_silent() {
        let mut node = voice(Waveform::Pulse).expect("valid");
        let mut out = vec![1.0; 1024];
        node.process(&[], &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_release_decays_to_zero() {
        let mut node = voice(Waveform::Triangle).expect("valid");
        let mut out = vec![0.0; 4800];
        node.process(&[0, 2400], &mut out);
        assert!(!node.gate());
        assert_eq!(out[4799], 0.0, "fast release finished within 50 ms");
        assert_eq!(node.voice().envelope.output(), 0);
    }

    #[test]
    fn test_waveform_change_keeps_envelope() {
        let mut node = voice(Waveform::Sawtooth).expect("valid");
        let mut out = vec![0.0; 2400];
        node.process(&[0], &mut out);
        node.set_params(sustained(Waveform::Pulse));
        node.process(&[], &mut out);
        assert_eq!(node.voice().envelope.output(), 0xff, "no retrigger on update");
        assert_eq!(node.voice().osc.waveform(), 0x4);
    }
}
