//! Free-running waveform generator node

use super::params::OscillatorParams;
use super::Node;
use crate::clock::{ClockAccumulator, PAL_CLOCK_HZ};
use crate::sid::{ChipModel, Control, Oscillator};
use crate::Result;

/// Center of the 12-bit waveform range
const WAVE_CENTER: f32 = 2048.0;

/// Raw 12-bit waveform, normalized to `[-1, 1)`
///
/// The oscillator has no envelope, so it runs with the gate permanently set
/// and ignores triggers.
#[derive(Debug, Clone)]
pub struct OscillatorNode {
    params: OscillatorParams,
    chip_model: ChipModel,
    osc: Oscillator,
    clock: ClockAccumulator,
}

impl OscillatorNode {
    /// Create a node at the PAL chip clock.
    ///
    /// # Arguments
    ///
    /// * `params` - Initial parameters
    /// * `chip_model` - Combined waveform tables to use
    /// * `sample_rate` - Host rate in Hz
    pub fn new(params: OscillatorParams, chip_model: ChipModel, sample_rate: f64) -> Result<Self> {
        let clock = ClockAccumulator::new(sample_rate, PAL_CLOCK_HZ)?;
        log::debug!("oscillator node at {sample_rate} Hz, {chip_model}: {params:?}");
        let mut node = OscillatorNode {
            params,
            chip_model,
            osc: Oscillator::new(chip_model),
            clock,
        };
        node.update();
        Ok(node)
    }

    /// Underlying waveform generator
    pub fn oscillator(&self) -> &Oscillator {
        &self.osc
    }

    /// Chip revision the waveform tables come from
    pub fn chip_model(&self) -> ChipModel {
        self.chip_model
    }

    /// Switch chip revision from the next block.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        self.chip_model = chip_model;
    }
}

impl Node for OscillatorNode {
    type Params = OscillatorParams;

    fn params(&self) -> &OscillatorParams {
        &self.params
    }

    fn set_params(&mut self, params: OscillatorParams) {
        self.params = params;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.clock.set_rates(sample_rate, PAL_CLOCK_HZ)
    }

    fn reset(&mut self) {
        self.osc.reset();
        self.clock.reset();
        self.update();
    }

    fn update(&mut self) {
        let p = self.params;
        self.osc.set_chip_model(self.chip_model);
        self.osc
            .set_frequency(p.frequency_register(self.clock.clock_rate()));
        self.osc.set_pulse_width(p.pulse_width_register());
        self.osc
            .write_control(p.waveform.control_bits() | Control::GATE.bits());
    }

    fn render(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            let cycles = self.clock.cycles_for_next_sample();
            self.osc.clock_delta(cycles);
            let raw = self.osc.output(self.osc.accumulator());
            *sample = (raw as f32 - WAVE_CENTER) / WAVE_CENTER;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Waveform;

    fn render(params: OscillatorParams, frames: usize) -> Vec<f32> {
        let mut node =
            OscillatorNode::new(params, ChipModel::Mos6581, 48_000.0).expect("valid rate");
        let mut out = vec![0.0; frames];
        node.process(&[], &mut out);
        out
    }

    #[test]
    fn test_output_normalized() {
        for waveform in [
            Waveform::Triangle,
            Waveform::Sawtooth,
            Waveform::Pulse,
            Waveform::Noise,
            Waveform::PulseSawTri,
        ] {
            let params = OscillatorParams {
                waveform,
                ..OscillatorParams::default()
            };
            let out = render(params, 4800);
            assert!(
                out.iter().all(|s| (-1.0..1.0).contains(s)),
                "{waveform:?} out of range"
            );
        }
    }

    #[test]
    fn test_sawtooth_period() {
        let out = render(OscillatorParams::default(), 4800);
        // Sawtooth wraps once per period: count large downward jumps.
        let wraps = out.windows(2).filter(|w| w[1] < w[0] - 1.0).count();
        assert!((43..=45).contains(&wraps), "440 Hz over 0.1 s, got {wraps}");
    }

    #[test]
    fn test_identical_noise() {
        let params = OscillatorParams {
            waveform: Waveform::Noise,
            frequency: 3000.0,
            ..OscillatorParams::default()
        };
        let a = render(params, 2048);
        let b = render(params, 2048);
        assert_eq!(a, b);
        assert!(a.iter().any(|&s| s != a[0]), "noise should vary");
    }

    #[test]
    fn test_reset_repeats_output() {
        let mut node = OscillatorNode::new(OscillatorParams::default(), ChipModel::Mos6581, 44_100.0)
            .expect("valid");
        let mut first = vec![0.0; 512];
        node.process(&[], &mut first);
        node.reset();
        let mut second = vec![0.0; 512];
        node.process(&[], &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_bad_rate() {
        assert!(OscillatorNode::new(OscillatorParams::default(), ChipModel::Mos6581, 0.0).is_err());
        let mut node = OscillatorNode::new(OscillatorParams::default(), ChipModel::Mos6581, 48_000.0)
            .expect("valid");
        assert!(node.set_sample_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_chip_model_selects_tables() {
        let params = OscillatorParams {
            waveform: Waveform::PulseSaw,
            frequency: 1000.0,
            ..OscillatorParams::default()
        };
        let mut node = OscillatorNode::new(params, ChipModel::Mos6581, 48_000.0).expect("valid");
        node.set_chip_model(ChipModel::Mos8580);
        node.reset();
        let mut out = vec![0.0; 960];
        node.process(&[], &mut out);
        assert_eq!(node.chip_model(), ChipModel::Mos8580);

        let mut reference = Oscillator::new(ChipModel::Mos8580);
        reference.set_frequency(params.frequency_register(PAL_CLOCK_HZ));
        reference.set_pulse_width(params.pulse_width_register());
        reference.write_control(0x61);
        let mut clock = ClockAccumulator::new(48_000.0, PAL_CLOCK_HZ).expect("valid");
        for (i, &sample) in out.iter().enumerate() {
            reference.clock_delta(clock.cycles_for_next_sample());
            let raw = reference.output(reference.accumulator());
            assert_eq!(sample, (raw as f32 - WAVE_CENTER) / WAVE_CENTER, "frame {i}");
        }
    }
}
