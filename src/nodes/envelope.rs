//! ADSR envelope node

use super::params::EnvelopeParams;
use super::Node;
use crate::clock::{ClockAccumulator, PAL_CLOCK_HZ};
use crate::sid::{Control, EnvelopeGenerator, EnvelopeState};
use crate::Result;

/// Envelope level normalized to `[0, 1]`
///
/// Each trigger toggles the gate: the first starts the attack, the next
/// starts the release.
#[derive(Debug, Clone)]
pub struct EnvelopeNode {
    params: EnvelopeParams,
    envelope: EnvelopeGenerator,
    clock: ClockAccumulator,
    gate: bool,
}

impl EnvelopeNode {
    /// Create a released envelope at the PAL chip clock.
    pub fn new(params: EnvelopeParams, sample_rate: f64) -> Result<Self> {
        let clock = ClockAccumulator::new(sample_rate, PAL_CLOCK_HZ)?;
        log::debug!("envelope node at {sample_rate} Hz: {params:?}");
        let mut node = EnvelopeNode {
            params,
            envelope: EnvelopeGenerator::new(),
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

    /// Current envelope phase
    pub fn state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    fn write_gate(&mut self) {
        let control = if self.gate { Control::GATE } else { Control::empty() };
        self.envelope.write_control(control.bits());
    }
}

impl Node for EnvelopeNode {
    type Params = EnvelopeParams;

    fn params(&self) -> &EnvelopeParams {
        &self.params
    }

    fn set_params(&mut self, params: EnvelopeParams) {
        self.params = params;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.clock.set_rates(sample_rate, PAL_CLOCK_HZ)
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.clock.reset();
        self.gate = false;
        self.update();
    }

    fn toggle_gate(&mut self) {
        self.gate = !self.gate;
        self.write_gate();
    }

    fn update(&mut self) {
        self.envelope.write_attack_decay(self.params.attack_decay());
        self.envelope.write_sustain_release(self.params.sustain_release());
    }

    fn render(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            let cycles = self.clock.cycles_for_next_sample();
            self.envelope.clock_delta(cycles);
            *sample = self.envelope.output() as f32 / 255.0;
        }
    }
}
