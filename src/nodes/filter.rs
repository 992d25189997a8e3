//! Standalone SID filter node
//!
//! Runs an external signal through the chip filter on voice 1's input.
//! Samples in `[-1, 1]` are scaled into the 20-bit voice domain; the filter
//! runs at full volume with only voice 1 routed through it.

use super::params::FilterParams;
use super::Node;
use crate::clock::{ClockAccumulator, PAL_CLOCK_HZ};
use crate::sid::{Filter, FilterRouting};
use crate::Result;

/// Full-scale voice amplitude, `2047 * 255`
const VOICE_FULL_SCALE: f32 = 2047.0 * 255.0;

/// SID filter applied to an audio buffer
///
/// [`Node::render`] filters the buffer in place; use
/// [`FilterNode::process_buffer`] for separate input and output.
#[derive(Debug, Clone)]
pub struct FilterNode {
    params: FilterParams,
    filter: Filter,
    clock: ClockAccumulator,
}

impl FilterNode {
    /// Create a filter at the PAL chip clock.
    pub fn new(params: FilterParams, sample_rate: f64) -> Result<Self> {
        let clock = ClockAccumulator::new(sample_rate, PAL_CLOCK_HZ)?;
        log::debug!("filter node at {sample_rate} Hz: {params:?}");
        let mut node = FilterNode {
            params,
            filter: Filter::new(params.chip_model),
            clock,
        };
        node.update();
        Ok(node)
    }

    /// Filter `input` into `output`. Extra frames in the longer slice are
    /// left untouched.
    pub fn process_buffer(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = input.len().min(output.len());
        output[..frames].copy_from_slice(&input[..frames]);
        self.process(&[], &mut output[..frames]);
    }

    /// Underlying filter
    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl Node for FilterNode {
    type Params = FilterParams;

    fn params(&self) -> &FilterParams {
        &self.params
    }

    fn set_params(&mut self, params: FilterParams) {
        self.params = params;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.clock.set_rates(sample_rate, PAL_CLOCK_HZ)
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.clock.reset();
        self.update();
    }

    fn update(&mut self) {
        let p = self.params;
        if self.filter.chip_model() != p.chip_model {
            self.filter.set_chip_model(p.chip_model);
        }
        let fc = p.cutoff_register();
        self.filter.write_fc_lo((fc & 0x07) as u8);
        self.filter.write_fc_hi((fc >> 3) as u8);
        self.filter
            .write_res_filt((p.resonance_nibble() << 4) | FilterRouting::VOICE1.bits());
        self.filter.write_mode_vol(p.filter_type.mode_bits() | 0x0f);
        self.filter.set_resonance_boost(p.boost());
    }

    fn render(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            let input = (sample.clamp(-1.0, 1.0) * VOICE_FULL_SCALE) as i32;
            let cycles = self.clock.cycles_for_next_sample();
            self.filter.clock_delta(cycles, input, 0, 0, 0);
            let out = (self.filter.output() >> 1).clamp(i16::MIN as i32, i16::MAX as i32);
            *sample = out as f32 / 32768.0;
        }
    }
}
