//! Node adapters
//!
//! Block-processing wrappers around the chip components for host audio
//! graphs. Each node owns its typed parameters, maps them onto register
//! writes once per block, and renders a normalized `f32` buffer.
//!
//! Gate triggers arrive as frame offsets within the block. Every trigger
//! toggles the gate at its offset; the block is rendered in segments between
//! triggers so the edge lands on the right sample.

mod chip;
mod envelope;
mod filter;
mod oscillator;
mod params;
mod voice;

pub use chip::{load_patch, ChipNode, VoiceTaps};
pub use envelope::EnvelopeNode;
pub use filter::FilterNode;
pub use oscillator::OscillatorNode;
pub use params::{
    ChipExtensions, ChipParams, EnvelopeParams, FilterParams, FilterType, FmParams,
    OscillatorParams, VoiceParams, Waveform, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ,
};
pub use voice::VoiceNode;

use crate::Result;

/// Common interface for block-processing nodes
pub trait Node: Send {
    /// Parameter set the node renders from
    type Params;

    /// Current parameters
    fn params(&self) -> &Self::Params;

    /// Replace the parameters; they take effect from the next block.
    fn set_params(&mut self, params: Self::Params);

    /// Change the host sample rate.
    ///
    /// # Returns
    ///
    /// `InvalidRate` if the rate is not positive and finite
    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()>;

    /// Return to the power-on state with the gate closed.
    fn reset(&mut self);

    /// Flip the gate. Nodes without a gate ignore this.
    fn toggle_gate(&mut self) {}

    /// Render consecutive samples with the current gate.
    fn render(&mut self, output: &mut [f32]);

    /// Apply parameters for this block.
    fn update(&mut self) {}

    /// Render one block.
    ///
    /// # Arguments
    ///
    /// * `triggers` - Frame offsets, ascending, at which the gate toggles;
    ///   offsets past the block are ignored
    /// * `output` - Block to fill
    fn process(&mut self, triggers: &[usize], output: &mut [f32]) {
        self.update();
        let frames = output.len();
        let mut pending = triggers.iter().copied().filter(|&t| t < frames).peekable();
        let mut start = 0;
        while start < frames {
            while pending.next_if(|&t| t <= start).is_some() {
                self.toggle_gate();
            }
            let end = pending.peek().copied().unwrap_or(frames);
            self.render(&mut output[start..end]);
            start = end;
        }
    }
}
