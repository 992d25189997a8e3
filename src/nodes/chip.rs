//! Three-voice chip node

use super::params::{ChipParams, Waveform};
use super::Node;
use crate::clock::{ClockAccumulator, PAL_CLOCK_HZ};
use crate::config::SamplingConfig;
use crate::sid::registers::{Register, VoiceRegister};
use crate::sid::{Chip, Control};
use crate::Result;

/// Full-scale voice product, `2048 * 255`
const VOICE_SCALE: f32 = 2048.0 * 255.0;

/// Pre-filter monitor buffers, one per voice
///
/// Each receives the voice's 20-bit filter input normalized by
/// `2048 * 255`, including the chip's DAC offsets.
#[derive(Debug)]
pub struct VoiceTaps<'a> {
    /// Voices 1-3
    pub voices: [&'a mut [f32]; 3],
}

/// Complete chip driven by a [`ChipParams`] patch
///
/// The master output is `output() / 32768`. [`Node::toggle_gate`] flips all
/// three gates together; [`ChipNode::process_voices`] takes separate
/// triggers per voice.
#[derive(Debug, Clone)]
pub struct ChipNode {
    params: ChipParams,
    chip: Chip,
    clock: ClockAccumulator,
    gates: [bool; 3],
}

impl ChipNode {
    /// Create a released chip at the PAL clock.
    pub fn new(params: ChipParams, sample_rate: f64) -> Result<Self> {
        let clock = ClockAccumulator::new(sample_rate, PAL_CLOCK_HZ)?;
        let mut chip = Chip::new(params.chip_model);
        SamplingConfig::pal(sample_rate).apply(&mut chip)?;
        log::debug!("chip node at {sample_rate} Hz, {}", params.chip_model);
        let mut node = ChipNode {
            params,
            chip,
            clock,
            gates: [false; 3],
        };
        node.update();
        Ok(node)
    }

    /// Gate state of each voice
    pub fn gates(&self) -> [bool; 3] {
        self.gates
    }

    /// Underlying chip, for monitoring
    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    /// Flip the gate of voice `v` (0-2).
    pub fn toggle_voice_gate(&mut self, v: usize) {
        if let Some(gate) = self.gates.get_mut(v) {
            *gate = !*gate;
            self.write_control(v);
        }
    }

    /// Render one block with per-voice triggers.
    ///
    /// # Arguments
    ///
    /// * `triggers` - Ascending frame offsets per voice at which its gate
    ///   toggles
    /// * `output` - Master output block
    /// * `taps` - Optional per-voice monitor buffers
    pub fn process_voices(
        &mut self,
        triggers: [&[usize]; 3],
        output: &mut [f32],
        mut taps: Option<VoiceTaps<'_>>,
    ) {
        self.update();
        let frames = output.len();
        let mut cursors = [0usize; 3];
        let mut start = 0;
        while start < frames {
            for v in 0..3 {
                while triggers[v].get(cursors[v]).is_some_and(|&t| t <= start) {
                    cursors[v] += 1;
                    self.toggle_voice_gate(v);
                }
            }
            let end = (0..3)
                .filter_map(|v| triggers[v].get(cursors[v]).copied())
                .filter(|&t| t < frames)
                .min()
                .unwrap_or(frames);
            self.render_frames(start, &mut output[start..end], taps.as_mut());
            start = end;
        }
    }

    fn render_frames(&mut self, offset: usize, output: &mut [f32], mut taps: Option<&mut VoiceTaps<'_>>) {
        for (i, sample) in output.iter_mut().enumerate() {
            let cycles = self.clock.cycles_for_next_sample();
            self.chip.clock_delta(cycles);
            *sample = self.chip.output() as f32 / 32768.0;
            if let Some(taps) = taps.as_deref_mut() {
                for (v, tap) in taps.voices.iter_mut().enumerate() {
                    if let Some(slot) = tap.get_mut(offset + i) {
                        *slot = self.chip.voice_output(v) as f32 / VOICE_SCALE;
                    }
                }
            }
        }
    }

    fn write_control(&mut self, v: usize) {
        let waveform = self.params.voices[v].oscillator.waveform;
        write_voice(&mut self.chip, v, VoiceRegister::Control, control(waveform, self.gates[v]));
    }
}

fn control(waveform: Waveform, gate: bool) -> u8 {
    let mut control = Control::from_bits_retain(waveform.control_bits());
    control.set(Control::GATE, gate);
    control.bits()
}

fn write_voice(chip: &mut Chip, v: usize, reg: VoiceRegister, value: u8) {
    if let Some(reg) = Register::for_voice(v, reg) {
        chip.write(reg.addr(), value);
    }
}

/// Write a whole patch to `chip` through its registers and extension API.
///
/// Gate edges follow `gates` against the chip's current gate bits, so
/// reloading an unchanged patch does not retrigger envelopes.
pub fn load_patch(chip: &mut Chip, params: &ChipParams, gates: [bool; 3]) {
    if chip.chip_model() != params.chip_model {
        chip.set_chip_model(params.chip_model);
    }

    let boost = params.boost();
    chip.set_resonance_boost(boost);
    chip.enable_resonance_boost(boost > 0);

    let clock_hz = chip.clock_frequency();
    for (v, voice) in params.voices.iter().enumerate() {
        let [freq_lo, freq_hi] = voice.oscillator.frequency_register(clock_hz).to_le_bytes();
        let [pw_lo, pw_hi] = voice.oscillator.pulse_width_register().to_le_bytes();
        write_voice(chip, v, VoiceRegister::FreqLo, freq_lo);
        write_voice(chip, v, VoiceRegister::FreqHi, freq_hi);
        write_voice(chip, v, VoiceRegister::PwLo, pw_lo);
        write_voice(chip, v, VoiceRegister::PwHi, pw_hi);
        write_voice(chip, v, VoiceRegister::AttackDecay, voice.envelope.attack_decay());
        write_voice(chip, v, VoiceRegister::SustainRelease, voice.envelope.sustain_release());
        write_voice(chip, v, VoiceRegister::Control, control(voice.oscillator.waveform, gates[v]));
    }

    let fc = params.cutoff_register();
    chip.write(Register::FcLo.addr(), (fc & 0x07) as u8);
    chip.write(Register::FcHi.addr(), (fc >> 3) as u8);
    chip.write(Register::ResFilt.addr(), params.res_filt());
    chip.write(Register::ModeVol.addr(), params.mode_vol());

    let ext = params.extensions;
    match ext.voice_volume {
        Some(volumes) => {
            for (v, &volume) in volumes.iter().enumerate() {
                chip.set_voice_volume(v, volume);
            }
            chip.enable_voice_volume(true);
        }
        None => chip.enable_voice_volume(false),
    }
    match ext.fm {
        Some(routes) => {
            for (v, route) in routes.iter().enumerate() {
                chip.set_fm(v, route.source, route.depth);
            }
            chip.enable_fm(true);
        }
        None => chip.enable_fm(false),
    }
    chip.enable_dithering(ext.dithering);
    chip.enable_external_filter(ext.external_filter);
}

impl Node for ChipNode {
    type Params = ChipParams;

    fn params(&self) -> &ChipParams {
        &self.params
    }

    fn set_params(&mut self, params: ChipParams) {
        self.params = params;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        SamplingConfig::pal(sample_rate).apply(&mut self.chip)?;
        self.clock.set_rates(sample_rate, PAL_CLOCK_HZ)
    }

    fn reset(&mut self) {
        self.chip.reset();
        self.clock.reset();
        self.gates = [false; 3];
        self.update();
    }

    fn toggle_gate(&mut self) {
        for v in 0..3 {
            self.toggle_voice_gate(v);
        }
    }

    fn update(&mut self) {
        load_patch(&mut self.chip, &self.params, self.gates);
    }

    fn render(&mut self, output: &mut [f32]) {
        self.render_frames(0, output, None);
    }
}
