//! SID chip: register interface, bus behaviour and render entry points
//!
//! Wraps the cycle engine in a [`Sampler`] and adds what the CPU sees: the
//! register window, the decaying data bus latch behind write-only
//! registers, and the snapshot interface.

use serde::{Deserialize, Serialize};

use super::envelope::EnvelopeState;
use super::registers::{Register, RegisterBank, VoiceRegister, NUM_REGISTERS, NUM_WRITABLE};
use super::sampler::{Sampler, SamplingMethod, DEFAULT_FILTER_SCALE};
use super::synth::{FmRoute, Synth};
use super::ChipModel;
use crate::clock::{DEFAULT_SAMPLE_RATE, PAL_CLOCK_HZ};
use crate::Result;

/// Cycles until the bus latch reads back as 0
pub const BUS_VALUE_TTL: u32 = 0x2000;

/// Full chip state for save and restore
///
/// Holds every register as it would read back plus the internal counters a
/// register write cannot reach. Extension settings (cross-modulation routes,
/// voice volumes, resonance boost, sampling) are configuration and stay with
/// the receiving chip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipState {
    /// Register window 0x00-0x1F
    pub sid_register: [u8; NUM_REGISTERS],
    /// Bus latch
    pub bus_value: u8,
    /// Cycles left before the latch decays
    pub bus_value_ttl: u32,
    /// External input level
    pub ext_in: i32,
    /// Phase accumulators
    pub accumulator: [u32; 3],
    /// Noise LFSRs
    pub shift_register: [u32; 3],
    /// Envelope phases
    pub envelope_state: [EnvelopeState; 3],
    /// Envelope levels
    pub envelope_counter: [u8; 3],
    /// Exponential dividers
    pub exponential_counter: [u8; 3],
    /// Exponential divider periods
    pub exponential_counter_period: [u8; 3],
    /// Hold-at-zero latches
    pub hold_zero: [bool; 3],
    /// 15-bit rate counters
    pub rate_counter: [u16; 3],
    /// Rate counter periods
    pub rate_counter_period: [u16; 3],
    /// Filter integrators `[vhp, vbp, vlp, vnf]`
    pub filter_integrators: [i32; 4],
    /// Output stage integrators `(lp, hp)`
    pub external_filter: (i64, i64),
    /// Accumulator MSB edge seen on the last clock
    #[serde(default)]
    pub msb_rising: [bool; 3],
    /// Waveforms mixed on the last clock, read by cross-modulation
    #[serde(default)]
    pub voice_waveform: [u16; 3],
    /// Voice samples fed to the filter on the last clock
    #[serde(default)]
    pub voice_output: [i32; 3],
}

/// MOS 6581/8580 SID
#[derive(Clone)]
pub struct Chip {
    sampler: Sampler,
    chip_model: ChipModel,
    bus_value: u8,
    bus_value_ttl: u32,
    clock_frequency: f64,
    sample_rate: f64,
    pass_frequency: Option<f64>,
    filter_scale: f64,
}

impl Chip {
    /// Create a silent chip using the fast render path at PAL clock and
    /// 48 kHz.
    pub fn new(chip_model: ChipModel) -> Self {
        Self {
            sampler: Sampler::new(Synth::new(chip_model)),
            chip_model,
            bus_value: 0,
            bus_value_ttl: 0,
            clock_frequency: PAL_CLOCK_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
            pass_frequency: None,
            filter_scale: DEFAULT_FILTER_SCALE,
        }
    }

    /// Switch chip model. Running state is kept.
    pub fn set_chip_model(&mut self, chip_model: ChipModel) {
        if chip_model != self.chip_model {
            log::debug!("chip model {} -> {}", self.chip_model, chip_model);
        }
        self.chip_model = chip_model;
        self.sampler.synth.set_chip_model(chip_model);
    }

    /// Active chip model
    pub fn chip_model(&self) -> ChipModel {
        self.chip_model
    }

    /// Power-on state. Extension settings survive.
    pub fn reset(&mut self) {
        self.sampler.reset();
        self.bus_value = 0;
        self.bus_value_ttl = 0;
    }

    /// Cycle engine, for direct access to voices and filters
    pub fn synth(&self) -> &Synth {
        &self.sampler.synth
    }

    /// Mutable cycle engine
    pub fn synth_mut(&mut self) -> &mut Synth {
        &mut self.sampler.synth
    }

    // === Register interface ===

    /// Write a register. The value also lands on the data bus.
    pub fn write(&mut self, addr: u8, value: u8) {
        if let Some(reg) = Register::from_addr(addr) {
            log::trace!("write {} = ${:02X}", reg, value);
        }
        self.bus_value = value;
        self.bus_value_ttl = BUS_VALUE_TTL;
        self.sampler.synth.write(addr, value);
    }

    /// Read a register. Write-only and unmapped addresses return the bus.
    pub fn read(&self, addr: u8) -> u8 {
        self.sampler.synth.read(addr, self.bus_value)
    }

    /// Register window reconstructed from chip state
    pub fn registers(&self) -> RegisterBank {
        let synth = &self.sampler.synth;
        let mut bank = RegisterBank::new();
        for (v, voice) in synth.voices.iter().enumerate() {
            let osc = &voice.osc;
            let env = &voice.envelope;
            let gate = if env.gate() { 0x01 } else { 0x00 };
            let values = [
                (VoiceRegister::FreqLo, osc.frequency() as u8),
                (VoiceRegister::FreqHi, (osc.frequency() >> 8) as u8),
                (VoiceRegister::PwLo, osc.pulse_width() as u8),
                (VoiceRegister::PwHi, (osc.pulse_width() >> 8) as u8),
                (VoiceRegister::Control, osc.control() | gate),
                (VoiceRegister::AttackDecay, env.attack_decay()),
                (VoiceRegister::SustainRelease, env.sustain_release()),
            ];
            for (reg, value) in values {
                if let Some(reg) = Register::for_voice(v, reg) {
                    bank.write(reg.addr(), value);
                }
            }
        }
        let filter = &synth.filter;
        let voice3_off = if filter.voice3_off() { 0x80 } else { 0x00 };
        bank.write(Register::FcLo.addr(), (filter.fc() & 0x07) as u8);
        bank.write(Register::FcHi.addr(), (filter.fc() >> 3) as u8);
        bank.write(
            Register::ResFilt.addr(),
            (filter.res() << 4) | filter.routing().bits(),
        );
        bank.write(
            Register::ModeVol.addr(),
            voice3_off | (filter.mode().bits() << 4) | filter.vol(),
        );
        for addr in [Register::PotX, Register::PotY, Register::Osc3, Register::Env3] {
            bank.write(addr.addr(), self.read(addr.addr()));
        }
        bank
    }

    /// Write 0x00-0x18 from a register image in address order.
    pub fn load_registers(&mut self, registers: &[u8]) {
        for (addr, &value) in registers.iter().take(NUM_WRITABLE).enumerate() {
            self.write(addr as u8, value);
        }
    }

    // === Clocking ===

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        if self.bus_value_ttl > 0 {
            self.bus_value_ttl -= 1;
            if self.bus_value_ttl == 0 {
                self.bus_value = 0;
            }
        }
        self.sampler.synth.clock();
    }

    /// Advance `delta` cycles.
    #[inline]
    pub fn clock_delta(&mut self, delta: u32) {
        self.age_bus(delta);
        self.sampler.synth.clock_delta(delta);
    }

    fn age_bus(&mut self, delta: u32) {
        self.bus_value_ttl = self.bus_value_ttl.saturating_sub(delta);
        if self.bus_value_ttl == 0 {
            self.bus_value = 0;
        }
    }

    /// Render samples with the active method.
    ///
    /// # Arguments
    ///
    /// * `delta` - Cycles to run; left holding the remainder if `buffer`
    ///   fills first
    /// * `buffer` - Output samples
    /// * `interleave` - Stride between samples in `buffer`
    ///
    /// # Returns
    ///
    /// Number of samples written
    pub fn clock_samples(&mut self, delta: &mut u32, buffer: &mut [i16], interleave: usize) -> usize {
        let cycles = *delta;
        let written = self.sampler.clock(delta, buffer, interleave);
        self.age_bus(cycles - *delta);
        written
    }

    /// Render exactly one sample with the active method.
    ///
    /// Clocks the cycles up to the next sample point, so consecutive calls
    /// follow the host rate set by
    /// [`set_sampling_parameters`](Self::set_sampling_parameters).
    pub fn render_sample(&mut self) -> i16 {
        let mut delta = self.sampler.cycles_to_next_sample();
        let mut sample = [0i16; 1];
        self.clock_samples(&mut delta, &mut sample, 1);
        sample[0]
    }

    /// 16-bit output for the current cycle
    #[inline]
    pub fn output(&self) -> i16 {
        self.sampler.synth.output()
    }

    /// Feed one 16-bit sample into the external input (EXT IN pin).
    pub fn input(&mut self, sample: i16) {
        // Scale to three voices' worth of 20-bit range.
        self.sampler.synth.ext_in = ((sample as i32) << 4) * 3;
    }

    // === Sampling configuration ===

    /// Configure the render path and both clock domains.
    ///
    /// # Arguments
    ///
    /// * `method` - Render path
    /// * `clock_frequency` - Chip clock in Hz
    /// * `sample_rate` - Host rate in Hz
    /// * `pass_frequency` - Resampler passband edge, `None` for the default
    /// * `filter_scale` - Resampler FIR gain, 0.9 to 1.0
    pub fn set_sampling_parameters(
        &mut self,
        method: SamplingMethod,
        clock_frequency: f64,
        sample_rate: f64,
        pass_frequency: Option<f64>,
        filter_scale: f64,
    ) -> Result<()> {
        self.sampler.set_parameters(
            method,
            clock_frequency,
            sample_rate,
            pass_frequency,
            filter_scale,
        )?;
        self.sampler.synth.ext_filter.set_clock_frequency(clock_frequency);
        self.clock_frequency = clock_frequency;
        self.sample_rate = sample_rate;
        self.pass_frequency = pass_frequency;
        self.filter_scale = filter_scale;
        Ok(())
    }

    /// Change only the host rate, keeping method and clock.
    pub fn adjust_sampling_frequency(&mut self, sample_rate: f64) -> Result<()> {
        self.set_sampling_parameters(
            self.sampler.method(),
            self.clock_frequency,
            sample_rate,
            self.pass_frequency,
            self.filter_scale,
        )
    }

    /// Active render path
    pub fn sampling_method(&self) -> SamplingMethod {
        self.sampler.method()
    }

    /// Chip clock in Hz
    pub fn clock_frequency(&self) -> f64 {
        self.clock_frequency
    }

    /// Host rate in Hz
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    // === Extensions ===

    /// Bypass the analog filter.
    pub fn enable_filter(&mut self, enable: bool) {
        self.sampler.synth.filter.enable_filter(enable);
    }

    /// Bypass the output RC stage.
    pub fn enable_external_filter(&mut self, enable: bool) {
        self.sampler.synth.ext_filter.enable(enable);
    }

    /// Dither voices before the filter's bit reduction.
    pub fn enable_dithering(&mut self, enable: bool) {
        self.sampler.synth.filter.enable_dithering(enable);
    }

    /// Route amplitude cross-modulation; `source` 0 = off, 1-3 = voice.
    pub fn set_fm(&mut self, voice: usize, source: u8, depth: u8) {
        self.sampler.synth.set_fm(voice, source, depth);
    }

    /// Cross-modulation route of `voice`
    pub fn fm(&self, voice: usize) -> FmRoute {
        self.sampler.synth.fm(voice)
    }

    /// Master switch for cross-modulation.
    pub fn enable_fm(&mut self, enable: bool) {
        self.sampler.synth.enable_fm(enable);
    }

    /// Per-voice gain, 256 = unity.
    pub fn set_voice_volume(&mut self, voice: usize, volume: i32) {
        self.sampler.synth.set_voice_volume(voice, volume);
    }

    /// Master switch for per-voice gain.
    pub fn enable_voice_volume(&mut self, enable: bool) {
        self.sampler.synth.enable_voice_volume(enable);
    }

    /// Resonance boost, 0 = stock.
    pub fn set_resonance_boost(&mut self, boost: u8) {
        self.sampler.synth.set_resonance_boost(boost);
    }

    /// Master switch for resonance boost.
    pub fn enable_resonance_boost(&mut self, enable: bool) {
        self.sampler.synth.enable_resonance_boost(enable);
    }

    // === Direct modulation ===

    /// Set a voice's 16-bit frequency without touching the bus.
    pub fn set_voice_frequency_direct(&mut self, voice: usize, freq: u16) {
        if let Some(v) = self.sampler.synth.voices.get_mut(voice) {
            v.osc.set_frequency(freq);
        }
    }

    /// Set a voice's 12-bit pulse width without touching the bus.
    pub fn set_pulse_width_direct(&mut self, voice: usize, pw: u16) {
        if let Some(v) = self.sampler.synth.voices.get_mut(voice) {
            v.osc.set_pulse_width(pw);
        }
    }

    /// Set the 11-bit filter cutoff without touching the bus.
    pub fn set_filter_cutoff_direct(&mut self, fc: u16) {
        self.sampler.synth.filter.set_fc(fc);
    }

    // === Monitoring ===

    /// Last 20-bit sample of voice `v` into the filter
    pub fn voice_output(&self, v: usize) -> i32 {
        self.sampler.synth.voice_output(v)
    }

    /// Envelope level of voice `v`
    pub fn envelope_output(&self, v: usize) -> u8 {
        self.sampler.synth.envelope_output(v)
    }

    /// Master volume nibble
    pub fn master_volume(&self) -> u8 {
        self.sampler.synth.filter.vol()
    }

    /// 11-bit cutoff register
    pub fn filter_cutoff(&self) -> u16 {
        self.sampler.synth.filter.fc()
    }

    /// Last 12-bit waveform of voice `v`
    pub fn voice_waveform(&self, v: usize) -> u16 {
        self.sampler.synth.voice_waveform(v)
    }

    // === Snapshots ===

    /// Capture the full chip state.
    pub fn read_state(&self) -> ChipState {
        let synth = &self.sampler.synth;
        let mut state = ChipState {
            sid_register: self.registers().registers,
            bus_value: self.bus_value,
            bus_value_ttl: self.bus_value_ttl,
            ext_in: synth.ext_in,
            filter_integrators: synth.filter.integrators(),
            external_filter: synth.ext_filter.state(),
            ..ChipState::default()
        };
        for (i, voice) in synth.voices.iter().enumerate() {
            let env = &voice.envelope;
            let (rate, rate_period, exp, exp_period, hold_zero) = env.counters();
            state.accumulator[i] = voice.osc.accumulator();
            state.shift_register[i] = voice.osc.shift_register();
            state.envelope_state[i] = env.state();
            state.envelope_counter[i] = env.output();
            state.rate_counter[i] = rate;
            state.rate_counter_period[i] = rate_period;
            state.exponential_counter[i] = exp;
            state.exponential_counter_period[i] = exp_period;
            state.hold_zero[i] = hold_zero;
            state.msb_rising[i] = voice.osc.msb_rising();
            state.voice_waveform[i] = synth.voice_waveform(i);
            state.voice_output[i] = synth.voice_output(i);
        }
        state
    }

    /// Restore a state captured by [`read_state`](Self::read_state).
    pub fn write_state(&mut self, state: &ChipState) {
        self.load_registers(&state.sid_register);
        self.bus_value = state.bus_value;
        self.bus_value_ttl = state.bus_value_ttl;

        let synth = &mut self.sampler.synth;
        synth.ext_in = state.ext_in;
        synth.filter.set_integrators(state.filter_integrators);
        synth.ext_filter.set_state(state.external_filter);
        synth.restore_mix(state.voice_waveform, state.voice_output);
        for (i, voice) in synth.voices.iter_mut().enumerate() {
            voice.osc.set_accumulator(state.accumulator[i]);
            voice.osc.set_shift_register(state.shift_register[i]);
            voice.osc.set_msb_rising(state.msb_rising[i]);
            voice.envelope.restore(
                state.envelope_state[i],
                state.envelope_counter[i],
                (
                    state.rate_counter[i],
                    state.rate_counter_period[i],
                    state.exponential_counter[i],
                    state.exponential_counter_period[i],
                    state.hold_zero[i],
                ),
            );
        }
        log::debug!("restored chip state");
    }
}

impl Default for Chip {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

impl std::fmt::Debug for Chip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chip")
            .field("chip_model", &self.chip_model)
            .field("sampling_method", &self.sampler.method())
            .field("clock_frequency", &self.clock_frequency)
            .field("sample_rate", &self.sample_rate)
            .field("bus_value", &self.bus_value)
            .finish_non_exhaustive()
    }
}
