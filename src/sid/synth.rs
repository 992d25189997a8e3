//! Cycle engine: three voices, filter and output stage
//!
//! Each cycle runs in a fixed order: envelopes, oscillators, hard sync, then
//! the filter consumes the freshly computed voice samples, then the
//! external filter. Voice `n` is synced and ring modulated by voice
//! `(n + 2) % 3`.

use super::external_filter::ExternalFilter;
use super::filter::{Filter, VOICE_VOLUME_UNITY};
use super::registers::{Register, VoiceRegister};
use super::voice::Voice;
use super::ChipModel;

const OUTPUT_RANGE: u32 = 1 << 16;
const OUTPUT_HALF: i32 = (OUTPUT_RANGE >> 1) as i32;
const SAMPLES_PER_OUTPUT: u32 = ((4095 * 255) >> 7) * 3 * 15 * 2 / OUTPUT_RANGE;

const ACC_MSB: u32 = 0x0080_0000;

/// Paddle inputs with nothing attached read as all ones.
const POT_UNCONNECTED: u8 = 0xff;

/// Index of the voice that syncs and ring modulates voice `i`.
#[inline]
pub const fn modulator_of(i: usize) -> usize {
    (i + 2) % 3
}

/// Index of the voice that voice `i` syncs.
#[inline]
pub const fn sync_target_of(i: usize) -> usize {
    (i + 1) % 3
}

/// Amplitude cross-modulation route for one voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmRoute {
    /// Modulating voice index, `None` when off
    pub source: Option<usize>,
    /// Depth 0-255
    pub depth: u8,
}

/// Three voices with filter and output stage
#[derive(Debug, Clone)]
pub struct Synth {
    /// Voices 1-3
    pub voices: [Voice; 3],
    /// Multimode filter
    pub filter: Filter,
    /// Output RC stage
    pub ext_filter: ExternalFilter,
    /// External audio input, pre-scaled to three voices
    pub ext_in: i32,

    fm: [FmRoute; 3],
    fm_enabled: bool,
    voice_volume: [i32; 3],
    voice_volume_enabled: bool,
    resonance_boost: u8,
    resonance_boost_enabled: bool,

    prev_waveform: [u16; 3],
    voice_output: [i32; 3],
}

impl Synth {
    /// Create a silent engine for `model`.
    pub fn new(model: ChipModel) -> Self {
        Self {
            voices: [Voice::new(model); 3],
            filter: Filter::new(model),
            ext_filter: ExternalFilter::new(model),
            ext_in: 0,
            fm: [FmRoute::default(); 3],
            fm_enabled: false,
            voice_volume: [VOICE_VOLUME_UNITY; 3],
            voice_volume_enabled: false,
            resonance_boost: 0,
            resonance_boost_enabled: false,
            prev_waveform: [0; 3],
            voice_output: [0; 3],
        }
    }

    /// Apply chip model calibration everywhere. Running state is kept.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        for voice in self.voices.iter_mut() {
            voice.set_chip_model(model);
        }
        self.filter.set_chip_model(model);
        self.ext_filter.set_chip_model(model);
    }

    /// Return voices, filters and cached outputs to power-on state.
    pub fn reset(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.reset();
        }
        self.filter.reset();
        self.ext_filter.reset();
        self.ext_in = 0;
        self.prev_waveform = [0; 3];
        self.voice_output = [0; 3];
    }

    // === Register access ===

    /// Decode a register write.
    pub fn write(&mut self, addr: u8, value: u8) {
        let Some(reg) = Register::from_addr(addr) else {
            return;
        };
        if let Some((v, voice_reg)) = reg.voice() {
            let voice = &mut self.voices[v];
            match voice_reg {
                VoiceRegister::FreqLo => voice.osc.write_freq_lo(value),
                VoiceRegister::FreqHi => voice.osc.write_freq_hi(value),
                VoiceRegister::PwLo => voice.osc.write_pw_lo(value),
                VoiceRegister::PwHi => voice.osc.write_pw_hi(value),
                VoiceRegister::Control => voice.write_control(value),
                VoiceRegister::AttackDecay => voice.envelope.write_attack_decay(value),
                VoiceRegister::SustainRelease => voice.envelope.write_sustain_release(value),
            }
            return;
        }
        match reg {
            Register::FcLo => self.filter.write_fc_lo(value),
            Register::FcHi => self.filter.write_fc_hi(value),
            Register::ResFilt => self.filter.write_res_filt(value),
            Register::ModeVol => self.filter.write_mode_vol(value),
            _ => {}
        }
    }

    /// Read one of the read-only registers; everything else returns the
    /// bus value.
    pub fn read(&self, addr: u8, bus_value: u8) -> u8 {
        match Register::from_addr(addr) {
            Some(Register::PotX) | Some(Register::PotY) => POT_UNCONNECTED,
            Some(Register::Osc3) => (self.waveform(2) >> 4) as u8,
            Some(Register::Env3) => self.voices[2].envelope.output(),
            _ => bus_value,
        }
    }

    // === Clocking ===

    /// Advance one cycle.
    #[inline]
    pub fn clock(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.envelope.clock();
        }
        for voice in self.voices.iter_mut() {
            voice.osc.clock();
        }
        self.synchronize();

        let [v1, v2, v3] = self.mix_voices();
        self.filter.clock(v1, v2, v3, self.ext_in);
        self.ext_filter.clock(self.filter.output());
    }

    /// Advance `delta` cycles. Oscillators stop at every MSB toggle of a
    /// sync source so hard sync lands on the right cycle.
    #[inline]
    pub fn clock_delta(&mut self, delta: u32) {
        for voice in self.voices.iter_mut() {
            voice.envelope.clock_delta(delta);
        }

        let mut delta_osc = delta;
        while delta_osc != 0 {
            let mut delta_min = delta_osc;
            for i in 0..3 {
                let osc = &self.voices[i].osc;
                let freq = osc.frequency() as u32;
                if !(self.voices[sync_target_of(i)].osc.sync_enabled() && freq != 0) {
                    continue;
                }
                let acc = osc.accumulator();
                let delta_acc = if acc & ACC_MSB != 0 {
                    0x0100_0000 - acc
                } else {
                    ACC_MSB - acc
                };
                let delta_next = delta_acc.div_ceil(freq);
                delta_min = delta_min.min(delta_next);
            }

            for voice in self.voices.iter_mut() {
                voice.osc.clock_delta(delta_min);
            }
            self.synchronize();
            delta_osc -= delta_min;
        }

        let [v1, v2, v3] = self.mix_voices();
        self.filter.clock_delta(delta, v1, v2, v3, self.ext_in);
        self.ext_filter.clock_delta(delta, self.filter.output());
    }

    /// Hard sync. Flags are read before any accumulator is touched.
    #[inline]
    fn synchronize(&mut self) {
        let rising = self.voices.each_ref().map(|v| v.osc.msb_rising());
        let sync = self.voices.each_ref().map(|v| v.osc.sync_enabled());
        for i in 0..3 {
            let target = sync_target_of(i);
            if rising[i] && sync[target] && !(sync[i] && rising[modulator_of(i)]) {
                self.voices[target].osc.reset_accumulator();
            }
        }
    }

    /// 12-bit waveform of voice `i` with its ring modulator applied.
    #[inline]
    fn waveform(&self, i: usize) -> u16 {
        let ring_source = self.voices[modulator_of(i)].osc.accumulator();
        self.voices[i].osc.output(ring_source)
    }

    /// Voice samples for the filter. Cross-modulation reads the waveforms of
    /// the previous cycle.
    #[inline]
    fn mix_voices(&mut self) -> [i32; 3] {
        let waves = [self.waveform(0), self.waveform(1), self.waveform(2)];
        for i in 0..3 {
            let voice = &self.voices[i];
            self.voice_output[i] = match self.fm[i].source {
                Some(src) if self.fm_enabled => {
                    let modulation = self.prev_waveform[src] as i32 - 0x800;
                    let gain = 256 + ((modulation * self.fm[i].depth as i32) >> 11);
                    let dc = voice.mix(voice.wave_zero() as u16);
                    let centred = voice.mix(waves[i]) - dc;
                    ((centred * gain) >> 8) + dc
                }
                _ => voice.mix(waves[i]),
            };
        }
        self.prev_waveform = waves;
        self.voice_output
    }

    /// 16-bit output sample.
    #[inline]
    pub fn output(&self) -> i16 {
        let sample = self.ext_filter.output() / SAMPLES_PER_OUTPUT as i32;
        sample.clamp(-OUTPUT_HALF, OUTPUT_HALF - 1) as i16
    }

    // === Extensions ===

    /// Route amplitude cross-modulation into `voice`.
    ///
    /// # Arguments
    ///
    /// * `voice` - Carrier voice (0-2)
    /// * `source` - 0 = off, 1-3 = modulating voice
    /// * `depth` - Modulation depth 0-255
    pub fn set_fm(&mut self, voice: usize, source: u8, depth: u8) {
        if let Some(route) = self.fm.get_mut(voice) {
            route.source = match source {
                1..=3 => Some(source as usize - 1),
                _ => None,
            };
            route.depth = depth;
        }
    }

    /// Cross-modulation route of `voice`
    pub fn fm(&self, voice: usize) -> FmRoute {
        self.fm.get(voice).copied().unwrap_or_default()
    }

    /// Master switch for cross-modulation
    pub fn enable_fm(&mut self, enable: bool) {
        self.fm_enabled = enable;
    }

    /// Whether cross-modulation is active
    pub fn is_fm_enabled(&self) -> bool {
        self.fm_enabled
    }

    /// Store a per-voice gain (256 = unity). Takes effect while enabled.
    pub fn set_voice_volume(&mut self, voice: usize, volume: i32) {
        if let Some(v) = self.voice_volume.get_mut(voice) {
            *v = volume;
            if self.voice_volume_enabled {
                self.filter.set_voice_volume(voice, volume);
            }
        }
    }

    /// Master switch for per-voice gain
    pub fn enable_voice_volume(&mut self, enable: bool) {
        self.voice_volume_enabled = enable;
        for (voice, &volume) in self.voice_volume.iter().enumerate() {
            let applied = if enable { volume } else { VOICE_VOLUME_UNITY };
            self.filter.set_voice_volume(voice, applied);
        }
    }

    /// Whether per-voice gain is active
    pub fn is_voice_volume_enabled(&self) -> bool {
        self.voice_volume_enabled
    }

    /// Store a resonance boost (0-255). Takes effect while enabled.
    pub fn set_resonance_boost(&mut self, boost: u8) {
        self.resonance_boost = boost;
        if self.resonance_boost_enabled {
            self.filter.set_resonance_boost(boost);
        }
    }

    /// Master switch for resonance boost
    pub fn enable_resonance_boost(&mut self, enable: bool) {
        self.resonance_boost_enabled = enable;
        self.filter
            .set_resonance_boost(if enable { self.resonance_boost } else { 0 });
    }

    /// Stored resonance boost
    pub fn resonance_boost(&self) -> u8 {
        self.resonance_boost
    }

    // === Monitoring ===

    /// Last 20-bit sample of voice `v` fed to the filter
    pub fn voice_output(&self, v: usize) -> i32 {
        self.voice_output.get(v).copied().unwrap_or(0)
    }

    /// Last 12-bit waveform of voice `v`
    pub fn voice_waveform(&self, v: usize) -> u16 {
        self.prev_waveform.get(v).copied().unwrap_or(0)
    }

    /// Overwrite the last mixed waveforms and voice samples (snapshot
    /// restore). Cross-modulation reads the waveforms on the next cycle.
    pub fn restore_mix(&mut self, waveform: [u16; 3], voice_output: [i32; 3]) {
        self.prev_waveform = waveform.map(|w| w & 0x0fff);
        self.voice_output = voice_output;
    }

    /// Envelope level of voice `v`
    pub fn envelope_output(&self, v: usize) -> u8 {
        self.voices.get(v).map_or(0, |voice| voice.envelope.output())
    }
}

impl Default for Synth {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}
