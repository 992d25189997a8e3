//! Typed node parameters
//!
//! Host-facing values (Hz, normalized floats, enum choices) and their
//! register encodings. Out-of-range values are clamped, never rejected.
//! Every struct deserializes with `#[serde(default)]`, so a JSON patch may
//! name any subset of fields.

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::sid::oscillator::frequency_register;
use crate::sid::ChipModel;

/// Lowest oscillator pitch a node accepts
pub const MIN_FREQUENCY_HZ: f32 = 0.1;
/// Highest oscillator pitch a node accepts
pub const MAX_FREQUENCY_HZ: f32 = 20_000.0;

/// Resonance boost below this counts as off.
const BOOST_THRESHOLD: f32 = 0.001;

/// Scale a normalized value onto `0..=max`, truncating.
#[inline]
fn scale_unit(value: f32, max: u16) -> u16 {
    (value.clamp(0.0, 1.0) * max as f32) as u16
}

// === Enums ===

/// Oscillator waveform selection
///
/// Discriminants are the control register waveform bits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Triangle
    Triangle = 0x10,
    /// Sawtooth
    #[default]
    Sawtooth = 0x20,
    /// Pulse
    Pulse = 0x40,
    /// Noise
    Noise = 0x80,
    /// Sawtooth + triangle
    SawTri = 0x30,
    /// Pulse + sawtooth
    PulseSaw = 0x60,
    /// Pulse + triangle
    PulseTri = 0x50,
    /// Pulse + sawtooth + triangle
    PulseSawTri = 0x70,
}

impl Waveform {
    /// Control register bits, gate clear
    #[inline]
    pub const fn control_bits(self) -> u8 {
        self as u8
    }
}

/// Filter response selection
///
/// Discriminants are the MODE_VOL tap bits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Lowpass
    #[default]
    LowPass = 0x10,
    /// Bandpass
    BandPass = 0x20,
    /// Highpass
    HighPass = 0x40,
    /// Lowpass + highpass
    Notch = 0x50,
    /// Lowpass + bandpass
    LowBand = 0x30,
    /// Bandpass + highpass
    BandHigh = 0x60,
    /// All three taps
    All = 0x70,
}

impl FilterType {
    /// MODE_VOL tap bits, volume clear
    #[inline]
    pub const fn mode_bits(self) -> u8 {
        self as u8
    }
}

// === Voice parameters ===

/// Waveform generator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorParams {
    /// Pitch in Hz, clamped to 0.1-20000
    pub frequency: f32,
    /// Pulse width 0.0-1.0
    pub pulse_width: f32,
    /// Waveform
    pub waveform: Waveform,
}

impl OscillatorParams {
    /// FREQ register value at `clock_hz`
    pub fn frequency_register(&self, clock_hz: f64) -> u16 {
        let hz = self.frequency.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
        frequency_register(hz as f64, clock_hz)
    }

    /// 12-bit PW register value
    pub fn pulse_width_register(&self) -> u16 {
        scale_unit(self.pulse_width, 0x0fff)
    }
}

impl Default for OscillatorParams {
    fn default() -> Self {
        OscillatorParams {
            frequency: 440.0,
            pulse_width: 0.5,
            waveform: Waveform::default(),
        }
    }
}

/// ADSR settings, each 0-15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    /// Attack rate
    pub attack: u8,
    /// Decay rate
    pub decay: u8,
    /// Sustain level
    pub sustain: u8,
    /// Release rate
    pub release: u8,
}

impl EnvelopeParams {
    /// Shorthand for `EnvelopeParams { attack, decay, sustain, release }`
    pub const fn new(attack: u8, decay: u8, sustain: u8, release: u8) -> Self {
        EnvelopeParams {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// ATTACK_DECAY register value
    pub fn attack_decay(&self) -> u8 {
        (self.attack.min(15) << 4) | self.decay.min(15)
    }

    /// SUSTAIN_RELEASE register value
    pub fn sustain_release(&self) -> u8 {
        (self.sustain.min(15) << 4) | self.release.min(15)
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self::new(0, 9, 0, 9)
    }
}

/// Oscillator plus envelope
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    /// Waveform generator settings
    pub oscillator: OscillatorParams,
    /// ADSR settings
    pub envelope: EnvelopeParams,
}

// === Filter parameters ===

/// Standalone filter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Cutoff 0.0-1.0 over the 11-bit register
    pub cutoff: f32,
    /// Resonance 0.0-1.0 over the 4-bit register
    pub resonance: f32,
    /// Response
    pub filter_type: FilterType,
    /// Cutoff curve to use
    pub chip_model: ChipModel,
    /// Resonance boost 0.0-1.0; 0 is the stock chip
    pub resonance_boost: f32,
}

impl FilterParams {
    /// 11-bit FC register value
    pub fn cutoff_register(&self) -> u16 {
        scale_unit(self.cutoff, 0x07ff)
    }

    /// RES nibble
    pub fn resonance_nibble(&self) -> u8 {
        scale_unit(self.resonance, 0x0f) as u8
    }

    /// Boost amount, 0 when below the on threshold
    pub fn boost(&self) -> u8 {
        boost_value(self.resonance_boost)
    }
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            cutoff: 0.5,
            resonance: 0.0,
            filter_type: FilterType::default(),
            chip_model: ChipModel::default(),
            resonance_boost: 0.0,
        }
    }
}

fn boost_value(boost: f32) -> u8 {
    if boost > BOOST_THRESHOLD {
        scale_unit(boost, 0xff) as u8
    } else {
        0
    }
}

// === Chip parameters ===

/// Amplitude cross-modulation route for one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FmParams {
    /// 0 = off, 1-3 = modulating voice
    pub source: u8,
    /// Depth 0-255
    pub depth: u8,
}

/// Opt-in chip extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipExtensions {
    /// Per-voice gain (256 = unity, up to 282); `None` leaves voices at unity
    pub voice_volume: Option<[i32; 3]>,
    /// Per-voice amplitude cross-modulation; `None` disables it
    pub fm: Option<[FmParams; 3]>,
    /// Filter input dithering
    pub dithering: bool,
    /// Analog output stage (RC lowpass + DC block)
    pub external_filter: bool,
}

impl Default for ChipExtensions {
    fn default() -> Self {
        ChipExtensions {
            voice_volume: None,
            fm: None,
            dithering: false,
            external_filter: true,
        }
    }
}

/// Full three-voice patch
///
/// All voices run on the one `chip_model`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipParams {
    /// Voices 1-3
    pub voices: [VoiceParams; 3],
    /// Cutoff 0.0-1.0
    pub cutoff: f32,
    /// Resonance 0.0-1.0
    pub resonance: f32,
    /// Filter response
    pub filter_type: FilterType,
    /// Voices through the filter: bit 0-2 voices 1-3, bit 3 external input
    pub routing: u8,
    /// Master volume 0.0-1.0
    pub volume: f32,
    /// Chip revision
    pub chip_model: ChipModel,
    /// Resonance boost 0.0-1.0
    pub resonance_boost: f32,
    /// Opt-in extensions
    pub extensions: ChipExtensions,
}

impl ChipParams {
    /// 11-bit FC register value
    pub fn cutoff_register(&self) -> u16 {
        scale_unit(self.cutoff, 0x07ff)
    }

    /// RES_FILT register value
    pub fn res_filt(&self) -> u8 {
        ((scale_unit(self.resonance, 0x0f) as u8) << 4) | (self.routing.min(0x0f))
    }

    /// MODE_VOL register value
    pub fn mode_vol(&self) -> u8 {
        self.filter_type.mode_bits() | scale_unit(self.volume, 0x0f) as u8
    }

    /// Boost amount, 0 when below the on threshold
    pub fn boost(&self) -> u8 {
        boost_value(self.resonance_boost)
    }
}

impl Default for ChipParams {
    fn default() -> Self {
        ChipParams {
            voices: [VoiceParams::default(); 3],
            cutoff: 0.5,
            resonance: 0.0,
            filter_type: FilterType::default(),
            routing: 1,
            volume: 1.0,
            chip_model: ChipModel::default(),
            resonance_boost: 0.0,
            extensions: ChipExtensions::default(),
        }
    }
}
