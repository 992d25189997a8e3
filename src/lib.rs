//! MOS 6581/8580 SID Emulator
//!
//! A cycle-accurate emulation of the Commodore 64 sound chip: three 24-bit
//! phase accumulator voices with combined waveforms, the exponential ADSR
//! envelope including its delay bug, and the two-integrator analog filter
//! with chip-specific cutoff curves. A fractional clock accumulator maps the
//! ~1 MHz chip clock onto any host sample rate without drift.
//!
//! # Features
//! - Cycle-exact oscillators, envelopes, hard sync and ring modulation
//! - 6581 and 8580 calibration profiles, switchable at runtime
//! - Register-level interface with bus value decay and read-only registers
//! - Snapshot and restore of the complete chip state
//! - Fast, interpolating and FIR resampling render paths
//! - Opt-in extensions: per-voice gain, amplitude cross-modulation,
//!   resonance boost and filter dithering
//! - Node adapters with typed parameters and normalized float output
//!
//! # Crate feature flags
//! - `export-wav` (default): WAV rendering (`export`, enables `hound`)
//! - `streaming` (opt-in): Real-time playback (`streaming`, enables `rodio`)
//!
//! # Quick start
//! ## Register level
//! ```no_run
//! use sidkit::{ChipModel, SidBackend, SidEngine};
//! let mut sid = SidEngine::new(ChipModel::Mos8580);
//! sid.write_register(0x00, 0x45); // Voice 1 frequency low
//! sid.write_register(0x01, 0x1d); // Voice 1 frequency high (440 Hz)
//! sid.write_register(0x05, 0x09); // Attack 0, decay 9
//! sid.write_register(0x18, 0x0f); // Volume 15
//! sid.write_register(0x04, 0x21); // Sawtooth + gate
//! let mut buffer = [0i16; 480];
//! sid.render(&mut buffer);
//! ```
//!
//! ## Node adapters
//! ```no_run
//! use sidkit::nodes::{Node, VoiceNode, VoiceParams};
//! use sidkit::ChipModel;
//! let mut voice = VoiceNode::new(VoiceParams::default(), ChipModel::Mos6581, 48_000.0).unwrap();
//! let mut out = vec![0.0f32; 512];
//! voice.process(&[0], &mut out); // gate on at frame 0
//! ```

#![warn(missing_docs)]

pub mod backend; // Per-instance entry points
pub mod clock; // Clock-domain conversion
pub mod config; // Sampling configuration
#[cfg(feature = "export-wav")]
pub mod export; // WAV rendering
pub mod nodes; // Node adapters
pub mod sid; // Chip emulation (core)
#[cfg(feature = "streaming")]
pub mod streaming; // Audio device output

/// Error types for SID emulator operations
#[derive(thiserror::Error, Debug)]
pub enum SidError {
    /// Sample or clock rate that is not positive and finite
    #[error("Invalid {name}: {value} (must be positive and finite)")]
    InvalidRate {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Patch or snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SidError {
    /// Converts a String into `SidError::Other`.
    ///
    /// Prefer a specific variant (`ConfigError`, `AudioFileError`, ...) where
    /// the caller can tell what went wrong.
    fn from(msg: String) -> Self {
        SidError::Other(msg)
    }
}

impl From<&str> for SidError {
    /// Converts a string slice into `SidError::Other`.
    fn from(msg: &str) -> Self {
        SidError::Other(msg.to_string())
    }
}

impl From<serde_json::Error> for SidError {
    fn from(err: serde_json::Error) -> Self {
        SidError::Serialization(err.to_string())
    }
}

#[cfg(feature = "export-wav")]
impl From<hound::Error> for SidError {
    fn from(err: hound::Error) -> Self {
        SidError::AudioFileError(err.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, SidError>;

// Public API exports
pub use backend::{SidBackend, SidEngine};
pub use clock::{ClockAccumulator, NTSC_CLOCK_HZ, PAL_CLOCK_HZ};
pub use config::SamplingConfig;
pub use sid::{Chip, ChipModel, ChipState, SamplingMethod};

#[cfg(feature = "export-wav")]
pub use export::{render_patch, write_wav};
#[cfg(feature = "streaming")]
pub use streaming::play_patch;
