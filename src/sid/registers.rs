//! SID Register Definitions
//!
//! The chip decodes five address lines ($D400-$D41F on the C64). Registers
//! 0x00-0x18 are write-only, 0x19-0x1C are read-only and the rest of the
//! window is unmapped. Each voice occupies seven consecutive registers.

use std::fmt;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Size of the decoded register window
pub const NUM_REGISTERS: usize = 0x20;

/// Number of writable registers (0x00-0x18)
pub const NUM_WRITABLE: usize = 0x19;

/// Register stride between voices
pub const VOICE_STRIDE: u8 = 7;

/// SID Register Address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Register {
    /// Voice 1 frequency (low byte)
    Freq1Lo = 0x00,
    /// Voice 1 frequency (high byte)
    Freq1Hi = 0x01,
    /// Voice 1 pulse width (low byte)
    Pw1Lo = 0x02,
    /// Voice 1 pulse width (high nibble)
    Pw1Hi = 0x03,
    /// Voice 1 control
    Control1 = 0x04,
    /// Voice 1 attack/decay
    AttackDecay1 = 0x05,
    /// Voice 1 sustain/release
    SustainRelease1 = 0x06,
    /// Voice 2 frequency (low byte)
    Freq2Lo = 0x07,
    /// Voice 2 frequency (high byte)
    Freq2Hi = 0x08,
    /// Voice 2 pulse width (low byte)
    Pw2Lo = 0x09,
    /// Voice 2 pulse width (high nibble)
    Pw2Hi = 0x0A,
    /// Voice 2 control
    Control2 = 0x0B,
    /// Voice 2 attack/decay
    AttackDecay2 = 0x0C,
    /// Voice 2 sustain/release
    SustainRelease2 = 0x0D,
    /// Voice 3 frequency (low byte)
    Freq3Lo = 0x0E,
    /// Voice 3 frequency (high byte)
    Freq3Hi = 0x0F,
    /// Voice 3 pulse width (low byte)
    Pw3Lo = 0x10,
    /// Voice 3 pulse width (high nibble)
    Pw3Hi = 0x11,
    /// Voice 3 control
    Control3 = 0x12,
    /// Voice 3 attack/decay
    AttackDecay3 = 0x13,
    /// Voice 3 sustain/release
    SustainRelease3 = 0x14,
    /// Filter cutoff bits 0-2
    FcLo = 0x15,
    /// Filter cutoff bits 3-10
    FcHi = 0x16,
    /// Resonance and filter routing
    ResFilt = 0x17,
    /// Voice 3 off, filter mode and master volume
    ModeVol = 0x18,
    /// Paddle X (read-only)
    PotX = 0x19,
    /// Paddle Y (read-only)
    PotY = 0x1A,
    /// Voice 3 waveform upper 8 bits (read-only)
    Osc3 = 0x1B,
    /// Voice 3 envelope (read-only)
    Env3 = 0x1C,
}

/// Per-voice register, as an offset within a voice's block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum VoiceRegister {
    /// Frequency low byte
    FreqLo = 0,
    /// Frequency high byte
    FreqHi = 1,
    /// Pulse width low byte
    PwLo = 2,
    /// Pulse width high nibble
    PwHi = 3,
    /// Waveform, test, ring, sync and gate
    Control = 4,
    /// Attack/decay nibbles
    AttackDecay = 5,
    /// Sustain/release nibbles
    SustainRelease = 6,
}

impl Register {
    /// Convert a raw address to a Register. Only five address lines are
    /// decoded; 0x1D-0x1F map to nothing.
    pub fn from_addr(addr: u8) -> Option<Self> {
        Self::from_u8(addr & 0x1F)
    }

    /// Get the register address value
    pub fn addr(&self) -> u8 {
        *self as u8
    }

    /// Voice index and per-voice register for 0x00-0x14
    pub fn voice(&self) -> Option<(usize, VoiceRegister)> {
        let addr = self.addr();
        if addr >= 3 * VOICE_STRIDE {
            return None;
        }
        VoiceRegister::from_u8(addr % VOICE_STRIDE).map(|reg| ((addr / VOICE_STRIDE) as usize, reg))
    }

    /// Whether the CPU can write this register
    pub fn is_writable(&self) -> bool {
        (self.addr() as usize) < NUM_WRITABLE
    }

    /// Address of `reg` for voice `voice` (0-2)
    pub fn for_voice(voice: usize, reg: VoiceRegister) -> Option<Self> {
        if voice >= 3 {
            return None;
        }
        Self::from_u8(voice as u8 * VOICE_STRIDE + reg as u8)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.addr();
        match (self, self.voice()) {
            (_, Some((voice, reg))) => {
                let name = match reg {
                    VoiceRegister::FreqLo => "Frequency Low",
                    VoiceRegister::FreqHi => "Frequency High",
                    VoiceRegister::PwLo => "Pulse Width Low",
                    VoiceRegister::PwHi => "Pulse Width High",
                    VoiceRegister::Control => "Control",
                    VoiceRegister::AttackDecay => "Attack/Decay",
                    VoiceRegister::SustainRelease => "Sustain/Release",
                };
                write!(f, "${:02X} (Voice {} {})", addr, voice + 1, name)
            }
            (Register::FcLo, None) => write!(f, "$15 (Filter Cutoff Low)"),
            (Register::FcHi, None) => write!(f, "$16 (Filter Cutoff High)"),
            (Register::ResFilt, None) => write!(f, "$17 (Resonance/Filter Routing)"),
            (Register::ModeVol, None) => write!(f, "$18 (Filter Mode/Volume)"),
            (Register::PotX, None) => write!(f, "$19 (Paddle X)"),
            (Register::PotY, None) => write!(f, "$1A (Paddle Y)"),
            (Register::Osc3, None) => write!(f, "$1B (Oscillator 3)"),
            (Register::Env3, None) => write!(f, "$1C (Envelope 3)"),
            (_, None) => write!(f, "${:02X}", addr),
        }
    }
}

bitflags! {
    /// Filter routing nibble of RES_FILT
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FilterRouting: u8 {
        /// Voice 1 through the filter
        const VOICE1 = 0x01;
        /// Voice 2 through the filter
        const VOICE2 = 0x02;
        /// Voice 3 through the filter
        const VOICE3 = 0x04;
        /// External input through the filter
        const EXT = 0x08;
    }
}

/// Shadow of the register window as last written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBank {
    /// Register values 0x00-0x1F
    pub registers: [u8; NUM_REGISTERS],
}

impl RegisterBank {
    /// Create a new register bank with all values set to 0
    pub fn new() -> Self {
        RegisterBank {
            registers: [0; NUM_REGISTERS],
        }
    }

    /// Read a stored value
    pub fn read(&self, addr: u8) -> u8 {
        self.registers[(addr & 0x1F) as usize]
    }

    /// Store a value
    pub fn write(&mut self, addr: u8, value: u8) {
        self.registers[(addr & 0x1F) as usize] = value;
    }

    /// Get all registers as a slice
    pub fn as_slice(&self) -> &[u8; NUM_REGISTERS] {
        &self.registers
    }

    /// Clear every register
    pub fn reset(&mut self) {
        self.registers = [0; NUM_REGISTERS];
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}
