//! Backend trait abstraction for SID implementations
//!
//! [`SidBackend`] is the per-instance surface hosts program against: reset,
//! model selection, rates, register access and rendering. [`SidEngine`]
//! implements it with a [`Chip`] driven one host sample at a time, either by
//! a [`ClockAccumulator`] or by the chip's own interpolating or resampling
//! render path.

use crate::clock::ClockAccumulator;
use crate::sid::registers::{NUM_REGISTERS, NUM_WRITABLE};
use crate::sid::{Chip, ChipModel, SamplingMethod};
use crate::{Result, SamplingConfig};

/// Common interface for SID backends
///
/// # Example
///
/// ```
/// use sidkit::{ChipModel, SidBackend, SidEngine};
///
/// fn play_note<B: SidBackend>(sid: &mut B) {
///     sid.write_register(0x00, 0x45); // Voice 1 frequency low
///     sid.write_register(0x01, 0x1d); // Voice 1 frequency high
///     sid.write_register(0x06, 0xf0); // Sustain 15
///     sid.write_register(0x18, 0x0f); // Volume 15
///     sid.write_register(0x04, 0x21); // Sawtooth + gate
///     let _ = sid.render_sample();
/// }
///
/// play_note(&mut SidEngine::new(ChipModel::Mos6581));
/// ```
pub trait SidBackend: Send {
    /// Return to the power-on state. Nothing is reallocated.
    fn reset(&mut self);

    /// Switch chip model without resetting running state.
    fn set_chip_model(&mut self, model: ChipModel);

    /// Set host sample rate and chip clock.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Host rate in Hz
    /// * `clock_rate` - Chip clock in Hz
    ///
    /// # Returns
    ///
    /// `InvalidRate` if either rate is not positive and finite
    fn set_sample_rate(&mut self, sample_rate: f64, clock_rate: f64) -> Result<()>;

    /// Advance the chip by `cycles` without producing output.
    fn clock_cycles(&mut self, cycles: u32);

    /// Produce the next host sample.
    fn render_sample(&mut self) -> i16;

    /// Fill `buffer` with consecutive host samples.
    fn render(&mut self, buffer: &mut [i16]) {
        for sample in buffer.iter_mut() {
            *sample = self.render_sample();
        }
    }

    /// Read a register (0x00-0x1F).
    fn read_register(&self, addr: u8) -> u8;

    /// Write a register (0x00-0x18; others are ignored).
    fn write_register(&mut self, addr: u8, value: u8);

    /// Write registers 0x00-0x18 in address order.
    fn load_registers(&mut self, regs: &[u8]) {
        for (addr, &value) in regs.iter().take(NUM_WRITABLE).enumerate() {
            self.write_register(addr as u8, value);
        }
    }

    /// Register window as the chip currently holds it
    fn dump_registers(&self) -> [u8; NUM_REGISTERS];
}

/// Chip plus fractional clock accumulator
///
/// With [`SamplingMethod::Fast`] each sample clocks the cycles the
/// accumulator hands out and reads the chip output. `Interpolate` and
/// `Resample` render through [`Chip::render_sample`] at the rates last
/// configured.
#[derive(Debug, Clone)]
pub struct SidEngine {
    chip: Chip,
    clock: ClockAccumulator,
}

impl SidEngine {
    /// Create an engine at PAL clock and 48 kHz.
    pub fn new(model: ChipModel) -> Self {
        SidEngine {
            chip: Chip::new(model),
            clock: ClockAccumulator::default(),
        }
    }

    /// Create an engine with custom rates.
    pub fn with_rates(model: ChipModel, sample_rate: f64, clock_rate: f64) -> Result<Self> {
        let mut engine = Self::new(model);
        engine.set_sample_rate(sample_rate, clock_rate)?;
        Ok(engine)
    }

    /// Create an engine from a full sampling configuration.
    pub fn with_config(model: ChipModel, config: &SamplingConfig) -> Result<Self> {
        let mut engine = Self::new(model);
        config.apply(&mut engine.chip)?;
        engine
            .clock
            .set_rates(config.sample_rate, config.clock_frequency)?;
        Ok(engine)
    }

    /// Switch render path, keeping both rates.
    pub fn set_sampling_method(&mut self, method: SamplingMethod) -> Result<()> {
        let config = SamplingConfig {
            clock_frequency: self.clock.clock_rate(),
            sample_rate: self.clock.sample_rate(),
            method,
            ..SamplingConfig::default()
        };
        config.apply(&mut self.chip)
    }

    /// Active render path
    pub fn sampling_method(&self) -> SamplingMethod {
        self.chip.sampling_method()
    }

    /// Underlying chip
    pub fn chip(&self) -> &Chip {
        &self.chip
    }

    /// Underlying chip, for extensions and monitoring
    pub fn chip_mut(&mut self) -> &mut Chip {
        &mut self.chip
    }

    /// Clock accumulator
    pub fn clock(&self) -> &ClockAccumulator {
        &self.clock
    }
}

impl Default for SidEngine {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

impl SidBackend for SidEngine {
    fn reset(&mut self) {
        self.chip.reset();
        self.clock.reset();
    }

    fn set_chip_model(&mut self, model: ChipModel) {
        self.chip.set_chip_model(model);
    }

    fn set_sample_rate(&mut self, sample_rate: f64, clock_rate: f64) -> Result<()> {
        let config = SamplingConfig {
            clock_frequency: clock_rate,
            sample_rate,
            method: self.chip.sampling_method(),
            ..SamplingConfig::default()
        };
        config.apply(&mut self.chip)?;
        self.clock.set_rates(sample_rate, clock_rate)?;
        log::debug!(
            "engine rates: {:.0} Hz host, {:.0} Hz chip",
            sample_rate,
            clock_rate
        );
        Ok(())
    }

    fn clock_cycles(&mut self, cycles: u32) {
        self.chip.clock_delta(cycles);
    }

    #[inline]
    fn render_sample(&mut self) -> i16 {
        if self.chip.sampling_method() != SamplingMethod::Fast {
            return self.chip.render_sample();
        }
        let cycles = self.clock.cycles_for_next_sample();
        self.chip.clock_delta(cycles);
        self.chip.output()
    }

    fn read_register(&self, addr: u8) -> u8 {
        self.chip.read(addr)
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.chip.write(addr, value);
    }

    fn dump_registers(&self) -> [u8; NUM_REGISTERS] {
        self.chip.registers().registers
    }
}
