//! Combined waveform tables
//!
//! Selecting more than one of triangle, sawtooth and pulse on a real SID
//! shorts the waveform outputs together through the DAC bit lines. The
//! result is not a sum or an AND of the primitives, so it is looked up from
//! per-model tables indexed by the top 12 accumulator bits.
//!
//! The tables are generated once per process from a bit-interaction model:
//! each output bit is pulled towards its neighbours with a distance-weighted
//! average, the pulse line acts as an extra bit above the MSB, and a bit reads
//! high when the mixed level clears the model's threshold. Parameters were
//! fitted against sampled 6581 R2 and 8580 R5 chips.

use std::sync::OnceLock;

use super::ChipModel;

/// Number of entries per table (12-bit index)
pub const TABLE_SIZE: usize = 4096;

/// Combined waveform selectors that need a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    /// Sawtooth + triangle (waveform bits 0x3)
    SawTriangle = 0,
    /// Pulse + triangle (0x5)
    PulseTriangle = 1,
    /// Pulse + sawtooth (0x6)
    PulseSaw = 2,
    /// Pulse + sawtooth + triangle (0x7)
    PulseSawTriangle = 3,
}

impl Combination {
    /// Map the low three waveform bits to a table, if one is needed.
    #[inline]
    pub fn from_waveform(bits: u8) -> Option<Self> {
        match bits & 0x7 {
            0x3 => Some(Combination::SawTriangle),
            0x5 => Some(Combination::PulseTriangle),
            0x6 => Some(Combination::PulseSaw),
            0x7 => Some(Combination::PulseSawTriangle),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
struct BitModel {
    threshold: f32,
    pulse_strength: f32,
    top_bit: f32,
    distance: f32,
    saw_tri_mix: f32,
}

// Indexed by [model][combination].
const BIT_MODELS: [[BitModel; 4]; 2] = [
    [
        BitModel { threshold: 0.880_815, pulse_strength: 0.0, top_bit: 0.0, distance: 0.327_961_4, saw_tri_mix: 0.599_954_5 },
        BitModel { threshold: 0.892_461_8, pulse_strength: 2.014_781, top_bit: 1.003_332, distance: 0.029_923_22, saw_tri_mix: 0.0 },
        BitModel { threshold: 0.864_650_1, pulse_strength: 1.712_586, top_bit: 1.137_704, distance: 0.028_454_23, saw_tri_mix: 0.0 },
        BitModel { threshold: 0.952_783_4, pulse_strength: 1.794_777, top_bit: 0.0, distance: 0.098_062_72, saw_tri_mix: 0.775_248_2 },
    ],
    [
        BitModel { threshold: 0.978_166_5, pulse_strength: 0.0, top_bit: 0.989_946_9, distance: 8.087_667, saw_tri_mix: 0.822_641_2 },
        BitModel { threshold: 0.909_776_9, pulse_strength: 2.039_997, top_bit: 0.958_409_6, distance: 0.176_544_7, saw_tri_mix: 0.0 },
        BitModel { threshold: 0.923_121_2, pulse_strength: 2.084_788, top_bit: 0.949_389_5, distance: 0.171_251_8, saw_tri_mix: 0.0 },
        BitModel { threshold: 0.984_555_2, pulse_strength: 1.415_612, top_bit: 0.970_388_3, distance: 3.688_29, saw_tri_mix: 0.826_500_8 },
    ],
];

/// Four combined-waveform tables for one chip model
pub struct CombinedTables {
    tables: [Box<[u16]>; 4],
}

impl CombinedTables {
    fn build(model: ChipModel) -> Self {
        let params = &BIT_MODELS[model as usize];
        let waveforms = [0x3u8, 0x5, 0x6, 0x7];
        let tables = std::array::from_fn(|i| {
            (0..TABLE_SIZE as u32)
                .map(|idx| combined_value(&params[i], waveforms[i], idx))
                .collect::<Vec<u16>>()
                .into_boxed_slice()
        });
        Self { tables }
    }

    /// Look up a combined waveform sample.
    ///
    /// # Arguments
    ///
    /// * `combination` - Which waveform bits are set
    /// * `index` - Top 12 accumulator bits (ring modulation already applied)
    #[inline]
    pub fn lookup(&self, combination: Combination, index: u32) -> u16 {
        self.tables[combination as usize][(index as usize) & (TABLE_SIZE - 1)]
    }
}

/// Shared tables for `model`, generated on first use.
pub fn combined_tables(model: ChipModel) -> &'static CombinedTables {
    static TABLES: OnceLock<[CombinedTables; 2]> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        log::debug!("building combined waveform tables");
        [
            CombinedTables::build(ChipModel::Mos6581),
            CombinedTables::build(ChipModel::Mos8580),
        ]
    });
    &tables[model as usize]
}

fn combined_value(params: &BitModel, waveform: u8, accumulator: u32) -> u16 {
    let mut o = [0f32; 12];
    for (i, bit) in o.iter_mut().enumerate() {
        *bit = if (accumulator >> i) & 1 != 0 { 1.0 } else { 0.0 };
    }

    if waveform & 3 == 1 {
        // Triangle: shift up one bit, inverted in the upper half.
        let top = accumulator & 0x800 != 0;
        for i in (1..12).rev() {
            o[i] = if top { 1.0 - o[i - 1] } else { o[i - 1] };
        }
        o[0] = 0.0;
    } else if waveform & 3 == 3 {
        // Bit 0 is grounded through the triangle selector; each bit then
        // sees the sawtooth mixed with the bit below it.
        o[0] *= params.saw_tri_mix;
        for i in 1..12 {
            o[i] = o[i - 1] * (1.0 - params.saw_tri_mix) + o[i] * params.saw_tri_mix;
        }
    }

    if waveform & 2 == 2 {
        o[11] *= params.top_bit;
    }

    if waveform == 3 || waveform > 4 {
        let mut distance = [0f32; 25];
        distance[12] = 1.0;
        for i in 1..=12usize {
            let w = 1.0 / (1.0 + (i * i) as f32 * params.distance);
            distance[12 - i] = w;
            distance[12 + i] = w;
        }

        let mut mixed = [0f32; 12];
        for (i, out) in mixed.iter_mut().enumerate() {
            let mut avg = 0.0;
            let mut n = 0.0;
            for (j, &bit) in o.iter().enumerate() {
                let w = distance[i + 12 - j];
                avg += bit * w;
                n += w;
            }
            if waveform > 4 {
                // Pulse behaves like a thirteenth bit driven high.
                let w = distance[i];
                avg += params.pulse_strength * w;
                n += w;
            }
            *out = (o[i] + avg / n) * 0.5;
        }
        o = mixed;
    }

    o.iter()
        .enumerate()
        .filter(|(_, &level)| level - params.threshold > 0.0)
        .fold(0u16, |value, (i, _)| value | (1 << i))
}
