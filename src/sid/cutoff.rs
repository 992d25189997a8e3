//! Filter cutoff curves
//!
//! Maps the 11-bit FC register to a cutoff frequency in Hz. Neither chip is
//! linear here; both curves are measured points joined by a cubic spline.
//! Repeated end points force a straight segment, which is how the 6581's
//! kink between FC 1023 and 1024 is kept.

use std::sync::OnceLock;

use super::ChipModel;

/// Number of FC register values
pub const CUTOFF_TABLE_SIZE: usize = 2048;

/// Cutoff frequency (Hz) per FC register value
pub type CutoffTable = [i32; CUTOFF_TABLE_SIZE];

// (FC, Hz) control points. First and last points are doubled so the spline
// covers the full range.
const POINTS_6581: [(i32, i32); 31] = [
    (0, 220),
    (0, 220),
    (128, 230),
    (256, 250),
    (384, 300),
    (512, 420),
    (640, 780),
    (768, 1600),
    (832, 2300),
    (896, 3200),
    (960, 4300),
    (992, 5000),
    (1008, 5400),
    (1016, 5700),
    (1023, 6000),
    (1023, 6000),
    (1024, 4600),
    (1024, 4600),
    (1032, 4800),
    (1056, 5300),
    (1088, 6000),
    (1120, 6600),
    (1152, 7200),
    (1280, 9500),
    (1408, 12000),
    (1536, 14500),
    (1664, 16000),
    (1792, 17100),
    (1920, 17700),
    (2047, 18000),
    (2047, 18000),
];

const POINTS_8580: [(i32, i32); 19] = [
    (0, 0),
    (0, 0),
    (128, 800),
    (256, 1600),
    (384, 2500),
    (512, 3300),
    (640, 4100),
    (768, 4800),
    (896, 5600),
    (1024, 6500),
    (1152, 7500),
    (1280, 8400),
    (1408, 9200),
    (1536, 9800),
    (1664, 10500),
    (1792, 11000),
    (1920, 11700),
    (2047, 12500),
    (2047, 12500),
];

/// Control points for `model`
pub fn control_points(model: ChipModel) -> &'static [(i32, i32)] {
    match model {
        ChipModel::Mos6581 => &POINTS_6581,
        ChipModel::Mos8580 => &POINTS_8580,
    }
}

/// Shared cutoff table for `model`, interpolated on first use.
pub fn cutoff_table(model: ChipModel) -> &'static CutoffTable {
    static TABLES: OnceLock<[Box<CutoffTable>; 2]> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        log::debug!("interpolating filter cutoff tables");
        [
            build_table(&POINTS_6581),
            build_table(&POINTS_8580),
        ]
    });
    &tables[model as usize]
}

fn build_table(points: &[(i32, i32)]) -> Box<CutoffTable> {
    let mut table = Box::new([0i32; CUTOFF_TABLE_SIZE]);
    interpolate(points, |x, y| {
        let x = x as usize;
        if x < CUTOFF_TABLE_SIZE {
            // Overshoot below zero is clipped.
            table[x] = if y < 0.0 { 0 } else { y as i32 };
        }
    });
    table
}

/// Cubic coefficients `(a, b, c, d)` of the polynomial through
/// `(x1, y1)` and `(x2, y2)` with end slopes `k1` and `k2`.
fn cubic_coefficients(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    k1: f64,
    k2: f64,
) -> (f64, f64, f64, f64) {
    let dx = x2 - x1;
    let dy = y2 - y1;

    let a = ((k1 + k2) - 2.0 * dy / dx) / (dx * dx);
    let b = ((k2 - k1) / dx - 3.0 * (x1 + x2) * a) / 2.0;
    let c = k1 - (3.0 * x1 * a + 2.0 * b) * x1;
    let d = y1 - ((x1 * a + b) * x1 + c) * x1;
    (a, b, c, d)
}

/// Walk the spline through `points`, calling `plot(x, y)` for every integer
/// `x` in each non-degenerate segment.
///
/// Slopes at interior points are central differences. At a doubled end
/// point the slope is chosen so the curvature there is zero.
pub fn interpolate<F: FnMut(i32, f64)>(points: &[(i32, i32)], mut plot: F) {
    if points.len() < 4 {
        return;
    }

    for w in points.windows(4) {
        let (x0, y0) = (w[0].0 as f64, w[0].1 as f64);
        let (x1, y1) = (w[1].0 as f64, w[1].1 as f64);
        let (x2, y2) = (w[2].0 as f64, w[2].1 as f64);
        let (x3, y3) = (w[3].0 as f64, w[3].1 as f64);

        if x1 == x2 {
            continue;
        }

        let slope = (y2 - y1) / (x2 - x1);
        let (k1, k2) = if x0 == x1 && x2 == x3 {
            (slope, slope)
        } else if x0 == x1 {
            let k2 = (y3 - y1) / (x3 - x1);
            ((3.0 * slope - k2) / 2.0, k2)
        } else if x2 == x3 {
            let k1 = (y2 - y0) / (x2 - x0);
            (k1, (3.0 * slope - k1) / 2.0)
        } else {
            ((y2 - y0) / (x2 - x0), (y3 - y1) / (x3 - x1))
        };

        let (a, b, c, d) = cubic_coefficients(x1, y1, x2, y2, k1, k2);
        for x in w[1].0..=w[2].0 {
            let xf = x as f64;
            plot(x, ((a * xf + b) * xf + c) * xf + d);
        }
    }
}
