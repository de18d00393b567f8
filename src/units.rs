//! Length units.
//!
//! Geometry is carried in micrometres. Configuration lengths are millimetres,
//! except the via plating thickness which is already in micrometres.

/// Size of one geometry unit in metres.
pub const UNIT: f64 = 1e-6;

/// Raster pixel pitch produced by the rasterizer, in micrometres.
pub const PIXEL_SIZE: f64 = 10.0;

/// Blank border the rasterizer leaves around the board outline, in micrometres.
pub const BORDER_THICKNESS: f64 = 50.0;

/// Sides of the polygon used to approximate a via barrel.
pub const VIA_POLYGON: usize = 8;

#[inline]
pub fn mm_to_um(mm: f64) -> f64 {
    mm * 1000.0
}

/// Snaps a length to the micrometre grid.
#[inline]
pub fn snap(um: f64) -> f64 {
    um.round()
}

/// Rounds a copper thickness to an even number of micrometres so that its
/// half-thickness stays on the grid.
pub fn even_thickness(um: f64) -> f64 {
    let t = um.round() as i64;
    if t % 2 == 1 {
        (t + 1) as f64
    } else {
        t as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_thickness() {
        assert_eq!(even_thickness(35.0), 36.0);
        assert_eq!(even_thickness(34.6), 36.0);
        assert_eq!(even_thickness(18.0), 18.0);
        assert_eq!(even_thickness(0.0), 0.0);
    }

    #[test]
    fn test_mm_conversion() {
        assert_eq!(mm_to_um(1.5), 1500.0);
    }
}
