//! Place-file to simulation frame mapping.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::config::Offset;
use crate::error::{EmsError, Result};
use crate::units::mm_to_um;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum Rotation {
    R0 = 0,
    R90 = 90,
    R180 = 180,
    R270 = 270,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

impl Rotation {
    /// Accepts exactly 0, 90, 180 or 270 degrees.
    pub fn from_degrees(degrees: f64) -> Result<Self> {
        match degrees {
            d if d == 0.0 => Ok(Rotation::R0),
            d if d == 90.0 => Ok(Rotation::R90),
            d if d == 180.0 => Ok(Rotation::R180),
            d if d == 270.0 => Ok(Rotation::R270),
            _ => Err(EmsError::UnsupportedRotation { rotation: degrees }),
        }
    }

    #[inline]
    pub fn degrees(self) -> u16 {
        self as u16
    }

    /// Exact cosine and sine of the rotation angle.
    pub fn cos_sin(self) -> (f64, f64) {
        match self {
            Rotation::R0 => (1.0, 0.0),
            Rotation::R90 => (0.0, 1.0),
            Rotation::R180 => (-1.0, 0.0),
            Rotation::R270 => (0.0, -1.0),
        }
    }

    /// Axis along which a port with this rotation launches its wave.
    pub fn propagation_axis(self) -> Axis {
        match self {
            Rotation::R0 | Rotation::R180 => Axis::Y,
            Rotation::R90 | Rotation::R270 => Axis::X,
        }
    }
}

/// A point in the simulation frame, in micrometres.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPoint {
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
}

/// Translates a place-file point (millimetres) by the configured offset and
/// converts it to micrometres.
pub fn map_position(raw: (f64, f64), offset: Offset) -> (f64, f64) {
    (mm_to_um(raw.0 + offset.x), mm_to_um(raw.1 + offset.y))
}

/// Maps a rotated place-file point into the simulation frame.
///
/// The translation is applied before the rotation is considered; the rotation
/// itself only selects one of the four canonical box orientations.
pub fn map_point(raw: (f64, f64), rotation: f64, offset: Offset) -> Result<MappedPoint> {
    let rotation = Rotation::from_degrees(rotation)?;
    let (x, y) = map_position(raw, offset);
    Ok(MappedPoint { x, y, rotation })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    macro_rules! test_rotation {
        ($deg:literal, $variant:ident) => {
            paste::paste! {
                #[test]
                fn [<test_map_point_rot_ $deg>]() {
                    let offsets = [(0.0, 0.0), (-100.0, -50.0), (12.5, -0.75)];
                    let points = [(0.0, 0.0), (105.2, 73.9), (-3.0, 8.0)];
                    for (ox, oy) in offsets {
                        for (px, py) in points {
                            let offset = Offset { x: ox, y: oy };
                            let mapped = map_point((px, py), $deg as f64, offset).unwrap();
                            assert_eq!(mapped.rotation, Rotation::$variant);
                            assert_abs_diff_eq!(mapped.x / 1000.0 - px, ox, epsilon = 1e-9);
                            assert_abs_diff_eq!(mapped.y / 1000.0 - py, oy, epsilon = 1e-9);
                        }
                    }
                }
            }
        };
    }

    test_rotation!(0, R0);
    test_rotation!(90, R90);
    test_rotation!(180, R180);
    test_rotation!(270, R270);

    #[test]
    fn test_unsupported_rotation() {
        for rotation in [-90.0, 45.0, 89.999, 360.0, 1.0, f64::NAN, 540.0] {
            let err = map_point((1.0, 1.0), rotation, Offset::default()).unwrap_err();
            assert!(matches!(err, EmsError::UnsupportedRotation { .. }));
        }
    }

    #[test]
    fn test_propagation_axis() {
        assert_eq!(Rotation::R0.propagation_axis(), Axis::Y);
        assert_eq!(Rotation::R180.propagation_axis(), Axis::Y);
        assert_eq!(Rotation::R90.propagation_axis(), Axis::X);
        assert_eq!(Rotation::R270.propagation_axis(), Axis::X);
    }

    #[test]
    fn test_rotation_serde() {
        let json = serde_json::to_string(&Rotation::R270).unwrap();
        assert_eq!(json, "270");
        let rot: Rotation = serde_json::from_str("90").unwrap();
        assert_eq!(rot, Rotation::R90);
    }
}
