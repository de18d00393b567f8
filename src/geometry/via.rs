use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::{Offset, ViaConfig};
use crate::geometry::coords::map_position;
use crate::import::drill::DrillHit;
use crate::units::{mm_to_um, VIA_POLYGON};

/// A plated through-hole spanning the whole stack, in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViaBarrel {
    pub x: f64,
    pub y: f64,
    /// Outer radius of the plating.
    pub radius: f64,
    /// Radius of the filling inside the plating. Zero for a solid barrel.
    pub inner_radius: f64,
    pub filling_epsilon: f64,
    pub z_top: f64,
    pub z_bottom: f64,
}

impl ViaBarrel {
    pub fn from_hit(hit: &DrillHit, via: &ViaConfig, offset: Offset, z: (f64, f64)) -> Self {
        let (x, y) = map_position((hit.x, hit.y), offset);
        let radius = mm_to_um(hit.diameter) / 2.0;
        Self {
            x,
            y,
            radius,
            inner_radius: (radius - via.plating_thickness).max(0.0),
            filling_epsilon: via.filling_epsilon,
            z_top: z.0,
            z_bottom: z.1,
        }
    }

    /// Polygon approximating a circle of radius `r` around the via centre.
    pub fn outline(&self, r: f64) -> Vec<[f64; 2]> {
        (0..VIA_POLYGON)
            .map(|i| {
                let phi = 2.0 * PI * i as f64 / VIA_POLYGON as f64;
                [self.x + r * phi.cos(), self.y + r * phi.sin()]
            })
            .collect()
    }

    /// Coordinates of the barrel edges along x and y.
    pub fn boundaries(&self) -> ([f64; 2], [f64; 2]) {
        (
            [self.x - self.radius, self.x + self.radius],
            [self.y - self.radius, self.y + self.radius],
        )
    }
}
