use std::collections::HashMap;

use arcstr::ArcStr;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{Offset, Placement, PortConfig, Side};
use crate::error::{EmsError, Result};
use crate::geometry::coords::{map_point, Axis, Rotation};
use crate::geometry::stackup::Stackup;
use crate::units::snap;

/// Solver-ready port geometry, in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortBox {
    pub index: usize,
    pub name: ArcStr,
    /// Corner on the trace layer at the feed edge.
    pub start: [f64; 3],
    /// Opposite corner on the reference plane at the far edge.
    pub stop: [f64; 3],
    /// Feed edge, from the trace layer to the reference plane.
    pub feed: [[f64; 3]; 2],
    pub direction: Axis,
    pub rotation: Rotation,
    pub side: Side,
    pub excite: bool,
    pub impedance: f64,
}

impl PortBox {
    pub fn min(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.start[i].min(self.stop[i]))
    }

    pub fn max(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.start[i].max(self.stop[i]))
    }

    /// Centre of the feed edge, where the voltage probe sits.
    pub fn feed_center(&self) -> [f64; 2] {
        [
            (self.feed[0][0] + self.feed[1][0]) / 2.0,
            (self.feed[0][1] + self.feed[1][1]) / 2.0,
        ]
    }
}

/// Builds the box for one port.
///
/// With `θ` the rotation, `w` the width and `L` the length:
/// `start = (x − w/2·cosθ, y − w/2·sinθ, z_layer)` and
/// `stop = (x + w/2·cosθ − L·sinθ, y + w/2·sinθ + L·cosθ, z_plane)`.
pub fn port_box(
    port: &PortConfig,
    placement: &Placement,
    stackup: &Stackup,
    offset: Offset,
) -> Result<PortBox> {
    let available = stackup.copper_count();
    let layer = stackup
        .copper(port.layer)
        .ok_or(EmsError::PortLayerReference {
            port: port.index,
            role: "trace",
            index: port.layer,
            available,
        })?;
    let plane = stackup
        .copper(port.plane)
        .ok_or(EmsError::PortLayerReference {
            port: port.index,
            role: "plane",
            index: port.plane,
            available,
        })?;

    let mapped = map_point(
        (placement.x, placement.y),
        f64::from(placement.rotation.degrees()),
        offset,
    )?;
    let (cos, sin) = mapped.rotation.cos_sin();
    let (w2, l) = (port.width / 2.0, port.length);

    let start = [
        snap(mapped.x - w2 * cos),
        snap(mapped.y - w2 * sin),
        layer.z,
    ];
    let stop = [
        snap(mapped.x + w2 * cos - l * sin),
        snap(mapped.y + w2 * sin + l * cos),
        plane.z,
    ];
    let feed = [
        start,
        [snap(mapped.x + w2 * cos), snap(mapped.y + w2 * sin), plane.z],
    ];

    Ok(PortBox {
        index: port.index,
        name: port.name.clone(),
        start,
        stop,
        feed,
        direction: mapped.rotation.propagation_axis(),
        rotation: mapped.rotation,
        side: placement.side,
        excite: port.excite,
        impedance: port.impedance,
    })
}

/// Port boxes plus construction caveats worth reporting to the user.
#[derive(Debug, Clone, Default)]
pub struct PortGeometry {
    pub ports: Vec<PortBox>,
    pub caveats: Vec<String>,
}

pub fn generate_ports(
    ports: &[PortConfig],
    placements: &HashMap<usize, Placement>,
    stackup: &Stackup,
    offset: Offset,
) -> Result<PortGeometry> {
    let mut out = PortGeometry::default();
    for port in ports {
        let placement = port
            .placement
            .as_ref()
            .or_else(|| placements.get(&port.index))
            .ok_or(EmsError::PortPlacement { port: port.index })?;
        let port_box = port_box(port, placement, stackup, offset)?;

        let volumetric: Vec<_> = [port.layer, port.plane]
            .into_iter()
            .filter_map(|i| stackup.copper(i))
            .filter(|l| l.is_volumetric())
            .map(|l| l.name.as_str())
            .collect();
        if !volumetric.is_empty() {
            let caveat = format!(
                "port {} ends on the mid-plane of volumetric copper ({}); contact with the copper depends on solver primitive priority",
                port.index,
                volumetric.join(", ")
            );
            warn!("{caveat}");
            out.caveats.push(caveat);
        }

        out.ports.push(port_box);
    }
    Ok(out)
}
