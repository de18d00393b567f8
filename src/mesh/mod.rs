//! Nonuniform mesh planning.
//!
//! Fixed lines come from the board outline, the uniform board pitch, port
//! and via boundaries, the externally supplied trace mesh and the stackup.
//! They are merged, deduplicated and then graded by [`smooth::smooth_lines`].

use serde::{Deserialize, Serialize};

use crate::config::{LayerKind, MeshConfig};
use crate::geometry::port::PortBox;
use crate::geometry::stackup::Stackup;
use crate::geometry::via::ViaBarrel;
use crate::geometry::Board;
use crate::import::raster::TraceMesh;

pub mod smooth;

pub use smooth::{dedup_lines, is_graded, smooth_lines};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshLines {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl MeshLines {
    pub fn cell_count(&self) -> usize {
        self.x.len().saturating_sub(1)
            * self.y.len().saturating_sub(1)
            * self.z.len().saturating_sub(1)
    }
}

pub struct MeshPlanner<'a> {
    pub config: &'a MeshConfig,
    pub board: Board,
    pub stackup: &'a Stackup,
    pub ports: &'a [PortBox],
    pub vias: &'a [ViaBarrel],
    pub traces: &'a [TraceMesh],
    /// Place a line at the middle of every dielectric for field dumps.
    pub export_field: bool,
}

impl<'a> MeshPlanner<'a> {
    pub fn plan(&self) -> MeshLines {
        MeshLines {
            x: self.plan_xy(0),
            y: self.plan_xy(1),
            z: self.plan_z(),
        }
    }

    /// Lines along x (`axis == 0`) or y (`axis == 1`).
    fn plan_xy(&self, axis: usize) -> Vec<f64> {
        let config = self.config;
        let extent = if axis == 0 {
            self.board.width
        } else {
            self.board.height
        };

        let mut lines = Vec::new();

        let pitch = config.xy;
        let mut x = -pitch / 2.0;
        while x <= extent + pitch / 2.0 {
            lines.push(x);
            x += pitch;
        }

        let (mut lo, mut hi) = (0.0_f64, extent);
        for port in self.ports {
            let (min, max) = (port.min()[axis], port.max()[axis]);
            lines.extend([min, max]);
            lo = lo.min(min);
            hi = hi.max(max);
        }
        for via in self.vias {
            let (xs, ys) = via.boundaries();
            let bounds = if axis == 0 { xs } else { ys };
            lines.extend(bounds);
            lo = lo.min(bounds[0]);
            hi = hi.max(bounds[1]);
        }
        for trace in self.traces {
            let trace_lines = if axis == 0 { &trace.x_lines } else { &trace.y_lines };
            lines.extend(trace_lines.iter().copied().filter(|l| *l >= lo && *l <= hi));
        }

        lines.extend([lo - config.margin_xy, hi + config.margin_xy]);
        smooth_lines(&lines, config.max_res_xy, config.smoothing_ratio)
    }

    fn plan_z(&self) -> Vec<f64> {
        let config = self.config;
        let mut lines = vec![0.0];

        for layer in &self.stackup.layers {
            lines.extend([layer.z_top, layer.z_bottom]);
            if layer.kind != LayerKind::Dielectric {
                lines.push(layer.z);
                continue;
            }
            let mut count = layer.z_mesh_count.unwrap_or(config.inter_layers);
            if (self.export_field || layer.export_field) && count % 2 == 0 {
                count += 1;
            }
            let step = layer.thickness() / (count + 1) as f64;
            lines.extend((1..=count).map(|k| layer.z_top - step * k as f64));
        }

        let top = self.stackup.top();
        let bottom = self.stackup.bottom();
        lines.extend([top + config.margin_z, bottom - config.margin_z]);
        smooth_lines(&lines, config.max_res_z, config.smoothing_ratio)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::config::{Offset, Placement, PortConfig, Side, StackupLayer, ViaConfig};
    use crate::geometry::coords::Rotation;
    use crate::geometry::port::generate_ports;
    use crate::import::drill::DrillHit;

    fn mesh_config(ratio: f64, inter_layers: usize, margin: f64) -> MeshConfig {
        MeshConfig {
            xy: 50.0,
            inter_layers,
            smoothing_ratio: ratio,
            max_res_xy: 200.0,
            max_res_z: 200.0,
            margin_xy: margin,
            margin_z: margin,
        }
    }

    fn stackup() -> Stackup {
        Stackup::build(&[
            StackupLayer::copper("top", 36.0),
            StackupLayer::dielectric("core", 200.0, 4.5),
            StackupLayer::copper("bottom", 0.0),
        ])
    }

    fn ports(stackup: &Stackup) -> Vec<PortBox> {
        let configs: Vec<_> = (0..2)
            .map(|i| PortConfig {
                index: i,
                name: arcstr::format!("p{i}"),
                width: 330.0,
                length: 1000.0,
                impedance: 50.0,
                layer: 0,
                plane: 1,
                excite: i == 0,
                placement: None,
            })
            .collect();
        let placements = HashMap::from([
            (
                0,
                Placement {
                    x: 1.013,
                    y: 2.0,
                    rotation: Rotation::R0,
                    side: Side::Top,
                },
            ),
            (
                1,
                Placement {
                    x: 1.013,
                    y: 8.0,
                    rotation: Rotation::R180,
                    side: Side::Top,
                },
            ),
        ]);
        generate_ports(&configs, &placements, stackup, Offset::default())
            .unwrap()
            .ports
    }

    fn planner_lines(ratio: f64, inter_layers: usize, margin: f64, export_field: bool) -> MeshLines {
        let config = mesh_config(ratio, inter_layers, margin);
        let stackup = stackup();
        let ports = ports(&stackup);
        let vias = vec![ViaBarrel::from_hit(
            &DrillHit {
                x: 4.0,
                y: 4.0,
                diameter: 0.4,
            },
            &ViaConfig::default(),
            Offset::default(),
            (stackup.top(), stackup.bottom()),
        )];
        let traces = vec![TraceMesh {
            layer: "top".to_string(),
            x_lines: vec![1000.0, 1003.0, 1333.0, 2100.0],
            y_lines: vec![2000.0, 5000.0, 9000.0],
            triangles: Vec::new(),
        }];
        MeshPlanner {
            config: &config,
            board: Board {
                width: 6000.0,
                height: 10000.0,
            },
            stackup: &stackup,
            ports: &ports,
            vias: &vias,
            traces: &traces,
            export_field,
        }
        .plan()
    }

    fn assert_graded(lines: &[f64], ratio: f64, max_res: f64) {
        let intervals: Vec<f64> = lines.windows(2).map(|w| w[1] - w[0]).collect();
        for w in intervals.windows(2) {
            let r = w[0].max(w[1]) / w[0].min(w[1]);
            assert!(r <= ratio * (1.0 + 1e-6), "adjacent interval ratio {r} > {ratio}");
        }
        for d in intervals {
            assert!(d > 0.0 && d <= max_res * (1.0 + 1e-6));
        }
    }

    fn has_line(lines: &[f64], x: f64) -> bool {
        lines.iter().any(|l| (l - x).abs() < 1e-6)
    }

    #[test]
    fn test_grading_holds_for_mesh_configs() {
        for ratio in [1.1, 1.3, 1.5, 2.0, 2.5] {
            for inter_layers in [0, 1, 4, 7] {
                for margin in [0.0, 500.0, 3000.0] {
                    let lines = planner_lines(ratio, inter_layers, margin, false);
                    assert_graded(&lines.x, ratio, 200.0);
                    assert_graded(&lines.y, ratio, 200.0);
                    assert_graded(&lines.z, ratio, 200.0);
                }
            }
        }
    }

    #[test]
    fn test_port_and_via_lines() {
        let lines = planner_lines(1.5, 4, 3000.0, false);
        // port 0 box spans x in [848, 1178], y in [2000, 3000]
        for x in [848.0, 1178.0] {
            assert!(has_line(&lines.x, x), "missing port line x={x}");
        }
        for y in [2000.0, 3000.0, 7000.0, 8000.0] {
            assert!(has_line(&lines.y, y), "missing port line y={y}");
        }
        for v in [3800.0, 4200.0] {
            assert!(has_line(&lines.x, v));
            assert!(has_line(&lines.y, v));
        }
        assert!(has_line(&lines.x, 1003.0));
        assert!(has_line(&lines.y, 5000.0));
    }

    #[test]
    fn test_margins() {
        let lines = planner_lines(1.5, 4, 3000.0, false);
        assert_abs_diff_eq!(lines.x[0], -3000.0);
        assert_abs_diff_eq!(*lines.x.last().unwrap(), 9000.0);
        assert_abs_diff_eq!(lines.y[0], -3000.0);
        assert_abs_diff_eq!(*lines.y.last().unwrap(), 13000.0);
        assert_abs_diff_eq!(lines.z[0], -3200.0 - 18.0);
        assert_abs_diff_eq!(*lines.z.last().unwrap(), 3018.0);
    }

    #[test]
    fn test_z_layer_lines() {
        let stackup = stackup();
        let lines = planner_lines(2.0, 4, 1000.0, false);
        for layer in &stackup.layers {
            assert!(has_line(&lines.z, layer.z_top));
            assert!(has_line(&lines.z, layer.z_bottom));
        }
        // core spans [0, -218] with four evenly spaced interior lines
        for k in 1..=4 {
            assert!(has_line(&lines.z, -218.0 * k as f64 / 5.0));
        }
    }

    #[test]
    fn test_export_field_mid_plane() {
        let lines = planner_lines(2.0, 4, 1000.0, true);
        assert!(has_line(&lines.z, -109.0));
    }
}
