use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ConfigDoc, Placement, SimConfig, Side};
use crate::geometry::coords::Rotation;
use crate::geometry::{build_geometry, Board, GeometryInputs, GeometryModel};
use crate::import::drill::DrillHit;
use crate::import::raster::TraceMesh;
use crate::results::RawResult;
use crate::BUILD_PATH;


/// Two 50 ohm microstrip ports over a 0.2 mm core, both excited.
pub(crate) const SAMPLE_CONFIG: &str = r#"{
    "format_version": "1.1",
    "frequency": { "start": 1e8, "stop": 1e9, "points": 51 },
    "max_steps": 20000,
    "mesh": { "xy": 0.1, "inter_layers": 3, "smoothing_ratio": 1.4 },
    "ports": [
        { "name": "in", "width": 0.3, "layer": 0, "plane": 1, "excite": true },
        { "name": "out", "width": 0.3, "layer": 0, "plane": 1, "excite": true }
    ],
    "traces": [
        { "name": "line", "start": 0, "stop": 1 }
    ],
    "layers": [
        { "name": "F.Cu", "type": "copper", "thickness": 0.036, "file": "F_Cu" },
        { "name": "core", "type": "core", "thickness": 0.2, "epsilon": 4.5 },
        { "name": "B.Cu", "type": "copper", "thickness": 0.036, "file": "B_Cu" }
    ]
}"#;

pub(crate) fn sample_config() -> SimConfig {
    let doc: ConfigDoc = serde_json::from_str(SAMPLE_CONFIG).unwrap();
    SimConfig::from_doc(doc).unwrap()
}

/// A straight 9 mm trace on F.Cu between port 0 at (2, 1) mm and port 1 at
/// (2, 9) mm, with one via beside it.
pub(crate) fn sample_inputs() -> GeometryInputs {
    let placement = |y| Placement {
        x: 2.0,
        y,
        rotation: Rotation::R0,
        side: Side::Top,
    };
    GeometryInputs {
        board: Some(Board {
            width: 5000.0,
            height: 12000.0,
        }),
        placements: HashMap::from([(0, placement(1.0)), (1, placement(9.0))]),
        drill_hits: vec![DrillHit {
            x: 3.0,
            y: 5.0,
            diameter: 0.3,
        }],
        traces: vec![TraceMesh {
            layer: "F_Cu".to_string(),
            x_lines: vec![1850.0, 2150.0],
            y_lines: vec![1000.0, 10000.0],
            triangles: vec![
                [[1850.0, 1000.0], [2150.0, 1000.0], [2150.0, 10000.0]],
                [[1850.0, 1000.0], [2150.0, 10000.0], [1850.0, 10000.0]],
            ],
        }],
    }
}

pub(crate) fn sample_geometry() -> (SimConfig, GeometryModel) {
    let config = sample_config();
    let geometry = build_geometry(&config, &sample_inputs(), false).unwrap();
    (config, geometry)
}

pub(crate) const SAMPLES: usize = 2000;
pub(crate) const DT: f64 = 1e-12;

fn pulse(t: f64) -> f64 {
    let (t0, sigma) = (500e-12, 50e-12);
    (-(t - t0).powi(2) / (2.0 * sigma * sigma)).exp()
}

/// Solver output for a lossless matched line from `excited` to
/// `excited ^ 1`, delayed by `delay` samples. Every other port is silent.
/// Currents are sampled half a step after voltages, as openEMS does.
pub(crate) fn matched_line(excited: usize, ports: usize, z0: f64, delay: usize) -> RawResult {
    let time: Vec<f64> = (0..SAMPLES).map(|k| k as f64 * DT).collect();
    let current_time: Vec<f64> = time.iter().map(|t| t + DT / 2.0).collect();
    let receiver = excited ^ 1;
    let lag = delay as f64 * DT;

    let mut voltage = vec![vec![0.0; SAMPLES]; ports];
    let mut current = vec![vec![0.0; SAMPLES]; ports];
    for (k, (&t, &ti)) in time.iter().zip(&current_time).enumerate() {
        voltage[excited][k] = pulse(t);
        current[excited][k] = pulse(ti) / z0;
        if receiver < ports {
            voltage[receiver][k] = pulse(t - lag);
            current[receiver][k] = -pulse(ti - lag) / z0;
        }
    }

    RawResult {
        excited_port: excited,
        time,
        current_time,
        voltage,
        current,
        geometry_digest: None,
    }
}

/// Writes openEMS probe files for [`matched_line`] into `dir`.
pub(crate) fn write_matched_probes(dir: &Path, excited: usize, ports: usize) {
    let raw = matched_line(excited, ports, 50.0, 100);
    for port in 0..ports {
        for (name, time, values) in [
            (format!("port_ut_{port}"), &raw.time, &raw.voltage[port]),
            (format!("port_it_{port}"), &raw.current_time, &raw.current[port]),
        ] {
            let mut contents = String::from("% time-domain probe\n% t/s\tvalue\n");
            for (t, v) in time.iter().zip(values) {
                contents.push_str(&format!("{t:e}\t{v:e}\n"));
            }
            fs::write(dir.join(name), contents).unwrap();
        }
    }
}

pub(crate) fn test_work_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(BUILD_PATH).join("tests").join(name);
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}
