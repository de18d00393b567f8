//! Rasterized copper layers and the meshes derived from them.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};
use crate::geometry::Board;
use crate::units::{BORDER_THICKNESS, PIXEL_SIZE};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Reads the pixel dimensions from the IHDR chunk of a PNG file.
pub fn png_dimensions(path: impl AsRef<Path>) -> Result<(u32, u32)> {
    let path = path.as_ref();
    let mut header = [0u8; 24];
    File::open(path)?.read_exact(&mut header)?;
    let err = |detail: &str| EmsError::ImportFormat {
        kind: "png",
        path: path.to_path_buf(),
        line: 0,
        detail: detail.to_string(),
    };
    if header[..8] != PNG_SIGNATURE {
        return Err(err("not a PNG file"));
    }
    if &header[12..16] != b"IHDR" {
        return Err(err("missing IHDR chunk"));
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Ok((width, height))
}

/// Board extents implied by a raster of the given pixel size.
pub fn board_from_pixels(width: u32, height: u32) -> Board {
    Board {
        width: f64::from(width) * PIXEL_SIZE - BORDER_THICKNESS,
        height: f64::from(height) * PIXEL_SIZE - BORDER_THICKNESS,
    }
}

pub fn read_board(path: impl AsRef<Path>) -> Result<Board> {
    let (w, h) = png_dimensions(&path)?;
    let board = board_from_pixels(w, h);
    debug!(
        "board dimensions from {:?}: {} x {} um",
        path.as_ref(),
        board.width,
        board.height
    );
    Ok(board)
}

/// Mesher output for one copper layer, in board micrometres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMesh {
    /// Raster file stem of the copper layer.
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub x_lines: Vec<f64>,
    #[serde(default)]
    pub y_lines: Vec<f64>,
    #[serde(default)]
    pub triangles: Vec<[[f64; 2]; 3]>,
}

pub fn read_trace_mesh(path: impl AsRef<Path>, stem: &str) -> Result<TraceMesh> {
    let contents = fs::read_to_string(path)?;
    let mut mesh: TraceMesh = serde_json::from_str(&contents)?;
    if mesh.layer.is_empty() {
        mesh.layer = stem.to_string();
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(13u32.to_be_bytes());
        bytes.extend(b"IHDR");
        bytes.extend(width.to_be_bytes());
        bytes.extend(height.to_be_bytes());
        bytes.extend([8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_read_board() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("F_Cu.png");
        fs::write(&path, fake_png(505, 1005)).unwrap();
        assert_eq!(png_dimensions(&path).unwrap(), (505, 1005));
        let board = read_board(&path).unwrap();
        assert_eq!(board.width, 5000.0);
        assert_eq!(board.height, 10000.0);
    }

    #[test]
    fn test_not_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("F_Cu.png");
        fs::write(&path, [0u8; 32]).unwrap();
        assert!(matches!(
            read_board(&path),
            Err(EmsError::ImportFormat { kind: "png", .. })
        ));
    }

    #[test]
    fn test_read_trace_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("F_Cu_mesh.json");
        fs::write(&path, r#"{ "x_lines": [1.0, 2.0] }"#).unwrap();
        let mesh = read_trace_mesh(&path, "F_Cu").unwrap();
        assert_eq!(mesh.layer, "F_Cu");
        assert_eq!(mesh.x_lines, vec![1.0, 2.0]);
        assert!(mesh.triangles.is_empty());
    }
}
