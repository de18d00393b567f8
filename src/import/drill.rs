//! Plated through-holes from a drill (`*-PTH.drl`) file.
//!
//! Only the flat subset emitted by KiCad in metric mode is understood: tool
//! definitions `T<n>C<diameter>`, tool selections `T<n>` and hits
//! `X<x>Y<y>`. Every other line is ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};

/// A drill hit in millimetres, in the drill file frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrillHit {
    pub x: f64,
    pub y: f64,
    pub diameter: f64,
}

fn parse_tool(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_drill(path: impl AsRef<Path>, contents: &str) -> Result<Vec<DrillHit>> {
    let path = path.as_ref();
    let err = |line: usize, detail: String| EmsError::ImportFormat {
        kind: "drill",
        path: path.to_path_buf(),
        line,
        detail,
    };

    let mut tools: HashMap<usize, f64> = HashMap::new();
    let mut current: Option<usize> = None;
    let mut hits = Vec::new();

    for (i, line) in contents.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();

        if let Some(rest) = line.strip_prefix('T') {
            if let Some((tool, dia)) = rest.split_once('C') {
                if let Some(tool) = parse_tool(tool) {
                    let dia: f64 = dia
                        .parse()
                        .map_err(|_| err(line_no, format!("invalid tool diameter `{dia}`")))?;
                    debug!("drill tool {tool}: {dia} mm");
                    tools.insert(tool, dia);
                    continue;
                }
            } else if let Some(tool) = parse_tool(rest) {
                current = Some(tool);
                continue;
            }
        }

        if let Some(rest) = line.strip_prefix('X') {
            let (x, y) = rest
                .split_once('Y')
                .ok_or_else(|| err(line_no, format!("hit `{line}` has no Y coordinate")))?;
            let coord = |s: &str| {
                s.parse::<f64>()
                    .map_err(|_| err(line_no, format!("invalid coordinate `{s}`")))
            };
            let (x, y) = (coord(x)?, coord(y)?);
            match current.and_then(|t| tools.get(&t)) {
                Some(&diameter) => hits.push(DrillHit { x, y, diameter }),
                None => warn!(
                    "{:?}:{line_no}: hit at ({x}, {y}) uses an undefined tool; skipping it",
                    path
                ),
            }
        }
    }

    debug!("read {} drill hits from {:?}", hits.len(), path);
    Ok(hits)
}

/// Finds the plated drill file in `input_dir`.
pub fn find_drill_file(input_dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let mut files: Vec<_> = fs::read_dir(input_dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with("-PTH.drl"))
        })
        .collect();
    files.sort();
    Ok(files.into_iter().next())
}

pub fn read_drill(input_dir: impl AsRef<Path>) -> Result<Vec<DrillHit>> {
    match find_drill_file(input_dir)? {
        Some(path) => {
            let contents = fs::read_to_string(&path)?;
            parse_drill(&path, &contents)
        }
        None => {
            warn!("no plated drill file found; the board will have no vias");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRILL: &str = "M48
; DRILL file {KiCad 7} date 2023-01-01
FMAT,2
METRIC
T1C0.300
T2C0.800
%
G90
G05
T1
X10.5Y-3.25
X11.0Y-3.25
T2
X2.0Y2.0
T3
X1.0Y1.0
M30
";

    #[test]
    fn test_parse_drill() {
        let hits = parse_drill("board-PTH.drl", DRILL).unwrap();
        assert_eq!(
            hits,
            vec![
                DrillHit {
                    x: 10.5,
                    y: -3.25,
                    diameter: 0.3
                },
                DrillHit {
                    x: 11.0,
                    y: -3.25,
                    diameter: 0.3
                },
                DrillHit {
                    x: 2.0,
                    y: 2.0,
                    diameter: 0.8
                },
            ]
        );
    }

    #[test]
    fn test_malformed_hit() {
        let err = parse_drill("board-PTH.drl", "T1C0.3\nT1\nX1.0\n").unwrap_err();
        assert!(matches!(err, EmsError::ImportFormat { line: 3, kind: "drill", .. }));
    }

    #[test]
    fn test_read_drill() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_drill(dir.path()).unwrap().is_empty());
        fs::write(dir.path().join("board-PTH.drl"), DRILL).unwrap();
        assert_eq!(read_drill(dir.path()).unwrap().len(), 3);
    }
}
