//! Port positions from KiCad placement (`*-pos.csv`) files.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::config::{Placement, Side};
use crate::error::{EmsError, Result};
use crate::geometry::coords::Rotation;

/// Value marker of the footprints that stand for simulation ports.
pub const PORT_MARKER: &str = "Simulation_Port";

/// Splits one CSV row, honouring double-quoted fields.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Extracts the port number from a reference designator such as `SP3`.
fn port_number(reference: &str) -> Option<usize> {
    let digits = reference.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if digits.len() == reference.len() || digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Maps a signed placement angle into `[0, 360)`.
pub fn normalize_angle(degrees: f64) -> f64 {
    let a = degrees.rem_euclid(360.0);
    if a >= 360.0 {
        0.0
    } else {
        a
    }
}

/// A port record read from a placement file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortRecord {
    pub port: usize,
    pub placement: Placement,
}

pub fn parse_place(path: impl AsRef<Path>, contents: &str) -> Result<Vec<PortRecord>> {
    let path = path.as_ref();
    let err = |line: usize, detail: String| EmsError::ImportFormat {
        kind: "placement",
        path: path.to_path_buf(),
        line,
        detail,
    };

    let mut records = Vec::new();
    // The first line is the header.
    for (i, line) in contents.lines().enumerate().skip(1) {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let row = split_row(line);
        if row.len() < 6 {
            return Err(err(line_no, format!("expected at least 6 columns, got {}", row.len())));
        }
        if !row[1].contains(PORT_MARKER) {
            continue;
        }

        let reference = row[0].trim();
        let port = port_number(reference)
            .ok_or_else(|| err(line_no, format!("reference `{reference}` has no port number")))?;
        let number = |col: usize, name: &str| {
            row[col]
                .trim()
                .parse::<f64>()
                .map_err(|_| err(line_no, format!("invalid {name} `{}`", row[col].trim())))
        };
        let x = number(3, "x position")?;
        let y = number(4, "y position")?;
        let angle = normalize_angle(number(5, "rotation")?);
        let rotation = Rotation::from_degrees(angle).map_err(|e| err(line_no, e.to_string()))?;
        let side = match row.get(6) {
            Some(side) if !side.trim().is_empty() => side.parse::<Side>().map_err(|e| err(line_no, e))?,
            _ => Side::Top,
        };

        debug!("found port {port} at ({x}, {y}) mm, rotation {angle}");
        records.push(PortRecord {
            port,
            placement: Placement {
                x,
                y,
                rotation,
                side,
            },
        });
    }
    Ok(records)
}

/// Reads every `*-pos.csv` file in `input_dir`, in file name order.
///
/// A port that appears more than once keeps its first placement.
pub fn read_placements(input_dir: impl AsRef<Path>) -> Result<HashMap<usize, Placement>> {
    let mut files: Vec<_> = fs::read_dir(input_dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with("-pos.csv"))
        })
        .collect();
    files.sort();

    let mut placements = HashMap::new();
    for file in files {
        let contents = fs::read_to_string(&file)?;
        for record in parse_place(&file, &contents)? {
            if placements.contains_key(&record.port) {
                warn!(
                    "port {} is placed more than once; ignoring the instance in {:?}",
                    record.port, file
                );
                continue;
            }
            placements.insert(record.port, record.placement);
        }
    }
    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POS: &str = r#"Ref,Val,Package,PosX,PosY,Rot,Side
"C1","100n","C_0402",10.0,12.0,90.0,top
"SP0","Simulation_Port","Port_SMD",1.5,2.25,0.0,top
"SP1","Simulation_Port","Port_SMD",1.5,9.0,-90.0,bottom
"SP12","Simulation_Port, ""narrow""","Port_SMD",4.0,4.0,180.0,top
"#;

    #[test]
    fn test_parse_place() {
        let records = parse_place("board-pos.csv", POS).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].port, 0);
        assert_eq!(records[0].placement.x, 1.5);
        assert_eq!(records[0].placement.y, 2.25);
        assert_eq!(records[1].placement.rotation, Rotation::R270);
        assert_eq!(records[1].placement.side, Side::Bottom);
        assert_eq!(records[2].port, 12);
        assert_eq!(records[2].placement.rotation, Rotation::R180);
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        assert_eq!(normalize_angle(-180.0), 180.0);
        assert_eq!(normalize_angle(45.0), 45.0);
    }

    #[test]
    fn test_unsupported_angle() {
        let pos = "Ref,Val,Package,PosX,PosY,Rot,Side\nSP0,Simulation_Port,P,1,1,45,top\n";
        let err = parse_place("x-pos.csv", pos).unwrap_err();
        assert!(matches!(err, EmsError::ImportFormat { line: 2, .. }));
    }

    #[test]
    fn test_bad_reference() {
        let pos = "Ref,Val,Package,PosX,PosY,Rot,Side\nSP,Simulation_Port,P,1,1,0,top\n";
        assert!(matches!(
            parse_place("x-pos.csv", pos),
            Err(EmsError::ImportFormat { line: 2, .. })
        ));
        assert_eq!(port_number("12"), None);
        assert_eq!(port_number("SP07"), Some(7));
    }

    #[test]
    fn test_read_placements_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a-pos.csv"), POS).unwrap();
        fs::write(
            dir.path().join("b-pos.csv"),
            "Ref,Val,Package,PosX,PosY,Rot,Side\nSP0,Simulation_Port,P,7,7,0,top\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.csv"), "garbage").unwrap();
        let placements = read_placements(dir.path()).unwrap();
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[&0].x, 1.5);
    }
}
