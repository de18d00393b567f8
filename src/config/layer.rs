use arcstr::ArcStr;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{EmsError, Result};
use crate::units::{even_thickness, mm_to_um};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Copper,
    Dielectric,
}

/// A layer entry as written in the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDoc {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Thickness in millimetres.
    pub thickness: Option<f64>,
    pub epsilon: Option<f64>,
    /// Raster stem produced for this copper layer.
    pub file: Option<String>,
    pub export_field: bool,
    pub z_mesh_count: Option<usize>,
}

/// A validated stackup layer. Thickness is in micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackupLayer {
    pub name: ArcStr,
    pub kind: LayerKind,
    pub thickness: f64,
    pub epsilon: Option<f64>,
    pub file: Option<String>,
    pub export_field: bool,
    pub z_mesh_count: Option<usize>,
}

impl StackupLayer {
    pub fn copper(name: &str, thickness: f64) -> Self {
        Self {
            name: ArcStr::from(name),
            kind: LayerKind::Copper,
            thickness,
            epsilon: None,
            file: None,
            export_field: false,
            z_mesh_count: None,
        }
    }

    pub fn dielectric(name: &str, thickness: f64, epsilon: f64) -> Self {
        Self {
            name: ArcStr::from(name),
            kind: LayerKind::Dielectric,
            thickness,
            epsilon: Some(epsilon),
            file: None,
            export_field: false,
            z_mesh_count: None,
        }
    }

    #[inline]
    pub fn is_copper(&self) -> bool {
        self.kind == LayerKind::Copper
    }
}

fn parse_kind(field: &str, kind: Option<&str>) -> Result<LayerKind> {
    match kind.map(|k| k.to_ascii_lowercase()).as_deref() {
        Some("copper") => Ok(LayerKind::Copper),
        Some("core") | Some("prepreg") | Some("dielectric") => Ok(LayerKind::Dielectric),
        Some(other) => Err(EmsError::config(
            field,
            format!("unknown layer type `{other}`"),
        )),
        None => Err(EmsError::config(field, "missing layer type")),
    }
}

pub(crate) fn validate_layers(docs: &[LayerDoc]) -> Result<Vec<StackupLayer>> {
    let mut layers = Vec::with_capacity(docs.len());
    for (i, doc) in docs.iter().enumerate() {
        let kind = parse_kind(&format!("layers[{i}].type"), doc.kind.as_deref())?;
        let name = doc.name.clone().unwrap_or_else(|| format!("layer{i}"));

        let thickness = doc.thickness.unwrap_or(0.0);
        if thickness < 0.0 || !thickness.is_finite() {
            return Err(EmsError::config(
                format!("layers[{i}].thickness"),
                format!("thickness must be non-negative, got {thickness}"),
            ));
        }
        let mut thickness = mm_to_um(thickness);

        let epsilon = match kind {
            LayerKind::Dielectric => match doc.epsilon {
                Some(eps) if eps > 0.0 => Some(eps),
                Some(eps) => {
                    return Err(EmsError::config(
                        format!("layers[{i}].epsilon"),
                        format!("epsilon must be positive, got {eps}"),
                    ))
                }
                None => {
                    return Err(EmsError::config(
                        format!("layers[{i}].epsilon"),
                        "epsilon is required for dielectric layers",
                    ))
                }
            },
            LayerKind::Copper => {
                let even = even_thickness(thickness);
                if even != thickness {
                    warn!("copper layer `{name}` thickness {thickness} um rounded to {even} um");
                    thickness = even;
                }
                None
            }
        };

        if kind == LayerKind::Dielectric && doc.file.is_some() {
            warn!("dielectric layer `{name}` has a raster file; ignoring it");
        }

        layers.push(StackupLayer {
            name: ArcStr::from(name),
            kind,
            thickness,
            epsilon,
            file: if kind == LayerKind::Copper {
                doc.file.clone()
            } else {
                None
            },
            export_field: doc.export_field,
            z_mesh_count: doc.z_mesh_count,
        });
    }

    if !layers.iter().any(StackupLayer::is_copper) {
        return Err(EmsError::config("layers", "at least one copper layer is required"));
    }

    Ok(layers)
}
