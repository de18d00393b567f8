//! Stackup z-profile.
//!
//! The top surface of the stack is z = 0 and z decreases going down, so the
//! board occupies negative z and the air margin above it positive z.
//!
//! Copper layers sit on the interface between the layers around them. A copper
//! layer of thickness `t` is a volume spanning `t/2` on either side of that
//! interface, and every dielectric next to it is grown by `t/2`. This keeps
//! the physical dielectric separation between copper faces intact while
//! letting every copper layer share a reference plane with its dielectric.
//! Zero-thickness copper is a sheet at the interface.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::config::{LayerKind, StackupLayer};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopperForm {
    Sheet,
    Volume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedLayer {
    pub name: ArcStr,
    pub kind: LayerKind,
    /// Reference plane. For copper this is the interface the layer sits on.
    pub z: f64,
    pub z_top: f64,
    pub z_bottom: f64,
    pub epsilon: Option<f64>,
    /// Ordinal among the copper layers.
    pub copper_index: Option<usize>,
    pub form: Option<CopperForm>,
    pub file: Option<String>,
    pub export_field: bool,
    pub z_mesh_count: Option<usize>,
}

impl PlacedLayer {
    #[inline]
    pub fn thickness(&self) -> f64 {
        self.z_top - self.z_bottom
    }

    #[inline]
    pub fn is_volumetric(&self) -> bool {
        self.form == Some(CopperForm::Volume)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stackup {
    pub layers: Vec<PlacedLayer>,
}

impl Stackup {
    pub fn build(layers: &[StackupLayer]) -> Self {
        let half = |layer: Option<&StackupLayer>| match layer {
            Some(l) if l.is_copper() => l.thickness / 2.0,
            _ => 0.0,
        };

        let mut placed = Vec::with_capacity(layers.len());
        let mut interface = 0.0;
        let mut copper_index = 0;

        for (i, layer) in layers.iter().enumerate() {
            match layer.kind {
                LayerKind::Copper => {
                    let h = layer.thickness / 2.0;
                    placed.push(PlacedLayer {
                        name: layer.name.clone(),
                        kind: LayerKind::Copper,
                        z: interface,
                        z_top: interface + h,
                        z_bottom: interface - h,
                        epsilon: None,
                        copper_index: Some(copper_index),
                        form: Some(if layer.thickness > 0.0 {
                            CopperForm::Volume
                        } else {
                            CopperForm::Sheet
                        }),
                        file: layer.file.clone(),
                        export_field: layer.export_field,
                        z_mesh_count: layer.z_mesh_count,
                    });
                    copper_index += 1;
                }
                LayerKind::Dielectric => {
                    let prev = i.checked_sub(1).and_then(|j| layers.get(j));
                    let thickness = layer.thickness + half(prev) + half(layers.get(i + 1));
                    let z_top = interface;
                    interface -= thickness;
                    placed.push(PlacedLayer {
                        name: layer.name.clone(),
                        kind: LayerKind::Dielectric,
                        z: (z_top + interface) / 2.0,
                        z_top,
                        z_bottom: interface,
                        epsilon: layer.epsilon,
                        copper_index: None,
                        form: None,
                        file: None,
                        export_field: layer.export_field,
                        z_mesh_count: layer.z_mesh_count,
                    });
                }
            }
        }

        Self { layers: placed }
    }

    pub fn copper(&self, index: usize) -> Option<&PlacedLayer> {
        self.copper_layers().nth(index)
    }

    pub fn copper_layers(&self) -> impl Iterator<Item = &PlacedLayer> {
        self.layers.iter().filter(|l| l.kind == LayerKind::Copper)
    }

    pub fn dielectrics(&self) -> impl Iterator<Item = &PlacedLayer> {
        self.layers.iter().filter(|l| l.kind == LayerKind::Dielectric)
    }

    pub fn copper_count(&self) -> usize {
        self.copper_layers().count()
    }

    /// Highest z reached by any layer.
    pub fn top(&self) -> f64 {
        self.layers.iter().map(|l| l.z_top).fold(0.0, f64::max)
    }

    /// Lowest z reached by any layer.
    pub fn bottom(&self) -> f64 {
        self.layers.iter().map(|l| l.z_bottom).fold(0.0, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn four_layer() -> Vec<StackupLayer> {
        vec![
            StackupLayer::copper("F.Cu", 36.0),
            StackupLayer::dielectric("prepreg1", 200.0, 4.2),
            StackupLayer::copper("In1.Cu", 0.0),
            StackupLayer::dielectric("core", 1000.0, 4.5),
            StackupLayer::copper("In2.Cu", 18.0),
            StackupLayer::dielectric("prepreg2", 200.0, 4.2),
            StackupLayer::copper("B.Cu", 36.0),
        ]
    }

    #[test]
    fn test_build_stackup() {
        let stackup = Stackup::build(&four_layer());
        let z: Vec<_> = stackup.copper_layers().map(|l| l.z).collect();
        assert_abs_diff_eq!(z[0], 0.0);
        assert_abs_diff_eq!(z[1], -218.0);
        assert_abs_diff_eq!(z[2], -1227.0);
        assert_abs_diff_eq!(z[3], -1454.0);

        let top = stackup.copper(0).unwrap();
        assert_eq!(top.form, Some(CopperForm::Volume));
        assert_abs_diff_eq!(top.z_top, 18.0);
        assert_abs_diff_eq!(top.z_bottom, -18.0);
        assert_eq!(stackup.copper(1).unwrap().form, Some(CopperForm::Sheet));
        assert_eq!(stackup.copper_count(), 4);
        assert!(stackup.copper(4).is_none());

        // Physical separation between copper faces equals the configured thickness.
        let f_cu = stackup.copper(0).unwrap();
        let in1 = stackup.copper(1).unwrap();
        assert_abs_diff_eq!(f_cu.z_bottom - in1.z_top, 200.0);
        let in2 = stackup.copper(2).unwrap();
        let b_cu = stackup.copper(3).unwrap();
        assert_abs_diff_eq!(in2.z_bottom - b_cu.z_top, 200.0);

        assert_abs_diff_eq!(stackup.top(), 18.0);
        assert_abs_diff_eq!(stackup.bottom(), -1472.0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let layers = four_layer();
        let a = Stackup::build(&layers);
        let b = Stackup::build(&layers);
        assert_eq!(a, b);
        let z_a: Vec<_> = a.layers.iter().map(|l| (l.z, l.z_top, l.z_bottom)).collect();
        let z_b: Vec<_> = b.layers.iter().map(|l| (l.z, l.z_top, l.z_bottom)).collect();
        assert_eq!(z_a, z_b);
    }

    #[test]
    fn test_sheet_stackup() {
        let stackup = Stackup::build(&[
            StackupLayer::copper("top", 0.0),
            StackupLayer::dielectric("core", 1500.0, 4.5),
            StackupLayer::copper("bottom", 0.0),
        ]);
        assert_abs_diff_eq!(stackup.copper(1).unwrap().z, -1500.0);
        assert!(!stackup.copper(0).unwrap().is_volumetric());
        assert_abs_diff_eq!(stackup.bottom(), -1500.0);
    }
}
