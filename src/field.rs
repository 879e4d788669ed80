//! Identification of the field arrays held by the engine

use std::fmt;
use std::str::FromStr;

use crate::error::{AccessError, Result};
use crate::geometry::Geometry;

/// The physical quantities stored on the mesh.
///
/// `E`, `B` and `J` are vectors and are addressed one component at a time.
/// `Rho` (charge density), `Phi` (electrostatic potential) and the
/// divergence-cleaning potentials `F` and `G` are scalars.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum FieldKind {
    E,
    B,
    J,
    Rho,
    Phi,
    F,
    G,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Component {
    X,
    Y,
    Z,
}

/// Which copy of a field is meant.
///
/// - `Aux`: the field as gathered onto particles, level 0 upwards.
/// - `Fine`: the fine patch of a refinement level.
/// - `Coarse`: the coarse patch underlying a refined level (levels > 0).
/// - `FinePml`, `CoarsePml`: the absorbing layer surrounding the
/// fine or coarse patch.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum PatchVariant {
    Aux,
    Fine,
    Coarse,
    FinePml,
    CoarsePml,
}

/// Key for a single field array: the quantity, its component if it
/// is a vector, and the patch variant.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub struct FieldId {
    kind: FieldKind,
    component: Option<Component>,
    variant: PatchVariant,
}

impl FieldKind {
    pub fn is_vector(&self) -> bool {
        matches!(self, FieldKind::E | FieldKind::B | FieldKind::J)
    }

    /// Whether the engine exposes this quantity for the given variant.
    pub fn has_variant(&self, variant: PatchVariant) -> bool {
        use FieldKind::*;
        match variant {
            PatchVariant::Aux => matches!(self, E | B | J),
            PatchVariant::Fine => true,
            PatchVariant::Coarse => !matches!(self, Phi),
            PatchVariant::FinePml | PatchVariant::CoarsePml => matches!(self, E | B | J | F | G),
        }
    }

    pub fn all() -> [FieldKind; 7] {
        use FieldKind::*;
        [E, B, J, Rho, Phi, F, G]
    }
}

impl Component {
    pub fn index(&self) -> usize {
        match self {
            Component::X => 0,
            Component::Y => 1,
            Component::Z => 2,
        }
    }

    pub fn all() -> [Component; 3] {
        [Component::X, Component::Y, Component::Z]
    }
}

impl PatchVariant {
    pub fn is_coarse(&self) -> bool {
        matches!(self, PatchVariant::Coarse | PatchVariant::CoarsePml)
    }

    pub fn is_pml(&self) -> bool {
        matches!(self, PatchVariant::FinePml | PatchVariant::CoarsePml)
    }

    pub fn all() -> [PatchVariant; 5] {
        use PatchVariant::*;
        [Aux, Fine, Coarse, FinePml, CoarsePml]
    }
}

impl FieldId {
    /// Validates and builds a field key. Vector quantities need a
    /// component, scalars must not have one.
    pub fn new(kind: FieldKind, component: Option<Component>, variant: PatchVariant) -> Result<Self> {
        match (kind.is_vector(), component) {
            (true, None) => return Err(AccessError::MissingComponent(kind.to_string())),
            (false, Some(_)) => return Err(AccessError::UnexpectedComponent(kind.to_string())),
            _ => (),
        }

        if !kind.has_variant(variant) {
            return Err(AccessError::UnsupportedVariant {
                kind: kind.to_string(),
                variant,
            });
        }

        Ok(FieldId { kind, component, variant })
    }

    pub fn vector(kind: FieldKind, component: Component, variant: PatchVariant) -> Result<Self> {
        FieldId::new(kind, Some(component), variant)
    }

    pub fn scalar(kind: FieldKind, variant: PatchVariant) -> Result<Self> {
        FieldId::new(kind, None, variant)
    }

    /// Every field the engine exposes, in a fixed order.
    pub fn all() -> Vec<FieldId> {
        let mut ids = Vec::new();
        for &variant in PatchVariant::all().iter() {
            for &kind in FieldKind::all().iter() {
                if !kind.has_variant(variant) {
                    continue;
                }
                if kind.is_vector() {
                    for &c in Component::all().iter() {
                        ids.push(FieldId { kind, component: Some(c), variant });
                    }
                } else {
                    ids.push(FieldId { kind, component: None, variant });
                }
            }
        }
        ids
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn component(&self) -> Option<Component> {
        self.component
    }

    pub fn variant(&self) -> PatchVariant {
        self.variant
    }

    /// Same quantity and component, different variant.
    pub fn with_variant(&self, variant: PatchVariant) -> Result<Self> {
        FieldId::new(self.kind, self.component, variant)
    }

    /// Per-axis centering on the Yee mesh: 1 where the field is sampled
    /// at grid nodes, 0 where it is sampled at cell centres.
    ///
    /// E and J components are cell-centred along their own direction and
    /// nodal across it; B components are the reverse. Rho, Phi and F live
    /// on nodes, G at cell centres.
    pub fn nodal_flag(&self, geometry: Geometry) -> Vec<i64> {
        let dim = geometry.dim();
        match (self.kind, self.component) {
            (FieldKind::E, Some(c)) | (FieldKind::J, Some(c)) => {
                let along = geometry.component_axis(c);
                (0..dim).map(|ax| if Some(ax) == along {0} else {1}).collect()
            },
            (FieldKind::B, Some(c)) => {
                let along = geometry.component_axis(c);
                (0..dim).map(|ax| if Some(ax) == along {1} else {0}).collect()
            },
            (FieldKind::G, _) => vec![0; dim],
            _ => vec![1; dim],
        }
    }

    /// Number of values stored per cell. PML fields carry split
    /// components; with divergence cleaning E and B gain a third.
    pub fn components(&self, pml_cleaning: bool) -> usize {
        if !self.variant.is_pml() {
            return 1;
        }
        match self.kind {
            FieldKind::E | FieldKind::B => if pml_cleaning {3} else {2},
            FieldKind::F | FieldKind::G => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FieldKind::E => "E",
            FieldKind::B => "B",
            FieldKind::J => "J",
            FieldKind::Rho => "rho",
            FieldKind::Phi => "phi",
            FieldKind::F => "F",
            FieldKind::G => "G",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Component::X => "x",
            Component::Y => "y",
            Component::Z => "z",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for PatchVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PatchVariant::Aux => "aux",
            PatchVariant::Fine => "fine patch",
            PatchVariant::Coarse => "coarse patch",
            PatchVariant::FinePml => "fine patch PML",
            PatchVariant::CoarsePml => "coarse patch PML",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.component {
            Some(c) => write!(f, "{}{} ({})", self.kind, c, self.variant),
            None => write!(f, "{} ({})", self.kind, self.variant),
        }
    }
}

/// Parses names such as `Ex`, `By`, `rho` or `F` into a field on the
/// given variant.
impl FromStr for FieldId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self> {
        FieldId::parse(s, PatchVariant::Fine)
    }
}

impl FieldId {
    pub fn parse(name: &str, variant: PatchVariant) -> Result<Self> {
        let unknown = || AccessError::UnsupportedVariant {
            kind: name.to_owned(),
            variant,
        };

        let scalar = match name.to_lowercase().as_str() {
            "rho" => Some(FieldKind::Rho),
            "phi" => Some(FieldKind::Phi),
            "f" => Some(FieldKind::F),
            "g" => Some(FieldKind::G),
            _ => None,
        };
        if let Some(kind) = scalar {
            return FieldId::scalar(kind, variant);
        }

        let mut chars = name.chars();
        let kind = match chars.next() {
            Some('E') => FieldKind::E,
            Some('B') => FieldKind::B,
            Some('J') | Some('j') => FieldKind::J,
            _ => return Err(unknown()),
        };
        let component = match chars.as_str() {
            "x" => Component::X,
            "y" => Component::Y,
            "z" => Component::Z,
            _ => return Err(unknown()),
        };
        FieldId::vector(kind, component, variant)
    }
}
