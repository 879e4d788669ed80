//! Spatial layout of the simulation domain

use std::fmt;
use std::str::FromStr;

use crate::error::AccessError;
use crate::field::Component;

/// The geometries the engine can be built for.
///
/// - `OneD`: a single Cartesian axis, `z`.
/// - `TwoD`: Cartesian `x` and `z`; `y` is the invariant direction.
/// - `Rz`: axisymmetric, radial `r` and longitudinal `z`.
/// - `ThreeD`: Cartesian `x`, `y` and `z`.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Geometry {
    OneD,
    TwoD,
    Rz,
    ThreeD,
}

impl Geometry {
    /// Number of spatial axes of the patch arrays.
    pub fn dim(&self) -> usize {
        match self {
            Geometry::OneD => 1,
            Geometry::TwoD | Geometry::Rz => 2,
            Geometry::ThreeD => 3,
        }
    }

    pub fn axis_labels(&self) -> &'static [&'static str] {
        match self {
            Geometry::OneD => &["z"],
            Geometry::TwoD => &["x", "z"],
            Geometry::Rz => &["r", "z"],
            Geometry::ThreeD => &["x", "y", "z"],
        }
    }

    /// Looks up an axis label, returning the spatial axis it indexes and
    /// the entry of the engine's (x, y, z) cell-size triple that belongs to it.
    pub fn axis(&self, label: &str) -> Result<(usize, usize), AccessError> {
        let idir = self
            .axis_labels()
            .iter()
            .position(|&l| l == label)
            .ok_or_else(|| AccessError::InvalidAxis {
                label: label.to_owned(),
                geometry: *self,
            })?;

        let celldir = match self {
            Geometry::OneD => 2,
            Geometry::TwoD | Geometry::Rz => 2 * idir,
            Geometry::ThreeD => idir,
        };

        Ok((idir, celldir))
    }

    /// The spatial axis along which a vector component points, if that
    /// direction is resolved on the grid.
    pub fn component_axis(&self, component: Component) -> Option<usize> {
        match (self, component) {
            (Geometry::OneD, Component::Z) => Some(0),
            (Geometry::OneD, _) => None,
            (Geometry::TwoD, Component::X) | (Geometry::Rz, Component::X) => Some(0),
            (Geometry::TwoD, Component::Z) | (Geometry::Rz, Component::Z) => Some(1),
            (Geometry::TwoD, Component::Y) | (Geometry::Rz, Component::Y) => None,
            (Geometry::ThreeD, c) => Some(c.index()),
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Geometry::OneD => "1d",
            Geometry::TwoD => "2d",
            Geometry::Rz => "rz",
            Geometry::ThreeD => "3d",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1d" => Ok(Geometry::OneD),
            "2d" => Ok(Geometry::TwoD),
            "rz" => Ok(Geometry::Rz),
            "3d" => Ok(Geometry::ThreeD),
            other => Err(format!("unknown geometry '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_directions() {
        assert_eq!(Geometry::ThreeD.axis("y"), Ok((1, 1)));
        assert_eq!(Geometry::TwoD.axis("z"), Ok((1, 2)));
        assert_eq!(Geometry::Rz.axis("r"), Ok((0, 0)));
        assert_eq!(Geometry::OneD.axis("z"), Ok((0, 2)));
    }

    #[test]
    fn rejects_unknown_label() {
        let err = Geometry::TwoD.axis("y").unwrap_err();
        assert_eq!(
            err,
            AccessError::InvalidAxis { label: "y".to_owned(), geometry: Geometry::TwoD }
        );
        assert!(Geometry::Rz.axis("x").is_err());
    }

    #[test]
    fn components_in_2d() {
        assert_eq!(Geometry::TwoD.component_axis(Component::X), Some(0));
        assert_eq!(Geometry::TwoD.component_axis(Component::Y), None);
        assert_eq!(Geometry::TwoD.component_axis(Component::Z), Some(1));
    }

    #[test]
    fn parse() {
        assert_eq!("RZ".parse::<Geometry>(), Ok(Geometry::Rz));
        assert!("4d".parse::<Geometry>().is_err());
    }
}
