use thiserror::Error;

use crate::field::{FieldId, PatchVariant};
use crate::geometry::Geometry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("inappropriate direction '{label}' for {geometry} geometry")]
    InvalidAxis { label: String, geometry: Geometry },

    #[error("coarse patch only available on levels > 0, requested {field} at level 0")]
    CoarseAtLevelZero { field: FieldId },

    #[error("{kind} has no {variant} variant")]
    UnsupportedVariant { kind: String, variant: PatchVariant },

    #[error("vector field {0} requires a component")]
    MissingComponent(String),

    #[error("scalar field {0} does not take a component")]
    UnexpectedComponent(String),

    #[error("invalid patch layout: {0}")]
    InvalidDesign(String),

    #[error("no {field} data at level {level}")]
    UnknownField { field: FieldId, level: usize },

    #[error("no patches of {field} at level {level} on any process")]
    NoPatches { field: FieldId, level: usize },

    #[error("dimension {axis} lower index {index} is out of bounds [{min}, {max}]")]
    LowerOutOfBounds { axis: usize, index: i64, min: i64, max: i64 },

    #[error("dimension {axis} upper index {index} is out of bounds [{min}, {max}]")]
    UpperOutOfBounds { axis: usize, index: i64, min: i64, max: i64 },

    #[error("component {index} is out of bounds for a field with {ncomps} components")]
    ComponentOutOfBounds { index: i64, ncomps: usize },

    #[error("component must be selected by a single index")]
    ComponentRange,

    #[error("too many indices given: {given} for {dim} spatial axes and {ncomps} component(s)")]
    TooManyIndices { given: usize, dim: usize, ncomps: usize },

    #[error("value of shape {given:?} cannot be broadcast to {expected:?}")]
    ShapeMismatch { given: Vec<usize>, expected: Vec<usize> },

    #[error("collective exchange failed: {0}")]
    Communication(String),
}

/// Broad classes of failure. All but `Communication` are raised before
/// any data is moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Bounds,
    Arity,
    Shape,
    Communication,
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        use AccessError::*;
        match self {
            InvalidAxis { .. }
            | CoarseAtLevelZero { .. }
            | UnsupportedVariant { .. }
            | MissingComponent(_)
            | UnexpectedComponent(_)
            | InvalidDesign(_)
            | UnknownField { .. }
            | NoPatches { .. } => ErrorKind::Configuration,
            LowerOutOfBounds { .. } | UpperOutOfBounds { .. } | ComponentOutOfBounds { .. } => {
                ErrorKind::Bounds
            }
            ComponentRange | TooManyIndices { .. } => ErrorKind::Arity,
            ShapeMismatch { .. } => ErrorKind::Shape,
            Communication(_) => ErrorKind::Communication,
        }
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
