//! Where the accessor finds the patches of a field.

use ndarray::{ArrayViewD, ArrayViewMutD};

use crate::error::Result;
use crate::field::FieldId;
use crate::geometry::Geometry;
use crate::Real;

mod store;
pub use self::store::*;

/// Lower corners of the local patches of one field, in global index
/// space, and the ghost margin that surrounds each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLayout {
    pub lower: Vec<Vec<i64>>,
    pub ghosts: Vec<i64>,
}

impl PatchLayout {
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Enumerates the patches owned by the calling process.
///
/// For a given `(field, level, include_ghosts)`, `lower_corners`, `fetch`
/// and `fetch_mut` must describe the same patches in the same order.
/// Each patch array has one axis per spatial dimension, followed by a
/// component axis if the field stores more than one value per cell.
/// When `include_ghosts` is set, the lower corners are shifted down by
/// the ghost margin and the arrays include the ghost cells.
pub trait PatchDirectory {
    fn geometry(&self) -> Geometry;

    /// Cell size along x, y and z at the given refinement level.
    fn cell_size(&self, level: usize) -> Result<[Real; 3]>;

    /// Per-axis centering of a field, 1 for nodal, 0 for cell-centred.
    fn nodal_flag(&self, field: FieldId) -> Result<Vec<i64>>;

    fn lower_corners(&self, field: FieldId, level: usize, include_ghosts: bool) -> Result<PatchLayout>;

    fn fetch(&self, field: FieldId, level: usize, include_ghosts: bool) -> Result<Vec<ArrayViewD<'_, Real>>>;

    fn fetch_mut(&mut self, field: FieldId, level: usize, include_ghosts: bool) -> Result<Vec<ArrayViewMutD<'_, Real>>>;
}
