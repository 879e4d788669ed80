//! Global-index access to the decomposed field arrays of a
//! particle-in-cell simulation.
//!
//! The fields of the simulation (E, B, J, rho, ...) are stored as a set of
//! rectangular patches, each owned by one process of the worker group.
//! A [`FieldAccessor`] hides this decomposition: it is indexed with global
//! cell indices and gathers from, or scatters to, whichever patches hold
//! the requested cells.
//!
//! ```
//! use field_access::*;
//!
//! let group = SingleProcess;
//! let design = StoreDesign::new(Geometry::TwoD, vec![8, 8]).with_max_grid_size(4);
//! let mut store = PatchStore::new(design, &group)?;
//!
//! let ex = FieldId::vector(FieldKind::E, Component::X, PatchVariant::Aux)?;
//! let accessor = FieldAccessor::new(&group, &store, ex, 0, false)?;
//!
//! accessor.write(&mut store, &Selection::All, 1.5.into())?;
//! let row = accessor.read(&store, &Selection::from(vec![IndexSpec::at(3)]))?;
//! assert_eq!(row.shape(), &[9]);
//! assert!(row.iter().all(|&v| v == 1.5));
//! # Ok::<(), AccessError>(())
//! ```

pub mod accessor;
pub mod constants;
pub mod directory;
pub mod error;
pub mod field;
pub mod geometry;
pub mod group;
pub mod setup;

pub use accessor::{FieldAccessor, IndexSpec, Selection, Value};
pub use directory::{PatchDirectory, PatchLayout, PatchStore, StoreDesign};
pub use error::{AccessError, ErrorKind, Result};
pub use field::{Component, FieldId, FieldKind, PatchVariant};
pub use geometry::Geometry;
pub use group::{Fragment, SingleProcess, WorkerGroup};

#[cfg(feature = "with-mpi")]
pub use group::MpiGroup;

/// Floating-point type of the field data.
#[cfg(not(feature = "single_precision"))]
pub type Real = f64;

/// Floating-point type of the field data.
#[cfg(feature = "single_precision")]
pub type Real = f32;
