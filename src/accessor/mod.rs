//! Read and write a distributed field as though it were one array
//! indexed in global cell coordinates.

use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use tracing::debug;

use crate::directory::{PatchDirectory, PatchLayout};
use crate::error::{AccessError, Result};
use crate::field::FieldId;
use crate::group::{Fragment, WorkerGroup};
use crate::Real;

mod index;
pub use self::index::{IndexSpec, Selection};
use self::index::{window, Bounds, Request};

/// Data to be written into a field: either one value for every selected
/// sample, or an array that broadcasts to the shape a read of the same
/// selection would return.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Scalar(Real),
    Array(ArrayViewD<'a, Real>),
}

impl From<Real> for Value<'_> {
    fn from(v: Real) -> Self {
        Value::Scalar(v)
    }
}

impl<'a> From<ArrayViewD<'a, Real>> for Value<'a> {
    fn from(a: ArrayViewD<'a, Real>) -> Self {
        Value::Array(a)
    }
}

impl<'a> From<&'a ArrayD<Real>> for Value<'a> {
    fn from(a: &'a ArrayD<Real>) -> Self {
        Value::Array(a.view())
    }
}

/// A handle on one field at one refinement level.
///
/// The accessor holds no field data: the patches are looked up in a
/// [`PatchDirectory`] on every call, so it stays valid while the
/// decomposition changes. `read`, `write` and `mesh` are collective over
/// the worker group.
pub struct FieldAccessor<'g, G: WorkerGroup + ?Sized> {
    group: &'g G,
    field: FieldId,
    level: usize,
    include_ghosts: bool,
    overlaps: Vec<i64>,
}

impl<'g, G: WorkerGroup + ?Sized> FieldAccessor<'g, G> {
    pub fn new<D: PatchDirectory + ?Sized>(
        group: &'g G,
        directory: &D,
        field: FieldId,
        level: usize,
        include_ghosts: bool,
    ) -> Result<Self> {
        if field.variant().is_coarse() && level == 0 {
            return Err(AccessError::CoarseAtLevelZero { field });
        }
        let overlaps = directory.nodal_flag(field)?;
        Ok(FieldAccessor { group, field, level, include_ghosts, overlaps })
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn include_ghosts(&self) -> bool {
        self.include_ghosts
    }

    /// 1 along nodal axes, 0 along cell-centred ones.
    pub fn nodal_flag(&self) -> &[i64] {
        &self.overlaps
    }

    /// Number of patches of the field held by the calling process.
    /// Not collective.
    pub fn len<D: PatchDirectory + ?Sized>(&self, directory: &D) -> Result<usize> {
        Ok(directory.lower_corners(self.field, self.level, self.include_ghosts)?.len())
    }

    /// Physical coordinates of the samples along one axis, `"x"`, `"y"`,
    /// `"z"` or `"r"`, starting from zero at the first interior sample.
    pub fn mesh<D: PatchDirectory + ?Sized>(&self, directory: &D, axis: &str) -> Result<Array1<Real>> {
        let (idir, celldir) = directory.geometry().axis(axis)?;
        let dd = directory.cell_size(self.level)?[celldir];
        let layout = directory.lower_corners(self.field, self.level, self.include_ghosts)?;
        let patches = directory.fetch(self.field, self.level, self.include_ghosts)?;

        let overlap = self.overlaps[idir];
        let ghost = if self.include_ghosts {layout.ghosts[idir]} else {0};
        let upper = layout.lower
            .iter()
            .zip(&patches)
            .map(|(lo, p)| lo[idir] + p.len_of(Axis(idir)) as i64 - overlap)
            .max();
        let local = upper.map_or(0, |hi| hi - ghost + overlap);

        let nn = self.group.all_reduce_max(&[local])[0].max(0) as usize;
        let shift = if overlap == 1 {0.0} else {0.5 * dd};

        debug!("mesh of {} along {}: {} points, spacing {:e}", self.field, axis, nn, dd);
        Ok(Array1::from_shape_fn(nn, |i| i as Real * dd + shift))
    }

    /// Assembles the global bounds from the local patches.
    ///
    /// The number of components is reduced together with the upper
    /// corners, so that a process without patches still agrees on it.
    fn bounds(&self, layout: &PatchLayout, shapes: &[&[usize]]) -> Result<Bounds> {
        let dim = self.overlaps.len();
        let mut lo = vec![i64::MAX; dim];
        let mut hi = vec![i64::MIN; dim + 1];

        for (lower, shape) in layout.lower.iter().zip(shapes) {
            for ax in 0..dim {
                lo[ax] = lo[ax].min(lower[ax]);
                hi[ax] = hi[ax].max(lower[ax] + shape[ax] as i64 - self.overlaps[ax]);
            }
            let ncomps = if shape.len() > dim {shape[dim]} else {1};
            hi[dim] = hi[dim].max(ncomps as i64);
        }

        let min = self.group.all_reduce_min(&lo);
        let max = self.group.all_reduce_max(&hi);

        if min.iter().zip(&max).any(|(a, b)| a > b) {
            return Err(AccessError::NoPatches { field: self.field, level: self.level });
        }

        Ok(Bounds {
            min,
            max: max[..dim].to_vec(),
            overlap: self.overlaps.clone(),
            ncomps: max[dim].max(1) as usize,
        })
    }

    /// Returns the samples covered by `selection`, gathered from every
    /// process. Axes addressed by a single index are dropped from the
    /// result, as is the component axis when one component is selected.
    pub fn read<D: PatchDirectory + ?Sized>(&self, directory: &D, selection: &Selection) -> Result<ArrayD<Real>> {
        let layout = directory.lower_corners(self.field, self.level, self.include_ghosts)?;
        let patches = directory.fetch(self.field, self.level, self.include_ghosts)?;
        let shapes: Vec<&[usize]> = patches.iter().map(|p| p.shape()).collect();

        let bounds = self.bounds(&layout, &shapes)?;
        let request = Request::resolve(selection, &bounds)?;
        let dim = request.start.len();

        let local: Vec<Fragment> = patches
            .iter()
            .zip(&layout.lower)
            .filter_map(|(patch, lower)| {
                let overlap = request.intersect(lower, patch.shape())?;
                let mut block = patch.view();
                window(&mut block, &overlap.local, &overlap.extent);
                if let Some(c) = request.component {
                    block = block.index_axis_move(Axis(dim), c);
                }
                Some(Fragment {
                    offset: overlap.dest.iter().map(|&d| d as usize).collect(),
                    data: block.to_owned(),
                })
            })
            .collect();

        let mut result = ArrayD::zeros(IxDyn(&request.buffer_shape()));
        let mut count = 0;

        for fragment in self.group.all_gather(local)?.into_iter().flatten() {
            let offset: Vec<i64> = fragment.offset.iter().map(|&o| o as i64).collect();
            let extent: Vec<i64> = fragment.data.shape()[..dim].iter().map(|&n| n as i64).collect();
            let mut target = result.view_mut();
            window(&mut target, &offset, &extent);
            target.assign(&fragment.data);
            count += 1;
        }

        debug!(
            "read {} at level {}: {} fragments into {:?}",
            self.field, self.level, count, request.buffer_shape()
        );
        Ok(request.squeeze(result))
    }

    /// Stores `value` into the samples covered by `selection`. Each
    /// process writes only into the patches it owns.
    ///
    /// Where patches overlap, such as the shared faces of nodal patches,
    /// every copy of a sample is written.
    pub fn write<D: PatchDirectory + ?Sized>(&self, directory: &mut D, selection: &Selection, value: Value<'_>) -> Result<()> {
        let layout = directory.lower_corners(self.field, self.level, self.include_ghosts)?;
        let shapes: Vec<Vec<usize>> = directory
            .fetch(self.field, self.level, self.include_ghosts)?
            .iter()
            .map(|p| p.shape().to_vec())
            .collect();
        let shape_refs: Vec<&[usize]> = shapes.iter().map(|s| &s[..]).collect();

        let bounds = self.bounds(&layout, &shape_refs)?;
        let request = Request::resolve(selection, &bounds)?;
        let dim = request.start.len();
        let expected = request.buffer_shape();

        let scalar;
        let given = match &value {
            Value::Scalar(v) => {
                scalar = ArrayD::from_elem(IxDyn(&[]), *v);
                scalar.view()
            },
            Value::Array(a) => request.unsqueeze(a.view()),
        };
        let source = given.broadcast(IxDyn(&expected)).ok_or_else(|| AccessError::ShapeMismatch {
            given: given.shape().to_vec(),
            expected: expected.clone(),
        })?;

        let mut written = 0;
        for (mut patch, lower) in directory
            .fetch_mut(self.field, self.level, self.include_ghosts)?
            .into_iter()
            .zip(&layout.lower)
        {
            let overlap = match request.intersect(lower, patch.shape()) {
                Some(o) => o,
                None => continue,
            };
            window(&mut patch, &overlap.local, &overlap.extent);
            if let Some(c) = request.component {
                patch = patch.index_axis_move(Axis(dim), c);
            }
            let mut src = source.view();
            window(&mut src, &overlap.dest, &overlap.extent);
            patch.assign(&src);
            written += 1;
        }

        debug!("wrote {} at level {} into {} local patches", self.field, self.level, written);
        Ok(())
    }
}
