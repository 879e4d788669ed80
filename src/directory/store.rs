use std::collections::HashMap;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Dimension, IxDyn, Slice};
use rayon::prelude::*;
use tracing::debug;

use crate::directory::{PatchDirectory, PatchLayout};
use crate::error::{AccessError, Result};
use crate::field::{FieldId, PatchVariant};
use crate::geometry::Geometry;
use crate::group::WorkerGroup;
use crate::Real;

/// Specifies how the simulation domain is laid out and split into
/// patches, without allocating any field data.
///
/// Level 0 covers cells `0..n_cell` along each axis. Each entry of
/// `refinements` adds a level covering `lo..hi` (in level-0 cells),
/// refined by a further factor of `ratio`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDesign {
    pub geometry: Geometry,
    pub n_cell: Vec<usize>,
    pub lower: Vec<Real>,
    pub upper: Vec<Real>,
    pub max_grid_size: usize,
    pub ghost_cells: usize,
    pub ratio: usize,
    pub refinements: Vec<(Vec<i64>, Vec<i64>)>,
    pub pml_cells: usize,
    pub pml_cleaning: bool,
}

/// A rectangular range of cells, `lo..lo+n` along each axis.
#[derive(Debug, Clone, PartialEq)]
struct Block {
    lo: Vec<i64>,
    n: Vec<i64>,
}

struct Patch {
    lo: Vec<i64>,
    data: ArrayD<Real>,
}

/// All the patches of one field on one level that belong to this process.
struct MultiPatch {
    ghosts: Vec<i64>,
    patches: Vec<Patch>,
}

/// In-memory patch directory. Every field of every level is split into
/// the same set of boxes, dealt out round-robin over the worker group;
/// each process only allocates the boxes it owns.
pub struct PatchStore {
    design: StoreDesign,
    rank: usize,
    size: usize,
    fields: HashMap<(FieldId, usize), MultiPatch>,
}

impl StoreDesign {
    /// Unit cells, a single level, no ghost cells and no PML.
    pub fn new(geometry: Geometry, n_cell: Vec<usize>) -> Self {
        let upper = n_cell.iter().map(|&n| n as Real).collect();
        StoreDesign {
            geometry,
            lower: vec![0.0; n_cell.len()],
            upper,
            n_cell,
            max_grid_size: 32,
            ghost_cells: 0,
            ratio: 2,
            refinements: Vec::new(),
            pml_cells: 0,
            pml_cleaning: false,
        }
    }

    pub fn with_bounds(mut self, lower: Vec<Real>, upper: Vec<Real>) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn with_max_grid_size(mut self, max_grid_size: usize) -> Self {
        self.max_grid_size = max_grid_size;
        self
    }

    pub fn with_ghost_cells(mut self, ghost_cells: usize) -> Self {
        self.ghost_cells = ghost_cells;
        self
    }

    pub fn with_ratio(mut self, ratio: usize) -> Self {
        self.ratio = ratio;
        self
    }

    /// Adds a refined level over `lo..hi`, given in level-0 cells.
    pub fn with_refinement(mut self, lo: Vec<i64>, hi: Vec<i64>) -> Self {
        self.refinements.push((lo, hi));
        self
    }

    pub fn with_pml(mut self, pml_cells: usize, pml_cleaning: bool) -> Self {
        self.pml_cells = pml_cells;
        self.pml_cleaning = pml_cleaning;
        self
    }

    pub fn levels(&self) -> usize {
        1 + self.refinements.len()
    }

    fn validate(&self) -> Result<()> {
        let dim = self.geometry.dim();
        let invalid = |msg: String| Err(AccessError::InvalidDesign(msg));

        if self.n_cell.len() != dim || self.lower.len() != dim || self.upper.len() != dim {
            return invalid(format!("{} geometry needs {} values for n_cell, lower and upper", self.geometry, dim));
        }
        if self.n_cell.iter().any(|&n| n == 0) {
            return invalid("n_cell must be positive".to_owned());
        }
        if self.lower.iter().zip(&self.upper).any(|(lo, hi)| hi <= lo) {
            return invalid("upper bound must exceed lower bound".to_owned());
        }
        if self.max_grid_size == 0 || self.ratio == 0 {
            return invalid("max_grid_size and ratio must be positive".to_owned());
        }
        for (lo, hi) in &self.refinements {
            if lo.len() != dim || hi.len() != dim {
                return invalid(format!("refined region needs {} values for lo and hi", dim));
            }
            let inside = lo.iter().zip(hi).zip(&self.n_cell)
                .all(|((&lo, &hi), &n)| 0 <= lo && lo < hi && hi <= n as i64);
            if !inside {
                return invalid(format!("refined region {:?}..{:?} lies outside the domain", lo, hi));
            }
        }
        Ok(())
    }

    /// The region covered by the fine patch of `level`, in that level's cells.
    fn level_domain(&self, level: usize) -> Block {
        if level == 0 {
            return Block {
                lo: vec![0; self.n_cell.len()],
                n: self.n_cell.iter().map(|&n| n as i64).collect(),
            };
        }
        let (lo, hi) = &self.refinements[level - 1];
        Block::scaled(lo, hi, (self.ratio as i64).pow(level as u32))
    }

    /// The region under the refined patch of `level`, at the resolution
    /// of the level below.
    fn coarse_domain(&self, level: usize) -> Block {
        let (lo, hi) = &self.refinements[level - 1];
        Block::scaled(lo, hi, (self.ratio as i64).pow(level as u32 - 1))
    }

    /// Boxes, over all processes, that hold a field variant on a level.
    fn blocks(&self, variant: PatchVariant, level: usize) -> Vec<Block> {
        let max = self.max_grid_size as i64;
        let t = self.pml_cells as i64;
        match variant {
            PatchVariant::Aux | PatchVariant::Fine => self.level_domain(level).chop(max),
            PatchVariant::Coarse => self.coarse_domain(level).chop(max),
            PatchVariant::FinePml => self.level_domain(level).shell(t).iter().flat_map(|b| b.chop(max)).collect(),
            PatchVariant::CoarsePml => self.coarse_domain(level).shell(t).iter().flat_map(|b| b.chop(max)).collect(),
        }
    }

    fn cell_width(&self, level: usize, axis: usize) -> Real {
        let refine = (self.ratio as Real).powi(level as i32);
        (self.upper[axis] - self.lower[axis]) / (self.n_cell[axis] as Real) / refine
    }

    /// Physical coordinate of sample `index` along `axis` on `level`,
    /// at a node or at a cell centre.
    pub fn position(&self, level: usize, axis: usize, index: i64, nodal: bool) -> Real {
        let shift = if nodal {0.0} else {0.5};
        self.lower[axis] + (index as Real + shift) * self.cell_width(level, axis)
    }
}

/// Splits `n` cells starting at `lo` into near-equal chunks of at most `max`.
fn split(lo: i64, n: i64, max: i64) -> Vec<(i64, i64)> {
    if n <= 0 {
        return Vec::new();
    }
    let nchunks = (n + max - 1) / max;
    let base = n / nchunks;
    let rem = n % nchunks;
    (0..nchunks)
        .map(|k| base + if k < rem {1} else {0})
        .scan(lo, |rt, len| {
            let start = *rt;
            *rt += len;
            Some((start, len))
        })
        .collect()
}

impl Block {
    fn scaled(lo: &[i64], hi: &[i64], factor: i64) -> Block {
        Block {
            lo: lo.iter().map(|&l| l * factor).collect(),
            n: lo.iter().zip(hi).map(|(&l, &h)| (h - l) * factor).collect(),
        }
    }

    fn chop(&self, max: i64) -> Vec<Block> {
        let mut blocks = vec![Block { lo: Vec::new(), n: Vec::new() }];
        for (&lo, &n) in self.lo.iter().zip(&self.n) {
            let pieces = split(lo, n, max);
            blocks = blocks
                .into_iter()
                .flat_map(|b| {
                    pieces.iter().map(move |&(lo, n)| {
                        let mut b = b.clone();
                        b.lo.push(lo);
                        b.n.push(n);
                        b
                    })
                })
                .collect();
        }
        blocks
    }

    /// Slabs of thickness `t` that tile the layer around this block.
    /// Along axis `a`, the slabs span the block's own extent on lower
    /// axes and the grown extent on higher axes, so that no cell of the
    /// layer is covered twice.
    fn shell(&self, t: i64) -> Vec<Block> {
        let dim = self.lo.len();
        let mut slabs = Vec::with_capacity(2 * dim);
        if t <= 0 {
            return slabs;
        }
        for a in 0..dim {
            for &upper_side in &[false, true] {
                let mut slab = Block { lo: Vec::with_capacity(dim), n: Vec::with_capacity(dim) };
                for b in 0..dim {
                    if b < a {
                        slab.lo.push(self.lo[b]);
                        slab.n.push(self.n[b]);
                    } else if b == a {
                        slab.lo.push(if upper_side {self.lo[a] + self.n[a]} else {self.lo[a] - t});
                        slab.n.push(t);
                    } else {
                        slab.lo.push(self.lo[b] - t);
                        slab.n.push(self.n[b] + 2 * t);
                    }
                }
                slabs.push(slab);
            }
        }
        slabs
    }
}

impl MultiPatch {
    fn allocate(blocks: Vec<Block>, nodal: &[i64], ghosts: i64, ncomp: usize) -> MultiPatch {
        let patches = blocks
            .into_iter()
            .map(|b| {
                let mut shape: Vec<usize> = b.n.iter()
                    .zip(nodal)
                    .map(|(&n, &o)| (n + o + 2 * ghosts) as usize)
                    .collect();
                if ncomp > 1 {
                    shape.push(ncomp);
                }
                Patch { lo: b.lo, data: ArrayD::zeros(IxDyn(&shape)) }
            })
            .collect();
        MultiPatch {
            ghosts: vec![ghosts; nodal.len()],
            patches,
        }
    }
}

impl PatchStore {
    /// Allocates, zero-initialized, every field of every level, keeping
    /// only the boxes that `group` assigns to the calling process.
    pub fn new(design: StoreDesign, group: &impl WorkerGroup) -> Result<Self> {
        design.validate()?;

        let rank = group.rank();
        let size = group.size();
        let geometry = design.geometry;
        let ghosts = design.ghost_cells as i64;
        let mut fields = HashMap::new();

        for level in 0..design.levels() {
            for &variant in PatchVariant::all().iter() {
                if (variant.is_coarse() && level == 0) || (variant.is_pml() && design.pml_cells == 0) {
                    continue;
                }

                let blocks = design.blocks(variant, level);
                let total = blocks.len();
                let owned: Vec<Block> = blocks
                    .into_iter()
                    .enumerate()
                    .filter(|(k, _)| k % size == rank)
                    .map(|(_, b)| b)
                    .collect();

                debug!(
                    "rank {} owns {} of {} {} boxes on level {}",
                    rank, owned.len(), total, variant, level
                );

                for field in FieldId::all().into_iter().filter(|f| f.variant() == variant) {
                    let nodal = field.nodal_flag(geometry);
                    let ncomp = field.components(design.pml_cleaning);
                    let mp = MultiPatch::allocate(owned.clone(), &nodal, ghosts, ncomp);
                    fields.insert((field, level), mp);
                }
            }
        }

        Ok(PatchStore { design, rank, size, fields })
    }

    pub fn design(&self) -> &StoreDesign {
        &self.design
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of processes the boxes were dealt out to.
    pub fn ngroups(&self) -> usize {
        self.size
    }

    /// Every (field, level) pair held by the store.
    pub fn fields(&self) -> Vec<(FieldId, usize)> {
        (0..self.design.levels())
            .flat_map(|level| FieldId::all().into_iter().map(move |f| (f, level)))
            .filter(|key| self.fields.contains_key(key))
            .collect()
    }

    pub fn contains(&self, field: FieldId, level: usize) -> bool {
        self.fields.contains_key(&(field, level))
    }

    /// Sets every local sample of a field, ghost cells included, to
    /// `f(global_index, component)`.
    pub fn fill_with<F>(&mut self, field: FieldId, level: usize, mut f: F) -> Result<()>
    where
        F: FnMut(&[i64], usize) -> Real,
    {
        let dim = self.design.geometry.dim();
        let mp = self.multipatch_mut(field, level)?;
        let ghosts = mp.ghosts.clone();

        for patch in mp.patches.iter_mut() {
            let origin: Vec<i64> = patch.lo.iter().zip(&ghosts).map(|(l, g)| l - g).collect();
            let mut index = vec![0i64; dim];
            for (idx, v) in patch.data.indexed_iter_mut() {
                for ax in 0..dim {
                    index[ax] = origin[ax] + idx[ax] as i64;
                }
                let comp = if idx.ndim() > dim {idx[dim]} else {0};
                *v = f(&index, comp);
            }
        }
        Ok(())
    }

    /// Sets every local sample of a field to `value`.
    pub fn set_value(&mut self, field: FieldId, level: usize, value: Real) -> Result<()> {
        let mp = self.multipatch_mut(field, level)?;
        mp.patches.par_iter_mut().for_each(|p| p.data.fill(value));
        Ok(())
    }

    fn multipatch(&self, field: FieldId, level: usize) -> Result<&MultiPatch> {
        self.fields
            .get(&(field, level))
            .ok_or(AccessError::UnknownField { field, level })
    }

    fn multipatch_mut(&mut self, field: FieldId, level: usize) -> Result<&mut MultiPatch> {
        self.fields
            .get_mut(&(field, level))
            .ok_or(AccessError::UnknownField { field, level })
    }
}

impl PatchDirectory for PatchStore {
    fn geometry(&self) -> Geometry {
        self.design.geometry
    }

    fn cell_size(&self, level: usize) -> Result<[Real; 3]> {
        if level >= self.design.levels() {
            return Err(AccessError::InvalidDesign(format!("no refinement level {}", level)));
        }
        let mut dd = [0.0; 3];
        for (idir, label) in self.design.geometry.axis_labels().iter().enumerate() {
            let (_, celldir) = self.design.geometry.axis(label)?;
            dd[celldir] = self.design.cell_width(level, idir);
        }
        Ok(dd)
    }

    fn nodal_flag(&self, field: FieldId) -> Result<Vec<i64>> {
        Ok(field.nodal_flag(self.design.geometry))
    }

    fn lower_corners(&self, field: FieldId, level: usize, include_ghosts: bool) -> Result<PatchLayout> {
        let mp = self.multipatch(field, level)?;
        let lower = mp.patches
            .iter()
            .map(|p| {
                if include_ghosts {
                    p.lo.iter().zip(&mp.ghosts).map(|(l, g)| l - g).collect()
                } else {
                    p.lo.clone()
                }
            })
            .collect();
        Ok(PatchLayout { lower, ghosts: mp.ghosts.clone() })
    }

    fn fetch(&self, field: FieldId, level: usize, include_ghosts: bool) -> Result<Vec<ArrayViewD<'_, Real>>> {
        let mp = self.multipatch(field, level)?;
        let ghosts = &mp.ghosts;
        let views = mp.patches
            .iter()
            .map(|p| {
                let mut view = p.data.view();
                if !include_ghosts {
                    for (ax, &g) in ghosts.iter().enumerate() {
                        let len = view.len_of(Axis(ax)) as isize;
                        view.slice_axis_inplace(Axis(ax), Slice::from(g as isize..len - g as isize));
                    }
                }
                view
            })
            .collect();
        Ok(views)
    }

    fn fetch_mut(&mut self, field: FieldId, level: usize, include_ghosts: bool) -> Result<Vec<ArrayViewMutD<'_, Real>>> {
        let mp = self.multipatch_mut(field, level)?;
        let ghosts = mp.ghosts.clone();
        let views = mp.patches
            .iter_mut()
            .map(|p| {
                let mut view = p.data.view_mut();
                if !include_ghosts {
                    for (ax, &g) in ghosts.iter().enumerate() {
                        let len = view.len_of(Axis(ax)) as isize;
                        view.slice_axis_inplace(Axis(ax), Slice::from(g as isize..len - g as isize));
                    }
                }
                view
            })
            .collect();
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Component, FieldKind};
    use crate::group::SingleProcess;

    struct Ranked(usize, usize);

    impl WorkerGroup for Ranked {
        fn rank(&self) -> usize { self.0 }
        fn size(&self) -> usize { self.1 }
        fn all_reduce_min(&self, local: &[i64]) -> Vec<i64> { local.to_vec() }
        fn all_reduce_max(&self, local: &[i64]) -> Vec<i64> { local.to_vec() }
        fn all_gather(&self, local: Vec<crate::group::Fragment>) -> Result<Vec<Vec<crate::group::Fragment>>> { Ok(vec![local]) }
    }

    fn cells(b: &Block) -> i64 {
        b.n.iter().product()
    }

    #[test]
    fn split_is_balanced() {
        assert_eq!(split(0, 10, 4), vec![(0, 4), (4, 3), (7, 3)]);
        assert_eq!(split(-2, 4, 4), vec![(-2, 4)]);
        assert!(split(0, 0, 4).is_empty());
    }

    #[test]
    fn chop_tiles_the_block() {
        let block = Block { lo: vec![0, 0, 0], n: vec![10, 7, 3] };
        let boxes = block.chop(4);
        assert_eq!(boxes.len(), 3 * 2 * 1);
        assert_eq!(boxes.iter().map(cells).sum::<i64>(), 210);
        assert!(boxes.iter().all(|b| b.n.iter().all(|&n| n <= 4)));
    }

    #[test]
    fn shell_surrounds_the_block() {
        let block = Block { lo: vec![0, 0], n: vec![6, 4] };
        let slabs = block.shell(2);
        assert_eq!(slabs.len(), 4);
        // (6 + 4) * (4 + 4) minus the interior
        assert_eq!(slabs.iter().map(cells).sum::<i64>(), 10 * 8 - 24);
        assert_eq!(slabs[0], Block { lo: vec![-2, -2], n: vec![2, 8] });
        assert_eq!(slabs[3], Block { lo: vec![0, 4], n: vec![6, 2] });
    }

    #[test]
    fn round_robin_ownership() {
        let design = StoreDesign::new(Geometry::OneD, vec![12]).with_max_grid_size(4);
        let ez = FieldId::vector(FieldKind::E, Component::Z, PatchVariant::Fine).unwrap();
        let even = PatchStore::new(design.clone(), &Ranked(0, 2)).unwrap();
        let odd = PatchStore::new(design, &Ranked(1, 2)).unwrap();
        let lo_even = even.lower_corners(ez, 0, false).unwrap();
        let lo_odd = odd.lower_corners(ez, 0, false).unwrap();
        assert_eq!(lo_even.lower, vec![vec![0], vec![8]]);
        assert_eq!(lo_odd.lower, vec![vec![4]]);
    }

    #[test]
    fn ghost_views() {
        let design = StoreDesign::new(Geometry::TwoD, vec![4, 4]).with_ghost_cells(2);
        let mut store = PatchStore::new(design, &SingleProcess).unwrap();
        let rho = FieldId::scalar(FieldKind::Rho, PatchVariant::Fine).unwrap();
        store.set_value(rho, 0, 1.0).unwrap();

        let with = store.lower_corners(rho, 0, true).unwrap();
        assert_eq!(with.lower, vec![vec![-2, -2]]);
        assert_eq!(with.ghosts, vec![2, 2]);
        assert_eq!(store.fetch(rho, 0, true).unwrap()[0].shape(), &[9, 9]);
        assert_eq!(store.fetch(rho, 0, false).unwrap()[0].shape(), &[5, 5]);
    }

    #[test]
    fn fill_sees_global_indices() {
        let design = StoreDesign::new(Geometry::OneD, vec![8]).with_max_grid_size(4).with_ghost_cells(1);
        let mut store = PatchStore::new(design, &SingleProcess).unwrap();
        let g = FieldId::scalar(FieldKind::G, PatchVariant::Fine).unwrap();
        store.fill_with(g, 0, |i, _| i[0] as Real).unwrap();
        let views = store.fetch(g, 0, true).unwrap();
        assert_eq!(views[1].iter().cloned().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn refined_and_pml_levels() {
        let design = StoreDesign::new(Geometry::TwoD, vec![16, 16])
            .with_refinement(vec![4, 4], vec![8, 12])
            .with_pml(2, false);
        let store = PatchStore::new(design, &SingleProcess).unwrap();

        let ex = |v| FieldId::vector(FieldKind::E, Component::X, v).unwrap();
        assert!(!store.contains(ex(PatchVariant::Coarse), 0));
        assert!(store.contains(ex(PatchVariant::Coarse), 1));
        assert!(store.contains(ex(PatchVariant::CoarsePml), 1));
        // level 0 lacks the 12 coarse and 11 coarse PML fields
        assert_eq!(store.fields().len(), 2 * FieldId::all().len() - 23);

        let fine = store.lower_corners(ex(PatchVariant::Fine), 1, false).unwrap();
        assert_eq!(fine.lower, vec![vec![8, 8]]);
        let coarse = store.lower_corners(ex(PatchVariant::Coarse), 1, false).unwrap();
        assert_eq!(coarse.lower, vec![vec![4, 4]]);

        let pml = store.fetch(ex(PatchVariant::FinePml), 0, false).unwrap();
        assert_eq!(pml.len(), 4);
        assert!(pml.iter().all(|p| p.ndim() == 3 && p.shape()[2] == 2));

        assert_eq!(store.cell_size(1).unwrap(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn positions_follow_centering() {
        let design = StoreDesign::new(Geometry::OneD, vec![10]).with_bounds(vec![-1.0], vec![1.0]);
        assert_eq!(design.position(0, 0, 0, true), -1.0);
        assert!((design.position(0, 0, 0, false) - -0.9).abs() < 1.0e-12);
        assert!((design.position(0, 0, 10, true) - 1.0).abs() < 1.0e-12);
    }

    #[test]
    fn rejects_bad_designs() {
        let bad = StoreDesign::new(Geometry::ThreeD, vec![4, 4]);
        assert!(PatchStore::new(bad, &SingleProcess).is_err());
        let outside = StoreDesign::new(Geometry::OneD, vec![4]).with_refinement(vec![2], vec![6]);
        assert!(PatchStore::new(outside, &SingleProcess).is_err());
    }
}
