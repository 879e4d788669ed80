//! Collective operations across the worker group that shares the mesh.
//!
//! Every method here is collective: all processes of the group must call
//! it, in the same order, or the group deadlocks.

use ndarray::ArrayD;

use crate::error::Result;
use crate::Real;

#[cfg(feature = "with-mpi")]
mod mpi_group;
#[cfg(feature = "with-mpi")]
pub use self::mpi_group::MpiGroup;

/// A dense block of field data together with the position, in the
/// coordinates of the destination buffer, of its lowest corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub offset: Vec<usize>,
    pub data: ArrayD<Real>,
}

/// The set of processes among which the patches are distributed.
pub trait WorkerGroup {
    /// Rank of the calling process, `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Element-wise minimum over all processes.
    fn all_reduce_min(&self, local: &[i64]) -> Vec<i64>;

    /// Element-wise maximum over all processes.
    fn all_reduce_max(&self, local: &[i64]) -> Vec<i64>;

    /// Collects every process's fragments, in rank order, on every process.
    fn all_gather(&self, local: Vec<Fragment>) -> Result<Vec<Vec<Fragment>>>;
}

/// A group of one. All collectives return their input.
#[derive(Debug, Default, Copy, Clone)]
pub struct SingleProcess;

impl WorkerGroup for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_min(&self, local: &[i64]) -> Vec<i64> {
        local.to_vec()
    }

    fn all_reduce_max(&self, local: &[i64]) -> Vec<i64> {
        local.to_vec()
    }

    fn all_gather(&self, local: Vec<Fragment>) -> Result<Vec<Vec<Fragment>>> {
        Ok(vec![local])
    }
}

impl<G: WorkerGroup + ?Sized> WorkerGroup for &G {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn all_reduce_min(&self, local: &[i64]) -> Vec<i64> {
        (**self).all_reduce_min(local)
    }

    fn all_reduce_max(&self, local: &[i64]) -> Vec<i64> {
        (**self).all_reduce_max(local)
    }

    fn all_gather(&self, local: Vec<Fragment>) -> Result<Vec<Vec<Fragment>>> {
        (**self).all_gather(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn single_process_reductions_are_identity() {
        let group = SingleProcess;
        assert_eq!(group.rank(), 0);
        assert_eq!(group.size(), 1);
        assert_eq!(group.all_reduce_min(&[3, -2]), vec![3, -2]);
        assert_eq!(group.all_reduce_max(&[i64::MIN]), vec![i64::MIN]);
    }

    #[test]
    fn single_process_gather_wraps_local() {
        let group = SingleProcess;
        let frag = Fragment {
            offset: vec![1, 0],
            data: ArrayD::from_elem(IxDyn(&[2, 2]), 4.0),
        };
        let all = group.all_gather(vec![frag.clone()]).unwrap();
        assert_eq!(all, vec![vec![frag]]);
    }
}
