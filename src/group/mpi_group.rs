use mpi::collective::SystemOperation;
use mpi::datatype::{PartitionMut, UserDatatype};
use mpi::traits::*;
use mpi::Count;
use memoffset::*;
use ndarray::{ArrayD, IxDyn};

use crate::error::{AccessError, Result};
use crate::group::{Fragment, WorkerGroup};
use crate::Real;

/// Up to three spatial axes plus a trailing component axis.
const MAX_RANK: usize = 4;

/// Fixed-size description of a fragment, sent ahead of the flattened data.
#[derive(Copy, Clone, Default)]
#[repr(C)]
struct FragmentHeader {
    noffset: i64,
    ndim: i64,
    offset: [i64; MAX_RANK],
    shape: [i64; MAX_RANK],
}

impl FragmentHeader {
    fn describe(fragment: &Fragment) -> Result<Self> {
        if fragment.offset.len() > MAX_RANK || fragment.data.ndim() > MAX_RANK {
            return Err(AccessError::Communication(format!(
                "fragment of rank {} exceeds the {} axes a header can describe",
                fragment.data.ndim().max(fragment.offset.len()),
                MAX_RANK
            )));
        }
        let mut header = FragmentHeader {
            noffset: fragment.offset.len() as i64,
            ndim: fragment.data.ndim() as i64,
            ..Default::default()
        };
        for (h, &o) in header.offset.iter_mut().zip(&fragment.offset) {
            *h = o as i64;
        }
        for (h, &n) in header.shape.iter_mut().zip(fragment.data.shape()) {
            *h = n as i64;
        }
        Ok(header)
    }

    fn offset(&self) -> Result<Vec<usize>> {
        Ok(self.offset[..checked_len(self.noffset)?].iter().map(|&o| o as usize).collect())
    }

    fn shape(&self) -> Result<Vec<usize>> {
        Ok(self.shape[..checked_len(self.ndim)?].iter().map(|&n| n as usize).collect())
    }
}

fn checked_len(n: i64) -> Result<usize> {
    if (0..=MAX_RANK as i64).contains(&n) {
        Ok(n as usize)
    } else {
        Err(AccessError::Communication(format!("corrupt fragment header, {} axes", n)))
    }
}

/// Splits the gathered headers and flattened data back into each
/// process's fragments. `header_counts` and `data_counts` hold, per
/// rank, how many headers and samples it contributed.
fn reassemble(
    header_counts: &[Count],
    data_counts: &[Count],
    headers: &[FragmentHeader],
    data: &[Real],
) -> Result<Vec<Vec<Fragment>>> {
    let corrupt = |what: &str| AccessError::Communication(format!("gathered {} do not match their counts", what));

    let mut gathered = Vec::with_capacity(header_counts.len());
    let mut h = 0;
    let mut d = 0;

    for (&nh, &nd) in header_counts.iter().zip(data_counts) {
        let rank_headers = headers.get(h..h + nh as usize).ok_or_else(|| corrupt("headers"))?;
        let end = d + nd as usize;
        let mut fragments = Vec::with_capacity(rank_headers.len());
        for header in rank_headers {
            let shape = header.shape()?;
            let len: usize = shape.iter().product();
            if d + len > end {
                return Err(corrupt("samples"));
            }
            let samples = data.get(d..d + len).ok_or_else(|| corrupt("samples"))?;
            let array = ArrayD::from_shape_vec(IxDyn(&shape), samples.to_vec())
                .map_err(|e| AccessError::Communication(e.to_string()))?;
            fragments.push(Fragment { offset: header.offset()?, data: array });
            d += len;
        }
        if d != end {
            return Err(corrupt("samples"));
        }
        h += nh as usize;
        gathered.push(fragments);
    }

    Ok(gathered)
}

unsafe impl Equivalence for FragmentHeader {
    type Out = UserDatatype;
    fn equivalent_datatype() -> Self::Out {
        let blocklengths = [1, 1, MAX_RANK as Count, MAX_RANK as Count];
        let displacements = [
            offset_of!(FragmentHeader, noffset) as mpi::Address,
            offset_of!(FragmentHeader, ndim) as mpi::Address,
            offset_of!(FragmentHeader, offset) as mpi::Address,
            offset_of!(FragmentHeader, shape) as mpi::Address,
        ];
        let mpi_long = i64::equivalent_datatype();
        let types: [&dyn Datatype; 4] = [&mpi_long; 4];
        UserDatatype::structured(4, &blocklengths, &displacements, &types)
    }
}

/// Worker group backed by an MPI communicator.
pub struct MpiGroup<C: Communicator> {
    comm: C,
}

impl<C: Communicator> MpiGroup<C> {
    pub fn new(comm: C) -> Self {
        MpiGroup { comm }
    }

    /// Every process's value of `n`, in rank order.
    fn exchange_count(&self, n: usize) -> Vec<Count> {
        let n = n as Count;
        let mut counts = vec![0 as Count; self.size()];
        self.comm.all_gather_into(&n, &mut counts[..]);
        counts
    }

    fn gather_varcount<T: Equivalence + Clone>(&self, local: &[T], counts: &[Count], fill: T) -> Vec<T> {
        let displs: Vec<Count> = counts
            .iter()
            .scan(0, |rt, &n| {
                let displ = *rt;
                *rt += n;
                Some(displ)
            })
            .collect();
        let total = counts.iter().sum::<Count>() as usize;
        let mut recv = vec![fill; total];
        {
            let mut partition = PartitionMut::new(&mut recv[..], counts, &displs[..]);
            self.comm.all_gather_varcount_into(local, &mut partition);
        }
        recv
    }
}

impl<C: Communicator> WorkerGroup for MpiGroup<C> {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_reduce_min(&self, local: &[i64]) -> Vec<i64> {
        if self.size() == 1 {
            return local.to_vec();
        }
        let mut global = vec![0i64; local.len()];
        self.comm.all_reduce_into(local, &mut global[..], SystemOperation::min());
        global
    }

    fn all_reduce_max(&self, local: &[i64]) -> Vec<i64> {
        if self.size() == 1 {
            return local.to_vec();
        }
        let mut global = vec![0i64; local.len()];
        self.comm.all_reduce_into(local, &mut global[..], SystemOperation::max());
        global
    }

    fn all_gather(&self, local: Vec<Fragment>) -> Result<Vec<Vec<Fragment>>> {
        if self.size() == 1 {
            return Ok(vec![local]);
        }

        let headers = local.iter().map(FragmentHeader::describe).collect::<Result<Vec<_>>>()?;
        let data: Vec<Real> = local.iter().flat_map(|f| f.data.iter().cloned()).collect();

        let header_counts = self.exchange_count(headers.len());
        let data_counts = self.exchange_count(data.len());
        let all_headers = self.gather_varcount(&headers, &header_counts, FragmentHeader::default());
        let all_data = self.gather_varcount(&data, &data_counts, 0.0);

        reassemble(&header_counts, &data_counts, &all_headers, &all_data)
    }
}
