//! Global index specifiers and their resolution against the extent of a field

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use ndarray::{ArrayBase, ArrayD, ArrayViewD, Axis, IxDyn, RawData, Slice};

use crate::error::{AccessError, Result};
use crate::Real;

/// How one axis is addressed: a single global index, which removes the
/// axis from the result, or a half-open range whose missing ends default
/// to the edges of the global domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    At(i64),
    Range(Option<i64>, Option<i64>),
}

/// The index terms of one access. `All` selects every axis in full
/// (and every component).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Terms(Vec<IndexSpec>),
}

impl IndexSpec {
    pub fn at(i: i64) -> Self {
        IndexSpec::At(i)
    }

    pub fn range(start: i64, stop: i64) -> Self {
        IndexSpec::Range(Some(start), Some(stop))
    }

    pub fn full() -> Self {
        IndexSpec::Range(None, None)
    }

    pub fn from_start(start: i64) -> Self {
        IndexSpec::Range(Some(start), None)
    }

    pub fn up_to(stop: i64) -> Self {
        IndexSpec::Range(None, Some(stop))
    }
}

impl From<i64> for IndexSpec {
    fn from(i: i64) -> Self {
        IndexSpec::At(i)
    }
}

impl From<Range<i64>> for IndexSpec {
    fn from(r: Range<i64>) -> Self {
        IndexSpec::Range(Some(r.start), Some(r.end))
    }
}

impl From<RangeFrom<i64>> for IndexSpec {
    fn from(r: RangeFrom<i64>) -> Self {
        IndexSpec::Range(Some(r.start), None)
    }
}

impl From<RangeTo<i64>> for IndexSpec {
    fn from(r: RangeTo<i64>) -> Self {
        IndexSpec::Range(None, Some(r.end))
    }
}

impl From<RangeFull> for IndexSpec {
    fn from(_: RangeFull) -> Self {
        IndexSpec::Range(None, None)
    }
}

impl From<Vec<IndexSpec>> for Selection {
    fn from(terms: Vec<IndexSpec>) -> Self {
        Selection::Terms(terms)
    }
}

impl From<&[IndexSpec]> for Selection {
    fn from(terms: &[IndexSpec]) -> Self {
        Selection::Terms(terms.to_vec())
    }
}

/// Global extent of a field over the whole worker group.
///
/// `max` is the highest upper corner, i.e. the last cell, or the last node
/// but one on nodal axes; valid indices run up to `max + overlap`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Bounds {
    pub min: Vec<i64>,
    pub max: Vec<i64>,
    pub overlap: Vec<i64>,
    pub ncomps: usize,
}

/// A selection checked against the bounds of a field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Request {
    pub start: Vec<i64>,
    pub stop: Vec<i64>,
    pub collapse: Vec<bool>,
    pub component: Option<usize>,
    pub ncomps: usize,
}

/// Where a patch and a request meet: the offset of the common block in
/// the patch and in the request, and its extent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Overlap {
    pub local: Vec<i64>,
    pub dest: Vec<i64>,
    pub extent: Vec<i64>,
}

/// Restricts the leading axes of an array to `start..start+extent`.
pub(crate) fn window<S: RawData>(a: &mut ArrayBase<S, IxDyn>, start: &[i64], extent: &[i64]) {
    for (ax, (&s, &n)) in start.iter().zip(extent).enumerate() {
        a.slice_axis_inplace(Axis(ax), Slice::from(s as isize..(s + n) as isize));
    }
}

impl Request {
    pub fn resolve(selection: &Selection, bounds: &Bounds) -> Result<Request> {
        let dim = bounds.min.len();
        let ncomps = bounds.ncomps;
        let terms = match selection {
            Selection::All => vec![IndexSpec::full(); dim],
            Selection::Terms(terms) => terms.clone(),
        };

        let component_term = if terms.len() > dim {
            if terms.len() == dim + 1 && ncomps > 1 {
                Some(terms[dim])
            } else {
                return Err(AccessError::TooManyIndices { given: terms.len(), dim, ncomps });
            }
        } else {
            None
        };

        let component = match component_term {
            None | Some(IndexSpec::Range(None, None)) => None,
            Some(IndexSpec::At(c)) => {
                if c < 0 || c as usize >= ncomps {
                    return Err(AccessError::ComponentOutOfBounds { index: c, ncomps });
                }
                Some(c as usize)
            },
            Some(IndexSpec::Range(_, _)) => return Err(AccessError::ComponentRange),
        };

        let mut start = Vec::with_capacity(dim);
        let mut stop = Vec::with_capacity(dim);
        let mut collapse = Vec::with_capacity(dim);

        for axis in 0..dim {
            let spec = terms.get(axis).copied().unwrap_or_else(IndexSpec::full);
            let min = bounds.min[axis];
            let max = bounds.max[axis] + bounds.overlap[axis];

            let (s, e) = match spec {
                IndexSpec::At(i) => {
                    let e = i.checked_add(1).ok_or(AccessError::UpperOutOfBounds { axis, index: i, min, max })?;
                    (i, e)
                },
                IndexSpec::Range(s, e) => (s.unwrap_or(min), e.unwrap_or(max)),
            };

            if s < min || s > max {
                return Err(AccessError::LowerOutOfBounds { axis, index: s, min, max });
            }
            if e < min || e > max {
                return Err(AccessError::UpperOutOfBounds { axis, index: e, min, max });
            }

            start.push(s);
            stop.push(e);
            collapse.push(matches!(spec, IndexSpec::At(_)));
        }

        Ok(Request { start, stop, collapse, component, ncomps })
    }

    /// Number of selected samples along each spatial axis.
    pub fn extents(&self) -> Vec<usize> {
        self.start.iter().zip(&self.stop).map(|(&s, &e)| (e - s).max(0) as usize).collect()
    }

    /// Shape of the assembled buffer, before single-index axes are dropped.
    pub fn buffer_shape(&self) -> Vec<usize> {
        let mut shape = self.extents();
        if self.component.is_none() && self.ncomps > 1 {
            shape.push(self.ncomps);
        }
        shape
    }

    pub fn intersect(&self, lower: &[i64], shape: &[usize]) -> Option<Overlap> {
        let dim = self.start.len();
        let mut overlap = Overlap {
            local: Vec::with_capacity(dim),
            dest: Vec::with_capacity(dim),
            extent: Vec::with_capacity(dim),
        };
        for ax in 0..dim {
            let a = self.start[ax].max(lower[ax]);
            let b = self.stop[ax].min(lower[ax] + shape[ax] as i64);
            if a >= b {
                return None;
            }
            overlap.local.push(a - lower[ax]);
            overlap.dest.push(a - self.start[ax]);
            overlap.extent.push(b - a);
        }
        Some(overlap)
    }

    /// Drops the axes that were addressed by a single index.
    pub fn squeeze(&self, mut result: ArrayD<Real>) -> ArrayD<Real> {
        for (ax, &c) in self.collapse.iter().enumerate().rev() {
            if c {
                result = result.index_axis_move(Axis(ax), 0);
            }
        }
        result
    }

    /// Puts back the single-index axes into a value shaped like a read
    /// result, so that it lines up with the buffer shape.
    pub fn unsqueeze<'a>(&self, value: ArrayViewD<'a, Real>) -> ArrayViewD<'a, Real> {
        let ncollapsed = self.collapse.iter().filter(|&&c| c).count();
        if value.ndim() + ncollapsed != self.buffer_shape().len() {
            return value;
        }
        let mut value = value;
        for (ax, &c) in self.collapse.iter().enumerate() {
            if c {
                value = value.insert_axis(Axis(ax));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Bounds {
        Bounds {
            min: vec![0, -2],
            max: vec![8, 10],
            overlap: vec![0, 1],
            ncomps: 1,
        }
    }

    #[test]
    fn pads_missing_axes() {
        let r = Request::resolve(&vec![IndexSpec::at(3)].into(), &bounds()).unwrap();
        assert_eq!(r.start, vec![3, -2]);
        assert_eq!(r.stop, vec![4, 11]);
        assert_eq!(r.collapse, vec![true, false]);
        assert_eq!(r.buffer_shape(), vec![1, 13]);
    }

    #[test]
    fn ellipsis_covers_everything() {
        let r = Request::resolve(&Selection::All, &bounds()).unwrap();
        assert_eq!(r.extents(), vec![8, 13]);
        assert_eq!(r.collapse, vec![false, false]);
    }

    #[test]
    fn bounds_include_nodal_overlap() {
        let b = bounds();
        assert!(Request::resolve(&vec![IndexSpec::full(), IndexSpec::at(10)].into(), &b).is_ok());
        assert_eq!(
            Request::resolve(&vec![IndexSpec::full(), IndexSpec::at(11)].into(), &b),
            Err(AccessError::UpperOutOfBounds { axis: 1, index: 12, min: -2, max: 11 })
        );
        assert_eq!(
            Request::resolve(&vec![IndexSpec::from_start(-1)].into(), &b),
            Err(AccessError::LowerOutOfBounds { axis: 0, index: -1, min: 0, max: 8 })
        );
    }

    #[test]
    fn extreme_indices_are_bounds_errors() {
        let b = bounds();
        assert_eq!(
            Request::resolve(&vec![IndexSpec::at(i64::MAX)].into(), &b),
            Err(AccessError::UpperOutOfBounds { axis: 0, index: i64::MAX, min: 0, max: 8 })
        );
        assert_eq!(
            Request::resolve(&vec![IndexSpec::full(), IndexSpec::at(i64::MIN)].into(), &b),
            Err(AccessError::LowerOutOfBounds { axis: 1, index: i64::MIN, min: -2, max: 11 })
        );
    }

    #[test]
    fn reversed_range_is_empty() {
        let r = Request::resolve(&vec![IndexSpec::range(5, 2)].into(), &bounds()).unwrap();
        assert_eq!(r.extents(), vec![0, 13]);
        assert_eq!(r.intersect(&[0, -2], &[8, 13]), None);
    }

    #[test]
    fn components() {
        let mut b = bounds();
        let three = vec![IndexSpec::full(), IndexSpec::full(), IndexSpec::at(1)];
        assert_eq!(
            Request::resolve(&three.clone().into(), &b),
            Err(AccessError::TooManyIndices { given: 3, dim: 2, ncomps: 1 })
        );

        b.ncomps = 3;
        let r = Request::resolve(&three.into(), &b).unwrap();
        assert_eq!(r.component, Some(1));
        assert_eq!(r.buffer_shape(), vec![8, 13]);

        let all = Request::resolve(&Selection::All, &b).unwrap();
        assert_eq!(all.buffer_shape(), vec![8, 13, 3]);

        let bad = vec![IndexSpec::full(), IndexSpec::full(), IndexSpec::at(3)];
        assert!(Request::resolve(&bad.into(), &b).is_err());
        let ranged = vec![IndexSpec::full(), IndexSpec::full(), IndexSpec::range(0, 2)];
        assert_eq!(Request::resolve(&ranged.into(), &b), Err(AccessError::ComponentRange));
    }

    #[test]
    fn intersection_offsets() {
        let r = Request::resolve(&vec![IndexSpec::range(2, 7), IndexSpec::range(0, 4)].into(), &bounds()).unwrap();
        let o = r.intersect(&[4, -2], &[4, 13]).unwrap();
        assert_eq!(o.local, vec![0, 2]);
        assert_eq!(o.dest, vec![2, 0]);
        assert_eq!(o.extent, vec![3, 4]);
    }

    #[test]
    fn squeeze_and_unsqueeze() {
        let r = Request::resolve(&vec![IndexSpec::at(1), IndexSpec::range(0, 3)].into(), &bounds()).unwrap();
        let buf = ArrayD::<Real>::zeros(IxDyn(&r.buffer_shape()));
        let squeezed = r.squeeze(buf);
        assert_eq!(squeezed.shape(), &[3]);
        let restored = r.unsqueeze(squeezed.view());
        assert_eq!(restored.shape(), &[1, 3]);
    }

    #[test]
    fn conversions() {
        assert_eq!(IndexSpec::from(4i64), IndexSpec::At(4));
        assert_eq!(IndexSpec::from(1i64..3), IndexSpec::range(1, 3));
        assert_eq!(IndexSpec::from(2i64..), IndexSpec::from_start(2));
        assert_eq!(IndexSpec::from(..5i64), IndexSpec::up_to(5));
        assert_eq!(IndexSpec::from(..), IndexSpec::full());
    }
}
