//! Broadcast shape resolution.
//!
//! Shapes combine per dimension: a size-1 dimension stretches to match,
//! equal sizes pass through, anything else is a `DimensionMismatch`.
//! Shorter shapes are padded with trailing 1s; scalar participants
//! contribute no dimensions at all.

use crate::error::{VmError, VmResult};
use crate::values::Value;

/// Per-dimension rule. `None` signals a mismatch.
fn bcs1(a: usize, b: usize) -> Option<usize> {
    if a == 1 {
        Some(b)
    } else if b == 1 || a == b {
        Some(a)
    } else {
        None
    }
}

/// Combine two shapes, padding the shorter with trailing 1s.
fn combine_shapes(a: &[usize], b: &[usize]) -> VmResult<Vec<usize>> {
    let ndims = a.len().max(b.len());
    let mut out = Vec::with_capacity(ndims);
    for d in 0..ndims {
        let da = a.get(d).copied().unwrap_or(1);
        let db = b.get(d).copied().unwrap_or(1);
        match bcs1(da, db) {
            Some(n) => out.push(n),
            None => {
                return Err(VmError::DimensionMismatch(format!(
                    "arrays could not be broadcast to a common size: a has shape {:?}, b has shape {:?}",
                    a, b
                )))
            }
        }
    }
    Ok(out)
}

/// Fold the combination over every participant shape. No participants
/// (all scalars) yields the empty shape.
pub fn broadcast_shape(shapes: &[Vec<usize>]) -> VmResult<Vec<usize>> {
    let mut acc: Vec<usize> = Vec::new();
    for s in shapes {
        acc = combine_shapes(&acc, s)?;
    }
    Ok(acc)
}

/// Shape contributed by a participant; `None` for scalars.
pub fn participant_shape(v: &Value) -> Option<Vec<usize>> {
    match v {
        Value::Array(a) => Some(a.borrow().shape.clone()),
        Value::SubArray(view) => Some(vec![view.length]),
        Value::Range(r) => Some(vec![r.len()]),
        Value::Tuple(t) => Some(vec![t.len()]),
        Value::RefWrap(_) => None,
        _ => None,
    }
}

/// For an argument of shape `shape` inside an output of `out_ndims`
/// dimensions: `keeps[d]` says dimension `d` really varies, and
/// `defaults[d]` is the index used when it does not (singleton dims).
pub fn newindexer(shape: &[usize], out_ndims: usize) -> (Vec<bool>, Vec<usize>) {
    let mut keeps = Vec::with_capacity(out_ndims);
    let mut defaults = Vec::with_capacity(out_ndims);
    for d in 0..out_ndims {
        let size = shape.get(d).copied().unwrap_or(1);
        keeps.push(size != 1);
        defaults.push(0);
    }
    (keeps, defaults)
}

/// Map an output multi-index onto an argument's effective multi-index,
/// replacing dropped (singleton) dimensions with their default.
pub fn newindex(out_index: &[usize], keeps: &[bool], defaults: &[usize]) -> Vec<usize> {
    out_index
        .iter()
        .zip(keeps.iter().zip(defaults))
        .map(|(&i, (&keep, &d))| if keep { i } else { d })
        .collect()
}

/// Column-major strides of a shape.
pub fn strides_of(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for &dim in shape {
        strides.push(stride);
        stride *= dim;
    }
    strides
}

/// Linear offset of a multi-index under column-major strides.
pub fn linear_of(index: &[usize], strides: &[usize]) -> usize {
    index
        .iter()
        .zip(strides)
        .map(|(&i, &s)| i * s)
        .sum()
}

/// Odometer over a column-major index space.
pub struct IndexSpace {
    shape: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl IndexSpace {
    pub fn new(shape: &[usize]) -> Self {
        let done = shape.iter().any(|&d| d == 0);
        Self {
            shape: shape.to_vec(),
            current: vec![0; shape.len()],
            done,
        }
    }
}

impl Iterator for IndexSpace {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let item = self.current.clone();
        // Advance column-major: first dimension fastest.
        let mut d = 0;
        loop {
            if d == self.shape.len() {
                self.done = true;
                break;
            }
            self.current[d] += 1;
            if self.current[d] < self.shape[d] {
                break;
            }
            self.current[d] = 0;
            d += 1;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_shape_passes() {
        assert_eq!(
            broadcast_shape(&[vec![3], vec![3]]).unwrap(),
            vec![3]
        );
    }

    #[test]
    fn test_singleton_stretches() {
        assert_eq!(
            broadcast_shape(&[vec![5, 1], vec![1, 3]]).unwrap(),
            vec![5, 3]
        );
        assert_eq!(broadcast_shape(&[vec![1], vec![7]]).unwrap(), vec![7]);
    }

    #[test]
    fn test_trailing_ones_pad() {
        assert_eq!(
            broadcast_shape(&[vec![3], vec![3, 2]]).unwrap(),
            vec![3, 2]
        );
    }

    #[test]
    fn test_mismatch_mentions_both_shapes() {
        let err = broadcast_shape(&[vec![2], vec![3]]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("[2]") && msg.contains("[3]"), "got: {}", msg);
    }

    #[test]
    fn test_shape_fold_associative_commutative() {
        let shapes = [vec![2, 1], vec![1, 3], vec![2, 3]];
        let forward = broadcast_shape(&shapes).unwrap();
        let reversed: Vec<Vec<usize>> = shapes.iter().rev().cloned().collect();
        assert_eq!(forward, broadcast_shape(&reversed).unwrap());
        assert_eq!(forward, vec![2, 3]);
    }

    #[test]
    fn test_all_scalars_empty_shape() {
        assert_eq!(broadcast_shape(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_newindexer_masks_singletons() {
        let (keeps, defaults) = newindexer(&[3, 1], 2);
        assert_eq!(keeps, vec![true, false]);
        assert_eq!(newindex(&[2, 5], &keeps, &defaults), vec![2, 0]);
    }

    #[test]
    fn test_index_space_column_major_order() {
        let idx: Vec<Vec<usize>> = IndexSpace::new(&[2, 2]).collect();
        assert_eq!(
            idx,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]
        );
    }

    #[test]
    fn test_index_space_empty_dimension() {
        assert_eq!(IndexSpace::new(&[0, 3]).count(), 0);
    }
}
