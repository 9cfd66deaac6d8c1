//! Lazy ranges. Length is known in O(1) and iteration never allocates.

use super::Value;
use crate::error::{VmError, VmResult};
use crate::types::Ty;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeValue {
    /// `start:stop` over Int64.
    Unit { start: i64, stop: i64 },
    /// `start:step:stop` over Int64, step ≠ 0.
    Step { start: i64, step: i64, stop: i64 },
    /// Float range with explicit step; length fixed at construction.
    StepLen { start: f64, step: f64, len: usize },
    /// `LinRange(start, stop, len)`: endpoints exact, interior linear.
    Lin { start: f64, stop: f64, len: usize },
}

impl RangeValue {
    pub fn unit(start: i64, stop: i64) -> Self {
        RangeValue::Unit { start, stop }
    }

    pub fn step(start: i64, step: i64, stop: i64) -> VmResult<Self> {
        if step == 0 {
            return Err(VmError::Argument("range step cannot be zero".to_string()));
        }
        Ok(RangeValue::Step { start, step, stop })
    }

    /// `start:step:stop` over floats, Julia's `StepRangeLen` shape.
    pub fn step_len_from_bounds(start: f64, step: f64, stop: f64) -> VmResult<Self> {
        if step == 0.0 {
            return Err(VmError::Argument("range step cannot be zero".to_string()));
        }
        let span = (stop - start) / step;
        let len = if span < 0.0 {
            0
        } else {
            (span + 1e-10).floor() as usize + 1
        };
        Ok(RangeValue::StepLen { start, step, len })
    }

    pub fn len(&self) -> usize {
        match *self {
            RangeValue::Unit { start, stop } => {
                if stop >= start {
                    (stop - start) as usize + 1
                } else {
                    0
                }
            }
            RangeValue::Step { start, step, stop } => {
                if step > 0 {
                    if stop >= start {
                        ((stop - start) / step) as usize + 1
                    } else {
                        0
                    }
                } else if start >= stop {
                    ((start - stop) / (-step)) as usize + 1
                } else {
                    0
                }
            }
            RangeValue::StepLen { len, .. } | RangeValue::Lin { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1-based element access.
    pub fn get(&self, index: i64) -> VmResult<Value> {
        if index < 1 || index as usize > self.len() {
            return Err(VmError::Bounds {
                indices: vec![index],
                shape: vec![self.len()],
            });
        }
        let k = index - 1;
        Ok(match *self {
            RangeValue::Unit { start, .. } => Value::I64(start + k),
            RangeValue::Step { start, step, .. } => Value::I64(start + k * step),
            RangeValue::StepLen { start, step, .. } => Value::F64(start + k as f64 * step),
            RangeValue::Lin { start, stop, len } => {
                if len == 1 {
                    Value::F64(start)
                } else {
                    let t = k as f64 / (len as f64 - 1.0);
                    Value::F64(start + (stop - start) * t)
                }
            }
        })
    }

    pub fn first(&self) -> VmResult<Value> {
        self.get(1)
    }

    pub fn last(&self) -> VmResult<Value> {
        self.get(self.len() as i64)
    }

    pub fn ty(&self) -> Ty {
        match self {
            RangeValue::Unit { .. } => Ty::UnitRange,
            RangeValue::Step { .. } => Ty::StepRange,
            RangeValue::StepLen { .. } => Ty::StepRangeLen,
            RangeValue::Lin { .. } => Ty::LinRange,
        }
    }

    pub fn elem_ty(&self) -> Ty {
        match self {
            RangeValue::Unit { .. } | RangeValue::Step { .. } => Ty::Int64,
            _ => Ty::Float64,
        }
    }

    pub fn iter_values(&self) -> impl Iterator<Item = Value> + '_ {
        (1..=self.len() as i64).map(move |i| self.get(i).expect("in range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_range_len_and_get() {
        let r = RangeValue::unit(1, 10);
        assert_eq!(r.len(), 10);
        assert!(matches!(r.get(1).unwrap(), Value::I64(1)));
        assert!(matches!(r.get(10).unwrap(), Value::I64(10)));
        assert!(r.get(11).is_err());
    }

    #[test]
    fn test_empty_unit_range() {
        assert_eq!(RangeValue::unit(5, 1).len(), 0);
    }

    #[test]
    fn test_step_range_negative_step() {
        let r = RangeValue::step(10, -2, 1).unwrap();
        assert_eq!(r.len(), 5);
        assert!(matches!(r.get(5).unwrap(), Value::I64(2)));
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(RangeValue::step(1, 0, 5).is_err());
    }

    #[test]
    fn test_float_range_length() {
        let r = RangeValue::step_len_from_bounds(0.0, 0.5, 2.0).unwrap();
        assert_eq!(r.len(), 5);
        assert!(matches!(r.get(5).unwrap(), Value::F64(x) if (x - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_lin_range_endpoints_exact() {
        let r = RangeValue::Lin {
            start: 1.0,
            stop: 3.0,
            len: 5,
        };
        assert!(matches!(r.get(1).unwrap(), Value::F64(x) if x == 1.0));
        assert!(matches!(r.get(5).unwrap(), Value::F64(x) if x == 3.0));
    }

    #[test]
    fn test_iteration_does_not_allocate_storage() {
        let r = RangeValue::unit(1, 4);
        let sum: i64 = r
            .iter_values()
            .map(|v| match v {
                Value::I64(x) => x,
                _ => unreachable!(),
            })
            .sum();
        assert_eq!(sum, 10);
    }
}
