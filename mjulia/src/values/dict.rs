//! Hash containers keyed by `isequal`/`hash`.
//!
//! `DictKey` adapts a `Value` to `Eq + Hash` under Julia's total
//! equality: `isequal(NaN, NaN)` is true, `isequal(-0.0, 0.0)` is false,
//! and `isequal(1, 1.0)` is true with matching hashes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::equality::{hash_value, isequal_values};
use super::Value;

pub type DictRef = Rc<RefCell<DictValue>>;
pub type SetRef = Rc<RefCell<SetValue>>;

#[derive(Debug, Clone)]
pub struct DictKey(pub Value);

impl PartialEq for DictKey {
    fn eq(&self, other: &Self) -> bool {
        isequal_values(&self.0, &other.0)
    }
}

impl Eq for DictKey {}

impl std::hash::Hash for DictKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(hash_value(&self.0));
    }
}

#[derive(Debug, Clone, Default)]
pub struct DictValue {
    pub map: HashMap<DictKey, Value>,
}

impl DictValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        self.map.insert(DictKey(key), value);
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.map.get(&DictKey(key.clone())).cloned()
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.map.remove(&DictKey(key.clone()))
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.map.contains_key(&DictKey(key.clone()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetValue {
    pub map: HashMap<DictKey, ()>,
}

impl SetValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Value) {
        self.map.insert(DictKey(value), ());
    }

    pub fn remove(&mut self, value: &Value) -> bool {
        self.map.remove(&DictKey(value.clone())).is_some()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.map.contains_key(&DictKey(value.clone()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter_values(&self) -> impl Iterator<Item = &Value> {
        self.map.keys().map(|k| &k.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_is_a_usable_key() {
        let mut d = DictValue::new();
        d.insert(Value::F64(f64::NAN), Value::I64(1));
        assert!(d.contains(&Value::F64(f64::NAN)));
    }

    #[test]
    fn test_negative_zero_distinct_key() {
        let mut d = DictValue::new();
        d.insert(Value::F64(0.0), Value::I64(1));
        d.insert(Value::F64(-0.0), Value::I64(2));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_int_and_float_key_collide() {
        let mut d = DictValue::new();
        d.insert(Value::I64(1), Value::I64(10));
        assert!(matches!(d.get(&Value::F64(1.0)), Some(Value::I64(10))));
    }

    #[test]
    fn test_set_membership() {
        let mut s = SetValue::new();
        s.insert(Value::Str("a".into()));
        s.insert(Value::Str("a".into()));
        assert_eq!(s.len(), 1);
        assert!(s.contains(&Value::Str("a".into())));
        assert!(s.remove(&Value::Str("a".into())));
        assert!(s.is_empty());
    }
}
