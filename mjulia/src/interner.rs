//! Process-wide symbol interning.
//!
//! Julia guarantees `:x === :x` for any two occurrences of the same name;
//! interning makes that identity a 32-bit comparison. Names live for the
//! process lifetime (the pool leaks them once, on first intern), so
//! `as_str` can hand out `&'static str` without lifetime plumbing.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

static POOL: Lazy<Mutex<Pool>> = Lazy::new(|| Mutex::new(Pool::default()));

#[derive(Default)]
struct Pool {
    by_name: HashMap<&'static str, u32>,
    names: Vec<&'static str>,
}

/// An interned identifier. Equality and hashing are by pool index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn intern(name: &str) -> Symbol {
        let mut pool = POOL.lock().expect("symbol pool poisoned");
        if let Some(&id) = pool.by_name.get(name) {
            return Symbol(id);
        }
        let leaked: &'static str = Box::leak(name.to_string().into_boxed_str());
        let id = pool.names.len() as u32;
        pool.names.push(leaked);
        pool.by_name.insert(leaked, id);
        Symbol(id)
    }

    pub fn as_str(self) -> &'static str {
        let pool = POOL.lock().expect("symbol pool poisoned");
        pool.names[self.0 as usize]
    }

    /// Stable numeric identity within this process.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Symbol {
        Symbol::intern(name)
    }
}

// Symbols serialize by name so bytecode files survive across processes
// (pool indices are assigned in first-intern order and are not stable).
impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Symbol::intern(&name))
    }
}

/// Generate a fresh symbol that cannot collide with source identifiers.
/// The `#` prefix is not a legal identifier character in the subset.
pub fn gensym(base: &str) -> Symbol {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    Symbol::intern(&format!("#{}#{}", base, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_symbol() {
        assert_eq!(Symbol::intern("x"), Symbol::intern("x"));
        assert_eq!(Symbol::intern("x").id(), Symbol::intern("x").id());
    }

    #[test]
    fn test_different_names_differ() {
        assert_ne!(Symbol::intern("x"), Symbol::intern("y"));
    }

    #[test]
    fn test_as_str_round_trips() {
        assert_eq!(Symbol::intern("foobar").as_str(), "foobar");
    }

    #[test]
    fn test_gensym_unique_and_unspellable() {
        let a = gensym("t");
        let b = gensym("t");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("#t#"));
    }
}
