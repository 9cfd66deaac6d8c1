//! Regex values backed by the `regex` crate.

use crate::error::{VmError, VmResult};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct RegexValue {
    pub pattern: String,
    pub compiled: regex::Regex,
}

impl RegexValue {
    pub fn compile(pattern: &str) -> VmResult<Self> {
        let compiled = regex::Regex::new(pattern)
            .map_err(|e| VmError::Argument(format!("invalid regex {:?}: {}", pattern, e)))?;
        Ok(Self {
            pattern: pattern.to_string(),
            compiled,
        })
    }
}

/// A successful match: the matched text, capture groups, and 1-based
/// offsets into the subject string.
#[derive(Debug, Clone)]
pub struct RegexMatchValue {
    pub matched: Rc<str>,
    pub captures: Vec<Option<Rc<str>>>,
    pub offset: i64,
    pub capture_offsets: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_ok_and_err() {
        assert!(RegexValue::compile(r"\d+").is_ok());
        assert!(matches!(
            RegexValue::compile(r"("),
            Err(VmError::Argument(_))
        ));
    }
}
