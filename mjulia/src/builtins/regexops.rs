//! Regex surface over the `regex` crate: `match`, `occursin`, and
//! capture access. (`replace` with a `Regex => repl` pair lives with
//! the string builtins.)

use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::types::Ty;
use crate::values::{RegexMatchValue, Value};
use crate::vm::Vm;

use super::def;

pub fn register(vm: &mut Vm) {
    def(vm, "match", &[Ty::Regex, Ty::String], |_, _, args, _| {
        let (Value::Regex(re), Value::Str(subject)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        match re.compiled.captures(subject) {
            None => Ok(Value::Nothing),
            Some(caps) => {
                let whole = caps.get(0).expect("group 0 always present");
                let captures: Vec<Option<Rc<str>>> = (1..caps.len())
                    .map(|i| caps.get(i).map(|m| Rc::from(m.as_str())))
                    .collect();
                let capture_offsets: Vec<i64> = (1..caps.len())
                    .map(|i| caps.get(i).map_or(0, |m| m.start() as i64 + 1))
                    .collect();
                Ok(Value::RegexMatch(Rc::new(RegexMatchValue {
                    matched: Rc::from(whole.as_str()),
                    captures,
                    offset: whole.start() as i64 + 1,
                    capture_offsets,
                })))
            }
        }
    });
    def(vm, "occursin", &[Ty::Regex, Ty::String], |_, _, args, _| {
        let (Value::Regex(re), Value::Str(subject)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        Ok(Value::Bool(re.compiled.is_match(subject)))
    });
    def(vm, "eachmatch", &[Ty::Regex, Ty::String], |_, _, args, _| {
        let (Value::Regex(re), Value::Str(subject)) = (&args[0], &args[1]) else {
            unreachable!()
        };
        let matches: Vec<Value> = re
            .compiled
            .find_iter(subject)
            .map(|m| {
                Value::RegexMatch(Rc::new(RegexMatchValue {
                    matched: Rc::from(m.as_str()),
                    captures: vec![],
                    offset: m.start() as i64 + 1,
                    capture_offsets: vec![],
                }))
            })
            .collect();
        let n = matches.len();
        Ok(Value::Array(crate::values::new_array_ref(
            crate::values::ArrayValue::from_values(matches, vec![n]),
        )))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Symbol;
    use crate::values::RegexValue;

    #[test]
    fn test_match_offsets_are_one_based() {
        let mut vm = Vm::new();
        register(&mut vm);
        let re = Value::Regex(Rc::new(RegexValue::compile(r"(\d+)").unwrap()));
        let f = Value::Function(crate::values::FunctionValue::new(Symbol::intern("match")));
        let r = vm
            .call_value(&f, &[re, Value::str("ab 42 cd")])
            .unwrap();
        let Value::RegexMatch(m) = r else { panic!("expected a match") };
        assert_eq!(&*m.matched, "42");
        assert_eq!(m.offset, 4);
        assert_eq!(m.captures.len(), 1);
    }

    #[test]
    fn test_no_match_is_nothing() {
        let mut vm = Vm::new();
        register(&mut vm);
        let re = Value::Regex(Rc::new(RegexValue::compile(r"\d").unwrap()));
        let f = Value::Function(crate::values::FunctionValue::new(Symbol::intern("match")));
        let r = vm.call_value(&f, &[re, Value::str("abc")]).unwrap();
        assert!(matches!(r, Value::Nothing));
    }
}
