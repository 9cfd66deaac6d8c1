//! Value formatting: `print`-style (`display_value`) and `show`-style
//! (`show_value`, which quotes strings and chars).

use super::Value;

/// Format a float the way Julia prints one: integral values keep a
/// trailing `.0`.
pub fn fmt_f64(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if x == x.trunc() && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

pub fn display_value(v: &Value) -> String {
    format_value(v, false)
}

pub fn show_value(v: &Value) -> String {
    format_value(v, true)
}

fn format_value(v: &Value, quoted: bool) -> String {
    match v {
        Value::I8(x) => x.to_string(),
        Value::I16(x) => x.to_string(),
        Value::I32(x) => x.to_string(),
        Value::I64(x) => x.to_string(),
        Value::I128(x) => x.to_string(),
        Value::U8(x) => format!("0x{:02x}", x),
        Value::U16(x) => format!("0x{:04x}", x),
        Value::U32(x) => format!("0x{:08x}", x),
        Value::U64(x) => format!("0x{:016x}", x),
        Value::Bool(x) => x.to_string(),
        Value::F16(x) => fmt_f64(x.to_f64()),
        Value::F32(x) => fmt_f64(*x as f64),
        Value::F64(x) => fmt_f64(*x),
        Value::Str(s) => {
            if quoted {
                format!("{:?}", s)
            } else {
                s.to_string()
            }
        }
        Value::Char(c) => {
            if quoted {
                format!("'{}'", c)
            } else {
                c.to_string()
            }
        }
        Value::Nothing => "nothing".to_string(),
        Value::Missing => "missing".to_string(),
        Value::Undef => "#undef".to_string(),
        Value::Sym(s) => {
            if quoted {
                format!(":{}", s)
            } else {
                s.to_string()
            }
        }
        Value::Tuple(elems) => {
            let inner: Vec<String> = elems.iter().map(|e| format_value(e, true)).collect();
            if inner.len() == 1 {
                format!("({},)", inner[0])
            } else {
                format!("({})", inner.join(", "))
            }
        }
        Value::NamedTuple(nt) => {
            let inner: Vec<String> = nt
                .names
                .iter()
                .zip(nt.values.iter())
                .map(|(n, e)| format!("{} = {}", n, format_value(e, true)))
                .collect();
            format!("({})", inner.join(", "))
        }
        Value::Range(r) => match *r {
            super::RangeValue::Unit { start, stop } => format!("{}:{}", start, stop),
            super::RangeValue::Step { start, step, stop } => {
                format!("{}:{}:{}", start, step, stop)
            }
            super::RangeValue::StepLen { start, step, len } => {
                let stop = start + step * (len.max(1) - 1) as f64;
                format!("{}:{}:{}", fmt_f64(start), fmt_f64(step), fmt_f64(stop))
            }
            super::RangeValue::Lin { start, stop, len } => {
                format!("LinRange({}, {}, {})", fmt_f64(start), fmt_f64(stop), len)
            }
        },
        Value::Array(a) => {
            let a = a.borrow();
            if a.ndims() == 2 {
                let (rows, cols) = (a.size(0), a.size(1));
                let mut out = String::from("[");
                for r in 0..rows {
                    if r > 0 {
                        out.push_str("; ");
                    }
                    for c in 0..cols {
                        if c > 0 {
                            out.push(' ');
                        }
                        out.push_str(&format_value(&a.get_linear(c * rows + r), true));
                    }
                }
                out.push(']');
                out
            } else {
                let inner: Vec<String> =
                    a.iter_values().map(|e| format_value(&e, true)).collect();
                format!("[{}]", inner.join(", "))
            }
        }
        Value::SubArray(view) => {
            let inner: Vec<String> = (1..=view.length as i64)
                .map(|i| {
                    view.get(i)
                        .map(|e| format_value(&e, true))
                        .unwrap_or_else(|_| "#undef".to_string())
                })
                .collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Struct(s) => {
            let inner: Vec<String> =
                s.fields.iter().map(|f| format_value(f, true)).collect();
            format!("{}({})", s.name, inner.join(", "))
        }
        Value::MutStruct(s) => {
            let s = s.borrow();
            let inner: Vec<String> =
                s.fields.iter().map(|f| format_value(f, true)).collect();
            format!("{}({})", s.name, inner.join(", "))
        }
        Value::Dict(d) => {
            let d = d.borrow();
            if d.is_empty() {
                return "Dict()".to_string();
            }
            let inner: Vec<String> = d
                .map
                .iter()
                .map(|(k, v)| {
                    format!("{} => {}", format_value(&k.0, true), format_value(v, true))
                })
                .collect();
            format!("Dict({})", inner.join(", "))
        }
        Value::Set(s) => {
            let s = s.borrow();
            if s.is_empty() {
                return "Set()".to_string();
            }
            let inner: Vec<String> =
                s.iter_values().map(|e| format_value(e, true)).collect();
            format!("Set([{}])", inner.join(", "))
        }
        Value::Type(t) => t.to_string(),
        Value::Function(f) => f.name.to_string(),
        Value::Closure(c) => format!("{}", c.name),
        Value::Expr(e) => {
            let args: Vec<String> = e
                .arg_values()
                .iter()
                .map(|a| format_value(a, true))
                .collect();
            format!("Expr(:{}, {})", e.head, args.join(", "))
        }
        Value::QuoteNode(inner) => format!("QuoteNode({})", format_value(inner, true)),
        Value::LineNumberNode(n) => match n.file {
            Some(file) => format!("#= {}:{} =#", file, n.line),
            None => format!("#= line {} =#", n.line),
        },
        Value::GlobalRef(g) => format!("{}.{}", g.module, g.name),
        Value::Broadcasted(bc) => {
            format!("Broadcasted({}, …)", format_value(&bc.func, false))
        }
        Value::RefWrap(inner) => format!("Base.RefValue({})", format_value(inner, true)),
        Value::Regex(r) => format!("r\"{}\"", r.pattern),
        Value::RegexMatch(m) => format!("RegexMatch(\"{}\")", m.matched),
        Value::Task(_) => "Task".to_string(),
        Value::IOBuf(_) => "IOBuffer(…)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{new_array_ref, ArrayValue};

    #[test]
    fn test_float_formatting() {
        assert_eq!(fmt_f64(1.0), "1.0");
        assert_eq!(fmt_f64(0.5), "0.5");
        assert_eq!(fmt_f64(f64::NAN), "NaN");
        assert_eq!(fmt_f64(f64::INFINITY), "Inf");
    }

    #[test]
    fn test_string_display_vs_show() {
        let s = Value::str("hi");
        assert_eq!(display_value(&s), "hi");
        assert_eq!(show_value(&s), "\"hi\"");
    }

    #[test]
    fn test_vector_display() {
        let v = Value::Array(new_array_ref(ArrayValue::from_i64(vec![1, 2, 3], vec![3])));
        assert_eq!(display_value(&v), "[1, 2, 3]");
    }

    #[test]
    fn test_matrix_display_row_major_presentation() {
        // Column-major [1 3; 2 4] stored as 1,2,3,4.
        let v = Value::Array(new_array_ref(ArrayValue::from_i64(
            vec![1, 2, 3, 4],
            vec![2, 2],
        )));
        assert_eq!(display_value(&v), "[1 3; 2 4]");
    }

    #[test]
    fn test_singleton_tuple_has_trailing_comma() {
        assert_eq!(display_value(&Value::tuple(vec![Value::I64(1)])), "(1,)");
    }
}
