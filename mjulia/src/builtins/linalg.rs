//! Dense linear algebra over `nalgebra`.
//!
//! Inputs are column-major `Array{Float64}` handles (integer arrays
//! convert on entry); outputs are freshly allocated arrays or tuples of
//! arrays with Julia's result shapes (thin SVD, `eigen` as
//! `(values, vectors)`).

use nalgebra::{DMatrix, DVector};

use crate::error::{VmError, VmResult};
use crate::interner::Symbol;
use crate::types::Ty;
use crate::values::{new_array_ref, ArrayValue, Value};
use crate::vm::Vm;

use super::def;

pub fn register(vm: &mut Vm) {
    def(vm, "*", &[Ty::AbstractArray, Ty::AbstractArray], matmul_entry);
    def(vm, "*", &[Ty::Number, Ty::AbstractArray], scale_entry);
    def(vm, "*", &[Ty::AbstractArray, Ty::Number], scale_entry);
    def(vm, "/", &[Ty::AbstractArray, Ty::Number], scale_entry);
    def(vm, "+", &[Ty::AbstractArray, Ty::AbstractArray], elementwise_entry);
    def(vm, "-", &[Ty::AbstractArray, Ty::AbstractArray], elementwise_entry);
    def(vm, "-", &[Ty::AbstractArray], |_, _, args, _| {
        let a = to_matrix(&args[0])?;
        from_matrix(&-a, is_vector(&args[0]))
    });

    def(vm, "transpose", &[Ty::AbstractArray], transpose_entry);
    def(vm, "adjoint", &[Ty::AbstractArray], transpose_entry);
    def(vm, "adjoint", &[Ty::Number], |_, _, args, _| Ok(args[0].clone()));

    def(vm, "det", &[Ty::AbstractArray], |_, _, args, _| {
        let m = square_matrix(&args[0], "det")?;
        Ok(Value::F64(m.determinant()))
    });
    def(vm, "inv", &[Ty::AbstractArray], |_, _, args, _| {
        let m = square_matrix(&args[0], "inv")?;
        match m.try_inverse() {
            Some(inv) => from_matrix(&inv, false),
            None => Err(VmError::Domain("matrix is not invertible".to_string())),
        }
    });
    def(vm, "lu", &[Ty::AbstractArray], |_, _, args, _| {
        let m = square_matrix(&args[0], "lu")?;
        let lu = m.lu();
        Ok(Value::tuple(vec![
            from_matrix(&lu.l(), false)?,
            from_matrix(&lu.u(), false)?,
        ]))
    });
    def(vm, "qr", &[Ty::AbstractArray], |_, _, args, _| {
        let m = to_matrix(&args[0])?;
        let qr = m.qr();
        Ok(Value::tuple(vec![
            from_matrix(&qr.q(), false)?,
            from_matrix(&qr.r(), false)?,
        ]))
    });
    def(vm, "cholesky", &[Ty::AbstractArray], |_, _, args, _| {
        let m = square_matrix(&args[0], "cholesky")?;
        match m.cholesky() {
            Some(chol) => from_matrix(&chol.l(), false),
            None => Err(VmError::Domain(
                "matrix is not positive definite".to_string(),
            )),
        }
    });
    def(vm, "svd", &[Ty::AbstractArray], |_, _, args, _| {
        let m = to_matrix(&args[0])?;
        let svd = m.svd(true, true);
        let u = svd
            .u
            .ok_or_else(|| VmError::Internal("svd did not produce U".to_string()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| VmError::Internal("svd did not produce V".to_string()))?;
        let s: Vec<f64> = svd.singular_values.iter().copied().collect();
        let n = s.len();
        Ok(Value::tuple(vec![
            from_matrix(&u, false)?,
            Value::Array(new_array_ref(ArrayValue::from_f64(s, vec![n]))),
            from_matrix(&v_t.transpose(), false)?,
        ]))
    });
    def(vm, "eigen", &[Ty::AbstractArray], |_, _, args, _| {
        let m = square_matrix(&args[0], "eigen")?;
        // Real symmetric spectra only; general eigenpairs need the
        // complex tower, which this value model excludes.
        let symmetric = {
            let mt = m.transpose();
            (&m - &mt).amax() < 1e-10
        };
        if !symmetric {
            return Err(VmError::Domain(
                "eigen: only symmetric matrices are supported".to_string(),
            ));
        }
        let eig = m.symmetric_eigen();
        let values: Vec<f64> = eig.eigenvalues.iter().copied().collect();
        let n = values.len();
        Ok(Value::tuple(vec![
            Value::Array(new_array_ref(ArrayValue::from_f64(values, vec![n]))),
            from_matrix(&eig.eigenvectors, false)?,
        ]))
    });
    def(vm, "pinv", &[Ty::AbstractArray], |_, _, args, _| {
        let m = to_matrix(&args[0])?;
        m.pseudo_inverse(1e-12)
            .map_err(|e| VmError::Domain(format!("pinv failed: {}", e)))
            .and_then(|p| from_matrix(&p, false))
    });
    def(vm, "cond", &[Ty::AbstractArray], |_, _, args, _| {
        let m = to_matrix(&args[0])?;
        let svd = m.svd(false, false);
        let mut smax = 0.0f64;
        let mut smin = f64::INFINITY;
        for &s in svd.singular_values.iter() {
            smax = smax.max(s);
            smin = smin.min(s);
        }
        // Near singularity this may be huge-finite or Inf depending on
        // the backend's smallest singular value.
        Ok(Value::F64(if smin == 0.0 { f64::INFINITY } else { smax / smin }))
    });
    def(vm, "\\", &[Ty::AbstractArray, Ty::AbstractArray], solve_entry);
    def(vm, "kron", &[Ty::AbstractArray, Ty::AbstractArray], |_, _, args, _| {
        let a = to_matrix(&args[0])?;
        let b = to_matrix(&args[1])?;
        from_matrix(&a.kronecker(&b), false)
    });
    def(vm, "dot", &[Ty::AbstractArray, Ty::AbstractArray], |_, _, args, _| {
        let a = to_vector(&args[0])?;
        let b = to_vector(&args[1])?;
        if a.len() != b.len() {
            return Err(VmError::DimensionMismatch(format!(
                "dot: vectors have lengths {} and {}",
                a.len(),
                b.len()
            )));
        }
        Ok(Value::F64(a.dot(&b)))
    });
    def(vm, "norm", &[Ty::AbstractArray], |_, _, args, _| {
        let v = to_vector(&args[0])?;
        Ok(Value::F64(v.norm()))
    });
    def(vm, "norm", &[Ty::Number], |_, _, args, _| {
        Ok(Value::F64(args[0].as_f64().unwrap_or(0.0).abs()))
    });
}

// ── conversions ───────────────────────────────────────────────────────

fn is_vector(v: &Value) -> bool {
    matches!(v, Value::Array(a) if a.borrow().ndims() == 1)
}

/// Dense column-major matrix view of an array value. Vectors are n×1.
fn to_matrix(v: &Value) -> VmResult<DMatrix<f64>> {
    let Value::Array(a) = v else {
        return Err(VmError::Type(format!(
            "expected an array, got {}",
            v.runtime_ty()
        )));
    };
    let a = a.borrow();
    let data = a.to_f64_vec()?;
    let (rows, cols) = match a.ndims() {
        1 => (a.len(), 1),
        2 => (a.size(0), a.size(1)),
        n => {
            return Err(VmError::Argument(format!(
                "linear algebra expects 1-D or 2-D arrays, got {}-D",
                n
            )))
        }
    };
    Ok(DMatrix::from_column_slice(rows, cols, &data))
}

fn to_vector(v: &Value) -> VmResult<DVector<f64>> {
    let Value::Array(a) = v else {
        return Err(VmError::Type(format!(
            "expected a vector, got {}",
            v.runtime_ty()
        )));
    };
    let a = a.borrow();
    Ok(DVector::from_vec(a.to_f64_vec()?))
}

fn square_matrix(v: &Value, what: &str) -> VmResult<DMatrix<f64>> {
    let m = to_matrix(v)?;
    if m.nrows() != m.ncols() {
        return Err(VmError::DimensionMismatch(format!(
            "{}: matrix must be square, got {}×{}",
            what,
            m.nrows(),
            m.ncols()
        )));
    }
    Ok(m)
}

fn from_matrix(m: &DMatrix<f64>, as_vector: bool) -> VmResult<Value> {
    let data: Vec<f64> = m.iter().copied().collect();
    let shape = if as_vector && m.ncols() == 1 {
        vec![m.nrows()]
    } else {
        vec![m.nrows(), m.ncols()]
    };
    Ok(Value::Array(new_array_ref(ArrayValue::from_f64(
        data, shape,
    ))))
}

// ── entries ───────────────────────────────────────────────────────────

fn matmul_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let a = to_matrix(&args[0])?;
    let b = to_matrix(&args[1])?;
    if a.ncols() != b.nrows() {
        return Err(VmError::DimensionMismatch(format!(
            "matrix multiplication: ({}, {}) * ({}, {})",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    let out = &a * &b;
    // Matrix × vector yields a vector.
    from_matrix(&out, is_vector(&args[1]))
}

fn scale_entry(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let (scalar, arr, scalar_first) = match (&args[0], &args[1]) {
        (s, a @ Value::Array(_)) if s.as_f64().is_some() => (s.as_f64().unwrap(), a, true),
        (a @ Value::Array(_), s) if s.as_f64().is_some() => (s.as_f64().unwrap(), a, false),
        _ => {
            return Err(VmError::Method(format!(
                "no method matching {}(::{}, ::{})",
                name,
                args[0].runtime_ty(),
                args[1].runtime_ty()
            )))
        }
    };
    let m = to_matrix(arr)?;
    let out = if name.as_str() == "/" {
        if scalar_first {
            return Err(VmError::Method(
                "no method matching /(::Number, ::AbstractArray)".to_string(),
            ));
        }
        m / scalar
    } else {
        m * scalar
    };
    from_matrix(&out, is_vector(arr))
}

fn elementwise_entry(
    _vm: &mut Vm,
    name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let (Value::Array(xa), Value::Array(xb)) = (&args[0], &args[1]) else {
        return Err(VmError::Method(format!(
            "no method matching {}(::{}, ::{})",
            name,
            args[0].runtime_ty(),
            args[1].runtime_ty()
        )));
    };
    if xa.borrow().shape != xb.borrow().shape {
        return Err(VmError::DimensionMismatch(format!(
            "{}: arrays have shapes {:?} and {:?} (use broadcasting for different shapes)",
            name,
            xa.borrow().shape,
            xb.borrow().shape
        )));
    }
    let a = to_matrix(&args[0])?;
    let b = to_matrix(&args[1])?;
    let out = if name.as_str() == "-" { &a - &b } else { &a + &b };
    from_matrix(&out, is_vector(&args[0]))
}

fn transpose_entry(
    _vm: &mut Vm,
    _name: Symbol,
    args: &[Value],
    _kw: &[(Symbol, Value)],
) -> VmResult<Value> {
    let Value::Array(a) = &args[0] else {
        return Err(VmError::Type("transpose expects an array".to_string()));
    };
    // A vector transposes into a 1×n row matrix.
    if a.borrow().ndims() == 1 {
        let data = a.borrow().to_f64_vec()?;
        let n = data.len();
        return Ok(Value::Array(new_array_ref(ArrayValue::from_f64(
            data,
            vec![1, n],
        ))));
    }
    let m = to_matrix(&args[0])?;
    from_matrix(&m.transpose(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(data: Vec<f64>, rows: usize, cols: usize) -> Value {
        Value::Array(new_array_ref(ArrayValue::from_f64(data, vec![rows, cols])))
    }

    #[test]
    fn test_matmul_shapes_and_values() {
        let mut vm = Vm::new();
        // [1 3; 2 4] (column-major storage 1,2,3,4) times identity.
        let a = mat(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let eye = mat(vec![1.0, 0.0, 0.0, 1.0], 2, 2);
        let r = matmul_entry(&mut vm, Symbol::intern("*"), &[a, eye], &[]).unwrap();
        let Value::Array(r) = r else { panic!() };
        assert_eq!(r.borrow().to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let mut vm = Vm::new();
        let a = mat(vec![1.0, 2.0], 1, 2);
        let b = mat(vec![1.0], 1, 1);
        assert!(matches!(
            matmul_entry(&mut vm, Symbol::intern("*"), &[a, b], &[]),
            Err(VmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_det_and_inverse() {
        let m = mat(vec![2.0, 0.0, 0.0, 2.0], 2, 2);
        let dm = square_matrix(&m, "det").unwrap();
        assert!((dm.determinant() - 4.0).abs() < 1e-12);
        assert!(dm.try_inverse().is_some());
    }

    #[test]
    fn test_vector_transpose_is_row() {
        let mut vm = Vm::new();
        let v = Value::Array(new_array_ref(ArrayValue::from_f64(
            vec![1.0, 2.0, 3.0],
            vec![3],
        )));
        let r = transpose_entry(&mut vm, Symbol::intern("transpose"), &[v], &[]).unwrap();
        let Value::Array(r) = r else { panic!() };
        assert_eq!(r.borrow().shape, vec![1, 3]);
    }
}
