//! Peephole optimiser for flattened rate programs.
//!
//! Pass pipeline
//! -------------
//!  1. **fold_consts** – propagate constants through every opcode whose operands
//!                       are all known at compile time.
//!  2. **fuse_fma**    – recognise `a*b+c` and `a*b-c` load sequences and emit the
//!                       dedicated `Fma` / `Fmsub` opcode.
//!
//! The pipeline runs until a fix-point is reached, so a single call to
//! [`optimize`] yields the final program. Constant divisions by zero and
//! out-of-domain logarithms are left in place so that evaluation reproduces
//! the IEEE result of the unoptimised program.

use crate::expr::{int_power, FlattenedExpr, LinearOp};

/// Run all optimisation passes until nothing changes.
pub fn optimize(flattened: FlattenedExpr) -> FlattenedExpr {
    let mut ops = flattened.ops;
    loop {
        let len_before = ops.len();
        ops = fuse_fma(fold_consts(ops));
        if ops.len() == len_before {
            break;
        }
    }

    let constant_result = match ops.as_slice() {
        [LinearOp::LoadConst(c)] => Some(*c),
        _ => flattened.constant_result,
    };
    FlattenedExpr {
        ops,
        constant_result,
    }
}

/// Number of operands an opcode pops and whether it pushes a result.
pub(crate) fn arity(op: &LinearOp) -> usize {
    use LinearOp::*;
    match op {
        LoadConst(_) | LoadVar(_) => 0,
        Abs | Neg | PowConst(_) | PowFloat(_) | Exp | Ln | Sqrt | Sin | Cos => 1,
        Add | Sub | Mul | Div | PowExpr => 2,
        Fma | Fmsub => 3,
    }
}

/// Folds an opcode over constant operands, or returns `None` if the result
/// should be computed at run time.
fn fold(op: &LinearOp, args: &[f64]) -> Option<f64> {
    use LinearOp::*;
    let value = match (op, args) {
        (Abs, [a]) => a.abs(),
        (Neg, [a]) => -a,
        (PowConst(n), [a]) => int_power(*a, *n),
        (PowFloat(e), [a]) => a.powf(*e),
        (Exp, [a]) => a.exp(),
        (Ln, [a]) if *a > 0.0 => a.ln(),
        (Sqrt, [a]) if *a >= 0.0 => a.sqrt(),
        (Sin, [a]) => a.sin(),
        (Cos, [a]) => a.cos(),
        (Add, [a, b]) => a + b,
        (Sub, [a, b]) => a - b,
        (Mul, [a, b]) => a * b,
        (Div, [a, b]) if *b != 0.0 => a / b,
        (PowExpr, [a, b]) => a.powf(*b),
        (Fma, [a, b, c]) => a.mul_add(*b, *c),
        (Fmsub, [a, b, c]) => a.mul_add(*b, -c),
        _ => return None,
    };
    Some(value)
}

// Constant folding. Walks the program while mirroring its effect on a stack of
// `Option<f64>` (Some if the value is known at compile time). A known value is
// always produced by exactly one `LoadConst` at the tail of the output.
fn fold_consts(ops: Vec<LinearOp>) -> Vec<LinearOp> {
    let mut out: Vec<LinearOp> = Vec::with_capacity(ops.len());
    let mut known: Vec<Option<f64>> = Vec::with_capacity(8);

    for op in ops {
        if let LinearOp::LoadConst(c) = op {
            out.push(op);
            known.push(Some(c));
            continue;
        }

        let n = arity(&op);
        if known.len() < n {
            // Unbalanced program; leave the remainder untouched.
            out.push(op);
            known.clear();
            continue;
        }
        let operands: Option<Vec<f64>> = known.split_off(known.len() - n).into_iter().collect();

        match operands.and_then(|args| fold(&op, &args)) {
            Some(value) => {
                out.truncate(out.len() - n);
                out.push(LinearOp::LoadConst(value));
                known.push(Some(value));
            }
            None => {
                out.push(op);
                known.push(None);
            }
        }
    }
    out
}

// FMA / FMSUB fusion over a five-op window.
fn fuse_fma(ops: Vec<LinearOp>) -> Vec<LinearOp> {
    use LinearOp::*;
    let mut out = Vec::with_capacity(ops.len());
    let mut i = 0;

    while i < ops.len() {
        if let [a @ (LoadVar(_) | LoadConst(_)), b @ (LoadVar(_) | LoadConst(_)), Mul, c @ (LoadVar(_) | LoadConst(_)), tail @ (Add | Sub), ..] =
            &ops[i..]
        {
            out.extend([a.clone(), b.clone(), c.clone()]);
            out.push(if matches!(tail, Add) { Fma } else { Fmsub });
            i += 5;
            continue;
        }
        out.push(ops[i].clone());
        i += 1;
    }
    out
}
