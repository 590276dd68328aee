//! This module lowers expression trees into callable Rust closures.
//!
//! Each expression is flattened into a postfix program, cleaned up by the
//! peephole optimiser in [`crate::opt`] and then executed by a small stack
//! interpreter that reads its operands straight from the [`Inputs`] vectors.
//!
//! The main entry points are:
//! - `build_function()` - Lowers a single expression into a `RateFunction`
//! - `build_combined_function()` - Lowers several expressions into one `CombinedFunction`
//! - `build_matrix_function()` - Lowers a grid of expressions into one `MatrixFunction`
//!
//! Every expression must be fully resolved (see
//! [`TranslationDictionary::resolve`](crate::dictionary::TranslationDictionary::resolve))
//! before it is lowered.

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    dictionary::Slot,
    errors::ModelError,
    expr::{int_power, Expr, LinearOp},
    opt::{arity, optimize},
    types::{CombinedFunction, Inputs, MatrixFunction, RateFunction},
};

/// A lowered expression: an optimised postfix program plus the stack depth it needs.
#[derive(Debug, Clone)]
pub(crate) struct Program {
    ops: Vec<LinearOp>,
    constant: Option<f64>,
    depth: usize,
}

impl Program {
    /// Lowers a resolved expression.
    ///
    /// # Errors
    /// Returns `ModelError::UnknownIdentifier` if the expression still contains
    /// identifiers that are not bound to a slot.
    pub(crate) fn compile(expr: &Expr) -> Result<Self, ModelError> {
        let unresolved = expr.unresolved();
        if !unresolved.is_empty() {
            return Err(ModelError::UnknownIdentifier(
                unresolved.into_iter().collect(),
            ));
        }

        let flattened = optimize(expr.flatten());
        let depth = flattened
            .ops
            .iter()
            .scan(0usize, |depth, op| {
                *depth = (*depth + 1).saturating_sub(arity(op));
                Some(*depth)
            })
            .max()
            .unwrap_or(0);

        Ok(Self {
            ops: flattened.ops,
            constant: flattened.constant_result,
            depth,
        })
    }

    /// Executes the program, using `stack` as scratch space.
    pub(crate) fn run(&self, inputs: &Inputs, stack: &mut Vec<f64>) -> f64 {
        if let Some(constant) = self.constant {
            return constant;
        }

        stack.clear();
        for op in &self.ops {
            match op {
                LinearOp::LoadConst(c) => stack.push(*c),
                LinearOp::LoadVar(slot) => stack.push(load(inputs, *slot)),
                LinearOp::Abs => unary(stack, f64::abs),
                LinearOp::Neg => unary(stack, |a| -a),
                LinearOp::PowConst(n) => {
                    let n = *n;
                    unary(stack, |a| int_power(a, n))
                }
                LinearOp::PowFloat(e) => {
                    let e = *e;
                    unary(stack, |a| a.powf(e))
                }
                LinearOp::Exp => unary(stack, f64::exp),
                LinearOp::Ln => unary(stack, f64::ln),
                LinearOp::Sqrt => unary(stack, f64::sqrt),
                LinearOp::Sin => unary(stack, f64::sin),
                LinearOp::Cos => unary(stack, f64::cos),
                LinearOp::Add => binary(stack, |a, b| a + b),
                LinearOp::Sub => binary(stack, |a, b| a - b),
                LinearOp::Mul => binary(stack, |a, b| a * b),
                LinearOp::Div => binary(stack, |a, b| a / b),
                LinearOp::PowExpr => binary(stack, f64::powf),
                LinearOp::Fma => {
                    let c = pop(stack);
                    binary(stack, |a, b| a.mul_add(b, c))
                }
                LinearOp::Fmsub => {
                    let c = pop(stack);
                    binary(stack, |a, b| a.mul_add(b, -c))
                }
            }
        }
        pop(stack)
    }
}

fn load(inputs: &Inputs, slot: Slot) -> f64 {
    let value = match slot {
        Slot::State(i) => inputs.y.get(i),
        Slot::Estimate(i) => inputs.p.get(i),
        Slot::Tune(i) => inputs.x_r.get(i),
        Slot::Time => return inputs.t,
    };
    value.copied().unwrap_or(f64::NAN)
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    stack.pop().unwrap_or(f64::NAN)
}

fn unary(stack: &mut Vec<f64>, f: impl Fn(f64) -> f64) {
    let a = pop(stack);
    stack.push(f(a));
}

fn binary(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> f64) {
    let b = pop(stack);
    let a = pop(stack);
    stack.push(f(a, b));
}

fn compile_all(exprs: &[Expr]) -> Result<Vec<Program>, ModelError> {
    exprs.par_iter().map(Program::compile).collect()
}

/// Builds an evaluation function from a resolved expression tree.
///
/// # Returns
/// A thread-safe function that takes the evaluation context and returns an f64 result.
/// The function is wrapped in an Arc to allow sharing between threads.
///
/// # Errors
/// Returns `ModelError::UnknownIdentifier` if the expression is not fully resolved.
pub fn build_function(expr: &Expr) -> Result<RateFunction, ModelError> {
    let program = Program::compile(expr)?;
    Ok(Arc::new(move |inputs: &Inputs| {
        let mut stack = Vec::with_capacity(program.depth);
        program.run(inputs, &mut stack)
    }))
}

/// Builds a function that evaluates several expressions in one call.
///
/// Expressions are lowered in parallel. The returned function writes the value of
/// expression `i` into `results[i]`; it evaluates `min(exprs.len(), results.len())`
/// expressions, so callers check the buffer length first.
///
/// # Errors
/// Returns `ModelError::UnknownIdentifier` if any expression is not fully resolved.
pub fn build_combined_function(exprs: &[Expr]) -> Result<CombinedFunction, ModelError> {
    let programs = compile_all(exprs)?;
    let depth = programs.iter().map(|p| p.depth).max().unwrap_or(0);
    let results_len = programs.len();

    Ok(Arc::new(move |inputs: &Inputs, results: &mut [f64]| {
        debug_assert_eq!(
            results.len(),
            results_len,
            "Results buffer has incorrect length"
        );
        let mut stack = Vec::with_capacity(depth);
        for (program, result) in programs.iter().zip(results.iter_mut()) {
            *result = program.run(inputs, &mut stack);
        }
    }))
}

/// Builds a function that evaluates a grid of expressions into a row-major matrix.
///
/// # Errors
/// Returns `ModelError::UnknownIdentifier` if any expression is not fully resolved.
pub fn build_matrix_function(rows: &[Vec<Expr>]) -> Result<MatrixFunction, ModelError> {
    let programs = rows
        .iter()
        .map(|row| compile_all(row))
        .collect::<Result<Vec<_>, _>>()?;
    let depth = programs
        .iter()
        .flatten()
        .map(|p| p.depth)
        .max()
        .unwrap_or(0);

    Ok(Arc::new(move |inputs: &Inputs, results: &mut [Vec<f64>]| {
        let mut stack = Vec::with_capacity(depth);
        for (row, out) in programs.iter().zip(results.iter_mut()) {
            for (program, result) in row.iter().zip(out.iter_mut()) {
                *result = program.run(inputs, &mut stack);
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::parse_expression;
    use crate::dictionary::{TargetProfile, TranslationDictionary};
    use std::collections::HashMap;

    fn dictionary() -> TranslationDictionary {
        let species = vec!["S".to_string(), "P".to_string()];
        let parameters = HashMap::from([
            ("vmax".to_string(), 2.0),
            ("km".to_string(), 0.5),
            ("ki".to_string(), 4.0),
        ]);
        TranslationDictionary::build(
            &species,
            &parameters,
            &["vmax".to_string()],
            &["ki".to_string()],
            TargetProfile::native(),
        )
        .unwrap()
        .with_time("t")
        .unwrap()
    }

    fn resolved(text: &str) -> Expr {
        dictionary()
            .resolve(&parse_expression(text).unwrap())
            .unwrap()
    }

    #[test]
    fn test_build_function() {
        let f = build_function(&resolved("vmax * S / (km + S)")).unwrap();
        let y = [1.5, 0.0];
        let p = [2.0];
        let inputs = Inputs::state(&y).with_params(&p);
        assert_eq!(f(&inputs), 2.0 * 1.5 / 2.0);
    }

    #[test]
    fn test_power_chains() {
        let y = [1.0, 0.0];
        let f = build_function(&resolved("2**3**2 * S")).unwrap();
        assert_eq!(f(&Inputs::state(&y)), 512.0);
        let f = build_function(&resolved("(2**3)**2 * S")).unwrap();
        assert_eq!(f(&Inputs::state(&y)), 64.0);
    }

    #[test]
    fn test_exponent_beyond_i32() {
        let f = build_function(&Expr::Pow(Box::new(resolved("S")), 4_294_967_298)).unwrap();
        let y = [0.5, 0.0];
        assert_eq!(f(&Inputs::state(&y)), 0.0);
        assert_eq!(
            *Expr::Pow(Box::new(Expr::Const(0.5)), 4_294_967_298).simplify(),
            Expr::Const(0.0)
        );
        assert_eq!(int_power(-1.0, 4_294_967_297), -1.0);
    }

    #[test]
    fn test_reads_every_vector() {
        let f = build_function(&resolved("vmax * S / (1 + P / ki) * exp(-t)")).unwrap();
        let y = [2.0, 4.0];
        let p = [3.0];
        let x_r = [4.0];
        let inputs = Inputs::state(&y)
            .with_params(&p)
            .with_tunables(&x_r)
            .at(1.0);
        let expected = 3.0 * 2.0 / (1.0 + 4.0 / 4.0) * (-1.0f64).exp();
        assert!((f(&inputs) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unresolved_expression_is_rejected() {
        let expr = parse_expression("vmax * S").unwrap();
        assert!(matches!(
            build_function(&expr),
            Err(ModelError::UnknownIdentifier(ids)) if ids == vec!["S", "vmax"]
        ));
    }

    #[test]
    fn test_build_combined_function() {
        let exprs = vec![resolved("-(vmax * S)"), resolved("vmax * S"), resolved("km")];
        let f = build_combined_function(&exprs).unwrap();
        let y = [1.0, 0.0];
        let p = [2.0];
        let mut out = [0.0; 3];
        f(&Inputs::state(&y).with_params(&p), &mut out);
        assert_eq!(out, [-2.0, 2.0, 0.5]);
    }

    #[test]
    fn test_build_matrix_function() {
        let rows = vec![
            vec![resolved("S"), resolved("0")],
            vec![resolved("P ^ 2"), resolved("sqrt(P)")],
        ];
        let f = build_matrix_function(&rows).unwrap();
        let y = [3.0, 4.0];
        let mut out = vec![vec![0.0; 2]; 2];
        f(&Inputs::state(&y), &mut out);
        assert_eq!(out, vec![vec![3.0, 0.0], vec![16.0, 2.0]]);
    }
}
