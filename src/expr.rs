//! Expression module for representing rate laws and mass balances.
//!
//! This module defines the expression tree every other part of the crate works on.
//! Rate laws are parsed into an `Expr` once; the tree then supports:
//! - Symbolic differentiation (used to derive the Jacobian)
//! - Simplification using algebraic rules
//! - Substitution of identifiers through a translation dictionary
//! - Flattening into a linear stack program for evaluation
//! - Rendering into the concrete syntax of an output target
//!
//! The main types are:
//!
//! - `Expr`: An enum representing different kinds of mathematical expressions
//! - `VarRef`: An identifier, optionally bound to a vector slot
//! - `LinearOp` / `FlattenedExpr`: The flattened stack program
//!
//! # Expression Tree Structure
//! The expression tree is built recursively with each node being one of:
//! - Leaf nodes: Constants and Variables
//! - Unary operations: Abs, Neg, Exp, Ln, Sqrt, Sin, Cos
//! - Binary operations: Add, Sub, Mul, Div
//! - Powers: integer, floating point and expression exponents
//!
//! # Symbolic Differentiation
//! The derivative method implements symbolic differentiation by recursively applying
//! calculus rules like:
//! - Product rule
//! - Quotient rule
//! - Chain rule
//! - Power rule
//! - Special function derivatives (exp, ln, sqrt, sin, cos)
//!
//! # Expression Simplification
//! The simplify method performs value-preserving algebraic simplifications including:
//! - Constant folding (e.g. 2 + 3 → 5)
//! - Identity rules (e.g. x + 0 → x, x * 1 → x, x * 0 → 0)
//! - Exponent rules (e.g. x^0 → 1, x^1 → x)
//! - Special function simplifications

use std::collections::BTreeSet;

use crate::dictionary::{Slot, TargetProfile, Token, TranslationDictionary};

/// Represents a reference to an identifier in an expression.
///
/// An identifier starts out symbolic (`slot == None`) and is bound to a vector
/// slot when the expression is substituted through a translation dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: String,
    pub slot: Option<Slot>,
}

/// An expression tree node representing mathematical operations.
///
/// The expression tree is built recursively using Box<Expr> for nested expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A reference to a species, parameter or time
    Var(VarRef),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation of an expression by a floating point constant
    PowFloat(Box<Expr>, f64),
    /// Exponentiation of an expression by another expression
    PowExpr(Box<Expr>, Box<Expr>),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
}

/// Linear operation for flattened expression evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum LinearOp {
    /// Load constant value
    LoadConst(f64),
    /// Load the value of a slot
    LoadVar(Slot),
    /// Add two values from stack positions
    Add,
    /// Subtract two values from stack positions
    Sub,
    /// Multiply two values from stack positions
    Mul,
    /// Divide two values from stack positions
    Div,
    /// Absolute value of stack top
    Abs,
    /// Negate stack top
    Neg,
    /// Power operation with constant exponent
    PowConst(i64),
    /// Power operation with floating point constant exponent
    PowFloat(f64),
    /// Power operation with expression exponent
    PowExpr,
    /// Exponential of stack top
    Exp,
    /// Natural log of stack top
    Ln,
    /// Square root of stack top
    Sqrt,
    /// Sine of stack top (argument in radians)
    Sin,
    /// Cosine of stack top (argument in radians)
    Cos,
    /// a × b + c  (fused)
    Fma,
    /// a × b − c  (fused)
    Fmsub,
}

/// Flattened expression representation for efficient evaluation
#[derive(Debug, Clone)]
pub struct FlattenedExpr {
    /// Linear sequence of operations
    pub ops: Vec<LinearOp>,
    /// Pre-computed constant result (if expression is constant)
    pub constant_result: Option<f64>,
}

/// Formats a numeric literal so that every target reads it as a real number.
///
/// Whole numbers keep a trailing `.0` (`2.0`, not `2`), which prevents integer
/// division in targets such as Stan.
pub fn format_literal(value: f64) -> String {
    format!("{value:?}")
}

/// Raises `base` to an integer power, falling back to `powf` for exponents
/// outside the `i32` range.
pub(crate) fn int_power(base: f64, exp: i64) -> f64 {
    match i32::try_from(exp) {
        Ok(n) => base.powi(n),
        Err(_) => base.powf(exp as f64),
    }
}

impl Expr {
    /// Creates an unbound variable node.
    pub fn var(name: &str) -> Expr {
        Expr::Var(VarRef {
            name: name.to_string(),
            slot: None,
        })
    }

    /// Checks whether this node is the constant zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(c) if *c == 0.0)
    }

    /// Returns the names of all identifiers referenced by the expression, sorted.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.visit_vars(&mut |var| {
            symbols.insert(var.name.clone());
        });
        symbols
    }

    /// Returns the names of identifiers that are not bound to a slot, sorted.
    pub fn unresolved(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit_vars(&mut |var| {
            if var.slot.is_none() {
                names.insert(var.name.clone());
            }
        });
        names
    }

    fn visit_vars<F: FnMut(&VarRef)>(&self, f: &mut F) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(var_ref) => f(var_ref),
            Expr::Add(left, right)
            | Expr::Sub(left, right)
            | Expr::Mul(left, right)
            | Expr::Div(left, right)
            | Expr::PowExpr(left, right) => {
                left.visit_vars(f);
                right.visit_vars(f);
            }
            Expr::Abs(expr)
            | Expr::Pow(expr, _)
            | Expr::PowFloat(expr, _)
            | Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::Sqrt(expr)
            | Expr::Sin(expr)
            | Expr::Cos(expr)
            | Expr::Neg(expr) => expr.visit_vars(f),
        }
    }

    /// Computes the symbolic derivative of this expression with respect to a variable.
    ///
    /// Recursively applies the rules of differentiation to build a new expression tree
    /// representing the derivative. The rules implemented are:
    /// - d/dx(c) = 0 for constants
    /// - d/dx(x) = 1 for the variable we're differentiating with respect to
    /// - d/dx(y) = 0 for other variables
    /// - Sum rule: d/dx(f + g) = df/dx + dg/dx
    /// - Product rule: d/dx(f * g) = f * dg/dx + g * df/dx
    /// - Quotient rule: d/dx(f/g) = (g * df/dx - f * dg/dx) / g^2
    /// - Chain rule for abs: d/dx|f| = f/|f| * df/dx
    /// - Power rule: d/dx(f^n) = n * f^(n-1) * df/dx
    /// - General power rule: d/dx(f^g) = f^g * (g' * ln(f) + g * f'/f)
    /// - Chain rule for exp, ln, sqrt, sin and cos
    /// - Negation: d/dx(-f) = -(df/dx)
    ///
    /// The result is not simplified; call [`Expr::simplify`] on it.
    pub fn derivative(&self, with_respect_to: &str) -> Box<Expr> {
        match self {
            Expr::Const(_) => Box::new(Expr::Const(0.0)),

            Expr::Var(var_ref) => {
                if var_ref.name == with_respect_to {
                    Box::new(Expr::Const(1.0))
                } else {
                    Box::new(Expr::Const(0.0))
                }
            }

            Expr::Add(left, right) => Box::new(Expr::Add(
                left.derivative(with_respect_to),
                right.derivative(with_respect_to),
            )),

            Expr::Sub(left, right) => Box::new(Expr::Sub(
                left.derivative(with_respect_to),
                right.derivative(with_respect_to),
            )),

            Expr::Mul(left, right) => Box::new(Expr::Add(
                Box::new(Expr::Mul(left.clone(), right.derivative(with_respect_to))),
                Box::new(Expr::Mul(right.clone(), left.derivative(with_respect_to))),
            )),

            Expr::Div(left, right) => Box::new(Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(right.clone(), left.derivative(with_respect_to))),
                    Box::new(Expr::Mul(left.clone(), right.derivative(with_respect_to))),
                )),
                Box::new(Expr::Pow(right.clone(), 2)),
            )),

            Expr::Abs(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(expr.clone(), Box::new(Expr::Abs(expr.clone())))),
                expr.derivative(with_respect_to),
            )),

            Expr::Pow(base, exp) => Box::new(Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*exp as f64)),
                    Box::new(match exp.checked_sub(1) {
                        Some(n) => Expr::Pow(base.clone(), n),
                        None => Expr::PowFloat(base.clone(), *exp as f64 - 1.0),
                    }),
                )),
                base.derivative(with_respect_to),
            )),

            Expr::PowFloat(base, exp) => Box::new(Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(*exp)),
                    Box::new(Expr::PowFloat(base.clone(), exp - 1.0)),
                )),
                base.derivative(with_respect_to),
            )),

            Expr::PowExpr(base, exponent) => Box::new(Expr::Mul(
                Box::new(Expr::PowExpr(base.clone(), exponent.clone())),
                Box::new(Expr::Add(
                    Box::new(Expr::Mul(
                        exponent.derivative(with_respect_to),
                        Box::new(Expr::Ln(base.clone())),
                    )),
                    Box::new(Expr::Mul(
                        exponent.clone(),
                        Box::new(Expr::Div(base.derivative(with_respect_to), base.clone())),
                    )),
                )),
            )),

            Expr::Exp(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Exp(expr.clone())),
                expr.derivative(with_respect_to),
            )),

            Expr::Ln(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(Box::new(Expr::Const(1.0)), expr.clone())),
                expr.derivative(with_respect_to),
            )),

            Expr::Sqrt(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Mul(
                        Box::new(Expr::Const(2.0)),
                        Box::new(Expr::Sqrt(expr.clone())),
                    )),
                )),
                expr.derivative(with_respect_to),
            )),

            Expr::Sin(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Cos(expr.clone())),
                expr.derivative(with_respect_to),
            )),

            Expr::Cos(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Neg(Box::new(Expr::Sin(expr.clone())))),
                expr.derivative(with_respect_to),
            )),

            Expr::Neg(expr) => Box::new(Expr::Neg(expr.derivative(with_respect_to))),
        }
    }

    /// Simplifies the expression by folding constants and applying basic algebraic rules.
    ///
    /// # Constant Folding
    /// - Evaluates constant expressions: 2 + 3 → 5
    /// - Simplifies operations with special constants: x * 0 → 0
    ///
    /// # Identity Rules
    /// - Additive identity: x + 0 → x, x - 0 → x, 0 - x → -x
    /// - Multiplicative identity: x * 1 → x, x * (-1) → -x
    /// - Division identity: x / 1 → x, x / x → 1
    /// - Like terms: a*x + b*x → (a+b)*x
    ///
    /// # Exponent Rules
    /// - Zero exponent: x^0 → 1
    /// - First power: x^1 → x
    /// - Nested integer exponents: (x^a)^b → x^(a*b)
    /// - Products of powers: x^a * x^b → x^(a+b)
    ///
    /// # Special Function Simplification
    /// - Absolute value: |-3| → 3, ||x|| → |x|
    /// - Double negation: -(-x) → x
    /// - Inverse functions: exp(ln(x)) → x, ln(exp(x)) → x
    ///
    /// # Returns
    /// A new simplified expression tree
    pub fn simplify(&self) -> Box<Expr> {
        match self {
            Expr::Const(_) | Expr::Var(_) => Box::new(self.clone()),

            Expr::Add(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    // Fold constants: 1 + 2 -> 3
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a + b)),
                    // Identity: x + 0 -> x
                    (expr, Expr::Const(0.0)) | (Expr::Const(0.0), expr) => Box::new(expr.clone()),
                    // x + (-y) -> x - y
                    (x, Expr::Neg(y)) => Box::new(Expr::Sub(Box::new(x.clone()), y.clone())),
                    // Combine like terms: c1*x + c2*x -> (c1+c2)*x
                    (Expr::Mul(a1, x1), Expr::Mul(a2, x2))
                        if x1 == x2
                            && matches!(**a1, Expr::Const(_))
                            && matches!(**a2, Expr::Const(_)) =>
                    {
                        let combined_coeff = Expr::Add(a1.clone(), a2.clone()).simplify();
                        Expr::Mul(combined_coeff, x1.clone()).simplify()
                    }
                    // Associativity: (x + c1) + c2 -> x + (c1 + c2)
                    (Expr::Add(x, c1), c2)
                        if matches!(**c1, Expr::Const(_)) && matches!(*c2, Expr::Const(_)) =>
                    {
                        Box::new(Expr::Add(
                            x.clone(),
                            Expr::Add(c1.clone(), Box::new(c2.clone())).simplify(),
                        ))
                    }
                    _ => Box::new(Expr::Add(l, r)),
                }
            }

            Expr::Sub(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    // Fold constants: 3 - 2 -> 1
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a - b)),
                    // Identity: x - 0 -> x
                    (expr, Expr::Const(0.0)) => Box::new(expr.clone()),
                    // 0 - x -> -x
                    (Expr::Const(0.0), expr) => Expr::Neg(Box::new(expr.clone())).simplify(),
                    // Zero: x - x -> 0
                    (a, b) if a == b => Box::new(Expr::Const(0.0)),
                    // x - (-y) -> x + y
                    (x, Expr::Neg(y)) => Box::new(Expr::Add(Box::new(x.clone()), y.clone())),
                    // Combine like terms: c1*x - c2*x -> (c1-c2)*x
                    (Expr::Mul(a1, x1), Expr::Mul(a2, x2))
                        if x1 == x2
                            && matches!(**a1, Expr::Const(_))
                            && matches!(**a2, Expr::Const(_)) =>
                    {
                        let combined_coeff = Expr::Sub(a1.clone(), a2.clone()).simplify();
                        Expr::Mul(combined_coeff, x1.clone()).simplify()
                    }
                    _ => Box::new(Expr::Sub(l, r)),
                }
            }

            Expr::Mul(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    // Fold constants: 2 * 3 -> 6
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a * b)),
                    // Zero property: x * 0 -> 0
                    (Expr::Const(0.0), _) | (_, Expr::Const(0.0)) => Box::new(Expr::Const(0.0)),
                    // Identity: x * 1 -> x
                    (expr, Expr::Const(1.0)) | (Expr::Const(1.0), expr) => Box::new(expr.clone()),
                    // Negative one: x * (-1) -> -x
                    (expr, Expr::Const(-1.0)) | (Expr::Const(-1.0), expr) => {
                        Expr::Neg(Box::new(expr.clone())).simplify()
                    }
                    // Combine exponents: x^a * x^b -> x^(a+b)
                    (Expr::Pow(b1, e1), Expr::Pow(b2, e2)) if b1 == b2 => {
                        Expr::Pow(b1.clone(), e1 + e2).simplify()
                    }
                    // Associativity: c1 * (c2 * x) -> (c1 * c2) * x
                    (Expr::Const(c1), Expr::Mul(c2, x)) | (Expr::Mul(c2, x), Expr::Const(c1))
                        if matches!(**c2, Expr::Const(_)) =>
                    {
                        let coeff = Expr::Mul(Box::new(Expr::Const(*c1)), c2.clone()).simplify();
                        Box::new(Expr::Mul(coeff, x.clone()))
                    }
                    // x * x -> x^2
                    (a, b) if a == b => Box::new(Expr::Pow(l.clone(), 2)),
                    _ => Box::new(Expr::Mul(l, r)),
                }
            }

            Expr::Div(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    // Fold constants: 6 / 2 -> 3
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Box::new(Expr::Const(a / b)),
                    // Zero numerator: 0 / x -> 0
                    (Expr::Const(0.0), _) => Box::new(Expr::Const(0.0)),
                    // Identity: x / 1 -> x
                    (expr, Expr::Const(1.0)) => Box::new(expr.clone()),
                    // Division by negative one: x / (-1) -> -x
                    (expr, Expr::Const(-1.0)) => Expr::Neg(Box::new(expr.clone())).simplify(),
                    // Identity: x / x -> 1
                    (a, b) if a == b => Box::new(Expr::Const(1.0)),
                    // Simplify exponents: x^a / x^b -> x^(a-b)
                    (Expr::Pow(b1, e1), Expr::Pow(b2, e2)) if b1 == b2 => {
                        Expr::Pow(b1.clone(), e1 - e2).simplify()
                    }
                    // Simplify nested divisions: (x/y)/z -> x/(y*z)
                    (Expr::Div(x, y), z) => Box::new(Expr::Div(
                        x.clone(),
                        Box::new(Expr::Mul(y.clone(), Box::new(z.clone()))),
                    )),
                    _ => Box::new(Expr::Div(l, r)),
                }
            }

            Expr::Abs(expr) => {
                let e = expr.simplify();
                match &*e {
                    // Fold constants: abs(3) -> 3
                    Expr::Const(a) => Box::new(Expr::Const(a.abs())),
                    // Nested abs: abs(abs(x)) -> abs(x)
                    Expr::Abs(inner) => Box::new(Expr::Abs(inner.clone())),
                    // abs(-x) -> abs(x)
                    Expr::Neg(inner) => Box::new(Expr::Abs(inner.clone())),
                    // abs(x^2) -> x^2 (even powers are never negative)
                    Expr::Pow(_, exp) if exp % 2 == 0 => e,
                    _ => Box::new(Expr::Abs(e)),
                }
            }

            Expr::Pow(base, exp) => {
                let b = base.simplify();
                match (&*b, exp) {
                    // x^0 -> 1 (including 0^0 = 1 by convention)
                    (_, 0) => Box::new(Expr::Const(1.0)),
                    // Fold constants: 2^3 -> 8
                    (Expr::Const(a), exp) => Box::new(Expr::Const(int_power(*a, *exp))),
                    // Identity: x^1 -> x
                    (expr, 1) => Box::new(expr.clone()),
                    // Simplify negative exponents: x^(-n) -> 1/(x^n)
                    (expr, exp) if *exp < 0 && *exp != i64::MIN => Box::new(Expr::Div(
                        Box::new(Expr::Const(1.0)),
                        Expr::Pow(Box::new(expr.clone()), -exp).simplify(),
                    )),
                    // Nested exponents: (x^a)^b -> x^(a*b)
                    (Expr::Pow(inner_base, inner_exp), outer_exp)
                        if inner_exp.checked_mul(*outer_exp).is_some() =>
                    {
                        Expr::Pow(inner_base.clone(), inner_exp * outer_exp).simplify()
                    }
                    _ => Box::new(Expr::Pow(b, *exp)),
                }
            }

            Expr::PowFloat(base, exp) => {
                let b = base.simplify();
                match (&*b, exp) {
                    // x^0.0 -> 1
                    (_, exp) if *exp == 0.0 => Box::new(Expr::Const(1.0)),
                    // Fold constants: 2.0^3.5 -> result
                    (Expr::Const(a), exp) => Box::new(Expr::Const(a.powf(*exp))),
                    // Identity: x^1.0 -> x
                    (expr, exp) if *exp == 1.0 => Box::new(expr.clone()),
                    // Convert to integer power if possible
                    (expr, exp) if exp.fract() == 0.0 && exp.abs() < i32::MAX as f64 => {
                        Expr::Pow(Box::new(expr.clone()), *exp as i64).simplify()
                    }
                    _ => Box::new(Expr::PowFloat(b, *exp)),
                }
            }

            Expr::PowExpr(base, exponent) => {
                let b = base.simplify();
                let e = exponent.simplify();
                match (&*b, &*e) {
                    // Fold constants: 2^3 -> 8
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a.powf(*b))),
                    // Constant exponents become power nodes
                    (expr, Expr::Const(exp)) => {
                        Expr::PowFloat(Box::new(expr.clone()), *exp).simplify()
                    }
                    _ => Box::new(Expr::PowExpr(b, e)),
                }
            }

            Expr::Exp(expr) => {
                let e = expr.simplify();
                match &*e {
                    // Fold constants: exp(c) -> e^c
                    Expr::Const(a) => Box::new(Expr::Const(a.exp())),
                    // exp(ln(x)) -> x
                    Expr::Ln(inner) => inner.clone(),
                    _ => Box::new(Expr::Exp(e)),
                }
            }

            Expr::Ln(expr) => {
                let e = expr.simplify();
                match &*e {
                    // Fold constants: ln(c) for c > 0
                    Expr::Const(a) if *a > 0.0 => Box::new(Expr::Const(a.ln())),
                    // ln(exp(x)) -> x
                    Expr::Exp(inner) => inner.clone(),
                    _ => Box::new(Expr::Ln(e)),
                }
            }

            Expr::Sqrt(expr) => {
                let e = expr.simplify();
                match &*e {
                    // Fold constants: sqrt(c) for c >= 0
                    Expr::Const(a) if *a >= 0.0 => Box::new(Expr::Const(a.sqrt())),
                    // sqrt(x^2) -> abs(x)
                    Expr::Pow(x, 2) => Box::new(Expr::Abs(x.clone())),
                    _ => Box::new(Expr::Sqrt(e)),
                }
            }

            Expr::Sin(expr) => {
                let e = expr.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.sin())),
                    _ => Box::new(Expr::Sin(e)),
                }
            }

            Expr::Cos(expr) => {
                let e = expr.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.cos())),
                    _ => Box::new(Expr::Cos(e)),
                }
            }

            Expr::Neg(expr) => {
                let e = expr.simplify();
                match &*e {
                    // Fold constants, keeping 0 positive: -(0) -> 0
                    Expr::Const(a) if *a == 0.0 => Box::new(Expr::Const(0.0)),
                    Expr::Const(a) => Box::new(Expr::Const(-a)),
                    // Double negation: -(-x) -> x
                    Expr::Neg(inner) => inner.clone(),
                    // Distribute negation: -(x - y) -> y - x
                    Expr::Sub(x, y) => Box::new(Expr::Sub(y.clone(), x.clone())),
                    // Factor out negation: -(c*x) -> (-c)*x
                    Expr::Mul(c, x) if matches!(**c, Expr::Const(_)) => {
                        Expr::Mul(Box::new(Expr::Neg(c.clone())), x.clone()).simplify()
                    }
                    _ => Box::new(Expr::Neg(e)),
                }
            }
        }
    }

    /// Inserts an expression by replacing nodes that match a predicate.
    ///
    /// Recursively traverses the expression tree and replaces any nodes that match
    /// the given predicate with the replacement expression.
    ///
    /// # Arguments
    /// * `predicate` - A closure that determines which nodes to replace
    /// * `replacement` - The expression to insert where the predicate matches
    ///
    /// # Returns
    /// A new expression tree with the replacements applied
    pub fn insert<F>(&self, predicate: F, replacement: &Expr) -> Box<Expr>
    where
        F: Fn(&Expr) -> bool,
    {
        self.rebuild(&|expr| predicate(expr).then(|| replacement.clone()))
    }

    /// Substitutes identifiers through a translation dictionary.
    ///
    /// Every unbound identifier found in the dictionary is replaced as a whole node:
    /// literal tokens become constants, slot tokens bind the identifier to its slot.
    /// Identifiers missing from the dictionary are left untouched and unused
    /// dictionary entries are ignored. Substituting an already substituted tree
    /// returns the same tree.
    pub fn substitute(&self, dictionary: &TranslationDictionary) -> Box<Expr> {
        self.rebuild(&|expr| match expr {
            Expr::Var(VarRef { name, slot: None }) => match dictionary.get(name)? {
                Token::Literal(value) => Some(Expr::Const(*value)),
                Token::Slot(slot) => Some(Expr::Var(VarRef {
                    name: name.clone(),
                    slot: Some(*slot),
                })),
            },
            _ => None,
        })
    }

    /// Rebuilds the tree bottom-up, replacing every node for which `replace`
    /// returns a new expression.
    fn rebuild<F>(&self, replace: &F) -> Box<Expr>
    where
        F: Fn(&Expr) -> Option<Expr>,
    {
        if let Some(replacement) = replace(self) {
            return Box::new(replacement);
        }
        match self {
            Expr::Const(_) | Expr::Var(_) => Box::new(self.clone()),
            Expr::Add(left, right) => {
                Box::new(Expr::Add(left.rebuild(replace), right.rebuild(replace)))
            }
            Expr::Mul(left, right) => {
                Box::new(Expr::Mul(left.rebuild(replace), right.rebuild(replace)))
            }
            Expr::Sub(left, right) => {
                Box::new(Expr::Sub(left.rebuild(replace), right.rebuild(replace)))
            }
            Expr::Div(left, right) => {
                Box::new(Expr::Div(left.rebuild(replace), right.rebuild(replace)))
            }
            Expr::Abs(expr) => Box::new(Expr::Abs(expr.rebuild(replace))),
            Expr::Pow(base, exp) => Box::new(Expr::Pow(base.rebuild(replace), *exp)),
            Expr::PowFloat(base, exp) => Box::new(Expr::PowFloat(base.rebuild(replace), *exp)),
            Expr::PowExpr(base, exponent) => Box::new(Expr::PowExpr(
                base.rebuild(replace),
                exponent.rebuild(replace),
            )),
            Expr::Exp(expr) => Box::new(Expr::Exp(expr.rebuild(replace))),
            Expr::Ln(expr) => Box::new(Expr::Ln(expr.rebuild(replace))),
            Expr::Sqrt(expr) => Box::new(Expr::Sqrt(expr.rebuild(replace))),
            Expr::Sin(expr) => Box::new(Expr::Sin(expr.rebuild(replace))),
            Expr::Cos(expr) => Box::new(Expr::Cos(expr.rebuild(replace))),
            Expr::Neg(expr) => Box::new(Expr::Neg(expr.rebuild(replace))),
        }
    }

    /// Converts the expression tree to a flattened stack program.
    ///
    /// Unbound identifiers are loaded as NaN; callers resolve the expression
    /// through a translation dictionary first.
    pub fn flatten(&self) -> FlattenedExpr {
        if let Some(constant) = self.try_evaluate_constant() {
            return FlattenedExpr {
                ops: vec![LinearOp::LoadConst(constant)],
                constant_result: Some(constant),
            };
        }

        let mut ops = Vec::new();
        self.flatten_recursive(&mut ops);

        FlattenedExpr {
            ops,
            constant_result: None,
        }
    }

    /// Tries to evaluate expression as constant
    fn try_evaluate_constant(&self) -> Option<f64> {
        match self {
            Expr::Const(val) => Some(*val),
            Expr::Var(_) => None,
            Expr::Add(left, right) => {
                Some(left.try_evaluate_constant()? + right.try_evaluate_constant()?)
            }
            Expr::Sub(left, right) => {
                Some(left.try_evaluate_constant()? - right.try_evaluate_constant()?)
            }
            Expr::Mul(left, right) => {
                Some(left.try_evaluate_constant()? * right.try_evaluate_constant()?)
            }
            Expr::Div(left, right) => {
                let r = right.try_evaluate_constant()?;
                if r == 0.0 {
                    return None;
                }
                Some(left.try_evaluate_constant()? / r)
            }
            Expr::Abs(expr) => Some(expr.try_evaluate_constant()?.abs()),
            Expr::Neg(expr) => Some(-expr.try_evaluate_constant()?),
            Expr::Pow(base, exp) => Some(int_power(base.try_evaluate_constant()?, *exp)),
            Expr::PowFloat(base, exp) => Some(base.try_evaluate_constant()?.powf(*exp)),
            Expr::PowExpr(base, exponent) => Some(
                base.try_evaluate_constant()?
                    .powf(exponent.try_evaluate_constant()?),
            ),
            Expr::Exp(expr) => Some(expr.try_evaluate_constant()?.exp()),
            Expr::Ln(expr) => {
                let val = expr.try_evaluate_constant()?;
                if val <= 0.0 {
                    return None;
                }
                Some(val.ln())
            }
            Expr::Sqrt(expr) => {
                let val = expr.try_evaluate_constant()?;
                if val < 0.0 {
                    return None;
                }
                Some(val.sqrt())
            }
            Expr::Sin(expr) => Some(expr.try_evaluate_constant()?.sin()),
            Expr::Cos(expr) => Some(expr.try_evaluate_constant()?.cos()),
        }
    }

    /// Recursively flattens expression into linear operations
    fn flatten_recursive(&self, ops: &mut Vec<LinearOp>) {
        match self {
            Expr::Const(val) => ops.push(LinearOp::LoadConst(*val)),
            Expr::Var(var_ref) => match var_ref.slot {
                Some(slot) => ops.push(LinearOp::LoadVar(slot)),
                None => ops.push(LinearOp::LoadConst(f64::NAN)),
            },
            Expr::Add(left, right) => {
                left.flatten_recursive(ops);
                right.flatten_recursive(ops);
                ops.push(LinearOp::Add);
            }
            Expr::Sub(left, right) => {
                left.flatten_recursive(ops);
                right.flatten_recursive(ops);
                ops.push(LinearOp::Sub);
            }
            Expr::Mul(left, right) => {
                left.flatten_recursive(ops);
                right.flatten_recursive(ops);
                ops.push(LinearOp::Mul);
            }
            Expr::Div(left, right) => {
                left.flatten_recursive(ops);
                right.flatten_recursive(ops);
                ops.push(LinearOp::Div);
            }
            Expr::Abs(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Abs);
            }
            Expr::Neg(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Neg);
            }
            Expr::Pow(base, exp) => {
                base.flatten_recursive(ops);
                ops.push(LinearOp::PowConst(*exp));
            }
            Expr::PowFloat(base, exp) => {
                base.flatten_recursive(ops);
                ops.push(LinearOp::PowFloat(*exp));
            }
            Expr::PowExpr(base, exponent) => {
                base.flatten_recursive(ops);
                exponent.flatten_recursive(ops);
                ops.push(LinearOp::PowExpr);
            }
            Expr::Exp(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Exp);
            }
            Expr::Ln(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Ln);
            }
            Expr::Sqrt(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Sqrt);
            }
            Expr::Sin(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Sin);
            }
            Expr::Cos(expr) => {
                expr.flatten_recursive(ops);
                ops.push(LinearOp::Cos);
            }
        }
    }

    /// Renders the expression in the concrete syntax of an output target.
    ///
    /// Binary operations are fully parenthesised, bound identifiers are written as
    /// vector references of the profile (`y[1]`, `p[2]`, `t`), unbound identifiers
    /// by name, and powers with the profile's exponent operator.
    pub fn render(&self, profile: &TargetProfile) -> String {
        let pow = profile.exponent.as_str();
        match self {
            Expr::Const(val) if *val < 0.0 => format!("({})", format_literal(*val)),
            Expr::Const(val) => format_literal(*val),
            Expr::Var(var_ref) => match var_ref.slot {
                Some(slot) => profile.reference(slot),
                None => var_ref.name.clone(),
            },
            Expr::Add(left, right) => {
                format!("({} + {})", left.render(profile), right.render(profile))
            }
            Expr::Sub(left, right) => {
                format!("({} - {})", left.render(profile), right.render(profile))
            }
            Expr::Mul(left, right) => {
                format!("({} * {})", left.render(profile), right.render(profile))
            }
            Expr::Div(left, right) => {
                format!("({} / {})", left.render(profile), right.render(profile))
            }
            Expr::Abs(expr) => format!("abs({})", expr.render(profile)),
            Expr::Pow(base, exp) if *exp < 0 => format!("({}{pow}({exp}))", base.render(profile)),
            Expr::Pow(base, exp) => format!("({}{pow}{exp})", base.render(profile)),
            Expr::PowFloat(base, exp) => format!(
                "({}{pow}{})",
                base.render(profile),
                Expr::Const(*exp).render(profile)
            ),
            Expr::PowExpr(base, exponent) => format!(
                "({}{pow}{})",
                base.render(profile),
                exponent.render(profile)
            ),
            Expr::Exp(expr) => format!("exp({})", expr.render(profile)),
            Expr::Ln(expr) => format!("{}({})", profile.ln, expr.render(profile)),
            Expr::Sqrt(expr) => format!("sqrt({})", expr.render(profile)),
            Expr::Sin(expr) => format!("sin({})", expr.render(profile)),
            Expr::Cos(expr) => format!("cos({})", expr.render(profile)),
            Expr::Neg(expr) => format!("(-{})", expr.render(profile)),
        }
    }
}

/// Implements string formatting for expressions.
///
/// This implementation converts expressions to their standard mathematical notation:
/// - Constants are formatted as numbers
/// - Variables are formatted as their names
/// - Binary operations (+,-,*,/) are wrapped in parentheses
/// - Functions (exp, ln, sqrt, sin, cos) use function call notation
/// - Absolute value uses |x| notation
/// - Exponents use ^
/// - Negation uses - prefix
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var(var_ref) => write!(f, "{0}", var_ref.name),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Abs(expr) => write!(f, "|{expr}|"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowFloat(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowExpr(base, exponent) => write!(f, "({base}^{exponent})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Sin(expr) => write!(f, "sin({expr})"),
            Expr::Cos(expr) => write!(f, "cos({expr})"),
            Expr::Neg(expr) => write!(f, "-({expr})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::TargetProfile;

    // Helper function to create a variable
    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::var(name))
    }

    fn bound(name: &str, slot: Slot) -> Box<Expr> {
        Box::new(Expr::Var(VarRef {
            name: name.to_string(),
            slot: Some(slot),
        }))
    }

    #[test]
    fn test_simplify() {
        // 2 + 3 → 5
        assert_eq!(
            *Expr::Add(Box::new(Expr::Const(2.0)), Box::new(Expr::Const(3.0))).simplify(),
            Expr::Const(5.0)
        );

        // x + 0 → x
        assert_eq!(
            *Expr::Add(var("x"), Box::new(Expr::Const(0.0))).simplify(),
            *var("x")
        );

        // x * 1 → x
        assert_eq!(
            *Expr::Mul(var("x"), Box::new(Expr::Const(1.0))).simplify(),
            *var("x")
        );

        // x * 0 → 0
        assert_eq!(
            *Expr::Mul(var("x"), Box::new(Expr::Const(0.0))).simplify(),
            Expr::Const(0.0)
        );

        // x / 1 → x
        assert_eq!(
            *Expr::Div(var("x"), Box::new(Expr::Const(1.0))).simplify(),
            *var("x")
        );

        // x / x → 1
        assert_eq!(*Expr::Div(var("x"), var("x")).simplify(), Expr::Const(1.0));

        // x^0 → 1, x^1 → x
        assert_eq!(*Expr::Pow(var("x"), 0).simplify(), Expr::Const(1.0));
        assert_eq!(*Expr::Pow(var("x"), 1).simplify(), *var("x"));

        // |-3| → 3
        assert_eq!(
            *Expr::Abs(Box::new(Expr::Const(-3.0))).simplify(),
            Expr::Const(3.0)
        );

        // ||x|| → |x|
        assert_eq!(
            *Expr::Abs(Box::new(Expr::Abs(var("x")))).simplify(),
            Expr::Abs(var("x"))
        );

        // 0 - x → -x
        assert_eq!(
            *Expr::Sub(Box::new(Expr::Const(0.0)), var("x")).simplify(),
            Expr::Neg(var("x"))
        );

        // -(0) stays a positive zero
        let zero = Expr::Neg(Box::new(Expr::Const(0.0))).simplify();
        assert!(zero.is_zero());
        assert!(matches!(*zero, Expr::Const(c) if c.is_sign_positive()));
    }

    #[test]
    fn test_insert() {
        let expr = Box::new(Expr::Add(var("x"), var("y")));
        let replacement = Box::new(Expr::Mul(Box::new(Expr::Const(2.0)), var("z")));

        let result = expr.insert(|e| matches!(e, Expr::Var(v) if v.name == "x"), &replacement);

        assert_eq!(
            *result,
            Expr::Add(
                Box::new(Expr::Mul(Box::new(Expr::Const(2.0)), var("z"))),
                var("y"),
            )
        );
    }

    #[test]
    fn test_derivative() {
        assert_eq!(*Expr::Const(5.0).derivative("x"), Expr::Const(0.0));

        assert_eq!(*var("x").derivative("x"), Expr::Const(1.0));
        assert_eq!(*var("y").derivative("x"), Expr::Const(0.0));

        let sum = Box::new(Expr::Add(var("x"), var("y")));
        assert_eq!(
            *sum.derivative("x"),
            Expr::Add(Box::new(Expr::Const(1.0)), Box::new(Expr::Const(0.0)))
        );

        let product = Box::new(Expr::Mul(var("x"), var("y")));
        assert_eq!(
            *product.derivative("x"),
            Expr::Add(
                Box::new(Expr::Mul(var("x"), Box::new(Expr::Const(0.0)))),
                Box::new(Expr::Mul(var("y"), Box::new(Expr::Const(1.0))))
            )
        );

        let power = Box::new(Expr::Pow(var("x"), 3));
        assert_eq!(
            *power.derivative("x"),
            Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(3.0)),
                    Box::new(Expr::Pow(var("x"), 2))
                )),
                Box::new(Expr::Const(1.0))
            )
        );
    }

    #[test]
    fn test_derivative_of_absent_symbol_is_zero() {
        // Michaelis-Menten rate with respect to an unrelated species
        let rate = Expr::Div(
            Box::new(Expr::Mul(var("vmax"), var("S"))),
            Box::new(Expr::Add(var("km"), var("S"))),
        );
        assert_eq!(*rate.derivative("P").simplify(), Expr::Const(0.0));

        let transcendental = Expr::Mul(
            Box::new(Expr::Exp(var("S"))),
            Box::new(Expr::Sqrt(Box::new(Expr::Ln(var("S"))))),
        );
        assert_eq!(*transcendental.derivative("P").simplify(), Expr::Const(0.0));
    }

    #[test]
    fn test_derivative_simplifies_linear_rate() {
        // d/dA (k1 * A) = k1
        let rate = Expr::Mul(var("k1"), var("A"));
        assert_eq!(*rate.derivative("A").simplify(), *var("k1"));
    }

    #[test]
    fn test_complex_simplifications() {
        // (x + 0) * (y + 0) → x * y
        let expr = Box::new(Expr::Mul(
            Box::new(Expr::Add(var("x"), Box::new(Expr::Const(0.0)))),
            Box::new(Expr::Add(var("y"), Box::new(Expr::Const(0.0)))),
        ));
        assert_eq!(*expr.simplify(), Expr::Mul(var("x"), var("y")));

        // -(-x) → x
        let expr = Box::new(Expr::Neg(Box::new(Expr::Neg(var("x")))));
        assert_eq!(*expr.simplify(), *var("x"));

        // (1 * x) * (y * 1) → x * y
        let expr = Box::new(Expr::Mul(
            Box::new(Expr::Mul(Box::new(Expr::Const(1.0)), var("x"))),
            Box::new(Expr::Mul(var("y"), Box::new(Expr::Const(1.0)))),
        ));
        assert_eq!(*expr.simplify(), Expr::Mul(var("x"), var("y")));

        // (x/y)/(x/y) → 1
        let div = Box::new(Expr::Div(var("x"), var("y")));
        let expr = Box::new(Expr::Div(div.clone(), div));
        assert_eq!(*expr.simplify(), Expr::Const(1.0));
    }

    #[test]
    fn test_special_functions() {
        let expr = Box::new(Expr::Sqrt(Box::new(Expr::Pow(var("x"), 2))));
        assert_eq!(*expr.simplify(), Expr::Abs(var("x")));

        assert_eq!(
            *Expr::Exp(Box::new(Expr::Const(0.0))).simplify(),
            Expr::Const(1.0)
        );
        assert_eq!(
            *Expr::Ln(Box::new(Expr::Const(1.0))).simplify(),
            Expr::Const(0.0)
        );
        assert_eq!(
            *Expr::Ln(Box::new(Expr::Exp(var("x")))).simplify(),
            *var("x")
        );
    }

    #[test]
    fn test_symbols_and_unresolved() {
        let expr = Expr::Add(
            Box::new(Expr::Mul(var("k1"), bound("A", Slot::State(0)))),
            Box::new(Expr::Div(var("k10"), var("B"))),
        );
        assert_eq!(
            expr.symbols().into_iter().collect::<Vec<_>>(),
            vec!["A", "B", "k1", "k10"]
        );
        assert_eq!(
            expr.unresolved().into_iter().collect::<Vec<_>>(),
            vec!["B", "k1", "k10"]
        );
    }

    #[test]
    fn test_flatten_constant() {
        let expr = Expr::Mul(
            Box::new(Expr::Const(2.0)),
            Box::new(Expr::Add(
                Box::new(Expr::Const(1.0)),
                Box::new(Expr::Const(2.0)),
            )),
        );
        let flattened = expr.flatten();
        assert_eq!(flattened.constant_result, Some(6.0));
        assert_eq!(flattened.ops, vec![LinearOp::LoadConst(6.0)]);
    }

    #[test]
    fn test_flatten_postorder() {
        let expr = Expr::Sub(
            Box::new(Expr::Mul(bound("A", Slot::State(0)), bound("k", Slot::Estimate(1)))),
            Box::new(Expr::Const(1.0)),
        );
        assert_eq!(
            expr.flatten().ops,
            vec![
                LinearOp::LoadVar(Slot::State(0)),
                LinearOp::LoadVar(Slot::Estimate(1)),
                LinearOp::Mul,
                LinearOp::LoadConst(1.0),
                LinearOp::Sub,
            ]
        );
    }

    #[test]
    fn test_render_profiles() {
        let expr = Expr::Div(
            Box::new(Expr::Mul(
                bound("vmax", Slot::Estimate(0)),
                Box::new(Expr::Pow(bound("S", Slot::State(1)), 2)),
            )),
            Box::new(Expr::Add(
                Box::new(Expr::Const(3.0)),
                Box::new(Expr::Ln(bound("t", Slot::Time))),
            )),
        );

        assert_eq!(
            expr.render(&TargetProfile::native()),
            "((p[0] * (x[1]**2)) / (3.0 + log(t)))"
        );
        assert_eq!(
            expr.render(&TargetProfile::stan()),
            "((p[1] * (y[2]^2)) / (3.0 + log(t)))"
        );
        assert_eq!(
            expr.render(&TargetProfile::antimony()),
            "((p[1] * (y[2]^2)) / (3.0 + ln(time)))"
        );

        let negative = Expr::PowFloat(var("A"), -0.5);
        assert_eq!(negative.render(&TargetProfile::stan()), "(A^(-0.5))");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Expr::Const(5.0)), "5");
        assert_eq!(format!("{}", *var("x")), "x");

        let sum = Expr::Add(var("x"), var("y"));
        assert_eq!(format!("{sum}"), "(x + y)");

        let exp = Expr::Exp(var("x"));
        assert_eq!(format!("{exp}"), "exp(x)");

        let abs = Expr::Abs(var("x"));
        assert_eq!(format!("{abs}"), "|x|");

        let complex = Expr::Div(
            Box::new(Expr::Add(Box::new(Expr::Pow(var("x"), 2)), var("y"))),
            var("z"),
        );
        assert_eq!(format!("{complex}"), "(((x^2) + y) / z)");
    }

    #[test]
    fn test_format_literal() {
        assert_eq!(format_literal(1.0), "1.0");
        assert_eq!(format_literal(0.5), "0.5");
        assert_eq!(format_literal(-2.0), "-2.0");
    }
}
