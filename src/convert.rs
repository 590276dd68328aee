//! Conversion module for transforming evalexpr AST nodes into our internal expression representation.
//!
//! Rate laws arrive as plain strings. This module parses them with evalexpr and
//! converts the resulting operator tree into our own expression type that supports
//! differentiation, substitution and rendering. Identifiers stay symbolic here;
//! they are bound to vector slots later by a translation dictionary.
//!
//! The main entry points are [`parse_expression`] for strings and [`build_ast`],
//! which recursively traverses an evalexpr AST and builds up our expression tree.

use std::collections::BTreeSet;

use evalexpr::{build_operator_tree, DefaultNumericTypes, Node, Operator, Value};

use crate::errors::{ConvertError, ExpressionError};
use crate::expr::Expr;

/// Rewrites the `**` power operator into evalexpr's `^`.
///
/// Rate laws are commonly written with `**`; evalexpr only understands `^`.
pub fn normalize_power(text: &str) -> String {
    text.replace("**", "^")
}

/// Parses a rate-law string into an expression tree.
///
/// # Errors
/// Returns `ExpressionError::Parse` for malformed input and
/// `ExpressionError::Convert` for constructs we do not support
/// (e.g. string literals, assignments or unknown functions).
///
/// # Example
/// ```
/// use kinetics_codegen::convert::parse_expression;
///
/// let expr = parse_expression("vmax * S / (km + S)").unwrap();
/// assert_eq!(expr.to_string(), "((vmax * S) / (km + S))");
/// ```
pub fn parse_expression(text: &str) -> Result<Expr, ExpressionError> {
    let node = build_operator_tree::<DefaultNumericTypes>(&normalize_power(text))?;
    Ok(build_ast(&node)?)
}

/// Converts an evalexpr AST node into our internal expression representation.
///
/// This function recursively traverses the evalexpr AST and builds up our own AST
/// representation that can be used for symbolic differentiation and code generation.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
///
/// # Returns
/// * `Result<Expr, ConvertError>` - The converted expression or an error if conversion fails
///
/// # Examples of supported operations:
/// * Basic arithmetic: +, -, *, /
/// * Variables: x, y, etc.
/// * Constants: integer and floating point numbers
/// * Functions: abs(), exp(), ln(), log(), sqrt(), sin(), cos()
/// * Exponentiation: x^n where n is any expression
pub fn build_ast(node: &Node) -> Result<Expr, ConvertError> {
    match node.operator() {
        // Addition operator - combines multiple children into a series of binary Add expressions
        Operator::Add => fold_children(node, Expr::Add),
        // Multiplication operator - combines multiple children into a series of binary Mul expressions
        Operator::Mul => fold_children(node, Expr::Mul),
        Operator::Div => {
            let (left, right) = binary_children(node)?;
            Ok(Expr::Div(Box::new(left), Box::new(right)))
        }
        Operator::Sub => {
            let (left, right) = binary_children(node)?;
            Ok(Expr::Sub(Box::new(left), Box::new(right)))
        }
        Operator::Const { value } => match value {
            Value::Float(f) => Ok(Expr::Const(*f)),
            Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ConvertError::ConstOperator(format!("{value:?}"))),
        },
        Operator::VariableIdentifierRead { identifier } => Ok(Expr::var(identifier)),
        Operator::Neg => Ok(Expr::Neg(Box::new(single_child(node)?))),
        Operator::FunctionIdentifier { identifier } => {
            let argument = Box::new(single_child(node)?);
            match identifier.as_str() {
                "abs" => Ok(Expr::Abs(argument)),
                "ln" | "log" => Ok(Expr::Ln(argument)),
                "sqrt" => Ok(Expr::Sqrt(argument)),
                "exp" => Ok(Expr::Exp(argument)),
                "sin" => Ok(Expr::Sin(argument)),
                "cos" => Ok(Expr::Cos(argument)),
                _ => Err(ConvertError::UnsupportedFunction(identifier.to_string())),
            }
        }
        // Root node (top level and parentheses) - should have exactly one child
        Operator::RootNode => match node.children() {
            [child] => build_ast(child),
            children => Err(ConvertError::RootNode(format!("{children:?}"))),
        },
        // Exponentiation - evalexpr groups `a^b^c` as `(a^b)^c`, powers bind to the right
        Operator::Exp => {
            let mut operands = Vec::new();
            let mut base = node;
            while matches!(base.operator(), Operator::Exp) {
                let (left, right) = exp_operands(base)?;
                operands.push(right);
                base = left;
            }
            operands.push(base);
            operands.reverse();

            let [rest @ .., second, last] = operands.as_slice() else {
                return Err(ConvertError::ExpOperator("missing operand".to_string()));
            };
            let mut exponent = power(build_ast(second)?, last)?;
            for operand in rest.iter().rev() {
                exponent = Expr::PowExpr(Box::new(build_ast(operand)?), Box::new(exponent));
            }
            Ok(exponent)
        }
        // Any other operator is unsupported
        operator => Err(ConvertError::UnsupportedOperator(format!("{operator:?}"))),
    }
}

fn fold_children<F>(node: &Node, combine: F) -> Result<Expr, ConvertError>
where
    F: Fn(Box<Expr>, Box<Expr>) -> Expr,
{
    let children = node.children();
    let Some(first) = children.first() else {
        return Err(ConvertError::UnsupportedOperator(format!(
            "{:?} without operands",
            node.operator()
        )));
    };
    children
        .iter()
        .skip(1)
        .try_fold(build_ast(first)?, |acc, child| {
            Ok(combine(Box::new(acc), Box::new(build_ast(child)?)))
        })
}

fn exp_operands(node: &Node) -> Result<(&Node, &Node), ConvertError> {
    match node.children() {
        [left, right] => Ok((left, right)),
        children => Err(ConvertError::ExpOperator(format!(
            "expected 2 operands, got {}",
            children.len()
        ))),
    }
}

/// Raises `base` to a parsed exponent; integer and float constants keep their own node kinds.
fn power(base: Expr, exponent: &Node) -> Result<Expr, ConvertError> {
    let base = Box::new(base);
    match exponent.operator() {
        Operator::Const {
            value: Value::Int(exp),
        } => Ok(Expr::Pow(base, *exp)),
        Operator::Const {
            value: Value::Float(exp),
        } => Ok(Expr::PowFloat(base, *exp)),
        Operator::Const { value } => Err(ConvertError::ExpOperator(format!("{value:?}"))),
        _ => Ok(Expr::PowExpr(base, Box::new(build_ast(exponent)?))),
    }
}

fn binary_children(node: &Node) -> Result<(Expr, Expr), ConvertError> {
    match node.children() {
        [left, right] => Ok((build_ast(left)?, build_ast(right)?)),
        children => Err(ConvertError::UnsupportedOperator(format!(
            "{:?} with {} operands",
            node.operator(),
            children.len()
        ))),
    }
}

fn single_child(node: &Node) -> Result<Expr, ConvertError> {
    match node.children() {
        [child] => build_ast(child),
        children => Err(ConvertError::UnsupportedOperator(format!(
            "{:?} with {} operands",
            node.operator(),
            children.len()
        ))),
    }
}

/// Extracts and sorts all identifiers referenced by a collection of rate-law strings.
///
/// # Errors
/// Returns the first parse error encountered.
///
/// # Example
/// ```
/// use kinetics_codegen::convert::extract_all_symbols;
///
/// let laws = vec!["k1 * A".to_string(), "k2 * A ** 2 * B".to_string()];
/// let symbols = extract_all_symbols(&laws).unwrap();
/// assert_eq!(symbols, vec!["A", "B", "k1", "k2"]);
/// ```
pub fn extract_all_symbols(expressions: &[String]) -> Result<Vec<String>, ExpressionError> {
    let mut all_symbols = BTreeSet::new();
    for text in expressions {
        all_symbols.extend(parse_expression(text)?.symbols());
    }
    Ok(all_symbols.into_iter().collect())
}
