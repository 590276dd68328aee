//! Error types for the kinetics-codegen crate.
//!
//! This module defines the error types that can occur while parsing rate laws,
//! assembling the model and lowering it into callables or DSL source. The main
//! error types are:
//!
//! - `ConvertError`: Errors during conversion from the evalexpr AST to our expression tree
//! - `ExpressionError`: Failure to turn one expression string into an expression tree
//! - `ModelError`: Errors of the compilation entry points (dictionary, assembly, lowering, evaluation)
//! - `ReadError`: Errors of the optimizer-output and network file adapters
//!
//! Every structural error is reported when the model is compiled. The returned
//! callables only fail on malformed input vectors.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use itertools::Itertools;
use thiserror::Error;

/// Errors that can occur during conversion from evalexpr AST to our internal AST representation.
///
/// This enum represents the failure modes when converting the evalexpr expression tree
/// into our own expression tree that is used for differentiation, evaluation and rendering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// Error when an exponent is neither a numeric constant nor a convertible expression
    #[error("Could not convert exponent in Exp operator: {0}")]
    ExpOperator(String),
    /// Error when encountering an operator that is not supported by our implementation
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when a grouping node does not have exactly one child
    #[error("Expected single child for root node: {0}")]
    RootNode(String),
    /// Error when a constant value is not a number
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
}

/// Errors that can occur when turning a single expression string into an expression tree.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// The string could not be parsed by evalexpr
    #[error("failed to parse expression: {0}")]
    Parse(#[from] EvalexprError<DefaultNumericTypes>),
    /// The parsed operator tree uses constructs we cannot differentiate or evaluate
    #[error("failed to convert expression: {0}")]
    Convert(#[from] ConvertError),
}

/// High-level errors of model compilation and evaluation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Empty or duplicated ids, overlapping parameter roles, dangling references
    #[error("malformed model: {0}")]
    MalformedModel(String),
    /// A reaction is listed without a rate law
    #[error("missing rate law for reaction '{reaction}'")]
    MissingRateLaw { reaction: String },
    /// A mass balance references a reaction without a rate law
    #[error("missing rate law for reaction '{reaction}' referenced by the mass balance of '{species}'")]
    MissingBalanceRateLaw { species: String, reaction: String },
    /// Identifiers that the translation dictionary does not cover
    #[error("unknown identifier(s): {}", .0.iter().join(", "))]
    UnknownIdentifier(Vec<String>),
    /// A rate law that cannot be parsed or differentiated
    #[error("symbolic compilation of rate law for '{reaction}' failed: {source}")]
    SymbolicCompilation {
        reaction: String,
        #[source]
        source: ExpressionError,
    },
    /// Error when the input length is not the one the compiled function expects
    #[error("Invalid input length for '{vector}': expected {expected}, got {got}")]
    InvalidInputLength {
        vector: &'static str,
        expected: usize,
        got: usize,
    },
    /// Error when the output buffer does not match the number of results
    #[error("Invalid output length: expected {expected}, got {got}")]
    InvalidOutputLength { expected: usize, got: usize },
    /// Writing emitted source text failed
    #[error("failed to write emitted code: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Errors of the file adapters in [`crate::io`].
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The result file has a header but no data row
    #[error("optimizer output contains no data row")]
    NoData,
    /// A column refers to a vector position outside of the model
    #[error("column '{column}' refers to position {index}, but only {len} are defined")]
    IndexOutOfRange {
        column: String,
        index: usize,
        len: usize,
    },
    /// A cell could not be parsed as a number
    #[error("column '{column}' holds a non-numeric value '{value}'")]
    InvalidNumber { column: String, value: String },
}
