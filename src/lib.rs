//! Compiles metabolic reaction networks into numeric callables and ODE model code.
//!
//! A network is a set of species, reactions with rate-law expressions, a
//! species → reaction stoichiometry table and parameter values. From it this
//! crate derives, consistently across every output target:
//!
//! - the mass balance `dA/dt = Σ ± |c| · v_r` of each species
//! - a callable rate vector `v(t, y, p, x_r)`
//! - the symbolic Jacobian of the mass balances and its compiled form
//! - the stoichiometry matrix `S` with `dy/dt = S · v`
//! - source text for Stan ODE functions and Antimony models
//!
//! Rate laws are parsed with [evalexpr](https://github.com/ISibboI/evalexpr),
//! differentiated and simplified symbolically, and lowered to small stack
//! programs that are evaluated without further allocation.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use kinetics_codegen::prelude::*;
//!
//! let mut network = ReactionNetwork::new(
//!     vec!["A".to_string(), "B".to_string()],
//!     vec!["R1".to_string()],
//!     HashMap::from([("R1".to_string(), "k1 * A".to_string())]),
//! );
//! network.mass_balances = HashMap::from([
//!     ("A".to_string(), HashMap::from([("R1".to_string(), -1.0)])),
//!     ("B".to_string(), HashMap::from([("R1".to_string(), 1.0)])),
//! ]);
//! network.parameters = HashMap::from([("k1".to_string(), 0.5)]);
//!
//! let system = OdeSystem::compile(&network).unwrap();
//! assert_eq!(system.rhs(0.0, &[2.0, 0.0], &[]).unwrap(), vec![-1.0, 1.0]);
//!
//! let stan = StanEmitter::default().emit(&network).unwrap();
//! assert!(stan.contains("dydt[1] = - 1.0 * (0.5 * y[1]);"));
//! ```

pub use model::ReactionNetwork;
pub use system::OdeSystem;

pub mod prelude {
    pub use crate::backends::matrix::Matrix;
    pub use crate::backends::vector::Vector;
    pub use crate::dictionary::{TargetProfile, TranslationDictionary};
    pub use crate::emit::{AntimonyEmitter, AntimonyOptions, Emitter, StanEmitter, StanOptions};
    pub use crate::errors::ModelError;
    pub use crate::expr::Expr;
    pub use crate::jacobian::SymbolicJacobian;
    pub use crate::model::ReactionNetwork;
    pub use crate::rates::{RateOptions, RateVector};
    pub use crate::stoich::StoichiometryMatrix;
    pub use crate::system::OdeSystem;
    pub use crate::types::Inputs;
}

/// Mass-balance terms shared by every representation
pub mod balance;
/// Lowering of expression trees to compiled closures
pub mod builder;
/// Conversion from parsed expressions to internal AST
pub mod convert;
/// Translation of identifiers into target-specific references
pub mod dictionary;
/// Source emitters for Stan and Antimony
pub mod emit;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation and symbolic differentiation
pub mod expr;
/// Network files and optimizer output
pub mod io;
/// Symbolic and compiled Jacobians
pub mod jacobian;
/// Reaction network description
pub mod model;
/// Peephole optimisation of flattened expressions
pub mod opt;
/// Compiled rate vectors
pub mod rates;
/// Stoichiometry matrix
pub mod stoich;
/// Compiled ODE right-hand side
pub mod system;
/// Shared function and input types
pub mod types;

/// Vector and matrix types compiled functions can write into
pub mod backends {
    pub mod matrix;
    pub mod vector;
}
