//! Symbolic Jacobian of the mass balances and its numeric lowering.
//!
//! The Jacobian is derived on the symbolic rate laws, before any identifier is
//! bound to a vector slot:
//!
//! 1. every species' balance is assembled from the unsubstituted rate-law trees,
//! 2. entry (i, j) is the derivative of balance i with respect to species j,
//!    simplified so that absent species yield an exact zero,
//! 3. [`SymbolicJacobian::lower`] resolves every entry through a translation
//!    dictionary and compiles the whole matrix into a single closure.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use kinetics_codegen::jacobian::SymbolicJacobian;
//! use kinetics_codegen::model::ReactionNetwork;
//! use kinetics_codegen::dictionary::TargetProfile;
//!
//! let mut network = ReactionNetwork::new(
//!     vec!["A".into(), "B".into()],
//!     vec!["R1".into()],
//!     HashMap::from([("R1".into(), "k1 * A".into())]),
//! );
//! network.mass_balances = HashMap::from([
//!     ("A".into(), HashMap::from([("R1".into(), -1.0)])),
//!     ("B".into(), HashMap::from([("R1".into(), 1.0)])),
//! ]);
//! network.parameters = HashMap::from([("k1".into(), 0.5)]);
//!
//! let symbolic = SymbolicJacobian::build(&network).unwrap();
//! assert!(symbolic.is_structurally_zero(1, 1));
//!
//! let dictionary = network.dictionary(TargetProfile::native(), true, true).unwrap();
//! let jacobian = symbolic.lower(&dictionary).unwrap();
//! let j = jacobian.eval(0.0, &[4.0, 0.0], &[]).unwrap();
//! assert_eq!(j, vec![vec![-0.5, 0.0], vec![0.5, 0.0]]);
//! ```

use std::fmt;

use colored::Colorize;
use rayon::prelude::*;

use crate::backends::matrix::Matrix;
use crate::balance::assemble_balance;
use crate::builder::build_matrix_function;
use crate::dictionary::TranslationDictionary;
use crate::errors::ModelError;
use crate::expr::Expr;
use crate::model::ReactionNetwork;
use crate::types::{Inputs, MatrixFunction};

/// Square matrix of symbolic partial derivatives, species order on both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicJacobian {
    species: Vec<String>,
    balances: Vec<Expr>,
    entries: Vec<Vec<Expr>>,
}

impl SymbolicJacobian {
    /// Differentiates every mass balance of the network with respect to every species.
    ///
    /// # Errors
    /// Any structural error of the network and `SymbolicCompilation` for rate
    /// laws that do not parse.
    pub fn build(network: &ReactionNetwork) -> Result<Self, ModelError> {
        network.validate()?;
        let rate_laws = network.parse_rate_laws()?;

        let balances = network
            .species
            .iter()
            .map(|species| {
                assemble_balance(
                    species,
                    &network.mass_balances,
                    &network.reactions,
                    &rate_laws,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let species = &network.species;
        let entries: Vec<Vec<Expr>> = balances
            .par_iter()
            .map(|balance| {
                species
                    .iter()
                    .map(|wrt| *balance.derivative(wrt).simplify())
                    .collect()
            })
            .collect();

        let jacobian = Self {
            species: species.clone(),
            balances,
            entries,
        };
        log::debug!(
            "derived {n}x{n} Jacobian, {} entries structurally zero",
            jacobian.zero_count(),
            n = jacobian.species.len()
        );
        Ok(jacobian)
    }

    /// Number of rows and columns.
    pub fn dim(&self) -> usize {
        self.species.len()
    }

    /// Species ids, in row and column order.
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// The symbolic balance of species `i`, before differentiation.
    pub fn balance(&self, i: usize) -> Option<&Expr> {
        self.balances.get(i)
    }

    /// ∂ balance(i) / ∂ species(j).
    pub fn entry(&self, i: usize, j: usize) -> Option<&Expr> {
        self.entries.get(i)?.get(j)
    }

    /// Checks whether entry (i, j) simplified to the constant zero.
    pub fn is_structurally_zero(&self, i: usize, j: usize) -> bool {
        self.entry(i, j).is_some_and(Expr::is_zero)
    }

    fn zero_count(&self) -> usize {
        self.entries.iter().flatten().filter(|e| e.is_zero()).count()
    }

    /// Resolves every entry through `dictionary` and compiles the matrix.
    ///
    /// # Errors
    /// `UnknownIdentifier` listing every id the dictionary does not cover.
    pub fn lower(&self, dictionary: &TranslationDictionary) -> Result<Jacobian, ModelError> {
        let resolved = self
            .entries
            .iter()
            .map(|row| {
                row.iter()
                    .map(|entry| dictionary.resolve(entry).map(|e| *e.simplify()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (n_state, n_estimate, n_tune) = dictionary.slot_counts();
        Ok(Jacobian {
            function: build_matrix_function(&resolved)?,
            n: self.dim(),
            n_state,
            n_estimate,
            n_tune,
        })
    }
}

impl fmt::Display for SymbolicJacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.entries.iter().enumerate() {
            for (j, entry) in row.iter().enumerate() {
                if entry.is_zero() {
                    continue;
                }
                writeln!(
                    f,
                    "{}: {}",
                    format!("d({})/d({})", self.species[i], self.species[j]).cyan(),
                    entry
                )?;
            }
        }
        Ok(())
    }
}

/// Compiled Jacobian: `(t, y, p) -> n×n matrix`.
#[derive(Clone)]
pub struct Jacobian {
    function: MatrixFunction,
    n: usize,
    n_state: usize,
    n_estimate: usize,
    n_tune: usize,
}

impl Jacobian {
    /// Number of rows and columns.
    pub fn dim(&self) -> usize {
        self.n
    }

    fn validate_inputs(&self, inputs: &Inputs) -> Result<(), ModelError> {
        for (vector, expected, got) in [
            ("y", self.n_state, inputs.y.len()),
            ("p", self.n_estimate, inputs.p.len()),
            ("x_r", self.n_tune, inputs.x_r.len()),
        ] {
            if expected != got {
                return Err(ModelError::InvalidInputLength {
                    vector,
                    expected,
                    got,
                });
            }
        }
        Ok(())
    }

    /// Evaluates the Jacobian at time `t`, state `y` and fit vector `p`.
    ///
    /// Use [`Jacobian::eval_with`] when the model also has tunable inputs.
    pub fn eval(&self, t: f64, y: &[f64], p: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.eval_with(&Inputs::state(y).at(t).with_params(p))
    }

    /// Evaluates the Jacobian for a full evaluation context.
    pub fn eval_with(&self, inputs: &Inputs) -> Result<Vec<Vec<f64>>, ModelError> {
        self.validate_inputs(inputs)?;
        let mut out = vec![vec![0.0; self.n]; self.n];
        (self.function)(inputs, &mut out);
        Ok(out)
    }

    /// Evaluates the Jacobian into any [`Matrix`] backend.
    ///
    /// # Errors
    /// `InvalidInputLength` for malformed inputs and `InvalidOutputLength` if
    /// `out` is not n×n.
    pub fn eval_into<M: Matrix>(&self, inputs: &Inputs, out: &mut M) -> Result<(), ModelError> {
        let (rows, cols) = out.dims();
        if rows != self.n || cols != self.n {
            return Err(ModelError::InvalidOutputLength {
                expected: self.n * self.n,
                got: rows * cols,
            });
        }
        for (i, row) in self.eval_with(inputs)?.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                out.set(i, j, value);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Jacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jacobian")
            .field("dim", &self.n)
            .field("n_estimate", &self.n_estimate)
            .field("n_tune", &self.n_tune)
            .finish()
    }
}
