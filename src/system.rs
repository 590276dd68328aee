//! A fully compiled ODE model.
//!
//! [`OdeSystem`] bundles everything a numerical integrator or optimiser needs:
//! the right-hand side `dy/dt = f(t, y, p)`, the per-reaction rate vector, the
//! Jacobian `∂f/∂y` and the stoichiometry matrix. All of them share one
//! translation dictionary, so species always read `y` in species order,
//! estimated parameters read `p` and tunable parameters read `x_r`.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use kinetics_codegen::model::ReactionNetwork;
//! use kinetics_codegen::system::OdeSystem;
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
//! network.estimate = vec!["k1".into()];
//!
//! let system = OdeSystem::compile(&network).unwrap();
//! assert_eq!(system.rhs(0.0, &[4.0, 0.0], &[0.5]).unwrap(), vec![-2.0, 2.0]);
//! assert_eq!(system.rates(0.0, &[4.0, 0.0], &[0.5]).unwrap(), vec![2.0]);
//! ```

use std::fmt;
use std::sync::Arc;

use colored::Colorize;
use rayon::prelude::*;

use crate::backends::vector::Vector;
use crate::balance::assemble_balance;
use crate::builder::build_combined_function;
use crate::dictionary::{TargetProfile, TranslationDictionary};
use crate::errors::ModelError;
use crate::expr::Expr;
use crate::jacobian::{Jacobian, SymbolicJacobian};
use crate::model::ReactionNetwork;
use crate::rates::{RateOptions, RateVector};
use crate::stoich::StoichiometryMatrix;
use crate::types::{CombinedFunction, Inputs};

/// Compiled right-hand side, rate vector, Jacobian and stoichiometry of a network.
#[derive(Clone)]
pub struct OdeSystem {
    species: Vec<String>,
    balances: Vec<Expr>,
    rhs_fun: CombinedFunction,
    rates: RateVector,
    jacobian: Jacobian,
    stoichiometry: StoichiometryMatrix,
    tunables: Vec<f64>,
    dictionary: TranslationDictionary,
}

impl OdeSystem {
    /// Compiles every numeric artefact of the network.
    ///
    /// # Errors
    /// Any structural, parse or resolution error of the network.
    pub fn compile(network: &ReactionNetwork) -> Result<Self, ModelError> {
        network.validate()?;
        let dictionary = network.dictionary(TargetProfile::native(), true, true)?;
        let rate_laws = network.parse_rate_laws()?;

        let balances = network
            .species
            .iter()
            .map(|species| {
                let balance = assemble_balance(
                    species,
                    &network.mass_balances,
                    &network.reactions,
                    &rate_laws,
                )?;
                Ok(*dictionary.resolve(&balance)?.simplify())
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        let rhs_fun = build_combined_function(&balances)?;

        let rates = RateVector::build(
            network,
            RateOptions {
                time_is_input: true,
                params_is_input: true,
            },
        )?;
        let jacobian = SymbolicJacobian::build(network)?.lower(&dictionary)?;
        let stoichiometry =
            StoichiometryMatrix::build(&network.species, &network.reactions, &network.mass_balances)?;

        log::debug!(
            "compiled ODE system with {} species and {} reactions",
            network.species.len(),
            network.reactions.len()
        );
        Ok(Self {
            species: network.species.clone(),
            balances,
            rhs_fun,
            rates,
            jacobian,
            stoichiometry,
            tunables: network.tune_values(),
            dictionary,
        })
    }

    /// Species ids, in state order.
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// Reaction ids, in rate order.
    pub fn reactions(&self) -> &[String] {
        self.rates.reactions()
    }

    pub fn stoichiometry(&self) -> &StoichiometryMatrix {
        &self.stoichiometry
    }

    pub fn rate_vector(&self) -> &RateVector {
        &self.rates
    }

    pub fn jacobian_function(&self) -> &Jacobian {
        &self.jacobian
    }

    pub fn dictionary(&self) -> &TranslationDictionary {
        &self.dictionary
    }

    /// Values of the tunable inputs used by the `(t, y, p)` shortcuts.
    pub fn tunables(&self) -> &[f64] {
        &self.tunables
    }

    /// Replaces the tunable inputs used by the `(t, y, p)` shortcuts.
    pub fn set_tunables(&mut self, x_r: Vec<f64>) -> Result<(), ModelError> {
        if x_r.len() != self.tunables.len() {
            return Err(ModelError::InvalidInputLength {
                vector: "x_r",
                expected: self.tunables.len(),
                got: x_r.len(),
            });
        }
        self.tunables = x_r;
        Ok(())
    }

    fn inputs<'a>(&'a self, t: f64, y: &'a [f64], p: &'a [f64]) -> Inputs<'a> {
        Inputs::state(y).at(t).with_params(p).with_tunables(&self.tunables)
    }

    /// Evaluates `dy/dt` into a caller-provided buffer.
    ///
    /// # Errors
    /// `InvalidInputLength` for malformed inputs and `InvalidOutputLength` if
    /// `out` does not hold one value per species.
    pub fn rhs_into(&self, inputs: &Inputs, out: &mut [f64]) -> Result<(), ModelError> {
        self.rates.validate_inputs(inputs)?;
        if out.len() != self.species.len() {
            return Err(ModelError::InvalidOutputLength {
                expected: self.species.len(),
                got: out.len(),
            });
        }
        (self.rhs_fun)(inputs, out);
        Ok(())
    }

    /// Evaluates `dy/dt` at time `t`, state `y` and fit vector `p`.
    pub fn rhs(&self, t: f64, y: &[f64], p: &[f64]) -> Result<Vec<f64>, ModelError> {
        let mut out = vec![0.0; self.species.len()];
        self.rhs_into(&self.inputs(t, y, p), &mut out)?;
        Ok(out)
    }

    /// Evaluates `dy/dt` on any [`Vector`] backend.
    pub fn rhs_vector<V: Vector>(&self, t: f64, y: &V, p: &[f64]) -> Result<V, ModelError> {
        let state = y.values();
        Ok(V::from_values(self.rhs(t, &state, p)?))
    }

    /// Evaluates the rate of every reaction.
    pub fn rates(&self, t: f64, y: &[f64], p: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.rates.eval(&self.inputs(t, y, p))
    }

    /// Evaluates the Jacobian `∂(dy/dt)/∂y`.
    pub fn jacobian(&self, t: f64, y: &[f64], p: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.jacobian.eval_with(&self.inputs(t, y, p))
    }

    /// Evaluates `dy/dt` for many states at once.
    ///
    /// States are split into chunks that are evaluated on the rayon thread pool;
    /// results keep the order of `states`.
    pub fn eval_parallel(
        &self,
        states: &[Vec<f64>],
        t: f64,
        p: &[f64],
    ) -> Result<Vec<Vec<f64>>, ModelError> {
        let num_threads = rayon::current_num_threads();
        let chunk_size = (states.len() / (num_threads * 4)).max(1);
        let fun = Arc::clone(&self.rhs_fun);
        let n_species = self.species.len();

        for y in states {
            self.rates.validate_inputs(&self.inputs(t, y, p))?;
        }

        Ok(states
            .par_chunks(chunk_size)
            .flat_map_iter(|chunk| {
                chunk.iter().map(|y| {
                    let mut out = vec![0.0; n_species];
                    fun(&self.inputs(t, y, p), &mut out);
                    out
                })
            })
            .collect())
    }
}

impl fmt::Debug for OdeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdeSystem")
            .field("species", &self.species)
            .field("reactions", &self.rates.reactions())
            .field("tunables", &self.tunables)
            .finish()
    }
}

impl fmt::Display for OdeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "Mass balances".cyan())?;
        let profile = self.dictionary.profile();
        for (species, balance) in self.species.iter().zip(&self.balances) {
            writeln!(f, "    d{}/dt = {}", species.bold(), balance.render(profile))?;
        }
        writeln!(f, "{}", "Rates".cyan())?;
        for line in self.rates.to_string().lines() {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}
