//! The compiled rate vector: one rate per reaction, in reaction order.

use std::fmt;

use colored::Colorize;

use crate::builder::build_function;
use crate::dictionary::TargetProfile;
use crate::errors::ModelError;
use crate::expr::Expr;
use crate::model::ReactionNetwork;
use crate::types::{Inputs, RateFunction};

/// Signature of the compiled rate functions.
///
/// - `time_is_input`: the network's time symbol reads `Inputs::t`; otherwise a
///   rate law mentioning time fails to compile.
/// - `params_is_input`: estimated parameters read `Inputs::p` and tunable ones
///   `Inputs::x_r`; otherwise every parameter is baked in as a literal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateOptions {
    pub time_is_input: bool,
    pub params_is_input: bool,
}

/// Callable rate vector of a network.
#[derive(Clone)]
pub struct RateVector {
    reactions: Vec<String>,
    expressions: Vec<Expr>,
    functions: Vec<RateFunction>,
    n_species: usize,
    n_estimate: usize,
    n_tune: usize,
    options: RateOptions,
}

impl RateVector {
    /// Compiles the rate law of every reaction.
    ///
    /// # Errors
    /// Any structural error of the network, `SymbolicCompilation` for a rate law
    /// that does not parse and `UnknownIdentifier` for a rate law referencing
    /// ids that are neither species nor parameters (nor time, when it is an input).
    pub fn build(network: &ReactionNetwork, options: RateOptions) -> Result<Self, ModelError> {
        network.validate()?;
        let dictionary = network.dictionary(
            TargetProfile::native(),
            options.params_is_input,
            options.time_is_input,
        )?;
        let rate_laws = network.parse_rate_laws()?;

        let mut expressions = Vec::with_capacity(network.reactions.len());
        let mut functions = Vec::with_capacity(network.reactions.len());
        for reaction in &network.reactions {
            let rate = rate_laws
                .get(reaction)
                .ok_or_else(|| ModelError::MissingRateLaw {
                    reaction: reaction.clone(),
                })?;
            let resolved = *dictionary.resolve(rate)?.simplify();
            log::trace!(
                "rate of {reaction}: {}",
                resolved.render(dictionary.profile())
            );
            functions.push(build_function(&resolved)?);
            expressions.push(resolved);
        }

        let (n_estimate, n_tune) = if options.params_is_input {
            (network.estimate.len(), network.tune.len())
        } else {
            (0, 0)
        };
        log::debug!(
            "compiled rate vector with {} components ({options:?})",
            functions.len()
        );
        Ok(Self {
            reactions: network.reactions.clone(),
            expressions,
            functions,
            n_species: network.species.len(),
            n_estimate,
            n_tune,
            options,
        })
    }

    /// Number of reactions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Checks if the rate vector is empty.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Reaction ids, in component order.
    pub fn reactions(&self) -> &[String] {
        &self.reactions
    }

    pub fn options(&self) -> RateOptions {
        self.options
    }

    /// Rate function of reaction `i`.
    pub fn component(&self, i: usize) -> Option<&RateFunction> {
        self.functions.get(i)
    }

    /// Resolved rate expression of reaction `i`, rendered in the native profile.
    pub fn source(&self, i: usize) -> Option<String> {
        self.expressions
            .get(i)
            .map(|e| e.render(&TargetProfile::native()))
    }

    /// Checks that every input vector has the length this signature expects.
    ///
    /// # Errors
    /// `InvalidInputLength` naming the first offending vector.
    pub fn validate_inputs(&self, inputs: &Inputs) -> Result<(), ModelError> {
        for (vector, expected, got) in [
            ("y", self.n_species, inputs.y.len()),
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

    /// Evaluates every rate at the given inputs.
    pub fn eval(&self, inputs: &Inputs) -> Result<Vec<f64>, ModelError> {
        let mut out = vec![0.0; self.len()];
        self.eval_into(inputs, &mut out)?;
        Ok(out)
    }

    /// Evaluates every rate into a caller-provided buffer.
    ///
    /// # Errors
    /// `InvalidInputLength` for malformed inputs and `InvalidOutputLength` if
    /// `out` does not hold exactly one value per reaction.
    pub fn eval_into(&self, inputs: &Inputs, out: &mut [f64]) -> Result<(), ModelError> {
        self.validate_inputs(inputs)?;
        if out.len() != self.len() {
            return Err(ModelError::InvalidOutputLength {
                expected: self.len(),
                got: out.len(),
            });
        }
        for (f, value) in self.functions.iter().zip(out.iter_mut()) {
            *value = f(inputs);
        }
        Ok(())
    }
}

impl fmt::Debug for RateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateVector")
            .field("reactions", &self.reactions)
            .field("options", &self.options)
            .finish()
    }
}

impl fmt::Display for RateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profile = TargetProfile::native();
        for (reaction, expr) in self.reactions.iter().zip(&self.expressions) {
            writeln!(f, "{} = {}", reaction.cyan().bold(), expr.render(&profile))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::decay;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    #[test]
    fn test_decay_rate() {
        let rates = RateVector::build(&decay(), RateOptions::default()).unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates.eval(&Inputs::state(&[4.0, 0.0])).unwrap(), vec![2.0]);
        assert_eq!(rates.source(0).unwrap(), "(0.5 * x[0])");
    }

    #[test]
    fn test_literal_arithmetic() {
        let mut network = decay();
        network.parameters.insert("k1".to_string(), 3.0);
        let rates = RateVector::build(&network, RateOptions::default()).unwrap();
        let f = rates.component(0).unwrap();
        assert_eq!(f(&Inputs::state(&[2.0, 0.0])), 6.0);
    }

    #[test]
    fn test_time_symbol_as_parameter() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "t * A".to_string());
        network.parameters.insert("t".to_string(), 2.0);

        let rates = RateVector::build(&network, RateOptions::default()).unwrap();
        assert_eq!(rates.eval(&Inputs::state(&[4.0, 0.0])).unwrap(), vec![8.0]);

        let options = RateOptions {
            time_is_input: true,
            params_is_input: false,
        };
        assert!(matches!(
            RateVector::build(&network, options),
            Err(ModelError::MalformedModel(_))
        ));
    }

    #[test]
    fn test_params_and_time_as_input() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "k1 * A * exp(-kd * t)".to_string());
        network.parameters.insert("kd".to_string(), 0.1);
        network.estimate = vec!["k1".to_string()];
        network.tune = vec!["kd".to_string()];

        let options = RateOptions {
            time_is_input: true,
            params_is_input: true,
        };
        let rates = RateVector::build(&network, options).unwrap();
        let y = [4.0, 0.0];
        let inputs = Inputs::state(&y)
            .with_params(&[2.0])
            .with_tunables(&[0.5])
            .at(2.0);
        assert_relative_eq!(
            rates.eval(&inputs).unwrap()[0],
            2.0 * 4.0 * (-1.0f64).exp(),
            epsilon = 1e-12
        );

        // Without time as an input, `t` is an unknown identifier
        let options = RateOptions {
            time_is_input: false,
            params_is_input: true,
        };
        assert!(matches!(
            RateVector::build(&network, options),
            Err(ModelError::UnknownIdentifier(ids)) if ids == vec!["t"]
        ));
    }

    #[test]
    fn test_output_follows_reaction_order() {
        // A -> B -> C with reactions listed in reverse order
        let mut network = ReactionNetwork::new(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            vec!["R2".to_string(), "R1".to_string()],
            HashMap::from([
                ("R1".to_string(), "k1 * A".to_string()),
                ("R2".to_string(), "k2 * B".to_string()),
            ]),
        );
        network.parameters = HashMap::from([("k1".to_string(), 1.0), ("k2".to_string(), 10.0)]);
        let rates = RateVector::build(&network, RateOptions::default()).unwrap();
        assert_eq!(
            rates.eval(&Inputs::state(&[1.0, 2.0, 3.0])).unwrap(),
            vec![20.0, 1.0]
        );
    }

    #[test]
    fn test_input_validation() {
        let rates = RateVector::build(&decay(), RateOptions::default()).unwrap();
        assert!(matches!(
            rates.eval(&Inputs::state(&[4.0])),
            Err(ModelError::InvalidInputLength { vector: "y", expected: 2, got: 1 })
        ));
        assert!(matches!(
            rates.eval(&Inputs::state(&[4.0, 0.0]).with_params(&[1.0])),
            Err(ModelError::InvalidInputLength { vector: "p", .. })
        ));
        let mut out = [0.0; 2];
        assert!(matches!(
            rates.eval_into(&Inputs::state(&[4.0, 0.0]), &mut out),
            Err(ModelError::InvalidOutputLength { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_unknown_identifier() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "k1 * A / (1 + I / ki)".to_string());
        assert!(matches!(
            RateVector::build(&network, RateOptions::default()),
            Err(ModelError::UnknownIdentifier(ids)) if ids == vec!["I", "ki"]
        ));
    }
}
