use std::collections::HashMap;
use std::fmt::Write;

use crate::balance::render_balance;
use crate::dictionary::{TargetProfile, TranslationDictionary};
use crate::emit::Emitter;
use crate::errors::ModelError;
use crate::model::ReactionNetwork;

/// Options of the Stan function block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanOptions {
    /// Name of the emitted function
    pub function_name: String,
}

impl Default for StanOptions {
    fn default() -> Self {
        Self {
            function_name: "odes".to_string(),
        }
    }
}

/// Emits the right-hand side as a Stan ODE function:
///
/// ```text
/// real[] odes(real t, real[] y, real[] p, real[] x_r, int[] x_i)
///     {
///     real dydt[2];
///     dydt[1] = - 1.0 * (0.5 * y[1]);
///     dydt[2] = + 1.0 * (0.5 * y[1]);
///     return dydt;
///     }
/// ```
///
/// Species read `y`, estimated parameters `p`, tunable parameters `x_r`, all
/// 1-based; every other parameter is written as a literal.
#[derive(Debug, Clone, Default)]
pub struct StanEmitter {
    pub options: StanOptions,
}

/// The Stan function together with the artefacts used to produce it.
#[derive(Debug, Clone)]
pub struct StanModel {
    /// Source text of the function block
    pub code: String,
    /// Dictionary the rate laws were substituted with
    pub dictionary: TranslationDictionary,
    /// Substituted and rendered rate law of each reaction
    pub rates: HashMap<String, String>,
}

impl StanEmitter {
    pub fn new(options: StanOptions) -> Self {
        Self { options }
    }

    /// Renders every rate law of the network in Stan syntax.
    ///
    /// # Errors
    /// Structural errors of the network, `SymbolicCompilation` for rate laws
    /// that do not parse and `UnknownIdentifier` for ids the dictionary misses.
    pub fn substituted_rates(
        &self,
        network: &ReactionNetwork,
        dictionary: &TranslationDictionary,
    ) -> Result<HashMap<String, String>, ModelError> {
        network
            .parse_rate_laws()?
            .into_iter()
            .map(|(reaction, rate)| {
                let rendered = dictionary.resolve(&rate)?.render(dictionary.profile());
                Ok((reaction, rendered))
            })
            .collect()
    }

    /// Builds the function block and returns it with its dictionary and rates.
    pub fn translate(&self, network: &ReactionNetwork) -> Result<StanModel, ModelError> {
        network.validate()?;
        let dictionary = network.dictionary(self.profile(), true, true)?;
        let rates = self.substituted_rates(network, &dictionary)?;

        let mut code = String::new();
        writeln!(
            code,
            "real[] {}(real t, real[] y, real[] p, real[] x_r, int[] x_i)",
            self.options.function_name
        )?;
        writeln!(code, "    {{")?;
        writeln!(code, "    real dydt[{}];", network.species.len())?;
        let base = self.profile().indexing.base();
        for (i, species) in network.species.iter().enumerate() {
            let balance = render_balance(
                species,
                &network.mass_balances,
                &network.reactions,
                &rates,
            )?;
            writeln!(code, "    dydt[{}] = {balance};", i + base)?;
        }
        writeln!(code, "    return dydt;")?;
        writeln!(code, "    }}")?;

        log::debug!(
            "emitted Stan function '{}' ({} bytes)",
            self.options.function_name,
            code.len()
        );
        Ok(StanModel {
            code,
            dictionary,
            rates,
        })
    }
}

impl Emitter for StanEmitter {
    fn profile(&self) -> TargetProfile {
        TargetProfile::stan()
    }

    fn emit(&self, network: &ReactionNetwork) -> Result<String, ModelError> {
        Ok(self.translate(network)?.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::decay;

    #[test]
    fn test_decay_function() {
        let code = StanEmitter::default().emit(&decay()).unwrap();
        assert_eq!(
            code,
            "real[] odes(real t, real[] y, real[] p, real[] x_r, int[] x_i)\n    {\n    real dydt[2];\n    dydt[1] = - 1.0 * (0.5 * y[1]);\n    dydt[2] = + 1.0 * (0.5 * y[1]);\n    return dydt;\n    }\n"
        );
    }

    #[test]
    fn test_vectors_and_powers() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "k1 * A ** 2 / (Km + A) * exp(-kd * t)".to_string());
        network.parameters.insert("Km".to_string(), 2.0);
        network.parameters.insert("kd".to_string(), 0.1);
        network.estimate = vec!["k1".to_string()];
        network.tune = vec!["kd".to_string()];

        let emitter = StanEmitter::new(StanOptions {
            function_name: "decay".to_string(),
        });
        let model = emitter.translate(&network).unwrap();
        assert!(model.code.starts_with("real[] decay("));
        assert_eq!(
            model.rates["R1"],
            "(((p[1] * (y[1]^2)) / (2.0 + y[1])) * exp(((-x_r[1]) * t)))"
        );
        assert!(!model.code.contains("**"));
        assert_eq!(model.dictionary.reference("B").unwrap(), "y[2]");
    }

    #[test]
    fn test_unknown_identifier() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "k1 * A * E".to_string());
        assert!(matches!(
            StanEmitter::default().emit(&network),
            Err(ModelError::UnknownIdentifier(ids)) if ids == vec!["E"]
        ));
    }
}
