//! The reaction network description every compilation starts from.
//!
//! A [`ReactionNetwork`] is plain data: ordered species and reaction ids, one
//! rate-law string per reaction, the signed stoichiometric coefficients of the
//! mass balances and the parameter set. It deserialises from JSON:
//!
//! ```
//! use kinetics_codegen::model::ReactionNetwork;
//!
//! let network = ReactionNetwork::from_json(r#"{
//!     "species": ["A", "B"],
//!     "reactions": ["R1"],
//!     "rate_laws": {"R1": "k1 * A"},
//!     "mass_balances": {"A": {"R1": -1}, "B": {"R1": 1}},
//!     "parameters": {"k1": 0.5}
//! }"#).unwrap();
//! network.validate().unwrap();
//! assert_eq!(network.time, "t");
//! ```

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::convert::parse_expression;
use crate::dictionary::{TargetProfile, TranslationDictionary};
use crate::errors::{ModelError, ReadError};
use crate::expr::Expr;

fn default_time() -> String {
    "t".to_string()
}

/// Species → reaction → signed stoichiometric coefficient.
pub type MassBalances = HashMap<String, HashMap<String, f64>>;

/// Description of a metabolic reaction network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionNetwork {
    /// Species ids; the position of a species is its index in every state vector
    pub species: Vec<String>,
    /// Reaction ids; the position of a reaction is its index in the rate vector
    pub reactions: Vec<String>,
    /// Rate-law expression of each reaction
    pub rate_laws: HashMap<String, String>,
    #[serde(default)]
    pub mass_balances: MassBalances,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    /// Parameters that become slots of the fit vector `p`
    #[serde(default)]
    pub estimate: Vec<String>,
    /// Parameters that become slots of the tunable-input vector `x_r`
    #[serde(default)]
    pub tune: Vec<String>,
    #[serde(default)]
    pub initial_conditions: HashMap<String, f64>,
    /// Symbol rate laws use for time
    #[serde(default = "default_time")]
    pub time: String,
}

impl ReactionNetwork {
    /// Creates a network without parameters, balances or initial conditions.
    pub fn new(species: Vec<String>, reactions: Vec<String>, rate_laws: HashMap<String, String>) -> Self {
        Self {
            species,
            reactions,
            rate_laws,
            mass_balances: HashMap::new(),
            parameters: HashMap::new(),
            estimate: Vec::new(),
            tune: Vec::new(),
            initial_conditions: HashMap::new(),
            time: default_time(),
        }
    }

    /// Parses a network from its JSON description.
    pub fn from_json(text: &str) -> Result<Self, ReadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks the structural rules every compilation relies on.
    ///
    /// # Errors
    /// - `MalformedModel` for empty or duplicated species/reaction ids, balance or
    ///   initial-condition entries naming unknown species, balance entries naming
    ///   reactions that are not listed, and invalid parameter roles
    /// - `MissingRateLaw` for a listed reaction without a rate law
    /// - `MissingBalanceRateLaw` for a balance entry whose reaction has no rate law
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.species.is_empty() {
            return Err(ModelError::MalformedModel("no species defined".to_string()));
        }
        if self.reactions.is_empty() {
            return Err(ModelError::MalformedModel("no reactions defined".to_string()));
        }
        if let Some(duplicate) = self.reactions.iter().duplicates().next() {
            return Err(ModelError::MalformedModel(format!(
                "reaction '{duplicate}' is listed more than once"
            )));
        }
        if let Some(reaction) = self
            .reactions
            .iter()
            .find(|r| !self.rate_laws.contains_key(*r))
        {
            return Err(ModelError::MissingRateLaw {
                reaction: reaction.clone(),
            });
        }

        for species in self.mass_balances.keys().sorted() {
            if !self.species.contains(species) {
                return Err(ModelError::MalformedModel(format!(
                    "mass balance given for unknown species '{species}'"
                )));
            }
            let entries = &self.mass_balances[species];
            for reaction in entries.keys().sorted() {
                if !self.rate_laws.contains_key(reaction) {
                    return Err(ModelError::MissingBalanceRateLaw {
                        species: species.clone(),
                        reaction: reaction.clone(),
                    });
                }
                if !self.reactions.contains(reaction) {
                    return Err(ModelError::MalformedModel(format!(
                        "mass balance of '{species}' references unlisted reaction '{reaction}'"
                    )));
                }
            }
        }

        if let Some(species) = self
            .initial_conditions
            .keys()
            .sorted()
            .find(|s| !self.species.contains(*s))
        {
            return Err(ModelError::MalformedModel(format!(
                "initial condition given for unknown species '{species}'"
            )));
        }

        // Species uniqueness and parameter roles; the time symbol is only
        // reserved by targets that bind it
        self.dictionary(TargetProfile::native(), true, false)?;

        for species in &self.species {
            if self.mass_balances.get(species).is_none_or(|e| e.is_empty()) {
                log::warn!("species '{species}' has an empty mass balance");
            }
        }
        for reaction in self.rate_laws.keys().sorted() {
            if !self.reactions.contains(reaction) {
                log::warn!("rate law of unlisted reaction '{reaction}' is ignored");
            }
        }
        Ok(())
    }

    /// Parses the rate law of every listed reaction.
    ///
    /// # Errors
    /// `MissingRateLaw` or `SymbolicCompilation` naming the offending reaction.
    pub fn parse_rate_laws(&self) -> Result<HashMap<String, Expr>, ModelError> {
        let mut parsed = HashMap::with_capacity(self.reactions.len());
        for reaction in &self.reactions {
            let text = self
                .rate_laws
                .get(reaction)
                .ok_or_else(|| ModelError::MissingRateLaw {
                    reaction: reaction.clone(),
                })?;
            let expr =
                parse_expression(text).map_err(|source| ModelError::SymbolicCompilation {
                    reaction: reaction.clone(),
                    source,
                })?;
            parsed.insert(reaction.clone(), expr);
        }

        let referenced: BTreeSet<String> = parsed.values().flat_map(|e| e.symbols()).collect();
        for parameter in self.parameters.keys().sorted() {
            if !referenced.contains(parameter) {
                log::warn!("parameter '{parameter}' is not referenced by any rate law");
            }
        }
        log::debug!("parsed {} rate laws", parsed.len());
        Ok(parsed)
    }

    /// Builds the translation dictionary of this network for one target.
    ///
    /// With `params_as_input` the estimate/tune designations are honoured;
    /// otherwise every parameter is baked in as a literal. With `time_as_input`
    /// the network's time symbol is bound to the time slot.
    pub fn dictionary(
        &self,
        profile: TargetProfile,
        params_as_input: bool,
        time_as_input: bool,
    ) -> Result<TranslationDictionary, ModelError> {
        let (estimate, tune): (&[String], &[String]) = if params_as_input {
            (&self.estimate, &self.tune)
        } else {
            (&[], &[])
        };
        let dictionary =
            TranslationDictionary::build(&self.species, &self.parameters, estimate, tune, profile)?;
        if time_as_input {
            dictionary.with_time(&self.time)
        } else {
            Ok(dictionary)
        }
    }

    /// Values of the estimated parameters, in fit-vector order.
    pub fn estimate_values(&self) -> Vec<f64> {
        self.estimate
            .iter()
            .map(|id| self.parameters.get(id).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Values of the tunable parameters, in input-vector order.
    pub fn tune_values(&self) -> Vec<f64> {
        self.tune
            .iter()
            .map(|id| self.parameters.get(id).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Initial state in species order; species without an initial condition start at 0.
    pub fn initial_state(&self) -> Vec<f64> {
        self.species
            .iter()
            .map(|s| self.initial_conditions.get(s).copied().unwrap_or(0.0))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A → B with rate law `k1 * A`, k1 = 0.5.
    pub(crate) fn decay() -> ReactionNetwork {
        let mut network = ReactionNetwork::new(
            vec!["A".to_string(), "B".to_string()],
            vec!["R1".to_string()],
            HashMap::from([("R1".to_string(), "k1 * A".to_string())]),
        );
        network.mass_balances = HashMap::from([
            ("A".to_string(), HashMap::from([("R1".to_string(), -1.0)])),
            ("B".to_string(), HashMap::from([("R1".to_string(), 1.0)])),
        ]);
        network.parameters = HashMap::from([("k1".to_string(), 0.5)]);
        network.initial_conditions = HashMap::from([("A".to_string(), 4.0)]);
        network
    }

    #[test]
    fn test_validate_decay() {
        decay().validate().unwrap();
        assert_eq!(decay().initial_state(), vec![4.0, 0.0]);
    }

    #[test]
    fn test_missing_rate_law() {
        let mut network = decay();
        network.rate_laws.clear();
        assert!(matches!(
            network.validate(),
            Err(ModelError::MissingRateLaw { reaction }) if reaction == "R1"
        ));
    }

    #[test]
    fn test_balance_with_missing_rate_law() {
        let mut network = decay();
        network
            .mass_balances
            .get_mut("B")
            .unwrap()
            .insert("R2".to_string(), 1.0);
        assert!(matches!(
            network.validate(),
            Err(ModelError::MissingBalanceRateLaw { species, reaction })
                if species == "B" && reaction == "R2"
        ));
    }

    #[test]
    fn test_malformed_models() {
        let mut empty = decay();
        empty.species.clear();
        assert!(matches!(empty.validate(), Err(ModelError::MalformedModel(_))));

        let mut duplicated = decay();
        duplicated.reactions.push("R1".to_string());
        assert!(matches!(duplicated.validate(), Err(ModelError::MalformedModel(_))));

        let mut unknown_species = decay();
        unknown_species
            .mass_balances
            .insert("C".to_string(), HashMap::from([("R1".to_string(), 1.0)]));
        assert!(matches!(
            unknown_species.validate(),
            Err(ModelError::MalformedModel(_))
        ));

        let mut both_roles = decay();
        both_roles.estimate = vec!["k1".to_string()];
        both_roles.tune = vec!["k1".to_string()];
        assert!(matches!(both_roles.validate(), Err(ModelError::MalformedModel(_))));
    }

    #[test]
    fn test_unparsable_rate_law() {
        let mut network = decay();
        network
            .rate_laws
            .insert("R1".to_string(), "k1 * (A".to_string());
        assert!(matches!(
            network.parse_rate_laws(),
            Err(ModelError::SymbolicCompilation { reaction, .. }) if reaction == "R1"
        ));
    }

    #[test]
    fn test_from_json_defaults() {
        let network = ReactionNetwork::from_json(
            r#"{"species": ["A"], "reactions": ["R1"], "rate_laws": {"R1": "k * A"}}"#,
        )
        .unwrap();
        assert_eq!(network.time, "t");
        assert!(network.parameters.is_empty());
        assert!(network.mass_balances.is_empty());
    }
}
