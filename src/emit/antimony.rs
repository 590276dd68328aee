use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use itertools::Itertools;

use crate::balance::render_balance;
use crate::convert::parse_expression;
use crate::dictionary::{Slot, TargetProfile, TranslationDictionary};
use crate::emit::Emitter;
use crate::errors::ModelError;
use crate::expr::{format_literal, Expr, VarRef};
use crate::model::ReactionNetwork;

/// Options of the Antimony model block.
#[derive(Debug, Clone, PartialEq)]
pub struct AntimonyOptions {
    pub model_name: String,
    /// Initial conditions that replace the network's own; `None` keeps them
    pub initial_conditions: Option<HashMap<String, f64>>,
    /// Helper expressions emitted as assignment rules; rate laws may use their names
    pub functions: BTreeMap<String, String>,
}

impl Default for AntimonyOptions {
    fn default() -> Self {
        Self {
            model_name: "model".to_string(),
            initial_conditions: None,
            functions: BTreeMap::new(),
        }
    }
}

/// Emits a name-based Antimony model block for Tellurium.
///
/// Species and parameters keep their ids. Rate laws and helper functions
/// become assignment rules (`R1 := ...;`), balances become rate rules
/// (`A' = ...;`) over the rule names and every parameter is declared with
/// its value.
#[derive(Debug, Clone, Default)]
pub struct AntimonyEmitter {
    pub options: AntimonyOptions,
}

impl AntimonyEmitter {
    pub fn new(options: AntimonyOptions) -> Self {
        Self { options }
    }

    /// Fails with `UnknownIdentifier` for ids that are neither in the
    /// dictionary nor helper functions.
    fn check_identifiers(
        &self,
        dictionary: &TranslationDictionary,
        expr: &Expr,
    ) -> Result<(), ModelError> {
        let unknown: Vec<String> = expr
            .substitute(dictionary)
            .unresolved()
            .into_iter()
            .filter(|id| !self.options.functions.contains_key(id))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ModelError::UnknownIdentifier(unknown))
        }
    }

    /// Renders by name, with the network's time symbol written as `time`.
    fn render_named(&self, network: &ReactionNetwork, expr: &Expr) -> String {
        let time = Expr::Var(VarRef {
            name: network.time.clone(),
            slot: Some(Slot::Time),
        });
        expr.insert(
            |e| matches!(e, Expr::Var(v) if v.slot.is_none() && v.name == network.time),
            &time,
        )
        .render(&self.profile())
    }

    /// Renders the rate law of every reaction by name, with time written as
    /// `time`.
    ///
    /// # Errors
    /// `SymbolicCompilation` for rate laws that do not parse and
    /// `UnknownIdentifier` for ids that are neither species, parameters,
    /// functions nor time.
    pub fn rate_rules(
        &self,
        network: &ReactionNetwork,
    ) -> Result<HashMap<String, String>, ModelError> {
        let dictionary = network.dictionary(self.profile(), false, true)?;
        network
            .parse_rate_laws()?
            .into_iter()
            .map(|(reaction, rate)| {
                self.check_identifiers(&dictionary, &rate)?;
                Ok((reaction, self.render_named(network, &rate)))
            })
            .collect()
    }

    /// Renders every helper function, sorted by name.
    ///
    /// # Errors
    /// `MalformedModel` for a function that shadows a species, parameter,
    /// reaction or the time symbol, or that does not parse, and
    /// `UnknownIdentifier` for ids its body cannot resolve.
    pub fn function_rules(
        &self,
        network: &ReactionNetwork,
    ) -> Result<BTreeMap<String, String>, ModelError> {
        let dictionary = network.dictionary(self.profile(), false, true)?;
        self.options
            .functions
            .iter()
            .map(|(name, text)| {
                if network.species.contains(name)
                    || network.reactions.contains(name)
                    || network.parameters.contains_key(name)
                    || *name == network.time
                {
                    return Err(ModelError::MalformedModel(format!(
                        "function '{name}' shadows an id of the model"
                    )));
                }
                let body = parse_expression(text).map_err(|e| {
                    ModelError::MalformedModel(format!("function '{name}' does not parse: {e}"))
                })?;
                self.check_identifiers(&dictionary, &body)?;
                Ok((name.clone(), self.render_named(network, &body)))
            })
            .collect()
    }
}

impl Emitter for AntimonyEmitter {
    fn profile(&self) -> TargetProfile {
        TargetProfile::antimony()
    }

    fn emit(&self, network: &ReactionNetwork) -> Result<String, ModelError> {
        network.validate()?;
        let rules = self.rate_rules(network)?;
        let functions = self.function_rules(network)?;
        let names: HashMap<String, String> = network
            .reactions
            .iter()
            .map(|r| (r.clone(), r.clone()))
            .collect();

        let initial = self
            .options
            .initial_conditions
            .as_ref()
            .unwrap_or(&network.initial_conditions);
        if let Some(unknown) = initial.keys().sorted().find(|s| !network.species.contains(*s)) {
            return Err(ModelError::MalformedModel(format!(
                "initial condition given for unknown species '{unknown}'"
            )));
        }

        let mut code = String::new();
        writeln!(code, "model {}()", self.options.model_name)?;

        writeln!(code, "# mass balances")?;
        for species in &network.species {
            let balance =
                render_balance(species, &network.mass_balances, &network.reactions, &names)?;
            writeln!(code, "{species}' = {balance};")?;
        }

        writeln!(code, "# rate equations")?;
        for reaction in &network.reactions {
            writeln!(code, "{reaction} := {};", rules[reaction])?;
        }

        writeln!(code, "# functions")?;
        for (name, body) in &functions {
            writeln!(code, "{name} := {body};")?;
        }

        writeln!(code, "# parameters")?;
        for (id, value) in network.parameters.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            writeln!(code, "{id} = {};", format_literal(*value))?;
        }

        writeln!(code, "# initial conditions")?;
        writeln!(code, "species {}", network.species.join(", "))?;
        for species in &network.species {
            if let Some(value) = initial.get(species) {
                writeln!(code, "{species} = {};", format_literal(*value))?;
            }
        }
        writeln!(code, "end")?;

        log::debug!(
            "emitted Antimony model '{}' ({} bytes)",
            self.options.model_name,
            code.len()
        );
        Ok(code)
    }
}
