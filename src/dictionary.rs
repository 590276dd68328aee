//! Translation between symbolic identifiers and positional vector slots.
//!
//! Every output target addresses species and parameters differently: the native
//! evaluator reads `x[0]`, a Stan function reads `y[1]`, fitted parameters live
//! in `p`, tunable inputs in `x_r`, and parameters that are neither are baked
//! into the expressions as literals. A [`TranslationDictionary`] captures that
//! mapping once per target, and a [`TargetProfile`] captures how a target spells
//! vector references and exponentiation.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use kinetics_codegen::dictionary::{TargetProfile, TranslationDictionary};
//!
//! let species = vec!["A".to_string(), "B".to_string()];
//! let parameters = HashMap::from([("k1".to_string(), 0.5), ("k2".to_string(), 2.0)]);
//! let estimate = vec!["k2".to_string()];
//!
//! let dict = TranslationDictionary::build(&species, &parameters, &estimate, &[], TargetProfile::stan())
//!     .unwrap();
//! assert_eq!(dict.reference("A").unwrap(), "y[1]");
//! assert_eq!(dict.reference("k1").unwrap(), "0.5");
//! assert_eq!(dict.reference("k2").unwrap(), "p[1]");
//! ```

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::errors::ModelError;
use crate::expr::{format_literal, Expr};

/// Base of the vector indices a target expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexing {
    /// First element is `v[0]`
    ZeroBased,
    /// First element is `v[1]`
    OneBased,
}

impl Indexing {
    /// Offset added to a zero-based position when rendering a reference.
    pub fn base(&self) -> usize {
        match self {
            Indexing::ZeroBased => 0,
            Indexing::OneBased => 1,
        }
    }
}

/// Spelling of the exponentiation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExponentOperator {
    /// `a ** b`
    DoubleStar,
    /// `a ^ b`
    Caret,
}

impl ExponentOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExponentOperator::DoubleStar => "**",
            ExponentOperator::Caret => "^",
        }
    }
}

/// Rendering convention of one output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetProfile {
    pub indexing: Indexing,
    pub exponent: ExponentOperator,
    /// Name of the state vector
    pub state: &'static str,
    /// Name of the fit vector
    pub estimate: &'static str,
    /// Name of the tunable-input vector
    pub tune: &'static str,
    /// Name of the time variable
    pub time: &'static str,
    /// Name of the natural logarithm function
    pub ln: &'static str,
}

impl TargetProfile {
    /// Profile of the native numeric pipeline: `x[0]`, `p[0]`, `x_r[0]` and `**`.
    pub fn native() -> Self {
        Self {
            indexing: Indexing::ZeroBased,
            exponent: ExponentOperator::DoubleStar,
            state: "x",
            estimate: "p",
            tune: "x_r",
            time: "t",
            ln: "log",
        }
    }

    /// Profile of Stan ODE functions: `y[1]`, `p[1]`, `x_r[1]` and `^`.
    pub fn stan() -> Self {
        Self {
            indexing: Indexing::OneBased,
            exponent: ExponentOperator::Caret,
            state: "y",
            estimate: "p",
            tune: "x_r",
            time: "t",
            ln: "log",
        }
    }

    /// Profile of Antimony model blocks. Species and parameters keep their names;
    /// only time and the operators are target specific.
    pub fn antimony() -> Self {
        Self {
            indexing: Indexing::OneBased,
            exponent: ExponentOperator::Caret,
            state: "y",
            estimate: "p",
            tune: "x_r",
            time: "time",
            ln: "ln",
        }
    }

    /// Renders a slot reference, e.g. `y[3]` or `t`.
    pub fn reference(&self, slot: Slot) -> String {
        let base = self.indexing.base();
        match slot {
            Slot::State(i) => format!("{}[{}]", self.state, i + base),
            Slot::Estimate(i) => format!("{}[{}]", self.estimate, i + base),
            Slot::Tune(i) => format!("{}[{}]", self.tune, i + base),
            Slot::Time => self.time.to_string(),
        }
    }
}

/// A position in one of the evaluation vectors. Indices are zero-based; the
/// target's base is only applied when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    State(usize),
    Estimate(usize),
    Tune(usize),
    Time,
}

/// Replacement for one identifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    /// Fixed parameter value, baked into the expression
    Literal(f64),
    /// Reference into an evaluation vector
    Slot(Slot),
}

/// Mapping from species/parameter ids to their representation in one target.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationDictionary {
    entries: HashMap<String, Token>,
    profile: TargetProfile,
}

impl TranslationDictionary {
    /// Builds the dictionary of a target.
    ///
    /// - species at position i → state slot i
    /// - parameter in `estimate` at position i → fit-vector slot i
    /// - parameter in `tune` at position i → tunable-input slot i
    /// - every other parameter → its literal value
    ///
    /// # Errors
    /// Returns `ModelError::MalformedModel` if species ids are not unique, if a
    /// species id is also a parameter id, or if `estimate` and `tune` are not
    /// disjoint subsets of the parameter ids.
    pub fn build(
        species: &[String],
        parameters: &HashMap<String, f64>,
        estimate: &[String],
        tune: &[String],
        profile: TargetProfile,
    ) -> Result<Self, ModelError> {
        if let Some(duplicate) = species.iter().duplicates().next() {
            return Err(ModelError::MalformedModel(format!(
                "species '{duplicate}' is listed more than once"
            )));
        }
        if let Some(clash) = species.iter().find(|s| parameters.contains_key(*s)) {
            return Err(ModelError::MalformedModel(format!(
                "'{clash}' is both a species and a parameter"
            )));
        }
        for (role, ids) in [("estimate", estimate), ("tune", tune)] {
            if let Some(unknown) = ids.iter().find(|id| !parameters.contains_key(*id)) {
                return Err(ModelError::MalformedModel(format!(
                    "parameter '{unknown}' designated to {role} has no value"
                )));
            }
            if let Some(duplicate) = ids.iter().duplicates().next() {
                return Err(ModelError::MalformedModel(format!(
                    "parameter '{duplicate}' designated to {role} more than once"
                )));
            }
        }
        let estimated: HashSet<&String> = estimate.iter().collect();
        if let Some(both) = tune.iter().find(|id| estimated.contains(id)) {
            return Err(ModelError::MalformedModel(format!(
                "parameter '{both}' cannot be both estimated and tuned"
            )));
        }

        let mut entries: HashMap<String, Token> = parameters
            .iter()
            .map(|(id, value)| (id.clone(), Token::Literal(*value)))
            .collect();
        for (i, id) in estimate.iter().enumerate() {
            entries.insert(id.clone(), Token::Slot(Slot::Estimate(i)));
        }
        for (i, id) in tune.iter().enumerate() {
            entries.insert(id.clone(), Token::Slot(Slot::Tune(i)));
        }
        for (i, id) in species.iter().enumerate() {
            entries.insert(id.clone(), Token::Slot(Slot::State(i)));
        }

        log::trace!(
            "built translation dictionary with {} entries ({} species, {} estimated, {} tuned)",
            entries.len(),
            species.len(),
            estimate.len(),
            tune.len()
        );

        Ok(Self { entries, profile })
    }

    /// Binds `symbol` to the time slot.
    ///
    /// # Errors
    /// Returns `ModelError::MalformedModel` if `symbol` is already a species or parameter id.
    pub fn with_time(mut self, symbol: &str) -> Result<Self, ModelError> {
        if self.entries.contains_key(symbol) {
            return Err(ModelError::MalformedModel(format!(
                "time symbol '{symbol}' collides with a species or parameter id"
            )));
        }
        self.entries
            .insert(symbol.to_string(), Token::Slot(Slot::Time));
        Ok(self)
    }

    /// Returns the token of an identifier.
    pub fn get(&self, id: &str) -> Option<&Token> {
        self.entries.get(id)
    }

    /// Returns the rendered replacement text of an identifier, e.g. `x[3]` or `0.5`.
    pub fn reference(&self, id: &str) -> Option<String> {
        self.entries.get(id).map(|token| match token {
            Token::Literal(value) => format_literal(*value),
            Token::Slot(slot) => self.profile.reference(*slot),
        })
    }

    /// Returns the profile this dictionary renders with.
    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// Number of (state, fit-vector, tunable-input) slots an evaluation context must provide.
    pub fn slot_counts(&self) -> (usize, usize, usize) {
        self.entries
            .values()
            .fold((0, 0, 0), |(state, estimate, tune), token| match token {
                Token::Slot(Slot::State(_)) => (state + 1, estimate, tune),
                Token::Slot(Slot::Estimate(_)) => (state, estimate + 1, tune),
                Token::Slot(Slot::Tune(_)) => (state, estimate, tune + 1),
                Token::Slot(Slot::Time) | Token::Literal(_) => (state, estimate, tune),
            })
    }

    /// Iterates over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Token)> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitutes every identifier of `expr` and checks that none is left unresolved.
    ///
    /// # Errors
    /// Returns `ModelError::UnknownIdentifier` listing every identifier of `expr`
    /// that the dictionary does not cover.
    pub fn resolve(&self, expr: &Expr) -> Result<Expr, ModelError> {
        let substituted = expr.substitute(self);
        let unresolved = substituted.unresolved();
        if !unresolved.is_empty() {
            return Err(ModelError::UnknownIdentifier(
                unresolved.into_iter().collect(),
            ));
        }
        Ok(*substituted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::parse_expression;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn parameters() -> HashMap<String, f64> {
        HashMap::from([
            ("k1".to_string(), 0.5),
            ("k2".to_string(), 2.0),
            ("Km".to_string(), 3.0),
        ])
    }

    #[test]
    fn test_zero_based_dictionary() {
        let dict = TranslationDictionary::build(
            &ids(&["A", "B", "C"]),
            &parameters(),
            &ids(&["k2"]),
            &ids(&["Km"]),
            TargetProfile::native(),
        )
        .unwrap();

        assert_eq!(dict.get("A"), Some(&Token::Slot(Slot::State(0))));
        assert_eq!(dict.get("C"), Some(&Token::Slot(Slot::State(2))));
        assert_eq!(dict.get("k1"), Some(&Token::Literal(0.5)));
        assert_eq!(dict.reference("C").unwrap(), "x[2]");
        assert_eq!(dict.reference("k2").unwrap(), "p[0]");
        assert_eq!(dict.reference("Km").unwrap(), "x_r[0]");
        assert_eq!(dict.len(), 6);
        assert_eq!(dict.slot_counts(), (3, 1, 1));
    }

    #[test]
    fn test_one_based_dictionary() {
        let dict = TranslationDictionary::build(
            &ids(&["A", "B"]),
            &parameters(),
            &ids(&["k1", "k2"]),
            &[],
            TargetProfile::stan(),
        )
        .unwrap();

        assert_eq!(dict.reference("A").unwrap(), "y[1]");
        assert_eq!(dict.reference("B").unwrap(), "y[2]");
        assert_eq!(dict.reference("k1").unwrap(), "p[1]");
        assert_eq!(dict.reference("k2").unwrap(), "p[2]");
        assert_eq!(dict.reference("Km").unwrap(), "3.0");
        assert_eq!(dict.reference("missing"), None);
    }

    #[test]
    fn test_time_binding() {
        let dict = TranslationDictionary::build(
            &ids(&["A"]),
            &parameters(),
            &[],
            &[],
            TargetProfile::antimony(),
        )
        .unwrap()
        .with_time("t")
        .unwrap();
        assert_eq!(dict.reference("t").unwrap(), "time");

        let clash = TranslationDictionary::build(
            &ids(&["t"]),
            &parameters(),
            &[],
            &[],
            TargetProfile::native(),
        )
        .unwrap()
        .with_time("t");
        assert!(matches!(clash, Err(ModelError::MalformedModel(_))));
    }

    #[test]
    fn test_invalid_roles() {
        let species = ids(&["A"]);
        let params = parameters();

        let overlapping = TranslationDictionary::build(
            &species,
            &params,
            &ids(&["k1"]),
            &ids(&["k1"]),
            TargetProfile::native(),
        );
        assert!(matches!(overlapping, Err(ModelError::MalformedModel(_))));

        let unknown = TranslationDictionary::build(
            &species,
            &params,
            &ids(&["kcat"]),
            &[],
            TargetProfile::native(),
        );
        assert!(matches!(unknown, Err(ModelError::MalformedModel(_))));

        let duplicated = TranslationDictionary::build(
            &ids(&["A", "A"]),
            &params,
            &[],
            &[],
            TargetProfile::native(),
        );
        assert!(matches!(duplicated, Err(ModelError::MalformedModel(_))));

        let clash = TranslationDictionary::build(
            &ids(&["k1"]),
            &params,
            &[],
            &[],
            TargetProfile::native(),
        );
        assert!(matches!(clash, Err(ModelError::MalformedModel(_))));
    }

    #[test]
    fn test_resolve_reports_all_unknown_identifiers() {
        let dict = TranslationDictionary::build(
            &ids(&["A"]),
            &parameters(),
            &[],
            &[],
            TargetProfile::native(),
        )
        .unwrap();
        let expr = parse_expression("k1 * A * E / (Ki + S)").unwrap();

        match dict.resolve(&expr) {
            Err(ModelError::UnknownIdentifier(missing)) => {
                assert_eq!(missing, vec!["E", "Ki", "S"]);
            }
            other => panic!("expected unknown identifier error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_binds_slots() {
        let dict = TranslationDictionary::build(
            &ids(&["A"]),
            &parameters(),
            &[],
            &[],
            TargetProfile::native(),
        )
        .unwrap();
        let expr = dict.resolve(&parse_expression("k1*A").unwrap()).unwrap();
        assert_eq!(expr.render(dict.profile()), "(0.5 * x[0])");
    }
}
