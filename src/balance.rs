//! Mass balances: the signed, coefficient-scaled sum of rates for one species.
//!
//! [`balance_terms`] is the single definition of what a balance contains. The
//! numeric pipeline folds the terms into an expression tree
//! ([`assemble_balance`]) and the code emitters print them as text
//! ([`render_balance`]), so every representation agrees on ordering and signs.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;

use crate::errors::ModelError;
use crate::expr::{format_literal, Expr};
use crate::model::MassBalances;

/// Sign of a balance term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Plus => write!(f, "+"),
            Sign::Minus => write!(f, "-"),
        }
    }
}

/// One `<sign> <magnitude> * <rate of reaction>` term.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceTerm<'a> {
    pub reaction: &'a str,
    pub sign: Sign,
    pub magnitude: f64,
}

/// Lists the terms of the balance of `species`, in reaction order.
///
/// The sign is `+` for a positive coefficient and `-` otherwise; the magnitude
/// is always the absolute value. A species without balance entries has no terms.
///
/// # Errors
/// `MalformedModel` if an entry names a reaction that is not in `reactions`.
pub fn balance_terms<'a>(
    species: &str,
    balances: &'a MassBalances,
    reactions: &'a [String],
) -> Result<Vec<BalanceTerm<'a>>, ModelError> {
    let Some(entries) = balances.get(species) else {
        return Ok(Vec::new());
    };
    if let Some(unknown) = entries
        .keys()
        .filter(|r| !reactions.contains(*r))
        .sorted()
        .next()
    {
        return Err(ModelError::MalformedModel(format!(
            "mass balance of '{species}' references unlisted reaction '{unknown}'"
        )));
    }

    Ok(reactions
        .iter()
        .filter_map(|reaction| {
            entries.get(reaction).map(|coefficient| BalanceTerm {
                reaction,
                sign: if *coefficient > 0.0 {
                    Sign::Plus
                } else {
                    Sign::Minus
                },
                magnitude: coefficient.abs(),
            })
        })
        .collect())
}

fn check_rate_laws<T>(
    species: &str,
    balances: &MassBalances,
    rates: &HashMap<String, T>,
) -> Result<(), ModelError> {
    let Some(entries) = balances.get(species) else {
        return Ok(());
    };
    match entries.keys().filter(|r| !rates.contains_key(*r)).sorted().next() {
        Some(reaction) => Err(ModelError::MissingBalanceRateLaw {
            species: species.to_string(),
            reaction: reaction.clone(),
        }),
        None => Ok(()),
    }
}

/// Assembles the balance of `species` as an expression over the given rate trees.
///
/// An empty balance is the constant zero.
///
/// # Errors
/// `MissingBalanceRateLaw` if an entry's reaction has no rate, `MalformedModel`
/// if it is not a listed reaction.
pub fn assemble_balance(
    species: &str,
    balances: &MassBalances,
    reactions: &[String],
    rates: &HashMap<String, Expr>,
) -> Result<Expr, ModelError> {
    check_rate_laws(species, balances, rates)?;

    let mut balance: Option<Expr> = None;
    for term in balance_terms(species, balances, reactions)? {
        let scaled = Box::new(Expr::Mul(
            Box::new(Expr::Const(term.magnitude)),
            Box::new(rates[term.reaction].clone()),
        ));
        balance = Some(match (balance, term.sign) {
            (None, Sign::Plus) => *scaled,
            (None, Sign::Minus) => Expr::Neg(scaled),
            (Some(acc), Sign::Plus) => Expr::Add(Box::new(acc), scaled),
            (Some(acc), Sign::Minus) => Expr::Sub(Box::new(acc), scaled),
        });
    }
    Ok(balance.unwrap_or(Expr::Const(0.0)))
}

/// Renders the balance of `species` as text over already rendered rates,
/// e.g. `- 1.0 * (k1 * y[1]) + 2.0 * (k2 * y[2])`.
///
/// An empty balance renders as `0.0`.
///
/// # Errors
/// Same as [`assemble_balance`].
pub fn render_balance(
    species: &str,
    balances: &MassBalances,
    reactions: &[String],
    rates: &HashMap<String, String>,
) -> Result<String, ModelError> {
    check_rate_laws(species, balances, rates)?;

    let terms = balance_terms(species, balances, reactions)?;
    if terms.is_empty() {
        return Ok(format_literal(0.0));
    }
    Ok(terms
        .iter()
        .map(|term| {
            format!(
                "{} {} * {}",
                term.sign,
                format_literal(term.magnitude),
                rates[term.reaction]
            )
        })
        .join(" "))
}
