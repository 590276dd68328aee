//! Dense stoichiometry matrix of a reaction network.

use std::fmt;

use colored::Colorize;

use crate::backends::matrix::Matrix;
use crate::balance::{balance_terms, Sign};
use crate::errors::ModelError;
use crate::model::MassBalances;

/// Coefficients of every reaction on every species.
///
/// Rows follow the species order and columns the reaction order. Entry (i, j)
/// is the signed coefficient of reaction j in the mass balance of species i, or
/// zero if the reaction does not affect the species.
#[derive(Debug, Clone, PartialEq)]
pub struct StoichiometryMatrix {
    species: Vec<String>,
    reactions: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl StoichiometryMatrix {
    /// Builds the matrix from the mass balances.
    ///
    /// # Errors
    /// `MalformedModel` if a balance entry names a reaction that is not in `reactions`.
    pub fn build(
        species: &[String],
        reactions: &[String],
        balances: &MassBalances,
    ) -> Result<Self, ModelError> {
        let mut rows = vec![vec![0.0; reactions.len()]; species.len()];
        for (row, id) in rows.iter_mut().zip(species) {
            for term in balance_terms(id, balances, reactions)? {
                let col = reactions
                    .iter()
                    .position(|r| r == term.reaction)
                    .ok_or_else(|| {
                        ModelError::MalformedModel(format!("unknown reaction '{}'", term.reaction))
                    })?;
                row[col] = match term.sign {
                    Sign::Plus => term.magnitude,
                    Sign::Minus => -term.magnitude,
                };
            }
        }

        log::debug!(
            "built {}x{} stoichiometry matrix",
            species.len(),
            reactions.len()
        );
        Ok(Self {
            species: species.to_vec(),
            reactions: reactions.to_vec(),
            rows,
        })
    }

    /// Returns the coefficient of reaction `col` on species `row`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.rows.get(row)?.get(col).copied()
    }

    /// Returns the matrix as row-major nested vectors.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Returns (|species|, |reactions|).
    pub fn dims(&self) -> (usize, usize) {
        (self.species.len(), self.reactions.len())
    }

    /// Returns the coefficients of one reaction over all species.
    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        (col < self.reactions.len()).then(|| self.rows.iter().map(|row| row[col]).collect())
    }

    /// Copies the matrix into any [`Matrix`] backend.
    pub fn to_matrix<M: Matrix>(&self) -> M {
        let (n_rows, n_cols) = self.dims();
        let mut matrix = M::zeros(n_rows, n_cols);
        for (i, row) in self.rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                matrix.set(i, j, *value);
            }
        }
        matrix
    }

    /// Computes `S · v`, the species derivatives produced by a rate vector.
    pub fn apply(&self, rates: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(rates).map(|(c, v)| c * v).sum())
            .collect()
    }
}

impl fmt::Display for StoichiometryMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for reaction in &self.reactions {
            write!(f, " {:>8}", reaction.bold())?;
        }
        writeln!(f)?;
        for (species, row) in self.species.iter().zip(&self.rows) {
            write!(f, "{:>8}", species.bold())?;
            for value in row {
                let cell = format!("{value:>8}");
                let cell = if *value > 0.0 {
                    cell.green()
                } else if *value < 0.0 {
                    cell.red()
                } else {
                    cell.dimmed()
                };
                write!(f, " {cell}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decay_matrix() {
        let balances: MassBalances = HashMap::from([
            ("A".to_string(), HashMap::from([("R1".to_string(), -1.0)])),
            ("B".to_string(), HashMap::from([("R1".to_string(), 1.0)])),
        ]);
        let matrix = StoichiometryMatrix::build(&ids(&["A", "B"]), &ids(&["R1"]), &balances).unwrap();
        assert_eq!(matrix.dims(), (2, 1));
        assert_eq!(matrix.rows(), &[vec![-1.0], vec![1.0]]);
    }

    #[test]
    fn test_partial_entries_default_to_zero() {
        // A -> 2 B, B -> C; C has no balance entry at all
        let balances: MassBalances = HashMap::from([
            ("A".to_string(), HashMap::from([("R1".to_string(), -1.0)])),
            (
                "B".to_string(),
                HashMap::from([("R1".to_string(), 2.0), ("R2".to_string(), -1.0)]),
            ),
        ]);
        let matrix = StoichiometryMatrix::build(
            &ids(&["A", "B", "C"]),
            &ids(&["R1", "R2"]),
            &balances,
        )
        .unwrap();
        assert_eq!(
            matrix.rows(),
            &[vec![-1.0, 0.0], vec![2.0, -1.0], vec![0.0, 0.0]]
        );
        assert_eq!(matrix.column(0), Some(vec![-1.0, 2.0, 0.0]));
        assert_eq!(matrix.column(2), None);
        assert_eq!(matrix.get(1, 1), Some(-1.0));
        assert_eq!(matrix.get(3, 0), None);
        assert_eq!(matrix.apply(&[1.0, 0.5]), vec![-1.0, 1.5, 0.0]);

        let nested: Vec<Vec<f64>> = matrix.to_matrix();
        assert_eq!(nested, matrix.rows());
    }

    #[test]
    fn test_unknown_reaction() {
        let balances: MassBalances =
            HashMap::from([("A".to_string(), HashMap::from([("R9".to_string(), -1.0)]))]);
        assert!(matches!(
            StoichiometryMatrix::build(&ids(&["A"]), &ids(&["R1"]), &balances),
            Err(ModelError::MalformedModel(_))
        ));
    }
}
