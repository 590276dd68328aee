//! Adapters between the compiled model and files produced or consumed by external tools.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::errors::ReadError;
use crate::model::ReactionNetwork;

/// Loads a network from a JSON file.
pub fn load_network<P: AsRef<Path>>(path: P) -> Result<ReactionNetwork, ReadError> {
    let text = fs::read_to_string(path.as_ref())?;
    let network = ReactionNetwork::from_json(&text)?;
    log::info!(
        "loaded network from {} ({} species, {} reactions)",
        path.as_ref().display(),
        network.species.len(),
        network.reactions.len()
    );
    Ok(network)
}

/// Column naming of an optimizer result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Prefix of the fitted trajectory columns, `<prefix>.<t>.<s>`
    pub prefix: String,
    /// Name of the fit-vector columns, `<estimate>.<k>`
    pub estimate: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            prefix: "y_hat".to_string(),
            estimate: "p".to_string(),
        }
    }
}

/// Values recovered from an optimizer run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptimizerOutput {
    /// Every network parameter, with estimated ones replaced by their fit
    pub parameters: HashMap<String, f64>,
    /// Species values per time point, keyed by species id
    pub species: Vec<HashMap<String, f64>>,
}

/// Splits `<name>.<i>[.<j>...]` into its 1-based indices if `name` matches.
fn indices<'a>(column: &'a str, name: &str) -> Option<Vec<&'a str>> {
    let rest = column.strip_prefix(name)?.strip_prefix('.')?;
    Some(rest.split('.').collect())
}

fn position(column: &str, index: &str, len: usize) -> Result<usize, ReadError> {
    let index: usize = index.parse().map_err(|_| ReadError::InvalidNumber {
        column: column.to_string(),
        value: index.to_string(),
    })?;
    if index == 0 || index > len {
        return Err(ReadError::IndexOutOfRange {
            column: column.to_string(),
            index,
            len,
        });
    }
    Ok(index - 1)
}

/// Reads the result of an optimizer run written as delimited text (e.g. a Stan CSV).
///
/// Lines starting with `#` are skipped, the first remaining line is the header
/// and the first data row is read. Columns `p.<k>` map to the k-th estimated
/// parameter, columns `y_hat.<t>.<s>` to species `s` at time point `t`, both
/// 1-based. Other columns are ignored.
///
/// # Errors
/// `NoData` without a data row, `IndexOutOfRange` for positions outside of the
/// network and `InvalidNumber` for cells that are not numbers.
pub fn read_optimizer_output<R: Read>(
    reader: R,
    network: &ReactionNetwork,
    layout: &OutputLayout,
) -> Result<OptimizerOutput, ReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let row = reader.records().next().ok_or(ReadError::NoData)??;

    let mut output = OptimizerOutput {
        parameters: network.parameters.clone(),
        species: Vec::new(),
    };

    for (column, cell) in headers.iter().zip(row.iter()) {
        let value = || {
            cell.parse::<f64>().map_err(|_| ReadError::InvalidNumber {
                column: column.to_string(),
                value: cell.to_string(),
            })
        };

        if let Some(parts) = indices(column, &layout.estimate) {
            let [k] = parts.as_slice() else { continue };
            let k = position(column, k, network.estimate.len())?;
            output
                .parameters
                .insert(network.estimate[k].clone(), value()?);
        } else if let Some(parts) = indices(column, &layout.prefix) {
            let [t, s] = parts.as_slice() else { continue };
            let s = position(column, s, network.species.len())?;
            // A dense table cannot have more time points than columns
            let t = position(column, t, headers.len())?;
            if output.species.len() <= t {
                output.species.resize_with(t + 1, HashMap::new);
            }
            output.species[t].insert(network.species[s].clone(), value()?);
        }
    }

    log::debug!(
        "read {} estimates and {} time points from optimizer output",
        network.estimate.len(),
        output.species.len()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::decay;

    fn network() -> ReactionNetwork {
        let mut network = decay();
        network.parameters.insert("k2".to_string(), 3.0);
        network.estimate = vec!["k1".to_string()];
        network
    }

    #[test]
    fn test_read_first_row() {
        let text = "\
# stan_version_major = 2
# method = optimize
lp__,p.1,y_hat.1.1,y_hat.1.2,y_hat.2.1,y_hat.2.2
# Adaptation terminated
-12.5,0.42,4.0,0.0,3.2,0.8
-13.1,0.40,4.0,0.0,3.3,0.7
";
        let output =
            read_optimizer_output(text.as_bytes(), &network(), &OutputLayout::default()).unwrap();
        assert_eq!(output.parameters["k1"], 0.42);
        assert_eq!(output.parameters["k2"], 3.0);
        assert_eq!(output.species.len(), 2);
        assert_eq!(output.species[0]["A"], 4.0);
        assert_eq!(output.species[1]["B"], 0.8);
    }

    #[test]
    fn test_custom_prefix() {
        let text = "p.1,x.1.2\n0.3,1.25\n";
        let layout = OutputLayout {
            prefix: "x".to_string(),
            ..OutputLayout::default()
        };
        let output = read_optimizer_output(text.as_bytes(), &network(), &layout).unwrap();
        assert_eq!(output.parameters["k1"], 0.3);
        assert_eq!(output.species[0]["B"], 1.25);
    }

    #[test]
    fn test_errors() {
        let layout = OutputLayout::default();
        assert!(matches!(
            read_optimizer_output("p.1\n".as_bytes(), &network(), &layout),
            Err(ReadError::NoData)
        ));
        assert!(matches!(
            read_optimizer_output("p.2\n1.0\n".as_bytes(), &network(), &layout),
            Err(ReadError::IndexOutOfRange { index: 2, len: 1, .. })
        ));
        assert!(matches!(
            read_optimizer_output("y_hat.1.3\n1.0\n".as_bytes(), &network(), &layout),
            Err(ReadError::IndexOutOfRange { index: 3, len: 2, .. })
        ));
        assert!(matches!(
            read_optimizer_output(
                "y_hat.18446744073709551615.1\n1.0\n".as_bytes(),
                &network(),
                &layout
            ),
            Err(ReadError::IndexOutOfRange { index: usize::MAX, len: 1, .. })
        ));
        assert!(matches!(
            read_optimizer_output("y_hat.100000000.1,p.1\n1.0,0.2\n".as_bytes(), &network(), &layout),
            Err(ReadError::IndexOutOfRange { index: 100000000, len: 2, .. })
        ));
        assert!(matches!(
            read_optimizer_output("p.1\nnan-ish\n".as_bytes(), &network(), &layout),
            Err(ReadError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_load_network() {
        let path = std::env::temp_dir().join("kinetics_codegen_io_test.json");
        fs::write(&path, serde_json::to_string(&network()).unwrap()).unwrap();
        let loaded = load_network(&path).unwrap();
        assert_eq!(loaded, network());
        let _ = fs::remove_file(&path);
    }
}
