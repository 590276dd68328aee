/// A trait for matrix-like types that can receive a Jacobian or stoichiometry matrix.
///
/// This trait provides a common interface for different matrix implementations,
/// so compiled matrices can be produced directly in the caller's preferred type.
/// Elements are addressed by (row, column), independent of the storage order of
/// the implementation.
///
/// # Examples
///
/// ```rust
/// use kinetics_codegen::prelude::Matrix;
///
/// let mut mat: Vec<Vec<f64>> = Matrix::zeros(2, 3);
/// mat.set(1, 2, 5.0);
/// assert_eq!(mat.dims(), (2, 3));
/// assert_eq!(mat.at(1, 2), 5.0);
/// ```
pub trait Matrix {
    /// Creates a new matrix of the specified dimensions filled with zeros.
    fn zeros(rows: usize, cols: usize) -> Self;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Reads element (row, col).
    fn at(&self, row: usize, col: usize) -> f64;

    /// Writes element (row, col).
    fn set(&mut self, row: usize, col: usize, value: f64);
}

/// Row-major nested vectors; every row has the same length.
impl Matrix for Vec<Vec<f64>> {
    fn zeros(rows: usize, cols: usize) -> Self {
        vec![vec![0.0; cols]; rows]
    }

    fn dims(&self) -> (usize, usize) {
        (self.len(), self.first().map_or(0, Vec::len))
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self[row][col]
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self[row][col] = value;
    }
}

/// Implementation of Matrix trait for ndarray's Array2<f64>.
///
/// ```rust
/// use kinetics_codegen::prelude::Matrix;
/// use ndarray::Array2;
///
/// let mut mat: Array2<f64> = Matrix::zeros(2, 2);
/// mat.set(0, 1, 1.0);
/// assert_eq!(mat[[0, 1]], 1.0);
/// ```
#[cfg(feature = "ndarray")]
impl Matrix for ndarray::Array2<f64> {
    fn zeros(rows: usize, cols: usize) -> Self {
        ndarray::Array2::zeros((rows, cols))
    }

    fn dims(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self[[row, col]]
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self[[row, col]] = value;
    }
}

/// Implementation of Matrix trait for nalgebra's DMatrix<f64>.
///
/// nalgebra stores matrices column-major; elements are still addressed by (row, col).
///
/// ```rust
/// use kinetics_codegen::prelude::Matrix;
/// use nalgebra::DMatrix;
///
/// let mut mat: DMatrix<f64> = Matrix::zeros(2, 2);
/// mat.set(0, 1, 1.0);
/// assert_eq!(mat[(0, 1)], 1.0);
/// ```
#[cfg(feature = "nalgebra")]
impl Matrix for nalgebra::DMatrix<f64> {
    fn zeros(rows: usize, cols: usize) -> Self {
        nalgebra::DMatrix::zeros(rows, cols)
    }

    fn dims(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self[(row, col)]
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self[(row, col)] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_vec_matrix() {
        let mut mat: Vec<Vec<f64>> = Matrix::zeros(2, 3);
        assert_eq!(mat.dims(), (2, 3));
        mat.set(0, 2, 3.0);
        mat.set(1, 0, -1.0);
        assert_eq!(mat, vec![vec![0.0, 0.0, 3.0], vec![-1.0, 0.0, 0.0]]);
        assert_eq!(Vec::<Vec<f64>>::zeros(0, 0).dims(), (0, 0));
    }

    #[cfg(all(feature = "ndarray", feature = "nalgebra"))]
    #[test]
    fn test_backends_agree_on_layout() {
        let mut ndarray_mat: ndarray::Array2<f64> = Matrix::zeros(2, 3);
        let mut nalgebra_mat: nalgebra::DMatrix<f64> = Matrix::zeros(2, 3);

        for row in 0..2 {
            for col in 0..3 {
                let value = (row * 3 + col) as f64;
                ndarray_mat.set(row, col, value);
                nalgebra_mat.set(row, col, value);
            }
        }

        for row in 0..2 {
            for col in 0..3 {
                assert_eq!(ndarray_mat.at(row, col), nalgebra_mat.at(row, col));
            }
        }
        assert_eq!(nalgebra_mat.at(1, 0), 3.0);
    }
}
