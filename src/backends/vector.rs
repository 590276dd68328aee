use std::borrow::Cow;

/// A trait for vector-like types that can carry a state or rate vector.
///
/// This trait provides a common interface for different vector implementations,
/// allowing states to be passed to compiled models and results to be returned in
/// the caller's own vector type.
///
/// # Examples
///
/// ```rust
/// use kinetics_codegen::prelude::Vector;
///
/// let state: Vec<f64> = Vector::from_values(vec![4.0, 0.0]);
/// assert_eq!(state.values().as_ref(), &[4.0, 0.0]);
/// assert_eq!(Vector::len(&state), 2);
/// ```
pub trait Vector: Sized {
    /// Returns the vector's data as a contiguous slice, copying only if the
    /// underlying storage is not contiguous.
    fn values(&self) -> Cow<'_, [f64]>;

    /// Creates a vector holding `values`.
    fn from_values(values: Vec<f64>) -> Self;

    /// Returns the length of the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Vector for Vec<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }

    fn from_values(values: Vec<f64>) -> Self {
        values
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Implementation of Vector trait for ndarray's Array1<f64>.
///
/// ```rust
/// use kinetics_codegen::prelude::Vector;
/// use ndarray::Array1;
///
/// let v: Array1<f64> = Vector::from_values(vec![1.0, 2.0, 3.0]);
/// assert_eq!(v[2], 3.0);
/// ```
#[cfg(feature = "ndarray")]
impl Vector for ndarray::Array1<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        match self.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(self.to_vec()),
        }
    }

    fn from_values(values: Vec<f64>) -> Self {
        ndarray::Array1::from_vec(values)
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Implementation of Vector trait for nalgebra's DVector<f64>.
///
/// ```rust
/// use kinetics_codegen::prelude::Vector;
/// use nalgebra::DVector;
///
/// let v: DVector<f64> = Vector::from_values(vec![1.0, 2.0, 3.0]);
/// assert_eq!(v[2], 3.0);
/// ```
#[cfg(feature = "nalgebra")]
impl Vector for nalgebra::DVector<f64> {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self.as_slice())
    }

    fn from_values(values: Vec<f64>) -> Self {
        nalgebra::DVector::from_vec(values)
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Implementation of Vector trait for fixed-size arrays.
///
/// Missing values are zero-filled and surplus values are dropped.
impl<const N: usize> Vector for [f64; N] {
    fn values(&self) -> Cow<'_, [f64]> {
        Cow::Borrowed(self)
    }

    fn from_values(values: Vec<f64>) -> Self {
        let mut array = [0.0; N];
        for (slot, value) in array.iter_mut().zip(values) {
            *slot = value;
        }
        array
    }

    fn len(&self) -> usize {
        N
    }
}
