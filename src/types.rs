use std::sync::Arc;

/// Borrowed evaluation context of a compiled function.
///
/// Holds the live values for every kind of slot an expression can be bound to:
/// - `t`: the time point
/// - `y`: the state vector (species values, in species order)
/// - `p`: the fit vector (parameters designated "to estimate")
/// - `x_r`: the tunable-input vector (parameters designated "tunable")
///
/// Vectors that a function does not use may be left empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inputs<'a> {
    pub t: f64,
    pub y: &'a [f64],
    pub p: &'a [f64],
    pub x_r: &'a [f64],
}

impl<'a> Inputs<'a> {
    /// Creates an evaluation context holding only a state vector, at `t = 0`.
    pub fn state(y: &'a [f64]) -> Self {
        Self {
            t: 0.0,
            y,
            p: &[],
            x_r: &[],
        }
    }

    /// Sets the time point.
    pub fn at(mut self, t: f64) -> Self {
        self.t = t;
        self
    }

    /// Sets the fit vector.
    pub fn with_params(mut self, p: &'a [f64]) -> Self {
        self.p = p;
        self
    }

    /// Sets the tunable-input vector.
    pub fn with_tunables(mut self, x_r: &'a [f64]) -> Self {
        self.x_r = x_r;
        self
    }
}

/// Type alias for a compiled function that evaluates a single expression.
///
/// This represents a function that:
/// - Takes the evaluation context holding time, state and parameter vectors
/// - Returns a single f64 result from evaluating the expression
/// - Is both Send and Sync for thread safety
pub type RateFunction = Arc<dyn Fn(&Inputs) -> f64 + Send + Sync>;

/// Type alias for a compiled function that evaluates multiple expressions at once.
///
/// This represents a function that:
/// - Takes the evaluation context
/// - Takes a mutable slice to store the results
/// - Evaluates every expression and writes results into the output slice in order
pub type CombinedFunction = Arc<dyn Fn(&Inputs, &mut [f64]) + Send + Sync>;

/// Type alias for a compiled function that evaluates multiple expressions into a matrix.
///
/// Each inner vector of the output represents a row of the result matrix.
pub type MatrixFunction = Arc<dyn Fn(&Inputs, &mut [Vec<f64>]) + Send + Sync>;
