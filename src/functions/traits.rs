use ndarray::Array2;
use std::fmt;

/// Pure operator kernel. Arguments arrive in push order and share one `[batch, time]` shape.
pub type OperatorFn = fn(&[&Array2<f64>]) -> Array2<f64>;

/// One row of the operator table: `(name, arity, function pointer)`.
#[derive(Clone, Copy)]
pub struct OperatorSpec {
    /// Alias used in formula text and decoded strings
    pub name: &'static str,
    pub arity: usize,
    pub func: OperatorFn,
}

impl OperatorSpec {
    pub const fn new(name: &'static str, arity: usize, func: OperatorFn) -> Self {
        Self { name, arity, func }
    }

    /// Run the kernel. Callers guarantee `args.len() == self.arity`.
    pub fn apply(&self, args: &[&Array2<f64>]) -> Array2<f64> {
        (self.func)(args)
    }
}

impl fmt::Debug for OperatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
