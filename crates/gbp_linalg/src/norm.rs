//! Norms of vectors and vector views.

use ndarray::{ArrayBase, Data, Ix1};

use crate::GbpFloat;

pub trait VectorNorm {
    type Scalar: GbpFloat;

    /// `√(Σ xᵢ²)`, `0` for an empty vector
    fn euclidean_norm(&self) -> Self::Scalar;
}

impl<A, S> VectorNorm for ArrayBase<S, Ix1>
where
    A: GbpFloat,
    S: Data<Elem = A>,
{
    type Scalar = A;

    fn euclidean_norm(&self) -> A {
        self.fold(A::zero(), |acc, &x| acc + x * x).sqrt()
    }
}
