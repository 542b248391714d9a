//! Linear algebra on top of ndarray, used throughout the gaussian belief
//! propagation crates: type aliases, norms, checked inverses, block layouts
//! and pretty printing.

pub mod block;
pub mod matrix;
pub mod norm;
pub mod pretty_print;

pub use ndarray::{array, s, Axis};

pub mod prelude {
    pub use super::{
        block::{concatenate, seq_n, BlockLayout},
        matrix::MatrixExt,
        norm::VectorNorm,
        pretty_print::{PrettyFormatMatrix, PrettyFormatVector},
        Float, GbpFloat, Matrix, MatrixView, Vector, VectorView,
    };
}

/// Element type of the vectors and matrices.
/// `std::iter::Sum` is needed by `ndarray_inverse::Inverse`.
pub trait GbpFloat: ndarray::NdFloat + std::iter::Sum {}

impl<T: ndarray::NdFloat + std::iter::Sum> GbpFloat for T {}

/// Every computation in the solver is done in double precision
pub type Float = f64;

pub type Vector<T> = ndarray::Array1<T>;
pub type Matrix<T> = ndarray::Array2<T>;
pub type VectorView<'a, T> = ndarray::ArrayView1<'a, T>;
pub type MatrixView<'a, T> = ndarray::ArrayView2<'a, T>;
