//! Stable indices of the nodes in a factorgraph.
//! Nodes are never removed, so an index stays valid for the lifetime of the
//! graph.

/// Index of a variable node, in insertion order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[display(fmt = "v{}", _0)]
pub struct VariableIndex(pub usize);

/// Index of a factor node, in insertion order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[display(fmt = "f{}", _0)]
pub struct FactorIndex(pub usize);

impl VariableIndex {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl FactorIndex {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}
