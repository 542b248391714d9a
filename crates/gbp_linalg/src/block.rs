//! Helpers for working with the block structure of joint information vectors
//! and precision matrices, where consecutive blocks belong to different
//! variables.

use crate::{Float, Vector};

/// Utility function to create `start..start + n`
/// Similar to `Eigen::seqN`
#[inline]
pub const fn seq_n(start: usize, n: usize) -> std::ops::Range<usize> {
    start..start + n
}

/// Concatenate a sequence of vectors into one
pub fn concatenate<'a, I>(vectors: I) -> Vector<Float>
where
    I: IntoIterator<Item = &'a Vector<Float>>,
{
    vectors
        .into_iter()
        .flat_map(|vector| vector.iter().copied())
        .collect()
}

/// Offsets and sizes of the blocks in a block vector/matrix.
///
/// ```
/// use gbp_linalg::block::BlockLayout;
/// let layout = BlockLayout::new(&[2, 1, 3]);
/// assert_eq!(layout.total(), 6);
/// assert_eq!(layout.offset(2), 3);
/// assert_eq!(layout.range(1), 2..3);
/// assert_eq!(layout.indices_except(1), vec![0, 1, 3, 4, 5]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    offsets: Vec<usize>,
    sizes:   Vec<usize>,
}

impl BlockLayout {
    pub fn new(sizes: &[usize]) -> Self {
        let offsets = sizes
            .iter()
            .scan(0, |acc, &size| {
                let offset = *acc;
                *acc += size;
                Some(offset)
            })
            .collect();
        Self {
            offsets,
            sizes: sizes.to_vec(),
        }
    }

    /// Number of blocks
    #[inline]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Sum of all block sizes
    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }

    #[inline]
    pub fn offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    #[inline]
    pub fn size(&self, block: usize) -> usize {
        self.sizes[block]
    }

    #[inline]
    pub fn range(&self, block: usize) -> std::ops::Range<usize> {
        seq_n(self.offsets[block], self.sizes[block])
    }

    /// Every scalar index that does not belong to `block`, in ascending order
    pub fn indices_except(&self, block: usize) -> Vec<usize> {
        let excluded = self.range(block);
        (0..self.total())
            .filter(|i| !excluded.contains(i))
            .collect()
    }
}
