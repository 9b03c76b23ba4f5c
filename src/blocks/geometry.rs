//! Interval and row-set relations between blocks

use crate::blocks::{Block, RowSet};
use crate::msa::ColumnRange;

/// Rows shared by both blocks, possibly empty.
#[inline]
pub fn rows_intersect(b1: &Block, b2: &Block) -> RowSet {
    b1.rows().intersection(b2.rows())
}

/// The shared column interval, `None` if the ranges are disjoint.
#[inline]
pub fn cols_overlap(b1: &Block, b2: &Block) -> Option<ColumnRange> {
    b1.range().intersect(&b2.range())
}

/// `b2` starts right after `b1` ends.
#[inline]
pub fn is_consecutive(b1: &Block, b2: &Block) -> bool {
    b1.end() + 1 == b2.start()
}

/// `b1` covers every cell of `b2`.
#[inline]
pub fn contains(b1: &Block, b2: &Block) -> bool {
    b1.range().contains_range(&b2.range()) && b2.rows().is_subset(b1.rows())
}

/// Both blocks share at least one cell.
pub fn intersects(b1: &Block, b2: &Block) -> bool {
    cols_overlap(b1, b2).is_some() && !b1.rows().is_disjoint(b2.rows())
}

/// Restrict a block to a column range, `None` if nothing is left.
pub fn clip(block: &Block, range: &ColumnRange) -> Option<Block> {
    let clipped = block.range().intersect(range)?;
    if clipped == block.range() {
        return Some(block.clone());
    }

    block.with_range(clipped.start, clipped.end).ok()
}

/// Iterate over all `(row, col)` cells of a block.
pub fn cells(block: &Block) -> impl Iterator<Item=(usize, usize)> + '_ {
    block.rows().iter()
        .flat_map(move |r| block.range().columns().map(move |c| (r, c)))
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;

    use super::*;
    use crate::blocks::block;

    #[test]
    fn test_overlap_and_rows() {
        let b1 = block(&[0, 1, 2], 0, 3);
        let b2 = block(&[1, 2, 3], 2, 5);

        assert_eq!(rows_intersect(&b1, &b2), RowSet::new([1, 2]));
        assert_eq!(cols_overlap(&b1, &b2), Some(ColumnRange::new(2, 3)));
        assert!(intersects(&b1, &b2));

        let b3 = block(&[0], 4, 5);
        assert_eq!(cols_overlap(&b1, &b3), None);
        assert!(is_consecutive(&b1, &b3));
        assert!(!is_consecutive(&b3, &b1));

        // column overlap alone is not enough
        let b4 = block(&[3], 0, 1);
        assert!(!intersects(&b1, &b4));
    }

    #[test]
    fn test_contains() {
        let outer = block(&[0, 1, 2], 0, 5);
        assert!(contains(&outer, &block(&[1], 2, 3)));
        assert!(contains(&outer, &outer));
        assert!(!contains(&outer, &block(&[3], 2, 3)));
        assert!(!contains(&outer, &block(&[1], 4, 6)));
    }

    #[test]
    fn test_clip_and_cells() {
        let b = block(&[0, 2], 1, 4);
        assert_eq!(clip(&b, &ColumnRange::new(3, 9)), Some(block(&[0, 2], 3, 4)));
        assert_eq!(clip(&b, &ColumnRange::new(5, 9)), None);

        let cells: FxHashSet<_> = cells(&b).collect();
        assert_eq!(cells.len(), b.area());
        assert!(cells.contains(&(2, 4)));
        assert!(!cells.contains(&(1, 1)));
    }
}
