use crate::error::ScanError;
use crate::types::BlockRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Split `total` into consecutive sub-ranges of at most `step` blocks.
///
/// The sub-ranges are gap-free, non-overlapping and cover `total` exactly.
/// The last chunk is clipped to `total.end` (ascending) or `total.start`
/// (descending). The returned iterator is lazy and can be cloned to restart.
pub fn chunks(total: BlockRange, step: u64, direction: Direction) -> Result<Chunks, ScanError> {
    if step == 0 {
        return Err(ScanError::invalid("chunk size must be greater than zero"));
    }

    let cursor = match direction {
        Direction::Ascending => total.start,
        Direction::Descending => total.end,
    };

    Ok(Chunks {
        total,
        step,
        direction,
        cursor: Some(cursor),
    })
}

#[derive(Debug, Clone)]
pub struct Chunks {
    total: BlockRange,
    step: u64,
    direction: Direction,
    cursor: Option<u64>,
}

impl Iterator for Chunks {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor?;
        let span = self.step - 1;

        let chunk = match self.direction {
            Direction::Ascending => {
                let end = cursor.saturating_add(span).min(self.total.end);
                self.cursor = (end < self.total.end).then(|| end + 1);
                BlockRange { start: cursor, end }
            }
            Direction::Descending => {
                let start = cursor.saturating_sub(span).max(self.total.start);
                self.cursor = (start > self.total.start).then(|| start - 1);
                BlockRange { start, end: cursor }
            }
        };

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let Some(cursor) = self.cursor else {
            return (0, Some(0));
        };
        let remaining = match self.direction {
            Direction::Ascending => self.total.end - cursor,
            Direction::Descending => cursor - self.total.start,
        };
        let count = remaining / self.step + 1;
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        (count, Some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> BlockRange {
        BlockRange::new(start, end).unwrap()
    }

    fn collect(total: BlockRange, step: u64, direction: Direction) -> Vec<(u64, u64)> {
        chunks(total, step, direction)
            .unwrap()
            .map(|r| (r.start, r.end))
            .collect()
    }

    #[test]
    fn test_ascending_chunks() {
        assert_eq!(
            collect(range(0, 100), 30, Direction::Ascending),
            vec![(0, 29), (30, 59), (60, 89), (90, 100)]
        );
        assert_eq!(
            collect(range(0, 10), 100, Direction::Ascending),
            vec![(0, 10)]
        );
        assert_eq!(
            collect(range(50, 50), 10, Direction::Ascending),
            vec![(50, 50)]
        );
    }

    #[test]
    fn test_descending_chunks() {
        assert_eq!(
            collect(range(0, 100), 30, Direction::Descending),
            vec![(71, 100), (41, 70), (11, 40), (0, 10)]
        );
        assert_eq!(
            collect(range(5774644, 13860522), 5_000_000, Direction::Descending),
            vec![(8860523, 13860522), (5774644, 8860522)]
        );
    }

    #[test]
    fn test_zero_step_is_rejected() {
        assert!(matches!(
            chunks(range(0, 10), 0, Direction::Ascending),
            Err(ScanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_chunks_cover_total_exactly() {
        for start in [0u64, 1, 7, 13860522] {
            for len in [0u64, 1, 2, 9, 10, 11, 99, 250] {
                let total = range(start, start + len);
                for step in [1u64, 2, 3, 10, 64, 1000] {
                    for direction in [Direction::Ascending, Direction::Descending] {
                        let mut parts: Vec<BlockRange> =
                            chunks(total, step, direction).unwrap().collect();
                        assert!(parts.iter().all(|p| p.start <= p.end && p.width() <= step));

                        if direction == Direction::Descending {
                            parts.reverse();
                        }
                        assert_eq!(parts.first().unwrap().start, total.start);
                        assert_eq!(parts.last().unwrap().end, total.end);
                        for pair in parts.windows(2) {
                            assert_eq!(pair[0].end + 1, pair[1].start);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_chunks_at_u64_boundaries() {
        let parts = collect(range(u64::MAX - 5, u64::MAX), 4, Direction::Ascending);
        assert_eq!(
            parts,
            vec![(u64::MAX - 5, u64::MAX - 2), (u64::MAX - 1, u64::MAX)]
        );

        let parts = collect(range(0, 5), 4, Direction::Descending);
        assert_eq!(parts, vec![(2, 5), (0, 1)]);
    }

    #[test]
    fn test_size_hint_matches_count() {
        let iter = chunks(range(0, 100), 30, Direction::Ascending).unwrap();
        assert_eq!(iter.size_hint(), (4, Some(4)));
        assert_eq!(iter.count(), 4);

        let iter = chunks(range(0, 100), 30, Direction::Descending).unwrap();
        assert_eq!(iter.size_hint(), (4, Some(4)));
    }
}
