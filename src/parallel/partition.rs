//! Work partitioning over flat item indices `[0, item_count)`.
//!
//! Two policies:
//! - **Static**: worker `k` gets `[k * chunk, (k + 1) * chunk)` with `chunk = items / workers`;
//!   the last worker absorbs the remainder. Assignment is a pure function of
//!   `(item_count, worker_count)`.
//! - **Dynamic**: workers claim one index at a time from a shared [`DynamicCursor`] via atomic
//!   fetch-and-add, stopping at the first claim `>= item_count`.
//!
//! Both produce pairwise-disjoint assignments whose union is exactly `[0, item_count)`.
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::error::{ParconvError, ParconvResult};

/// Half-open index range handed to exactly one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionRange {
    /// Inclusive start.
    pub start: u32,
    /// Exclusive end.
    pub end: u32,
}

impl PartitionRange {
    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }

    pub fn indices(self) -> Range<u32> {
        self.start..self.end
    }
}

/// Static chunking of `item_count` items over `worker_count` workers.
///
/// Returns one range per worker (some may be empty when `worker_count > item_count`), or no
/// ranges at all when `item_count == 0`.
pub fn static_ranges(item_count: u32, worker_count: u32) -> ParconvResult<Vec<PartitionRange>> {
    validate_workers(worker_count)?;
    if item_count == 0 {
        return Ok(Vec::new());
    }

    let chunk = item_count / worker_count;
    Ok((0..worker_count)
        .map(|k| {
            let start = k * chunk;
            let end = if k == worker_count - 1 {
                item_count
            } else {
                start + chunk
            };
            PartitionRange { start, end }
        })
        .collect())
}

pub(crate) fn validate_workers(worker_count: u32) -> ParconvResult<()> {
    if worker_count == 0 {
        return Err(ParconvError::invalid_configuration(
            "worker count must be >= 1",
        ));
    }
    Ok(())
}

/// Shared claim counter for dynamic partitioning.
///
/// Lives for one stage. The counter is 64-bit so that the overshoot from every worker's final
/// failed claim can never wrap back into the valid range.
#[derive(Debug)]
pub struct DynamicCursor {
    next: AtomicU64,
    item_count: u32,
}

impl DynamicCursor {
    pub fn new(item_count: u32) -> Self {
        Self {
            next: AtomicU64::new(0),
            item_count,
        }
    }

    /// Claim the next unclaimed index, or `None` once every index has been handed out.
    #[inline]
    pub fn claim(&self) -> Option<u32> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed);
        (idx < u64::from(self.item_count)).then_some(idx as u32)
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }
}

/// Which partitioning policy a [`WorkPartitioner`] applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionPolicy {
    Static,
    Dynamic,
}

/// Per-stage work assignment for a fixed worker count.
#[derive(Debug)]
pub enum WorkPartitioner {
    Static {
        ranges: Vec<PartitionRange>,
        worker_count: u32,
    },
    Dynamic {
        cursor: DynamicCursor,
        worker_count: u32,
    },
}

impl WorkPartitioner {
    pub fn new(policy: PartitionPolicy, item_count: u32, worker_count: u32) -> ParconvResult<Self> {
        validate_workers(worker_count)?;
        Ok(match policy {
            PartitionPolicy::Static => Self::Static {
                ranges: static_ranges(item_count, worker_count)?,
                worker_count,
            },
            PartitionPolicy::Dynamic => Self::Dynamic {
                cursor: DynamicCursor::new(item_count),
                worker_count,
            },
        })
    }

    pub fn worker_count(&self) -> u32 {
        match self {
            Self::Static { worker_count, .. } | Self::Dynamic { worker_count, .. } => {
                *worker_count
            }
        }
    }

    /// Indices worker `worker` should process. Static assignments are fixed up front; dynamic
    /// ones are claimed lazily as the iterator advances.
    pub fn assignment(&self, worker: u32) -> Assignment<'_> {
        match self {
            Self::Static { ranges, .. } => Assignment::Range(
                ranges
                    .get(worker as usize)
                    .map_or(0..0, |r| r.indices()),
            ),
            Self::Dynamic { cursor, .. } => Assignment::Claims(cursor),
        }
    }
}

/// Iterator over the indices owned by one worker.
#[derive(Debug)]
pub enum Assignment<'a> {
    Range(Range<u32>),
    Claims(&'a DynamicCursor),
}

impl Iterator for Assignment<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        match self {
            Self::Range(r) => r.next(),
            Self::Claims(cursor) => cursor.claim(),
        }
    }
}
