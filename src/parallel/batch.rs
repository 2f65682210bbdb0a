//! Batch distribution for parallel task execution.
//!
//! The distributed pool hands each worker process one contiguous batch of task
//! indices; this module computes batch boundaries and the effective worker count.

use super::error::DistributeError;

/// Split `total` items into up to `num_batches` ranges `[start, end)`.
/// Batches are as equal in size as possible; later batches may be smaller.
///
/// # Example
/// ```
/// # use scalebench::parallel::batch_ranges;
/// let ranges = batch_ranges(100, 4);
/// assert_eq!(ranges, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
/// ```
pub fn batch_ranges(total: usize, num_batches: usize) -> Vec<(usize, usize)> {
    if total == 0 || num_batches == 0 {
        return Vec::new();
    }
    let num_batches = num_batches.min(total);
    let base = total / num_batches;
    let remainder = total % num_batches;
    let mut ranges = Vec::with_capacity(num_batches);
    let mut start = 0;
    for i in 0..num_batches {
        let size = base + if i < remainder { 1 } else { 0 };
        let end = start + size;
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// Number of workers actually started for `tasks` inputs.
///
/// Never more workers than tasks: an idle worker under a message-passing
/// runtime can keep the whole batch from terminating.
pub fn effective_workers(requested: usize, tasks: usize) -> Result<usize, DistributeError> {
    if tasks == 0 {
        return Err(DistributeError::NoTasks);
    }
    if requested == 0 {
        return Err(DistributeError::InvalidWorkerCount);
    }
    Ok(requested.min(tasks))
}
