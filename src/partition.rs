//! Batch partitioning.

use crate::types::BatchRequest;

/// Hard limit imposed by the remote batch endpoint.
pub const MAX_BATCH_SIZE: usize = 20;

/// Split an ordered request list into order-preserving groups of at most
/// [`MAX_BATCH_SIZE`], covering every request exactly once.
///
/// Callers reject empty input before partitioning; an empty slice here simply
/// yields no groups.
pub(crate) fn partition(requests: &[BatchRequest]) -> impl Iterator<Item = &[BatchRequest]> {
    requests.chunks(MAX_BATCH_SIZE)
}
