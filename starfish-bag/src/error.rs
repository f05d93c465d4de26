use thiserror::Error;

use crate::data_structures::WorkerId;

/// Result alias for bag operations that validate their arguments.
pub type BagResult<T> = Result<T, BagError>;

/// Errors reported synchronously by the bag.
///
/// Lost steal races are never surfaced here; they are resolved internally by
/// retrying the scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BagError {
    #[error("start index {index} is out of range for a destination of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("destination has room for {available} items but {required} are required")]
    DestinationTooSmall { required: usize, available: usize },

    #[error("worker {0} already owns a live handle on this bag")]
    WorkerInUse(WorkerId),
}
