use std::fmt;

/// Identity of a worker as assigned by the surrounding runtime, e.g. a thread
/// pool slot index or a reactor index.
///
/// A bag keys its per-worker lists by this id. Two live
/// [`BagWorker`](super::BagWorker) handles can never share an id.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub const fn new(index: usize) -> Self {
        WorkerId(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for WorkerId {
    fn from(index: usize) -> Self {
        WorkerId(index)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
