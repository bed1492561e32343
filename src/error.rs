use thiserror::Error;

/// Errors returned by the fallible helpers of this crate.
///
/// The map itself never fails: a missing key is reported as `None`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `put` was called after the buffer was closed.
    #[error("put called on closed unbounded buffer")]
    BufferClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
