use core::convert::Infallible;
use thiserror::Error;

/// Errors reported by [`crate::Pool`] operations.
///
/// `E` is the error type of the element constructor; it is [`Infallible`]
/// for operations that cannot fail during construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError<E = Infallible> {
    /// Every slot already holds a live value.
    #[error("pool exhausted: all {capacity} slots are occupied")]
    Exhausted {
        /// Capacity of the pool that rejected the request.
        capacity: usize,
    },
    /// The element constructor failed; the pool is unchanged.
    #[error("element construction failed: {0}")]
    ConstructionFailed(E),
    /// The handle does not denote a live value of this pool.
    #[error("object does not belong to this pool")]
    ForeignObject,
}
