/// A trait describing how a pool element is built.
///
/// This is the pool's equivalent of forwarding constructor arguments: the
/// implementor captures whatever it needs and produces a `T` on demand, or
/// fails with its own error. [`crate::Pool::emplace`] runs it at most once,
/// and only after a free slot has been confirmed.
///
/// Any `FnOnce() -> Result<T, E>` closure is a constructor:
///
/// ```
/// use fixpool::{Pool, PoolError};
///
/// let pool = Pool::<u16>::new(1);
/// let err = pool.emplace(|| "70000".parse::<u16>()).unwrap_err();
/// assert!(matches!(err, PoolError::ConstructionFailed(_)));
/// assert_eq!(pool.available(), 1);
/// ```
pub trait Construct<T> {
    /// Error reported when construction fails.
    type Error;

    /// Builds the element.
    fn construct(self) -> Result<T, Self::Error>;
}

impl<T, E, F> Construct<T> for F
where
    F: FnOnce() -> Result<T, E>,
{
    type Error = E;

    #[inline(always)]
    fn construct(self) -> Result<T, E> {
        self()
    }
}
