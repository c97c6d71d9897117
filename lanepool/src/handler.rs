//! Processor and supplier traits - the user code a pool drives.

use std::future::Future;
use std::marker::PhantomData;

use crate::lane::LaneId;

/// Processes one item on behalf of a lane.
#[async_trait::async_trait]
pub trait Processor<T>: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: std::fmt::Display + Send + 'static;

    async fn process(&self, item: T, lane: LaneId) -> Result<Self::Output, Self::Error>;
}

/// Hands out the next item for a self-service lane.
///
/// `Ok(None)` tells the asking lane to stop.
#[async_trait::async_trait]
pub trait Supplier<T>: Send + Sync + 'static {
    type Error: std::fmt::Display + Send + 'static;

    async fn next(&self, lane: LaneId) -> Result<Option<T>, Self::Error>;
}

/// [`Processor`] backed by an async closure. Built with [`processor_fn`].
pub struct ProcessorFn<F, T> {
    f: F,
    _item: PhantomData<fn(T)>,
}

/// Adapt `|item, lane| async { ... }` into a [`Processor`].
pub fn processor_fn<T, F, Fut, R, E>(f: F) -> ProcessorFn<F, T>
where
    F: Fn(T, LaneId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    ProcessorFn {
        f,
        _item: PhantomData,
    }
}

#[async_trait::async_trait]
impl<T, F, Fut, R, E> Processor<T> for ProcessorFn<F, T>
where
    T: Send + 'static,
    F: Fn(T, LaneId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Output = R;
    type Error = E;

    async fn process(&self, item: T, lane: LaneId) -> Result<R, E> {
        (self.f)(item, lane).await
    }
}

/// [`Supplier`] backed by an async closure. Built with [`supplier_fn`].
pub struct SupplierFn<F, T> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

/// Adapt `|lane| async { ... }` into a [`Supplier`].
pub fn supplier_fn<T, F, Fut, E>(f: F) -> SupplierFn<F, T>
where
    F: Fn(LaneId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
{
    SupplierFn {
        f,
        _item: PhantomData,
    }
}

#[async_trait::async_trait]
impl<T, F, Fut, E> Supplier<T> for SupplierFn<F, T>
where
    T: Send + 'static,
    F: Fn(LaneId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Error = E;

    async fn next(&self, lane: LaneId) -> Result<Option<T>, E> {
        (self.f)(lane).await
    }
}
