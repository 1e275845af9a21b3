use futures::{Future, IntoFuture, Poll};
use futures::future;

use errors::{Error, ErrorKind};

/// A boxed future with erased type, the currency of every async operation in
/// this crate.
pub struct StaticBoxFuture<T = (), E = Error>(Box<Future<Item = T, Error = E> + 'static>)
    where T: 'static,
          E: 'static;

impl<T, E> StaticBoxFuture<T, E> {
    pub fn new<F>(inner: F) -> Self
        where F: IntoFuture<Item = T, Error = E> + 'static,
              F::Future: 'static
    {
        StaticBoxFuture(Box::new(inner.into_future()))
    }

    pub fn ok(item: T) -> Self {
        StaticBoxFuture(Box::new(future::ok(item)))
    }

    pub fn err(err: E) -> Self {
        StaticBoxFuture(Box::new(future::err(err)))
    }
}

impl<T, E> From<ErrorKind> for StaticBoxFuture<T, E>
    where E: From<ErrorKind>
{
    fn from(err: ErrorKind) -> Self {
        Self::err(err.into())
    }
}

impl<T, E> Future for StaticBoxFuture<T, E> {
    type Item = T;
    type Error = E;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        self.0.poll()
    }
}

pub trait ToStaticBoxFuture<T, E> {
    fn static_boxed(self) -> StaticBoxFuture<T, E>;
}

impl<F, T, E> ToStaticBoxFuture<T, E> for F
    where F: IntoFuture<Item = T, Error = E> + 'static,
          F::Future: 'static,
          T: 'static,
          E: 'static
{
    fn static_boxed(self) -> StaticBoxFuture<T, E> {
        StaticBoxFuture::new(self)
    }
}
