//! The application boundary.
//!
//! An application implements [`Handler`], or wraps a closure with [`make_handler`]. The
//! handler drives one request through the [`HttpContext`]: it reads the request, writes the
//! response and returns. Whatever is left unfinished (an unsent head, an unread body, a
//! pending chunk terminator) is completed by the engine afterwards.

use futures::future::BoxFuture;

use crate::connection::HttpContext;
use crate::protocol::BoxError;

#[trait_variant::make(Handler: Send)]
pub trait LocalHandler {
    type Error: Into<BoxError>;

    async fn call(&self, ctx: &mut HttpContext<'_>) -> Result<(), Self::Error>;
}

/// A [`Handler`] made from a closure returning a boxed future.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Err> Handler for HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut HttpContext<'b>) -> BoxFuture<'a, Result<(), Err>> + Send + Sync,
    Err: Into<BoxError>,
{
    type Error = Err;

    fn call(&self, ctx: &mut HttpContext<'_>) -> impl Future<Output = Result<(), Self::Error>> + Send {
        (self.f)(ctx)
    }
}

/// Wraps `f` into a [`Handler`].
///
/// ```no_run
/// use futures::FutureExt;
/// use micro_engine::handler::make_handler;
/// use micro_engine::protocol::BoxError;
///
/// let handler = make_handler(|ctx| {
///     async move {
///         ctx.write(b"Hello World!").await?;
///         Ok::<_, BoxError>(())
///     }
///     .boxed()
/// });
/// ```
pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: for<'a, 'b> Fn(&'a mut HttpContext<'b>) -> BoxFuture<'a, Result<(), Err>>,
    Err: Into<BoxError>,
{
    HandlerFn { f }
}
