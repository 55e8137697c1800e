use crate::Context;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

pin_project! {
    /// A future or stream that has an associated context.
    #[derive(Clone, Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        otel_cx: Context,
    }
}

impl<T: std::future::Future> std::future::Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.otel_cx.clone().attach();

        let poll = this.inner.poll(task_cx);
        // keep baggage set during this poll for the next one
        *this.otel_cx = Context::current();
        poll
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _guard = this.otel_cx.clone().attach();

        let poll = T::poll_next(this.inner, task_cx);
        *this.otel_cx = Context::current();
        poll
    }
}

impl<F: std::future::Future> FutureContextExt for F {}

/// Extension trait allowing futures to run with an attached [`Context`].
///
/// ```
/// use scopetel::{Context, FutureContextExt};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cx = Context::new().with_baggage([("user.id", "42")]);
/// let seen = async { Context::get_baggage("user.id") }
///     .with_context(cx)
///     .await;
/// assert_eq!(seen.as_deref(), Some("42"));
/// # }
/// ```
pub trait FutureContextExt: Sized {
    /// Attaches the provided [`Context`] to this future, returning a `WithContext`
    /// wrapper.
    ///
    /// The attached context will be set as current while this future is being
    /// polled. Baggage set through [`Context::set_baggage`] inside the future
    /// persists across polls.
    fn with_context(self, otel_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            otel_cx,
        }
    }

    /// Attaches the current [`Context`] to this future, returning a `WithContext`
    /// wrapper.
    fn with_current_context(self) -> WithContext<Self> {
        let otel_cx = Context::current();
        self.with_context(otel_cx)
    }
}

impl<S: Stream> StreamContextExt for S {}

/// Extension trait allowing streams to run with an attached [`Context`].
///
/// Each `poll_next` sees the context, e.g. the span of the request a
/// response stream belongs to.
pub trait StreamContextExt: Sized {
    /// Attaches the provided [`Context`] to this stream, returning a
    /// `WithContext` wrapper.
    fn with_context(self, otel_cx: Context) -> WithContext<Self> {
        WithContext {
            inner: self,
            otel_cx,
        }
    }

    /// Attaches the current [`Context`] to this stream.
    fn with_current_context(self) -> WithContext<Self> {
        let otel_cx = Context::current();
        self.with_context(otel_cx)
    }
}
