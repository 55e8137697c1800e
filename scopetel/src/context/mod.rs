//! Execution-scoped context propagation.
//!
//! A [`Context`] carries the identity of the current span, the current
//! [`Baggage`] and the telemetry-suppression flag for one logical execution
//! unit. Contexts are attached to the calling thread with
//! [`Context::attach`], and the previous context is restored when the returned
//! [`ContextGuard`] is dropped, on every exit path including unwinding.
//!
//! Contexts never leak between threads. Async tasks carry their own context
//! across polls with [`FutureContextExt::with_context`].
//!
//! [`Baggage`]: crate::baggage::Baggage

use crate::baggage::Baggage;
use crate::tel_warn;
use crate::trace::{Span, SpanContext};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

mod future_ext;

pub use future_ext::{FutureContextExt, StreamContextExt, WithContext};

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

/// An execution-scoped collection of trace identity and baggage.
///
/// Contexts are values: cloning one and changing the clone never affects the
/// original. The only in-place mutation is [`Context::set_baggage`], which
/// changes the context currently attached to the calling thread.
///
/// # Examples
///
/// ```
/// use scopetel::Context;
///
/// let _outer_guard = Context::new().with_baggage([("tenant", "a")]).attach();
/// assert_eq!(Context::get_baggage("tenant").as_deref(), Some("a"));
///
/// {
///     let _inner_guard = Context::current_with_baggage([("tenant", "b")]).attach();
///     assert_eq!(Context::get_baggage("tenant").as_deref(), Some("b"));
/// }
///
/// // Resets to the outer value when the inner guard is dropped
/// assert_eq!(Context::get_baggage("tenant").as_deref(), Some("a"));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<SpanContext>,
    pub(crate) baggage: Baggage,
    suppress_telemetry: bool,
}

impl Context {
    /// A context without span, baggage or suppression.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a snapshot of the current thread's context.
    pub fn current() -> Self {
        Self::map_current(|cx| cx.clone())
    }

    /// Runs `f` on the current context without cloning it.
    ///
    /// Note: This function will panic if you attempt to attach another context
    /// while the current one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow().current_cx))
    }

    /// Applies a function to the attached context, if one is attached.
    ///
    /// The thread's base context is never handed out, so a task that did not
    /// attach a context of its own cannot alter what later tasks on the same
    /// thread observe.
    pub(crate) fn map_attached_mut<T>(f: impl FnOnce(&mut Context) -> T) -> Option<T> {
        CURRENT_CONTEXT.with(|cx| {
            let mut stack = cx.borrow_mut();
            if stack.stack.is_empty() {
                None
            } else {
                Some(f(&mut stack.current_cx))
            }
        })
    }

    /// Returns the identity of the span this context points to, if any.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    /// Returns `true` if this context points to a valid span.
    pub fn has_active_span(&self) -> bool {
        self.span.as_ref().is_some_and(SpanContext::is_valid)
    }

    /// Returns a clone of this context pointing to the given span.
    pub fn with_span(&self, span: &Span) -> Self {
        self.with_remote_span_context(span.span_context().clone())
    }

    /// Returns a clone of the current context pointing to the given span.
    pub fn current_with_span(span: &Span) -> Self {
        Self::map_current(|cx| cx.with_span(span))
    }

    /// Returns a clone of this context pointing to a span identity that was
    /// received from elsewhere, for example an upstream caller.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span: Some(span_context),
            baggage: self.baggage.clone(),
            suppress_telemetry: self.suppress_telemetry,
        }
    }

    /// Makes this context current on this thread until the guard drops.
    ///
    /// Dropping the returned [`ContextGuard`] will reset the current context
    /// to the previous value.
    ///
    /// ```
    /// use scopetel::Context;
    ///
    /// fn my_function() {
    ///     // `let _ = ...` would drop the guard on the spot
    ///     let _guard = Context::new().with_baggage([("k", "v")]).attach();
    ///     assert_eq!(Context::get_baggage("k").as_deref(), Some("v"));
    /// }
    ///
    /// my_function();
    /// assert_eq!(Context::get_baggage("k"), None);
    /// ```
    pub fn attach(self) -> ContextGuard {
        let cx_id = CURRENT_CONTEXT.with(|cx| cx.borrow_mut().push(self));

        ContextGuard {
            cx_pos: cx_id,
            _marker: PhantomData,
        }
    }

    /// Whether this context suppresses telemetry.
    #[inline]
    pub fn is_telemetry_suppressed(&self) -> bool {
        self.suppress_telemetry
    }

    /// A copy of this context in which telemetry is suppressed.
    pub fn with_telemetry_suppressed(&self) -> Self {
        Context {
            span: self.span.clone(),
            baggage: self.baggage.clone(),
            suppress_telemetry: true,
        }
    }

    /// Suppresses telemetry on this thread until the guard drops.
    ///
    /// Export workers run inside such a scope so that anything they log or
    /// trace while exporting is not fed back into the pipeline.
    pub fn enter_telemetry_suppressed_scope() -> ContextGuard {
        Self::map_current(|cx| cx.with_telemetry_suppressed()).attach()
    }

    /// Whether the current context suppresses telemetry.
    #[inline]
    pub fn is_current_telemetry_suppressed() -> bool {
        Self::map_current(|cx| cx.is_telemetry_suppressed())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("span", &self.span)
            .field("baggage", &self.baggage)
            .field("suppress_telemetry", &self.suppress_telemetry)
            .finish()
    }
}

/// Restores the previously current context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    // where the attached context sits in the stack
    cx_pos: u16,
    // !Send: the position refers to this thread's stack
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let id = self.cx_pos;
        if id > ContextStack::BASE_POS && id < ContextStack::MAX_POS {
            CURRENT_CONTEXT.with(|context_stack| context_stack.borrow_mut().pop_id(id));
        }
    }
}

/// Contexts attached to one thread.
///
/// Guards may be dropped out of order. Popping a position below the top only
/// clears that slot; the topmost context is restored once the top itself is
/// popped.
struct ContextStack {
    /// The active context. When `stack` is empty this is the base context.
    current_cx: Context,
    /// Contexts shadowed by `current_cx`, `None` where popped out of order.
    stack: Vec<Option<Context>>,
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, cx: Context) -> u16 {
        // `current_cx` is the top, so the new id is one past the shadowed contexts
        let next_id = self.stack.len() + 1;
        if next_id < ContextStack::MAX_POS.into() {
            let current_cx = std::mem::replace(&mut self.current_cx, cx);
            self.stack.push(Some(current_cx));
            next_id as u16
        } else {
            tel_warn!(
                name: "Context.AttachFailed",
                message = format!(
                    "Too many contexts. Max limit is {}. Context::current() remains unchanged.",
                    ContextStack::MAX_POS
                )
            );
            ContextStack::MAX_POS
        }
    }

    #[inline(always)]
    fn pop_id(&mut self, pos: u16) {
        if pos == ContextStack::BASE_POS || pos == ContextStack::MAX_POS {
            return;
        }
        let len: u16 = self.stack.len() as u16;
        if pos == len {
            // Shrink past slots already popped out of order.
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(next_cx)) = self.stack.pop() {
                self.current_cx = next_cx;
            }
        } else {
            if pos >= len {
                tel_warn!(
                    name: "Context.PopOutOfBounds",
                    position = pos,
                    stack_length = len
                );
                return;
            }
            _ = self.stack[pos as usize].take();
        }
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}
