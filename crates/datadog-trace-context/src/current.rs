// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient span-context scoping.
//!
//! "Ambient" means the trace identity active for the current thread of
//! execution, retrieved without being passed as an argument. Instrumentation
//! makes an identity ambient by opening a [`Scope`] and restores the prior
//! identity by closing it, usually implicitly through the guard's drop.
//!
//! # Context flow
//!
//! ```text
//! tracer builds SpanContext
//!   |
//! new_scope / maybe_scope (identity becomes ambient on this thread)
//!   |
//! instrumented call chain reads get()
//!   |
//! wrap() captures the ambient identity into a task
//!   |
//! task runs later, possibly on another thread, inside its own scope
//! ```
//!
//! [`CurrentSpanContext`] is the SPI for the ambient store. The default
//! thread-affine implementation lives in [`crate::thread_context`]; custom
//! implementations can integrate other storage, for example a logging MDC
//! bridge, by providing `get` and `new_scope`.

use std::fmt;
use std::sync::Arc;

use crate::context::SpanContext;
use crate::executor::{ContextExecutor, Executor};

/// A handle representing "this identity is ambient".
///
/// Closing the scope, explicitly or by drop, restores the value that was
/// ambient when the scope was opened. Restoration targets that captured
/// value, not whatever sits on top at close time, so out-of-order closes
/// leave the ambient state observably wrong but never panic. Callers are
/// responsible for properly nested close ordering.
#[must_use = "a scope restores the previous ambient context when dropped; an unused scope closes immediately"]
pub struct Scope {
    restore: Option<Box<dyn FnOnce()>>,
}

impl Scope {
    /// A scope whose close does nothing observable. Returned by
    /// [`CurrentSpanContext::maybe_scope`] when it detects redundancy.
    pub fn noop() -> Self {
        Self { restore: None }
    }

    /// A scope that runs `restore` exactly once when closed or dropped.
    pub fn restoring(restore: impl FnOnce() + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.restore.is_none()
    }

    /// Restores the previously ambient value. Never fails. Equivalent to
    /// dropping the scope.
    pub fn close(self) {}
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_noop() { "NoopScope" } else { "Scope" })
    }
}

/// Manages the trace identity ambient on the calling thread.
pub trait CurrentSpanContext: Send + Sync {
    /// Returns the identity currently ambient on the calling thread, or
    /// `None` when there is none.
    fn get(&self) -> Option<SpanContext>;

    /// Makes `context` ambient on the calling thread and records the
    /// previously ambient value. Closing the returned scope restores that
    /// previous value exactly, regardless of what was set in between.
    fn new_scope(&self, context: Option<SpanContext>) -> Scope;

    /// Like [`new_scope`](CurrentSpanContext::new_scope), except a no-op
    /// scope is returned when `context` is span-equivalent to the value
    /// already ambient, both absent included.
    ///
    /// This elides churn when nested instrumentation layers redundantly
    /// re-establish the same identity. Note that eliding the scope also
    /// skips reapplying any extra-state changes carried by `context`, so
    /// callers that need fresh extra-state visibility must use `new_scope`.
    fn maybe_scope(&self, context: Option<SpanContext>) -> Scope {
        let ambient = self.get();
        let redundant = match (&context, &ambient) {
            (None, None) => true,
            (Some(next), Some(active)) => next.same_span_as(active),
            _ => false,
        };
        if redundant {
            Scope::noop()
        } else {
            self.new_scope(context)
        }
    }
}

impl<C: CurrentSpanContext + ?Sized> CurrentSpanContext for Arc<C> {
    fn get(&self) -> Option<SpanContext> {
        (**self).get()
    }

    fn new_scope(&self, context: Option<SpanContext>) -> Scope {
        (**self).new_scope(context)
    }
}

/// Wrapping helpers that carry the ambient identity across task boundaries.
///
/// Built only on [`CurrentSpanContext::get`] and
/// [`CurrentSpanContext::maybe_scope`], and available on any cloneable store,
/// including `Arc<dyn CurrentSpanContext>`.
pub trait CurrentSpanContextExt: CurrentSpanContext + Clone + Send + Sync + Sized + 'static {
    /// Wraps a single-shot task so it executes with the identity that is
    /// ambient now.
    ///
    /// The identity is captured at wrap time. When the returned closure runs,
    /// possibly on a different thread, possibly never, a scope is opened
    /// around the task body and closed on every exit path, unwinding
    /// included.
    fn wrap<T, F>(&self, task: F) -> impl FnOnce() -> T + Send + 'static
    where
        F: FnOnce() -> T + Send + 'static,
        T: 'static,
    {
        let current = self.clone();
        let captured = self.get();
        move || {
            let _scope = current.maybe_scope(captured);
            task()
        }
    }

    /// Wraps a recurring callback so every invocation executes with the
    /// identity that is ambient now.
    ///
    /// Each invocation opens and closes its own scope, so the captured
    /// identity is ambient only for the duration of that invocation.
    fn wrap_fn<F>(&self, task: F) -> impl Fn() + Send + 'static
    where
        F: Fn() + Send + 'static,
    {
        let current = self.clone();
        let captured = self.get();
        move || {
            let _scope = current.maybe_scope(captured.clone());
            task();
        }
    }

    /// Decorates `delegate` so the identity ambient at the time a task is
    /// submitted is made ambient again when the task executes.
    fn executor<E: Executor>(&self, delegate: E) -> ContextExecutor<Self, E> {
        ContextExecutor::new(self.clone(), delegate)
    }
}

impl<C> CurrentSpanContextExt for C where C: CurrentSpanContext + Clone + Send + Sync + 'static {}
