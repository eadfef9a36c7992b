// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default thread-affine ambient context store.
//!
//! Storage is a static cell partitioned by operating-system thread, so every
//! store handle on a given thread observes the same ambient identity and no
//! cross-thread locking exists. The cell is reachable only through the scope
//! API; there is no direct mutable access.
//!
//! Two construction-time variants exist:
//! - **thread-local** (default): child threads start with no ambient
//!   identity
//! - **inheritable**: threads started through [`ThreadLocalSpanContext::spawn`]
//!   receive a snapshot of the spawning thread's ambient identity, copied
//!   once at spawn time and never linked afterwards
//!
//! Prefer the default variant. Inheritance across thread creation leaks
//! request state into pooled or long-lived threads in ways that are hard to
//! debug; it exists for callers that cannot control how their threads are
//! created.

use std::cell::RefCell;
use std::thread;

use tracing::trace;

use crate::config::{Config, StoreKind};
use crate::context::SpanContext;
use crate::current::{CurrentSpanContext, Scope};

thread_local! {
    static DEFAULT: RefCell<Option<SpanContext>> = const { RefCell::new(None) };
    static INHERITABLE: RefCell<Option<SpanContext>> = const { RefCell::new(None) };
}

/// The default [`CurrentSpanContext`] implementation.
///
/// Handles are cheap copies selecting one of two static storage cells, so
/// every instance of the same variant shares ambient state within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLocalSpanContext {
    kind: StoreKind,
}

impl ThreadLocalSpanContext {
    /// A store backed by non-inheritable thread-local storage.
    pub fn new() -> Self {
        Self {
            kind: StoreKind::ThreadLocal,
        }
    }

    /// A store whose ambient identity is copied into threads started through
    /// [`spawn`](ThreadLocalSpanContext::spawn).
    pub fn inheritable() -> Self {
        Self {
            kind: StoreKind::Inheritable,
        }
    }

    /// A store for the variant selected by `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            kind: config.context_store,
        }
    }

    pub fn store_kind(&self) -> StoreKind {
        self.kind
    }

    /// Spawns a thread through this store.
    ///
    /// With the inheritable variant the child starts with a one-time copy of
    /// the identity ambient at the moment of spawn; later scope changes on
    /// either thread are independent. With the default variant the child
    /// starts with no ambient identity. Threads spawned directly through
    /// `std::thread` never inherit, whichever variant is configured.
    pub fn spawn<F, T>(&self, f: F) -> thread::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let seed = match self.kind {
            StoreKind::Inheritable => self.get(),
            StoreKind::ThreadLocal => None,
        };
        let store = *self;
        thread::spawn(move || {
            let _scope = store.new_scope(seed);
            f()
        })
    }

    fn with_cell<R>(&self, f: impl FnOnce(&RefCell<Option<SpanContext>>) -> R) -> R {
        match self.kind {
            StoreKind::ThreadLocal => DEFAULT.with(f),
            StoreKind::Inheritable => INHERITABLE.with(f),
        }
    }
}

impl CurrentSpanContext for ThreadLocalSpanContext {
    fn get(&self) -> Option<SpanContext> {
        self.with_cell(|cell| cell.borrow().clone())
    }

    fn new_scope(&self, context: Option<SpanContext>) -> Scope {
        trace!(
            "entering ambient scope for span {:?}",
            context.as_ref().map(SpanContext::span_id)
        );
        let previous = self.with_cell(|cell| cell.replace(context));
        let store = *self;
        Scope::restoring(move || {
            store.with_cell(|cell| *cell.borrow_mut() = previous);
        })
    }
}

impl Default for ThreadLocalSpanContext {
    fn default() -> Self {
        Self::new()
    }
}
