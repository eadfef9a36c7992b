// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Context-propagating executor decoration.
//!
//! Work handed to an executor usually runs after the submitting scope has
//! closed, often on another thread. [`ContextExecutor`] decorates any
//! [`Executor`] so each task is wrapped with the identity ambient at
//! submission time; the wrapped task re-establishes that identity around its
//! own execution and nothing else about the delegate changes.
//!
//! The decorator derefs to the delegate, so delegate-specific surface
//! (shutdown, metrics, handles) stays reachable on the decorated value.

use std::ops::Deref;

use crate::current::{CurrentSpanContext, CurrentSpanContextExt};

/// A unit of work submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Minimal fire-and-forget execution surface.
///
/// This is the seam the context decorator needs; richer executors expose
/// their full API through the decorator's deref.
pub trait Executor {
    fn execute(&self, task: Task);
}

/// Runs tasks on the tokio blocking pool of the handle's runtime.
impl Executor for tokio::runtime::Handle {
    fn execute(&self, task: Task) {
        self.spawn_blocking(task);
    }
}

/// Decorator that submits context-wrapped tasks to a delegate executor.
pub struct ContextExecutor<C, E> {
    current: C,
    delegate: E,
}

impl<C, E> ContextExecutor<C, E> {
    pub(crate) fn new(current: C, delegate: E) -> Self {
        Self { current, delegate }
    }

    /// Consumes the decorator, returning the delegate.
    pub fn into_inner(self) -> E {
        self.delegate
    }
}

impl<C, E> Executor for ContextExecutor<C, E>
where
    C: CurrentSpanContext + Clone + Send + Sync + 'static,
    E: Executor,
{
    fn execute(&self, task: Task) {
        self.delegate.execute(Box::new(self.current.wrap(task)));
    }
}

impl<C> ContextExecutor<C, tokio::runtime::Handle>
where
    C: CurrentSpanContext + Clone + Send + Sync + 'static,
{
    /// Result-bearing submission for a tokio-backed delegate.
    ///
    /// The task runs on the runtime's blocking pool with the identity that
    /// was ambient when `spawn_blocking` was called.
    pub fn spawn_blocking<T, F>(&self, task: F) -> tokio::task::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.delegate.spawn_blocking(self.current.wrap(task))
    }
}

impl<C, E> Deref for ContextExecutor<C, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.delegate
    }
}
