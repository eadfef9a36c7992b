// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient trace-context propagation core.
//!
//! This crate tracks which span is active for the current execution of
//! control, hands that identity across thread and callback boundaries, and
//! carries caller-defined baggage fields alongside it through a span tree
//! without corrupting sibling or ancestor state.
//!
//! Two tightly coupled subsystems make up the crate:
//! - **Ambient context scoping** ([`current`], [`thread_context`]): the
//!   identity currently ambient on a thread, with scoped activation,
//!   redundancy elision, and wrapping helpers for single-shot tasks,
//!   recurring callbacks, and executor-submitted work
//! - **Baggage field propagation** ([`baggage`]): a copy-on-write field map
//!   attached to a trace identity, shared between span-equivalent contexts
//!   and snapshotted across span boundaries, with deterministic merging when
//!   several extraction sources combine
//!
//! # Scope of this crate
//!
//! Trace and span id generation, sampling policy, wire formats for propagated
//! headers, and the span lifecycle API are external collaborators. They
//! consume [`SpanContextBuilder`], the `CurrentSpanContext` scope operations,
//! and the baggage factory surface; their internals live elsewhere.
//!
//! # Example
//!
//! ```
//! use datadog_trace_context::{
//!     BaggageFieldsFactory, CurrentSpanContext, CurrentSpanContextExt, SpanContext,
//!     ThreadLocalSpanContext,
//! };
//!
//! let factory = BaggageFieldsFactory::new();
//! let context = factory.decorate(
//!     SpanContext::builder().trace_id(1).span_id(2).sampled(true).build(),
//! );
//! factory.put(&context, "request-id", "9f1a");
//!
//! let store = ThreadLocalSpanContext::new();
//! let scope = store.new_scope(Some(context));
//! let task = store.wrap(move || {
//!     // Runs with the captured identity ambient, on any thread.
//!     store.get().and_then(|c| factory.get(&c, "request-id"))
//! });
//! scope.close();
//!
//! assert_eq!(std::thread::spawn(task).join().unwrap().as_deref(), Some("9f1a"));
//! ```

pub mod baggage;
pub mod config;
pub mod context;
pub mod current;
pub mod error;
pub mod executor;
pub mod thread_context;

pub use baggage::{BaggageFields, BaggageFieldsFactory, CompositeDecorator};
pub use config::{Config, StoreKind};
pub use context::{ContextKey, Extra, ExtraState, FactoryId, SpanContext, SpanContextBuilder};
pub use current::{CurrentSpanContext, CurrentSpanContextExt, Scope};
pub use error::ContextError;
pub use executor::{ContextExecutor, Executor, Task};
pub use thread_context::ThreadLocalSpanContext;
