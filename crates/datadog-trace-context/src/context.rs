// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient trace identity structures shared by the scoping and baggage layers.
//!
//! This module defines the core identity carried by every traced unit of work:
//! - **`SpanContext`**: the immutable trace identity (trace ID, span ID,
//!   sampling decision) plus an ordered sequence of opaque extra state
//! - **`SpanContextBuilder`**: the constructor every new identity passes
//!   through before the tracer applies registered decoration
//! - **`Extra`**: a factory-tagged opaque state entry attached to an identity
//!
//! # Identity
//!
//! Two `SpanContext` values describe the same span when their
//! `(trace_id_high, trace_id, span_id)` triples match. Equality and hashing
//! are defined over that triple alone. The sampling decision and the extra
//! sequence never participate, which is what lets a sampling-flag mutation
//! produce a new value that still shares mutable extra state with its
//! predecessor.
//!
//! # Immutability
//!
//! A `SpanContext` never changes after construction. "Modifying" one means
//! deriving a builder with [`SpanContext::to_builder`], adjusting it, and
//! building a fresh value. The tracer then passes the fresh value through each
//! registered [`BaggageFieldsFactory::decorate`](crate::baggage::BaggageFieldsFactory::decorate)
//! so extra state is coupled, copied, or merged according to span identity.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a factory that attaches extra state to contexts.
///
/// Each factory instance receives a distinct id from a process-wide counter.
/// A factory recognizes and operates only on `Extra` entries carrying its own
/// id, so unrelated factories can coexist on one context without inspecting
/// each other's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryId(u64);

impl FactoryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        FactoryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The span-equivalence comparison key of a context.
///
/// Holds exactly the fields that define span identity. Extra-state coupling
/// decisions compare these keys instead of object identity, so the sharing
/// invariant can be checked from values alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub trace_id_high: u64,
    pub trace_id: u64,
    pub span_id: u64,
}

/// Opaque state attached to a context by a factory.
///
/// Implementations must be thread-safe; entries are shared across the
/// contexts of one span via `Arc`.
pub trait ExtraState: fmt::Debug + Send + Sync + 'static {
    /// Upcast used by the owning factory to recover its concrete state type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A single entry in a context's extra sequence, tagged by the factory that
/// created it.
#[derive(Debug, Clone)]
pub struct Extra {
    factory: FactoryId,
    state: Arc<dyn ExtraState>,
}

impl Extra {
    pub fn new(factory: FactoryId, state: Arc<dyn ExtraState>) -> Self {
        Self { factory, state }
    }

    /// Id of the factory that owns this entry.
    pub fn factory(&self) -> FactoryId {
        self.factory
    }

    /// The opaque state payload.
    pub fn state(&self) -> &Arc<dyn ExtraState> {
        &self.state
    }
}

/// Immutable trace identity for a span.
///
/// Contains the 128-bit trace identifier (split into high and low 64-bit
/// halves), the 64-bit span identifier, the sampling decision if one has been
/// made, and an ordered sequence of opaque extra state entries.
///
/// # Equality
///
/// `PartialEq`, `Eq`, and `Hash` consider only the identity triple
/// `(trace_id_high, trace_id, span_id)`. Two contexts that differ only in
/// sampling decision or extra state compare equal. Callers that need full
/// structural comparison should compare the individual accessors.
#[derive(Debug, Clone, Default)]
pub struct SpanContext {
    trace_id_high: u64,
    trace_id: u64,
    span_id: u64,
    sampled: Option<bool>,
    extra: Vec<Extra>,
}

impl SpanContext {
    /// Start building a new context.
    pub fn builder() -> SpanContextBuilder {
        SpanContextBuilder::default()
    }

    /// Derive a builder carrying this context's identity, sampling decision,
    /// and extra sequence. Extra entries are shared, not copied; decoration
    /// of the built value decides whether state is coupled or snapshotted.
    pub fn to_builder(&self) -> SpanContextBuilder {
        SpanContextBuilder {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            span_id: self.span_id,
            sampled: self.sampled,
            extra: self.extra.clone(),
        }
    }

    /// High 64 bits of the 128-bit trace id, zero for 64-bit trace ids.
    pub fn trace_id_high(&self) -> u64 {
        self.trace_id_high
    }

    /// Low 64 bits of the trace id.
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// Unique identifier of this span within the trace.
    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The sampling decision, or `None` when no decision has been made yet.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// The ordered extra-state sequence attached to this identity.
    pub fn extra(&self) -> &[Extra] {
        &self.extra
    }

    /// The span-equivalence key of this context.
    pub fn key(&self) -> ContextKey {
        ContextKey {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }

    /// Returns true when `other` describes the same span, ignoring the
    /// sampling decision and extra state.
    pub fn same_span_as(&self, other: &SpanContext) -> bool {
        self.key() == other.key()
    }

    pub(crate) fn with_extra(mut self, extra: Vec<Extra>) -> Self {
        self.extra = extra;
        self
    }
}

impl PartialEq for SpanContext {
    fn eq(&self, other: &Self) -> bool {
        self.same_span_as(other)
    }
}

impl Eq for SpanContext {}

impl Hash for SpanContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Builder for [`SpanContext`].
///
/// Every newly produced identity passes through a builder, whether it is a
/// root context, a child with a fresh span id, a sampling-flag mutation of an
/// existing context, or a context assembled from extracted carrier state. The
/// tracer applies each registered factory's `decorate` to the built value.
#[derive(Debug, Clone, Default)]
pub struct SpanContextBuilder {
    trace_id_high: u64,
    trace_id: u64,
    span_id: u64,
    sampled: Option<bool>,
    extra: Vec<Extra>,
}

impl SpanContextBuilder {
    pub fn trace_id_high(mut self, trace_id_high: u64) -> Self {
        self.trace_id_high = trace_id_high;
        self
    }

    pub fn trace_id(mut self, trace_id: u64) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn span_id(mut self, span_id: u64) -> Self {
        self.span_id = span_id;
        self
    }

    pub fn sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }

    /// Append an opaque extra entry, for example a field holder recovered
    /// from an extracted carrier.
    pub fn add_extra(mut self, extra: Extra) -> Self {
        self.extra.push(extra);
        self
    }

    pub fn build(self) -> SpanContext {
        SpanContext {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            span_id: self.span_id,
            sampled: self.sampled,
            extra: self.extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(trace_id_high: u64, trace_id: u64, span_id: u64, sampled: Option<bool>) -> SpanContext {
        let mut builder = SpanContext::builder()
            .trace_id_high(trace_id_high)
            .trace_id(trace_id)
            .span_id(span_id);
        if let Some(sampled) = sampled {
            builder = builder.sampled(sampled);
        }
        builder.build()
    }

    macro_rules! test_same_span {
        ($($name:ident: $value:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let (left, right, expected) = $value;
                    assert_eq!(left.same_span_as(&right), expected);
                    assert_eq!(left == right, expected);
                }
            )*
        }
    }

    test_same_span! {
        identical_triples_match: (
            context(0, 1, 2, Some(true)),
            context(0, 1, 2, Some(true)),
            true
        ),
        sampling_is_ignored: (
            context(0, 1, 2, Some(true)),
            context(0, 1, 2, Some(false)),
            true
        ),
        missing_sampling_is_ignored: (
            context(0, 1, 2, None),
            context(0, 1, 2, Some(true)),
            true
        ),
        span_id_differs: (
            context(0, 1, 2, Some(true)),
            context(0, 1, 3, Some(true)),
            false
        ),
        trace_id_differs: (
            context(0, 1, 2, None),
            context(0, 9, 2, None),
            false
        ),
        high_bits_differ: (
            context(1, 1, 2, None),
            context(0, 1, 2, None),
            false
        ),
    }

    #[test]
    fn to_builder_round_trips_identity() {
        let original = context(7, 1, 2, Some(true));
        let rebuilt = original.to_builder().build();

        assert_eq!(rebuilt.trace_id_high(), 7);
        assert_eq!(rebuilt.trace_id(), 1);
        assert_eq!(rebuilt.span_id(), 2);
        assert_eq!(rebuilt.sampled(), Some(true));
    }

    #[test]
    fn builder_defaults_are_empty() {
        let context = SpanContext::builder().build();

        assert_eq!(context.trace_id_high(), 0);
        assert_eq!(context.trace_id(), 0);
        assert_eq!(context.span_id(), 0);
        assert_eq!(context.sampled(), None);
        assert!(context.extra().is_empty());
    }

    #[test]
    fn factory_ids_are_distinct() {
        assert_ne!(FactoryId::next(), FactoryId::next());
    }
}
