// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Baggage field propagation across a span tree.
//!
//! Baggage attaches caller-defined string fields to a trace identity so they
//! travel with it through the span tree, independent of the trace and span id
//! encoding. Fields are visible to every span in a lineage by default, yet a
//! write made through one span never retroactively alters what a sibling or
//! ancestor already observed.
//!
//! # Coupling and decoupling
//!
//! Whether two contexts share one mutable holder is decided by span identity,
//! never by object identity:
//! - deriving a context that keeps the same span id (for example a sampling
//!   flag change) reuses the predecessor's holder, so writes through either
//!   context are mutually visible
//! - deriving a context with a new span id snapshots the predecessor's fields
//!   into a fresh holder, after which the two field maps evolve independently
//!
//! # Merging
//!
//! When a new identity combines several sources, for example an ambient
//! parent plus state extracted from an incoming carrier, the extracted
//! holder's values win on key collision and the ambient fields fill the
//! remainder. Exactly one holder of a given factory survives in the resulting
//! context, with no empty duplicate left behind.
//!
//! # Concurrency
//!
//! A holder shared between coupled contexts may be handed across threads, so
//! its map sits behind a mutex. The intended usage is still one logical
//! call-flow at a time, with sequential handoff between threads via the
//! wrapping helpers in [`crate::current`].

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::context::{ContextKey, Extra, ExtraState, FactoryId, SpanContext};

/// A mutable set of baggage fields bound to one span identity at a time.
///
/// Field names are unique; values are strings. Snapshot order is the order of
/// first write, regardless of later overwrites.
pub struct BaggageFields {
    inner: Mutex<FieldsInner>,
}

#[derive(Default)]
struct FieldsInner {
    owner: Option<ContextKey>,
    entries: Vec<(String, String)>,
}

impl BaggageFields {
    fn new() -> Self {
        Self {
            inner: Mutex::new(FieldsInner::default()),
        }
    }

    /// Returns the value for `name`, or `None` when the field was never set.
    pub fn get(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner
            .entries
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    }

    /// Sets `name` to `value`, overwriting in place when the field exists.
    ///
    /// Any name is accepted; no schema is enforced at this layer. The write
    /// is immediately visible through every context coupled to this holder.
    pub fn put(&self, name: &str, value: &str) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.entries.iter_mut().find(|(field, _)| field == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => inner.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Ordered snapshot of all fields, in first-write order.
    pub fn to_map(&self) -> Vec<(String, String)> {
        self.inner.lock().expect("lock poisoned").entries.clone()
    }

    /// True when no field has been written yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("lock poisoned").entries.is_empty()
    }

    /// The span identity this holder is currently bound to, for diagnostics.
    pub fn owner(&self) -> Option<ContextKey> {
        self.inner.lock().expect("lock poisoned").owner
    }

    /// Binds the holder to `key` when unclaimed, or confirms an existing
    /// claim by a span-equivalent identity. Returns false when the holder
    /// already belongs to a different span.
    pub(crate) fn try_claim(&self, key: ContextKey) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        match inner.owner {
            None => {
                inner.owner = Some(key);
                true
            }
            Some(owner) => owner == key,
        }
    }

    /// Copies every field of `other` that is absent here. Existing values
    /// win, which gives the claimed holder precedence during merges.
    pub(crate) fn put_all_if_absent(&self, other: &BaggageFields) {
        // Snapshot first so the two locks are never held together.
        let source = other.to_map();
        let mut inner = self.inner.lock().expect("lock poisoned");
        for (name, value) in source {
            if !inner.entries.iter().any(|(field, _)| *field == name) {
                inner.entries.push((name, value));
            }
        }
    }
}

impl fmt::Display for BaggageFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.to_map();
        write!(f, "BaggageFields{{")?;
        for (i, (name, value)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for BaggageFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("lock poisoned");
        f.debug_struct("BaggageFields")
            .field("owner", &inner.owner)
            .field("entries", &inner.entries)
            .finish()
    }
}

impl ExtraState for BaggageFields {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Creates, binds, and merges [`BaggageFields`] holders for one field schema.
///
/// The factory is a stateless policy object identified by a [`FactoryId`].
/// It is the sole authority for deciding whether a freshly built context
/// shares, copies, or merges field state, and it only ever touches extra
/// entries carrying its own id.
#[derive(Debug)]
pub struct BaggageFieldsFactory {
    id: FactoryId,
}

impl BaggageFieldsFactory {
    pub fn new() -> Self {
        Self {
            id: FactoryId::next(),
        }
    }

    /// The id identifying this factory's entries in a context's extra
    /// sequence.
    pub fn id(&self) -> FactoryId {
        self.id
    }

    /// Returns a new, empty holder not yet bound to any identity.
    ///
    /// Extraction code populates such a holder from carrier state and
    /// attaches it to a context builder via [`BaggageFieldsFactory::extra`];
    /// decoration binds it to the built identity.
    pub fn create(&self) -> Arc<BaggageFields> {
        Arc::new(BaggageFields::new())
    }

    /// Tags a holder as an extra entry owned by this factory.
    pub fn extra(&self, fields: Arc<BaggageFields>) -> Extra {
        Extra::new(self.id, fields)
    }

    /// Binds field state to a freshly built context.
    ///
    /// Called for every newly produced identity. The first holder in the
    /// context's extra sequence that is unclaimed, or already claimed by a
    /// span-equivalent identity, becomes the bound holder; when none
    /// qualifies a fresh holder is created. Fields from every other holder of
    /// this factory are then folded in, with the bound holder's values
    /// winning on collision. The result carries exactly one holder of this
    /// factory.
    pub fn decorate(&self, context: SpanContext) -> SpanContext {
        let key = context.key();

        let mut bound: Option<Arc<BaggageFields>> = None;
        let mut others: Vec<Arc<BaggageFields>> = Vec::new();
        for entry in context.extra() {
            let Some(fields) = self.fields_of(entry) else {
                continue;
            };
            if bound.is_none() && fields.try_claim(key) {
                bound = Some(fields);
            } else {
                others.push(fields);
            }
        }

        let bound = bound.unwrap_or_else(|| {
            let fresh = self.create();
            fresh.try_claim(key);
            fresh
        });

        if !others.is_empty() {
            debug!(
                "folding {} predecessor baggage holder(s) into span {}",
                others.len(),
                key.span_id
            );
        }
        for fields in &others {
            if Arc::ptr_eq(fields, &bound) {
                continue;
            }
            bound.put_all_if_absent(fields);
        }

        // Rebuild the extra sequence with a single holder for this factory,
        // kept at the position of the first original entry.
        let mut extra: Vec<Extra> = Vec::with_capacity(context.extra().len() + 1);
        let mut placed = false;
        for entry in context.extra() {
            if entry.factory() == self.id {
                if !placed {
                    extra.push(self.extra(bound.clone()));
                    placed = true;
                }
                continue;
            }
            extra.push(entry.clone());
        }
        if !placed {
            extra.push(self.extra(bound));
        }

        context.with_extra(extra)
    }

    /// The holder this factory bound to `context`, if decoration ran.
    pub fn handle(&self, context: &SpanContext) -> Option<Arc<BaggageFields>> {
        context.extra().iter().find_map(|entry| self.fields_of(entry))
    }

    /// Reads a field through `context`'s bound holder.
    ///
    /// Returns `None` when the context carries no holder of this factory or
    /// the field was never set. Neither case is an error; extra state is
    /// optional per identity.
    pub fn get(&self, context: &SpanContext, name: &str) -> Option<String> {
        self.handle(context).and_then(|fields| fields.get(name))
    }

    /// Writes a field through `context`'s bound holder, in place.
    ///
    /// The write is visible immediately through every context coupled to the
    /// same holder. A context with no holder of this factory is left
    /// untouched.
    pub fn put(&self, context: &SpanContext, name: &str, value: &str) {
        if let Some(fields) = self.handle(context) {
            fields.put(name, value);
        }
    }

    fn fields_of(&self, entry: &Extra) -> Option<Arc<BaggageFields>> {
        if entry.factory() != self.id {
            return None;
        }
        entry.state().clone().into_any().downcast().ok()
    }
}

impl Default for BaggageFieldsFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies every registered factory to each newly built context.
///
/// Tracers hold one of these and run every [`SpanContext`] coming out of a
/// builder through [`decorate`](CompositeDecorator::decorate), so each
/// factory can couple, copy, or merge its own state. Factories are applied
/// in registration order.
pub struct CompositeDecorator {
    factories: Vec<Arc<BaggageFieldsFactory>>,
}

impl CompositeDecorator {
    pub fn new(factories: Vec<Arc<BaggageFieldsFactory>>) -> Self {
        Self { factories }
    }

    pub fn decorate(&self, context: SpanContext) -> SpanContext {
        self.factories
            .iter()
            .fold(context, |context, factory| factory.decorate(context))
    }
}
