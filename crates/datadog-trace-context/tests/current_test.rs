// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::Duration;

use duplicate::duplicate_item;

use datadog_trace_context::{
    BaggageFieldsFactory, CurrentSpanContext, CurrentSpanContextExt, Executor, SpanContext,
    ThreadLocalSpanContext,
};

fn context(span_id: u64) -> SpanContext {
    SpanContext::builder().trace_id(1).span_id(span_id).build()
}

fn sampled_context(span_id: u64, sampled: bool) -> SpanContext {
    SpanContext::builder()
        .trace_id(1)
        .span_id(span_id)
        .sampled(sampled)
        .build()
}

#[test]
fn close_restores_the_previous_context() {
    let store = ThreadLocalSpanContext::new();

    let outer = store.new_scope(Some(context(7)));
    {
        let inner = store.new_scope(Some(context(8)));
        assert_eq!(store.get().map(|c| c.span_id()), Some(8));
        // intermediate reads must not disturb restoration
        let _ = store.get();
        let _ = store.get();
        inner.close();
    }
    assert_eq!(store.get().map(|c| c.span_id()), Some(7));

    outer.close();
    assert_eq!(store.get(), None);
}

macro_rules! test_maybe_scope {
    ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (ambient, candidate, expect_noop) = $value;
                let store = ThreadLocalSpanContext::new();
                let _outer = store.new_scope(ambient);

                let scope = store.maybe_scope(candidate);
                assert_eq!(scope.is_noop(), expect_noop);
            }
        )*
    }
}

test_maybe_scope! {
    both_absent_elides: (
        None,
        None,
        true
    ),
    same_span_elides: (
        Some(context(2)),
        Some(context(2)),
        true
    ),
    sampling_change_still_elides: (
        Some(sampled_context(2, true)),
        Some(sampled_context(2, false)),
        true
    ),
    different_span_opens_a_scope: (
        Some(context(2)),
        Some(context(3)),
        false
    ),
    clearing_opens_a_scope: (
        Some(context(2)),
        None,
        false
    ),
    installing_over_empty_opens_a_scope: (
        None,
        Some(context(2)),
        false
    ),
}

#[test]
fn elided_scope_keeps_extra_state_visibility() {
    let factory = BaggageFieldsFactory::new();
    let ambient = factory.decorate(context(2));
    factory.put(&ambient, "foo", "1");

    let store = ThreadLocalSpanContext::new();
    let _outer = store.new_scope(Some(ambient));

    // Span-equivalent, but stripped of the baggage holder. The elided scope
    // must not swap it in; previously-set state stays visible.
    let stripped = context(2);
    let scope = store.maybe_scope(Some(stripped));
    assert!(scope.is_noop());

    let seen = store.get().unwrap();
    assert_eq!(factory.get(&seen, "foo").as_deref(), Some("1"));
    scope.close();
    assert_eq!(
        factory.get(&store.get().unwrap(), "foo").as_deref(),
        Some("1")
    );
}

#[test]
fn maybe_scope_behaves_like_new_scope_for_a_different_span() {
    let store = ThreadLocalSpanContext::new();
    let _outer = store.new_scope(Some(context(2)));

    let scope = store.maybe_scope(Some(context(3)));
    assert_eq!(store.get().map(|c| c.span_id()), Some(3));
    scope.close();
    assert_eq!(store.get().map(|c| c.span_id()), Some(2));
}

#[test]
fn wrap_carries_context_to_another_thread() {
    let store = ThreadLocalSpanContext::new();
    let _scope = store.new_scope(Some(context(2)));

    let wrapped = store.wrap(move || store.get().map(|c| c.span_id()));

    let seen = std::thread::spawn(wrapped).join().unwrap();
    assert_eq!(seen, Some(2));
}

#[test]
fn wrap_fn_scopes_each_invocation() {
    let store = ThreadLocalSpanContext::new();

    let scope = store.new_scope(Some(context(2)));
    let wrapped = store.wrap_fn(move || {
        assert_eq!(store.get().map(|c| c.span_id()), Some(2));
    });
    scope.close();

    assert_eq!(store.get(), None);
    wrapped();
    assert_eq!(store.get(), None, "scope closed after first invocation");
    wrapped();
    assert_eq!(store.get(), None, "scope closed after second invocation");
}

#[test]
fn wrap_fn_restores_on_panic() {
    let store = ThreadLocalSpanContext::new();

    let scope = store.new_scope(Some(context(2)));
    let wrapped = store.wrap_fn(|| panic!("instrumented task failed"));
    scope.close();

    let result = catch_unwind(AssertUnwindSafe(&wrapped));
    assert!(result.is_err());
    assert_eq!(store.get(), None, "ambient state restored during unwind");
}

#[test]
fn wrap_captures_at_wrap_time_not_run_time() {
    let store = ThreadLocalSpanContext::new();

    let scope = store.new_scope(Some(context(2)));
    let wrapped = store.wrap(move || store.get().map(|c| c.span_id()));
    scope.close();

    let _other = store.new_scope(Some(context(9)));
    assert_eq!(wrapped(), Some(2));
    assert_eq!(store.get().map(|c| c.span_id()), Some(9));
}

struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, task: datadog_trace_context::Task) {
        std::thread::spawn(task);
    }
}

#[test]
fn executor_propagates_the_submission_context() {
    let store = ThreadLocalSpanContext::new();
    let executor = store.executor(ThreadExecutor);

    let _scope = store.new_scope(Some(context(2)));
    let (tx, rx) = mpsc::channel();
    executor.execute(Box::new(move || {
        tx.send(store.get().map(|c| c.span_id())).unwrap();
    }));

    let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen, Some(2));
}

#[test]
fn executor_captures_per_submission() {
    let store = ThreadLocalSpanContext::new();
    let executor = store.executor(ThreadExecutor);
    let (tx, rx) = mpsc::channel();

    {
        let _scope = store.new_scope(Some(context(2)));
        let tx = tx.clone();
        executor.execute(Box::new(move || {
            tx.send(("first", store.get().map(|c| c.span_id()))).unwrap();
        }));
    }
    {
        let _scope = store.new_scope(Some(context(3)));
        executor.execute(Box::new(move || {
            tx.send(("second", store.get().map(|c| c.span_id()))).unwrap();
        }));
    }

    let mut seen: Vec<_> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort();
    assert_eq!(seen, vec![("first", Some(2)), ("second", Some(3))]);
}

#[tokio::test]
async fn tokio_handle_executes_with_the_submission_context() {
    let store = ThreadLocalSpanContext::new();
    let executor = store.executor(tokio::runtime::Handle::current());

    let scope = store.new_scope(Some(context(2)));
    let handle = executor.spawn_blocking(move || store.get().map(|c| c.span_id()));
    scope.close();

    assert_eq!(handle.await.unwrap(), Some(2));
}

#[duplicate_item(
    test_name                            store_ctor        expected;
    [inheritable_spawn_copies_context]   [inheritable()]   [Some(2)];
    [default_spawn_starts_empty]         [new()]           [None];
)]
#[test]
fn test_name() {
    let store = ThreadLocalSpanContext::store_ctor;
    let _scope = store.new_scope(Some(context(2)));

    let seen = store
        .spawn(move || store.get().map(|c| c.span_id()))
        .join()
        .unwrap();
    assert_eq!(seen, expected);
}

#[test]
fn inheritance_is_a_one_time_copy() {
    let store = ThreadLocalSpanContext::inheritable();
    let _scope = store.new_scope(Some(context(2)));

    let handle = store.spawn(move || {
        let inherited = store.get().map(|c| c.span_id());
        let child_scope = store.new_scope(Some(context(9)));
        let rebound = store.get().map(|c| c.span_id());
        child_scope.close();
        (inherited, rebound)
    });

    let (inherited, rebound) = handle.join().unwrap();
    assert_eq!(inherited, Some(2));
    assert_eq!(rebound, Some(9));

    // the child's scopes never touch the parent's thread
    assert_eq!(store.get().map(|c| c.span_id()), Some(2));
}
