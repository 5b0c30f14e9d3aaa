// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Tag-keyed result store with synchronous trigger dispatch.
//!
//! The store is the observation side-channel of a graph: every tagged node
//! publishes its per-tick results here, and external code subscribes to tags
//! without being wired into the tree. It deliberately does not validate tags
//! against the graph — publishing to a tag no node owns is legal, so the same
//! trigger channel works for non-graph signals.
//!
//! # Dispatch model
//!
//! `publish` always records the value under `latest`. If the tag has
//! subscribers the value is staged under `pending` and delivered synchronously,
//! in subscription order, before `publish` returns. One dispatch loop runs at
//! a time per store: a `publish` issued from inside a subscriber callback (or
//! from a racing thread mid-dispatch) stages its value and returns immediately,
//! leaving the active loop to drain it. That keeps delivery synchronous from
//! the outer caller's point of view without ever re-entering dispatch.
//!
//! Callbacks run with the store lock released, so a subscriber may freely
//! call back into `subscribe`/`unsubscribe`/`publish`. Subscribers are
//! snapshotted per delivery: a subscriber added during a dispatch sees only
//! later publishes, and an unsubscribed one may still receive the value that
//! was already in flight.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

/// Opaque handle returned by [`StateStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = std::sync::Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    id: u64,
    callback: Callback,
    once: bool,
}

#[derive(Default)]
struct StoreInner {
    latest: HashMap<String, Value>,
    pending: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<Subscription>>,
    next_id: u64,
    dispatching: bool,
}

/// Tag-keyed holder of most-recent results plus the subscription registry.
#[derive(Default)]
pub struct StateStore {
    inner: Mutex<StoreInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("state store lock poisoned")
    }

    /// Record `value` as the latest result for `tag` and notify subscribers.
    ///
    /// With no subscribers this is a single map insert. With subscribers the
    /// value is staged and delivered before this call returns, unless a
    /// dispatch loop is already active, in which case that loop delivers it.
    pub fn publish(&self, tag: &str, value: Value) {
        let mut inner = self.locked();
        inner.latest.insert(tag.to_string(), value.clone());

        let observed = inner
            .subscribers
            .get(tag)
            .map_or(false, |subs| !subs.is_empty());
        if !observed {
            return;
        }

        inner.pending.insert(tag.to_string(), value);
        if inner.dispatching {
            return;
        }
        inner.dispatching = true;

        loop {
            let Some(tag) = inner.pending.keys().next().cloned() else {
                break;
            };
            let value = inner
                .pending
                .remove(&tag)
                .expect("pending entry vanished during drain");
            let batch = claim_batch(&mut inner, &tag);

            drop(inner);
            for callback in &batch {
                callback(&value);
            }
            inner = self.locked();
        }

        inner.dispatching = false;
    }

    /// Register `callback` for every future publish to `tag`.
    ///
    /// Multiple subscribers per tag are allowed; registration order is
    /// dispatch order.
    pub fn subscribe<F>(&self, tag: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert_subscription(tag, std::sync::Arc::new(callback), false)
    }

    /// Register `callback` for exactly one delivery.
    ///
    /// The subscription is claimed (removed) under the lock before the
    /// callback is invoked, so concurrent publishes cannot double-deliver.
    pub fn subscribe_once<F>(&self, tag: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert_subscription(tag, std::sync::Arc::new(callback), true)
    }

    fn insert_subscription(&self, tag: &str, callback: Callback, once: bool) -> SubscriptionId {
        let mut inner = self.locked();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(tag.to_string())
            .or_default()
            .push(Subscription { id, callback, once });
        SubscriptionId(id)
    }

    /// Remove one subscription. Returns `false` when the id is not (or no
    /// longer) registered under `tag`.
    pub fn unsubscribe(&self, tag: &str, id: SubscriptionId) -> bool {
        let mut inner = self.locked();
        let Some(subs) = inner.subscribers.get_mut(tag) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|sub| sub.id != id.0);
        let removed = subs.len() < before;
        if subs.is_empty() {
            inner.subscribers.remove(tag);
        }
        removed
    }

    /// Remove every subscription for `tag`, returning how many were dropped.
    pub fn unsubscribe_all(&self, tag: &str) -> usize {
        let mut inner = self.locked();
        inner
            .subscribers
            .remove(tag)
            .map_or(0, |subs| subs.len())
    }

    /// Most recent value published to `tag`, if any.
    pub fn latest(&self, tag: &str) -> Option<Value> {
        self.locked().latest.get(tag).cloned()
    }

    /// Copy of the whole latest-results map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.locked().latest.clone()
    }

    pub fn subscriber_count(&self, tag: &str) -> usize {
        self.locked().subscribers.get(tag).map_or(0, |s| s.len())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.locked();
        f.debug_struct("StateStore")
            .field("tags", &inner.latest.len())
            .field(
                "subscriptions",
                &inner.subscribers.values().map(|s| s.len()).sum::<usize>(),
            )
            .finish()
    }
}

/// Snapshot the callbacks to invoke for `tag`, removing once-subscriptions
/// from the live list so they cannot fire twice.
fn claim_batch(inner: &mut StoreInner, tag: &str) -> Vec<Callback> {
    let Some(subs) = inner.subscribers.get_mut(tag) else {
        return Vec::new();
    };
    let mut batch = Vec::with_capacity(subs.len());
    let mut i = 0;
    while i < subs.len() {
        if subs[i].once {
            let sub = subs.remove(i);
            batch.push(sub.callback);
        } else {
            batch.push(std::sync::Arc::clone(&subs[i].callback));
            i += 1;
        }
    }
    if subs.is_empty() {
        inner.subscribers.remove(tag);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_without_subscribers_still_records_latest() {
        let store = StateStore::new();
        store.publish("lonely", json!(7));
        assert_eq!(store.latest("lonely"), Some(json!(7)));
        assert_eq!(store.subscriber_count("lonely"), 0);
    }

    #[test]
    fn test_subscribe_then_publish_delivers_synchronously() {
        let store = StateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = Arc::clone(&seen);
        store.subscribe("t", move |v| seen2.lock().unwrap().push(v.clone()));

        store.publish("t", json!("first"));
        // Delivery happened inside the publish call, not later.
        assert_eq!(*seen.lock().unwrap(), vec![json!("first")]);

        store.publish("t", json!("second"));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dispatch_order_is_subscription_order() {
        let store = StateStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            store.subscribe("t", move |_| order.lock().unwrap().push(label));
        }
        store.publish("t", json!(1));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe_before_publish_delivers_nothing() {
        let store = StateStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let id = store.subscribe("t", move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.unsubscribe("t", id));
        assert!(!store.unsubscribe("t", id));

        store.publish("t", json!(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_all_reports_count() {
        let store = StateStore::new();
        store.subscribe("t", |_| {});
        store.subscribe("t", |_| {});
        assert_eq!(store.unsubscribe_all("t"), 2);
        assert_eq!(store.unsubscribe_all("t"), 0);
    }

    #[test]
    fn test_subscribe_once_fires_exactly_once() {
        let store = StateStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        store.subscribe_once("t", move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        store.publish("t", json!(1));
        store.publish("t", json!(2));
        store.publish("t", json!(3));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.subscriber_count("t"), 0);
    }

    #[test]
    fn test_nested_publish_is_drained_not_reentered() {
        let store = Arc::new(StateStore::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        // "a"'s subscriber publishes to "b" mid-dispatch; "b"'s value must be
        // delivered by the outer loop after "a" finishes, with no deadlock.
        let store2 = Arc::clone(&store);
        let order2 = Arc::clone(&order);
        store.subscribe("a", move |_| {
            order2.lock().unwrap().push("a:start");
            store2.publish("b", json!("nested"));
            order2.lock().unwrap().push("a:end");
        });
        let order3 = Arc::clone(&order);
        store.subscribe("b", move |v| {
            order3.lock().unwrap().push(if v == &json!("nested") {
                "b"
            } else {
                "b:unexpected"
            });
        });

        store.publish("a", json!(1));
        assert_eq!(*order.lock().unwrap(), vec!["a:start", "a:end", "b"]);
        assert_eq!(store.latest("b"), Some(json!("nested")));
    }

    #[test]
    fn test_republish_to_same_tag_from_callback_terminates() {
        let store = Arc::new(StateStore::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let store2 = Arc::clone(&store);
        let hits2 = Arc::clone(&hits);
        store.subscribe("t", move |v| {
            let n = hits2.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                let next = v.as_i64().unwrap() + 1;
                store2.publish("t", json!(next));
            }
        });

        store.publish("t", json!(0));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(store.latest("t"), Some(json!(2)));
    }

    #[test]
    fn test_subscriber_added_during_dispatch_misses_inflight_value() {
        let store = Arc::new(StateStore::new());
        let late_hits = Arc::new(AtomicUsize::new(0));

        let store2 = Arc::clone(&store);
        let late_hits2 = Arc::clone(&late_hits);
        store.subscribe("t", move |_| {
            let late_hits3 = Arc::clone(&late_hits2);
            store2.subscribe("t", move |_| {
                late_hits3.fetch_add(1, Ordering::SeqCst);
            });
        });

        store.publish("t", json!(1));
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        store.publish("t", json!(2));
        // First publish added one late subscriber, second publish added
        // another; only the first of those sees the second value.
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }
}
