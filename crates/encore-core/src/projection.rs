//! Reactive projection: a dataflow node that derives a view value from the
//! settings flags plus an async downstream query, re-running the query when
//! the combined key changes (and only then) or when the refresh bus fires.
//!
//! Switch-to-latest: a key change aborts any in-flight query, so only the
//! latest key's result is ever published downstream.

use crate::settings::Flags;
use crate::signal::RefreshListener;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Projection<V> {
    value_rx: watch::Receiver<V>,
    loading_rx: watch::Receiver<bool>,
    driver: JoinHandle<()>,
}

impl<V> Projection<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build the node and issue the first query for the initial key.
    /// `initial` is exposed until that query completes.
    ///
    /// `key_fn` extracts the combined key: the subset of upstream state that
    /// actually affects the transform. Upstream changes that leave the key
    /// equal are deduplicated and issue no query.
    pub fn new<K, KF, QF, Fut>(
        mut flags_rx: watch::Receiver<Flags>,
        mut refresh: RefreshListener,
        initial: V,
        key_fn: KF,
        query: QF,
    ) -> Self
    where
        K: Clone + PartialEq + Send + 'static,
        KF: Fn(&Flags) -> K + Send + 'static,
        QF: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (value_tx, value_rx) = watch::channel(initial);
        let (loading_tx, loading_rx) = watch::channel(false);
        let value_tx = Arc::new(value_tx);
        let loading_tx = Arc::new(loading_tx);

        let driver = tokio::spawn(async move {
            let respawn = |inflight: &mut Option<JoinHandle<()>>, key: K| {
                if let Some(prior) = inflight.take() {
                    prior.abort();
                }
                loading_tx.send_replace(true);
                let fut = query(key);
                let value_tx = Arc::clone(&value_tx);
                let loading_tx = Arc::clone(&loading_tx);
                *inflight = Some(tokio::spawn(async move {
                    let value = fut.await;
                    value_tx.send_replace(value);
                    loading_tx.send_replace(false);
                }));
            };

            let mut key = key_fn(&flags_rx.borrow_and_update());
            let mut inflight: Option<JoinHandle<()>> = None;
            let mut refresh_open = true;

            respawn(&mut inflight, key.clone());

            loop {
                tokio::select! {
                    changed = flags_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = key_fn(&flags_rx.borrow_and_update());
                        if next == key {
                            continue;
                        }
                        key = next;
                        respawn(&mut inflight, key.clone());
                    }
                    alive = refresh.changed(), if refresh_open => {
                        if !alive {
                            // Bus gone; keep serving flag changes.
                            refresh_open = false;
                            continue;
                        }
                        // Forced re-pull of the current key.
                        respawn(&mut inflight, key.clone());
                    }
                }
            }

            if let Some(prior) = inflight.take() {
                prior.abort();
            }
        });

        Self {
            value_rx,
            loading_rx,
            driver,
        }
    }

    /// Watch the computed value. Receivers only ever see fully computed
    /// values, never partial ones.
    pub fn subscribe(&self) -> watch::Receiver<V> {
        self.value_rx.clone()
    }

    pub fn latest(&self) -> V {
        self.value_rx.borrow().clone()
    }

    /// Advisory in-flight flag for loading indicators; not required for
    /// downstream correctness.
    pub fn is_loading(&self) -> bool {
        *self.loading_rx.borrow()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading_rx.clone()
    }
}

impl<V> Drop for Projection<V> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
