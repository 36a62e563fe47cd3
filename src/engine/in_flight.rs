// src/engine/in_flight.rs

//! At-most-once execution per key.
//!
//! Concurrent callers asking for the same key share one underlying
//! future: the first caller runs it, the others wait for its value. The
//! entry is dropped once the value exists, so later callers start fresh
//! (and usually hit the result cache instead).

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct InFlight<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key` unless another caller already is. Returns the
    /// value and whether this caller was the one that produced it.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut ran = false;
        let value = cell
            .get_or_init(|| {
                ran = true;
                f()
            })
            .await
            .clone();

        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        if cells.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            cells.remove(&key);
        }

        (value, ran)
    }

    /// Number of keys currently executing.
    pub fn len(&self) -> usize {
        self.cells.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let in_flight: Arc<InFlight<&'static str, usize>> = Arc::new(InFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let in_flight = in_flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                in_flight
                    .run("process.build.web", || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        calls.fetch_add(1, Ordering::SeqCst) + 1
                    })
                    .await
            }));
        }

        let mut producers = 0;
        for handle in handles {
            let (value, ran) = handle.await.unwrap();
            assert_eq!(value, 1);
            producers += usize::from(ran);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(producers, 1);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn sequential_callers_run_again() {
        let in_flight: InFlight<u8, u8> = InFlight::new();
        let (_, first) = in_flight.run(1, || async { 1 }).await;
        let (_, second) = in_flight.run(1, || async { 2 }).await;
        assert!(first);
        assert!(second);
    }
}
