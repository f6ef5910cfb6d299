use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};

/// In-process single-flight table: concurrent callers for one key share the
/// outcome of a single execution.
///
/// Entries live only while a call is in flight; a call that starts after the
/// previous one finished runs again (and is expected to find the cache warm).
pub struct FlightTable<K, V> {
    inflight: Mutex<HashMap<K, Arc<OnceLock<V>>>>,
}

impl<K, V> Default for FlightTable<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> FlightTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless another thread already is, in which case
    /// wait for and return its result. The flag is true for the caller that
    /// actually ran `work`.
    pub fn run(&self, key: &K, work: impl FnOnce() -> V) -> (V, bool) {
        let cell = {
            let mut inflight = self
                .inflight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(inflight.entry(key.clone()).or_default())
        };

        let mut led = false;
        let value = cell
            .get_or_init(|| {
                led = true;
                work()
            })
            .clone();

        if led {
            let mut inflight = self
                .inflight
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if inflight.get(key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(key);
            }
        }
        (value, led)
    }

    pub fn in_flight(&self) -> usize {
        self.inflight
            .lock()
            .map(|m| m.len())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn concurrent_callers_share_one_execution() {
        let table: FlightTable<&str, usize> = FlightTable::new();
        let runs = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<(usize, bool)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        table.run(&"a:b:1.0", || {
                            std::thread::sleep(Duration::from_millis(100));
                            runs.fetch_add(1, Ordering::SeqCst) + 41
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|(v, _)| *v == 41));
        assert_eq!(results.iter().filter(|(_, led)| *led).count(), 1);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn sequential_calls_run_again() {
        let table: FlightTable<u32, u32> = FlightTable::new();
        assert_eq!(table.run(&1, || 10), (10, true));
        assert_eq!(table.run(&1, || 20), (20, true));
    }

    #[test]
    fn distinct_keys_do_not_wait_for_each_other() {
        let table: FlightTable<u32, u32> = FlightTable::new();
        let runs = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for key in 0..4 {
                let table = &table;
                let runs = &runs;
                s.spawn(move || {
                    table.run(&key, || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        key
                    })
                });
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }
}
