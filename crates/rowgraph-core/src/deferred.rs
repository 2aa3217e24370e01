//! Deferred value cells.
//!
//! A `DeferredValue` sits in a property slot in place of a value that is
//! expensive to obtain (a nested query) or that cannot be read yet (a cached
//! result whose owner is still being built). The loader runs on the first
//! `resolve` and its outcome, value or error, answers every later read.

use crate::error::{Error, Result};
use crate::object::Datum;
use std::fmt;
use std::sync::OnceLock;

/// Capability for producing a deferred value on first access.
pub trait ValueLoader: Send + Sync {
    /// Produce the value. Called at most once per cell.
    fn load(&self) -> Result<Datum>;

    /// Short description used in debug output.
    fn describe(&self) -> String {
        "deferred value".to_string()
    }
}

/// A value holder evaluated on first read.
///
/// Concurrent readers block until the first load finishes. A failed load
/// is recorded like a value; later reads get a copy of the same error.
pub struct DeferredValue {
    loader: Box<dyn ValueLoader>,
    outcome: OnceLock<std::result::Result<Datum, Error>>,
}

impl DeferredValue {
    /// Create an unresolved cell around a loader.
    pub fn new(loader: impl ValueLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            outcome: OnceLock::new(),
        }
    }

    /// Resolve the value, running the loader if this is the first read.
    pub fn resolve(&self) -> Result<Datum> {
        let outcome = self.outcome.get_or_init(|| {
            tracing::debug!(loader = %self.loader.describe(), "Resolving deferred value");
            let outcome = self.loader.load();
            if let Err(e) = &outcome {
                tracing::debug!(loader = %self.loader.describe(), error = %e, "Deferred load failed");
            }
            outcome
        });
        match outcome {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(e.replay()),
        }
    }

    /// Check if the loader has run, whatever its outcome.
    pub fn is_loaded(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// The loaded value without triggering a load. `None` before the first
    /// read and after a failed one.
    pub fn peek(&self) -> Option<&Datum> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok())
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.outcome.get() {
            None => "unloaded",
            Some(Ok(_)) => "loaded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("DeferredValue")
            .field("loader", &self.loader.describe())
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl ValueLoader for CountingLoader {
        fn load(&self) -> Result<Datum> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(Error::Custom("first load fails".to_string()));
            }
            Ok(Datum::Scalar(Value::Int(7)))
        }
    }

    #[test]
    fn test_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = DeferredValue::new(CountingLoader {
            calls: Arc::clone(&calls),
            fail_first: false,
        });

        assert!(!cell.is_loaded());
        assert_eq!(cell.resolve().unwrap(), Datum::Scalar(Value::Int(7)));
        assert_eq!(cell.resolve().unwrap(), Datum::Scalar(Value::Int(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cell.is_loaded());
    }

    #[test]
    fn test_failed_load_is_recorded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = DeferredValue::new(CountingLoader {
            calls: Arc::clone(&calls),
            fail_first: true,
        });

        let first = cell.resolve().unwrap_err();
        assert!(cell.is_loaded());
        assert_eq!(cell.peek(), None);
        let second = cell.resolve().unwrap_err();
        assert_eq!(second.to_string(), first.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(format!("{:?}", cell).contains("failed"));
    }

    #[test]
    fn test_shared_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cell = Arc::new(DeferredValue::new(CountingLoader {
            calls: Arc::clone(&calls),
            fail_first: false,
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                std::thread::spawn(move || cell.resolve().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Datum::Scalar(Value::Int(7)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_shows_state() {
        let cell = DeferredValue::new(CountingLoader {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first: false,
        });
        assert!(format!("{:?}", cell).contains("unloaded"));
        cell.resolve().unwrap();
        assert!(format!("{:?}", cell).contains("loaded"));
    }
}
