//! Write-once store of decompiled members.
//!
//! Decompilation is deterministic, so it is safe to let two threads that miss on the same
//! member both compute it: the first result inserted wins, and the second caller receives the
//! stored entry instead of its own. No lock is held while a factory runs, which keeps
//! recursive decompilation (a member inlining another one through the same cache) free of
//! self-deadlock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{decompiler::entry::DecompiledEntry, metadata::MemberId, Error, Result};

/// Concurrent cache of [`DecompiledEntry`] values keyed by member identity.
///
/// Failures are not stored unless the cache was created with
/// [`DecompiledCache::with_failures`], so a later attempt (after registering more members,
/// say) decompiles again. [`Error::RecursionLimit`] is never stored: it depends on the
/// inlining path that reached the member, not on the member.
#[derive(Debug, Default)]
pub struct DecompiledCache {
    entries: DashMap<MemberId, Result<Arc<DecompiledEntry>>>,
    cache_failures: bool,
}

impl DecompiledCache {
    /// Creates an empty cache that does not keep failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache that also keeps failures, so a member that failed once fails
    /// again without being decompiled a second time.
    #[must_use]
    pub fn with_failures() -> Self {
        DecompiledCache {
            entries: DashMap::new(),
            cache_failures: true,
        }
    }

    /// Returns the entry stored for `key`, creating it with `factory` on first use.
    ///
    /// Concurrent callers that miss on the same key may each run `factory`; all of them
    /// observe the entry that was inserted first, and no caller after that insert runs it.
    ///
    /// # Errors
    /// The error returned by `factory`, or the stored failure when failures are cached.
    pub fn get_or_create<F>(&self, key: &MemberId, factory: F) -> Result<Arc<DecompiledEntry>>
    where
        F: FnOnce() -> Result<DecompiledEntry>,
    {
        if let Some(hit) = self.entries.get(key) {
            log::debug!("Decompiled cache hit for {}", key);
            return hit.value().clone();
        }

        let created = factory().map(Arc::new);
        if let Err(err) = &created {
            if !self.cache_failures || matches!(err.root_cause(), Error::RecursionLimit(_)) {
                return created;
            }
        }

        let stored = self.entries.entry(key.clone()).or_insert(created);
        stored.value().clone()
    }

    /// The stored result for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &MemberId) -> Option<Result<Arc<DecompiledEntry>>> {
        self.entries.get(key).map(|hit| hit.value().clone())
    }

    /// `true` if a result is stored for `key`.
    #[must_use]
    pub fn contains(&self, key: &MemberId) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Members whose stored result is a failure, with that failure.
    #[must_use]
    pub fn failures(&self) -> Vec<(MemberId, Error)> {
        self.entries
            .iter()
            .filter_map(|item| match item.value() {
                Ok(_) => None,
                Err(err) => Some((item.key().clone(), err.clone())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rayon::prelude::*;

    use super::*;
    use crate::{
        expression::Expr,
        metadata::{MethodRef, TypeSignature},
    };

    fn make(name: &str) -> (MemberId, DecompiledEntry) {
        let method = Arc::new(
            MethodRef::getter(TypeSignature::class("Employee"), name, TypeSignature::I4),
        );
        let entry = DecompiledEntry {
            member: method.id(),
            method: method.clone(),
            params: Vec::new(),
            body: Expr::int(1),
        };
        (method.id(), entry)
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = DecompiledCache::new();
        let (key, entry) = make("A");
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_create(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(entry.clone())
            })
            .unwrap();
        let second = cache
            .get_or_create(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(entry.clone())
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_not_cached_by_default() {
        let cache = DecompiledCache::new();
        let (key, entry) = make("B");

        let failed = cache.get_or_create(&key, || Err(Error::RecursionLimit(1)));
        assert_eq!(failed.unwrap_err(), Error::RecursionLimit(1));
        assert!(!cache.contains(&key));

        assert!(cache.get_or_create(&key, || Ok(entry)).is_ok());
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_failures_cached_on_request() {
        let cache = DecompiledCache::with_failures();
        let (key, entry) = make("C");

        let missing = Error::NotDecompilable("Employee::get_C".to_string());
        let _ = cache.get_or_create(&key, || Err(missing.clone()));
        let again = cache.get_or_create(&key, || Ok(entry));
        assert_eq!(again.unwrap_err(), missing);
        assert_eq!(cache.failures().len(), 1);
    }

    #[test]
    fn test_depth_failures_are_never_cached() {
        let cache = DecompiledCache::with_failures();
        let (key, entry) = make("E");

        let failed = cache.get_or_create(&key, || Err(Error::RecursionLimit(3)));
        assert_eq!(failed.unwrap_err(), Error::RecursionLimit(3));
        assert!(!cache.contains(&key));
        assert!(cache.get_or_create(&key, || Ok(entry)).is_ok());
    }

    #[test]
    fn test_concurrent_first_use_agrees() {
        let cache = DecompiledCache::new();
        let (key, entry) = make("D");

        let runs = AtomicUsize::new(0);
        let factory = || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(entry.clone())
        };

        let results = (0..32)
            .into_par_iter()
            .map(|_| cache.get_or_create(&key, factory).unwrap())
            .collect::<Vec<_>>();

        let first = &results[0];
        assert!(results.iter().all(|r| Arc::ptr_eq(r, first)));
        assert_eq!(cache.len(), 1);

        // Racing misses may each build; once stored, nobody builds again.
        let raced = runs.load(Ordering::SeqCst);
        assert!((1..=32).contains(&raced));
        for _ in 0..8 {
            assert!(Arc::ptr_eq(&cache.get_or_create(&key, factory).unwrap(), first));
        }
        assert_eq!(runs.load(Ordering::SeqCst), raced);
    }
}
