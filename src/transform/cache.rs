//! Per-run deduplication of stubs.

use std::collections::HashMap;

use crate::{
    metadata::{token::Token, userstring::UserString},
    transform::encoding::EncodingPlan,
    Result,
};

/// Identity of a stub: identical content under an identical plan shares one stub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// The literal, compared code unit by code unit
    pub content: UserString,
    /// UTF-16 payload
    pub wide: bool,
    /// Length-based reconstruction
    pub explicit_length: bool,
}

impl DedupKey {
    /// Key for `content` encoded with `plan`
    #[must_use]
    pub fn new(content: &UserString, plan: EncodingPlan) -> Self {
        DedupKey {
            content: content.clone(),
            wide: plan.wide,
            explicit_length: plan.explicit_length,
        }
    }
}

/// Maps each [`DedupKey`] to the stub created for it during one run.
///
/// ```rust
/// use dotstub::metadata::token::Token;
/// use dotstub::transform::cache::{DedupCache, DedupKey};
/// use dotstub::transform::encoding::select;
/// use dotstub::metadata::userstring::UserString;
///
/// let mut cache = DedupCache::new();
/// let content = UserString::from("Hi");
/// let key = DedupKey::new(&content, select(&content));
///
/// let first = cache.get_or_create(key.clone(), || Ok(Token::new(0x06000010)))?;
/// let again = cache.get_or_create(key, || unreachable!())?;
/// assert_eq!(first, again);
/// assert_eq!((cache.len(), cache.hits(), cache.misses()), (1, 1, 1));
/// # Ok::<(), dotstub::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct DedupCache {
    stubs: HashMap<DedupKey, Token>,
    hits: usize,
    misses: usize,
}

impl DedupCache {
    /// An empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stub for `key`, calling `factory` to create it on a miss.
    ///
    /// # Errors
    /// Propagates the factory's error; nothing is cached in that case.
    pub fn get_or_create<F>(&mut self, key: DedupKey, factory: F) -> Result<Token>
    where
        F: FnOnce() -> Result<Token>,
    {
        if let Some(token) = self.stubs.get(&key) {
            self.hits += 1;
            return Ok(*token);
        }

        let token = factory()?;
        self.misses += 1;
        self.stubs.insert(key, token);
        Ok(token)
    }

    /// Number of distinct stubs
    #[must_use]
    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    /// Returns true if no stub was created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    /// Lookups answered from the cache
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Lookups that created a stub
    #[must_use]
    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transform::encoding::select, Error};

    fn key(content: UserString) -> DedupKey {
        DedupKey::new(&content, select(&content))
    }

    #[test]
    fn plan_is_part_of_the_key() {
        let narrow = key("a".into());
        let mut forced = narrow.clone();
        forced.explicit_length = true;
        assert_ne!(narrow, forced);

        let mut cache = DedupCache::new();
        let a = cache.get_or_create(narrow, || Ok(Token::new(0x06000001))).unwrap();
        let b = cache.get_or_create(forced, || Ok(Token::new(0x06000002))).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn factory_error_inserts_nothing() {
        let mut cache = DedupCache::new();
        let key = key("x".into());

        let result = cache.get_or_create(key.clone(), || Err(Error::Error("boom".into())));
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);

        let token = cache.get_or_create(key, || Ok(Token::new(0x06000003))).unwrap();
        assert_eq!(token, Token::new(0x06000003));
    }

    #[test]
    fn factory_runs_once_per_key() {
        let mut cache = DedupCache::new();
        let mut calls = 0;
        for _ in 0..5 {
            cache
                .get_or_create(key("same".into()), || {
                    calls += 1;
                    Ok(Token::new(0x06000001))
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 4);
    }

    #[test]
    fn distinct_lone_surrogates_get_distinct_stubs() {
        // both render as U+FFFD when converted lossily
        let high = key(UserString::from_units(vec![0xD800]));
        let low = key(UserString::from_units(vec![0xDC00]));
        assert_ne!(high, low);

        let mut cache = DedupCache::new();
        cache.get_or_create(high, || Ok(Token::new(0x06000001))).unwrap();
        cache.get_or_create(low, || Ok(Token::new(0x06000002))).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 0);
    }
}
