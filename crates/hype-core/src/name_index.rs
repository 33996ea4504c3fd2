//! Name completion.
//!
//! [`NameIndex`] maps partial or aliased tokens to canonical names. Every
//! canonical name and alias is reduced to a lookup key by [`normalize`]
//! (lower-cased, everything except letters and digits stripped), and a key
//! belongs to at most one canonical name.
//!
//! Resolution order:
//!
//! 1. an exact key match wins;
//! 2. otherwise every key starting with the normalized query is collected;
//! 3. a single distinct canonical name is returned as is;
//! 4. several candidates are ordered shortest first, then lexicographically,
//!    and either reported as [`ResolveError::Ambiguous`] or, in
//!    [`ResolveMode::AutoPickShortest`], resolved to the shortest one when it
//!    is strictly shorter than every other candidate.
//!
//! The index is built once and then shared read-only, usually behind an
//! `Arc`. It has no interior mutability.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::error::{IndexError, ResolveError};

/// Reduces a name to its lookup key.
///
/// ```rust,ignore
/// assert_eq!(normalize("Lee Sin"), "leesin");
/// assert_eq!(normalize("Kai'Sa"), "kaisa");
/// ```
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// How ties between several prefix matches are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Always report ambiguity when more than one name matches.
    #[default]
    Strict,
    /// Pick the shortest candidate when it is unique in length.
    AutoPickShortest,
}

/// Lookup table from normalized keys to canonical names.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: Vec<String>,
    keys: BTreeMap<String, usize>,
}

impl NameIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a canonical name together with its aliases.
    ///
    /// Registration is all-or-nothing: if any derived key is owned by a
    /// different canonical name, nothing is inserted. Registering the same
    /// canonical name again adds its new aliases.
    pub fn register<I, S>(&mut self, canonical: &str, aliases: I) -> Result<(), IndexError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut derived = Vec::new();
        for name in std::iter::once(canonical.to_string())
            .chain(aliases.into_iter().map(|a| a.as_ref().to_string()))
        {
            let key = normalize(&name);
            if key.is_empty() {
                return Err(IndexError::EmptyKey(name));
            }
            if let Some(&owner) = self.keys.get(&key) {
                if self.names[owner] != canonical {
                    return Err(IndexError::DuplicateKey {
                        key,
                        existing: self.names[owner].clone(),
                        attempted: canonical.to_string(),
                    });
                }
            }
            derived.push(key);
        }

        let slot = match self.names.iter().position(|n| n == canonical) {
            Some(slot) => slot,
            None => {
                self.names.push(canonical.to_string());
                self.names.len() - 1
            }
        };
        for key in derived {
            self.keys.insert(key, slot);
        }
        Ok(())
    }

    /// Resolves a query to a canonical name.
    pub fn resolve(&self, query: &str, mode: ResolveMode) -> Result<&str, ResolveError> {
        let key = normalize(query);
        if key.is_empty() {
            return Err(ResolveError::NotFound {
                query: query.to_string(),
            });
        }
        if let Some(&slot) = self.keys.get(&key) {
            return Ok(&self.names[slot]);
        }

        let candidates = self.candidates_for_key(&key);
        match candidates.as_slice() {
            [] => Err(ResolveError::NotFound {
                query: query.to_string(),
            }),
            [only] => Ok(*only),
            [first, second, ..] => {
                let shortest_is_unique = first.chars().count() < second.chars().count();
                if mode == ResolveMode::AutoPickShortest && shortest_is_unique {
                    Ok(*first)
                } else {
                    Err(ResolveError::Ambiguous {
                        query: query.to_string(),
                        candidates: candidates.iter().map(|c| c.to_string()).collect(),
                    })
                }
            }
        }
    }

    /// Canonical names whose keys start with the normalized query, shortest
    /// first then lexicographic.
    pub fn candidates(&self, query: &str) -> Vec<&str> {
        let key = normalize(query);
        if key.is_empty() {
            return Vec::new();
        }
        self.candidates_for_key(&key)
    }

    fn candidates_for_key(&self, key: &str) -> Vec<&str> {
        let slots: BTreeSet<usize> = self
            .keys
            .range::<str, _>((Bound::Included(key), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(key))
            .map(|(_, &slot)| slot)
            .collect();
        let mut names: Vec<&str> = slots.into_iter().map(|s| self.names[s].as_str()).collect();
        names.sort_by(|a, b| a.chars().count().cmp(&b.chars().count()).then_with(|| a.cmp(b)));
        names
    }

    /// Returns `true` if the exact name or alias is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(&normalize(name))
    }

    /// Registered canonical names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of canonical names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &[&str])]) -> NameIndex {
        let mut index = NameIndex::new();
        for (name, aliases) in entries {
            index.register(name, aliases.iter()).unwrap();
        }
        index
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Lee Sin"), "leesin");
        assert_eq!(normalize("Kai'Sa"), "kaisa");
        assert_eq!(normalize("!!"), "");
    }

    #[test]
    fn test_alias_round_trip() {
        let index = index(&[("foo", &["f"])]);
        assert_eq!(index.resolve("f", ResolveMode::Strict).unwrap(), "foo");
        assert_eq!(index.resolve("foo", ResolveMode::Strict).unwrap(), "foo");
        assert_eq!(index.resolve("FOO", ResolveMode::Strict).unwrap(), "foo");
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let index = index(&[("help", &["h"]), ("reset", &[]), ("stock", &["quote"])]);
        for query in ["hel", "res", "rese", "st", "sto", "qu", "quo"] {
            let expected = match query.chars().next() {
                Some('h') => "help",
                Some('r') => "reset",
                _ => "stock",
            };
            assert_eq!(index.resolve(query, ResolveMode::Strict).unwrap(), expected);
        }
    }

    #[test]
    fn test_duplicate_key_rejected_atomically() {
        let mut index = index(&[("help", &["h"])]);
        let err = index.register("hype", ["hy", "h"]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DuplicateKey {
                key: "h".into(),
                existing: "help".into(),
                attempted: "hype".into(),
            }
        );
        assert!(!index.contains("hy"));
        assert!(!index.contains("hype"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_duplicate_after_normalization() {
        let mut index = index(&[("lee sin", &[])]);
        assert!(matches!(
            index.register("LeeSin", Vec::<&str>::new()),
            Err(IndexError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_reregister_adds_aliases() {
        let mut index = index(&[("coins", &["c"])]);
        index.register("coins", ["c", "bal"]).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve("bal", ResolveMode::Strict).unwrap(), "coins");
    }

    #[test]
    fn test_empty_key() {
        let mut index = NameIndex::new();
        assert_eq!(
            index.register("ok", ["--"]),
            Err(IndexError::EmptyKey("--".into()))
        );
        assert!(index.is_empty());
    }

    #[test]
    fn test_ambiguity_ordering() {
        let index = index(&[("stats", &[]), ("stock", &[]), ("st", &[]), ("status", &[])]);
        assert_eq!(index.resolve("st", ResolveMode::Strict).unwrap(), "st");
        match index.resolve("sta", ResolveMode::Strict) {
            Err(ResolveError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["stats", "status"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_auto_pick_shortest() {
        let index = index(&[("stat", &[]), ("stats", &[]), ("stock", &[]), ("steal", &[])]);
        assert_eq!(
            index.resolve("sta", ResolveMode::AutoPickShortest).unwrap(),
            "stat"
        );
        assert!(matches!(
            index.resolve("sta", ResolveMode::Strict),
            Err(ResolveError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_auto_pick_never_breaks_equal_lengths() {
        let index = index(&[("stock", &[]), ("steal", &[])]);
        match index.resolve("st", ResolveMode::AutoPickShortest) {
            Err(ResolveError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["steal", "stock"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_alias_prefix_counts_once() {
        let index = index(&[("coins", &["coin", "coinz"])]);
        assert_eq!(index.resolve("co", ResolveMode::Strict).unwrap(), "coins");
        assert_eq!(index.candidates("co"), vec!["coins"]);
    }

    #[test]
    fn test_not_found() {
        let index = index(&[("help", &[])]);
        assert!(matches!(
            index.resolve("zzz", ResolveMode::AutoPickShortest),
            Err(ResolveError::NotFound { .. })
        ));
        assert!(matches!(
            index.resolve("", ResolveMode::AutoPickShortest),
            Err(ResolveError::NotFound { .. })
        ));
    }
}
