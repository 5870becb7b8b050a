use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::KeyValueStore;
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum Slot {
    Value(String),
    Set(HashSet<String>),
}

/// In-process store with Redis-like semantics.
///
/// Used by tests and by single-node runs where no Redis URL is configured.
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

fn wrong_type(key: &str) -> Error {
    Error::Internal(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.get(key).as_deref() {
            None => Ok(None),
            Some(Slot::Value(value)) => Ok(Some(value.clone())),
            Some(Slot::Set(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), Slot::Value(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<()> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Set(members) => {
                    members.insert(member.to_string());
                    Ok(())
                }
                Slot::Value(_) => Err(wrong_type(key)),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Set(HashSet::from([member.to_string()])));
                Ok(())
            }
        }
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<()> {
        let Entry::Occupied(mut occupied) = self.entries.entry(key.to_string()) else {
            return Ok(());
        };
        let emptied = match occupied.get_mut() {
            Slot::Set(members) => {
                members.remove(member);
                members.is_empty()
            }
            Slot::Value(_) => return Err(wrong_type(key)),
        };
        if emptied {
            occupied.remove();
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        match self.entries.get(key).as_deref() {
            None => Ok(Vec::new()),
            Some(Slot::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Slot::Value(_)) => Err(wrong_type(key)),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

/// Glob match supporting only `*`, which is all the registry needs.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !candidate.starts_with(first) || candidate.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &candidate[first.len()..];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("p:conn:*", "p:conn:abc"));
        assert!(glob_match("p:conn:*", "p:conn:"));
        assert!(!glob_match("p:conn:*", "p:identity:alice:conns"));
        assert!(glob_match("p:*:conns", "p:identity:alice:conns"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(!glob_match("a*b*c", "acb"));
    }

    #[tokio::test]
    async fn test_string_values() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_membership_and_empty_set_removal() {
        let store = MemoryStore::new();
        store.add_to_set("s", "a").await.unwrap();
        store.add_to_set("s", "b").await.unwrap();
        store.add_to_set("s", "a").await.unwrap();

        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        store.remove_from_set("s", "a").await.unwrap();
        store.remove_from_set("s", "b").await.unwrap();
        assert!(!store.contains_key("s"));
        assert!(store.set_members("s").await.unwrap().is_empty());

        // Removing from a missing set is fine
        store.remove_from_set("s", "zzz").await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.add_to_set("k", "m").await.is_err());
        assert!(store.set_members("k").await.is_err());
    }

    #[tokio::test]
    async fn test_scan_keys() {
        let store = MemoryStore::new();
        store.set("p:conn:1", "{}").await.unwrap();
        store.set("p:conn:2", "{}").await.unwrap();
        store.add_to_set("p:identity:a:conns", "1").await.unwrap();

        let mut keys = store.scan_keys("p:conn:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["p:conn:1", "p:conn:2"]);
    }
}
