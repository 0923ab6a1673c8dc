use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

type Documents = BTreeMap<String, Value>;

/// JSON document store.
///
/// Every read and write goes through [`Store::transaction`], which holds the
/// store lock for the duration of the closure. Writes are buffered in the
/// transaction and only applied when the closure returns `Ok`, so a handler
/// that fails halfway leaves nothing behind.
pub struct Store {
    documents: Mutex<Documents>,
    path: Option<PathBuf>,
}

pub struct Transaction<'a> {
    base: &'a Documents,
    pending: BTreeMap<String, Option<Value>>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            documents: Mutex::new(Documents::new()),
            path: None,
        }
    }

    /// Opens a store backed by a JSON snapshot file, loading it when it exists.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let documents = if path.exists() {
            let raw = fs::read(&path)
                .with_context(|| format!("failed to read store snapshot {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("corrupt store snapshot {}", path.display()))?
        } else {
            Documents::new()
        };

        debug!(path = %path.display(), documents = documents.len(), "store opened");

        Ok(Self {
            documents: Mutex::new(documents),
            path: Some(path),
        })
    }

    pub fn transaction<R, E>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<anyhow::Error>,
    {
        // Writes are only applied after `f` succeeds, so a panic inside a
        // transaction never leaves partial state behind the poisoned lock
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tx = Transaction {
            base: &*documents,
            pending: BTreeMap::new(),
        };
        let result = f(&mut tx)?;
        let pending = tx.pending;

        if pending.is_empty() {
            return Ok(result);
        }

        for (key, value) in pending {
            match value {
                Some(value) => {
                    documents.insert(key, value);
                }
                None => {
                    documents.remove(&key);
                }
            }
        }

        if let Some(path) = &self.path {
            flush(path, &documents)?;
        }

        Ok(result)
    }
}

fn flush(path: &Path, documents: &Documents) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec(documents)?)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

impl Transaction<'_> {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let value = match self.pending.get(key) {
            Some(pending) => pending.as_ref(),
            None => self.base.get(key),
        };

        value
            .map(|v| {
                serde_json::from_value(v.clone()).with_context(|| format!("malformed document {key}"))
            })
            .transpose()
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.pending
            .insert(key.to_string(), Some(serde_json::to_value(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }

    pub fn exists(&self, key: &str) -> bool {
        match self.pending.get(key) {
            Some(pending) => pending.is_some(),
            None => self.base.contains_key(key),
        }
    }

    /// Reads an index list, treating a missing key as empty.
    pub fn get_list(&self, key: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get_json(key)?.unwrap_or_default())
    }

    pub fn push_list(&mut self, key: &str, item: &str) -> anyhow::Result<()> {
        let mut list = self.get_list(key)?;
        if !list.iter().any(|i| i == item) {
            list.push(item.to_string());
            self.set_json(key, &list)?;
        }
        Ok(())
    }

    pub fn prepend_list(&mut self, key: &str, item: &str) -> anyhow::Result<()> {
        let mut list = self.get_list(key)?;
        if !list.iter().any(|i| i == item) {
            list.insert(0, item.to_string());
            self.set_json(key, &list)?;
        }
        Ok(())
    }

    pub fn remove_from_list(&mut self, key: &str, item: &str) -> anyhow::Result<()> {
        let mut list = self.get_list(key)?;
        let before = list.len();
        list.retain(|i| i != item);
        if list.len() != before {
            if list.is_empty() {
                self.delete(key)?;
            } else {
                self.set_json(key, &list)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn failed_transaction_leaves_no_writes() {
        let store = Store::in_memory();

        let result: anyhow::Result<()> = store.transaction(|tx| {
            tx.set_json("a", &1)?;
            Err(anyhow!("boom"))
        });
        assert!(result.is_err());

        let a: Option<i32> = store.transaction(|tx| tx.get_json("a")).unwrap();
        assert_eq!(a, None);
    }

    #[test]
    fn reads_see_pending_writes_and_deletes() {
        let store = Store::in_memory();
        store
            .transaction(|tx| tx.set_json("k", &"v"))
            .unwrap();

        store
            .transaction::<_, anyhow::Error>(|tx| {
                assert_eq!(tx.get_json::<String>("k")?.as_deref(), Some("v"));
                tx.delete("k")?;
                assert!(!tx.exists("k"));
                assert_eq!(tx.get_json::<String>("k")?, None);
                Ok(())
            })
            .unwrap();

        assert!(!store.transaction::<_, anyhow::Error>(|tx| Ok(tx.exists("k"))).unwrap());
    }

    #[test]
    fn lists_do_not_duplicate_items() {
        let store = Store::in_memory();
        let list = store
            .transaction::<_, anyhow::Error>(|tx| {
                tx.push_list("l", "a")?;
                tx.push_list("l", "a")?;
                tx.prepend_list("l", "b")?;
                tx.get_list("l")
            })
            .unwrap();
        assert_eq!(list, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn store_recovers_after_a_panicking_transaction() {
        let store = Store::in_memory();
        store.transaction(|tx| tx.set_json("kept", &1)).unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: anyhow::Result<()> = store.transaction(|tx| {
                tx.set_json("lost", &2)?;
                panic!("handler bug");
            });
        }));
        assert!(panicked.is_err());

        let (kept, lost) = store
            .transaction::<_, anyhow::Error>(|tx| Ok((tx.get_json::<i32>("kept")?, tx.exists("lost"))))
            .unwrap();
        assert_eq!(kept, Some(1));
        assert!(!lost);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = Store::open(&path).unwrap();
            store.transaction(|tx| tx.set_json("author:1", &"alice")).unwrap();
        }

        let store = Store::open(&path).unwrap();
        let name: Option<String> = store.transaction(|tx| tx.get_json("author:1")).unwrap();
        assert_eq!(name.as_deref(), Some("alice"));
    }
}
