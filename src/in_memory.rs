use crate::error::{Result, SyncError};
use crate::s3::{ObjectStore, ObjectSummary};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Object store kept entirely in memory, keyed by `(bucket, key)`.
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    puts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object without counting it as a write.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .expect("object map lock poisoned")
            .insert((bucket.to_owned(), key.to_owned()), body.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .expect("object map lock poisoned")
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Number of `put_object` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn keys_under(&self, bucket: &str, prefix: &str) -> Vec<(String, u64)> {
        self.objects
            .read()
            .expect("object map lock poisoned")
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), v)| (k.clone(), v.len() as u64))
            .collect()
    }
}

impl ObjectStore for InMemoryStore {
    async fn list_common_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let prefixes: BTreeSet<String> = self
            .keys_under(bucket, prefix)
            .into_iter()
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                rest.find('/')
                    .map(|end| format!("{}{}", prefix, &rest[..=end]))
            })
            .collect();
        Ok(prefixes.into_iter().collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        Ok(self
            .keys_under(bucket, prefix)
            .into_iter()
            .map(|(key, size)| ObjectSummary { key, size })
            .collect())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        Ok(self.get(bucket, key).map(|body| body.len() as u64))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get(bucket, key).ok_or_else(|| SyncError::NotFound {
            key: key.to_owned(),
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>> {
        let body = self.get_object(bucket, key).await?;
        let start = (start_byte as usize).min(body.len());
        let end = (end_byte as usize).saturating_add(1).min(body.len());
        Ok(body[start..end.max(start)].to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.insert(bucket, key, body);
        Ok(())
    }
}
