//! An in-memory implementation of `ObjectStore`, intended primarily for testing.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use md5::Md5;
use sha2::Digest;

use super::{Error, ObjectStore, ObjectSummary, PutOptions, Result};

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    /// Lower-case hex MD5 of `data`, as S3 reports for single-part uploads.
    pub etag: String,
    pub options: PutOptions,
}

impl StoredObject {
    fn new(data: Vec<u8>, options: PutOptions) -> Self {
        let etag = format!("{:x}", Md5::digest(&data));
        Self {
            data,
            etag,
            options,
        }
    }
}

/// Builder for [`MemoryObjectStore`].
pub struct MemoryObjectStoreBuilder {
    bucket: String,
    bucket_exists: bool,
    objects: BTreeMap<String, StoredObject>,
    failing_keys: HashSet<String>,
}

impl MemoryObjectStoreBuilder {
    /// Pre-populate an object.
    pub fn with_object(mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.objects.insert(
            key.into(),
            StoredObject::new(data.into(), PutOptions::default()),
        );
        self
    }

    /// Make every upload to `key` fail.
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Report the bucket as missing.
    pub fn without_bucket(mut self) -> Self {
        self.bucket_exists = false;
        self
    }

    pub fn build(self) -> MemoryObjectStore {
        MemoryObjectStore {
            bucket: self.bucket,
            bucket_exists: self.bucket_exists,
            objects: RwLock::new(self.objects),
            failing_keys: self.failing_keys,
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
        }
    }
}

/// A bucket kept in memory, with call counters for assertions.
pub struct MemoryObjectStore {
    bucket: String,
    bucket_exists: bool,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    failing_keys: HashSet<String>,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store for `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::builder(bucket).build()
    }

    pub fn builder(bucket: impl Into<String>) -> MemoryObjectStoreBuilder {
        MemoryObjectStoreBuilder {
            bucket: bucket.into(),
            bucket_exists: true,
            objects: BTreeMap::new(),
            failing_keys: HashSet::new(),
        }
    }

    /// Get a copy of the object stored under `key`.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().unwrap().get(key).cloned()
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().unwrap().keys().cloned().collect()
    }

    /// Number of `list_objects` calls made so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `put_object` calls made so far, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket_exists)
    }

    async fn list_objects(
        &self,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<Vec<ObjectSummary>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.bucket_exists {
            return Err(Error::BucketNotFound(self.bucket.clone()));
        }

        let objects = self.objects.read().unwrap();
        let lower = match marker {
            Some(marker) => Bound::Excluded(marker.to_string()),
            None => Bound::Unbounded,
        };

        Ok(objects
            .range((lower, Bound::Unbounded))
            .take(max_keys as usize)
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                etag: Some(obj.etag.clone()),
            })
            .collect())
    }

    async fn put_object(&self, key: &str, source: &Path, options: PutOptions) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_keys.contains(key) {
            return Err(Error::Other(format!("simulated upload failure for {}", key)));
        }

        let data = tokio::fs::read(source).await?;
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), StoredObject::new(data, options));
        Ok(())
    }
}
