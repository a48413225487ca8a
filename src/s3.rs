//! Utility functions for creating s3 clients and the object store seam used by the builder
use crate::config::ObjectStoreSettings;
use crate::error::Result;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

pub async fn client_from_settings(settings: &ObjectStoreSettings) -> Client {
    let mut loader = aws_config::from_env().region(Region::new(settings.region.clone()));
    if let Some(profile_name) = &settings.profile {
        loader = loader.profile_name(profile_name);
    }
    let base_config = loader.load().await;

    let mut s3_config = aws_sdk_s3::config::Builder::from(&base_config)
        .region(Region::new(settings.region.clone()))
        .force_path_style(settings.force_path_style);
    if let Some(endpoint) = &settings.endpoint {
        s3_config = s3_config.endpoint_url(endpoint);
    }

    Client::from_conf(s3_config.build())
}

/// Object store primitives the catalog builder relies on.
///
/// Missing objects are reported as [`crate::error::SyncError::NotFound`]; every other failure is
/// a transport error owned by the implementation.
pub trait ObjectStore {
    /// Lists the `/`-delimited sub-prefixes directly below `prefix`.
    async fn list_common_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// Lists every object whose key starts with `prefix`, sorted by key.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>>;

    /// Returns the object size, or `None` when nothing is stored under `key`.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<Vec<u8>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;
}

/// Objects under `prefix` whose key ends with `suffix`.
pub async fn list_objects_with_suffix(
    store: &impl ObjectStore,
    bucket: &str,
    prefix: &str,
    suffix: &str,
) -> Result<Vec<ObjectSummary>> {
    let objects = store.list_objects(bucket, prefix).await?;
    Ok(objects
        .into_iter()
        .filter(|o| o.key.ends_with(suffix))
        .collect())
}
