//! Catalog documents in the object store: deterministic keys, hrefs and existence-checked io.
use crate::config::ObjectStoreSettings;
use crate::document::JSON_MEDIA_TYPE;
use crate::error::{Result, SyncError};
use crate::s3::ObjectStore;
use crate::s3_operations::S3Object;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Key layout of the catalog below the stac root prefix.
#[derive(Debug, Clone)]
pub struct CatalogKeys {
    root: String,
}

impl CatalogKeys {
    pub fn new(stac_key: &str) -> Self {
        Self {
            root: stac_key.trim_end_matches('/').to_owned(),
        }
    }

    pub fn catalog(&self) -> String {
        format!("{}/catalog.json", self.root)
    }

    pub fn collection(&self, sensor_id: &str) -> String {
        format!("{}/{}/collection.json", self.root, sensor_id)
    }

    pub fn item(&self, sensor_id: &str, item_id: &str) -> String {
        format!("{}/{}/{}/{}.json", self.root, sensor_id, item_id, item_id)
    }
}

/// Converts object keys to the public hrefs written into documents, and back.
#[derive(Debug, Clone)]
pub struct HrefResolver {
    base: Option<Url>,
    bucket: String,
    region: String,
}

impl HrefResolver {
    /// Path-style hrefs (`{endpoint}/{bucket}/{key}`) when an endpoint is configured, virtual-hosted
    /// AWS urls otherwise.
    pub fn new(settings: &ObjectStoreSettings) -> Self {
        let base = settings.endpoint.as_deref().and_then(|endpoint| {
            Url::parse(&format!(
                "{}/{}/",
                endpoint.trim_end_matches('/'),
                settings.bucket
            ))
            .ok()
        });
        Self {
            base,
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
        }
    }

    pub fn href(&self, key: &str) -> String {
        match &self.base {
            Some(base) => base
                .join(key)
                .map(String::from)
                .unwrap_or_else(|_| format!("{base}{key}")),
            None => S3Object {
                region: self.region.clone(),
                bucket: self.bucket.clone(),
                key: key.to_owned(),
            }
            .to_url(),
        }
    }

    /// Object key behind an href produced by [`HrefResolver::href`]. Bare keys pass through.
    pub fn key(&self, href: &str) -> Option<String> {
        if let Some(base) = &self.base {
            if let Some(key) = href.strip_prefix(base.as_str()) {
                return Some(key.to_owned());
            }
        }
        if let Ok(object) = S3Object::from_url(href) {
            return (object.bucket == self.bucket).then_some(object.key);
        }
        if href.contains("://") {
            return None;
        }
        Some(href.to_owned())
    }
}

/// JSON documents stored in one bucket through an injected object store.
pub struct DocumentStore<'a, S> {
    store: &'a S,
    bucket: String,
}

impl<'a, S: ObjectStore> DocumentStore<'a, S> {
    pub fn new(store: &'a S, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_owned(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store.head_object(&self.bucket, key).await?.is_some())
    }

    /// Reads and parses the document at `key`. Missing documents are `NotFound`, documents that
    /// don't parse into `T` are `MalformedDocument`.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let data = self.store.get_object(&self.bucket, key).await?;
        serde_json::from_slice(&data).map_err(|source| SyncError::MalformedDocument {
            key: key.to_owned(),
            source,
        })
    }

    pub async fn write<T: Serialize>(&self, key: &str, document: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(document)?;
        self.store
            .put_object(&self.bucket, key, body, JSON_MEDIA_TYPE)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Catalog;
    use crate::in_memory::InMemoryStore;

    fn settings(endpoint: Option<&str>) -> ObjectStoreSettings {
        ObjectStoreSettings {
            bucket: "public-eo-data".to_owned(),
            stac_key: "stac_catalogs/cs_stac".to_owned(),
            region: "eu-west-2".to_owned(),
            endpoint: endpoint.map(str::to_owned),
            profile: None,
            force_path_style: true,
            strip_x_id_param: false,
        }
    }

    #[test]
    fn test_catalog_keys() {
        let keys = CatalogKeys::new("stac_catalogs/cs_stac/");
        assert_eq!(keys.catalog(), "stac_catalogs/cs_stac/catalog.json");
        assert_eq!(
            keys.collection("landsat_5"),
            "stac_catalogs/cs_stac/landsat_5/collection.json"
        );
        assert_eq!(
            keys.item("landsat_5", "LT05_L1TP_075073_19920125"),
            "stac_catalogs/cs_stac/landsat_5/LT05_L1TP_075073_19920125/LT05_L1TP_075073_19920125.json"
        );
    }

    #[test]
    fn test_href_round_trip_with_endpoint() {
        let resolver = HrefResolver::new(&settings(Some("https://s3-uk-1.sa-catapult.co.uk/")));
        let key = "stac_catalogs/cs_stac/landsat_5/collection.json";
        let href = resolver.href(key);
        assert_eq!(
            href,
            "https://s3-uk-1.sa-catapult.co.uk/public-eo-data/stac_catalogs/cs_stac/landsat_5/collection.json"
        );
        assert_eq!(resolver.key(&href), Some(key.to_owned()));
        assert_eq!(resolver.key(key), Some(key.to_owned()));
        assert_eq!(resolver.key("https://elsewhere.org/x.json"), None);
    }

    #[test]
    fn test_href_round_trip_without_endpoint() {
        let resolver = HrefResolver::new(&settings(None));
        let key = "stac_catalogs/cs_stac/catalog.json";
        let href = resolver.href(key);
        assert_eq!(
            href,
            "https://public-eo-data.s3.eu-west-2.amazonaws.com/stac_catalogs/cs_stac/catalog.json"
        );
        assert_eq!(resolver.key(&href), Some(key.to_owned()));
    }

    #[tokio::test]
    async fn test_read_write_documents() {
        let store = InMemoryStore::new();
        let documents = DocumentStore::new(&store, "public-eo-data");
        let key = "stac_catalogs/cs_stac/catalog.json";

        assert!(!documents.exists(key).await.unwrap());
        let err = documents.read::<Catalog>(key).await.unwrap_err();
        assert!(err.is_not_found());

        let catalog = Catalog::new("common_sensing", None, "test catalog", &[]);
        documents.write(key, &catalog).await.unwrap();
        assert!(documents.exists(key).await.unwrap());
        assert_eq!(documents.read::<Catalog>(key).await.unwrap(), catalog);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_read_malformed_document() {
        let store = InMemoryStore::new();
        store.insert("public-eo-data", "broken.json", br#"{"id": 3}"#.to_vec());
        let documents = DocumentStore::new(&store, "public-eo-data");

        let err = documents.read::<Catalog>("broken.json").await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedDocument { .. }));
    }
}
