//! Builds catalog, collection and item documents from the source hierarchy
//! `{prefix}/{sensor}/{acquisition}/{product}`.
//!
//! Documents are created once and never overwritten; the only document that is rewritten is the
//! collection, whose item links and extent change whenever an item is added, and the root catalog,
//! which gains a child link per new collection.
use crate::bands::{file_stem, match_bands};
use crate::config::{SensorConfig, Settings};
use crate::document::{
    push_link, Asset, Catalog, Collection, Extent, Item, Link, PropertyBag, Provider,
    COG_MEDIA_TYPE,
};
use crate::error::{Result, SyncError};
use crate::extract::{extract_date, reproject, RasterReader, RasterSource};
use crate::s3::{list_objects_with_suffix, ObjectStore, ObjectSummary};
use crate::stac_operations::{CatalogKeys, DocumentStore, HrefResolver};
use futures_util::future::join_all;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, error, info, warn};

const PROJECTION_SCHEMA: &str = "https://stac-extensions.github.io/projection/v1.1.0/schema.json";
const EO_SCHEMA: &str = "https://stac-extensions.github.io/eo/v1.1.0/schema.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Collection,
    Item,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Item => "item",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a build request: the document kind and its key, or `None` on a soft failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub kind: DocumentKind,
    pub key: Option<String>,
}

impl BuildOutcome {
    fn collection(key: Option<String>) -> Self {
        Self {
            kind: DocumentKind::Collection,
            key,
        }
    }

    fn item(key: Option<String>) -> Self {
        Self {
            kind: DocumentKind::Item,
            key,
        }
    }
}

fn key_segments(key: &str) -> Vec<&str> {
    key.split('/').filter(|s| !s.is_empty()).collect()
}

fn as_prefix(key: &str) -> String {
    format!("{}/", key.trim_end_matches('/'))
}

/// Smallest object strictly larger than `min_bytes`; equal sizes are broken by key.
pub fn smallest_sample(objects: &[ObjectSummary], min_bytes: u64) -> Option<&ObjectSummary> {
    objects
        .iter()
        .filter(|o| o.size > min_bytes)
        .min_by(|a, b| a.size.cmp(&b.size).then_with(|| a.key.cmp(&b.key)))
}

pub struct CatalogBuilder<'a, S> {
    settings: &'a Settings,
    store: &'a S,
    documents: DocumentStore<'a, S>,
    rasters: RasterReader<'a, S>,
    keys: CatalogKeys,
    hrefs: HrefResolver,
}

impl<'a, S: ObjectStore> CatalogBuilder<'a, S> {
    pub fn new(settings: &'a Settings, store: &'a S) -> Self {
        Self {
            settings,
            store,
            documents: DocumentStore::new(store, &settings.object_store.bucket),
            rasters: RasterReader::new(store, settings.worker.header_bytes),
            keys: CatalogKeys::new(&settings.object_store.stac_key),
            hrefs: HrefResolver::new(&settings.object_store),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    /// Ensures the collection of the sensor named by the last segment of `sensor_key` exists,
    /// then ensures an item for every acquisition prefix directly below it. The first hard
    /// failure of an acquisition fails the whole request.
    pub async fn ensure_collection(&self, sensor_key: &str) -> Result<BuildOutcome> {
        let Some(&sensor_id) = key_segments(sensor_key).last() else {
            warn!(sensor_key, "Unable to resolve sensor from key");
            return Ok(BuildOutcome::collection(None));
        };
        let sensor = match self.settings.require_sensor(sensor_id) {
            Ok(sensor) => sensor,
            Err(e) => {
                warn!(error = %e, "Could not create collection");
                return Ok(BuildOutcome::collection(None));
            }
        };

        let collection_key = self.keys.collection(&sensor.id);
        if self.documents.exists(&collection_key).await? {
            info!(sensor = %sensor.id, key = %collection_key, "Collection already exists");
        } else if !self.create_collection(sensor, &collection_key).await? {
            return Ok(BuildOutcome::collection(None));
        }

        let acquisitions = self
            .store
            .list_common_prefixes(self.documents.bucket(), &as_prefix(sensor_key))
            .await?;
        info!(sensor = %sensor.id, count = acquisitions.len(), "Adding acquisitions");
        for acquisition_key in acquisitions {
            self.ensure_item(&acquisition_key).await?;
        }

        Ok(BuildOutcome::collection(Some(collection_key)))
    }

    /// Creates the collection and links it from the root catalog. Returns false when the catalog
    /// can't be read.
    async fn create_collection(&self, sensor: &SensorConfig, collection_key: &str) -> Result<bool> {
        let catalog_key = self.keys.catalog();
        let Some(mut catalog) = self.load_catalog(&catalog_key).await? else {
            return Ok(false);
        };
        info!(sensor = %sensor.id, "Creating collection");

        let catalog_href = self.hrefs.href(&catalog_key);
        let collection_href = self.hrefs.href(collection_key);

        let mut collection = new_collection(sensor);
        collection.set_hrefs(&collection_href, &catalog_href);

        catalog.set_self_href(&catalog_href);
        push_link(
            &mut catalog.links,
            Link::new("child", collection_href).title(sensor.title.as_deref()),
        );

        self.documents.write(&catalog_key, &catalog).await?;
        self.documents.write(collection_key, &collection).await?;
        info!(sensor = %sensor.id, catalog = %catalog_key, "Collection added to catalog");
        Ok(true)
    }

    async fn load_catalog(&self, catalog_key: &str) -> Result<Option<Catalog>> {
        match self.documents.read::<Catalog>(catalog_key).await {
            Ok(catalog) => Ok(Some(catalog)),
            Err(SyncError::NotFound { .. }) => {
                info!(key = catalog_key, "No catalog found, creating new catalog");
                let config = &self.settings.catalog;
                Ok(Some(Catalog::new(
                    &config.id,
                    config.title.as_deref(),
                    &config.description,
                    &config.stac_extensions,
                )))
            }
            Err(e @ SyncError::MalformedDocument { .. }) => {
                error!(error = %e, "Invalid catalog, could not add collection");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ensures the item for `acquisition_key` (`.../{sensor}/{acquisition}/`) exists and is linked
    /// from its collection.
    pub async fn ensure_item(&self, acquisition_key: &str) -> Result<BuildOutcome> {
        let segments = key_segments(acquisition_key);
        let [.., sensor_id, acquisition] = segments.as_slice() else {
            warn!(acquisition_key, "Unable to resolve sensor and acquisition from key");
            return Ok(BuildOutcome::item(None));
        };

        let collection_key = self.keys.collection(sensor_id);
        let mut collection = match self.documents.read::<Collection>(&collection_key).await {
            Ok(collection) => collection,
            Err(SyncError::NotFound { .. }) => {
                info!(
                    key = %collection_key,
                    acquisition_key,
                    "No collection found, could not add item"
                );
                return Ok(BuildOutcome::item(None));
            }
            Err(e @ SyncError::MalformedDocument { .. }) => {
                error!(error = %e, acquisition_key, "Invalid collection, could not add item");
                return Ok(BuildOutcome::item(None));
            }
            Err(e) => return Err(e),
        };

        let item_id = file_stem(acquisition);
        let item_key = self.keys.item(&collection.id, item_id);
        if self.documents.exists(&item_key).await? {
            info!(item = item_id, key = %item_key, "Item already exists");
            return Ok(BuildOutcome::item(Some(item_key)));
        }

        let sensor = match self.settings.require_sensor(&collection.id) {
            Ok(sensor) => sensor,
            Err(e) => {
                warn!(error = %e, item = item_id, "Could not create item");
                return Ok(BuildOutcome::item(None));
            }
        };

        debug!(item = item_id, sensor = %sensor.id, "Creating item");
        let Some(mut item) = self
            .build_item(sensor, item_id, &as_prefix(acquisition_key))
            .await?
        else {
            return Ok(BuildOutcome::item(None));
        };

        let catalog_href = self.hrefs.href(&self.keys.catalog());
        let collection_href = self.hrefs.href(&collection_key);
        let item_href = self.hrefs.href(&item_key);
        item.set_hrefs(&item_href, &collection_href, &catalog_href);

        push_link(&mut collection.links, Link::new("item", item_href));
        collection.extent = self
            .recompute_extent(&collection, &item_key, &item)
            .await?;

        self.documents.write(&collection_key, &collection).await?;
        self.documents.write(&item_key, &item).await?;
        info!(item = %item.id, collection = %collection.id, "Item added to collection");

        Ok(BuildOutcome::item(Some(item_key)))
    }

    /// Assembles the item from the products under `prefix`. `None` when no configured band has a
    /// product.
    async fn build_item(
        &self,
        sensor: &SensorConfig,
        item_id: &str,
        prefix: &str,
    ) -> Result<Option<Item>> {
        let worker = &self.settings.worker;
        let bucket = self.documents.bucket();

        let products =
            list_objects_with_suffix(self.store, bucket, prefix, &worker.product_suffix).await?;
        let product_keys: Vec<String> = products.iter().map(|p| p.key.clone()).collect();
        let (matched, missing) = match_bands(&product_keys, &sensor.extensions.eo.bands);
        for band in missing {
            warn!(band, sensor = %sensor.id, item = item_id, "Band not found on acquisition");
        }
        if matched.is_empty() {
            warn!(sensor = %sensor.id, item = item_id, "No configured band found on acquisition");
            return Ok(None);
        }

        let date_format = &sensor.formatting.date;
        let datetime = extract_date(prefix, &date_format.regex, &date_format.format);

        let sample = smallest_sample(&products, worker.min_sample_bytes).ok_or_else(|| {
            SyncError::NoSampleAvailable {
                prefix: prefix.to_owned(),
            }
        })?;
        let (footprint, crs) = self
            .rasters
            .extract_footprint(&self.object_source(&sample.key))
            .await;
        let geometry = reproject(&footprint, crs, worker.target_epsg)?;

        let mut item = Item::new(item_id, datetime, geometry.to_geometry());
        item.bbox = footprint.bounds();
        item.collection = Some(sensor.id.clone());
        item.stac_extensions = vec![PROJECTION_SCHEMA.to_owned(), EO_SCHEMA.to_owned()];

        let configured_epsg = sensor.extensions.projection.as_ref().and_then(|p| p.epsg);
        let epsg = configured_epsg.or(crs.epsg().map(u32::from));
        item.add_properties(PropertyBag::new("proj").with("epsg", epsg));
        if let Some(cloud_cover) = sensor.extensions.eo.cloud_cover {
            item.add_properties(PropertyBag::new("eo").with("cloud_cover", cloud_cover));
        }
        add_common_metadata(&mut item.properties.additional_fields, sensor);

        let grids = join_all(matched.iter().map(|m| async move {
            self.rasters
                .extract_grid(&self.object_source(&m.key))
                .await
        }))
        .await;

        for (matched_band, (shape, transform)) in matched.iter().zip(grids) {
            let band = matched_band.band;
            let href = self.hrefs.href(&matched_band.key);
            debug!(asset = %href, item = item_id, "Adding asset");

            let mut asset = Asset::new(href, COG_MEDIA_TYPE);
            asset.add_properties(
                PropertyBag::new("proj")
                    .with("shape", shape)
                    .with("transform", transform),
            );
            asset.add_properties(PropertyBag::new("eo").with(
                "bands",
                json!([{ "name": band.name, "common_name": band.identifier() }]),
            ));
            item.assets.insert(band.identifier().to_owned(), asset);
        }

        Ok(Some(item))
    }

    /// Union over every item linked from `collection`, with `new_item` standing in for the
    /// document at `new_key`. Links to missing or malformed items are left out; any other read
    /// failure aborts, so a partial extent is never persisted.
    async fn recompute_extent(
        &self,
        collection: &Collection,
        new_key: &str,
        new_item: &Item,
    ) -> Result<Extent> {
        let mut items = vec![];
        for link in collection.items() {
            let Some(key) = self.hrefs.key(&link.href) else {
                warn!(href = %link.href, "Item link outside of the catalog bucket");
                continue;
            };
            if key == new_key {
                continue;
            }
            match self.documents.read::<Item>(&key).await {
                Ok(item) => items.push(item),
                Err(e @ (SyncError::NotFound { .. } | SyncError::MalformedDocument { .. })) => {
                    warn!(key = %key, error = %e, "Skipping linked item in extent")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Extent::from_items(
            items.iter().chain(std::iter::once(new_item)),
        ))
    }

    fn object_source(&self, key: &str) -> RasterSource {
        RasterSource::Object {
            bucket: self.documents.bucket().to_owned(),
            key: key.to_owned(),
        }
    }
}

fn new_collection(sensor: &SensorConfig) -> Collection {
    let mut collection = Collection::new(&sensor.id, sensor.title.as_deref(), &sensor.description);
    collection.providers = sensor
        .providers
        .iter()
        .map(|p| Provider {
            name: p.name.clone(),
            roles: p.roles.clone(),
            url: p.url.clone(),
        })
        .collect();

    let measurements: Vec<Value> = sensor
        .extensions
        .eo
        .bands
        .iter()
        .map(|band| {
            let mut measurement = Map::new();
            measurement.insert("name".to_owned(), Value::from(band.identifier()));
            measurement.extend(band.extra.clone());
            Value::Object(measurement)
        })
        .collect();

    let product_definition = &sensor.extensions.product_definition;
    collection.add_properties(
        PropertyBag::new("product_definition")
            .with("metadata_type", product_definition.metadata_type.clone())
            .with("metadata", Value::Object(product_definition.metadata.clone()))
            .with("measurements", measurements),
    );
    collection
}

fn add_common_metadata(properties: &mut Map<String, Value>, sensor: &SensorConfig) {
    let common = &sensor.common_metadata;
    if let Some(gsd) = common.gsd {
        properties.insert("gsd".to_owned(), Value::from(gsd));
    }
    if let Some(platform) = &common.platform {
        properties.insert("platform".to_owned(), Value::from(platform.as_str()));
    }
    if let Some(instruments) = &common.instruments {
        properties.insert("instruments".to_owned(), Value::from(instruments.clone()));
    }
    if let Some(constellation) = &common.constellation {
        properties.insert("constellation".to_owned(), Value::from(constellation.as_str()));
    }
}
