//! Worker settings and per-sensor configuration, read from a TOML file.
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Settings {
    pub object_store: ObjectStoreSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ObjectStoreSettings {
    pub bucket: String,
    /// Key prefix under which the catalog documents live.
    pub stac_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Some S3-compatible servers reject the `x-id=GetObject` query param.
    #[serde(default)]
    pub strip_x_id_param: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct WorkerSettings {
    pub inbound_prefix: String,
    pub outbound_prefix: String,
    pub product_suffix: String,
    pub min_sample_bytes: u64,
    pub header_bytes: u64,
    pub target_epsg: u16,
    pub channel_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            inbound_prefix: "stac_creator".to_string(),
            outbound_prefix: "stac_indexer".to_string(),
            product_suffix: ".tif".to_string(),
            min_sample_bytes: 1,
            header_bytes: 1 << 20,
            target_epsg: 4326,
            channel_capacity: 64,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CatalogSettings {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub stac_extensions: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SensorConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    pub formatting: Formatting,
    pub extensions: SensorExtensions,
    #[serde(default)]
    pub common_metadata: CommonMetadata,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Formatting {
    pub date: DateFormatting,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DateFormatting {
    pub regex: String,
    pub format: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SensorExtensions {
    pub product_definition: ProductDefinition,
    pub eo: EoConfig,
    #[serde(default)]
    pub projection: Option<ProjectionConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProductDefinition {
    pub metadata_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EoConfig {
    pub bands: Vec<BandConfig>,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BandConfig {
    pub name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    /// Extra descriptor fields (units, aliases, ...) carried into the
    /// collection's measurement list.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BandConfig {
    /// Logical band identifier: the common name, or the file label when none is configured.
    pub fn identifier(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ProjectionConfig {
    pub epsg: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct CommonMetadata {
    #[serde(default)]
    pub gsd: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub instruments: Option<Vec<String>>,
    #[serde(default)]
    pub constellation: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| settings_error(path, e))?;
        let settings: Self = toml::from_str(&content).map_err(|e| settings_error(path, e))?;
        Ok(settings)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| settings_error(path, e))?;
        fs::write(path, content).map_err(|e| settings_error(path, e))?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Self {
        let settings: Self =
            toml::from_str(&table.to_string()).expect("Error deserializing settings template");
        settings
    }

    pub fn sensor(&self, id: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.id == id)
    }

    pub fn require_sensor(&self, id: &str) -> Result<&SensorConfig> {
        self.sensor(id).ok_or_else(|| SyncError::ConfigurationMissing {
            sensor: id.to_owned(),
        })
    }
}

fn settings_error(path: &Path, err: impl std::fmt::Display) -> SyncError {
    SyncError::Settings {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn settings_toml() -> toml::Table {
    toml::toml! {
        [object_store]
        bucket = "public-eo-data"
        stac_key = "stac_catalogs/cs_stac"
        endpoint = "https://s3-uk-1.sa-catapult.co.uk"

        [worker]
        min_sample_bytes = 1

        [catalog]
        id = "common_sensing"
        title = "Common Sensing"
        description = "Analysis ready data for the Common Sensing project"
        stac_extensions = ["eo", "projection"]

        [[sensors]]
        id = "landsat_5"
        title = "Landsat 5"
        description = "Landsat 5 Thematic Mapper surface reflectance"

        [[sensors.providers]]
        name = "USGS"
        roles = ["producer", "licensor"]
        url = "https://www.usgs.gov"

        [sensors.formatting.date]
        regex = "_(\\d{8})"
        format = "%Y%m%d"

        [sensors.extensions.product_definition]
        metadata_type = "eo3"

        [sensors.extensions.product_definition.metadata]
        product = { name = "ls5_usgs_l1" }

        [[sensors.extensions.eo.bands]]
        name = "B1"
        common_name = "blue"
        units = "1"

        [[sensors.extensions.eo.bands]]
        name = "B2"
        common_name = "green"
        units = "1"

        [[sensors.extensions.eo.bands]]
        name = "B3"
        common_name = "red"
        units = "1"

        [sensors.extensions.projection]
        epsg = 32760

        [sensors.common_metadata]
        gsd = 30.0
        platform = "landsat-5"
        instruments = ["tm"]
        constellation = "landsat"
    }
}
