use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No object found at {key}")]
    NotFound { key: String },

    #[error("No configuration found for sensor {sensor}")]
    ConfigurationMissing { sensor: String },

    #[error("Invalid document in {key}: {source}")]
    MalformedDocument {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unable to read raster: {reason}")]
    RasterUnreadable { reason: String },

    #[error("No sample product found under {prefix}")]
    NoSampleAvailable { prefix: String },

    #[error("Unable to reproject geometry: {reason}")]
    Reprojection { reason: String },

    #[error("Unable to load settings from {path}: {reason}")]
    Settings { path: String, reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum MapError {
    #[error("Unable to clone request")]
    Clone,
}
