//! Error types for the MapOpt core library

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or parsing feature data
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid bounding box: north={north} south={south} east={east} west={west}")]
    InvalidBounds {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },

    #[error("Invalid bounds string '{input}': expected north,south,east,west")]
    BoundsFormat { input: String },

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] serde_json::Error),

    #[error("Unsupported GeoJSON document: {0}")]
    UnsupportedDocument(String),
}
