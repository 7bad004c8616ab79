use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("Catalogue payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalogue shape not recognized (expected an array or an object with a 'plugins' map)")]
    UnrecognizedShape,
}
