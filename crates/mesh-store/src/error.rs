use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}

impl From<StoreError> for mesh_types::MeshError {
    fn from(e: StoreError) -> Self {
        mesh_types::MeshError::Store(e.to_string())
    }
}
