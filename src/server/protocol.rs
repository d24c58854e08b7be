use crate::labels::Prediction;
use serde::Serialize;

/// Body of a successful `/classify` response
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub predictions: Vec<Prediction>,
}

/// Body of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Cap on the size of the uploaded `file` field, in bytes. `None` reads
/// uploads in full
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadLimit(pub Option<usize>);
