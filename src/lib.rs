pub mod archive;
pub mod bucket;
pub mod config;
pub mod error;
pub mod keys;
pub mod mime;
pub mod object_store_cleanup;
pub mod path;
pub mod routes;
pub mod s3;
pub mod upload_pipeline;

use crate::upload_pipeline::UploadPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: UploadPipeline,
    pub max_body_bytes: usize,
}
