use axum::http::HeaderValue;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use experiment_storage::{config::Config, routes, upload_pipeline::UploadPipeline, AppState};

fn cors_layer(cfg: &Config) -> CorsLayer {
    if cfg.cors_permissive_dev {
        tracing::warn!("CORS_PERMISSIVE_DEV is set; allowing any origin.");
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = cfg
        .cors_allow_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config::from_env();
    if cfg.storage_endpoint.is_none() {
        tracing::warn!(
            "STORAGE_ENDPOINT is empty; using LOCAL_STORE_DIR={} for object storage.",
            cfg.local_store_dir
        );
    } else if cfg.storage_access_key.is_none() || cfg.storage_secret_key.is_none() {
        tracing::warn!(
            "STORAGE_ACCESS_KEY/STORAGE_SECRET_KEY not set; falling back to ambient credentials."
        );
    }
    tracing::info!(
        default_bucket = %cfg.bucket_names.default,
        resource_bucket = %cfg.bucket_names.resource,
        submission_bucket = %cfg.bucket_names.submission,
        max_archive_entries = cfg.archive_limits.max_entries,
        max_archive_bytes = cfg.archive_limits.max_total_bytes,
        rollback = ?cfg.archive_rollback,
        "storage configured"
    );

    let pipeline = UploadPipeline::from_config(&cfg)?;
    let state = AppState {
        pipeline,
        max_body_bytes: cfg.max_body_bytes,
    };

    let app = routes::app(state)
        .layer(cors_layer(&cfg))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    tracing::info!("experiment_storage listening on {}", addr);

    axum::Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
