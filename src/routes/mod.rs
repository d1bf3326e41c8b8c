pub mod health;
pub mod objects;
pub mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

/// All HTTP routes, with the request body limit applied. Cross-cutting layers
/// (CORS, tracing) are added by the binary.
pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/health", get(health::health))
        .route("/uploads/generic", post(uploads::upload_generic))
        .route("/uploads/avatars/:user_id", post(uploads::upload_avatar))
        .route(
            "/experiments/:experiment_id/resources/:resource_type",
            post(uploads::upload_experiment_resource),
        )
        .route(
            "/experiments/:experiment_id/archives",
            post(uploads::upload_archive),
        )
        .route(
            "/submissions/:student_id/:experiment_id/:task_id",
            post(uploads::upload_submission).delete(objects::delete_task_submissions),
        )
        .route(
            "/submissions/:student_id/:experiment_id/:task_id/code",
            post(uploads::upload_code_submission),
        )
        // Object access by key
        .route(
            "/objects",
            get(objects::get_object)
                .head(objects::head_object)
                .delete(objects::delete_object),
        )
        .route("/objects/stat", get(objects::stat_object))
        .route("/objects/url", get(objects::object_url))
        // Bulk cleanup
        .route(
            "/experiments/:experiment_id",
            delete(objects::delete_experiment),
        )
        .route(
            "/experiments/:experiment_id/tasks/:task_id",
            delete(objects::delete_task_material),
        )
        .route(
            "/users/:user_id/avatars",
            delete(objects::delete_user_avatars),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
