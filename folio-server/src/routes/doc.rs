use axum::Json;
use utoipa::OpenApi;

use crate::routes::{health, invoke};

#[derive(OpenApi)]
#[openapi(info(
    title = "folio-server",
    description = "Portfolio chat relay API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(invoke::InvokeApi::openapi());
    root
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(get_docs())
}
