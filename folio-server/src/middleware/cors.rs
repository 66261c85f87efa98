use axum::http::Method;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{AllowedOrigins, Config};

/// CORS for the configured origins. The list is validated at startup.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = match &config.cors_origins {
        AllowedOrigins::Any => AllowOrigin::from(Any),
        AllowedOrigins::List(origins) => AllowOrigin::list(origins.iter().cloned()),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
