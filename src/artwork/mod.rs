use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderName, HeaderValue,
    },
    response::{IntoResponse, Response},
};

use crate::AppState;

mod fetcher;
mod stream;

pub use fetcher::{Artwork, ArtworkBody, ArtworkFetcher, ArtworkSource};

/// Response header naming which source served the artwork
pub const ARTWORK_SOURCE_HEADER: &str = "x-artwork-source";

/// Mounted under `/static`
pub const PROXY_PATH: &str = "/proxy/greensleeves";

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route(PROXY_PATH, axum::routing::get(proxy_artwork))
}

/// GET /static/proxy/greensleeves
/// Remote cover artwork, the cached copy, or the bundled fallback. Never fails.
async fn proxy_artwork(State(state): State<AppState>) -> Artwork {
    state.artwork.fetch().await
}

impl IntoResponse for Artwork {
    fn into_response(self) -> Response {
        let body = match self.body {
            ArtworkBody::Bytes(bytes) => Body::from(bytes),
            ArtworkBody::Stream(stream) => Body::from_stream(stream),
            ArtworkBody::Empty => Body::empty(),
        };

        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

        let mut response = body.into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(
            HeaderName::from_static(ARTWORK_SOURCE_HEADER),
            HeaderValue::from_static(self.source.as_str()),
        );

        // Let clients retry once the remote or the cache becomes available
        if matches!(
            self.source,
            ArtworkSource::Fallback | ArtworkSource::FallbackMissing
        ) {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }

        response
    }
}
