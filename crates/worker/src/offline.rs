//! The substitute answer for dynamic requests when the network is gone.

use serde::Serialize;

use offcache_core::Response;
use offcache_core::http::JSON_CONTENT_TYPE;

#[derive(Serialize)]
struct OfflineBody {
    error: &'static str,
    results: [(); 0],
}

/// Body callers parse when offline: `{"error":"offline","results":[]}`.
pub fn offline_body() -> String {
    serde_json::to_string(&OfflineBody { error: "offline", results: [] })
        .unwrap_or_else(|_| r#"{"error":"offline","results":[]}"#.to_string())
}

/// A 200 JSON response carrying [`offline_body`].
pub fn offline_response() -> Response {
    Response::new(200, offline_body()).with_header("Content-Type", JSON_CONTENT_TYPE)
}
