use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;

/// Operator page, its script and stylesheet
#[derive(Embed)]
#[folder = "static/"]
pub struct StaticAssets;

/// Serve one embedded asset, 404 if it is missing
pub fn serve_asset(path: &str) -> Response {
    match StaticAssets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();

            (
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                Body::from(file.data.into_owned()),
            )
                .into_response()
        }
        None => {
            tracing::warn!("Static asset not found: {}", path);
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assets_are_embedded() {
        for name in ["index.html", "waiting.html", "main.js", "main.css"] {
            assert!(StaticAssets::get(name).is_some(), "{} missing", name);
        }
    }

    #[test]
    fn test_content_types() {
        let js = serve_asset("main.js");
        assert_eq!(js.status(), StatusCode::OK);
        let content_type = js.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("javascript"));

        let css = serve_asset("main.css");
        assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css");
    }

    #[test]
    fn test_missing_asset() {
        assert_eq!(serve_asset("nope.txt").status(), StatusCode::NOT_FOUND);
    }
}
