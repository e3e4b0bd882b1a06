//! Static HTML shells: the viewer template and per-status error pages.

use std::path::Path;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Serves `<status>.html` from the html directory, falling back to a plain
/// text body when the page is missing.
pub(crate) fn error_page(html_dir: &Path, status: StatusCode) -> Response {
    let page_path = html_dir.join(format!("{}.html", status.as_u16()));
    match std::fs::read_to_string(&page_path) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => {
            warn!(path = %page_path.display(), error = %error, "error page unavailable");
            (status, format!("Error {}", status.as_u16())).into_response()
        }
    }
}

/// Loads the viewer HTML template.
pub(crate) fn load_viewer_template(html_dir: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(html_dir.join("viewer.html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_error_page_serves_matching_status_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("404.html"), "<h1>gone</h1>").expect("write page");
        let response = error_page(dir.path(), StatusCode::NOT_FOUND);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unit_error_page_falls_back_to_plain_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = error_page(dir.path(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
