use axum::http::Uri;

use crate::error::{Error, ErrorDetails};

pub async fn handle_404(uri: Uri) -> Error {
    Error::new(ErrorDetails::RouteNotFound {
        path: uri.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_handle_404() {
        let err = handle_404(Uri::from_static("/does/not/exist?page=2")).await;
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Route not found: /does/not/exist");
    }
}
