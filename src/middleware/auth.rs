use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::error::AppError;

/// Identity arrives from the gateway as a trusted `x-user-id` header; token
/// validation belongs to the external identity provider in front of this
/// service.
pub fn user_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Handlers read the id back out of request extensions.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, AppError> {
    let user_id = user_id_from_headers(req.headers()).ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_valid_identity_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(user_id_from_headers(&headers), Some(id));
    }

    #[test]
    fn missing_header_yields_no_identity() {
        assert_eq!(user_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn malformed_header_yields_no_identity() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("not-a-uuid"));
        assert_eq!(user_id_from_headers(&headers), None);
    }
}
