use dm_service::error::{map_error, AppError};

#[test]
fn status_codes_per_variant() {
    assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
    assert_eq!(AppError::Unauthorized.status_code(), 401);
    assert_eq!(AppError::Forbidden.status_code(), 403);
    assert_eq!(AppError::NotFound.status_code(), 404);
    assert_eq!(AppError::Unsupported("x".into()).status_code(), 422);
    assert_eq!(
        AppError::EditWindowExpired {
            max_edit_minutes: 60
        }
        .status_code(),
        403
    );
    assert_eq!(AppError::Internal.status_code(), 500);
}

#[test]
fn map_error_body_shape() {
    let (status, body) = map_error(&AppError::NotFound);
    assert_eq!(status.as_u16(), 404);
    assert_eq!(body["error"], "not_found_error");
    assert_eq!(body["status"], 404);
    assert_eq!(body["retryable"], false);
}

#[test]
fn edit_window_expired_carries_the_window() {
    let err = AppError::EditWindowExpired {
        max_edit_minutes: 60,
    };
    let (_, body) = map_error(&err);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("max_edit_minutes: 60"));
}

#[test]
fn retryable_classification() {
    assert!(AppError::Internal.is_retryable());
    assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    assert!(!AppError::Forbidden.is_retryable());
    assert!(!AppError::BadRequest("x".into()).is_retryable());
}
