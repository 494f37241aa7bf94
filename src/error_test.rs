use super::*;

// =============================================================================
// ApiError::from_status
// =============================================================================

#[test]
fn from_status_maps_auth_codes() {
    assert_eq!(ApiError::from_status(401, String::new()), ApiError::Unauthorized { status: 401 });
    assert_eq!(ApiError::from_status(403, String::new()), ApiError::Unauthorized { status: 403 });
}

#[test]
fn from_status_maps_not_found_and_conflict() {
    assert_eq!(ApiError::from_status(404, "gone".into()), ApiError::NotFound("gone".into()));
    assert_eq!(ApiError::from_status(409, "dup".into()), ApiError::Conflict("dup".into()));
}

#[test]
fn from_status_falls_back_to_status() {
    let err = ApiError::from_status(418, "teapot".into());
    assert_eq!(err, ApiError::Status { status: 418, body: "teapot".into() });
}

// =============================================================================
// ErrorCode
// =============================================================================

#[test]
fn api_error_codes() {
    assert_eq!(ApiError::Network("x".into()).error_code(), "E_NETWORK");
    assert_eq!(ApiError::Unauthorized { status: 401 }.error_code(), "E_UNAUTHORIZED");
    assert_eq!(ApiError::NotFound("x".into()).error_code(), "E_NOT_FOUND");
    assert_eq!(ApiError::Conflict("x".into()).error_code(), "E_CONFLICT");
    assert_eq!(ApiError::Decode("x".into()).error_code(), "E_API_DECODE");
}

#[test]
fn api_error_retryable_only_for_transient() {
    assert!(ApiError::Network("reset".into()).retryable());
    assert!(ApiError::Status { status: 503, body: String::new() }.retryable());
    assert!(ApiError::Status { status: 429, body: String::new() }.retryable());
    assert!(!ApiError::Status { status: 400, body: String::new() }.retryable());
    assert!(!ApiError::Unauthorized { status: 401 }.retryable());
    assert!(!ApiError::NotFound("x".into()).retryable());
}

#[test]
fn transport_error_codes() {
    assert_eq!(TransportError::Closed.error_code(), "E_TRANSPORT_CLOSED");
    assert!(TransportError::Closed.retryable());
    assert!(!TransportError::AlreadySubscribed("chat_message").retryable());
}

#[test]
fn config_error_display_names_var() {
    let err = ConfigError::Missing { var: "CHATSYNC_API_BASE_URL" };
    assert!(err.to_string().contains("CHATSYNC_API_BASE_URL"));
    assert_eq!(err.error_code(), "E_CONFIG_MISSING");
}
