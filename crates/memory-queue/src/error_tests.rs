//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(!QueueError::NotOpened {
        queue_name: "test".to_string(),
    }
    .is_transient());

    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(QueueError::Subscription {
        queue_name: "test".to_string(),
        message: "broker unavailable".to_string(),
    }
    .should_retry());

    assert!(!QueueError::Internal {
        message: "poisoned".to_string(),
    }
    .is_transient());
}

#[test]
fn test_not_opened_message_names_queue() {
    let err = QueueError::not_opened("orders");
    assert_eq!(err.to_string(), "Queue 'orders' is not opened");
}

#[test]
fn test_serialization_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: QueueError = SerializationError::from(json_err).into();

    assert!(matches!(
        err,
        QueueError::Serialization(SerializationError::JsonError(_))
    ));
    assert!(!err.is_transient());
}

#[test]
fn test_config_error_conversion() {
    let err: ConfigurationError = config::ConfigError::Message("bad value".to_string()).into();
    match err {
        ConfigurationError::Parsing { message } => assert!(message.contains("bad value")),
        other => panic!("Expected Parsing error, got: {:?}", other),
    }
}
