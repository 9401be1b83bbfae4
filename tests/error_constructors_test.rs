use chargegate::error::ChargeGateError;

#[test]
fn error_constructors_read_path() {
    assert!(matches!(
        ChargeGateError::transport("x"),
        ChargeGateError::Transport { .. }
    ));
    assert!(matches!(
        ChargeGateError::decode("x"),
        ChargeGateError::Decode { .. }
    ));
    assert!(matches!(
        ChargeGateError::validation("f", "m"),
        ChargeGateError::Validation { .. }
    ));
    assert!(matches!(
        ChargeGateError::timeout("x"),
        ChargeGateError::Timeout { .. }
    ));
}

#[test]
fn error_constructors_write_path() {
    assert!(matches!(
        ChargeGateError::command("x"),
        ChargeGateError::Command { .. }
    ));
    assert!(matches!(
        ChargeGateError::payment("x"),
        ChargeGateError::Payment { .. }
    ));
    assert!(matches!(
        ChargeGateError::conflict("x"),
        ChargeGateError::Conflict { .. }
    ));
}

#[test]
fn error_constructors_service() {
    assert!(matches!(
        ChargeGateError::config("x"),
        ChargeGateError::Config { .. }
    ));
    assert!(matches!(ChargeGateError::web("x"), ChargeGateError::Web { .. }));
    assert!(matches!(ChargeGateError::io("x"), ChargeGateError::Io { .. }));
    assert!(matches!(
        ChargeGateError::generic("x"),
        ChargeGateError::Generic { .. }
    ));
}

#[test]
fn only_read_failures_are_retried() {
    assert!(ChargeGateError::transport("x").is_retryable());
    assert!(ChargeGateError::decode("x").is_retryable());
    assert!(!ChargeGateError::command("x").is_retryable());
    assert!(!ChargeGateError::payment("x").is_retryable());
    assert!(!ChargeGateError::conflict("x").is_retryable());
}

#[test]
fn validation_message_names_the_field() {
    let err = ChargeGateError::validation("amps", "40 A outside 1..=32 A");
    assert_eq!(
        err.to_string(),
        "Validation error: amps - 40 A outside 1..=32 A"
    );
}
