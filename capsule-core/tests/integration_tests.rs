use capsule_core::*;

#[test]
fn test_container_id_validation() {
    // Valid IDs
    assert!(ContainerId::new("test").is_ok());
    assert!(ContainerId::new("test-123").is_ok());
    assert!(ContainerId::new("test_456").is_ok());
    assert!(ContainerId::new("ABC-123_xyz").is_ok());

    // Invalid IDs - empty
    assert!(ContainerId::new("").is_err());

    // Invalid IDs - too long
    assert!(ContainerId::new("a".repeat(65)).is_err());

    // Invalid IDs - bad characters
    assert!(ContainerId::new("test@123").is_err());
    assert!(ContainerId::new("test space").is_err());
    assert!(ContainerId::new("test/path").is_err());
    assert!(ContainerId::new("test.dot").is_err());
}

#[test]
fn test_container_id_serialization() {
    let id = ContainerId::new("test-123").unwrap();

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"test-123\"");

    let deserialized: ContainerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, deserialized);

    // Validation also applies when deserializing
    assert!(serde_json::from_str::<ContainerId>("\"bad id\"").is_err());
}

#[test]
fn test_container_state_display() {
    assert_eq!(ContainerState::Created.to_string(), "created");
    assert_eq!(ContainerState::Running.to_string(), "running");
    assert_eq!(ContainerState::Terminated.to_string(), "terminated");
}

#[test]
fn test_user_exit_codes_pass_through() {
    for code in [0, 1, 2, 42, 124] {
        let exit = ContainerExit::from(ExitStatus::Exited(code));
        assert_eq!(exit, ContainerExit::Normal { code });
        assert_eq!(exit.exit_code(), code);
    }
}

#[test]
fn test_exec_failures_are_classified() {
    let not_found = ContainerExit::from(ExitStatus::Exited(exit_codes::COMMAND_NOT_FOUND));
    assert_eq!(not_found, ContainerExit::ExecFailed { code: 127 });

    let not_executable = ContainerExit::from(ExitStatus::Exited(exit_codes::EXEC_FAILURE));
    assert_eq!(not_executable, ContainerExit::ExecFailed { code: 126 });
    assert_eq!(not_executable.to_string(), "exec failed (code 126)");
}

#[test]
fn test_event_display() {
    let id = ContainerId::new("box").unwrap();
    let event = ContainerEvent::network_attached(&id, "veth1");
    assert_eq!(event.to_string(), "Container box attached to veth1");
}

#[test]
fn test_reserved_codes_keep_their_value() {
    // A workload exiting 125-127 itself is labelled as a launcher failure,
    // but the host still exits with the same code
    for code in [
        exit_codes::BOOTSTRAP_FAILURE,
        exit_codes::EXEC_FAILURE,
        exit_codes::COMMAND_NOT_FOUND,
    ] {
        let exit = ContainerExit::from(ExitStatus::Exited(code));
        assert!(!matches!(exit, ContainerExit::Normal { .. }));
        assert_eq!(exit.exit_code(), code);
    }

    assert_eq!(
        ContainerExit::from(ExitStatus::Exited(125)),
        ContainerExit::BootstrapFailed
    );
}
