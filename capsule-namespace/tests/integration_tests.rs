use capsule_core::{ContainerId, ContainerState, ExitStatus, exit_codes};
use capsule_namespace::*;
use nix::sys::signal::Signal;

fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

fn container(command: &[&str]) -> ContainerProcess {
    ContainerProcess::new(
        ContainerId::new("it-test").unwrap(),
        command.iter().map(ToString::to_string).collect(),
        NamespaceConfig::new().with_hostname("it-test"),
    )
    .unwrap()
}

#[test]
fn test_namespace_config_defaults() {
    let config = NamespaceConfig::new();

    assert_eq!(config.hostname, "capsule");
    assert_eq!(config.kinds().len(), 5);
}

#[test]
fn test_spawn_without_privilege_reports_creation_failure() {
    if is_root() {
        return;
    }

    let mut process = container(&["/bin/true"]);
    let err = process.spawn(|| 0).unwrap_err();

    assert!(err.to_string().contains("Cannot clone due to error code"));
    assert_eq!(process.state(), ContainerState::Created);
    assert!(!process.holds_stack());
}

#[test]
#[ignore] // Requires root
fn test_spawn_and_reap_in_new_namespaces() {
    let mut process = container(&["/bin/true"]);
    let host = NamespaceInfo::current().unwrap();

    let pid = process
        .spawn(|| {
            // PID 1 inside the new PID namespace
            if nix::unistd::getpid().as_raw() == 1 { 0 } else { 1 }
        })
        .unwrap();
    assert_eq!(process.state(), ContainerState::Running);
    assert!(process.holds_stack());

    // The child may already be a zombie; its namespace links stay readable until reaped
    if let Ok(child) = NamespaceInfo::for_pid(pid) {
        assert!(!child.isolated_from(&host).is_empty());
    }

    assert_eq!(process.await_exit().unwrap(), ExitStatus::Exited(0));
    assert_eq!(process.state(), ContainerState::Terminated);
    assert!(!process.holds_stack());
}

#[test]
#[ignore] // Requires root
fn test_signaled_child_is_reported() {
    let mut process = container(&["/bin/sleep", "60"]);
    let (mut host, mut child) = handshake().unwrap();

    process
        .spawn(move || {
            let _ = child.signal_ready();
            std::thread::sleep(std::time::Duration::from_secs(60));
            0
        })
        .unwrap();

    host.wait_ready().unwrap();
    process.signal(Signal::SIGKILL).unwrap();

    assert_eq!(
        process.await_exit().unwrap(),
        ExitStatus::Signaled(Signal::SIGKILL as i32)
    );
}

#[test]
#[ignore] // Requires root
fn test_missing_command_exits_not_found() {
    let mut process = container(&["/bin/nonexistent"]);
    let command = process.command().to_vec();

    process
        .spawn(move || {
            let Err(e) = exec_command(&command);
            exit_code_for(&e) as isize
        })
        .unwrap();

    assert_eq!(
        process.await_exit().unwrap(),
        ExitStatus::Exited(exit_codes::COMMAND_NOT_FOUND)
    );
}

#[test]
#[ignore] // Requires root
fn test_detach_mount_namespace_is_idempotent() {
    let mut process = container(&["/bin/true"]);

    process
        .spawn(|| {
            let before = std::fs::read_to_string("/proc/self/mountinfo").unwrap_or_default();
            let first = detach_mount_namespace();
            let second = detach_mount_namespace();
            let after = std::fs::read_to_string("/proc/self/mountinfo").unwrap_or_default();

            let same_mounts = before.lines().count() == after.lines().count();
            if first.is_ok() && second.is_ok() && same_mounts { 0 } else { 1 }
        })
        .unwrap();

    assert_eq!(process.await_exit().unwrap(), ExitStatus::Exited(0));
}
