//! Command execution inside the bootstrapped container

use std::convert::Infallible;
use std::ffi::CString;

use capsule_core::{Error, Result, exit_codes};
use nix::errno::Errno;
use nix::unistd::execvp;

/// Replace the current process image with `command`
///
/// `command[0]` is resolved through `PATH` and also passed as `argv[0]`.
/// Only returns on failure.
///
/// # Errors
/// Returns [`Error::Exec`] if execvp(3) fails, or
/// [`Error::InvalidConfig`] for an empty command or an argument containing
/// a NUL byte.
pub fn exec_command(command: &[String]) -> Result<Infallible> {
    let Some(program) = command.first() else {
        return Err(Error::invalid_config("Command cannot be empty"));
    };

    let args = to_cstrings(command)?;
    tracing::debug!(program = %program, args = ?&command[1..], "Executing command");

    execvp(&args[0], &args).map_err(|errno| Error::Exec {
        command: program.clone(),
        errno,
    })
}

/// Exit code the child reports when [`exec_command`] fails
#[must_use]
pub const fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::Exec {
            errno: Errno::ENOENT | Errno::ENOTDIR,
            ..
        } => exit_codes::COMMAND_NOT_FOUND,
        _ => exit_codes::EXEC_FAILURE,
    }
}

fn to_cstrings(command: &[String]) -> Result<Vec<CString>> {
    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .map_err(|e| Error::invalid_config(format!("Invalid argument {arg:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_to_cstrings_keeps_program_as_argv0() {
        let cstrings = to_cstrings(&args(&["/bin/echo", "hello"])).unwrap();

        assert_eq!(cstrings[0].to_str().unwrap(), "/bin/echo");
        assert_eq!(cstrings[1].to_str().unwrap(), "hello");
    }

    #[test]
    fn test_nul_byte_rejected() {
        assert!(to_cstrings(&args(&["/bin/echo", "a\0b"])).is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(exec_command(&[]).is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        let not_found = Error::Exec {
            command: "/bin/missing".to_string(),
            errno: Errno::ENOENT,
        };
        let denied = Error::Exec {
            command: "/etc/passwd".to_string(),
            errno: Errno::EACCES,
        };

        assert_eq!(exit_code_for(&not_found), 127);
        assert_eq!(exit_code_for(&denied), 126);
        assert_eq!(exit_code_for(&Error::invalid_config("bad")), 126);
    }
}
