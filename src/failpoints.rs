//! Feature-gated failpoint injection for crash-path tests.
//!
//! Compile with `--features failpoints` to enable injection. Without the
//! feature, the `fp!()` macro expands to `Ok(())`.
//!
//! Points used by the apply engine: `apply.backup`, `apply.document`,
//! `apply.changelog`, `apply.state`. Each fires just before the write of that
//! stage.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

/// Actions a failpoint can take when triggered.
#[derive(Clone, Debug)]
pub enum FailpointAction {
    /// No-op (default).
    Off,
    /// Fail the step with the given message.
    Error(String),
    /// Panic with the given message.
    Panic(String),
}

/// Global registry of active failpoints.
static REGISTRY: LazyLock<Mutex<HashMap<&'static str, FailpointAction>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> std::sync::MutexGuard<'static, HashMap<&'static str, FailpointAction>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set a failpoint action.
pub fn set(name: &'static str, action: FailpointAction) {
    registry().insert(name, action);
}

/// Clear a specific failpoint.
pub fn clear(name: &'static str) {
    registry().remove(name);
}

/// Clear all failpoints.
pub fn clear_all() {
    registry().clear();
}

/// Check if a failpoint is set and execute its action.
///
/// Returns `Ok(())` if no failpoint or `Off`, `Err(message)` for `Error`.
///
/// # Errors
/// Returns the configured message for an `Error` action.
///
/// # Panics
/// Panics if the failpoint action is `Panic`.
pub fn check(name: &str) -> Result<(), String> {
    let action = registry().get(name).cloned();
    match action {
        None | Some(FailpointAction::Off) => Ok(()),
        Some(FailpointAction::Error(msg)) => Err(msg),
        Some(FailpointAction::Panic(msg)) => panic!("failpoint {name}: {msg}"),
    }
}

/// Failpoint injection point.
///
/// With `failpoints` feature: checks the registry and may return `Err` or panic.
/// Without it: always `Ok(())`.
///
/// Usage: `fp!("apply.backup").map_err(|msg| ...)?;`
#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        $crate::failpoints::check($name).map_err(|msg| format!("failpoint {}: {}", $name, msg))
    };
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        Ok::<(), String>(())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is global and tests run in parallel, so each test uses
    // its own failpoint names and never calls clear_all().

    #[test]
    fn unset_failpoint_is_noop() {
        assert!(check("test.unset").is_ok());
        let result: Result<(), String> = fp!("test.unset.macro");
        assert!(result.is_ok());
    }

    #[test]
    fn error_action_returns_message() {
        set("test.error", FailpointAction::Error("injected".into()));
        assert_eq!(check("test.error"), Err("injected".to_owned()));
        clear("test.error");
        assert!(check("test.error").is_ok());
    }

    #[test]
    fn off_action_is_noop() {
        set("test.off", FailpointAction::Off);
        assert!(check("test.off").is_ok());
        clear("test.off");
    }

    #[test]
    #[cfg(feature = "failpoints")]
    fn macro_prefixes_failpoint_name() {
        set("test.macro", FailpointAction::Error("boom".into()));
        let err = fp!("test.macro").unwrap_err();
        assert_eq!(err, "failpoint test.macro: boom");
        clear("test.macro");
    }

    #[test]
    #[should_panic(expected = "failpoint test.panic: kaboom")]
    fn panic_action_panics() {
        set("test.panic", FailpointAction::Panic("kaboom".into()));
        let _ = check("test.panic");
    }
}
