//! Remote control surface
//!
//! Maps method calls onto the badge. Methods: `SetState(state)`,
//! `GetState() -> state`, `Show()`, `Hide()`, `Ping() -> "ok"`.

use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::badge::Badge;
use crate::constants::control::PING_REPLY;
use crate::ipc::{MethodCall, MethodReply};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("no such method: {0}")]
    UnknownMethod(String),

    #[error("{method}: {reason}")]
    InvalidArgs { method: String, reason: String },

    #[error("malformed request: {0}")]
    InvalidRequest(String),

    #[error("daemon is shutting down")]
    ShuttingDown,

    #[error("too many control connections (max {0})")]
    Busy(usize),
}

impl ControlError {
    /// Stable error name put on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ControlError::UnknownMethod(_) => "UnknownMethod",
            ControlError::InvalidArgs { .. } => "InvalidArgs",
            ControlError::InvalidRequest(_) => "InvalidRequest",
            ControlError::ShuttingDown => "ShuttingDown",
            ControlError::Busy(_) => "Busy",
        }
    }
}

impl From<ControlError> for MethodReply {
    fn from(e: ControlError) -> Self {
        MethodReply::Error {
            name: e.name().to_string(),
            message: e.to_string(),
        }
    }
}

/// Wrap a dispatch result for the wire
pub fn into_reply(result: Result<Option<String>, ControlError>) -> MethodReply {
    match result {
        Ok(value) => MethodReply::Return { value },
        Err(e) => e.into(),
    }
}

fn expect_args<'a>(call: &'a MethodCall, count: usize) -> Result<&'a [Value], ControlError> {
    if call.args.len() == count {
        Ok(&call.args)
    } else {
        Err(ControlError::InvalidArgs {
            method: call.method.clone(),
            reason: format!("expected {} argument(s), got {}", count, call.args.len()),
        })
    }
}

/// Run one call against the badge
///
/// An unrecognized status in `SetState` is not an error for the caller; the
/// badge logs it and nothing changes.
pub fn dispatch(badge: &mut Badge, call: &MethodCall, now: Instant) -> Result<Option<String>, ControlError> {
    debug!(method = %call.method, args = call.args.len(), "Control call");
    match call.method.as_str() {
        "SetState" => {
            let args = expect_args(call, 1)?;
            let Some(raw) = args[0].as_str() else {
                return Err(ControlError::InvalidArgs {
                    method: call.method.clone(),
                    reason: "state must be a string".to_string(),
                });
            };
            // Already logged by the badge
            let _ = badge.set_state(raw, now);
            Ok(None)
        }
        "GetState" => {
            expect_args(call, 0)?;
            Ok(Some(badge.get_state().to_string()))
        }
        "Show" => {
            expect_args(call, 0)?;
            badge.show();
            Ok(None)
        }
        "Hide" => {
            expect_args(call, 0)?;
            badge.hide();
            Ok(None)
        }
        "Ping" => {
            expect_args(call, 0)?;
            Ok(Some(PING_REPLY.to_string()))
        }
        other => {
            warn!(method = %other, "Unknown control method");
            Err(ControlError::UnknownMethod(other.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::Status;
    use crate::config::Config;
    use crate::display::StaticDisplays;
    use crate::surface::testing::{Call, RecordingSurface};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn badge() -> (Badge, Rc<RefCell<Vec<Call>>>) {
        let (surface, calls) = RecordingSurface::new();
        let badge = Badge::new(
            Arc::new(Config::default()),
            Box::new(surface),
            Box::new(StaticDisplays::single(1920, 1080)),
        );
        calls.borrow_mut().clear();
        (badge, calls)
    }

    fn call(method: &str, args: Vec<Value>) -> MethodCall {
        MethodCall::new(method, args)
    }

    #[test]
    fn test_ping() {
        let (mut badge, _) = badge();
        let result = dispatch(&mut badge, &call("Ping", vec![]), Instant::now());
        assert_eq!(result, Ok(Some("ok".to_string())));
    }

    #[test]
    fn test_set_then_get_state() {
        let (mut badge, _) = badge();
        let now = Instant::now();

        assert_eq!(dispatch(&mut badge, &call("SetState", vec![json!("Thinking")]), now), Ok(None));
        let state = dispatch(&mut badge, &call("GetState", vec![]), now);

        assert_eq!(state, Ok(Some("thinking".to_string())));
    }

    #[test]
    fn test_invalid_state_is_swallowed() {
        let (mut badge, calls) = badge();

        let result = dispatch(&mut badge, &call("SetState", vec![json!("bogus")]), Instant::now());

        assert_eq!(result, Ok(None));
        assert_eq!(badge.get_state(), Status::Idle);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_unknown_method_is_structured_error() {
        let (mut badge, _) = badge();

        let err = dispatch(&mut badge, &call("Reboot", vec![]), Instant::now()).unwrap_err();

        assert_eq!(err, ControlError::UnknownMethod("Reboot".to_string()));
        match into_reply(Err(err)) {
            MethodReply::Error { name, message } => {
                assert_eq!(name, "UnknownMethod");
                assert!(message.contains("Reboot"));
            }
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_arity_and_type() {
        let (mut badge, _) = badge();
        let now = Instant::now();

        let missing = dispatch(&mut badge, &call("SetState", vec![]), now).unwrap_err();
        let extra = dispatch(&mut badge, &call("Ping", vec![json!(1)]), now).unwrap_err();
        let not_string = dispatch(&mut badge, &call("SetState", vec![json!(3)]), now).unwrap_err();

        assert_eq!(missing.name(), "InvalidArgs");
        assert_eq!(extra.name(), "InvalidArgs");
        assert_eq!(not_string.name(), "InvalidArgs");
        assert_eq!(badge.get_state(), Status::Idle);
    }

    #[test]
    fn test_show_hide_keep_status() {
        let (mut badge, calls) = badge();
        let now = Instant::now();

        dispatch(&mut badge, &call("Show", vec![]), now).unwrap();
        assert!(calls.borrow().contains(&Call::Show));
        dispatch(&mut badge, &call("Hide", vec![]), now).unwrap();

        assert_eq!(badge.get_state(), Status::Idle);
    }
}
