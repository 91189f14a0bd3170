use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{Tool, ToolContext};
use crate::session::SessionError;

const DEFAULT_HANG_UP_REASON: &str = "Call completed";
const DEFAULT_WAIT_SECONDS: u64 = 2;
const MAX_WAIT_SECONDS: u64 = 30;

pub struct HangUpTool;

#[async_trait]
impl Tool for HangUpTool {
    fn name(&self) -> &str {
        "hang_up"
    }

    fn description(&self) -> &str {
        "End the active call/session gracefully."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "default": DEFAULT_HANG_UP_REASON},
            },
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> String {
        let reason = arguments
            .get("reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_HANG_UP_REASON);

        info!(event_name = "tools.hang_up.requested", reason, "hang up requested");
        ctx.session.shutdown(true).await;
        format!("Ending the call now. Reason: {reason}")
    }
}

pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for a short number of seconds while waiting for backend state."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_WAIT_SECONDS,
                    "default": DEFAULT_WAIT_SECONDS,
                },
            },
        })
    }

    async fn call(&self, _ctx: &ToolContext, arguments: Value) -> String {
        let seconds = wait_seconds(arguments.get("seconds"));
        info!(event_name = "tools.wait.requested", seconds, "wait requested");
        if seconds > 0 {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
        format!("Waited {seconds} second(s)")
    }
}

/// Clamps to `0..=30`. Missing or unreadable values mean the default.
fn wait_seconds(raw: Option<&Value>) -> u64 {
    let requested = match raw {
        Some(Value::Number(number)) => {
            number.as_i64().or_else(|| number.as_f64().map(|value| value as i64))
        }
        Some(Value::String(value)) => value.trim().parse::<i64>().ok(),
        _ => None,
    };
    match requested {
        Some(seconds) => seconds.clamp(0, MAX_WAIT_SECONDS as i64) as u64,
        None => DEFAULT_WAIT_SECONDS,
    }
}

pub struct SendDtmfTool;

#[async_trait]
impl Tool for SendDtmfTool {
    fn name(&self) -> &str {
        "send_dtmf"
    }

    fn description(&self) -> &str {
        "Send DTMF digits like 1, 2, # for IVR navigation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "digits": {"type": "string", "pattern": "^[0-9A-Da-d*#]+$"},
            },
            "required": ["digits"],
        })
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> String {
        let Some(digits) = normalize_dtmf(arguments.get("digits").and_then(Value::as_str)) else {
            return "Invalid DTMF digits. Use only 0-9, A-D, *, #".to_string();
        };

        match ctx.session.send_dtmf(&digits).await {
            Ok(()) => {
                info!(event_name = "tools.send_dtmf.sent", digits = %digits, "DTMF sent");
                format!("Sent DTMF: {digits}")
            }
            Err(SessionError::Unsupported(_)) => {
                warn!(event_name = "tools.send_dtmf.unsupported", "transport has no DTMF support");
                "DTMF is not supported in this transport/session".to_string()
            }
            Err(error) => {
                warn!(event_name = "tools.send_dtmf.failed", error = %error, "DTMF send failed");
                "DTMF not available in the current session context".to_string()
            }
        }
    }
}

fn normalize_dtmf(raw: Option<&str>) -> Option<String> {
    let normalized = raw.unwrap_or_default().trim().to_ascii_uppercase();
    let valid = !normalized.is_empty()
        && normalized.chars().all(|c| matches!(c, '0'..='9' | 'A'..='D' | '*' | '#'));
    valid.then_some(normalized)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_dtmf, wait_seconds};

    #[test]
    fn wait_is_clamped_and_defaulted() {
        assert_eq!(wait_seconds(None), 2);
        assert_eq!(wait_seconds(Some(&json!(5))), 5);
        assert_eq!(wait_seconds(Some(&json!(-3))), 0);
        assert_eq!(wait_seconds(Some(&json!(120))), 30);
        assert_eq!(wait_seconds(Some(&json!("7"))), 7);
        assert_eq!(wait_seconds(Some(&json!(2.9))), 2);
        assert_eq!(wait_seconds(Some(&json!("soon"))), 2);
    }

    #[test]
    fn dtmf_digits_are_normalized_and_checked() {
        assert_eq!(normalize_dtmf(Some(" 12a# ")).as_deref(), Some("12A#"));
        assert_eq!(normalize_dtmf(Some("*0D")).as_deref(), Some("*0D"));
        assert_eq!(normalize_dtmf(Some("1E")), None);
        assert_eq!(normalize_dtmf(Some("   ")), None);
        assert_eq!(normalize_dtmf(None), None);
    }
}
