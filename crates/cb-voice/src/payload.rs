//! Voice webhook payload

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, VoiceError};

static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid E.164 pattern"));

/// Fields of a Twilio voice webhook this service reads.
///
/// Twilio posts form-encoded `PascalCase` parameters; JSON bodies may use
/// either `PascalCase` or `camelCase` keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid", alias = "callSid", default)]
    pub call_sid: Option<String>,

    #[serde(rename = "From", alias = "from", default)]
    pub from: Option<String>,

    #[serde(rename = "To", alias = "to", default)]
    pub to: Option<String>,

    #[serde(rename = "CallStatus", alias = "callStatus", default)]
    pub call_status: Option<String>,
}

impl VoiceWebhook {
    /// Parse a request body according to its content type
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        if is_json(content_type) {
            return serde_json::from_slice(body).map_err(|e| VoiceError::InvalidPayload(e.to_string()));
        }

        Ok(Self::from_pairs(form_pairs(body)))
    }

    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut webhook = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "CallSid" => webhook.call_sid = Some(value),
                "From" => webhook.from = Some(value),
                "To" => webhook.to = Some(value),
                "CallStatus" => webhook.call_status = Some(value),
                _ => {}
            }
        }
        webhook
    }

    /// The call event to follow up, if the caller number is a dialable E.164 number.
    ///
    /// Withheld numbers arrive as e.g. `anonymous` and yield `None`.
    pub fn call_event(&self) -> Option<CallEvent> {
        let caller = self.from.as_deref()?.trim();
        if !E164.is_match(caller) {
            return None;
        }

        Some(CallEvent {
            caller_number: caller.to_string(),
            call_sid: self.call_sid.clone(),
            called_number: self.to.clone(),
        })
    }
}

/// One inbound call, as handed to the background flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    /// Caller number in E.164 form
    pub caller_number: String,
    pub call_sid: Option<String>,
    pub called_number: Option<String>,
}

impl CallEvent {
    pub fn new(caller_number: impl Into<String>) -> Self {
        Self {
            caller_number: caller_number.into(),
            call_sid: None,
            called_number: None,
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body
pub fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

/// Whether the content type is JSON (parameters are ignored)
pub fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = "CallSid=CA123&AccountSid=AC1&From=%2B447700900123&To=%2B441234567890&CallStatus=ringing";

    #[test]
    fn test_parse_form_body() {
        let webhook =
            VoiceWebhook::parse(Some("application/x-www-form-urlencoded"), FORM.as_bytes()).unwrap();

        assert_eq!(webhook.call_sid.as_deref(), Some("CA123"));
        assert_eq!(webhook.from.as_deref(), Some("+447700900123"));
        assert_eq!(webhook.to.as_deref(), Some("+441234567890"));
        assert_eq!(webhook.call_status.as_deref(), Some("ringing"));
    }

    #[test]
    fn test_parse_defaults_to_form() {
        let webhook = VoiceWebhook::parse(None, FORM.as_bytes()).unwrap();
        assert_eq!(webhook.from.as_deref(), Some("+447700900123"));
    }

    #[test]
    fn test_parse_json_body() {
        let body = br#"{"From": "+447700900123", "callSid": "CA9"}"#;
        let webhook = VoiceWebhook::parse(Some("application/json; charset=utf-8"), body).unwrap();

        assert_eq!(webhook.from.as_deref(), Some("+447700900123"));
        assert_eq!(webhook.call_sid.as_deref(), Some("CA9"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let result = VoiceWebhook::parse(Some("application/json"), b"{not json");
        assert!(matches!(result, Err(VoiceError::InvalidPayload(_))));
    }

    #[test]
    fn test_call_event_from_e164() {
        let webhook = VoiceWebhook::parse(None, FORM.as_bytes()).unwrap();
        let event = webhook.call_event().unwrap();

        assert_eq!(event.caller_number, "+447700900123");
        assert_eq!(event.call_sid.as_deref(), Some("CA123"));
        assert_eq!(event.called_number.as_deref(), Some("+441234567890"));
    }

    #[test]
    fn test_call_event_rejects_withheld_numbers() {
        for from in ["anonymous", "", "447700900123", "+0123", "+44 7700 900123"] {
            let webhook = VoiceWebhook {
                from: Some(from.to_string()),
                ..VoiceWebhook::default()
            };
            assert_eq!(webhook.call_event(), None, "{:?} should be skipped", from);
        }

        assert_eq!(VoiceWebhook::default().call_event(), None);
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("Application/JSON; charset=utf-8")));
        assert!(!is_json(Some("application/x-www-form-urlencoded")));
        assert!(!is_json(None));
    }
}
