//! OmniChat API data models

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Seconds before expiry at which a token stops being used
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Bearer token issued by `/oauth/token`
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the token can still be used at `now`.
    ///
    /// A token is treated as expired from `TOKEN_REFRESH_MARGIN_SECS` before
    /// its real expiry to absorb clock skew.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let usable_until = self
            .expires_at
            .checked_sub_signed(Duration::seconds(TOKEN_REFRESH_MARGIN_SECS));

        !self.value.is_empty() && usable_until.is_some_and(|until| now < until)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token exchange request body
#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Token exchange response body
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(deserialize_with = "deserialize_expiry")]
    pub expires_at: DateTime<Utc>,
}

/// `expires_at` as sent by OmniChat: an ISO-8601 string or epoch milliseconds
#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
    Millis(i64),
    Text(String),
}

fn deserialize_expiry<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawExpiry::deserialize(deserializer)? {
        RawExpiry::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("expires_at out of range: {}", ms))),
        RawExpiry::Text(text) => parse_expiry(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid expires_at: {}", text))),
    }
}

/// Parse an expiry timestamp; timestamps without an offset are UTC.
pub(crate) fn parse_expiry(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Contact subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    Presubscribed,
    Subscribed,
    Unsubscribed,
    #[serde(other)]
    Other,
}

/// Contact record as returned by the OmniChat API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub contact_id: String,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<ContactStatus>,
}

/// `GET /contact` response
#[derive(Debug, Deserialize)]
pub(crate) struct ContactList {
    #[serde(default)]
    pub items: Vec<Contact>,
}

/// `POST /contact` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub mobile_number: String,
    pub name: String,
    pub status: ContactStatus,
    pub api_account_id: String,
}

impl NewContact {
    /// A presubscribed contact named after its own number
    pub fn presubscribed(mobile_number: &str, api_account_id: &str) -> Self {
        Self {
            mobile_number: mobile_number.to_string(),
            name: mobile_number.to_string(),
            status: ContactStatus::Presubscribed,
            api_account_id: api_account_id.to_string(),
        }
    }
}

/// `POST /broadcast` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub api_account_id: String,
    pub contact_id: String,
    pub template_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_token_fresh_until_margin() {
        let token = BearerToken::new("abc", at(12, 0, 0));

        assert!(token.is_fresh_at(at(11, 0, 0)));
        assert!(token.is_fresh_at(at(11, 58, 59)));
        assert!(!token.is_fresh_at(at(11, 59, 0)));
        assert!(!token.is_fresh_at(at(12, 0, 0)));
        assert!(!token.is_fresh_at(at(13, 0, 0)));
    }

    #[test]
    fn test_empty_token_never_fresh() {
        let token = BearerToken::new("", at(12, 0, 0));
        assert!(!token.is_fresh_at(at(0, 0, 0)));
    }

    #[test]
    fn test_expiry_at_min_datetime_is_stale() {
        let resp: TokenResponse = serde_json::from_value(json!({
            "access_token": "abc",
            "expires_at": DateTime::<Utc>::MIN_UTC.timestamp_millis()
        }))
        .unwrap();
        let token = BearerToken::new(resp.access_token, resp.expires_at);

        assert_eq!(token.expires_at, DateTime::<Utc>::MIN_UTC);
        assert!(!token.is_fresh_at(at(12, 0, 0)));
        assert!(!token.is_fresh_at(DateTime::<Utc>::MIN_UTC));
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = BearerToken::new("secret-token", at(12, 0, 0));
        assert!(!format!("{:?}", token).contains("secret-token"));
    }

    #[test]
    fn test_token_response_rfc3339() {
        let resp: TokenResponse = serde_json::from_value(json!({
            "access_token": "abc",
            "expires_at": "2025-06-01T13:00:00+01:00"
        }))
        .unwrap();
        assert_eq!(resp.access_token, "abc");
        assert_eq!(resp.expires_at, at(12, 0, 0));
    }

    #[test]
    fn test_token_response_naive_and_millis() {
        assert_eq!(parse_expiry("2025-06-01T12:00:00.000"), Some(at(12, 0, 0)));
        assert_eq!(parse_expiry("2025-06-01 12:00:00"), Some(at(12, 0, 0)));

        let resp: TokenResponse = serde_json::from_value(json!({
            "access_token": "abc",
            "expires_at": at(12, 0, 0).timestamp_millis()
        }))
        .unwrap();
        assert_eq!(resp.expires_at, at(12, 0, 0));
    }

    #[test]
    fn test_token_response_invalid_expiry() {
        let result = serde_json::from_value::<TokenResponse>(json!({
            "access_token": "abc",
            "expires_at": "tomorrow"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_contact_list_tolerates_missing_items() {
        let list: ContactList = serde_json::from_value(json!({})).unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_contact_unknown_status() {
        let contact: Contact = serde_json::from_value(json!({
            "contactId": "c1",
            "mobileNumber": "+447700900123",
            "status": "Blocked",
            "createdAt": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(contact.contact_id, "c1");
        assert_eq!(contact.status, Some(ContactStatus::Other));
    }

    #[test]
    fn test_new_contact_wire_format() {
        let body = serde_json::to_value(NewContact::presubscribed("+447700900123", "acc-1")).unwrap();
        assert_eq!(
            body,
            json!({
                "mobileNumber": "+447700900123",
                "name": "+447700900123",
                "status": "Presubscribed",
                "apiAccountId": "acc-1"
            })
        );
    }
}
