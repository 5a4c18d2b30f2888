//! Travis CI notification structures

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Form body Travis POSTs to the relay.
#[derive(Debug, Deserialize)]
pub struct NotifyForm {
    /// JSON notification, exactly as received. Signatures cover this string.
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub owner_name: String,
    pub name: String,
}

/// A validated build notification. Every field the embed needs is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub number: String,
    pub status_message: String,
    pub repository: Repository,
    pub commit: String,
    pub branch: String,
    pub compare_url: String,
    pub pull_request: bool,
    pub pull_request_number: Option<String>,
    pub message: String,
    pub build_url: String,
    /// Timestamps are kept as sent; only the one an embed shows is parsed.
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRepository {
    owner_name: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotification {
    #[serde(default, deserialize_with = "string_or_number")]
    number: Option<String>,
    status_message: Option<String>,
    repository: Option<RawRepository>,
    commit: Option<String>,
    branch: Option<String>,
    compare_url: Option<String>,
    // `None` when the key is absent, `Some(Value::Null)` when it is null.
    #[serde(default, deserialize_with = "present")]
    pull_request: Option<Value>,
    #[serde(default, deserialize_with = "string_or_number")]
    pull_request_number: Option<String>,
    message: Option<String>,
    build_url: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Repr>::deserialize(deserializer)?.map(|repr| match repr {
        Repr::Text(text) => text,
        Repr::Number(number) => number.to_string(),
    }))
}

/// Boolean-ish interpretation of a JSON value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => {
            !(text.is_empty() || text.eq_ignore_ascii_case("false") || text == "0")
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or(RelayError::MissingField(field))
}

impl TryFrom<RawNotification> for Notification {
    type Error = RelayError;

    fn try_from(raw: RawNotification) -> Result<Self> {
        let repository = required(raw.repository, "repository")?;
        Ok(Notification {
            number: required(raw.number, "number")?,
            status_message: required(raw.status_message, "status_message")?,
            repository: Repository {
                owner_name: required(repository.owner_name, "repository.owner_name")?,
                name: required(repository.name, "repository.name")?,
            },
            commit: required(raw.commit, "commit")?,
            branch: required(raw.branch, "branch")?,
            compare_url: required(raw.compare_url, "compare_url")?,
            pull_request: truthy(&required(raw.pull_request, "pull_request")?),
            pull_request_number: raw.pull_request_number,
            message: required(raw.message, "message")?,
            build_url: required(raw.build_url, "build_url")?,
            started_at: raw.started_at,
            finished_at: raw.finished_at,
        })
    }
}

impl Notification {
    /// Validates a parsed payload document into a notification.
    pub fn from_document(document: Value) -> Result<Self> {
        let raw: RawNotification = serde_json::from_value(document)?;
        raw.try_into()
    }

    /// Lowercased status keyword, the form used for lookups.
    pub fn status(&self) -> String {
        self.status_message.to_lowercase()
    }

    /// `owner/name` of the repository.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.repository.owner_name, self.repository.name)
    }
}

/// Parses the `payload` form value as JSON.
pub fn decode_payload(payload: &str) -> Result<Value> {
    Ok(serde_json::from_str(payload)?)
}

/// Reads `repository.owner_name` from a parsed payload without validating
/// anything else.
pub fn owner_name(document: &Value) -> Result<&str> {
    document
        .pointer("/repository/owner_name")
        .and_then(Value::as_str)
        .ok_or(RelayError::MissingField("repository.owner_name"))
}
