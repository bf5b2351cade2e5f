//! Mastodon entities, reduced to the fields the bot reads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// `user` for local accounts, `user@domain` for remote ones
    pub acct: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// Parent reference of a status (`in_reply_to_id`).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParentRef {
    #[default]
    NoParent,
    ParentId(String),
    /// Present but not a string id
    Unrecognized(Value),
}

impl<'de> Deserialize<'de> for ParentRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => ParentRef::NoParent,
            Value::String(id) => ParentRef::ParentId(id),
            other => ParentRef::Unrecognized(other),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    pub id: String,
    /// HTML body
    #[serde(default)]
    pub content: String,
    pub account: Account,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub in_reply_to_id: ParentRef,
}

impl Status {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Status,
    Reblog,
    Follow,
    FollowRequest,
    Favourite,
    Poll,
    Update,
    #[strum(serialize = "admin.sign_up")]
    AdminSignUp,
    #[strum(serialize = "admin.report")]
    AdminReport,
    #[strum(default)]
    Other(String),
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse::<NotificationKind>().unwrap_or(NotificationKind::Other(raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// One event received on a streaming connection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Update(Status),
    Notification(Notification),
    Delete(String),
    Other { event: String, payload: String },
}

/// New status to publish
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Toot {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

impl Toot {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn reply_to(status: impl Into<String>, in_reply_to_id: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            in_reply_to_id: Some(in_reply_to_id.into()),
            visibility: None,
        }
    }
}
