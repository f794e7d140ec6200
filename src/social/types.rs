// Wire types for statuses, users, and follower-ID pages.
//
// These deserialize directly from the v1.1-style REST payloads and double as
// the in-memory representation handed to the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which credential pool a remote call is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// User-context token
    User,
    /// Application-only bearer token
    App,
}

impl Credential {
    pub fn as_str(&self) -> &'static str {
        match self {
            Credential::User => "user",
            Credential::App => "app",
        }
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account, reduced to the fields the monitor needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub followers_count: u32,
}

impl User {
    pub fn new(id: u64, screen_name: &str, followers_count: u32) -> Self {
        Self {
            id,
            screen_name: screen_name.to_string(),
            followers_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: u64,
    #[serde(default)]
    pub screen_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hashtag {
    pub text: String,
}

/// Entity annotations attached to a status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub user_mentions: Vec<Mention>,
    #[serde(default)]
    pub hashtags: Vec<Hashtag>,
}

/// A post as returned by status lookup or the sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: u64,
    #[serde(alias = "full_text")]
    pub text: String,
    #[serde(with = "created_at_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, rename = "retweet_count")]
    pub reshare_count: u32,
    pub user: User,
    #[serde(default)]
    pub entities: Entities,
    /// Present when this status is itself a reshare of another post
    #[serde(default, rename = "retweeted_status", skip_serializing_if = "Option::is_none")]
    pub reshared_status: Option<Box<Status>>,
}

impl Status {
    pub fn is_reshare(&self) -> bool {
        self.reshared_status.is_some()
    }

    pub fn is_english(&self) -> bool {
        self.lang.as_deref() == Some("en")
    }
}

/// One page of follower IDs. A `next_cursor` of 0 means the listing is complete.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdPage {
    #[serde(default)]
    pub ids: Vec<u64>,
    #[serde(default)]
    pub next_cursor: i64,
}

/// Cursor value that starts a paginated listing.
pub const FIRST_CURSOR: i64 = -1;

/// Cursor value that marks the end of a paginated listing.
pub const LAST_CURSOR: i64 = 0;

// Timestamps arrive as "Wed Oct 10 20:19:24 +0000 2018".
mod created_at_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(&raw))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
