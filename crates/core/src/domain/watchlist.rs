use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Manager,
    Security,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Security => "security",
        }
    }

    /// Name of the argument that carries this item's key.
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Manager => "cik",
            Self::Security => "cusip",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "security" => Ok(Self::Security),
            other => Err(format!("item_type must be 'manager' or 'security', got '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWatchlistItem {
    pub item_type: ItemType,
    /// CIK for managers, CUSIP for securities.
    pub key: String,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: String,
    pub user_id: String,
    pub item_type: ItemType,
    pub key: String,
    /// Display name resolved from the managers or issuers table.
    pub name: String,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
}
