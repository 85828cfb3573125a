use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of resource an [`ErrorResponse`] is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Database,
    Table,
    Column,
    View,
    Snapshot,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Database => "DATABASE",
            Self::Table => "TABLE",
            Self::Column => "COLUMN",
            Self::View => "VIEW",
            Self::Snapshot => "SNAPSHOT",
        };
        f.write_str(s)
    }
}

/// The body of every error response of the catalog API
///
/// `resource_name` is the database name for [`ResourceType::Database`], the dotted identifier
/// for tables and views, the column name for columns, and the snapshot id for snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub resource_type: Option<ResourceType>,
    pub resource_name: Option<String>,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            resource_type: None,
            resource_name: None,
            message: message.into(),
            code,
        }
    }

    pub fn with_resource(mut self, resource_type: ResourceType, name: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_name = Some(name.into());
        self
    }
}
