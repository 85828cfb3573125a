//! Request and response bodies of the catalog API
use std::collections::BTreeMap;

use lakecat_catalog::{
    Branch, Database, Identifier, Partition, PartitionSpec, PartitionStatistics, PropertyChange,
    Schema, SchemaChange, Snapshot, TableMetadata, Token, View, ViewSchema,
};
use serde::{Deserialize, Serialize};

/// Prefix of config defaults that carry extra request headers, e.g. `header.x-tenant`
pub const HEADER_CONFIG_PREFIX: &str = "header.";
pub const PREFIX_CONFIG: &str = "prefix";
pub const WAREHOUSE_CONFIG: &str = "warehouse";

/// The response body of `GET /v1/config`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl ConfigResponse {
    /// The value of `key`, overrides taking precedence over defaults
    pub fn get(&self, key: &str) -> Option<&str> {
        self.overrides
            .get(key)
            .or_else(|| self.defaults.get(key))
            .map(String::as_str)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.get(PREFIX_CONFIG)
    }

    pub fn warehouse(&self) -> Option<&str> {
        self.get(WAREHOUSE_CONFIG)
    }

    /// Headers a client sends with every request
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.defaults
            .iter()
            .chain(self.overrides.iter())
            .filter_map(|(key, value)| {
                key.strip_prefix(HEADER_CONFIG_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    pub name: String,
    #[serde(default)]
    pub ignore_if_exists: bool,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterDatabaseRequest {
    pub changes: Vec<PropertyChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDatabasesResponse {
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDatabaseResponse {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl From<&Database> for GetDatabaseResponse {
    fn from(database: &Database) -> Self {
        Self {
            name: database.name.clone(),
            options: database.options.clone(),
            comment: database.comment().map(ToString::to_string),
        }
    }
}

impl From<GetDatabaseResponse> for Database {
    fn from(response: GetDatabaseResponse) -> Self {
        Self::new(response.name, response.options)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub identifier: Identifier,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTableResponse {
    pub identifier: Identifier,
    pub metadata: TableMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTableRequest {
    pub changes: Vec<SchemaChange>,
}

/// Body of the table and view rename endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    pub destination: Identifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTableRequest {
    /// The branch to commit to, the branch of the path's table if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub snapshot: Snapshot,
    #[serde(default)]
    pub statistics: Vec<PartitionStatistics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTableResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSnapshotResponse {
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTableTokenResponse {
    pub token: BTreeMap<String, String>,
    pub expire_at_millis: i64,
}

impl From<&Token> for GetTableTokenResponse {
    fn from(token: &Token) -> Self {
        Self {
            token: token.token.clone(),
            expire_at_millis: token.expire_at_millis,
        }
    }
}

impl From<GetTableTokenResponse> for Token {
    fn from(response: GetTableTokenResponse) -> Self {
        Self {
            token: response.token,
            expire_at_millis: response.expire_at_millis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPartitionsResponse {
    pub partitions: Vec<Partition>,
}

/// Body of the create, drop, and mark-done partition endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsRequest {
    pub specs: Vec<PartitionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterPartitionsRequest {
    pub partitions: Vec<PartitionStatistics>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBranchesResponse {
    pub branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_tag: Option<String>,
}

pub type GetBranchResponse = Branch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListViewsResponse {
    pub views: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateViewRequest {
    pub identifier: Identifier,
    pub schema: ViewSchema,
}

pub type GetViewResponse = View;
