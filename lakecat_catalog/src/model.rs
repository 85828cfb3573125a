//! Metadata objects managed by a catalog
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Identifier;

/// Table option that marks a partitioned table as having its partitions tracked by the catalog
pub const METASTORE_PARTITIONED_TABLE: &str = "metastore.partitioned-table";

/// Database option carrying the database comment
pub const COMMENT_OPTION: &str = "comment";

pub type SnapshotId = i64;

/// Partition column name to value
pub type PartitionSpec = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Database {
    pub fn new(name: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.options.get(COMMENT_OPTION).map(String::as_str)
    }
}

/// A change to a database's options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PropertyChange {
    Set { key: String, value: String },
    Remove { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DataField {
    pub fn new(id: i32, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            data_type: data_type.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub fields: Vec<DataField>,
    #[serde(default)]
    pub partition_keys: Vec<String>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Schema {
    pub fn new(fields: Vec<DataField>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    pub fn with_partition_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn highest_field_id(&self) -> i32 {
        self.fields.iter().map(|f| f.id).max().unwrap_or(-1)
    }

    /// Whether the partitions of this table are tracked by the catalog
    pub fn partitioned_in_metastore(&self) -> bool {
        !self.partition_keys.is_empty()
            && self
                .options
                .get(METASTORE_PARTITIONED_TABLE)
                .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// A change to a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SchemaChange {
    SetOption {
        key: String,
        value: String,
    },
    RemoveOption {
        key: String,
    },
    AddColumn {
        name: String,
        data_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    RenameColumn {
        old_name: String,
        new_name: String,
    },
    DropColumn {
        name: String,
    },
    UpdateComment {
        comment: Option<String>,
    },
}

/// Everything a catalog knows about a table besides its snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub uuid: String,
    pub location: String,
    pub schema_id: i64,
    pub schema: Schema,
    #[serde(default)]
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub spec: PartitionSpec,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
    pub file_count: i64,
    pub last_file_creation_time: i64,
    #[serde(default)]
    pub done: bool,
}

impl Partition {
    pub fn new(spec: PartitionSpec) -> Self {
        Self {
            spec,
            record_count: 0,
            file_size_in_bytes: 0,
            file_count: 0,
            last_file_creation_time: 0,
            done: false,
        }
    }

    /// Accumulate a statistics delta into this partition
    pub fn apply(&mut self, stats: &PartitionStatistics) {
        self.record_count += stats.record_count;
        self.file_size_in_bytes += stats.file_size_in_bytes;
        self.file_count += stats.file_count;
        self.last_file_creation_time = self
            .last_file_creation_time
            .max(stats.last_file_creation_time);
    }
}

/// Statistics of a partition, either absolute or as a delta produced by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatistics {
    pub spec: PartitionSpec,
    pub record_count: i64,
    pub file_size_in_bytes: i64,
    pub file_count: i64,
    pub last_file_creation_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitKind {
    Append,
    Compact,
    Overwrite,
    Analyze,
}

/// An immutable version of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: SnapshotId,
    pub schema_id: i64,
    pub commit_user: String,
    pub commit_identifier: i64,
    pub commit_kind: CommitKind,
    pub time_millis: i64,
    /// Manifest file names, relative to the table's manifest directory
    pub manifests: Vec<String>,
    pub total_record_count: i64,
    pub delta_record_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_tag: Option<String>,
    pub create_time_millis: i64,
}

/// Credentials granting access to a table's files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub token: BTreeMap<String, String>,
    pub expire_at_millis: i64,
}

impl Token {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at_millis <= now_millis
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSchema {
    pub fields: Vec<DataField>,
    pub query: String,
    /// Dialect specific variants of `query`
    #[serde(default)]
    pub dialects: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub identifier: Identifier,
    pub schema: ViewSchema,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partitioned_in_metastore() {
        let schema = Schema::new(vec![DataField::new(0, "f0", "INT")]);
        assert!(!schema.partitioned_in_metastore());

        let schema = schema.with_partition_keys(["f0"]);
        assert!(!schema.partitioned_in_metastore());

        let schema = schema.with_option(METASTORE_PARTITIONED_TABLE, "TRUE");
        assert!(schema.partitioned_in_metastore());
    }

    #[test]
    fn partition_accumulates_statistics() {
        let spec = PartitionSpec::from([("dt".to_string(), "2024-01-01".to_string())]);
        let mut partition = Partition::new(spec.clone());
        let delta = PartitionStatistics {
            spec,
            record_count: 10,
            file_size_in_bytes: 100,
            file_count: 1,
            last_file_creation_time: 7,
        };
        partition.apply(&delta);
        partition.apply(&delta);
        assert_eq!(partition.record_count, 20);
        assert_eq!(partition.file_size_in_bytes, 200);
        assert_eq!(partition.file_count, 2);
        assert_eq!(partition.last_file_creation_time, 7);
    }

    #[test]
    fn schema_change_wire_form() {
        let change = SchemaChange::RenameColumn {
            old_name: "a".into(),
            new_name: "b".into(),
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            serde_json::json!({"action": "renameColumn", "oldName": "a", "newName": "b"})
        );
    }
}
