//! Table handles
//!
//! A [`Table`] is what a catalog hands out for an [`Identifier`]. It carries the table metadata and
//! reads snapshots and manifests from the object store. Catalogs that cache attach
//! [`TableCaches`] so that snapshot and manifest reads are served from memory; copies made with
//! [`Table::copy`] share those caches.
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc};

use bytes::Bytes;
use lakecat_time::TimeProvider;
use object_store::{ObjectStore, PutPayload, path::Path};
use tracing::debug;
use uuid::Uuid;

use crate::{
    CatalogError, CommitKind, Identifier, Result, Schema, Snapshot, SnapshotId, TableMetadata,
};

mod snapshot;

pub use snapshot::SnapshotManager;
pub(crate) use snapshot::{delete_prefix, move_prefix};

/// Name of the default branch
pub const MAIN_BRANCH: &str = "main";

/// Commit user recorded in snapshots created through [`Table::new_snapshot`]
pub const DEFAULT_COMMIT_USER: &str = "lakecat";

/// The system tables that can be derived from a base or branch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTableType {
    Snapshots,
    Schemas,
    Options,
    Tags,
    Branches,
    Consumers,
    Manifests,
    Partitions,
    Files,
    Statistics,
    AuditLog,
    Binlog,
    ReadOptimized,
    AggregationFields,
    TableIndexes,
}

impl SystemTableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshots => "snapshots",
            Self::Schemas => "schemas",
            Self::Options => "options",
            Self::Tags => "tags",
            Self::Branches => "branches",
            Self::Consumers => "consumers",
            Self::Manifests => "manifests",
            Self::Partitions => "partitions",
            Self::Files => "files",
            Self::Statistics => "statistics",
            Self::AuditLog => "audit_log",
            Self::Binlog => "binlog",
            Self::ReadOptimized => "ro",
            Self::AggregationFields => "aggregation_fields",
            Self::TableIndexes => "table_indexes",
        }
    }
}

impl fmt::Display for SystemTableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemTableType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "snapshots" => Self::Snapshots,
            "schemas" => Self::Schemas,
            "options" => Self::Options,
            "tags" => Self::Tags,
            "branches" => Self::Branches,
            "consumers" => Self::Consumers,
            "manifests" => Self::Manifests,
            "partitions" => Self::Partitions,
            "files" => Self::Files,
            "statistics" => Self::Statistics,
            "audit_log" => Self::AuditLog,
            "binlog" => Self::Binlog,
            "ro" | "read_optimized" => Self::ReadOptimized,
            "aggregation_fields" => Self::AggregationFields,
            "table_indexes" => Self::TableIndexes,
            other => {
                return Err(CatalogError::invalid_argument(format!(
                    "unknown system table '{other}'"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    Base,
    Branch(String),
    System(SystemTableType),
    BranchSystem {
        branch: String,
        system: SystemTableType,
    },
}

/// A cache a [`Table`] consults before going to the object store
pub trait ObjectCache<K, V>: fmt::Debug + Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    /// Offer `value` for `key` and return the value the cache holds afterwards
    ///
    /// When another reader published a value for `key` first, that value is returned.
    fn put(&self, key: K, value: V) -> V;
}

/// Caches attached to a [`Table`] by a caching catalog
#[derive(Debug, Clone, Default)]
pub struct TableCaches {
    /// Snapshots of this table's branch, by id
    pub snapshots: Option<Arc<dyn ObjectCache<SnapshotId, Arc<Snapshot>>>>,
    /// Manifest file content, shared by every table of a catalog
    pub manifests: Option<Arc<dyn ObjectCache<Path, Bytes>>>,
}

/// The manifests of the latest snapshot of a table
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub snapshot: Option<Arc<Snapshot>>,
    pub manifests: Vec<ManifestFile>,
}

#[derive(Debug, Clone)]
pub struct ManifestFile {
    pub path: Path,
    pub content: Bytes,
}

/// A handle on a base, branch, or system table
#[derive(Debug, Clone)]
pub struct Table {
    identifier: Identifier,
    kind: TableKind,
    metadata: Arc<TableMetadata>,
    dynamic_options: BTreeMap<String, String>,
    snapshots: SnapshotManager,
    caches: TableCaches,
    time_provider: Arc<dyn TimeProvider>,
}

impl Table {
    /// Create a handle on the base or branch table named by `identifier`
    ///
    /// Any system table suffix of `identifier` is ignored, use [`Table::system_table`] to derive
    /// system tables.
    pub fn new(
        identifier: &Identifier,
        metadata: Arc<TableMetadata>,
        store: Arc<dyn ObjectStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let identifier = identifier.without_system_table();
        let kind = match identifier.branch() {
            Some(branch) => TableKind::Branch(branch.to_string()),
            None => TableKind::Base,
        };
        let snapshots = SnapshotManager::new(
            store,
            Path::from(metadata.location.as_str()),
            identifier.branch_or_default(),
        );
        Self {
            identifier,
            kind,
            metadata,
            dynamic_options: BTreeMap::new(),
            snapshots,
            caches: TableCaches::default(),
            time_provider,
        }
    }

    /// A copy of this handle that reads through `caches`
    pub fn with_caches(&self, caches: TableCaches) -> Self {
        Self {
            caches,
            ..self.clone()
        }
    }

    /// A new handle with `options` layered over the current options
    ///
    /// The copy shares the caches of this handle.
    pub fn copy(&self, options: BTreeMap<String, String>) -> Arc<Self> {
        let mut copy = self.clone();
        copy.dynamic_options.extend(options);
        Arc::new(copy)
    }

    /// Derive the system table named by `identifier` from this base or branch table
    ///
    /// An unknown system table name resolves to [`CatalogError::TableNotExist`].
    pub fn load_system_table(&self, identifier: &Identifier) -> Result<Arc<Self>> {
        let Some(name) = identifier.system_table() else {
            return Err(CatalogError::invalid_argument(format!(
                "{identifier} is not a system table"
            )));
        };
        let system = SystemTableType::from_str(name)
            .map_err(|_| CatalogError::table_not_exist(identifier))?;
        self.system_table(system)
    }

    pub fn system_table(&self, system: SystemTableType) -> Result<Arc<Self>> {
        let kind = match &self.kind {
            TableKind::Base => TableKind::System(system),
            TableKind::Branch(branch) => TableKind::BranchSystem {
                branch: branch.clone(),
                system,
            },
            TableKind::System(_) | TableKind::BranchSystem { .. } => {
                return Err(CatalogError::invalid_argument(format!(
                    "cannot derive a system table from system table {}",
                    self.identifier
                )));
            }
        };
        let identifier = Identifier::from_parts(
            self.identifier.database(),
            self.identifier.table(),
            self.identifier.branch(),
            Some(system.as_str()),
        );
        Ok(Arc::new(Self {
            identifier,
            kind,
            ..self.clone()
        }))
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn is_system_table(&self) -> bool {
        matches!(
            self.kind,
            TableKind::System(_) | TableKind::BranchSystem { .. }
        )
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &Schema {
        &self.metadata.schema
    }

    pub fn uuid(&self) -> &str {
        &self.metadata.uuid
    }

    pub fn location(&self) -> &Path {
        self.snapshots.location()
    }

    pub fn branch(&self) -> &str {
        self.snapshots.branch()
    }

    pub fn partition_keys(&self) -> &[String] {
        &self.metadata.schema.partition_keys
    }

    /// Schema options overlaid with the options given to [`Table::copy`]
    pub fn options(&self) -> BTreeMap<String, String> {
        let mut options = self.metadata.schema.options.clone();
        options.extend(
            self.dynamic_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        options
    }

    pub fn snapshot_manager(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Load snapshot `id` of this table's branch
    pub async fn snapshot(&self, id: SnapshotId) -> Result<Arc<Snapshot>> {
        if let Some(cache) = &self.caches.snapshots {
            if let Some(snapshot) = cache.get(&id) {
                return Ok(snapshot);
            }
        }
        let snapshot = self.snapshots.read(id).await?.map(Arc::new).ok_or_else(|| {
            CatalogError::SnapshotNotExist {
                identifier: self.identifier.clone(),
                snapshot_id: id,
            }
        })?;
        Ok(match &self.caches.snapshots {
            Some(cache) => cache.put(id, snapshot),
            None => snapshot,
        })
    }

    pub async fn snapshot_ids(&self) -> Result<Vec<SnapshotId>> {
        self.snapshots.snapshot_ids().await
    }

    pub async fn latest_snapshot(&self) -> Result<Option<Arc<Snapshot>>> {
        match self.snapshots.latest_id().await? {
            Some(id) => self.snapshot(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Read every manifest of the latest snapshot
    pub async fn scan(&self) -> Result<ScanPlan> {
        if self.is_system_table() {
            return Err(CatalogError::unsupported(format!(
                "system table {} cannot be scanned directly",
                self.identifier
            )));
        }
        let Some(snapshot) = self.latest_snapshot().await? else {
            return Ok(ScanPlan {
                snapshot: None,
                manifests: vec![],
            });
        };
        let mut manifests = Vec::with_capacity(snapshot.manifests.len());
        for name in &snapshot.manifests {
            let path = self.snapshots.manifest_dir().child(name.as_str());
            let content = self.read_manifest(&path).await?;
            manifests.push(ManifestFile { path, content });
        }
        Ok(ScanPlan {
            snapshot: Some(snapshot),
            manifests,
        })
    }

    async fn read_manifest(&self, path: &Path) -> Result<Bytes> {
        if let Some(cache) = &self.caches.manifests {
            if let Some(content) = cache.get(path) {
                return Ok(content);
            }
        }
        let content = self.snapshots.store().get(path).await?.bytes().await?;
        Ok(match &self.caches.manifests {
            Some(cache) => cache.put(path.clone(), content),
            None => content,
        })
    }

    /// Write `manifests` and build the snapshot that would follow the latest one
    ///
    /// The snapshot is not published, commit it through the catalog.
    pub async fn new_snapshot(
        &self,
        commit_kind: CommitKind,
        manifests: Vec<Bytes>,
        record_count: i64,
    ) -> Result<Snapshot> {
        if self.is_system_table() {
            return Err(CatalogError::unsupported(format!(
                "system table {} is read-only",
                self.identifier
            )));
        }
        let latest = self.latest_snapshot().await?;
        let id = latest.as_ref().map_or(1, |s| s.id + 1);

        let mut names = Vec::with_capacity(manifests.len());
        for content in manifests {
            let name = format!("manifest-{}", Uuid::new_v4());
            let path = self.snapshots.manifest_dir().child(name.as_str());
            self.snapshots
                .store()
                .put(&path, PutPayload::from(content))
                .await?;
            debug!(%path, "wrote manifest");
            names.push(name);
        }

        let previous_total = latest.as_ref().map_or(0, |s| s.total_record_count);
        let total_record_count = match commit_kind {
            CommitKind::Overwrite => record_count,
            _ => previous_total + record_count,
        };
        Ok(Snapshot {
            id,
            schema_id: self.metadata.schema_id,
            commit_user: DEFAULT_COMMIT_USER.to_string(),
            commit_identifier: id,
            commit_kind,
            time_millis: self.time_provider.now().timestamp_millis(),
            manifests: names,
            total_record_count,
            delta_record_count: record_count,
            watermark: None,
        })
    }
}
