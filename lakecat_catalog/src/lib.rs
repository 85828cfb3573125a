//! The lakecat catalog model and the operation contract every catalog backend implements
//!
//! The [`Catalog`] trait is the single seam between engines and metadata backends: the in-memory
//! [`MemCatalog`], the remote client, and the caching decorator all implement it, so they can be
//! stacked freely.
use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;

mod error;
mod identifier;
pub mod mem;
mod model;
pub mod table;

pub use error::{CatalogError, ErrorKind, Result};
pub use identifier::Identifier;
pub use mem::MemCatalog;
pub use model::*;
pub use table::{MAIN_BRANCH, SystemTableType, Table, TableKind};

/// Operations a catalog backend supports
///
/// Every operation reports missing or duplicate resources with the matching [`CatalogError`]
/// variant. Operations taking `ignore_if_exists` / `ignore_if_not_exists` turn the corresponding
/// condition into a no-op.
#[async_trait]
pub trait Catalog: Debug + Send + Sync + 'static {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn create_database(
        &self,
        name: &str,
        ignore_if_exists: bool,
        options: BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_database(&self, name: &str) -> Result<Arc<Database>>;

    /// Drop a database; without `cascade` the database must not contain tables or views
    async fn drop_database(&self, name: &str, ignore_if_not_exists: bool, cascade: bool)
    -> Result<()>;

    async fn alter_database(
        &self,
        name: &str,
        changes: Vec<PropertyChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    /// Get a handle on a base, branch, or system table
    async fn get_table(&self, identifier: &Identifier) -> Result<Arc<Table>>;

    async fn create_table(
        &self,
        identifier: &Identifier,
        schema: Schema,
        ignore_if_exists: bool,
    ) -> Result<()>;

    async fn drop_table(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()>;

    async fn rename_table(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()>;

    async fn alter_table(
        &self,
        identifier: &Identifier,
        changes: Vec<SchemaChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()>;

    async fn list_views(&self, database: &str) -> Result<Vec<String>>;

    async fn get_view(&self, identifier: &Identifier) -> Result<Arc<View>>;

    async fn create_view(
        &self,
        identifier: &Identifier,
        schema: ViewSchema,
        ignore_if_exists: bool,
    ) -> Result<()>;

    async fn drop_view(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()>;

    async fn rename_view(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()>;

    async fn list_partitions(&self, identifier: &Identifier) -> Result<Vec<Partition>>;

    async fn create_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()>;

    async fn drop_partitions(&self, identifier: &Identifier, specs: Vec<PartitionSpec>)
    -> Result<()>;

    /// Replace the statistics of the given partitions
    async fn alter_partitions(
        &self,
        identifier: &Identifier,
        partitions: Vec<PartitionStatistics>,
    ) -> Result<()>;

    async fn mark_done_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()>;

    async fn list_branches(&self, identifier: &Identifier) -> Result<Vec<String>>;

    async fn get_branch(&self, identifier: &Identifier, branch: &str) -> Result<Branch>;

    /// Create `branch`, empty or starting from the snapshot of `from_tag`
    async fn create_branch(
        &self,
        identifier: &Identifier,
        branch: &str,
        from_tag: Option<&str>,
    ) -> Result<()>;

    async fn drop_branch(&self, identifier: &Identifier, branch: &str) -> Result<()>;

    /// Replace the main branch with the state of `branch`
    async fn fast_forward(&self, identifier: &Identifier, branch: &str) -> Result<()>;

    /// The latest snapshot of the table's branch, `None` for a table without snapshots
    async fn load_snapshot(&self, identifier: &Identifier) -> Result<Option<Arc<Snapshot>>>;

    /// Try to publish `snapshot` as the next version of the table's branch
    ///
    /// Returns `false` when another writer published that version first; `statistics` are
    /// applied to the table's partitions only on success.
    async fn commit_snapshot(
        &self,
        identifier: &Identifier,
        snapshot: Snapshot,
        statistics: Vec<PartitionStatistics>,
    ) -> Result<bool>;

    async fn get_token(&self, identifier: &Identifier) -> Result<Arc<Token>>;
}
