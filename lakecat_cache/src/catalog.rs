//! A [`Catalog`] decorator that caches metadata reads
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use lakecat_catalog::{
    Branch, Catalog, CatalogError, Database, Identifier, Partition, PartitionSpec,
    PartitionStatistics, PropertyChange, Result, Schema, SchemaChange, Snapshot, SnapshotId,
    Table, Token, View, ViewSchema,
    table::TableCaches,
};
use lakecat_time::TimeProvider;
use tracing::{debug, info};

use crate::{CacheConfigError, CacheOptions, ManifestCache, TtlCache};

type SnapshotCache = TtlCache<SnapshotId, Arc<Snapshot>>;

/// Wraps a [`Catalog`] and serves repeated metadata reads from memory
///
/// Reads go through per-kind [`TtlCache`]s. Writes are delegated first and, once the wrapped
/// catalog reports success, every cache entry the write may have changed is invalidated before
/// the call returns, so a caller never reads back state older than its own writes. Nothing is
/// cached on a write and errors are never cached.
///
/// System tables are not cached themselves; they are derived on every call from the cached base
/// or branch table. Tables handed out read snapshots and manifests through caches owned by this
/// catalog, so handles reloaded after expiry, and copies of them, share the same snapshots.
#[derive(Debug)]
pub struct CachingCatalog {
    inner: Arc<dyn Catalog>,
    options: CacheOptions,
    time_provider: Arc<dyn TimeProvider>,
    database_cache: TtlCache<String, Arc<Database>>,
    table_cache: TtlCache<Identifier, Arc<Table>>,
    partition_cache: Option<TtlCache<Identifier, Vec<Partition>>>,
    /// Latest snapshot by table
    snapshot_cache: TtlCache<Identifier, Arc<Snapshot>>,
    token_cache: TtlCache<Identifier, Arc<Token>>,
    /// Snapshots by id, one cache per base or branch table
    table_snapshots: DashMap<Identifier, Arc<SnapshotCache>>,
    manifest_cache: Arc<ManifestCache>,
}

impl CachingCatalog {
    pub fn try_new(
        inner: Arc<dyn Catalog>,
        options: CacheOptions,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self, CacheConfigError> {
        options.validate()?;
        let policy = options.ttl_policy();
        let partition_cache = (options.partition_max_num > 0).then(|| {
            TtlCache::new("partition", policy, Arc::clone(&time_provider)).with_max_weight(
                options.partition_max_num,
                |partitions: &Vec<Partition>| partitions.len() as u64,
            )
        });
        info!(
            expire_after_access = ?options.expire_after_access,
            expire_after_write = ?options.expire_after_write,
            partition_cache = partition_cache.is_some(),
            "created caching catalog"
        );
        Ok(Self {
            database_cache: TtlCache::new("database", policy, Arc::clone(&time_provider)),
            table_cache: TtlCache::new("table", policy, Arc::clone(&time_provider)),
            partition_cache,
            snapshot_cache: TtlCache::new("snapshot", policy, Arc::clone(&time_provider)),
            token_cache: TtlCache::new("token", policy, Arc::clone(&time_provider)),
            table_snapshots: DashMap::new(),
            manifest_cache: Arc::new(ManifestCache::from_options(&options)),
            inner,
            options,
            time_provider,
        })
    }

    /// Wrap `catalog` unless caching is disabled in `options`
    pub fn try_to_create(
        catalog: Arc<dyn Catalog>,
        options: CacheOptions,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Arc<dyn Catalog>, CacheConfigError> {
        if !options.enabled {
            return Ok(catalog);
        }
        Ok(Arc::new(Self::try_new(catalog, options, time_provider)?))
    }

    pub fn inner(&self) -> &Arc<dyn Catalog> {
        &self.inner
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn database_cache(&self) -> &TtlCache<String, Arc<Database>> {
        &self.database_cache
    }

    pub fn table_cache(&self) -> &TtlCache<Identifier, Arc<Table>> {
        &self.table_cache
    }

    pub fn partition_cache(&self) -> Option<&TtlCache<Identifier, Vec<Partition>>> {
        self.partition_cache.as_ref()
    }

    pub fn snapshot_cache(&self) -> &TtlCache<Identifier, Arc<Snapshot>> {
        &self.snapshot_cache
    }

    pub fn token_cache(&self) -> &TtlCache<Identifier, Arc<Token>> {
        &self.token_cache
    }

    pub fn manifest_cache(&self) -> &Arc<ManifestCache> {
        &self.manifest_cache
    }

    /// The snapshot-by-id cache of a base or branch table
    fn snapshots_of(&self, identifier: &Identifier) -> Arc<SnapshotCache> {
        let cache = self
            .table_snapshots
            .entry(identifier.without_system_table())
            .or_insert_with(|| {
                Arc::new(
                    TtlCache::new(
                        "table_snapshot",
                        self.options.ttl_policy(),
                        Arc::clone(&self.time_provider),
                    )
                    .with_max_weight(self.options.snapshot_max_num_per_table, |_| 1),
                )
            });
        Arc::clone(cache.value())
    }

    fn attach_caches(&self, table: &Table, snapshots: Arc<SnapshotCache>) -> Arc<Table> {
        Arc::new(table.with_caches(TableCaches {
            snapshots: Some(snapshots as _),
            manifests: Some(Arc::clone(&self.manifest_cache) as _),
        }))
    }

    /// Invalidate `identifier` and every branch and system table derived from it
    pub fn invalidate_table(&self, identifier: &Identifier) {
        let affected = |k: &Identifier| k == identifier || k.is_derivative_of(identifier);
        self.table_cache.invalidate_if(affected);
        if let Some(cache) = &self.partition_cache {
            cache.invalidate_if(affected);
        }
        self.snapshot_cache.invalidate_if(affected);
        self.token_cache.invalidate_if(affected);
        self.drop_table_snapshots(affected);
        debug!(%identifier, "invalidated table and derivatives");
    }

    /// Loads still holding a dropped snapshot cache must not publish into it
    fn drop_table_snapshots(&self, affected: impl Fn(&Identifier) -> bool) {
        self.table_snapshots.retain(|k, cache| {
            if affected(k) {
                cache.invalidate_all();
                false
            } else {
                true
            }
        });
    }

    fn invalidate_database_tables(&self, database: &str) {
        let affected = |k: &Identifier| k.database() == database;
        self.table_cache.invalidate_if(affected);
        if let Some(cache) = &self.partition_cache {
            cache.invalidate_if(affected);
        }
        self.snapshot_cache.invalidate_if(affected);
        self.token_cache.invalidate_if(affected);
        self.drop_table_snapshots(affected);
    }

    /// Partitions are shared by the branches of a table
    fn invalidate_partitions(&self, identifier: &Identifier) {
        if let Some(cache) = &self.partition_cache {
            let base = identifier.base();
            cache.invalidate_if(|k| k.base() == base);
        }
    }

    /// Reload the partitions of `identifier` into the partition cache
    pub async fn refresh_partitions(&self, identifier: &Identifier) -> Result<()> {
        let Some(cache) = &self.partition_cache else {
            return Ok(());
        };
        let partitions = self.inner.list_partitions(identifier).await?;
        cache.put(identifier.clone(), partitions);
        Ok(())
    }

    /// Drop the expired entries of every cache
    pub fn clean_up(&self) {
        self.database_cache.clean_up();
        self.table_cache.clean_up();
        if let Some(cache) = &self.partition_cache {
            cache.clean_up();
        }
        self.snapshot_cache.clean_up();
        self.token_cache.clean_up();
        self.table_snapshots.retain(|_, cache| {
            cache.clean_up();
            !cache.is_empty()
        });
    }
}

#[async_trait]
impl Catalog for CachingCatalog {
    async fn list_databases(&self) -> Result<Vec<String>> {
        self.inner.list_databases().await
    }

    async fn create_database(
        &self,
        name: &str,
        ignore_if_exists: bool,
        options: BTreeMap<String, String>,
    ) -> Result<()> {
        self.inner
            .create_database(name, ignore_if_exists, options)
            .await?;
        self.database_cache.invalidate(&name.to_string());
        Ok(())
    }

    async fn get_database(&self, name: &str) -> Result<Arc<Database>> {
        self.database_cache
            .get_or_try_load(&name.to_string(), || self.inner.get_database(name))
            .await
    }

    async fn drop_database(
        &self,
        name: &str,
        ignore_if_not_exists: bool,
        cascade: bool,
    ) -> Result<()> {
        self.inner
            .drop_database(name, ignore_if_not_exists, cascade)
            .await?;
        self.database_cache.invalidate(&name.to_string());
        self.invalidate_database_tables(name);
        Ok(())
    }

    async fn alter_database(
        &self,
        name: &str,
        changes: Vec<PropertyChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        self.inner
            .alter_database(name, changes, ignore_if_not_exists)
            .await?;
        self.database_cache.invalidate(&name.to_string());
        Ok(())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.inner.list_tables(database).await
    }

    async fn get_table(&self, identifier: &Identifier) -> Result<Arc<Table>> {
        let origin = identifier.without_system_table();
        let table = self
            .table_cache
            .get_or_try_load(&origin, || async {
                let snapshots = self.snapshots_of(&origin);
                let table = self.inner.get_table(&origin).await?;
                Ok::<_, CatalogError>(self.attach_caches(&table, snapshots))
            })
            .await?;
        if identifier.is_system_table() {
            return table.load_system_table(identifier);
        }
        Ok(table)
    }

    async fn create_table(
        &self,
        identifier: &Identifier,
        schema: Schema,
        ignore_if_exists: bool,
    ) -> Result<()> {
        self.inner
            .create_table(identifier, schema, ignore_if_exists)
            .await?;
        self.invalidate_table(identifier);
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn drop_table(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()> {
        self.inner
            .drop_table(identifier, ignore_if_not_exists)
            .await?;
        self.invalidate_table(identifier);
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn rename_table(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        self.inner
            .rename_table(from, to, ignore_if_not_exists)
            .await?;
        self.invalidate_table(from);
        self.invalidate_partitions(from);
        self.invalidate_table(to);
        self.invalidate_partitions(to);
        Ok(())
    }

    async fn alter_table(
        &self,
        identifier: &Identifier,
        changes: Vec<SchemaChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        self.inner
            .alter_table(identifier, changes, ignore_if_not_exists)
            .await?;
        let affected = |k: &Identifier| k == identifier || k.is_system_table_of(identifier);
        self.table_cache.invalidate_if(affected);
        if let Some(cache) = &self.partition_cache {
            cache.invalidate_if(affected);
        }
        Ok(())
    }

    async fn list_views(&self, database: &str) -> Result<Vec<String>> {
        self.inner.list_views(database).await
    }

    async fn get_view(&self, identifier: &Identifier) -> Result<Arc<View>> {
        self.inner.get_view(identifier).await
    }

    async fn create_view(
        &self,
        identifier: &Identifier,
        schema: ViewSchema,
        ignore_if_exists: bool,
    ) -> Result<()> {
        self.inner
            .create_view(identifier, schema, ignore_if_exists)
            .await
    }

    async fn drop_view(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()> {
        self.inner.drop_view(identifier, ignore_if_not_exists).await
    }

    async fn rename_view(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        self.inner
            .rename_view(from, to, ignore_if_not_exists)
            .await
    }

    async fn list_partitions(&self, identifier: &Identifier) -> Result<Vec<Partition>> {
        match &self.partition_cache {
            Some(cache) => {
                cache
                    .get_or_try_load(identifier, || self.inner.list_partitions(identifier))
                    .await
            }
            None => self.inner.list_partitions(identifier).await,
        }
    }

    async fn create_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        self.inner.create_partitions(identifier, specs).await?;
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn drop_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        self.inner.drop_partitions(identifier, specs).await?;
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn alter_partitions(
        &self,
        identifier: &Identifier,
        partitions: Vec<PartitionStatistics>,
    ) -> Result<()> {
        self.inner.alter_partitions(identifier, partitions).await?;
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn mark_done_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        self.inner.mark_done_partitions(identifier, specs).await?;
        self.invalidate_partitions(identifier);
        Ok(())
    }

    async fn list_branches(&self, identifier: &Identifier) -> Result<Vec<String>> {
        self.inner.list_branches(identifier).await
    }

    async fn get_branch(&self, identifier: &Identifier, branch: &str) -> Result<Branch> {
        self.inner.get_branch(identifier, branch).await
    }

    async fn create_branch(
        &self,
        identifier: &Identifier,
        branch: &str,
        from_tag: Option<&str>,
    ) -> Result<()> {
        self.inner
            .create_branch(identifier, branch, from_tag)
            .await?;
        self.invalidate_table(&branch_identifier(identifier, branch));
        Ok(())
    }

    async fn drop_branch(&self, identifier: &Identifier, branch: &str) -> Result<()> {
        self.inner.drop_branch(identifier, branch).await?;
        self.invalidate_table(&branch_identifier(identifier, branch));
        Ok(())
    }

    async fn fast_forward(&self, identifier: &Identifier, branch: &str) -> Result<()> {
        self.inner.fast_forward(identifier, branch).await?;
        let affected = |k: &Identifier| k == identifier || k.is_system_table_of(identifier);
        self.table_cache.invalidate_if(affected);
        self.snapshot_cache.invalidate_if(affected);
        self.drop_table_snapshots(affected);
        Ok(())
    }

    async fn load_snapshot(&self, identifier: &Identifier) -> Result<Option<Arc<Snapshot>>> {
        let origin = identifier.without_system_table();
        if let Some(snapshot) = self.snapshot_cache.get(&origin) {
            return Ok(Some(snapshot));
        }
        let latest = self.snapshot_cache.start_load(&origin);
        // the id is only known once loaded, so the whole per-table cache guards it
        let snapshots = self.snapshots_of(&origin);
        let generation = snapshots.generation();
        let Some(snapshot) = self.inner.load_snapshot(&origin).await? else {
            return Ok(None);
        };
        let snapshot = snapshots.insert_if_unchanged(snapshot.id, snapshot, generation);
        Ok(Some(latest.finish(snapshot)))
    }

    async fn commit_snapshot(
        &self,
        identifier: &Identifier,
        snapshot: Snapshot,
        statistics: Vec<PartitionStatistics>,
    ) -> Result<bool> {
        let success = self
            .inner
            .commit_snapshot(identifier, snapshot, statistics)
            .await?;
        self.snapshot_cache
            .invalidate(&identifier.without_system_table());
        self.invalidate_partitions(identifier);
        Ok(success)
    }

    /// Tokens are issued per base table, branches and system tables share them
    async fn get_token(&self, identifier: &Identifier) -> Result<Arc<Token>> {
        let base = identifier.base();
        let now = self.time_provider.now().timestamp_millis();
        if let Some(token) = self.token_cache.get(&base) {
            if !token.is_expired(now) {
                return Ok(token);
            }
            self.token_cache.invalidate(&base);
        }
        let pending = self.token_cache.start_load(&base);
        let token = self.inner.get_token(identifier).await?;
        Ok(pending.finish(token))
    }
}

fn branch_identifier(identifier: &Identifier, branch: &str) -> Identifier {
    Identifier::from_parts(identifier.database(), identifier.table(), Some(branch), None)
}
