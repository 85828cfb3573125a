//! A catalog that keeps its metadata in memory
//!
//! Snapshots and manifests are kept in an [`ObjectStore`] like with any other backend, so table
//! handles behave the same whether they come from here or from a remote catalog sharing the
//! store. This is the backend of the reference server and of most tests.
use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use lakecat_time::TimeProvider;
use object_store::{ObjectStore, memory::InMemory, path::Path};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    Branch, Catalog, CatalogError, DataField, Database, Identifier, MAIN_BRANCH, Partition,
    PartitionSpec, PartitionStatistics, PropertyChange, Result, Schema, SchemaChange, Snapshot,
    SnapshotId, Table, TableMetadata, Token, View, ViewSchema,
    table::{SnapshotManager, delete_prefix, move_prefix},
};

/// Root path of the tables of a [`MemCatalog`] created with [`MemCatalog::new`]
pub const DEFAULT_WAREHOUSE: &str = "warehouse";

/// How long generated table tokens are valid
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub struct MemCatalog {
    state: RwLock<State>,
    store: Arc<dyn ObjectStore>,
    warehouse: Path,
    time_provider: Arc<dyn TimeProvider>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, DatabaseState>,
}

#[derive(Debug)]
struct DatabaseState {
    database: Database,
    tables: BTreeMap<String, TableState>,
    views: BTreeMap<String, ViewSchema>,
}

#[derive(Debug)]
struct TableState {
    metadata: TableMetadata,
    partitions: BTreeMap<PartitionSpec, Partition>,
    branches: BTreeMap<String, BranchState>,
    tags: BTreeMap<String, SnapshotId>,
    token: Option<Token>,
}

#[derive(Debug, Clone)]
struct BranchState {
    branch: Branch,
    schema_id: i64,
    schema: Schema,
}

impl State {
    fn database(&self, name: &str) -> Result<&DatabaseState> {
        self.databases
            .get(name)
            .ok_or_else(|| CatalogError::DatabaseNotExist {
                database: name.to_string(),
            })
    }

    fn database_mut(&mut self, name: &str) -> Result<&mut DatabaseState> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| CatalogError::DatabaseNotExist {
                database: name.to_string(),
            })
    }

    fn table(&self, identifier: &Identifier) -> Result<&TableState> {
        self.databases
            .get(identifier.database())
            .and_then(|db| db.tables.get(identifier.table()))
            .ok_or_else(|| CatalogError::table_not_exist(&identifier.without_system_table()))
    }

    fn table_mut(&mut self, identifier: &Identifier) -> Result<&mut TableState> {
        self.databases
            .get_mut(identifier.database())
            .and_then(|db| db.tables.get_mut(identifier.table()))
            .ok_or_else(|| CatalogError::table_not_exist(&identifier.without_system_table()))
    }

    fn partitioned_table_mut(&mut self, identifier: &Identifier) -> Result<&mut TableState> {
        let table = self.table_mut(identifier)?;
        if !table.metadata.schema.partitioned_in_metastore() {
            return Err(CatalogError::unsupported(format!(
                "Table {identifier} is not partitioned in the metastore."
            )));
        }
        Ok(table)
    }

    /// Metadata of the base table or of the branch named by `identifier`
    fn table_metadata(&self, identifier: &Identifier) -> Result<TableMetadata> {
        let table = self.table(identifier)?;
        match identifier.branch() {
            None => Ok(table.metadata.clone()),
            Some(name) => {
                let branch = table.branches.get(name).ok_or_else(|| {
                    CatalogError::table_not_exist(&identifier.without_system_table())
                })?;
                Ok(TableMetadata {
                    schema_id: branch.schema_id,
                    schema: branch.schema.clone(),
                    ..table.metadata.clone()
                })
            }
        }
    }
}

impl MemCatalog {
    /// A catalog over a fresh in-memory object store
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_object_store(
            Arc::new(InMemory::new()),
            Path::from(DEFAULT_WAREHOUSE),
            time_provider,
        )
    }

    /// A catalog whose tables live below `warehouse` in `store`
    pub fn with_object_store(
        store: Arc<dyn ObjectStore>,
        warehouse: Path,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            state: RwLock::new(State::default()),
            store,
            warehouse,
            time_provider,
        }
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn warehouse(&self) -> &Path {
        &self.warehouse
    }

    fn table_location(&self, identifier: &Identifier) -> Path {
        self.warehouse
            .child(format!("{}.db", identifier.database()))
            .child(identifier.table())
    }

    fn now_millis(&self) -> i64 {
        self.time_provider.now().timestamp_millis()
    }

    /// Tag a snapshot of the main branch, the latest one if `snapshot_id` is `None`
    pub async fn create_tag(
        &self,
        identifier: &Identifier,
        tag: &str,
        snapshot_id: Option<SnapshotId>,
    ) -> Result<SnapshotId> {
        check_base_table(identifier, "tag")?;
        let location = {
            let state = self.state.read();
            let table = state.table(identifier)?;
            if table.tags.contains_key(tag) {
                return Err(CatalogError::invalid_argument(format!(
                    "Tag '{tag}' already exists."
                )));
            }
            table.metadata.location.clone()
        };

        let main = SnapshotManager::new(
            Arc::clone(&self.store),
            Path::from(location.as_str()),
            MAIN_BRANCH,
        );
        let id = match snapshot_id {
            Some(id) => {
                main.read(id)
                    .await?
                    .ok_or_else(|| CatalogError::SnapshotNotExist {
                        identifier: identifier.clone(),
                        snapshot_id: id,
                    })?;
                id
            }
            None => main.latest_id().await?.ok_or_else(|| {
                CatalogError::invalid_argument(format!(
                    "Table {identifier} has no snapshot to tag."
                ))
            })?,
        };

        self.state
            .write()
            .table_mut(identifier)?
            .tags
            .insert(tag.to_string(), id);
        debug!(%identifier, tag, snapshot_id = id, "created tag");
        Ok(id)
    }

    /// Replace the token handed out for `identifier`
    pub fn set_token(&self, identifier: &Identifier, token: Token) -> Result<()> {
        self.state.write().table_mut(&identifier.base())?.token = Some(token);
        Ok(())
    }
}

fn check_base_table(identifier: &Identifier, operation: &str) -> Result<()> {
    if identifier.is_system_table() || identifier.branch().is_some() {
        return Err(CatalogError::invalid_argument(format!(
            "Cannot {operation} {identifier}, only base tables are supported."
        )));
    }
    Ok(())
}

fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CatalogError::invalid_argument("Branch name cannot be empty."));
    }
    if name == MAIN_BRANCH {
        return Err(CatalogError::invalid_argument(format!(
            "Branch name '{MAIN_BRANCH}' is the default branch and cannot be used."
        )));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(CatalogError::invalid_argument(format!(
            "Branch name cannot be pure numeric string but is '{name}'."
        )));
    }
    Ok(())
}

fn check_partition_spec(schema: &Schema, spec: &PartitionSpec) -> Result<()> {
    match spec.keys().find(|k| !schema.partition_keys.contains(k)) {
        Some(key) => Err(CatalogError::invalid_argument(format!(
            "{key} is not a partition key of the table."
        ))),
        None => Ok(()),
    }
}

fn apply_schema_change(
    identifier: &Identifier,
    schema: &mut Schema,
    change: SchemaChange,
) -> Result<()> {
    let column_not_exist = |column: &str| CatalogError::ColumnNotExist {
        identifier: identifier.clone(),
        column: column.to_string(),
    };
    let column_already_exist = |column: &str| CatalogError::ColumnAlreadyExist {
        identifier: identifier.clone(),
        column: column.to_string(),
    };

    match change {
        SchemaChange::SetOption { key, value } => {
            schema.options.insert(key, value);
        }
        SchemaChange::RemoveOption { key } => {
            schema.options.remove(&key);
        }
        SchemaChange::AddColumn {
            name,
            data_type,
            description,
        } => {
            if schema.field(&name).is_some() {
                return Err(column_already_exist(&name));
            }
            let id = schema.highest_field_id() + 1;
            schema.fields.push(DataField {
                id,
                name,
                data_type,
                description,
            });
        }
        SchemaChange::RenameColumn { old_name, new_name } => {
            if schema.field(&old_name).is_none() {
                return Err(column_not_exist(&old_name));
            }
            if schema.field(&new_name).is_some() {
                return Err(column_already_exist(&new_name));
            }
            if schema.partition_keys.contains(&old_name) {
                return Err(CatalogError::invalid_argument(format!(
                    "Cannot rename partition column: [{old_name}]"
                )));
            }
            for field in schema.fields.iter_mut().filter(|f| f.name == old_name) {
                field.name = new_name.clone();
            }
            for key in schema.primary_keys.iter_mut().filter(|k| **k == old_name) {
                *key = new_name.clone();
            }
        }
        SchemaChange::DropColumn { name } => {
            if schema.field(&name).is_none() {
                return Err(column_not_exist(&name));
            }
            if schema.partition_keys.contains(&name) || schema.primary_keys.contains(&name) {
                return Err(CatalogError::invalid_argument(format!(
                    "Cannot drop partition key or primary key: [{name}]"
                )));
            }
            schema.fields.retain(|f| f.name != name);
        }
        SchemaChange::UpdateComment { comment } => {
            schema.comment = comment;
        }
    }
    Ok(())
}

#[async_trait]
impl Catalog for MemCatalog {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.state.read().databases.keys().cloned().collect())
    }

    async fn create_database(
        &self,
        name: &str,
        ignore_if_exists: bool,
        options: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut state = self.state.write();
        match state.databases.entry(name.to_string()) {
            Entry::Occupied(_) if ignore_if_exists => Ok(()),
            Entry::Occupied(_) => Err(CatalogError::DatabaseAlreadyExist {
                database: name.to_string(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(DatabaseState {
                    database: Database::new(name, options),
                    tables: BTreeMap::new(),
                    views: BTreeMap::new(),
                });
                info!(database = name, "created database");
                Ok(())
            }
        }
    }

    async fn get_database(&self, name: &str) -> Result<Arc<Database>> {
        Ok(Arc::new(self.state.read().database(name)?.database.clone()))
    }

    async fn drop_database(
        &self,
        name: &str,
        ignore_if_not_exists: bool,
        cascade: bool,
    ) -> Result<()> {
        let locations: Vec<Path> = {
            let mut state = self.state.write();
            let entry = match state.databases.entry(name.to_string()) {
                Entry::Vacant(_) if ignore_if_not_exists => return Ok(()),
                Entry::Vacant(_) => {
                    return Err(CatalogError::DatabaseNotExist {
                        database: name.to_string(),
                    });
                }
                Entry::Occupied(entry) => entry,
            };
            let db = entry.get();
            if !cascade && !(db.tables.is_empty() && db.views.is_empty()) {
                return Err(CatalogError::DatabaseNotEmpty {
                    database: name.to_string(),
                });
            }
            entry
                .remove()
                .tables
                .values()
                .map(|t| Path::from(t.metadata.location.as_str()))
                .collect()
        };
        for location in &locations {
            delete_prefix(&self.store, location).await?;
        }
        info!(database = name, tables = locations.len(), "dropped database");
        Ok(())
    }

    async fn alter_database(
        &self,
        name: &str,
        changes: Vec<PropertyChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let db = match state.database_mut(name) {
            Ok(db) => db,
            Err(_) if ignore_if_not_exists => return Ok(()),
            Err(e) => return Err(e),
        };
        for change in changes {
            match change {
                PropertyChange::Set { key, value } => {
                    db.database.options.insert(key, value);
                }
                PropertyChange::Remove { key } => {
                    db.database.options.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .database(database)?
            .tables
            .keys()
            .cloned()
            .collect())
    }

    async fn get_table(&self, identifier: &Identifier) -> Result<Arc<Table>> {
        let metadata = self.state.read().table_metadata(identifier)?;
        let table = Table::new(
            identifier,
            Arc::new(metadata),
            Arc::clone(&self.store),
            Arc::clone(&self.time_provider),
        );
        if identifier.is_system_table() {
            return table.load_system_table(identifier);
        }
        Ok(Arc::new(table))
    }

    async fn create_table(
        &self,
        identifier: &Identifier,
        schema: Schema,
        ignore_if_exists: bool,
    ) -> Result<()> {
        check_base_table(identifier, "create")?;
        for key in schema.partition_keys.iter().chain(&schema.primary_keys) {
            if schema.field(key).is_none() {
                return Err(CatalogError::invalid_argument(format!(
                    "Key {key} is not a field of table {identifier}."
                )));
            }
        }
        let location = self.table_location(identifier);

        let mut state = self.state.write();
        let db = state.database_mut(identifier.database())?;
        match db.tables.entry(identifier.table().to_string()) {
            Entry::Occupied(_) if ignore_if_exists => Ok(()),
            Entry::Occupied(_) => Err(CatalogError::TableAlreadyExist {
                identifier: identifier.clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(TableState {
                    metadata: TableMetadata {
                        uuid: Uuid::new_v4().to_string(),
                        location: location.to_string(),
                        schema_id: 0,
                        schema,
                        is_external: false,
                    },
                    partitions: BTreeMap::new(),
                    branches: BTreeMap::new(),
                    tags: BTreeMap::new(),
                    token: None,
                });
                info!(%identifier, %location, "created table");
                Ok(())
            }
        }
    }

    async fn drop_table(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()> {
        check_base_table(identifier, "drop")?;
        let removed = self
            .state
            .write()
            .databases
            .get_mut(identifier.database())
            .and_then(|db| db.tables.remove(identifier.table()));
        let Some(table) = removed else {
            if ignore_if_not_exists {
                return Ok(());
            }
            return Err(CatalogError::table_not_exist(identifier));
        };
        delete_prefix(&self.store, &Path::from(table.metadata.location.as_str())).await?;
        info!(%identifier, "dropped table");
        Ok(())
    }

    async fn rename_table(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        check_base_table(from, "rename")?;
        check_base_table(to, "rename to")?;
        let target_location = self.table_location(to);

        let source_location = {
            let mut state = self.state.write();
            if state.table(from).is_err() {
                if ignore_if_not_exists {
                    return Ok(());
                }
                return Err(CatalogError::table_not_exist(from));
            }
            if state.database(to.database())?.tables.contains_key(to.table()) {
                return Err(CatalogError::TableAlreadyExist {
                    identifier: to.clone(),
                });
            }
            let Some(mut table) = state
                .databases
                .get_mut(from.database())
                .and_then(|db| db.tables.remove(from.table()))
            else {
                return Err(CatalogError::table_not_exist(from));
            };
            let source_location = std::mem::replace(
                &mut table.metadata.location,
                target_location.to_string(),
            );
            state
                .database_mut(to.database())?
                .tables
                .insert(to.table().to_string(), table);
            source_location
        };

        move_prefix(
            &self.store,
            &Path::from(source_location.as_str()),
            &target_location,
        )
        .await?;
        info!(%from, %to, "renamed table");
        Ok(())
    }

    async fn alter_table(
        &self,
        identifier: &Identifier,
        changes: Vec<SchemaChange>,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        check_base_table(identifier, "alter")?;
        let mut state = self.state.write();
        let table = match state.table_mut(identifier) {
            Ok(table) => table,
            Err(_) if ignore_if_not_exists => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut schema = table.metadata.schema.clone();
        for change in changes {
            apply_schema_change(identifier, &mut schema, change)?;
        }
        table.metadata.schema = schema;
        table.metadata.schema_id += 1;
        debug!(%identifier, schema_id = table.metadata.schema_id, "altered table");
        Ok(())
    }

    async fn list_views(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .database(database)?
            .views
            .keys()
            .cloned()
            .collect())
    }

    async fn get_view(&self, identifier: &Identifier) -> Result<Arc<View>> {
        let state = self.state.read();
        let schema = state
            .databases
            .get(identifier.database())
            .and_then(|db| db.views.get(identifier.table()))
            .ok_or_else(|| CatalogError::ViewNotExist {
                identifier: identifier.clone(),
            })?;
        Ok(Arc::new(View {
            identifier: identifier.clone(),
            schema: schema.clone(),
        }))
    }

    async fn create_view(
        &self,
        identifier: &Identifier,
        schema: ViewSchema,
        ignore_if_exists: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let db = state.database_mut(identifier.database())?;
        match db.views.entry(identifier.table().to_string()) {
            Entry::Occupied(_) if ignore_if_exists => Ok(()),
            Entry::Occupied(_) => Err(CatalogError::ViewAlreadyExist {
                identifier: identifier.clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(schema);
                Ok(())
            }
        }
    }

    async fn drop_view(&self, identifier: &Identifier, ignore_if_not_exists: bool) -> Result<()> {
        let removed = self
            .state
            .write()
            .databases
            .get_mut(identifier.database())
            .and_then(|db| db.views.remove(identifier.table()));
        match removed {
            Some(_) => Ok(()),
            None if ignore_if_not_exists => Ok(()),
            None => Err(CatalogError::ViewNotExist {
                identifier: identifier.clone(),
            }),
        }
    }

    async fn rename_view(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        let exists = state
            .databases
            .get(from.database())
            .is_some_and(|db| db.views.contains_key(from.table()));
        if !exists {
            if ignore_if_not_exists {
                return Ok(());
            }
            return Err(CatalogError::ViewNotExist {
                identifier: from.clone(),
            });
        }
        if state.database(to.database())?.views.contains_key(to.table()) {
            return Err(CatalogError::ViewAlreadyExist {
                identifier: to.clone(),
            });
        }
        let Some(schema) = state
            .databases
            .get_mut(from.database())
            .and_then(|db| db.views.remove(from.table()))
        else {
            return Err(CatalogError::ViewNotExist {
                identifier: from.clone(),
            });
        };
        state
            .database_mut(to.database())?
            .views
            .insert(to.table().to_string(), schema);
        Ok(())
    }

    async fn list_partitions(&self, identifier: &Identifier) -> Result<Vec<Partition>> {
        Ok(self
            .state
            .read()
            .table(identifier)?
            .partitions
            .values()
            .cloned()
            .collect())
    }

    async fn create_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let table = state.partitioned_table_mut(identifier)?;
        for spec in &specs {
            check_partition_spec(&table.metadata.schema, spec)?;
        }
        for spec in specs {
            table
                .partitions
                .entry(spec.clone())
                .or_insert_with(|| Partition::new(spec));
        }
        Ok(())
    }

    async fn drop_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let table = state.partitioned_table_mut(identifier)?;
        for spec in &specs {
            table.partitions.remove(spec);
        }
        Ok(())
    }

    async fn alter_partitions(
        &self,
        identifier: &Identifier,
        partitions: Vec<PartitionStatistics>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let table = state.partitioned_table_mut(identifier)?;
        for stats in &partitions {
            check_partition_spec(&table.metadata.schema, &stats.spec)?;
        }
        for stats in partitions {
            let partition = table
                .partitions
                .entry(stats.spec.clone())
                .or_insert_with(|| Partition::new(stats.spec.clone()));
            partition.record_count = stats.record_count;
            partition.file_size_in_bytes = stats.file_size_in_bytes;
            partition.file_count = stats.file_count;
            partition.last_file_creation_time = stats.last_file_creation_time;
        }
        Ok(())
    }

    async fn mark_done_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let table = state.partitioned_table_mut(identifier)?;
        for spec in &specs {
            check_partition_spec(&table.metadata.schema, spec)?;
        }
        for spec in specs {
            table
                .partitions
                .entry(spec.clone())
                .or_insert_with(|| Partition::new(spec))
                .done = true;
        }
        Ok(())
    }

    async fn list_branches(&self, identifier: &Identifier) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .table(identifier)?
            .branches
            .keys()
            .cloned()
            .collect())
    }

    async fn get_branch(&self, identifier: &Identifier, branch: &str) -> Result<Branch> {
        self.state
            .read()
            .table(identifier)?
            .branches
            .get(branch)
            .map(|b| b.branch.clone())
            .ok_or_else(|| {
                CatalogError::invalid_argument(format!(
                    "Branch '{branch}' doesn't exist in table {}.",
                    identifier.base()
                ))
            })
    }

    async fn create_branch(
        &self,
        identifier: &Identifier,
        branch: &str,
        from_tag: Option<&str>,
    ) -> Result<()> {
        check_base_table(identifier, "create a branch of")?;
        validate_branch_name(branch)?;
        let now = self.now_millis();

        let (location, tagged_snapshot) = {
            let mut state = self.state.write();
            let table = state.table_mut(identifier)?;
            if table.branches.contains_key(branch) {
                return Err(CatalogError::invalid_argument(format!(
                    "Branch name '{branch}' already exists."
                )));
            }
            let tagged_snapshot = match from_tag {
                Some(tag) => Some(*table.tags.get(tag).ok_or_else(|| {
                    CatalogError::invalid_argument(format!("Tag '{tag}' doesn't exist."))
                })?),
                None => None,
            };
            table.branches.insert(
                branch.to_string(),
                BranchState {
                    branch: Branch {
                        name: branch.to_string(),
                        from_tag: from_tag.map(ToString::to_string),
                        create_time_millis: now,
                    },
                    schema_id: table.metadata.schema_id,
                    schema: table.metadata.schema.clone(),
                },
            );
            (table.metadata.location.clone(), tagged_snapshot)
        };

        if let Some(id) = tagged_snapshot {
            let main = SnapshotManager::new(
                Arc::clone(&self.store),
                Path::from(location.as_str()),
                MAIN_BRANCH,
            );
            main.for_branch(branch).copy_from(&main, id).await?;
        }
        info!(%identifier, branch, from_tag, "created branch");
        Ok(())
    }

    async fn drop_branch(&self, identifier: &Identifier, branch: &str) -> Result<()> {
        check_base_table(identifier, "drop a branch of")?;
        let location = {
            let mut state = self.state.write();
            let table = state.table_mut(identifier)?;
            if table.branches.remove(branch).is_none() {
                return Err(CatalogError::invalid_argument(format!(
                    "Branch '{branch}' doesn't exist in table {identifier}."
                )));
            }
            table.metadata.location.clone()
        };
        SnapshotManager::new(
            Arc::clone(&self.store),
            Path::from(location.as_str()),
            branch,
        )
        .delete_all()
        .await?;
        info!(%identifier, branch, "dropped branch");
        Ok(())
    }

    async fn fast_forward(&self, identifier: &Identifier, branch: &str) -> Result<()> {
        check_base_table(identifier, "fast-forward")?;
        let (location, source_state) = {
            let state = self.state.read();
            let table = state.table(identifier)?;
            let source_state = table.branches.get(branch).cloned().ok_or_else(|| {
                CatalogError::invalid_argument(format!(
                    "Branch '{branch}' doesn't exist in table {identifier}."
                ))
            })?;
            (table.metadata.location.clone(), source_state)
        };

        let main = SnapshotManager::new(
            Arc::clone(&self.store),
            Path::from(location.as_str()),
            MAIN_BRANCH,
        );
        let source = main.for_branch(branch);
        let ids = source.snapshot_ids().await?;
        main.delete_all().await?;
        for id in &ids {
            main.copy_from(&source, *id).await?;
        }

        let mut state = self.state.write();
        let table = state.table_mut(identifier)?;
        table.metadata.schema = source_state.schema;
        table.metadata.schema_id = source_state.schema_id;
        info!(%identifier, branch, snapshots = ids.len(), "fast-forwarded main");
        Ok(())
    }

    async fn load_snapshot(&self, identifier: &Identifier) -> Result<Option<Arc<Snapshot>>> {
        self.get_table(&identifier.without_system_table())
            .await?
            .latest_snapshot()
            .await
    }

    async fn commit_snapshot(
        &self,
        identifier: &Identifier,
        snapshot: Snapshot,
        statistics: Vec<PartitionStatistics>,
    ) -> Result<bool> {
        if identifier.is_system_table() {
            return Err(CatalogError::invalid_argument(format!(
                "Cannot commit to system table {identifier}."
            )));
        }
        let location = self.state.read().table_metadata(identifier)?.location;
        let manager = SnapshotManager::new(
            Arc::clone(&self.store),
            Path::from(location.as_str()),
            identifier.branch_or_default(),
        );
        let success = manager.commit(&snapshot).await?;

        if success && !statistics.is_empty() {
            let mut state = self.state.write();
            let table = state.table_mut(identifier)?;
            if table.metadata.schema.partitioned_in_metastore() {
                for stats in &statistics {
                    table
                        .partitions
                        .entry(stats.spec.clone())
                        .or_insert_with(|| Partition::new(stats.spec.clone()))
                        .apply(stats);
                }
            }
        }
        debug!(%identifier, snapshot_id = snapshot.id, success, "commit attempt");
        Ok(success)
    }

    async fn get_token(&self, identifier: &Identifier) -> Result<Arc<Token>> {
        let now = self.time_provider.now();
        let mut state = self.state.write();
        let table = state.table_mut(identifier)?;
        if let Some(token) = &table.token {
            if !token.is_expired(now.timestamp_millis()) {
                return Ok(Arc::new(token.clone()));
            }
        }
        let token = Token {
            token: BTreeMap::from([
                ("accessKeyId".to_string(), Uuid::new_v4().to_string()),
                ("accessKeySecret".to_string(), Uuid::new_v4().to_string()),
            ]),
            expire_at_millis: (now + TOKEN_TTL).timestamp_millis(),
        };
        table.token = Some(token.clone());
        Ok(Arc::new(token))
    }
}
