//! Snapshot files in the object store
//!
//! Snapshots of the main branch live at `{location}/snapshot/snapshot-{id}`, snapshots of a
//! branch at `{location}/branch/branch-{name}/snapshot/snapshot-{id}`. A snapshot is published by
//! writing a temporary file and renaming it into place only if the target does not exist yet.
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{ObjectStore, PutPayload, path::Path};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{MAIN_BRANCH, Result, Snapshot, SnapshotId};

const SNAPSHOT_DIR: &str = "snapshot";
const SNAPSHOT_PREFIX: &str = "snapshot-";
const BRANCH_DIR: &str = "branch";
const MANIFEST_DIR: &str = "manifest";

/// Reads, lists, and publishes the snapshots of one branch of a table
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    store: Arc<dyn ObjectStore>,
    location: Path,
    branch: String,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn ObjectStore>, location: Path, branch: impl Into<String>) -> Self {
        Self {
            store,
            location,
            branch: branch.into(),
        }
    }

    /// The same table, another branch
    pub fn for_branch(&self, branch: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            location: self.location.clone(),
            branch: branch.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    fn branch_location(&self) -> Path {
        if self.branch == MAIN_BRANCH {
            self.location.clone()
        } else {
            self.location
                .child(BRANCH_DIR)
                .child(format!("{BRANCH_DIR}-{}", self.branch))
        }
    }

    /// Directory of the branch's snapshot files
    pub fn snapshot_dir(&self) -> Path {
        self.branch_location().child(SNAPSHOT_DIR)
    }

    /// Manifest files are shared by all branches of a table
    pub fn manifest_dir(&self) -> Path {
        self.location.child(MANIFEST_DIR)
    }

    pub fn snapshot_path(&self, id: SnapshotId) -> Path {
        self.snapshot_dir().child(format!("{SNAPSHOT_PREFIX}{id}"))
    }

    /// Read snapshot `id`, `None` if it does not exist
    pub async fn read(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        match self.store.get(&self.snapshot_path(id)).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all published snapshots of the branch, ascending
    pub async fn snapshot_ids(&self) -> Result<Vec<SnapshotId>> {
        let dir = self.snapshot_dir();
        let mut ids: Vec<SnapshotId> = self
            .store
            .list(Some(&dir))
            .try_filter_map(|meta| async move {
                Ok::<_, object_store::Error>(meta
                    .location
                    .filename()
                    .and_then(|name| name.strip_prefix(SNAPSHOT_PREFIX))
                    .and_then(|id| id.parse::<SnapshotId>().ok()))
            })
            .try_collect()
            .await?;
        ids.sort_unstable();
        Ok(ids)
    }

    pub async fn latest_id(&self) -> Result<Option<SnapshotId>> {
        Ok(self.snapshot_ids().await?.last().copied())
    }

    /// Publish `snapshot` as the next version of the branch
    ///
    /// Returns `false` if a snapshot with the same id was published first.
    pub async fn commit(&self, snapshot: &Snapshot) -> Result<bool> {
        let target = self.snapshot_path(snapshot.id);
        let temp = self.snapshot_dir().child(format!(
            ".{SNAPSHOT_PREFIX}{}-{}.tmp",
            snapshot.id,
            Uuid::new_v4()
        ));
        let payload = PutPayload::from(Bytes::from(serde_json::to_vec(snapshot)?));
        self.store.put(&temp, payload).await?;

        match self.store.rename_if_not_exists(&temp, &target).await {
            Ok(()) => {
                debug!(path = %target, "published snapshot");
                Ok(true)
            }
            Err(object_store::Error::AlreadyExists { .. }) => {
                self.discard(&temp).await;
                debug!(path = %target, "snapshot already published by another writer");
                Ok(false)
            }
            Err(e) => {
                self.discard(&temp).await;
                Err(e.into())
            }
        }
    }

    /// Copy snapshot `id` of `source` into this branch, overwriting what is there
    pub async fn copy_from(&self, source: &Self, id: SnapshotId) -> Result<()> {
        self.store
            .copy(&source.snapshot_path(id), &self.snapshot_path(id))
            .await?;
        Ok(())
    }

    /// Delete every snapshot file of the branch
    pub async fn delete_all(&self) -> Result<()> {
        delete_prefix(&self.store, &self.snapshot_dir()).await
    }

    async fn discard(&self, temp: &Path) {
        if let Err(e) = self.store.delete(temp).await {
            warn!(error = %e, path = %temp, "failed to remove temporary snapshot file");
        }
    }
}

/// Delete every object below `prefix`
pub(crate) async fn delete_prefix(store: &Arc<dyn ObjectStore>, prefix: &Path) -> Result<()> {
    let paths: Vec<Path> = store
        .list(Some(prefix))
        .map_ok(|meta| meta.location)
        .try_collect()
        .await?;
    for path in paths {
        match store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Move every object below `from` to the same relative path below `to`
pub(crate) async fn move_prefix(
    store: &Arc<dyn ObjectStore>,
    from: &Path,
    to: &Path,
) -> Result<()> {
    let paths: Vec<Path> = store
        .list(Some(from))
        .map_ok(|meta| meta.location)
        .try_collect()
        .await?;
    for path in paths {
        let Some(relative) = path.prefix_match(from) else {
            continue;
        };
        let target = relative.fold(to.clone(), |acc, part| acc.child(part));
        store.rename(&path, &target).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::CommitKind;

    fn snapshot(id: SnapshotId) -> Snapshot {
        Snapshot {
            id,
            schema_id: 0,
            commit_user: "test".into(),
            commit_identifier: id,
            commit_kind: CommitKind::Append,
            time_millis: 0,
            manifests: vec![],
            total_record_count: 0,
            delta_record_count: 0,
            watermark: None,
        }
    }

    #[test]
    fn paths() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let main = SnapshotManager::new(store, Path::from("wh/db.db/t"), MAIN_BRANCH);
        assert_eq!(main.snapshot_path(3).as_ref(), "wh/db.db/t/snapshot/snapshot-3");
        let b1 = main.for_branch("b1");
        assert_eq!(
            b1.snapshot_path(3).as_ref(),
            "wh/db.db/t/branch/branch-b1/snapshot/snapshot-3"
        );
        assert_eq!(b1.manifest_dir().as_ref(), "wh/db.db/t/manifest");
    }

    #[tokio::test]
    async fn commit_is_exclusive() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let manager = SnapshotManager::new(store, Path::from("t"), MAIN_BRANCH);
        assert_eq!(manager.latest_id().await.unwrap(), None);

        assert!(manager.commit(&snapshot(1)).await.unwrap());
        assert!(!manager.commit(&snapshot(1)).await.unwrap());
        assert!(manager.commit(&snapshot(2)).await.unwrap());

        // temporary files are not mistaken for snapshots
        assert_eq!(manager.snapshot_ids().await.unwrap(), vec![1, 2]);
        assert_eq!(manager.read(2).await.unwrap(), Some(snapshot(2)));
        assert_eq!(manager.read(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn branches_are_isolated() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let main = SnapshotManager::new(store, Path::from("t"), MAIN_BRANCH);
        let b1 = main.for_branch("b1");
        assert!(main.commit(&snapshot(1)).await.unwrap());
        assert_eq!(b1.latest_id().await.unwrap(), None);

        b1.copy_from(&main, 1).await.unwrap();
        assert_eq!(b1.latest_id().await.unwrap(), Some(1));

        main.delete_all().await.unwrap();
        assert_eq!(main.latest_id().await.unwrap(), None);
        assert_eq!(b1.latest_id().await.unwrap(), Some(1));
    }
}
