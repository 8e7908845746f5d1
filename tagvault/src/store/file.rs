use std::path::{Path, PathBuf};

use crate::errors::RegistryError;
use crate::store::{CommitReceipt, MemoryStore, RegistryPlan, RegistrySnapshot, RegistryStore};

/// Memory store persisted to a pretty-printed JSON file after every commit.
///
/// The file is replaced via a sibling temp file and a rename, so a crash
/// mid-write leaves the previous state on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Opens `path`, starting from an empty registry when it doesn't exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                RegistrySnapshot::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            RegistrySnapshot::default()
        };
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RegistryStore for FileStore {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        Ok(self.inner.current())
    }

    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        self.inner.apply_then(&plan, |next, receipt| {
            if receipt.applied > 0 {
                self.persist(next)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Owner, RecordId, TagAssociation, TagKind, TaggedFieldRecord, TypeId};

    fn sample_record(id: &str, field: &str) -> TaggedFieldRecord {
        TaggedFieldRecord {
            id: RecordId::new(id),
            type_id: TypeId::new("blog.article"),
            namespace: "blog".into(),
            cached_type_name: "Article".into(),
            cached_field_display_name: "Tags".into(),
            field_name: field.into(),
            tag_kind: TagKind::User,
            default_tag_seed: None,
            synchronise: false,
        }
    }

    #[tokio::test]
    async fn reopened_store_sees_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");

        let record = sample_record("r1", "tags");

        {
            let store = FileStore::open(&path).unwrap();
            let mut plan = RegistryPlan::new();
            plan.put_record(record.clone()).put_association(TagAssociation::seeded(
                Owner::user("ana"),
                &record,
                ["rust"].into_iter().collect(),
            ));
            store.commit(plan).await.unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        let snapshot = reopened.snapshot().await.unwrap();
        assert_eq!(snapshot.version, 1);
        let association = snapshot.association_for(&Owner::user("ana"), &record.id).unwrap();
        assert_eq!(association.tags.as_slice(), ["rust"]);
    }

    #[tokio::test]
    async fn failed_commit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = FileStore::open(&path).unwrap();

        let mut plan = RegistryPlan::new();
        plan.delete_record(RecordId::new("missing"));
        assert!(store.commit(plan).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_applied_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let store = FileStore::open(&path).unwrap();

        let blocker = path.with_extension("json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let mut plan = RegistryPlan::new();
        plan.put_record(sample_record("r1", "tags"));
        assert!(store.commit(plan).await.is_err());

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.record(&RecordId::new("r1")).is_none());
        assert!(!path.exists());

        std::fs::remove_dir(&blocker).unwrap();
        let mut plan = RegistryPlan::new();
        plan.put_record(sample_record("r2", "notes"));
        assert_eq!(store.commit(plan).await.unwrap().version, 1);

        let reopened = FileStore::open(&path).unwrap().snapshot().await.unwrap();
        assert!(reopened.record(&RecordId::new("r1")).is_none());
        assert!(reopened.record(&RecordId::new("r2")).is_some());
    }
}
