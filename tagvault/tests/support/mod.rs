//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tagvault::registry::DeclaredField;
use tagvault::store::{CommitReceipt, RegistryCommand};
use tagvault::{
    InMemoryTypeRegistry, MemoryStore, Owner, RecordId, RegistryError, RegistryPlan, RegistrySnapshot, RegistryStore,
    Reconciler, StaticOwnerDirectory, TagKind, TagList, TaggedFieldRecord, TypeDescriptor, TypeId,
};

// ============================================================================
// Schema builders
// ============================================================================

pub fn user_field(name: &str) -> DeclaredField {
    DeclaredField {
        field_name: name.to_string(),
        display_name: display_name(name),
        tag_kind: TagKind::User,
        default_tags: None,
        synchronise: false,
    }
}

pub fn system_field(name: &str, defaults: &[&str]) -> DeclaredField {
    DeclaredField {
        field_name: name.to_string(),
        display_name: display_name(name),
        tag_kind: TagKind::System,
        default_tags: Some(tags(defaults)),
        synchronise: false,
    }
}

pub fn synced(mut field: DeclaredField) -> DeclaredField {
    field.synchronise = true;
    field
}

pub fn descriptor(type_id: &str, namespace: &str, type_name: &str, fields: Vec<DeclaredField>) -> TypeDescriptor {
    TypeDescriptor {
        type_id: TypeId::new(type_id),
        namespace: namespace.to_string(),
        type_name: type_name.to_string(),
        fields,
    }
}

fn display_name(field_name: &str) -> String {
    let mut chars = field_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn tags(values: &[&str]) -> TagList {
    values.iter().collect()
}

pub fn owners(handles: &[&str]) -> StaticOwnerDirectory {
    StaticOwnerDirectory::new(handles.iter().copied())
}

// ============================================================================
// Snapshot helpers
// ============================================================================

pub fn record_for<'a>(snapshot: &'a RegistrySnapshot, type_id: &str, field_name: &str) -> &'a TaggedFieldRecord {
    snapshot
        .records
        .values()
        .find(|record| record.type_id.as_str() == type_id && record.field_name == field_name)
        .unwrap_or_else(|| panic!("no record for {type_id}.{field_name}"))
}

pub fn tags_of(snapshot: &RegistrySnapshot, handle: &str, record: &RecordId) -> Vec<String> {
    snapshot
        .association_for(&Owner::user(handle), record)
        .map(|association| association.tags.as_slice().to_vec())
        .unwrap_or_default()
}

/// Every (owner, tag) pair across user associations, order independent.
pub fn owner_tag_pairs(snapshot: &RegistrySnapshot) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = snapshot
        .associations
        .values()
        .flat_map(|association| {
            let owner = association.owner.to_string();
            association.tags.iter().map(move |tag| (owner.clone(), tag.to_string()))
        })
        .collect();
    pairs.sort();
    pairs.dedup();
    pairs
}

/// Sets `handle`'s tags on `record` directly, bypassing sync propagation.
pub async fn tag<S: RegistryStore>(store: &S, handle: &str, record: &RecordId, values: &[&str]) {
    let snapshot = store.snapshot().await.unwrap();
    let mut association = snapshot
        .association_for(&Owner::user(handle), record)
        .cloned()
        .unwrap_or_else(|| panic!("{handle} has no association on {record}"));
    association.replace_tags(tags(values));
    let mut plan = RegistryPlan::expecting(snapshot.version);
    plan.put_association(association);
    store.commit(plan).await.unwrap();
}

/// Populates `registry` into `store` for `owners` and asserts nothing failed.
pub async fn populate<S: RegistryStore>(store: &S, registry: &InMemoryTypeRegistry, directory: &StaticOwnerDirectory) {
    let report = Reconciler::new(store, registry, directory).populate(None).await.unwrap();
    assert!(report.is_success(), "populate failed: {:?}", report.failed);
}

// ============================================================================
// Failure injection
// ============================================================================

/// Store that rejects commits deleting selected records, or every commit
/// after a budget is exhausted.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    poisoned: Mutex<Vec<RecordId>>,
    commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any commit deleting `record` fails from now on.
    pub fn poison_delete(&self, record: RecordId) {
        self.poisoned.lock().unwrap().push(record);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn rejects(&self, plan: &RegistryPlan) -> Option<RecordId> {
        let poisoned = self.poisoned.lock().unwrap();
        plan.commands.iter().find_map(|command| match command {
            RegistryCommand::DeleteRecord { id } if poisoned.contains(id) => Some(id.clone()),
            _ => None,
        })
    }
}

impl RegistryStore for FlakyStore {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        self.inner.snapshot().await
    }

    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        if let Some(id) = self.rejects(&plan) {
            return Err(RegistryError::Other {
                message: format!("injected failure deleting {id}").into(),
            });
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(plan).await
    }
}
