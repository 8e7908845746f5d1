use std::collections::{BTreeMap, HashMap};

use crate::errors::RegistryError;
use crate::registry::{Resolution, TypeRegistry};
use crate::store::RegistrySnapshot;
use crate::types::{RecordId, TaggedFieldRecord, TypeId};

/// Orphaned records grouped by their cached namespace, each group sorted by id.
pub type OrphanMap = BTreeMap<String, Vec<TaggedFieldRecord>>;

/// Every record of a snapshot split into orphans and live records.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub orphans: OrphanMap,
    /// Live records mapped to the namespace their type currently resolves in.
    pub live: BTreeMap<RecordId, String>,
}

impl Classification {
    pub fn orphan_count(&self) -> usize {
        self.orphans.values().map(Vec::len).sum()
    }

    pub fn is_live(&self, record_id: &RecordId) -> bool {
        self.live.contains_key(record_id)
    }

    pub fn iter_orphans(&self) -> impl Iterator<Item = &TaggedFieldRecord> {
        self.orphans.values().flatten()
    }
}

/// Resolves each distinct type id once and sorts records into orphans and
/// live records.
pub fn classify<R: TypeRegistry + ?Sized>(
    snapshot: &RegistrySnapshot,
    registry: &R,
) -> Result<Classification, RegistryError> {
    let mut resolutions: HashMap<&TypeId, Resolution> = HashMap::new();
    let mut classification = Classification::default();

    for record in snapshot.records.values() {
        if !resolutions.contains_key(&record.type_id) {
            resolutions.insert(&record.type_id, registry.resolve(&record.type_id)?);
        }
        match resolutions.get(&record.type_id) {
            Some(Resolution::Live(descriptor)) => {
                classification
                    .live
                    .insert(record.id.clone(), descriptor.namespace.clone());
            }
            _ => {
                classification
                    .orphans
                    .entry(record.namespace.clone())
                    .or_default()
                    .push(record.clone());
            }
        }
    }

    for group in classification.orphans.values_mut() {
        group.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let orphan_count = classification.orphan_count();
    if orphan_count > 0 {
        log::info!(
            "orphans_detected count={orphan_count} namespaces={}",
            classification.orphans.len()
        );
    }
    Ok(classification)
}

/// Orphan detection without the live side of the classification.
pub fn detect<R: TypeRegistry + ?Sized>(
    snapshot: &RegistrySnapshot,
    registry: &R,
) -> Result<OrphanMap, RegistryError> {
    Ok(classify(snapshot, registry)?.orphans)
}
