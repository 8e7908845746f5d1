//! Type registry adapter.
//!
//! The host framework owns the mapping from opaque [`TypeId`]s to live
//! data-model types. tagvault only consults it through [`TypeRegistry`]; the
//! resolution cache lives behind that trait and is dropped explicitly with
//! [`TypeRegistry::invalidate_cache`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::errors::RegistryError;
use crate::types::{TagKind, TagList, TypeId};

/// A tagged field as declared on a live type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredField {
    pub field_name: String,
    pub display_name: String,
    pub tag_kind: TagKind,
    #[serde(default)]
    pub default_tags: Option<TagList>,
    #[serde(default)]
    pub synchronise: bool,
}

/// Current description of a live type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub namespace: String,
    pub type_name: String,
    #[serde(default)]
    pub fields: Vec<DeclaredField>,
}

impl TypeDescriptor {
    pub fn field(&self, field_name: &str) -> Option<&DeclaredField> {
        self.fields.iter().find(|field| field.field_name == field_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Live(TypeDescriptor),
    Unresolved,
}

impl Resolution {
    pub fn is_live(&self) -> bool {
        matches!(self, Resolution::Live(_))
    }

    pub fn descriptor(&self) -> Option<&TypeDescriptor> {
        match self {
            Resolution::Live(descriptor) => Some(descriptor),
            Resolution::Unresolved => None,
        }
    }
}

/// One (type, field, tag kind) triple produced by scanning declared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredTaggedField {
    pub type_id: TypeId,
    pub namespace: String,
    pub type_name: String,
    pub field: DeclaredField,
}

/// An identifier the host has issued, live or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierEntry {
    pub type_id: TypeId,
    pub namespace: String,
    pub type_name: String,
}

pub trait TypeRegistry {
    fn resolve(&self, type_id: &TypeId) -> Result<Resolution, RegistryError>;

    /// Drops every memoized resolution so the next `resolve` consults the host.
    fn invalidate_cache(&self);

    fn namespaces(&self) -> Result<Vec<String>, RegistryError>;

    fn enumerate_declared_fields(&self, namespace: &str) -> Result<Vec<DeclaredTaggedField>, RegistryError>;

    /// Every identifier the host still remembers, including ones that no
    /// longer resolve.
    fn known_identifiers(&self) -> Result<Vec<IdentifierEntry>, RegistryError>;

    /// Drops a stale identifier. Returns whether it was known.
    fn forget(&self, type_id: &TypeId) -> Result<bool, RegistryError>;
}

#[derive(Debug, Default)]
struct RegistryState {
    declared: BTreeMap<TypeId, TypeDescriptor>,
    identifiers: BTreeMap<TypeId, IdentifierEntry>,
    cache: HashMap<TypeId, Resolution>,
    unavailable: Option<String>,
}

/// Host type registry kept in memory.
///
/// Removing a type leaves its identifier behind, the way a host keeps rows for
/// deleted types until someone cleans them up. Resolutions are memoized until
/// [`TypeRegistry::invalidate_cache`] runs, so schema edits made after a
/// resolve stay invisible until then.
#[derive(Debug, Default)]
pub struct InMemoryTypeRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        let registry = Self::new();
        for descriptor in types {
            registry.declare(descriptor);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declares (or redeclares) a live type and issues its identifier.
    pub fn declare(&self, descriptor: TypeDescriptor) {
        let mut state = self.write();
        state.identifiers.insert(
            descriptor.type_id.clone(),
            IdentifierEntry {
                type_id: descriptor.type_id.clone(),
                namespace: descriptor.namespace.clone(),
                type_name: descriptor.type_name.clone(),
            },
        );
        state.declared.insert(descriptor.type_id.clone(), descriptor);
    }

    /// Renames a live type in place; its identifier is preserved.
    pub fn rename(&self, type_id: &TypeId, type_name: impl Into<String>) -> bool {
        let type_name = type_name.into();
        let mut state = self.write();
        let Some(descriptor) = state.declared.get_mut(type_id) else {
            return false;
        };
        descriptor.type_name = type_name.clone();
        if let Some(entry) = state.identifiers.get_mut(type_id) {
            entry.type_name = type_name;
        }
        true
    }

    /// Removes a type from the declared schema. The identifier stays known.
    pub fn remove(&self, type_id: &TypeId) -> Option<TypeDescriptor> {
        self.write().declared.remove(type_id)
    }

    /// Re-registers identifiers remembered from an earlier run. Live
    /// declarations are left untouched.
    pub fn restore_identifiers(&self, entries: impl IntoIterator<Item = IdentifierEntry>) {
        let mut state = self.write();
        for entry in entries {
            state.identifiers.entry(entry.type_id.clone()).or_insert(entry);
        }
    }

    /// Simulates an unreachable host; every fallible call fails until cleared.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.write().unavailable = reason;
    }

    pub fn cached_resolutions(&self) -> usize {
        self.read().cache.len()
    }

    pub fn declared_types(&self) -> Vec<TypeDescriptor> {
        self.read().declared.values().cloned().collect()
    }

    fn ensure_available(state: &RegistryState) -> Result<(), RegistryError> {
        match &state.unavailable {
            Some(reason) => Err(RegistryError::adapter(reason.clone())),
            None => Ok(()),
        }
    }
}

impl TypeRegistry for InMemoryTypeRegistry {
    fn resolve(&self, type_id: &TypeId) -> Result<Resolution, RegistryError> {
        {
            let state = self.read();
            Self::ensure_available(&state)?;
            if let Some(hit) = state.cache.get(type_id) {
                return Ok(hit.clone());
            }
        }

        let mut state = self.write();
        let resolution = match state.declared.get(type_id) {
            Some(descriptor) => Resolution::Live(descriptor.clone()),
            None => Resolution::Unresolved,
        };
        state.cache.insert(type_id.clone(), resolution.clone());
        Ok(resolution)
    }

    fn invalidate_cache(&self) {
        let mut state = self.write();
        let dropped = state.cache.len();
        state.cache.clear();
        log::debug!("type_cache_invalidated dropped={dropped}");
    }

    fn namespaces(&self) -> Result<Vec<String>, RegistryError> {
        let state = self.read();
        Self::ensure_available(&state)?;
        let namespaces: BTreeSet<String> = state.declared.values().map(|d| d.namespace.clone()).collect();
        Ok(namespaces.into_iter().collect())
    }

    fn enumerate_declared_fields(&self, namespace: &str) -> Result<Vec<DeclaredTaggedField>, RegistryError> {
        let state = self.read();
        Self::ensure_available(&state)?;
        Ok(state
            .declared
            .values()
            .filter(|descriptor| descriptor.namespace == namespace)
            .flat_map(|descriptor| {
                descriptor.fields.iter().map(move |field| DeclaredTaggedField {
                    type_id: descriptor.type_id.clone(),
                    namespace: descriptor.namespace.clone(),
                    type_name: descriptor.type_name.clone(),
                    field: field.clone(),
                })
            })
            .collect())
    }

    fn known_identifiers(&self) -> Result<Vec<IdentifierEntry>, RegistryError> {
        let state = self.read();
        Self::ensure_available(&state)?;
        Ok(state.identifiers.values().cloned().collect())
    }

    fn forget(&self, type_id: &TypeId) -> Result<bool, RegistryError> {
        let mut state = self.write();
        Self::ensure_available(&state)?;
        state.cache.remove(type_id);
        Ok(state.identifiers.remove(type_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> TypeDescriptor {
        TypeDescriptor {
            type_id: TypeId::new("blog.article"),
            namespace: "blog".into(),
            type_name: "Article".into(),
            fields: vec![DeclaredField {
                field_name: "tags".into(),
                display_name: "Tags".into(),
                tag_kind: TagKind::User,
                default_tags: None,
                synchronise: false,
            }],
        }
    }

    #[test]
    fn cached_resolution_masks_removal_until_invalidated() {
        let registry = InMemoryTypeRegistry::with_types([article()]);
        let id = TypeId::new("blog.article");
        assert!(registry.resolve(&id).unwrap().is_live());

        registry.remove(&id);
        assert!(registry.resolve(&id).unwrap().is_live());

        registry.invalidate_cache();
        assert_eq!(registry.resolve(&id).unwrap(), Resolution::Unresolved);
    }

    #[test]
    fn removed_types_stay_known_until_forgotten() {
        let registry = InMemoryTypeRegistry::with_types([article()]);
        let id = TypeId::new("blog.article");
        registry.remove(&id);
        assert_eq!(registry.known_identifiers().unwrap().len(), 1);
        assert!(registry.forget(&id).unwrap());
        assert!(registry.known_identifiers().unwrap().is_empty());
        assert!(!registry.forget(&id).unwrap());
    }

    #[test]
    fn rename_preserves_identifier() {
        let registry = InMemoryTypeRegistry::with_types([article()]);
        let id = TypeId::new("blog.article");
        assert!(registry.rename(&id, "Post"));
        registry.invalidate_cache();
        let resolved = registry.resolve(&id).unwrap();
        assert_eq!(resolved.descriptor().unwrap().type_name, "Post");
    }

    #[test]
    fn unavailable_registry_fails_enumeration() {
        let registry = InMemoryTypeRegistry::with_types([article()]);
        registry.set_unavailable(Some("host offline".into()));
        assert!(matches!(
            registry.enumerate_declared_fields("blog"),
            Err(RegistryError::AdapterUnavailable { .. })
        ));
    }
}
