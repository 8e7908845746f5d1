//! tagvault core library.
//!
//! A registry of tagged fields and per-owner tag associations, kept consistent
//! while the host's data-model types are renamed, deleted and recreated.

pub mod editor;
pub mod errors;
pub mod id;
pub mod integrity;
pub mod keys;
pub mod manifest;
pub mod owners;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;
pub mod validators;

pub use editor::{TagEdit, TagEditor};
pub use errors::*;
pub use integrity::{IntegrityChecker, IntegrityReport, RegistryStatistics};
pub use manifest::{IdentifierTable, SchemaManifest};
pub use owners::{OwnerDirectory, StaticOwnerDirectory};
pub use reconcile::{OrphanFixReport, PassReport, ReconcileOptions, Reconciler};
pub use registry::{InMemoryTypeRegistry, Resolution, TypeDescriptor, TypeRegistry};
pub use store::{FileStore, MemoryStore, RedisStore, RegistryPlan, RegistrySnapshot, RegistryStore};
pub use sync::SyncConfig;
pub use types::{
    AssociationId, Owner, RecordId, SyncGroup, TagAssociation, TagKind, TagList, TaggedFieldRecord, TypeId,
};

// Re-export redis types so users don't need to depend on a specific redis version
pub use redis;
pub use redis::aio::ConnectionManager;
