//! Schema manifest and identifier table used by the CLI.
//!
//! The manifest (`schema.toml`) stands in for the host's declared data model:
//!
//! ```toml
//! owners = ["ana", "bo"]
//!
//! [[types]]
//! type_id = "ct-17"
//! namespace = "blog"
//! name = "Article"
//! fields = [
//!     { name = "tags", display_name = "Tags", kind = "user", default_tags = ["draft"] },
//!     { name = "category", kind = "system", default_tags = ["news"], synchronise = true },
//! ]
//! ```
//!
//! The identifier table (`identifiers.json`) remembers every type id issued so
//! far, so types removed from the manifest are still known (and detectable as
//! dead) on the next run.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, ValidationError, ValidationIssue};
use crate::registry::{DeclaredField, IdentifierEntry, InMemoryTypeRegistry, TypeDescriptor, TypeRegistry};
use crate::types::{TagKind, TagList, TypeId};
use crate::validators::{is_valid_identifier, is_valid_namespace, is_valid_type_id};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaManifest {
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub types: Vec<ManifestType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestType {
    pub type_id: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<ManifestField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestField {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: TagKind,
    #[serde(default)]
    pub default_tags: Option<Vec<String>>,
    #[serde(default)]
    pub synchronise: bool,
}

impl SchemaManifest {
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let manifest: SchemaManifest = toml::from_str(content)
            .map_err(|err| ValidationError::single("schema", "parse", err.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Loads and validates the manifest at `path`. A missing file is an empty
    /// schema.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut type_ids = BTreeSet::new();

        for (index, declared) in self.types.iter().enumerate() {
            let path = format!("types[{index}]");
            if !is_valid_type_id(&declared.type_id) {
                issues.push(ValidationIssue::new(
                    format!("{path}.type_id"),
                    "type_id",
                    format!("'{}' is not a usable type id", declared.type_id),
                ));
            } else if !type_ids.insert(declared.type_id.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("{path}.type_id"),
                    "duplicate",
                    format!("type id '{}' is declared twice", declared.type_id),
                ));
            }
            if !is_valid_namespace(&declared.namespace) {
                issues.push(ValidationIssue::new(
                    format!("{path}.namespace"),
                    "namespace",
                    format!("'{}' is not a valid namespace", declared.namespace),
                ));
            }
            if declared.name.trim().is_empty() {
                issues.push(ValidationIssue::new(format!("{path}.name"), "required", "type name is empty"));
            }

            let mut seen = BTreeSet::new();
            for (field_index, field) in declared.fields.iter().enumerate() {
                let field_path = format!("{path}.fields[{field_index}]");
                if !is_valid_identifier(&field.name) {
                    issues.push(ValidationIssue::new(
                        format!("{field_path}.name"),
                        "identifier",
                        format!("'{}' is not a valid field identifier", field.name),
                    ));
                }
                if !seen.insert((field.name.as_str(), field.kind)) {
                    issues.push(ValidationIssue::new(
                        format!("{field_path}.name"),
                        "duplicate",
                        format!("{} field '{}' is declared twice on '{}'", field.kind, field.name, declared.name),
                    ));
                }
            }
        }

        for (index, owner) in self.owners.iter().enumerate() {
            if owner.trim().is_empty() {
                issues.push(ValidationIssue::new(format!("owners[{index}]"), "required", "owner handle is empty"));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    pub fn descriptors(&self) -> Vec<TypeDescriptor> {
        self.types
            .iter()
            .map(|declared| TypeDescriptor {
                type_id: TypeId::new(declared.type_id.clone()),
                namespace: declared.namespace.clone(),
                type_name: declared.name.clone(),
                fields: declared
                    .fields
                    .iter()
                    .map(|field| DeclaredField {
                        field_name: field.name.clone(),
                        display_name: field.display_name.clone().unwrap_or_else(|| field.name.clone()),
                        tag_kind: field.kind,
                        default_tags: field.default_tags.as_ref().map(|tags| tags.iter().collect::<TagList>()),
                        synchronise: field.synchronise,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Builds a type registry holding the manifest's types plus every
    /// identifier remembered in `table`.
    pub fn into_registry(&self, table: &IdentifierTable) -> InMemoryTypeRegistry {
        let registry = InMemoryTypeRegistry::with_types(self.descriptors());
        registry.restore_identifiers(table.identifiers.iter().cloned());
        registry
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierTable {
    #[serde(default)]
    pub identifiers: Vec<IdentifierEntry>,
}

impl IdentifierTable {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn from_registry<R: TypeRegistry + ?Sized>(registry: &R) -> Result<Self, RegistryError> {
        Ok(Self {
            identifiers: registry.known_identifiers()?,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
owners = ["ana", "bo"]

[[types]]
type_id = "ct-1"
namespace = "blog"
name = "Article"
fields = [
    { name = "tags", display_name = "Tags", kind = "user", default_tags = ["draft", "draft"] },
    { name = "category", kind = "system", synchronise = true },
]
"#;

    #[test]
    fn parses_types_and_fields() {
        let manifest = SchemaManifest::from_toml_str(SAMPLE).unwrap();
        assert_eq!(manifest.owners, ["ana", "bo"]);
        let descriptors = manifest.descriptors();
        assert_eq!(descriptors.len(), 1);
        let tags = descriptors[0].field("tags").unwrap();
        assert_eq!(tags.tag_kind, TagKind::User);
        assert_eq!(tags.default_tags.as_ref().unwrap().as_slice(), ["draft"]);
        let category = descriptors[0].field("category").unwrap();
        assert_eq!(category.display_name, "category");
        assert!(category.synchronise);
    }

    #[test]
    fn rejects_invalid_identifiers_with_paths() {
        let manifest = r#"
[[types]]
type_id = "ct-1"
namespace = "blog"
name = "Article"
fields = [{ name = "my-tags", kind = "user" }, { name = "ok", kind = "user" }, { name = "ok", kind = "user" }]
"#;
        let err = SchemaManifest::from_toml_str(manifest).unwrap_err();
        let RegistryError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        let fields: Vec<_> = validation.issues.iter().map(|issue| issue.field.as_str()).collect();
        assert_eq!(fields, ["types[0].fields[0].name", "types[0].fields[2].name"]);
    }

    #[test]
    fn identifier_table_survives_removal_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identifiers.json");

        let manifest = SchemaManifest::from_toml_str(SAMPLE).unwrap();
        let registry = manifest.into_registry(&IdentifierTable::default());
        IdentifierTable::from_registry(&registry).unwrap().save(&path).unwrap();

        let registry = SchemaManifest::default().into_registry(&IdentifierTable::load(&path).unwrap());
        let known = registry.known_identifiers().unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].type_id, TypeId::new("ct-1"));
        assert!(!registry.resolve(&TypeId::new("ct-1")).unwrap().is_live());
    }
}
