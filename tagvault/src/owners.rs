use crate::errors::RegistryError;

/// Source of owner handles used to seed per-owner associations.
pub trait OwnerDirectory {
    fn list_known_owners(&self) -> Result<Vec<String>, RegistryError>;
}

/// Fixed list of owners, e.g. loaded from the schema manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnerDirectory {
    owners: Vec<String>,
}

impl StaticOwnerDirectory {
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directory = Self::default();
        for owner in owners {
            let owner = owner.into();
            if !directory.owners.contains(&owner) {
                directory.owners.push(owner);
            }
        }
        directory
    }
}

impl OwnerDirectory for StaticOwnerDirectory {
    fn list_known_owners(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.owners.clone())
    }
}
