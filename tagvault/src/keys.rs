/// Redis key-construction helpers for a registry stored under one prefix.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    /// Hash of record id -> TaggedFieldRecord JSON.
    pub fn records(&self) -> String {
        format!("{}:registry:records", self.prefix)
    }

    /// Hash of association id -> TagAssociation JSON.
    pub fn associations(&self) -> String {
        format!("{}:registry:associations", self.prefix)
    }

    /// Hash of field name -> SyncGroup JSON.
    pub fn sync_groups(&self) -> String {
        format!("{}:registry:sync_groups", self.prefix)
    }

    /// Counter bumped by every committed plan.
    pub fn version(&self) -> String {
        format!("{}:registry:version", self.prefix)
    }

    pub fn pattern(&self) -> String {
        format!("{}:registry:*", self.prefix)
    }
}
