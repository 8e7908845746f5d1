use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::generate_registry_id;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque handle issued by the host type system. May stop resolving after a
    /// type is deleted or recreated.
    TypeId
);
string_id!(
    /// Primary key of a [`TaggedFieldRecord`].
    RecordId
);
string_id!(
    /// Primary key of a [`TagAssociation`].
    AssociationId
);

impl RecordId {
    pub fn generate() -> Self {
        Self(generate_registry_id())
    }
}

impl AssociationId {
    pub fn generate() -> Self {
        Self(generate_registry_id())
    }
}

/// Whether a tagged field carries shared predefined tags or per-owner tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    System,
    User,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::System => "system",
            TagKind::User => "user",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a tag association. `System` is the "no owner" sentinel used by
/// system-kind records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "handle", rename_all = "snake_case")]
pub enum Owner {
    System,
    User(String),
}

impl Owner {
    pub fn user(handle: impl Into<String>) -> Self {
        Owner::User(handle.into())
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Owner::System)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::System => f.write_str("<system>"),
            Owner::User(handle) => f.write_str(handle),
        }
    }
}

/// Ordered list of unique, case-sensitive tags.
///
/// Every constructor drops blank entries and later duplicates, so a `TagList`
/// read back from storage upholds the invariant even if the stored JSON didn't.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagList(Vec<String>);

impl TagList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|existing| existing == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Appends `tag` unless it is blank or already present. Returns whether the
    /// list changed.
    pub fn push(&mut self, tag: impl AsRef<str>) -> bool {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    /// Removes `tag`. Returns whether it was present.
    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != tag);
        before != self.0.len()
    }

    /// `self` followed by every entry of `other` not already present.
    pub fn union_ordered(&self, other: &TagList) -> TagList {
        let mut merged = self.clone();
        for tag in other.iter() {
            merged.push(tag);
        }
        merged
    }
}

impl From<Vec<String>> for TagList {
    fn from(value: Vec<String>) -> Self {
        value.into_iter().collect()
    }
}

impl From<TagList> for Vec<String> {
    fn from(value: TagList) -> Self {
        value.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = TagList::new();
        for tag in iter {
            list.push(tag);
        }
        list
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Registry entry for one (type, field, tag kind) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedFieldRecord {
    pub id: RecordId,
    pub type_id: TypeId,
    /// Declaring namespace, cached so orphans remain groupable after their
    /// type stops resolving.
    pub namespace: String,
    pub cached_type_name: String,
    pub cached_field_display_name: String,
    pub field_name: String,
    pub tag_kind: TagKind,
    #[serde(default)]
    pub default_tag_seed: Option<TagList>,
    #[serde(default)]
    pub synchronise: bool,
}

impl TaggedFieldRecord {
    /// Natural key the registry enforces uniqueness on.
    pub fn natural_key(&self) -> (&TypeId, &str, TagKind) {
        (&self.type_id, self.field_name.as_str(), self.tag_kind)
    }

    pub fn label(&self) -> String {
        format!("{}.{}.{}", self.namespace, self.cached_type_name, self.field_name)
    }
}

/// One owner's tag list for one [`TaggedFieldRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssociation {
    pub id: AssociationId,
    pub owner: Owner,
    /// Direct reference to the record. `None` only appears in legacy data and
    /// is reported by the integrity checker; stores refuse to write it.
    pub record_ref: Option<RecordId>,
    /// Denormalized copy of the record's field name.
    #[serde(default)]
    pub cached_field_name: Option<String>,
    #[serde(default)]
    pub tags: TagList,
    /// Every tag this association has ever carried.
    #[serde(default)]
    pub search_tags: TagList,
    pub updated_at: DateTime<Utc>,
}

impl TagAssociation {
    /// Fresh association for `owner` on `record`, seeded with `tags`.
    pub fn seeded(owner: Owner, record: &TaggedFieldRecord, tags: TagList) -> Self {
        Self {
            id: AssociationId::generate(),
            owner,
            record_ref: Some(record.id.clone()),
            cached_field_name: Some(record.field_name.clone()),
            search_tags: tags.clone(),
            tags,
            updated_at: Utc::now(),
        }
    }

    /// Replaces the active tags, folding them into the search history.
    pub fn replace_tags(&mut self, tags: TagList) {
        self.search_tags = self.search_tags.union_ordered(&tags);
        self.tags = tags;
        self.updated_at = Utc::now();
    }

    pub fn references(&self, record_id: &RecordId) -> bool {
        self.record_ref.as_ref() == Some(record_id)
    }
}

/// Records whose associations must carry identical tag lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGroup {
    pub field_name: String,
    #[serde(default)]
    pub members: Vec<RecordId>,
}

impl SyncGroup {
    pub fn new(field_name: impl Into<String>, members: impl IntoIterator<Item = RecordId>) -> Self {
        let mut group = Self {
            field_name: field_name.into(),
            members: Vec::new(),
        };
        for member in members {
            group.add_member(member);
        }
        group
    }

    pub fn contains(&self, record_id: &RecordId) -> bool {
        self.members.contains(record_id)
    }

    /// Adds `record_id` unless already listed. Returns whether it was added.
    pub fn add_member(&mut self, record_id: RecordId) -> bool {
        if self.contains(&record_id) {
            return false;
        }
        self.members.push(record_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_list_drops_duplicates_and_blanks() {
        let list: TagList = ["urgent", " ", "later", "urgent", "Urgent"].into_iter().collect();
        assert_eq!(list.as_slice(), ["urgent", "later", "Urgent"]);
    }

    #[test]
    fn union_keeps_left_order_first() {
        let left: TagList = ["b", "a"].into_iter().collect();
        let right: TagList = ["c", "a", "d"].into_iter().collect();
        assert_eq!(left.union_ordered(&right).as_slice(), ["b", "a", "c", "d"]);
    }

    #[test]
    fn tag_list_deserializes_with_invariant() {
        let list: TagList = serde_json::from_str(r#"["x","x","y",""]"#).unwrap();
        assert_eq!(list.as_slice(), ["x", "y"]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["x","y"]"#);
    }

    #[test]
    fn owner_serializes_with_kind_tag() {
        assert_eq!(serde_json::to_string(&Owner::System).unwrap(), r#"{"kind":"system"}"#);
        assert_eq!(
            serde_json::to_string(&Owner::user("ana")).unwrap(),
            r#"{"kind":"user","handle":"ana"}"#
        );
    }

    #[test]
    fn replace_tags_accumulates_search_history() {
        let record = TaggedFieldRecord {
            id: RecordId::new("r1"),
            type_id: TypeId::new("blog.article"),
            namespace: "blog".into(),
            cached_type_name: "Article".into(),
            cached_field_display_name: "Tags".into(),
            field_name: "tags".into(),
            tag_kind: TagKind::User,
            default_tag_seed: None,
            synchronise: false,
        };
        let mut association = TagAssociation::seeded(Owner::user("ana"), &record, ["draft"].into_iter().collect());
        association.replace_tags(["published"].into_iter().collect());
        assert_eq!(association.tags.as_slice(), ["published"]);
        assert_eq!(association.search_tags.as_slice(), ["draft", "published"]);
    }

    #[test]
    fn sync_group_members_are_unique() {
        let group = SyncGroup::new("tags", [RecordId::new("a"), RecordId::new("b"), RecordId::new("a")]);
        assert_eq!(group.members, vec![RecordId::new("a"), RecordId::new("b")]);
    }
}
