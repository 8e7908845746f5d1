use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use redis::Script;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::RegistryError;
use crate::keys::KeyContext;
use crate::store::{CommitReceipt, RegistryCommand, RegistryPlan, RegistrySnapshot, RegistryStore};

pub const COMMIT_PLAN_SCRIPT_BODY: &str = include_str!("../../lua/commit_plan.lua");

pub static COMMIT_PLAN_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(COMMIT_PLAN_SCRIPT_BODY));

#[derive(Debug, Serialize)]
struct ScriptPayload {
    expected_version: u64,
    operations: Vec<ScriptOperation>,
}

#[derive(Debug, Serialize)]
struct ScriptOperation {
    action: &'static str,
    target: &'static str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<String>,
}

impl ScriptOperation {
    fn from_command(command: &RegistryCommand) -> Result<Self, RegistryError> {
        let operation = match command {
            RegistryCommand::PutRecord { record } => Self {
                action: "put",
                target: "records",
                id: record.id.to_string(),
                document: Some(serde_json::to_string(record)?),
            },
            RegistryCommand::DeleteRecord { id } => Self {
                action: "delete",
                target: "records",
                id: id.to_string(),
                document: None,
            },
            RegistryCommand::PutAssociation { association } => Self {
                action: "put",
                target: "associations",
                id: association.id.to_string(),
                document: Some(serde_json::to_string(association)?),
            },
            RegistryCommand::DeleteAssociation { id } => Self {
                action: "delete",
                target: "associations",
                id: id.to_string(),
                document: None,
            },
            RegistryCommand::PutSyncGroup { group } => Self {
                action: "put",
                target: "sync_groups",
                id: group.field_name.clone(),
                document: Some(serde_json::to_string(group)?),
            },
            RegistryCommand::DeleteSyncGroup { field_name } => Self {
                action: "delete",
                target: "sync_groups",
                id: field_name.clone(),
                document: None,
            },
        };
        Ok(operation)
    }
}

/// Registry kept in three Redis hashes plus a version counter.
///
/// Plans are validated against a snapshot and then applied by a Lua script
/// that refuses to run if the version moved since that snapshot.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }

    pub fn key_context(&self) -> KeyContext<'_> {
        KeyContext::new(&self.prefix)
    }

    /// Deletes every registry key under this store's prefix.
    pub async fn clear(&self) -> Result<u64, RegistryError> {
        const SCAN_COUNT: usize = 1000;
        let mut conn = self.conn.clone();
        let pattern = self.key_context().pattern();
        let mut cursor: u64 = 0;
        let mut total_deleted: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

fn decode_documents<K, T>(raw: HashMap<String, String>) -> Result<std::collections::BTreeMap<K, T>, RegistryError>
where
    K: Ord + From<String>,
    T: DeserializeOwned,
{
    raw.into_iter()
        .map(|(id, json)| Ok((K::from(id), serde_json::from_str(&json)?)))
        .collect()
}

impl RegistryStore for RedisStore {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let keys = self.key_context();
        let mut conn = self.conn.clone();
        let (version, records, associations, sync_groups): (
            Option<u64>,
            HashMap<String, String>,
            HashMap<String, String>,
            HashMap<String, String>,
        ) = redis::pipe()
            .atomic()
            .get(keys.version())
            .hgetall(keys.records())
            .hgetall(keys.associations())
            .hgetall(keys.sync_groups())
            .query_async(&mut conn)
            .await?;

        Ok(RegistrySnapshot {
            version: version.unwrap_or(0),
            records: decode_documents(records)?,
            associations: decode_documents(associations)?,
            sync_groups: decode_documents(sync_groups)?,
        })
    }

    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        let mut staged = self.snapshot().await?;
        let validated_at = staged.version;
        let receipt = staged.apply(&plan)?;
        if receipt.applied == 0 {
            return Ok(receipt);
        }

        let payload = ScriptPayload {
            expected_version: validated_at,
            operations: plan
                .commands
                .iter()
                .map(ScriptOperation::from_command)
                .collect::<Result<_, _>>()?,
        };
        let payload = serde_json::to_string(&payload)?;

        let keys = self.key_context();
        let mut conn = self.conn.clone();
        let mut invocation = COMMIT_PLAN_SCRIPT.prepare_invoke();
        invocation
            .key(keys.version())
            .key(keys.records())
            .key(keys.associations())
            .key(keys.sync_groups())
            .arg(payload);
        let raw: String = invocation.invoke_async(&mut conn).await?;

        let value: Value = serde_json::from_str(&raw)?;
        if let Some(code) = value.get("error").and_then(Value::as_str) {
            return Err(match code {
                "version_conflict" => RegistryError::VersionConflict {
                    expected: plan.expected_version.or(Some(validated_at)),
                    actual: value.get("actual").and_then(Value::as_u64),
                },
                other => RegistryError::Other {
                    message: Cow::Owned(format!("commit script rejected plan: {other}")),
                },
            });
        }

        Ok(CommitReceipt {
            version: value.get("version").and_then(Value::as_u64).unwrap_or(receipt.version),
            applied: plan.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    #[test]
    fn delete_operations_carry_no_document() {
        let op = ScriptOperation::from_command(&RegistryCommand::DeleteRecord { id: RecordId::new("r1") }).unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(json["target"], "records");
        assert!(json.get("document").is_none());
    }

    #[test]
    fn commit_script_guards_on_version() {
        assert!(COMMIT_PLAN_SCRIPT_BODY.contains("version_conflict"));
        assert!(COMMIT_PLAN_SCRIPT_BODY.contains("INCR"));
    }
}
