//! Audit-event construction.
//!
//! Builds the rows that land in `audit_log`: who did what to which entity,
//! in which client/project context, with before/after values for updates.
//! Each sealed record carries a sha256 digest over its canonical JSON
//! (sorted keys, compact) so stored rows are tamper-evident. Persistence
//! lives in `nx-db::audit`; this crate has no DB dependency.

use anyhow::{Context, Result};
use nx_schemas::{AuditAction, AuditLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One audit event, ready to insert once sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub level: AuditLevel,
    pub description: String,
    pub entity_kind: Option<String>,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub client_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// sha256 hex over canonical JSON of the record with `digest` empty.
    pub digest: String,
}

impl AuditRecord {
    pub fn new(action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: None,
            action,
            level: AuditLevel::Info,
            description: description.into(),
            entity_kind: None,
            entity_id: None,
            old_values: None,
            new_values: None,
            client_id: None,
            project_id: None,
            ip_address: None,
            user_agent: None,
            digest: String::new(),
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    pub fn entity(mut self, kind: impl Into<String>, id: Uuid) -> Self {
        self.entity_kind = Some(kind.into());
        self.entity_id = Some(id);
        self
    }

    /// Before/after snapshots for update actions.
    pub fn values(mut self, old: Value, new: Value) -> Self {
        self.old_values = Some(old);
        self.new_values = Some(new);
        self
    }

    /// Business context resolved along the entity's ownership path.
    pub fn scope(mut self, client_id: Option<Uuid>, project_id: Option<Uuid>) -> Self {
        self.client_id = client_id;
        self.project_id = project_id;
        self
    }

    pub fn request_meta(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }

    /// Compute and attach the content digest. Must be the last step.
    pub fn seal(mut self) -> Result<Self> {
        self.digest = compute_digest(&self)?;
        Ok(self)
    }
}

/// Digest over canonical JSON of the record with the digest field blanked
/// (the digest cannot cover itself).
pub fn compute_digest(record: &AuditRecord) -> Result<String> {
    let mut clone = record.clone();
    clone.digest = String::new();

    let canonical = canonical_json(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Recompute the digest and compare with the stored one.
pub fn verify_digest(record: &AuditRecord) -> Result<bool> {
    Ok(compute_digest(record)? == record.digest)
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
pub fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit record failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Reduce two entity snapshots to only the keys whose values differ.
/// Timestamps churn on every save and are excluded.
pub fn changed_values(old: &Value, new: &Value) -> (Value, Value) {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        return (old.clone(), new.clone());
    };

    let mut old_out = serde_json::Map::new();
    let mut new_out = serde_json::Map::new();

    for (k, new_v) in new_map {
        if k.ends_with("_at") || k == "updated_at" || k == "created_at" {
            continue;
        }
        match old_map.get(k) {
            Some(old_v) if old_v == new_v => {}
            Some(old_v) => {
                old_out.insert(k.clone(), old_v.clone());
                new_out.insert(k.clone(), new_v.clone());
            }
            None => {
                new_out.insert(k.clone(), new_v.clone());
            }
        }
    }

    (Value::Object(old_out), Value::Object(new_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sealed_record_verifies_and_tamper_is_detected() {
        let rec = AuditRecord::new(AuditAction::Update, "update project")
            .actor(Uuid::new_v4())
            .entity("project", Uuid::new_v4())
            .values(json!({"status": "draft"}), json!({"status": "active"}))
            .seal()
            .unwrap();

        assert!(verify_digest(&rec).unwrap());

        let mut forged = rec.clone();
        forged.description = "something else".to_string();
        assert!(!verify_digest(&forged).unwrap());
    }

    #[test]
    fn canonical_json_is_key_order_independent() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn changed_values_keeps_only_diffs_and_drops_timestamps() {
        let old = json!({"status": "draft", "title": "Site", "updated_at": "2026-01-01"});
        let new = json!({"status": "active", "title": "Site", "updated_at": "2026-02-01"});

        let (o, n) = changed_values(&old, &new);
        assert_eq!(o, json!({"status": "draft"}));
        assert_eq!(n, json!({"status": "active"}));
    }
}
