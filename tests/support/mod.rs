//! Shared test infrastructure: an in-memory [`Connection`] and config builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use orgaudit::classification::{EntityClassification, PermissionClassification};
use orgaudit::config::{PolicyConfig, PolicyKind, RuleConfig, RunConfig};
use orgaudit::connection::{
    Connection, ConnectionError, FieldDescribe, ObjectDescribe, Record,
};
use orgaudit::{PrivilegeLevel, RiskLevel};

// ── Mock connection ──

/// In-memory remote system.
///
/// Queries are answered by the first registered response whose key is a
/// substring of the query text; unknown queries return no records.
#[derive(Default)]
pub struct MockConnection {
    subject_id: String,
    queries: Vec<(String, Result<Vec<Record>, ConnectionError>)>,
    describes: HashMap<String, ObjectDescribe>,
    metadata: HashMap<String, HashMap<String, Value>>,
    failing_metadata: HashSet<String>,
    pub query_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub retrieve_calls: AtomicUsize,
    pub retrieved_names: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockConnection {
    pub fn new(subject_id: &str) -> Self {
        Self {
            subject_id: subject_id.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, key: &str, rows: Vec<Value>) -> Self {
        self.queries.push((key.to_owned(), Ok(records(rows))));
        self
    }

    pub fn failing_query(mut self, key: &str) -> Self {
        self.queries.push((
            key.to_owned(),
            Err(ConnectionError::Query {
                query: key.to_owned(),
                message: "INVALID_TYPE".to_owned(),
            }),
        ));
        self
    }

    pub fn with_describe(mut self, object: &str, fields: &[&str]) -> Self {
        self.describes.insert(
            object.to_owned(),
            ObjectDescribe {
                name: object.to_owned(),
                fields: fields
                    .iter()
                    .map(|name| FieldDescribe {
                        name: (*name).to_owned(),
                        field_type: "string".to_owned(),
                    })
                    .collect(),
            },
        );
        self
    }

    pub fn with_metadata(mut self, metadata_type: &str, name: &str, document: Value) -> Self {
        self.metadata
            .entry(metadata_type.to_owned())
            .or_default()
            .insert(name.to_owned(), document);
        self
    }

    pub fn failing_metadata(mut self, metadata_type: &str) -> Self {
        self.failing_metadata.insert(metadata_type.to_owned());
        self
    }

    /// Total number of remote calls of any kind.
    pub fn remote_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
            + self.describe_calls.load(Ordering::SeqCst)
            + self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_count(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn subject_id(&self) -> &str {
        &self.subject_id
    }

    async fn query(&self, soql: &str) -> Result<Vec<Record>, ConnectionError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .iter()
            .find(|(key, _)| soql.contains(key.as_str()))
            .map_or_else(|| Ok(Vec::new()), |(_, response)| response.clone())
    }

    async fn describe(&self, object: &str) -> Result<ObjectDescribe, ConnectionError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.describes
            .get(object)
            .cloned()
            .ok_or_else(|| ConnectionError::Describe {
                object: object.to_owned(),
                message: "NOT_FOUND".to_owned(),
            })
    }

    async fn retrieve_metadata(
        &self,
        metadata_type: &str,
        names: &[String],
    ) -> Result<HashMap<String, Value>, ConnectionError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        self.retrieved_names
            .lock()
            .expect("test lock")
            .push((metadata_type.to_owned(), names.to_vec()));
        if self.failing_metadata.contains(metadata_type) {
            return Err(ConnectionError::Metadata {
                metadata_type: metadata_type.to_owned(),
                message: "retrieve timed out".to_owned(),
            });
        }
        let documents = self.metadata.get(metadata_type);
        Ok(names
            .iter()
            .filter_map(|name| {
                documents
                    .and_then(|docs| docs.get(name))
                    .map(|doc| (name.clone(), doc.clone()))
            })
            .collect())
    }
}

/// Convert JSON objects into query records.
pub fn records(rows: Vec<Value>) -> Vec<Record> {
    rows.into_iter()
        .filter_map(|row| row.as_object().cloned())
        .collect()
}

/// A metadata document granting the given permissions.
pub fn permissions_document(permissions: &[&str]) -> Value {
    let entries: Vec<Value> = permissions
        .iter()
        .map(|name| serde_json::json!({ "name": name, "enabled": true }))
        .collect();
    serde_json::json!({ "userPermissions": entries })
}

// ── Config builders ──

pub fn permission(risk_level: RiskLevel) -> PermissionClassification {
    PermissionClassification {
        label: None,
        reason: None,
        risk_level,
    }
}

pub fn entity(privilege_level: PrivilegeLevel) -> EntityClassification {
    EntityClassification { privilege_level }
}

/// A policy config with the given rules enabled with default options.
pub fn policy_with_rules(rules: &[&str]) -> PolicyConfig {
    PolicyConfig {
        enabled: true,
        rules: rules
            .iter()
            .map(|name| ((*name).to_owned(), RuleConfig::default()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// A run config with a single policy.
pub fn run_config_with(kind: PolicyKind, policy: PolicyConfig) -> RunConfig {
    let mut config = RunConfig::default();
    config.policies.insert(kind, policy);
    config
}

pub fn shared(config: RunConfig) -> Arc<RunConfig> {
    Arc::new(config)
}
