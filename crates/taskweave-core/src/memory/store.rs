//! Execution memory store
//!
//! Owns execution contexts and the knowledge base in its own persistence
//! namespace, separate from the task collection. The same single critical
//! section discipline applies: mutations read-modify-write the whole
//! collection under a write lock and persist before committing.

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::DocumentStore;

use super::{
    Decision, Discovery, ExecutionContext, ExecutionStatus, KnowledgeEntry, Step,
};

const CONTEXTS_COLLECTION: &str = "contexts";
const KNOWLEDGE_COLLECTION: &str = "knowledge";

/// Query against the knowledge base
#[derive(Debug, Clone, Default)]
pub struct KnowledgeQuery {
    pub domain: Option<String>,
    pub project_type: Option<String>,
    pub technologies: Vec<String>,
}

/// Store owning execution contexts and knowledge entries
pub struct MemoryStore {
    docs: DocumentStore,
    contexts: RwLock<Vec<ExecutionContext>>,
    knowledge: RwLock<Vec<KnowledgeEntry>>,
}

impl MemoryStore {
    /// Open the store in its namespace, loading persisted collections
    pub fn open(docs: DocumentStore) -> Result<Self> {
        let contexts: Vec<ExecutionContext> = docs.read(CONTEXTS_COLLECTION)?;
        let knowledge: Vec<KnowledgeEntry> = docs.read(KNOWLEDGE_COLLECTION)?;
        debug!(
            contexts = contexts.len(),
            knowledge = knowledge.len(),
            "memory store opened"
        );
        Ok(Self {
            docs,
            contexts: RwLock::new(contexts),
            knowledge: RwLock::new(knowledge),
        })
    }

    /// Start a new execution run for a task
    pub async fn begin_execution(&self, task_id: &str) -> Result<ExecutionContext> {
        let context = ExecutionContext::new(task_id);

        let mut guard = self.contexts.write().await;
        let mut candidate = guard.clone();
        candidate.push(context.clone());
        self.docs.write(CONTEXTS_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(execution_id = %context.execution_id, task_id, "execution started");
        Ok(context)
    }

    /// Append a step to a running execution
    pub async fn record_step(&self, execution_id: &str, step: Step) -> Result<()> {
        self.append(execution_id, |ctx| ctx.steps.push(step)).await
    }

    /// Append a decision to a running execution
    pub async fn record_decision(&self, execution_id: &str, decision: Decision) -> Result<()> {
        self.append(execution_id, |ctx| ctx.decisions.push(decision))
            .await
    }

    /// Append a discovery to a running execution
    pub async fn record_discovery(&self, execution_id: &str, discovery: Discovery) -> Result<()> {
        self.append(execution_id, |ctx| ctx.discoveries.push(discovery))
            .await
    }

    async fn append<F>(&self, execution_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ExecutionContext),
    {
        let mut guard = self.contexts.write().await;
        let position = guard
            .iter()
            .position(|c| c.execution_id == execution_id)
            .ok_or_else(|| Error::ExecutionNotFound(execution_id.to_string()))?;

        if guard[position].status.is_terminal() {
            return Err(Error::ExecutionFinished(execution_id.to_string()));
        }

        let mut candidate = guard.clone();
        mutate(&mut candidate[position]);
        self.docs.write(CONTEXTS_COLLECTION, &candidate)?;
        *guard = candidate;
        Ok(())
    }

    /// Transition an execution to its terminal state, exactly once
    pub async fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<ExecutionContext> {
        if !status.is_terminal() {
            return Err(Error::Validation(
                "finish_execution requires a terminal status".into(),
            ));
        }

        let mut guard = self.contexts.write().await;
        let position = guard
            .iter()
            .position(|c| c.execution_id == execution_id)
            .ok_or_else(|| Error::ExecutionNotFound(execution_id.to_string()))?;

        if guard[position].status.is_terminal() {
            return Err(Error::ExecutionFinished(execution_id.to_string()));
        }

        let mut candidate = guard.clone();
        candidate[position].status = status;
        candidate[position].finished_at = Some(chrono::Utc::now());
        self.docs.write(CONTEXTS_COLLECTION, &candidate)?;
        let context = candidate[position].clone();
        *guard = candidate;

        info!(execution_id, status = ?status, "execution finished");
        Ok(context)
    }

    /// Get an execution context by id
    pub async fn get_execution(&self, execution_id: &str) -> Result<ExecutionContext> {
        self.contexts
            .read()
            .await
            .iter()
            .find(|c| c.execution_id == execution_id)
            .cloned()
            .ok_or_else(|| Error::ExecutionNotFound(execution_id.to_string()))
    }

    /// All execution runs recorded for a task, oldest first
    pub async fn executions_for_task(&self, task_id: &str) -> Vec<ExecutionContext> {
        self.contexts
            .read()
            .await
            .iter()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Persist a knowledge entry; entries are immutable once recorded
    pub async fn record_knowledge(&self, entry: KnowledgeEntry) -> Result<String> {
        if !(0.0..=1.0).contains(&entry.confidence) {
            return Err(Error::Validation(format!(
                "confidence must be in [0, 1], got {}",
                entry.confidence
            )));
        }

        let mut guard = self.knowledge.write().await;
        if let Some(superseded) = &entry.supersedes {
            if !guard.iter().any(|k| &k.id == superseded) {
                return Err(Error::KnowledgeNotFound(superseded.clone()));
            }
        }

        let id = entry.id.clone();
        let mut candidate = guard.clone();
        candidate.push(entry);
        self.docs.write(KNOWLEDGE_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(knowledge_id = %id, "knowledge recorded");
        Ok(id)
    }

    /// Get a knowledge entry by id
    pub async fn get_knowledge(&self, id: &str) -> Result<KnowledgeEntry> {
        self.knowledge
            .read()
            .await
            .iter()
            .find(|k| k.id == id)
            .cloned()
            .ok_or_else(|| Error::KnowledgeNotFound(id.to_string()))
    }

    /// Query the knowledge base, ordered by confidence descending
    ///
    /// An entry is never returned when its applicability exclusions cover
    /// the queried domain or project type, or when the query lists
    /// technologies and the entry shares none of them. Entries superseded
    /// by a newer entry are skipped.
    pub async fn query_knowledge(&self, query: &KnowledgeQuery) -> Vec<KnowledgeEntry> {
        let guard = self.knowledge.read().await;

        let superseded: std::collections::HashSet<&str> = guard
            .iter()
            .filter_map(|k| k.supersedes.as_deref())
            .collect();

        let mut matches: Vec<KnowledgeEntry> = guard
            .iter()
            .filter(|entry| !superseded.contains(entry.id.as_str()))
            .filter(|entry| entry_matches(entry, query))
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }
}

fn entry_matches(entry: &KnowledgeEntry, query: &KnowledgeQuery) -> bool {
    if let Some(domain) = &query.domain {
        if excluded(&entry.applicability.exclusions, domain) {
            return false;
        }
        if let Some(entry_domain) = &entry.context.domain {
            if !entry_domain.eq_ignore_ascii_case(domain) {
                return false;
            }
        }
    }

    if let Some(project_type) = &query.project_type {
        if excluded(&entry.applicability.exclusions, project_type) {
            return false;
        }
        if !entry.applicability.project_types.is_empty()
            && !entry
                .applicability
                .project_types
                .iter()
                .any(|p| p.eq_ignore_ascii_case(project_type))
        {
            return false;
        }
    }

    if !query.technologies.is_empty() {
        let overlap = entry.context.technologies.iter().any(|tech| {
            query
                .technologies
                .iter()
                .any(|q| q.eq_ignore_ascii_case(tech))
        });
        if !overlap {
            return false;
        }
    }

    true
}

fn excluded(exclusions: &[String], value: &str) -> bool {
    exclusions.iter().any(|e| e.eq_ignore_ascii_case(value))
}
