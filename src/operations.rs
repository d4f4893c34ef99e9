use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::algorithms;
use crate::db;
use crate::error::{LibError, Result};
use crate::models::{
    AddChildrenPayload, CreateTicketPayload, SetCompletedPayload, Ticket, TicketId, TicketNode,
    UpdateTitlePayload,
};

/// Read-only tree navigation over the ticket store.
#[derive(Clone)]
pub struct TicketQueries {
    pool: Arc<PgPool>,
}

impl TicketQueries {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub async fn roots(&self) -> Result<Vec<Ticket>> {
        db::list_roots(&self.pool).await
    }

    pub async fn get(&self, ticket_id: TicketId) -> Result<Ticket> {
        db::get_ticket(&self.pool, ticket_id).await
    }

    pub async fn children(&self, ticket_id: TicketId) -> Result<Vec<Ticket>> {
        db::list_children(&self.pool, ticket_id).await
    }

    /// Every root hydrated into its serialized tree form.
    pub async fn forest(&self) -> Result<Vec<TicketNode>> {
        let tickets = db::list_tickets(&self.pool).await?;
        Ok(algorithms::build_forest(&tickets))
    }

    /// One ticket hydrated with its (recursive) children.
    pub async fn subtree(&self, ticket_id: TicketId) -> Result<TicketNode> {
        let tickets = db::list_tickets(&self.pool).await?;
        algorithms::build_subtree(&tickets, ticket_id).ok_or_else(|| {
            LibError::not_found(
                "Ticket not found",
                anyhow!("ticket {} not found", ticket_id),
            )
        })
    }

    /// Serializes a row a mutation already returned, resolving its
    /// children from one scan. The committed mutation stays a success
    /// even if a concurrent delete removed the row before the scan.
    pub async fn node_for(&self, ticket: &Ticket) -> Result<TicketNode> {
        let tickets = db::list_tickets(&self.pool).await?;
        Ok(algorithms::build_node(ticket, &tickets))
    }

    /// `node_for` over several returned rows, sharing a single scan.
    pub async fn nodes_for(&self, returned: &[Ticket]) -> Result<Vec<TicketNode>> {
        let tickets = db::list_tickets(&self.pool).await?;
        Ok(returned
            .iter()
            .map(|ticket| algorithms::build_node(ticket, &tickets))
            .collect())
    }
}

/// Orchestrates tree edits. Every method is one store transaction: fully
/// applied or fully rejected, with validation reads isolated from
/// concurrent mutations.
#[derive(Clone)]
pub struct TicketMutations {
    pool: Arc<PgPool>,
}

impl TicketMutations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub async fn create(&self, payload: CreateTicketPayload) -> Result<Ticket> {
        db::create_ticket(&self.pool, payload).await
    }

    pub async fn update_title(
        &self,
        ticket_id: TicketId,
        payload: UpdateTitlePayload,
    ) -> Result<Ticket> {
        db::update_title(&self.pool, ticket_id, payload).await
    }

    pub async fn set_completed(
        &self,
        ticket_id: TicketId,
        payload: SetCompletedPayload,
    ) -> Result<Ticket> {
        db::set_completed(&self.pool, ticket_id, payload).await
    }

    /// Deletes a ticket and promotes its children to roots. Deletion is
    /// idempotent against absence: a missing id is a normal `false`.
    pub async fn remove(&self, ticket_id: TicketId) -> Result<bool> {
        db::delete_ticket(&self.pool, ticket_id).await
    }

    pub async fn set_parent(&self, child_id: TicketId, parent_id: TicketId) -> Result<Ticket> {
        db::set_parent(&self.pool, child_id, parent_id).await
    }

    pub async fn remove_parent(&self, ticket_id: TicketId) -> Result<Ticket> {
        db::remove_parent(&self.pool, ticket_id).await
    }

    /// All-or-nothing bulk reassignment; returns the updated parent.
    pub async fn add_children(
        &self,
        parent_id: TicketId,
        child_ids: &[TicketId],
    ) -> Result<Ticket> {
        let (parent, _) = db::assign_children(&self.pool, parent_id, child_ids).await?;
        Ok(parent)
    }

    /// All-or-nothing bulk reassignment; returns every updated child.
    pub async fn add_children_returning_all(
        &self,
        parent_id: TicketId,
        child_ids: &[TicketId],
    ) -> Result<Vec<Ticket>> {
        let (_, children) = db::assign_children(&self.pool, parent_id, child_ids).await?;
        Ok(children)
    }
}

/// Gateway-facing ticket actions, one variant per exposed operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TicketOperation {
    List,
    Get {
        ticket_id: TicketId,
    },
    Create {
        payload: CreateTicketPayload,
    },
    UpdateTitle {
        ticket_id: TicketId,
        payload: UpdateTitlePayload,
    },
    SetCompleted {
        ticket_id: TicketId,
        payload: SetCompletedPayload,
    },
    Remove {
        ticket_id: TicketId,
    },
    AddChildren {
        parent_id: TicketId,
        payload: AddChildrenPayload,
    },
    AddChildrenReturningAll {
        parent_id: TicketId,
        payload: AddChildrenPayload,
    },
    SetParent {
        parent_id: TicketId,
        child_id: TicketId,
    },
    RemoveParent {
        ticket_id: TicketId,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TicketOperationResult {
    Forest { items: Vec<TicketNode> },
    Ticket { ticket: TicketNode },
    Tickets { items: Vec<TicketNode> },
    Removed { removed: bool },
}

/// Facade over queries and mutations for callers speaking the operation
/// enum. Results carry the serialized tree form, children resolved via
/// the query side.
#[derive(Clone)]
pub struct TicketOperations {
    queries: TicketQueries,
    mutations: TicketMutations,
}

impl TicketOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            queries: TicketQueries::new(Arc::clone(&pool)),
            mutations: TicketMutations::new(pool),
        }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self::new(Arc::new(pool.clone()))
    }

    pub fn queries(&self) -> &TicketQueries {
        &self.queries
    }

    pub fn mutations(&self) -> &TicketMutations {
        &self.mutations
    }

    pub async fn execute(&self, operation: TicketOperation) -> Result<TicketOperationResult> {
        match operation {
            TicketOperation::List => {
                let items = self.queries.forest().await?;
                Ok(TicketOperationResult::Forest { items })
            }
            TicketOperation::Get { ticket_id } => {
                let ticket = self.queries.subtree(ticket_id).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::Create { payload } => {
                let created = self.mutations.create(payload).await?;
                let ticket = self.queries.node_for(&created).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::UpdateTitle { ticket_id, payload } => {
                let updated = self.mutations.update_title(ticket_id, payload).await?;
                let ticket = self.queries.node_for(&updated).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::SetCompleted { ticket_id, payload } => {
                let updated = self.mutations.set_completed(ticket_id, payload).await?;
                let ticket = self.queries.node_for(&updated).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::Remove { ticket_id } => {
                let removed = self.mutations.remove(ticket_id).await?;
                Ok(TicketOperationResult::Removed { removed })
            }
            TicketOperation::AddChildren { parent_id, payload } => {
                let parent = self
                    .mutations
                    .add_children(parent_id, &payload.child_ids)
                    .await?;
                let ticket = self.queries.node_for(&parent).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::AddChildrenReturningAll { parent_id, payload } => {
                let children = self
                    .mutations
                    .add_children_returning_all(parent_id, &payload.child_ids)
                    .await?;
                let items = self.queries.nodes_for(&children).await?;
                Ok(TicketOperationResult::Tickets { items })
            }
            TicketOperation::SetParent {
                parent_id,
                child_id,
            } => {
                let child = self.mutations.set_parent(child_id, parent_id).await?;
                let ticket = self.queries.node_for(&child).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
            TicketOperation::RemoveParent { ticket_id } => {
                let detached = self.mutations.remove_parent(ticket_id).await?;
                let ticket = self.queries.node_for(&detached).await?;
                Ok(TicketOperationResult::Ticket { ticket })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{TicketOperation, TicketOperationResult};
    use crate::models::{TicketId, TicketNode};

    #[test]
    fn operations_deserialize_from_tagged_json() {
        let parent_id = Uuid::new_v4();
        let child_id = Uuid::new_v4();

        let operation: TicketOperation = serde_json::from_value(json!({
            "operation": "set_parent",
            "parentId": parent_id,
            "childId": child_id,
        }))
        .expect("operation should deserialize");

        match operation {
            TicketOperation::SetParent {
                parent_id: p,
                child_id: c,
            } => {
                assert_eq!(p, TicketId(parent_id));
                assert_eq!(c, TicketId(child_id));
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn bulk_operation_carries_child_ids() {
        let parent_id = Uuid::new_v4();
        let child_id = Uuid::new_v4();

        let operation: TicketOperation = serde_json::from_value(json!({
            "operation": "add_children",
            "parentId": parent_id,
            "payload": { "childIds": [child_id, child_id] },
        }))
        .expect("operation should deserialize");

        match operation {
            TicketOperation::AddChildren { payload, .. } => {
                assert_eq!(payload.child_ids, vec![TicketId(child_id); 2]);
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn removed_result_serializes_flag() {
        let value = serde_json::to_value(TicketOperationResult::Removed { removed: false })
            .expect("result should serialize");
        assert_eq!(value, json!({ "result": "removed", "removed": false }));
    }

    #[test]
    fn ticket_result_serializes_tree_form() {
        let node = TicketNode {
            id: TicketId(Uuid::new_v4()),
            title: "Epic".to_string(),
            is_completed: false,
            children: vec![],
        };
        let value = serde_json::to_value(TicketOperationResult::Ticket { ticket: node })
            .expect("result should serialize");
        assert_eq!(value["result"], json!("ticket"));
        assert_eq!(value["ticket"]["children"], json!([]));
    }
}
