use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::invariants::TreeSnapshot;
use crate::models::{
    CreateTicketPayload, SetCompletedPayload, Ticket, TicketId, UpdateTitlePayload,
};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_ticket_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct TicketRow {
    id: Uuid,
    title: String,
    is_completed: bool,
    parent_id: Option<Uuid>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

impl From<TicketRow> for Ticket {
    fn from(value: TicketRow) -> Self {
        Self {
            id: TicketId(value.id),
            title: value.title,
            is_completed: value.is_completed,
            parent_id: value.parent_id.map(TicketId),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ParentRow {
    id: Uuid,
    parent_id: Option<Uuid>,
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

fn ticket_not_found(ticket_id: TicketId) -> LibError {
    LibError::not_found(
        "Ticket not found",
        anyhow!("ticket {} not found", ticket_id),
    )
}

async fn begin(pool: &PgPool) -> Result<Transaction<'_, Postgres>> {
    pool.begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))
}

/// Reads the parent edge of every ticket under row locks, so the snapshot
/// used for invariant validation cannot be invalidated by a concurrent
/// mutation before this transaction commits.
async fn load_tree_for_update(tx: &mut Transaction<'_, Postgres>) -> Result<TreeSnapshot> {
    let rows = sqlx::query_as::<_, ParentRow>(
        r#"
        SELECT id, parent_id
        FROM ticket.tickets
        FOR UPDATE
        "#,
    )
    .fetch_all(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to read ticket tree", err))?;

    Ok(TreeSnapshot::from_pairs(
        rows.into_iter()
            .map(|row| (TicketId(row.id), row.parent_id.map(TicketId))),
    ))
}

pub async fn get_ticket(pool: &PgPool, ticket_id: TicketId) -> Result<Ticket> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        WHERE id = $1
        "#,
    )
    .bind(ticket_id.0)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query ticket", err))?;

    row.map(Ticket::from).ok_or_else(|| ticket_not_found(ticket_id))
}

pub async fn list_tickets(pool: &PgPool) -> Result<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list tickets", err))?;

    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn list_roots(pool: &PgPool) -> Result<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        WHERE parent_id IS NULL
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list root tickets", err))?;

    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn list_children(pool: &PgPool, parent_id: TicketId) -> Result<Vec<Ticket>> {
    let rows = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        WHERE parent_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(parent_id.0)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list child tickets", err))?;

    Ok(rows.into_iter().map(Ticket::from).collect())
}

pub async fn create_ticket(pool: &PgPool, payload: CreateTicketPayload) -> Result<Ticket> {
    let new_ticket = payload.normalize()?;

    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        INSERT INTO ticket.tickets (id, title, is_completed)
        VALUES ($1, $2, $3)
        RETURNING id, title, is_completed, parent_id, created_at, updated_at
        "#,
    )
    .bind(new_ticket.id.0)
    .bind(&new_ticket.title)
    .bind(new_ticket.is_completed)
    .fetch_one(pool)
    .await
    .map_err(|err| db_err("Failed to create ticket", err))?;

    tracing::debug!(ticket_id = %new_ticket.id, "created ticket");
    Ok(row.into())
}

pub async fn update_title(
    pool: &PgPool,
    ticket_id: TicketId,
    payload: UpdateTitlePayload,
) -> Result<Ticket> {
    let title = payload.normalize()?;

    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        UPDATE ticket.tickets
        SET title = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING id, title, is_completed, parent_id, created_at, updated_at
        "#,
    )
    .bind(&title)
    .bind(ticket_id.0)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to update ticket title", err))?;

    row.map(Ticket::from).ok_or_else(|| ticket_not_found(ticket_id))
}

pub async fn set_completed(
    pool: &PgPool,
    ticket_id: TicketId,
    payload: SetCompletedPayload,
) -> Result<Ticket> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        UPDATE ticket.tickets
        SET is_completed = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING id, title, is_completed, parent_id, created_at, updated_at
        "#,
    )
    .bind(payload.is_completed)
    .bind(ticket_id.0)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to update ticket completion", err))?;

    row.map(Ticket::from).ok_or_else(|| ticket_not_found(ticket_id))
}

/// Deletes a ticket, promoting its children to roots in the same
/// transaction. Returns `false` when the ticket does not exist.
pub async fn delete_ticket(pool: &PgPool, ticket_id: TicketId) -> Result<bool> {
    let mut tx = begin(pool).await?;
    let mut snapshot = load_tree_for_update(&mut tx).await?;
    let Some(orphaned) = snapshot.remove(ticket_id) else {
        return Ok(false);
    };
    let orphaned_raw: Vec<Uuid> = orphaned.iter().map(|id| id.0).collect();

    sqlx::query(
        r#"
        UPDATE ticket.tickets
        SET parent_id = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ANY($1)
        "#,
    )
    .bind(&orphaned_raw)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to orphan child tickets", err))?;

    sqlx::query(
        r#"
        DELETE FROM ticket.tickets
        WHERE id = $1
        "#,
    )
    .bind(ticket_id.0)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to delete ticket", err))?;

    commit(tx).await?;
    tracing::debug!(
        ticket_id = %ticket_id,
        orphaned = orphaned.len(),
        "deleted ticket and promoted its children to roots"
    );
    Ok(true)
}

pub async fn set_parent(
    pool: &PgPool,
    child_id: TicketId,
    parent_id: TicketId,
) -> Result<Ticket> {
    let mut tx = begin(pool).await?;
    let snapshot = load_tree_for_update(&mut tx).await?;
    snapshot.ensure_parent_assignment(child_id, Some(parent_id))?;

    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        UPDATE ticket.tickets
        SET parent_id = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        RETURNING id, title, is_completed, parent_id, created_at, updated_at
        "#,
    )
    .bind(parent_id.0)
    .bind(child_id.0)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to reparent ticket", err))?;

    commit(tx).await?;
    tracing::debug!(child_id = %child_id, parent_id = %parent_id, "reparented ticket");
    Ok(row.into())
}

pub async fn remove_parent(pool: &PgPool, ticket_id: TicketId) -> Result<Ticket> {
    let row = sqlx::query_as::<_, TicketRow>(
        r#"
        UPDATE ticket.tickets
        SET parent_id = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $1
        RETURNING id, title, is_completed, parent_id, created_at, updated_at
        "#,
    )
    .bind(ticket_id.0)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to detach ticket", err))?;

    row.map(Ticket::from).ok_or_else(|| ticket_not_found(ticket_id))
}

/// Reassigns every ticket in `child_ids` under `parent_id` as one
/// transaction. Either every child is moved or none is: the plan is
/// validated against the locked snapshot before any write. Returns the
/// updated parent and the updated children.
pub async fn assign_children(
    pool: &PgPool,
    parent_id: TicketId,
    child_ids: &[TicketId],
) -> Result<(Ticket, Vec<Ticket>)> {
    let mut tx = begin(pool).await?;
    let snapshot = load_tree_for_update(&mut tx).await?;
    let planned = snapshot.plan_child_assignments(parent_id, child_ids)?;
    let planned_raw: Vec<Uuid> = planned.iter().map(|id| id.0).collect();

    sqlx::query(
        r#"
        UPDATE ticket.tickets
        SET parent_id = $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ANY($2)
        "#,
    )
    .bind(parent_id.0)
    .bind(&planned_raw)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to assign child tickets", err))?;

    let children = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        WHERE id = ANY($1)
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(&planned_raw)
    .fetch_all(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to read assigned children", err))?;

    let parent = sqlx::query_as::<_, TicketRow>(
        r#"
        SELECT id, title, is_completed, parent_id, created_at, updated_at
        FROM ticket.tickets
        WHERE id = $1
        "#,
    )
    .bind(parent_id.0)
    .fetch_one(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to read parent ticket", err))?;

    commit(tx).await?;
    tracing::debug!(
        parent_id = %parent_id,
        child_count = children.len(),
        "assigned children to ticket"
    );
    Ok((
        parent.into(),
        children.into_iter().map(Ticket::from).collect(),
    ))
}
