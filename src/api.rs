use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ErrorKind, LibError};
use crate::models::{
    AddChildrenPayload, CreateTicketPayload, SetCompletedPayload, SetParentPayload, TicketId,
    UpdateTitlePayload,
};
use crate::operations::{TicketMutations, TicketQueries};

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(kind = ?self.0.kind, error = %self.0.source, "ticket api request failed");
        let body = json!({
            "error": {
                "code": self.0.code,
                "message": self.0.public,
                "details": self.0.details,
            }
        });
        (status, Json(body)).into_response()
    }
}

pub trait HasPool {
    fn pool(&self) -> Arc<sqlx::PgPool>;
}

pub trait TicketApp: HasPool {}

fn queries<S: TicketApp>(app: &S) -> TicketQueries {
    TicketQueries::new(app.pool())
}

fn mutations<S: TicketApp>(app: &S) -> TicketMutations {
    TicketMutations::new(app.pool())
}

async fn list_tickets_handler<S>(State(app): State<S>) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let forest = queries(&app).forest().await?;
    Ok(Json(forest))
}

async fn create_ticket_handler<S>(
    State(app): State<S>,
    Json(payload): Json<CreateTicketPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let created = mutations(&app).create(payload).await?;
    let ticket = queries(&app).node_for(&created).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let ticket = queries(&app).subtree(ticket_id).await?;
    Ok(Json(ticket))
}

async fn delete_ticket_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let removed = mutations(&app).remove(ticket_id).await?;
    Ok(Json(json!({ "removed": removed })))
}

async fn update_title_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
    Json(payload): Json<UpdateTitlePayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let updated = mutations(&app).update_title(ticket_id, payload).await?;
    let ticket = queries(&app).node_for(&updated).await?;
    Ok(Json(ticket))
}

async fn set_completed_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
    Json(payload): Json<SetCompletedPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let updated = mutations(&app).set_completed(ticket_id, payload).await?;
    let ticket = queries(&app).node_for(&updated).await?;
    Ok(Json(ticket))
}

async fn set_parent_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
    Json(payload): Json<SetParentPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let child = mutations(&app)
        .set_parent(ticket_id, payload.parent_id)
        .await?;
    let ticket = queries(&app).node_for(&child).await?;
    Ok(Json(ticket))
}

async fn remove_parent_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
) -> Result<impl IntoResponse, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let detached = mutations(&app).remove_parent(ticket_id).await?;
    let ticket = queries(&app).node_for(&detached).await?;
    Ok(Json(ticket))
}

#[derive(Debug, Clone, Deserialize)]
struct AddChildrenQuery {
    #[serde(rename = "return")]
    return_shape: Option<String>,
}

async fn add_children_handler<S>(
    State(app): State<S>,
    Path(ticket_id): Path<TicketId>,
    Query(query): Query<AddChildrenQuery>,
    Json(payload): Json<AddChildrenPayload>,
) -> Result<Response, AppError>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    let mutations = mutations(&app);
    let queries = queries(&app);

    if query.return_shape.as_deref() == Some("children") {
        let children = mutations
            .add_children_returning_all(ticket_id, &payload.child_ids)
            .await?;
        let nodes = queries.nodes_for(&children).await?;
        return Ok(Json(nodes).into_response());
    }

    let parent = mutations
        .add_children(ticket_id, &payload.child_ids)
        .await?;
    let ticket = queries.node_for(&parent).await?;
    Ok(Json(ticket).into_response())
}

pub fn routes<S>() -> Router<S>
where
    S: TicketApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /tickets [GET,POST]");
    tracing::info!("Registering route /tickets/{{ticket_id}} [GET,DELETE]");
    tracing::info!(
        "Registering route /tickets/{{ticket_id}}/{{title,completed,parent,children}} [PUT,POST,DELETE]"
    );

    Router::new()
        .route(
            "/tickets",
            get(list_tickets_handler::<S>).post(create_ticket_handler::<S>),
        )
        .route(
            "/tickets/{ticket_id}",
            get(get_ticket_handler::<S>).delete(delete_ticket_handler::<S>),
        )
        .route("/tickets/{ticket_id}/title", put(update_title_handler::<S>))
        .route(
            "/tickets/{ticket_id}/completed",
            put(set_completed_handler::<S>),
        )
        .route(
            "/tickets/{ticket_id}/parent",
            put(set_parent_handler::<S>).delete(remove_parent_handler::<S>),
        )
        .route(
            "/tickets/{ticket_id}/children",
            post(add_children_handler::<S>),
        )
}
