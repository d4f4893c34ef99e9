pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod invariants;
pub mod models;
#[cfg(feature = "sqlx")]
pub mod operations;

pub mod prelude {
    pub use crate::algorithms::{build_forest, build_subtree, children_map};
    #[cfg(feature = "api")]
    pub use crate::api::{HasPool, TicketApp};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        assign_children, create_ticket, create_ticket_tables, delete_ticket, get_ticket,
        list_children, list_roots, list_tickets, remove_parent, set_completed, set_parent,
        update_title,
    };
    pub use crate::error::{ErrorDetails, ErrorKind, LibError, Result};
    pub use crate::invariants::{TreeSnapshot, TreeViolation};
    pub use crate::models::{
        AddChildrenPayload, CreateTicketPayload, NewTicket, SetCompletedPayload, SetParentPayload,
        Ticket, TicketId, TicketNode, UpdateTitlePayload,
    };
    #[cfg(feature = "sqlx")]
    pub use crate::operations::{
        TicketMutations, TicketOperation, TicketOperationResult, TicketOperations, TicketQueries,
    };
}
