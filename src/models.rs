use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TicketId(pub Uuid);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for TicketId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// A stored ticket record. `children` is never part of this struct: it is
/// derived from the set of tickets whose `parent_id` points here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TicketId>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Ticket {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Gateway-facing serialized form of a ticket with its child subtrees
/// resolved from the derived children relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketNode {
    pub id: TicketId,
    pub title: String,
    pub is_completed: bool,
    pub children: Vec<TicketNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketPayload {
    pub title: String,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitlePayload {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCompletedPayload {
    pub is_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetParentPayload {
    pub parent_id: TicketId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChildrenPayload {
    pub child_ids: Vec<TicketId>,
}

/// A create request after validation, with its id assigned. New tickets
/// always start at root level.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: TicketId,
    pub title: String,
    pub is_completed: bool,
}

impl CreateTicketPayload {
    pub fn normalize(self) -> Result<NewTicket> {
        let title = normalize_title(self.title)?;
        Ok(NewTicket {
            id: TicketId(Uuid::new_v4()),
            title,
            is_completed: self.is_completed.unwrap_or(false),
        })
    }
}

impl UpdateTitlePayload {
    pub fn normalize(self) -> Result<String> {
        normalize_title(self.title)
    }
}

pub fn normalize_title(title: String) -> Result<String> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(LibError::invalid(
            "Ticket title is required",
            anyhow!("empty ticket title"),
        ));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateTicketPayload, Ticket, TicketId, TicketNode, UpdateTitlePayload};

    #[test]
    fn normalize_create_assigns_id_and_defaults_completion() {
        let payload = CreateTicketPayload {
            title: "Epic".to_string(),
            is_completed: None,
        };

        let ticket = payload.normalize().expect("payload should normalize");
        assert_eq!(ticket.title, "Epic");
        assert!(!ticket.is_completed);
    }

    #[test]
    fn normalize_create_trims_title() {
        let payload = CreateTicketPayload {
            title: "  Epic  ".to_string(),
            is_completed: Some(true),
        };

        let ticket = payload.normalize().expect("payload should normalize");
        assert_eq!(ticket.title, "Epic");
        assert!(ticket.is_completed);
    }

    #[test]
    fn normalize_create_rejects_empty_title() {
        let payload = CreateTicketPayload {
            title: "   ".to_string(),
            is_completed: None,
        };

        let err = payload.normalize().expect_err("should reject empty title");
        assert_eq!(err.code, "invalid_input");
        assert_eq!(err.public, "Ticket title is required");
    }

    #[test]
    fn normalize_update_rejects_empty_title() {
        let payload = UpdateTitlePayload {
            title: "".to_string(),
        };

        let err = payload.normalize().expect_err("should reject empty title");
        assert_eq!(err.public, "Ticket title is required");
    }

    #[test]
    fn ticket_serializes_camel_case_and_omits_null_parent() {
        let id = TicketId(uuid::Uuid::new_v4());
        let now = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid datetime");
        let ticket = Ticket {
            id,
            title: "Epic".to_string(),
            is_completed: false,
            parent_id: None,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&ticket).expect("ticket should serialize");
        assert_eq!(value["isCompleted"], json!(false));
        assert!(value.get("parentId").is_none());
    }

    #[test]
    fn ticket_node_serializes_nested_children() {
        let parent = TicketId(uuid::Uuid::new_v4());
        let child = TicketId(uuid::Uuid::new_v4());
        let node = TicketNode {
            id: parent,
            title: "Epic".to_string(),
            is_completed: false,
            children: vec![TicketNode {
                id: child,
                title: "Task".to_string(),
                is_completed: true,
                children: vec![],
            }],
        };

        let value = serde_json::to_value(&node).expect("node should serialize");
        assert_eq!(value["children"][0]["title"], json!("Task"));
        assert_eq!(value["children"][0]["isCompleted"], json!(true));
    }
}
