use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{ErrorDetails, LibError, Result};
use crate::models::TicketId;

/// Ways a proposed parent assignment can break the ticket tree.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeViolation {
    #[serde(rename_all = "camelCase")]
    UnknownTicket { ticket_id: TicketId },
    #[serde(rename_all = "camelCase")]
    SelfParent { ticket_id: TicketId },
    #[serde(rename_all = "camelCase")]
    CycleDetected {
        child_id: TicketId,
        parent_id: TicketId,
    },
}

impl TreeViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            TreeViolation::UnknownTicket { .. } => "not_found",
            TreeViolation::SelfParent { .. } => "ticket_self_parent",
            TreeViolation::CycleDetected { .. } => "ticket_cycle",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            TreeViolation::UnknownTicket { .. } => "Ticket not found",
            TreeViolation::SelfParent { .. } => "A ticket cannot be its own parent",
            TreeViolation::CycleDetected { .. } => {
                "Reparenting would make a ticket its own ancestor"
            }
        }
    }

    pub fn into_error(self) -> LibError {
        match self {
            TreeViolation::UnknownTicket { ticket_id } => LibError::not_found(
                self.public_message(),
                anyhow!("ticket {} not found", ticket_id),
            ),
            TreeViolation::SelfParent { ticket_id } => LibError::invalid_with_code(
                self.error_code(),
                self.public_message(),
                anyhow!("ticket {} proposed as its own parent", ticket_id),
            ),
            TreeViolation::CycleDetected {
                child_id,
                parent_id,
            } => LibError::invalid_with_details(
                self.error_code(),
                self.public_message(),
                ErrorDetails::CycleDetected {
                    child_id,
                    parent_id,
                },
                anyhow!(
                    "assigning parent {} to ticket {} closes an ancestor cycle",
                    parent_id,
                    child_id
                ),
            ),
        }
    }
}

/// An immutable view of the parent edges of every ticket, as read within a
/// single store transaction. All invariant checks are pure functions of
/// this snapshot.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    parents: HashMap<TicketId, Option<TicketId>>,
}

impl TreeSnapshot {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (TicketId, Option<TicketId>)>) -> Self {
        Self {
            parents: pairs.into_iter().collect(),
        }
    }

    pub fn contains(&self, ticket_id: TicketId) -> bool {
        self.parents.contains_key(&ticket_id)
    }

    pub fn parent_of(&self, ticket_id: TicketId) -> Option<TicketId> {
        self.parents.get(&ticket_id).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Tickets reached by repeatedly following `parent_id` from `ticket_id`,
    /// excluding `ticket_id` itself. The walk stops if it ever revisits a
    /// ticket, so it terminates even on a corrupted snapshot.
    pub fn ancestor_chain(&self, ticket_id: TicketId) -> Vec<TicketId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(ticket_id);
        let mut cursor = self.parent_of(ticket_id);
        while let Some(ancestor) = cursor {
            if !seen.insert(ancestor) {
                break;
            }
            chain.push(ancestor);
            cursor = self.parent_of(ancestor);
        }
        chain
    }

    /// Root tickets in the snapshot, in id order.
    pub fn roots(&self) -> Vec<TicketId> {
        let mut roots: Vec<TicketId> = self
            .parents
            .iter()
            .filter_map(|(id, parent)| parent.is_none().then_some(*id))
            .collect();
        roots.sort_by_key(|id| id.0);
        roots
    }

    /// Applies a parent edge change in place, without validation. Returns
    /// `false` when the ticket is absent.
    pub fn assign_parent(&mut self, ticket_id: TicketId, parent_id: Option<TicketId>) -> bool {
        match self.parents.get_mut(&ticket_id) {
            Some(slot) => {
                *slot = parent_id;
                true
            }
            None => false,
        }
    }

    /// Removes a ticket and promotes its children to roots. Returns the
    /// promoted children in id order, or `None` when the ticket is absent
    /// (removal is idempotent against absence).
    pub fn remove(&mut self, ticket_id: TicketId) -> Option<Vec<TicketId>> {
        self.parents.remove(&ticket_id)?;
        let mut orphaned = Vec::new();
        for (id, parent) in self.parents.iter_mut() {
            if *parent == Some(ticket_id) {
                *parent = None;
                orphaned.push(*id);
            }
        }
        orphaned.sort_by_key(|id| id.0);
        Some(orphaned)
    }

    pub fn is_ancestor(&self, ancestor: TicketId, ticket_id: TicketId) -> bool {
        self.ancestor_chain(ticket_id)
            .iter()
            .any(|id| *id == ancestor)
    }

    /// Checks a single proposed parent assignment against the snapshot.
    /// A `None` parent (detaching to root) is always structurally valid as
    /// long as the child exists.
    pub fn validate_parent_assignment(
        &self,
        child_id: TicketId,
        proposed_parent_id: Option<TicketId>,
    ) -> std::result::Result<(), TreeViolation> {
        if !self.contains(child_id) {
            return Err(TreeViolation::UnknownTicket {
                ticket_id: child_id,
            });
        }
        let Some(parent_id) = proposed_parent_id else {
            return Ok(());
        };
        if !self.contains(parent_id) {
            return Err(TreeViolation::UnknownTicket {
                ticket_id: parent_id,
            });
        }
        if parent_id == child_id {
            return Err(TreeViolation::SelfParent {
                ticket_id: child_id,
            });
        }
        if self.is_ancestor(child_id, parent_id) {
            return Err(TreeViolation::CycleDetected {
                child_id,
                parent_id,
            });
        }
        Ok(())
    }

    pub fn ensure_parent_assignment(
        &self,
        child_id: TicketId,
        proposed_parent_id: Option<TicketId>,
    ) -> Result<()> {
        self.validate_parent_assignment(child_id, proposed_parent_id)
            .map_err(TreeViolation::into_error)
    }

    /// Validates a bulk child reassignment as one unit and returns the
    /// deduplicated list of children to move under `parent_id`.
    ///
    /// The parent must exist (NotFound otherwise). Duplicate child ids are
    /// collapsed, so reassigning twice equals reassigning once. The first
    /// offending child aborts the whole plan with a partial-failure error
    /// naming it; callers apply either every returned assignment or none.
    pub fn plan_child_assignments(
        &self,
        parent_id: TicketId,
        child_ids: &[TicketId],
    ) -> Result<Vec<TicketId>> {
        if !self.contains(parent_id) {
            return Err(TreeViolation::UnknownTicket {
                ticket_id: parent_id,
            }
            .into_error());
        }

        let mut seen = HashSet::with_capacity(child_ids.len());
        let mut planned = Vec::with_capacity(child_ids.len());
        for &child_id in child_ids {
            if !seen.insert(child_id) {
                continue;
            }
            if let Err(violation) = self.validate_parent_assignment(child_id, Some(parent_id)) {
                return Err(LibError::invalid_with_details(
                    "ticket_bulk_partial_failure",
                    "Bulk child assignment aborted; no ticket was reassigned",
                    ErrorDetails::PartialFailure {
                        offending_id: child_id,
                    },
                    anyhow!(
                        "bulk assignment under parent {} rejected child {}: {:?}",
                        parent_id,
                        child_id,
                        violation
                    ),
                ));
            }
            planned.push(child_id);
        }

        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{TreeSnapshot, TreeViolation};
    use crate::error::{ErrorDetails, ErrorKind};
    use crate::models::TicketId;

    fn id() -> TicketId {
        TicketId(Uuid::new_v4())
    }

    /// root -> mid -> leaf, plus a detached root `other`.
    fn sample_tree() -> (TreeSnapshot, TicketId, TicketId, TicketId, TicketId) {
        let root = id();
        let mid = id();
        let leaf = id();
        let other = id();
        let snapshot = TreeSnapshot::from_pairs([
            (root, None),
            (mid, Some(root)),
            (leaf, Some(mid)),
            (other, None),
        ]);
        (snapshot, root, mid, leaf, other)
    }

    #[test]
    fn ancestor_chain_walks_to_root() {
        let (snapshot, root, mid, leaf, _) = sample_tree();
        assert_eq!(snapshot.ancestor_chain(leaf), vec![mid, root]);
        assert_eq!(snapshot.ancestor_chain(root), Vec::<TicketId>::new());
    }

    #[test]
    fn ancestor_chain_terminates_on_corrupted_snapshot() {
        let a = id();
        let b = id();
        let snapshot = TreeSnapshot::from_pairs([(a, Some(b)), (b, Some(a))]);
        assert_eq!(snapshot.ancestor_chain(a), vec![b]);
    }

    #[test]
    fn unknown_child_is_rejected() {
        let (snapshot, root, ..) = sample_tree();
        let missing = id();
        let violation = snapshot
            .validate_parent_assignment(missing, Some(root))
            .expect_err("missing child should be rejected");
        assert_eq!(violation, TreeViolation::UnknownTicket { ticket_id: missing });
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let (snapshot, _, _, leaf, _) = sample_tree();
        let missing = id();
        let violation = snapshot
            .validate_parent_assignment(leaf, Some(missing))
            .expect_err("missing parent should be rejected");
        assert_eq!(violation, TreeViolation::UnknownTicket { ticket_id: missing });
    }

    #[test]
    fn self_parent_is_rejected() {
        let (snapshot, _, mid, _, _) = sample_tree();
        let violation = snapshot
            .validate_parent_assignment(mid, Some(mid))
            .expect_err("self parent should be rejected");
        assert_eq!(violation, TreeViolation::SelfParent { ticket_id: mid });

        let err = violation.into_error();
        assert_eq!(err.code, "ticket_self_parent");
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let (snapshot, root, mid, _, _) = sample_tree();
        let violation = snapshot
            .validate_parent_assignment(root, Some(mid))
            .expect_err("direct cycle should be rejected");
        assert_eq!(
            violation,
            TreeViolation::CycleDetected {
                child_id: root,
                parent_id: mid,
            }
        );
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let (snapshot, root, _, leaf, _) = sample_tree();
        let err = snapshot
            .ensure_parent_assignment(root, Some(leaf))
            .expect_err("transitive cycle should be rejected");
        assert_eq!(err.code, "ticket_cycle");
        assert_eq!(
            err.details,
            Some(ErrorDetails::CycleDetected {
                child_id: root,
                parent_id: leaf,
            })
        );
    }

    #[test]
    fn detaching_to_root_is_always_valid_for_existing_tickets() {
        let (snapshot, _, _, leaf, _) = sample_tree();
        snapshot
            .validate_parent_assignment(leaf, None)
            .expect("detach should validate");
    }

    #[test]
    fn sibling_reparent_is_valid() {
        let (snapshot, _, _, leaf, other) = sample_tree();
        snapshot
            .validate_parent_assignment(leaf, Some(other))
            .expect("reparent to unrelated root should validate");
    }

    #[test]
    fn plan_requires_existing_parent() {
        let (snapshot, _, mid, ..) = sample_tree();
        let missing = id();
        let err = snapshot
            .plan_child_assignments(missing, &[mid])
            .expect_err("missing parent should be NotFound");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn plan_collapses_duplicate_children() {
        let (snapshot, _, _, leaf, other) = sample_tree();
        let planned = snapshot
            .plan_child_assignments(other, &[leaf, leaf, leaf])
            .expect("duplicates should be idempotent");
        assert_eq!(planned, vec![leaf]);
    }

    #[test]
    fn plan_aborts_on_first_offending_child() {
        let (snapshot, _, _, leaf, other) = sample_tree();
        let missing = id();
        let err = snapshot
            .plan_child_assignments(other, &[leaf, missing])
            .expect_err("missing child should abort the plan");
        assert_eq!(err.code, "ticket_bulk_partial_failure");
        assert_eq!(
            err.details,
            Some(ErrorDetails::PartialFailure {
                offending_id: missing,
            })
        );
    }

    #[test]
    fn plan_rejects_cycle_forming_member() {
        let (snapshot, root, mid, _, other) = sample_tree();
        // mid is an ancestor of nothing in `other`'s chain, but root is an
        // ancestor of mid, so moving root under mid must abort everything.
        let err = snapshot
            .plan_child_assignments(mid, &[other, root])
            .expect_err("cycle-forming member should abort the plan");
        assert_eq!(
            err.details,
            Some(ErrorDetails::PartialFailure { offending_id: root })
        );
    }

    #[test]
    fn plan_result_is_order_independent() {
        let (snapshot, _, _, leaf, other) = sample_tree();
        let a = snapshot
            .plan_child_assignments(other, &[leaf])
            .expect("plan should succeed");
        let b = snapshot
            .plan_child_assignments(other, &[leaf])
            .expect("plan should succeed");
        assert_eq!(a, b);
    }

    #[test]
    fn remove_promotes_children_to_roots() {
        let (mut snapshot, root, mid, leaf, other) = sample_tree();
        let orphaned = snapshot.remove(root).expect("root should exist");
        assert_eq!(orphaned, vec![mid]);
        assert!(snapshot.roots().contains(&mid));
        assert!(snapshot.roots().contains(&other));
        // Grandchildren keep their parent; only direct children are promoted.
        assert_eq!(snapshot.parent_of(leaf), Some(mid));
    }

    #[test]
    fn remove_of_missing_ticket_leaves_snapshot_untouched() {
        let (mut snapshot, ..) = sample_tree();
        let before = snapshot.len();
        assert!(snapshot.remove(id()).is_none());
        assert_eq!(snapshot.len(), before);
    }

    #[test]
    fn remove_of_leaf_orphans_nothing() {
        let (mut snapshot, _, _, leaf, _) = sample_tree();
        assert_eq!(snapshot.remove(leaf), Some(vec![]));
        assert!(!snapshot.contains(leaf));
    }

    #[test]
    fn detach_promotes_ticket_to_root() {
        let (mut snapshot, _, _, leaf, _) = sample_tree();
        assert!(snapshot.assign_parent(leaf, None));
        assert!(snapshot.roots().contains(&leaf));
    }

    #[test]
    fn assign_parent_on_missing_ticket_is_false() {
        let (mut snapshot, root, ..) = sample_tree();
        assert!(!snapshot.assign_parent(id(), Some(root)));
    }

    #[test]
    fn plan_allows_empty_child_list() {
        let (snapshot, _, _, _, other) = sample_tree();
        let planned = snapshot
            .plan_child_assignments(other, &[])
            .expect("empty plan should succeed");
        assert!(planned.is_empty());
    }
}
