use std::collections::{HashMap, HashSet};

use crate::models::{Ticket, TicketId, TicketNode};

/// Groups tickets by their parent id, preserving the input order within
/// each group. Tickets with no parent land under `None`.
pub fn children_map(tickets: &[Ticket]) -> HashMap<Option<TicketId>, Vec<&Ticket>> {
    let mut map: HashMap<Option<TicketId>, Vec<&Ticket>> = HashMap::new();
    for ticket in tickets {
        map.entry(ticket.parent_id).or_default().push(ticket);
    }
    map
}

/// Assembles every root ticket into a `TicketNode` tree. Input order is
/// preserved among siblings, so a store scan with a stable ORDER BY yields
/// a stable forest.
pub fn build_forest(tickets: &[Ticket]) -> Vec<TicketNode> {
    let by_parent = children_map(tickets);
    let mut visited = HashSet::new();
    by_parent
        .get(&None)
        .map(|roots| {
            roots
                .iter()
                .map(|root| hydrate(root, &by_parent, &mut visited))
                .collect()
        })
        .unwrap_or_default()
}

/// Assembles the subtree rooted at `root_id`, or `None` if the ticket is
/// not present in the slice.
pub fn build_subtree(tickets: &[Ticket], root_id: TicketId) -> Option<TicketNode> {
    let root = tickets.iter().find(|ticket| ticket.id == root_id)?;
    Some(build_node(root, tickets))
}

/// Serializes one ticket with its children resolved from the slice. The
/// ticket itself does not need to appear in the slice, so a row a
/// mutation already returned can be hydrated against a scan taken later.
pub fn build_node(ticket: &Ticket, tickets: &[Ticket]) -> TicketNode {
    let by_parent = children_map(tickets);
    let mut visited = HashSet::new();
    hydrate(ticket, &by_parent, &mut visited)
}

fn hydrate(
    ticket: &Ticket,
    by_parent: &HashMap<Option<TicketId>, Vec<&Ticket>>,
    visited: &mut HashSet<TicketId>,
) -> TicketNode {
    // Revisit guard keeps hydration terminating even if the stored parent
    // edges were corrupted into a cycle.
    let children = if visited.insert(ticket.id) {
        by_parent
            .get(&Some(ticket.id))
            .map(|children| {
                children
                    .iter()
                    .filter_map(|child| {
                        if visited.contains(&child.id) {
                            None
                        } else {
                            Some(hydrate(child, by_parent, visited))
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    TicketNode {
        id: ticket.id,
        title: ticket.title.clone(),
        is_completed: ticket.is_completed,
        children,
    }
}
