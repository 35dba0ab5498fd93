//! Who may do what on a ticket.
//!
//! Everything here is a pure function of its arguments. Resolving the
//! buildings of an actor is the job of
//! [`BuildingMembership`](crate::store::BuildingMembership).

use std::collections::BTreeSet;

use crate::db::{
    ticket::Status,
    user::{Actor, Role},
    Ticket,
};

/// Building id granting access to every building.
pub const WILDCARD: &str = "*";

pub fn has_building_access(
    building_ids: &BTreeSet<String>,
    building_id: &str,
) -> bool {
    building_ids.contains(WILDCARD) || building_ids.contains(building_id)
}

/// Whether `actor` may post or read comments on `ticket`.
///
/// Managers need access to the ticket's building, residents have to be the
/// ones who requested it. Nobody else gets in.
pub fn can_comment(
    ticket: &Ticket,
    actor: &Actor,
    building_ids: &BTreeSet<String>,
) -> bool {
    match actor.role {
        Role::Manager => has_building_access(building_ids, &ticket.building_id),
        Role::Resident => ticket.requested_by == actor.id,
        Role::Supplier => false,
    }
}

pub fn can_view(
    ticket: &Ticket,
    actor: &Actor,
    building_ids: &BTreeSet<String>,
) -> bool {
    can_comment(ticket, actor, building_ids)
}

/// Whether `actor` may drive the quote and status workflow of `ticket`.
pub fn can_manage(
    ticket: &Ticket,
    actor: &Actor,
    building_ids: &BTreeSet<String>,
) -> bool {
    actor.role == Role::Manager
        && has_building_access(building_ids, &ticket.building_id)
}

/// Managers may cancel, and so may the requester while nobody acted yet.
pub fn can_cancel(
    ticket: &Ticket,
    actor: &Actor,
    building_ids: &BTreeSet<String>,
) -> bool {
    can_manage(ticket, actor, building_ids)
        || (actor.role == Role::Resident
            && ticket.requested_by == actor.id
            && ticket.status == Status::New)
}

pub fn can_create(
    building_id: &str,
    actor: &Actor,
    building_ids: &BTreeSet<String>,
) -> bool {
    matches!(actor.role, Role::Resident | Role::Manager)
        && has_building_access(building_ids, building_id)
}
