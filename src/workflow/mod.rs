//! Maintenance ticket workflow.
//!
//! Every mutating operation validates its preconditions, changes the ticket
//! in a single atomic store update and journals what happened. Calendar and
//! notification side effects run after the update is committed and can only
//! add warnings to the result.

pub mod activity;
pub mod ledger;
pub mod permission;
pub mod status;

use std::{collections::BTreeSet, sync::Arc};

use futures::future;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    collab::{self, Notifier, Scheduler},
    db::{
        activity::{Entry, Metadata},
        ticket::{self, Status, Urgency},
        user::{self, Actor, Role},
        Comment, Ticket,
    },
    error::NotFound,
    store::{Backend, Filter},
    Error,
};

pub use self::{
    ledger::{QuoteInput, Summary},
    status::Trigger,
};

/// Successful result together with the best-effort side effects that failed.
#[derive(Clone, Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<collab::Error>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub urgency: Urgency,
    pub building_id: String,
}

pub struct Workflow {
    backend: Arc<dyn Backend>,
    scheduler: Arc<dyn Scheduler>,
    notifier: Arc<dyn Notifier>,
    calendar_slot: time::Duration,
}

impl Workflow {
    pub fn new(
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            scheduler,
            notifier,
            calendar_slot: time::Duration::hours(2),
        }
    }

    pub fn with_calendar_slot(mut self, slot: std::time::Duration) -> Self {
        self.calendar_slot = time::Duration::try_from(slot)
            .unwrap_or(self.calendar_slot);
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub async fn create_ticket(
        &self,
        new: NewTicket,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        if new.title.trim().is_empty() {
            return Err(Error::validation("ticket title is empty"));
        }
        if new.building_id.trim().is_empty() {
            return Err(Error::validation("ticket building is empty"));
        }
        let building_ids = self.building_ids(actor).await?;
        if !permission::can_create(&new.building_id, actor, &building_ids) {
            return Err(Error::forbidden(format!(
                "{} may not raise tickets in building {}",
                actor.id, new.building_id,
            )));
        }

        let now = OffsetDateTime::now_utc();
        let mut ticket = Ticket {
            id: ticket::Id::new(),
            title: new.title,
            description: new.description,
            location: new.location,
            urgency: new.urgency,
            building_id: new.building_id,
            requested_by: actor.id.clone(),
            assigned_to: None,
            status: Status::New,
            scheduled_date: None,
            completed_date: None,
            created_at: now,
            quote_requests: Vec::new(),
            activity_log: Default::default(),
            comments: Vec::new(),
        };
        let description = format!("Ticket \"{}\" raised", ticket.title);
        let metadata =
            Metadata::from([("urgency".to_owned(), json!(ticket.urgency))]);
        activity::record(
            &mut ticket,
            "created",
            description,
            &actor.id,
            now,
            metadata,
        );
        self.backend.insert(&ticket).await?;
        info!(ticket = %ticket.id, actor = %actor.id, "ticket created");
        Ok(ticket)
    }

    pub async fn get_ticket(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        let ticket = self.load(id).await?;
        let building_ids = self.building_ids(actor).await?;
        if !permission::can_view(&ticket, actor, &building_ids) {
            return Err(Error::forbidden(format!(
                "{} may not view ticket {id}",
                actor.id,
            )));
        }
        Ok(ticket)
    }

    /// Tickets matching `filter` that `actor` is allowed to see.
    pub async fn list_tickets(
        &self,
        mut filter: Filter,
        actor: &Actor,
    ) -> Result<Vec<Ticket>, Error> {
        match actor.role {
            Role::Resident => filter.requested_by = Some(actor.id.clone()),
            Role::Manager => {
                let building_ids = self.building_ids(actor).await?;
                if !building_ids.contains(permission::WILDCARD) {
                    filter.building_ids = Some(match filter.building_ids {
                        Some(wanted) => {
                            wanted.intersection(&building_ids).cloned().collect()
                        }
                        None => building_ids,
                    });
                }
            }
            Role::Supplier => return Ok(Vec::new()),
        }
        self.backend.query(&filter).await
    }

    /// Hands the ticket over to `assignee`, or takes it away with `None`.
    pub async fn assign(
        &self,
        id: &ticket::Id,
        assignee: Option<user::Id>,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        self.authorize(id, actor, "assign", permission::can_manage)
            .await?;
        if let Some(assignee) = &assignee {
            if self.backend.get_user(assignee).await?.is_none() {
                return Err(NotFound::User(assignee.clone()).into());
            }
        }

        let ticket = self
            .update(id, |t| {
                if t.status.is_terminal() {
                    return Err(Error::conflict(format!(
                        "ticket {} is {}",
                        t.id, t.status,
                    )));
                }
                let description = match &assignee {
                    Some(a) => format!("Assigned to {a}"),
                    None => "Unassigned".to_owned(),
                };
                let metadata = Metadata::from([
                    ("previousAssignee".to_owned(), json!(t.assigned_to)),
                    ("newAssignee".to_owned(), json!(assignee)),
                ]);
                t.assigned_to = assignee.clone();
                activity::record(
                    t,
                    "assigned",
                    description,
                    &actor.id,
                    OffsetDateTime::now_utc(),
                    metadata,
                );
                Ok(())
            })
            .await?;
        info!(ticket = %id, actor = %actor.id, "ticket assigned");
        Ok(ticket)
    }

    pub async fn add_comment(
        &self,
        id: &ticket::Id,
        content: &str,
        actor: &Actor,
    ) -> Result<Comment, Error> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("comment is empty"));
        }
        self.authorize(id, actor, "comment on", permission::can_comment)
            .await?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            ticket_id: id.clone(),
            author_id: actor.id.clone(),
            author_role: actor.role,
            content: content.to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.update(id, |t| {
            t.comments.push(comment.clone());
            Ok(())
        })
        .await?;
        info!(ticket = %id, actor = %actor.id, "comment added");
        Ok(comment)
    }

    /// Comments of the ticket, oldest first.
    pub async fn list_comments(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Vec<Comment>, Error> {
        let ticket = self.load(id).await?;
        let building_ids = self.building_ids(actor).await?;
        if !permission::can_comment(&ticket, actor, &building_ids) {
            return Err(Error::forbidden(format!(
                "{} may not read comments of ticket {id}",
                actor.id,
            )));
        }
        Ok(ticket
            .comments
            .into_iter()
            .sorted_by_key(|c| c.created_at)
            .collect())
    }

    /// Journal of the ticket in the order it was written.
    pub async fn activity(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Vec<Entry>, Error> {
        let ticket = self.get_ticket(id, actor).await?;
        Ok(ticket.activity_log.entries().into_iter().cloned().collect())
    }

    async fn load(&self, id: &ticket::Id) -> Result<Ticket, Error> {
        self.backend
            .get(id)
            .await?
            .ok_or_else(|| NotFound::Ticket(id.clone()).into())
    }

    async fn building_ids(
        &self,
        actor: &Actor,
    ) -> Result<BTreeSet<String>, Error> {
        self.backend.get_accessible_building_ids(actor).await
    }

    /// Checks `allowed` against the current ticket and returns the buildings
    /// of `actor`.
    ///
    /// Only immutable ticket fields may be trusted here: the ticket can
    /// change before the caller's update runs.
    async fn authorize(
        &self,
        id: &ticket::Id,
        actor: &Actor,
        what: &str,
        allowed: fn(&Ticket, &Actor, &BTreeSet<String>) -> bool,
    ) -> Result<BTreeSet<String>, Error> {
        let ticket = self.load(id).await?;
        let building_ids = self.building_ids(actor).await?;
        if !allowed(&ticket, actor, &building_ids) {
            return Err(Error::forbidden(format!(
                "{} may not {what} ticket {id}",
                actor.id,
            )));
        }
        Ok(building_ids)
    }

    async fn update<F>(&self, id: &ticket::Id, mut f: F) -> Result<Ticket, Error>
    where
        F: FnMut(&mut Ticket) -> Result<(), Error> + Send,
    {
        self.backend.update(id, &mut f).await
    }

    /// Tells the requester and the assignee that the ticket moved.
    async fn announce(
        &self,
        ticket: &Ticket,
        previous: Status,
        warnings: &mut Vec<collab::Error>,
    ) {
        if ticket.status == previous {
            return;
        }
        let message = format!(
            "Ticket \"{}\" moved from {previous} to {}",
            ticket.title, ticket.status,
        );
        let recipients = std::iter::once(&ticket.requested_by)
            .chain(ticket.assigned_to.as_ref())
            .unique()
            .collect::<Vec<_>>();

        let results = future::join_all(
            recipients.iter().map(|r| self.notifier.notify(r, &message)),
        )
        .await;
        for (recipient, result) in recipients.into_iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    ticket = %ticket.id,
                    recipient = %recipient,
                    error = %e,
                    "failed to notify",
                );
                warnings.push(e);
            }
        }
    }
}
