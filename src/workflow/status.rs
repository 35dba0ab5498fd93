//! Ticket lifecycle.
//!
//! ```text
//! New -> Quoting -> Contracted -> Scheduled -> InProgress -> Complete -> Closed
//!   \________\___________\____________\____________\-> Cancelled
//! ```

use derive_more::Display;
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    collab,
    db::{
        activity::Metadata,
        ticket::{self, Status},
        user::Actor,
        Ticket,
    },
    error::InvalidTransition,
    Error,
};

use super::{activity, permission, Outcome, Workflow};

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Trigger {
    #[display("request quotes for")]
    RequestQuotes,
    #[display("accept a quote on")]
    AcceptQuote,
    #[display("schedule work on")]
    ScheduleWork,
    #[display("start work on")]
    StartWork,
    #[display("mark complete")]
    MarkComplete,
    #[display("close")]
    Close,
    #[display("cancel")]
    Cancel,
}

impl Trigger {
    pub const ALL: [Self; 7] = [
        Self::RequestQuotes,
        Self::AcceptQuote,
        Self::ScheduleWork,
        Self::StartWork,
        Self::MarkComplete,
        Self::Close,
        Self::Cancel,
    ];

    fn action(self) -> &'static str {
        match self {
            Self::RequestQuotes => "status_quoting",
            Self::AcceptQuote => "status_contracted",
            Self::ScheduleWork => "work_scheduled",
            Self::StartWork => "work_started",
            Self::MarkComplete => "work_completed",
            Self::Close => "ticket_closed",
            Self::Cancel => "ticket_cancelled",
        }
    }
}

/// Status a ticket in `status` moves to on `trigger`, if the move is allowed.
pub fn next(status: Status, trigger: Trigger) -> Option<Status> {
    use Status as S;
    use Trigger as T;

    match (trigger, status) {
        (T::RequestQuotes, S::New) => Some(S::Quoting),
        (T::AcceptQuote, S::Quoting) => Some(S::Contracted),
        (T::ScheduleWork, S::Contracted) => Some(S::Scheduled),
        (T::StartWork, S::Scheduled) => Some(S::InProgress),
        (T::MarkComplete, S::InProgress) => Some(S::Complete),
        (T::Close, S::Complete) => Some(S::Closed),
        (
            T::Cancel,
            S::New | S::Quoting | S::Contracted | S::Scheduled | S::InProgress,
        ) => Some(S::Cancelled),
        _ => None,
    }
}

pub fn check(
    status: Status,
    trigger: Trigger,
) -> Result<Status, InvalidTransition> {
    next(status, trigger).ok_or(InvalidTransition { trigger, status })
}

/// Moves `ticket` along `trigger` and journals the move.
///
/// `metadata` is stored next to `previousStatus` and `newStatus`. Returns
/// the previous status. The ticket is left untouched on failure.
pub fn transition(
    ticket: &mut Ticket,
    trigger: Trigger,
    actor: &Actor,
    now: OffsetDateTime,
    mut metadata: Metadata,
) -> Result<Status, Error> {
    let previous = ticket.status;
    let status = check(previous, trigger)?;

    ticket.status = status;
    metadata.insert("previousStatus".into(), json!(previous));
    metadata.insert("newStatus".into(), json!(status));
    activity::record(
        ticket,
        trigger.action(),
        format!("Status changed from {previous} to {status}"),
        &actor.id,
        now,
        metadata,
    );
    Ok(previous)
}

impl Workflow {
    /// Puts a contracted ticket on the calendar.
    ///
    /// The calendar entry is best-effort: if the scheduler is down the
    /// ticket still becomes `Scheduled` and the failure is returned as a
    /// warning.
    pub async fn schedule_work(
        &self,
        id: &ticket::Id,
        date: OffsetDateTime,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        self.authorize(id, actor, "schedule work on", permission::can_manage)
            .await?;

        let now = OffsetDateTime::now_utc();
        if date < now {
            return Err(Error::validation(format!(
                "scheduled date {date} is in the past",
            )));
        }

        let metadata = Metadata::from([(
            "scheduledDate".to_owned(),
            json!(date.format(&Rfc3339).ok()),
        )]);
        let mut outcome = self
            .apply_transition(id, Trigger::ScheduleWork, actor, metadata, |t| {
                t.scheduled_date = Some(date);
                Ok(())
            })
            .await?;

        let window = collab::Window {
            start: date,
            end: date + self.calendar_slot,
        };
        match self.scheduler.create_calendar_entry(id, window).await {
            Ok(event) => {
                info!(ticket = %id, event = %event.id, "work put on calendar");
            }
            Err(e) => {
                warn!(
                    ticket = %id,
                    error = %e,
                    "failed to create calendar entry",
                );
                outcome.warnings.push(e);
            }
        }
        Ok(outcome)
    }

    pub async fn start_work(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        self.authorize(id, actor, "start work on", permission::can_manage)
            .await?;
        self.apply_transition(
            id,
            Trigger::StartWork,
            actor,
            Metadata::new(),
            |_| Ok(()),
        )
        .await
    }

    pub async fn mark_complete(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        self.authorize(id, actor, "complete", permission::can_manage)
            .await?;
        let now = OffsetDateTime::now_utc();
        self.apply_transition(
            id,
            Trigger::MarkComplete,
            actor,
            Metadata::new(),
            |t| {
                t.completed_date = Some(now);
                Ok(())
            },
        )
        .await
    }

    pub async fn close(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        self.authorize(id, actor, "close", permission::can_manage)
            .await?;
        self.apply_transition(
            id,
            Trigger::Close,
            actor,
            Metadata::new(),
            |_| Ok(()),
        )
        .await
    }

    pub async fn cancel(
        &self,
        id: &ticket::Id,
        reason: &str,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::validation("cancellation reason is empty"));
        }
        let building_ids = self
            .authorize(id, actor, "cancel", permission::can_cancel)
            .await?;

        // The requester's right to cancel depends on the current status, so
        // it is checked again against the stored ticket.
        let metadata = Metadata::from([("reason".to_owned(), json!(reason))]);
        self.apply_transition(id, Trigger::Cancel, actor, metadata, |t| {
            if permission::can_cancel(t, actor, &building_ids) {
                Ok(())
            } else {
                Err(Error::forbidden(format!(
                    "{} may no longer cancel ticket {id}",
                    actor.id,
                )))
            }
        })
        .await
    }

    /// Runs `apply`, then `trigger`, in one atomic update and notifies the
    /// people involved. Nothing is written if either fails.
    pub(super) async fn apply_transition<F>(
        &self,
        id: &ticket::Id,
        trigger: Trigger,
        actor: &Actor,
        metadata: Metadata,
        mut apply: F,
    ) -> Result<Outcome<Ticket>, Error>
    where
        F: FnMut(&mut Ticket) -> Result<(), Error> + Send,
    {
        let mut previous = None;
        let ticket = self
            .update(id, |t| {
                let now = OffsetDateTime::now_utc();
                apply(t)?;
                previous =
                    Some(transition(t, trigger, actor, now, metadata.clone())?);
                Ok(())
            })
            .await?;
        info!(
            ticket = %id,
            actor = %actor.id,
            status = %ticket.status,
            "ticket status changed",
        );

        let mut outcome = Outcome::new(ticket);
        if let Some(previous) = previous {
            self.announce(&outcome.value, previous, &mut outcome.warnings)
                .await;
        }
        Ok(outcome)
    }
}
