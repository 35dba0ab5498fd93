//! Best-effort collaborators: calendar and notifications.
//!
//! Their failures never fail a workflow operation. They are logged and
//! handed back to the caller as warnings.

use std::error::Error as StdError;

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::db::{ticket, user};

/// A best-effort collaborator could not be reached.
#[derive(Clone, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[display("{collaborator} unavailable: {reason}")]
pub struct Error {
    pub collaborator: String,
    pub reason: String,
}

impl Error {
    pub fn new(collaborator: &str, reason: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.to_owned(),
            reason: reason.into(),
        }
    }
}

impl StdError for Error {}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Window {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

/// Calendar entry created for scheduled work.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub ticket_id: ticket::Id,
    pub window: Window,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn create_calendar_entry(
        &self,
        ticket: &ticket::Id,
        window: Window,
    ) -> Result<Event, Error>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, actor: &user::Id, message: &str)
        -> Result<(), Error>;
}

/// Scheduler that only records entries in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogScheduler;

#[async_trait]
impl Scheduler for LogScheduler {
    async fn create_calendar_entry(
        &self,
        ticket: &ticket::Id,
        window: Window,
    ) -> Result<Event, Error> {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket.clone(),
            window,
        };
        info!(
            ticket = %ticket,
            event = %event.id,
            start = %window.start,
            end = %window.end,
            "calendar entry created",
        );
        Ok(event)
    }
}

/// Notifier that only writes notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        actor: &user::Id,
        message: &str,
    ) -> Result<(), Error> {
        info!(actor = %actor, message, "notification");
        Ok(())
    }
}
