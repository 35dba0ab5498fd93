use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    api,
    db::{quote, QuoteRequest},
    workflow::Summary,
};

pub use crate::db::ticket::{Id, Status, Urgency};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub location: String,
    pub urgency: Urgency,
    pub building_id: String,
    pub status: Status,
    pub status_label: String,
    pub requested_by: api::User,
    pub assigned_to: Option<api::User>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub quote_requests: Vec<QuoteRequest>,
    pub summary: Summary,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
    pub total_count: usize,
}

/// Ticket after a mutation, with the side effects that could not be done.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edited {
    pub ticket: Ticket,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Label the UI shows for a ticket.
///
/// Display only. The workflow never looks at labels.
pub fn status_label(status: Status, quotes: &[QuoteRequest]) -> &'static str {
    match status {
        Status::New => "New",
        Status::Quoting
            if quotes.iter().any(|q| q.status == quote::Status::Received) =>
        {
            "Quote Received"
        }
        Status::Quoting => "Quote Requested",
        Status::Contracted => "PO Sent",
        Status::Scheduled => "Scheduled",
        Status::InProgress => "In Progress",
        Status::Complete => "Complete",
        Status::Closed => "Closed",
        Status::Cancelled => "Cancelled",
    }
}
