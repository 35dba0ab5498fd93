use std::error::Error as StdError;

use async_trait::async_trait;
use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::types::{
    accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, Json, ToSql,
    Type,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::NotFound,
    store::{Callback, Filter, Subscription, TicketStore, UpdateFn},
    Error,
};

use super::{
    activity::ActivityLog, quote::QuoteRequest, supplier, user, Client,
    Comment,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub location: String,
    pub urgency: Urgency,
    pub building_id: String,
    pub requested_by: user::Id,
    pub assigned_to: Option<user::Id>,
    pub status: Status,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub quote_requests: Vec<QuoteRequest>,
    #[serde(default)]
    pub activity_log: ActivityLog,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Ticket {
    pub fn quote_request(
        &self,
        supplier: &supplier::Id,
    ) -> Option<&QuoteRequest> {
        self.quote_requests.iter().find(|q| &q.supplier_id == supplier)
    }

    pub fn winner(&self) -> Option<&QuoteRequest> {
        self.quote_requests.iter().find(|q| q.is_winner)
    }
}

string_id! {
    /// Opaque ticket identifier.
    Id
}

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    TryFromRepr,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Raised by a resident, nobody has looked at it yet.
    New = 1,

    /// Quotes were requested from one or more suppliers.
    Quoting = 2,

    /// A quote was accepted, the winning supplier is contracted.
    Contracted = 3,

    /// Work has a date.
    Scheduled = 4,

    /// Supplier is on site.
    InProgress = 5,

    /// Work is done, waiting for the manager to close the ticket.
    Complete = 6,

    /// Terminal.
    Closed = 7,

    /// Terminal. Reachable from any state before `Complete`.
    Cancelled = 8,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[async_trait]
impl TicketStore for Client {
    async fn get(&self, id: &Id) -> Result<Option<Ticket>, Error> {
        Ok(self.get_versioned(id).await?.map(|(ticket, _)| ticket))
    }

    async fn insert(&self, ticket: &Ticket) -> Result<(), Error> {
        const SQL: &str = "\
            INSERT INTO tickets (id, building_id, requested_by, status, \
                                 created_at, version, document) \
            VALUES ($1, $2, $3, $4, $5, 0, $6)";

        self.inner
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.building_id,
                    &ticket.requested_by,
                    &ticket.status,
                    &ticket.created_at,
                    &Json(ticket),
                ],
            )
            .await?;
        self.subscribers.publish(ticket);
        Ok(())
    }

    async fn update(
        &self,
        id: &Id,
        f: &mut UpdateFn<'_>,
    ) -> Result<Ticket, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET status = $2, \
                document = $3, \
                version = version + 1 \
            WHERE id = $1 AND version = $4";

        for attempt in 0..=self.conflict_retries {
            let (mut ticket, version) = self
                .get_versioned(id)
                .await?
                .ok_or_else(|| NotFound::Ticket(id.clone()))?;
            f(&mut ticket)?;

            let updated = self
                .inner
                .execute(
                    SQL,
                    &[id, &ticket.status, &Json(&ticket), &version],
                )
                .await?;
            if updated == 1 {
                self.subscribers.publish(&ticket);
                return Ok(ticket);
            }
            debug!(ticket = %id, attempt, "ticket version moved, retrying");
        }

        Err(Error::conflict(format!(
            "ticket {id} is being modified concurrently",
        )))
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT document \
            FROM tickets \
            WHERE ($1::TEXT[] IS NULL OR building_id = ANY($1)) \
              AND ($2::INT2 IS NULL OR status = $2) \
              AND ($3::TEXT IS NULL OR requested_by = $3) \
            ORDER BY created_at DESC, \
                     id DESC";

        let building_ids = filter
            .building_ids
            .as_ref()
            .map(|ids| ids.iter().cloned().collect::<Vec<_>>());

        Ok(self
            .inner
            .query(SQL, &[&building_ids, &filter.status, &filter.requested_by])
            .await?
            .into_iter()
            .map(|row| row.get::<_, Json<Ticket>>("document").0)
            .collect())
    }

    fn subscribe(&self, filter: Filter, callback: Callback) -> Subscription {
        self.subscribers.add(filter, callback)
    }
}

impl Client {
    async fn get_versioned(
        &self,
        id: &Id,
    ) -> Result<Option<(Ticket, i64)>, Error> {
        const SQL: &str = "\
            SELECT document, version \
            FROM tickets \
            WHERE id = $1";
        Ok(self.inner.query_opt(SQL, &[id]).await?.map(|row| {
            let Json(ticket) = row.get::<_, Json<Ticket>>("document");
            (ticket, row.get("version"))
        }))
    }
}
