/// Declares an opaque string identifier that is stored as `TEXT`.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Debug,
            ::serde::Deserialize,
            ::derive_more::Display,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            ::serde::Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl ::tokio_postgres::types::FromSql<'_> for $name {
            ::tokio_postgres::types::accepts!(TEXT, VARCHAR);

            fn from_sql(
                ty: &::tokio_postgres::types::Type,
                raw: &[u8],
            ) -> Result<
                Self,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                <String as ::tokio_postgres::types::FromSql>::from_sql(
                    ty, raw,
                )
                .map(Self)
            }
        }

        impl ::tokio_postgres::types::ToSql for $name {
            ::tokio_postgres::types::accepts!(TEXT, VARCHAR);

            ::tokio_postgres::types::to_sql_checked!();

            fn to_sql(
                &self,
                ty: &::tokio_postgres::types::Type,
                out: &mut ::tokio_postgres::types::private::BytesMut,
            ) -> Result<
                ::tokio_postgres::types::IsNull,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                ::tokio_postgres::types::ToSql::to_sql(&self.0, ty, out)
            }
        }
    };
}

pub mod activity;
pub mod comment;
pub mod quote;
pub mod supplier;
pub mod ticket;
pub mod user;

use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

use crate::store::Subscribers;

pub use tokio_postgres::Error;

pub use self::{
    comment::Comment, quote::QuoteRequest, supplier::Supplier,
    ticket::Ticket, user::User,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

pub async fn connect(
    url: &str,
    conflict_retries: u32,
) -> Result<(Client, Connection), Error> {
    tokio_postgres::connect(url, NoTls).await.map(|(client, connection)| {
        (
            Client {
                inner: client,
                conflict_retries,
                subscribers: Subscribers::default(),
            },
            connection,
        )
    })
}

/// PostgreSQL backed store.
///
/// Tickets are kept as JSONB documents guarded by a `version` column, so
/// every read-modify-write is an optimistic compare-and-swap.
pub struct Client {
    inner: tokio_postgres::Client,
    conflict_retries: u32,
    subscribers: Subscribers,
}

impl Client {
    /// Creates the tables the store needs, if missing.
    pub async fn migrate(&self) -> Result<(), Error> {
        const SQL: &str = "\
            CREATE TABLE IF NOT EXISTS users ( \
                id TEXT PRIMARY KEY, \
                name TEXT NOT NULL, \
                login TEXT NOT NULL UNIQUE, \
                password_hash TEXT NOT NULL, \
                role INT2 NOT NULL \
            ); \
            CREATE TABLE IF NOT EXISTS building_members ( \
                user_id TEXT NOT NULL REFERENCES users (id), \
                building_id TEXT NOT NULL, \
                PRIMARY KEY (user_id, building_id) \
            ); \
            CREATE TABLE IF NOT EXISTS suppliers ( \
                id TEXT PRIMARY KEY, \
                name TEXT NOT NULL, \
                specialties TEXT[] NOT NULL, \
                rating DOUBLE PRECISION \
            ); \
            CREATE TABLE IF NOT EXISTS tickets ( \
                id TEXT PRIMARY KEY, \
                building_id TEXT NOT NULL, \
                requested_by TEXT NOT NULL, \
                status INT2 NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL, \
                version BIGINT NOT NULL, \
                document JSONB NOT NULL \
            ); \
            CREATE INDEX IF NOT EXISTS tickets_building_id_idx \
                ON tickets (building_id);";
        self.inner.batch_execute(SQL).await
    }
}
