use std::{net, time};

use serde::Deserialize;

use crate::db::{user, Supplier};

#[derive(Deserialize)]
pub struct Config {
    pub store: Store,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub workflow: Workflow,
    #[serde(default)]
    pub seed: Seed,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Store {
    Postgres { url: String },
    Memory,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
    #[serde(with = "humantime_serde")]
    pub expiration_time: time::Duration,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct Workflow {
    /// Length of the calendar entry created when work is scheduled.
    #[serde(with = "humantime_serde")]
    pub calendar_slot: time::Duration,

    /// How many times an update is re-run after losing a race on the
    /// ticket version.
    pub conflict_retries: u32,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            calendar_slot: time::Duration::from_secs(2 * 60 * 60),
            conflict_retries: 3,
        }
    }
}

/// Initial content of the in-memory store.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub actors: Vec<SeedActor>,
    pub suppliers: Vec<Supplier>,
    pub memberships: Vec<Membership>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SeedActor {
    pub id: user::Id,
    pub name: String,
    pub role: user::Role,
    pub login: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Membership {
    pub user: user::Id,
    pub buildings: Vec<String>,
}
