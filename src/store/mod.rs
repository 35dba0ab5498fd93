//! Collaborators the workflow reads from and writes to.
//!
//! [`memory::Store`] implements all of them in process, [`crate::db::Client`]
//! implements them on top of PostgreSQL.

pub mod memory;

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use async_trait::async_trait;

use crate::{
    db::{
        supplier,
        ticket::{self, Status},
        user::{self, Actor},
        Supplier, Ticket, User,
    },
    Error,
};

/// Mutation applied by [`TicketStore::update`].
///
/// May run more than once when the store retries after a lost race, always
/// on a fresh copy of the stored ticket.
pub type UpdateFn<'a> = dyn FnMut(&mut Ticket) -> Result<(), Error> + Send + 'a;

pub type Callback = Box<dyn Fn(&Ticket) + Send + Sync>;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get(&self, id: &ticket::Id) -> Result<Option<Ticket>, Error>;

    async fn insert(&self, ticket: &Ticket) -> Result<(), Error>;

    /// Atomically reads the ticket, applies `f` and writes the result back.
    ///
    /// Nothing is written when `f` fails. Two concurrent updates of the same
    /// ticket never both apply to the same stored state.
    async fn update(
        &self,
        id: &ticket::Id,
        f: &mut UpdateFn<'_>,
    ) -> Result<Ticket, Error>;

    async fn query(&self, filter: &Filter) -> Result<Vec<Ticket>, Error>;

    /// Calls `callback` with every written ticket matching `filter` until the
    /// returned [`Subscription`] is dropped.
    fn subscribe(&self, filter: Filter, callback: Callback) -> Subscription;
}

#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn get_user(&self, id: &user::Id) -> Result<Option<User>, Error>;

    async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error>;
}

#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    async fn get_supplier(
        &self,
        id: &supplier::Id,
    ) -> Result<Option<Supplier>, Error>;

    async fn list_suppliers(
        &self,
        filter: &supplier::Filter,
    ) -> Result<Vec<Supplier>, Error>;
}

/// Maps an actor to the buildings they may act within.
///
/// A set containing [`crate::workflow::permission::WILDCARD`] grants access
/// to every building.
#[async_trait]
pub trait BuildingMembership: Send + Sync {
    async fn get_accessible_building_ids(
        &self,
        actor: &Actor,
    ) -> Result<BTreeSet<String>, Error>;
}

/// Everything the workflow needs from its environment.
pub trait Backend:
    TicketStore + ActorDirectory + SupplierDirectory + BuildingMembership
{
}

impl<T> Backend for T where
    T: TicketStore + ActorDirectory + SupplierDirectory + BuildingMembership
{
}

/// Ticket selection. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub building_ids: Option<BTreeSet<String>>,
    pub status: Option<Status>,
    pub requested_by: Option<user::Id>,
}

impl Filter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.building_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&ticket.building_id))
            && self.status.map_or(true, |s| s == ticket.status)
            && self
                .requested_by
                .as_ref()
                .map_or(true, |id| id == &ticket.requested_by)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, (Filter, Arc<Callback>)>,
}

/// Subscriptions of one store.
#[derive(Clone, Default)]
pub struct Subscribers(Arc<Mutex<Registry>>);

impl Subscribers {
    pub fn add(&self, filter: Filter, callback: Callback) -> Subscription {
        let mut registry =
            self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(id, (filter, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.0),
        }
    }

    pub fn publish(&self, ticket: &Ticket) {
        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .filter(|(filter, _)| filter.matches(ticket))
            .map(|(_, callback)| Arc::clone(callback))
            .collect::<Vec<_>>();
        for callback in callbacks {
            (*callback)(ticket);
        }
    }
}

/// Live subscription. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}
