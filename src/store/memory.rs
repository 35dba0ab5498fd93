use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use itertools::Itertools as _;
use tokio::sync::Mutex;

use crate::{
    config,
    db::{
        supplier,
        ticket,
        user::{self, Actor, PasswordHash},
        Supplier, Ticket, User,
    },
    error::NotFound,
    Error,
};

use super::{
    ActorDirectory, BuildingMembership, Callback, Filter, Subscribers,
    Subscription, SupplierDirectory, TicketStore, UpdateFn,
};

/// In-process store.
///
/// A single lock over all tickets makes every update serializable.
#[derive(Default)]
pub struct Store {
    tickets: Mutex<HashMap<ticket::Id, Ticket>>,
    users: HashMap<user::Id, User>,
    suppliers: Vec<Supplier>,
    memberships: HashMap<user::Id, BTreeSet<String>>,
    subscribers: Subscribers,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: &config::Seed) -> Self {
        let mut store = Self::new();
        for actor in &seed.actors {
            store = store.with_user(User {
                id: actor.id.clone(),
                name: actor.name.clone(),
                role: actor.role,
                login: actor.login.clone(),
                password_hash: PasswordHash::new(&actor.password),
            });
        }
        for supplier in &seed.suppliers {
            store = store.with_supplier(supplier.clone());
        }
        for membership in &seed.memberships {
            store = store.with_membership(
                membership.user.clone(),
                membership.buildings.iter().cloned(),
            );
        }
        store
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn with_supplier(mut self, supplier: Supplier) -> Self {
        self.suppliers.retain(|s| s.id != supplier.id);
        self.suppliers.push(supplier);
        self
    }

    pub fn with_membership(
        mut self,
        user: user::Id,
        buildings: impl IntoIterator<Item = String>,
    ) -> Self {
        self.memberships.entry(user).or_default().extend(buildings);
        self
    }
}

#[async_trait]
impl TicketStore for Store {
    async fn get(&self, id: &ticket::Id) -> Result<Option<Ticket>, Error> {
        Ok(self.tickets.lock().await.get(id).cloned())
    }

    async fn insert(&self, ticket: &Ticket) -> Result<(), Error> {
        {
            let mut tickets = self.tickets.lock().await;
            if tickets.contains_key(&ticket.id) {
                return Err(Error::conflict(format!(
                    "ticket {} already exists",
                    ticket.id,
                )));
            }
            tickets.insert(ticket.id.clone(), ticket.clone());
        }
        self.subscribers.publish(ticket);
        Ok(())
    }

    async fn update(
        &self,
        id: &ticket::Id,
        f: &mut UpdateFn<'_>,
    ) -> Result<Ticket, Error> {
        let ticket = {
            let mut tickets = self.tickets.lock().await;
            let stored = tickets
                .get_mut(id)
                .ok_or_else(|| NotFound::Ticket(id.clone()))?;
            let mut ticket = stored.clone();
            f(&mut ticket)?;
            *stored = ticket.clone();
            ticket
        };
        self.subscribers.publish(&ticket);
        Ok(ticket)
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Ticket>, Error> {
        Ok(self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| filter.matches(t))
            .sorted_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
            })
            .cloned()
            .collect())
    }

    fn subscribe(&self, filter: Filter, callback: Callback) -> Subscription {
        self.subscribers.add(filter, callback)
    }
}

#[async_trait]
impl ActorDirectory for Store {
    async fn get_user(&self, id: &user::Id) -> Result<Option<User>, Error> {
        Ok(self.users.get(id).cloned())
    }

    async fn get_user_by_login(
        &self,
        login: &str,
    ) -> Result<Option<User>, Error> {
        Ok(self.users.values().find(|u| u.login == login).cloned())
    }
}

#[async_trait]
impl SupplierDirectory for Store {
    async fn get_supplier(
        &self,
        id: &supplier::Id,
    ) -> Result<Option<Supplier>, Error> {
        Ok(self.suppliers.iter().find(|s| &s.id == id).cloned())
    }

    async fn list_suppliers(
        &self,
        filter: &supplier::Filter,
    ) -> Result<Vec<Supplier>, Error> {
        Ok(self
            .suppliers
            .iter()
            .filter(|s| filter.matches(s))
            .sorted_by(|a, b| {
                b.rating
                    .partial_cmp(&a.rating)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BuildingMembership for Store {
    async fn get_accessible_building_ids(
        &self,
        actor: &Actor,
    ) -> Result<BTreeSet<String>, Error> {
        Ok(self.memberships.get(&actor.id).cloned().unwrap_or_default())
    }
}
