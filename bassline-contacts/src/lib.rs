#![deny(missing_docs)]
//! Contact arena for bassline boards.
//!
//! A [`ContactStore`] owns every contact value on a board and the
//! directed connections between contacts. Values are typed by a
//! [`Lattice`] and only ever move upward: [`ContactStore::update_value`]
//! joins the incoming value with the current one and reports whether
//! anything changed. Listeners registered with [`ContactStore::on_change`]
//! fire for real changes only.
//!
//! The store is synchronous and unshared. Concurrency is the owner's
//! business; in practice the propagation engine owns it.

use bassline_core::error::ContactError;
use bassline_core::id::{ContactId, ConnectionId, WireId};
use bassline_core::lattice::Lattice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A lattice-typed cell.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Contact id.
    pub id: ContactId,
    /// Lattice that orders this contact's values.
    pub lattice: Arc<dyn Lattice>,
    /// Current value.
    pub value: Value,
    /// Bumped on every real change.
    pub version: u64,
    /// Time of the last real change (or registration).
    pub updated_at: DateTime<Utc>,
}

/// A directed link from one contact to another, owned by a wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection id.
    pub id: ConnectionId,
    /// Wire the connection realizes.
    pub wire: WireId,
    /// Upstream contact.
    pub from: ContactId,
    /// Downstream contact.
    pub to: ContactId,
    /// Inactive connections are kept but carry nothing.
    pub active: bool,
}

/// Delivered to listeners when a contact's value changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactChange {
    /// The contact that changed.
    pub contact: ContactId,
    /// Value before the join.
    pub old: Value,
    /// Value after the join.
    pub new: Value,
    /// Version after the change.
    pub version: u64,
}

/// Handle returned by [`ContactStore::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(u64);

type Listener = Arc<dyn Fn(&ContactChange) + Send + Sync>;

/// Contacts, connections and change listeners for one board.
#[derive(Default)]
pub struct ContactStore {
    contacts: BTreeMap<ContactId, Contact>,
    connections: BTreeMap<ConnectionId, Connection>,
    // Outgoing connection ids per contact, in insertion order.
    outgoing: BTreeMap<ContactId, Vec<ConnectionId>>,
    listeners: BTreeMap<Subscription, Listener>,
    next_connection: u64,
    next_subscription: u64,
}

impl ContactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contact. `initial`, if given, is joined over the
    /// lattice's bottom.
    pub fn register_contact(
        &mut self,
        id: ContactId,
        lattice: Arc<dyn Lattice>,
        initial: Option<Value>,
    ) -> Result<(), ContactError> {
        if self.contacts.contains_key(&id) {
            return Err(ContactError::Duplicate(id.to_string()));
        }
        let bottom = lattice.bottom();
        let value = match initial {
            Some(v) => lattice.join(&bottom, &v).map_err(|source| ContactError::Lattice {
                contact: id.to_string(),
                source,
            })?,
            None => bottom,
        };
        tracing::debug!(contact = %id, lattice = lattice.name(), "bassline.contacts.registered");
        self.contacts.insert(
            id.clone(),
            Contact {
                id,
                lattice,
                value,
                version: 0,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Join `incoming` into the contact. Returns whether the value changed.
    ///
    /// Listeners are notified only on change. A no-op join leaves the
    /// version and timestamp alone.
    pub fn update_value(&mut self, id: &ContactId, incoming: &Value) -> Result<bool, ContactError> {
        let contact = self
            .contacts
            .get_mut(id)
            .ok_or_else(|| ContactError::NotFound(id.to_string()))?;
        let joined = contact
            .lattice
            .join(&contact.value, incoming)
            .map_err(|source| ContactError::Lattice {
                contact: id.to_string(),
                source,
            })?;
        if contact.lattice.equivalent(&joined, &contact.value) {
            return Ok(false);
        }

        let old = std::mem::replace(&mut contact.value, joined);
        contact.version += 1;
        contact.updated_at = Utc::now();
        let change = ContactChange {
            contact: id.clone(),
            old,
            new: contact.value.clone(),
            version: contact.version,
        };
        for listener in self.listeners.values() {
            listener(&change);
        }
        Ok(true)
    }

    /// Current value of a contact.
    pub fn get_value(&self, id: &ContactId) -> Result<&Value, ContactError> {
        self.contact(id).map(|c| &c.value)
    }

    /// The full contact record.
    pub fn contact(&self, id: &ContactId) -> Result<&Contact, ContactError> {
        self.contacts
            .get(id)
            .ok_or_else(|| ContactError::NotFound(id.to_string()))
    }

    /// Whether a contact is registered.
    pub fn contains(&self, id: &ContactId) -> bool {
        self.contacts.contains_key(id)
    }

    /// All contacts, ordered by id.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    /// Number of registered contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the store holds no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Remove a contact and every connection touching it.
    pub fn remove_contact(&mut self, id: &ContactId) -> Result<Contact, ContactError> {
        let contact = self
            .contacts
            .remove(id)
            .ok_or_else(|| ContactError::NotFound(id.to_string()))?;
        let touching: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| &c.from == id || &c.to == id)
            .map(|c| c.id.clone())
            .collect();
        for conn in touching {
            self.drop_connection(&conn);
        }
        self.outgoing.remove(id);
        tracing::debug!(contact = %id, "bassline.contacts.removed");
        Ok(contact)
    }

    /// Connect `from` to `to` on behalf of `wire`. Both contacts must exist.
    pub fn add_connection(
        &mut self,
        wire: WireId,
        from: ContactId,
        to: ContactId,
    ) -> Result<ConnectionId, ContactError> {
        for end in [&from, &to] {
            if !self.contacts.contains_key(end) {
                return Err(ContactError::NotFound(end.to_string()));
            }
        }
        self.next_connection += 1;
        let id = ConnectionId::new(format!("c{}", self.next_connection));
        self.outgoing.entry(from.clone()).or_default().push(id.clone());
        self.connections.insert(
            id.clone(),
            Connection {
                id: id.clone(),
                wire,
                from,
                to,
                active: true,
            },
        );
        Ok(id)
    }

    /// Remove one connection.
    pub fn disconnect(&mut self, id: &ConnectionId) -> Result<Connection, ContactError> {
        self.drop_connection(id)
            .ok_or_else(|| ContactError::ConnectionNotFound(id.to_string()))
    }

    /// Pause or resume a connection without removing it.
    pub fn set_active(&mut self, id: &ConnectionId, active: bool) -> Result<(), ContactError> {
        let conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| ContactError::ConnectionNotFound(id.to_string()))?;
        conn.active = active;
        Ok(())
    }

    /// Remove every connection belonging to `wire`. Returns how many went.
    pub fn remove_connection(&mut self, wire: &WireId) -> usize {
        let owned: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| &c.wire == wire)
            .map(|c| c.id.clone())
            .collect();
        for id in &owned {
            self.drop_connection(id);
        }
        owned.len()
    }

    /// A connection by id.
    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Targets of the contact's active outgoing connections, in the order
    /// they were connected, without duplicates.
    pub fn get_downstream_contacts(&self, id: &ContactId) -> Vec<ContactId> {
        let mut out: Vec<ContactId> = Vec::new();
        for conn in self.outgoing.get(id).into_iter().flatten() {
            if let Some(c) = self.connections.get(conn)
                && c.active
                && !out.contains(&c.to)
            {
                out.push(c.to.clone());
            }
        }
        out
    }

    /// Register a change listener.
    pub fn on_change<F>(&mut self, listener: F) -> Subscription
    where
        F: Fn(&ContactChange) + Send + Sync + 'static,
    {
        self.next_subscription += 1;
        let sub = Subscription(self.next_subscription);
        self.listeners.insert(sub, Arc::new(listener));
        sub
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.listeners.remove(&subscription).is_some()
    }

    fn drop_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(id)?;
        if let Some(out) = self.outgoing.get_mut(&conn.from) {
            out.retain(|c| c != id);
        }
        Some(conn)
    }
}

impl fmt::Debug for ContactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactStore")
            .field("contacts", &self.contacts.len())
            .field("connections", &self.connections.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
