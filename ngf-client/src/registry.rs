//! In-memory store of tracked events
//!
//! The registry owns every [`Event`] between `play` and its terminal status and
//! keeps four indices over them: local id, daemon-assigned remote id, event
//! name and outstanding `Play` call. It does no locking of its own; the engine
//! that owns it is already serialized.

use std::collections::{BTreeSet, HashMap};

use ngf_bus::{CallId, RemoteId};

use crate::error::{RegistryError, RegistryResult};
use crate::event::{Event, EventId, EventSnapshot};

#[derive(Debug, Default)]
pub struct EventRegistry {
    /// Primary store keyed by local id
    events: HashMap<EventId, Event>,

    /// Remote id to local id, for `Status` signals and control replies
    by_remote: HashMap<RemoteId, EventId>,

    /// Event name to every live local id with that name
    by_name: HashMap<String, BTreeSet<EventId>>,

    /// Outstanding `Play` call to local id
    by_call: HashMap<CallId, EventId>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new event
    ///
    /// Local ids are allocated monotonically, so a collision is a bug in the caller.
    pub fn insert(&mut self, event: Event) -> RegistryResult<()> {
        if self.events.contains_key(&event.id) {
            return Err(RegistryError::DuplicateLocalId(event.id));
        }

        if let Some(call) = event.outstanding_call {
            self.by_call.insert(call, event.id);
        }
        if let Some(remote_id) = event.remote_id {
            self.by_remote.insert(remote_id, event.id);
        }
        self.by_name
            .entry(event.name.clone())
            .or_default()
            .insert(event.id);
        self.events.insert(event.id, event);
        Ok(())
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(&id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    pub fn find_by_remote_id(&self, remote_id: RemoteId) -> Option<EventId> {
        self.by_remote.get(&remote_id).copied()
    }

    /// Every tracked event with this name, oldest first
    pub fn find_by_name(&self, name: &str) -> Vec<EventId> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Claim the event waiting on a `Play` reply
    ///
    /// The call is forgotten afterwards, so a second reply for it finds nothing.
    pub fn take_call(&mut self, call: CallId) -> Option<EventId> {
        let id = self.by_call.remove(&call)?;
        if let Some(event) = self.events.get_mut(&id) {
            event.outstanding_call = None;
        }
        Some(id)
    }

    /// Bind a daemon-assigned id to a tracked event
    ///
    /// If the remote id is still bound to another tracked event, that event can
    /// no longer receive status for itself and is evicted; it is returned so the
    /// caller can report it.
    pub fn resolve(&mut self, id: EventId, remote_id: RemoteId) -> RegistryResult<Option<Event>> {
        if !self.events.contains_key(&id) {
            return Err(RegistryError::NotFound(id));
        }

        let bound = self.by_remote.get(&remote_id).copied();
        let stale = match bound {
            Some(other) if other != id => self.remove(other).ok(),
            _ => None,
        };

        if let Some(event) = self.events.get_mut(&id) {
            if let Some(previous) = event.remote_id.replace(remote_id) {
                self.by_remote.remove(&previous);
            }
        }
        self.by_remote.insert(remote_id, id);

        Ok(stale)
    }

    /// Stop tracking an event and drop it from every index
    pub fn remove(&mut self, id: EventId) -> RegistryResult<Event> {
        let event = self.events.remove(&id).ok_or(RegistryError::NotFound(id))?;

        if let Some(remote_id) = event.remote_id {
            self.by_remote.remove(&remote_id);
        }
        if let Some(call) = event.outstanding_call {
            self.by_call.remove(&call);
        }
        if let Some(ids) = self.by_name.get_mut(&event.name) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_name.remove(&event.name);
            }
        }

        Ok(event)
    }

    /// Forget every tracked event, returning how many there were
    pub fn remove_all(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        self.by_remote.clear();
        self.by_name.clear();
        self.by_call.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Snapshots of every tracked event, ordered by local id
    pub fn snapshot(&self) -> Vec<EventSnapshot> {
        let mut snapshots: Vec<_> = self.events.values().map(Event::snapshot).collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }
}
