use std::collections::HashMap;

use crate::bridge::{BridgeError, BridgeResult};
use crate::value::HostValue;

enum EntryKey {
    Identity(usize),
    Equality,
}

struct Entry {
    value: HostValue,
    refcount: u32,
    key: EntryKey,
}

/// Refcounted table of host values the guest holds by id. Id 0 is
/// reserved for null and undefined and never has a row; live ids are
/// never reassigned until their refcount reaches zero.
pub struct ReferenceTable {
    next_id: u32,
    entries: HashMap<u32, Entry>,
    by_identity: HashMap<usize, u32>,
    by_equality: Vec<(HostValue, u32)>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            by_identity: HashMap::new(),
            by_equality: Vec::new(),
        }
    }

    pub fn acquire(&mut self, value: &HostValue) -> u32 {
        if matches!(value, HostValue::Undefined | HostValue::Null) {
            return 0;
        }

        if let Some(identity) = value.identity() {
            if let Some(&id) = self.by_identity.get(&identity) {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.refcount += 1;
                }
                return id;
            }
            let id = self.fresh_id();
            self.by_identity.insert(identity, id);
            self.entries.insert(
                id,
                Entry {
                    value: value.clone(),
                    refcount: 1,
                    key: EntryKey::Identity(identity),
                },
            );
            return id;
        }

        if let Some(id) = self
            .by_equality
            .iter()
            .find(|(existing, _)| existing == value)
            .map(|(_, id)| *id)
        {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.refcount += 1;
            }
            return id;
        }
        let id = self.fresh_id();
        self.by_equality.push((value.clone(), id));
        self.entries.insert(
            id,
            Entry {
                value: value.clone(),
                refcount: 1,
                key: EntryKey::Equality,
            },
        );
        id
    }

    pub fn lookup(&self, id: u32) -> BridgeResult<HostValue> {
        self.entries
            .get(&id)
            .map(|entry| entry.value.clone())
            .ok_or(BridgeError::UnknownReference(id))
    }

    pub fn increment(&mut self, id: u32) -> BridgeResult<()> {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.refcount += 1;
                Ok(())
            }
            None => Err(BridgeError::UnknownReference(id)),
        }
    }

    pub fn decrement(&mut self, id: u32) -> BridgeResult<()> {
        match self.entries.get_mut(&id) {
            None => Err(BridgeError::UnknownReference(id)),
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                Ok(())
            }
            Some(_) => {
                if let Some(entry) = self.entries.remove(&id) {
                    match entry.key {
                        EntryKey::Identity(identity) => {
                            self.by_identity.remove(&identity);
                        }
                        EntryKey::Equality => {
                            self.by_equality.retain(|(_, other)| *other != id);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub fn refcount(&self, id: u32) -> Option<u32> {
        self.entries.get(&id).map(|entry| entry.refcount)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.next_id = 1;
        self.entries.clear();
        self.by_identity.clear();
        self.by_equality.clear();
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new()
    }
}
