use std::collections::HashMap;

use crate::bridge::{BridgeError, BridgeResult};
use crate::value::HostValue;

/// Side table for values that cross as opaque raw handles. Every
/// registration gets a fresh id; nothing is deduplicated here.
pub struct RawValueRegistry {
    next_id: u32,
    values: HashMap<u32, HostValue>,
}

impl RawValueRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            values: HashMap::new(),
        }
    }

    pub fn register(&mut self, value: HostValue) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.values.insert(id, value);
        id
    }

    pub fn unregister(&mut self, id: u32) -> BridgeResult<()> {
        match self.values.remove(&id) {
            Some(_) => Ok(()),
            None => Err(BridgeError::UnknownRawValue(id)),
        }
    }

    pub fn get(&self, id: u32) -> BridgeResult<HostValue> {
        self.values
            .get(&id)
            .cloned()
            .ok_or(BridgeError::UnknownRawValue(id))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reset(&mut self) {
        self.next_id = 1;
        self.values.clear();
    }
}

impl Default for RawValueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
