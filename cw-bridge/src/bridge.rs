use std::fmt;

use crate::closure::{ClosureHandle, ClosureVariant};
use crate::guest::GuestRuntime;
use crate::raw::RawValueRegistry;
use crate::refs::ReferenceTable;
use crate::slot;
use crate::value::HostValue;
use crate::views::{GuestMemory, ViewManager};

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeError {
    UnknownKind(u8),
    UnknownElementKind(u32),
    UnknownReference(u32),
    UnknownRawValue(u32),
    OutOfBounds { address: u32, length: u32 },
    InvalidText(u32),
    LengthTooLarge(&'static str, usize),
    AllocationFailed(u32),
    ClosureDropped,
    ClosureConsumed,
    ClosureBusy,
    Guest(String),
}

impl BridgeError {
    /// True for malformed wire data. These are not recoverable; the
    /// current boundary crossing has to be abandoned.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownKind(_)
                | BridgeError::UnknownElementKind(_)
                | BridgeError::UnknownReference(_)
                | BridgeError::UnknownRawValue(_)
                | BridgeError::OutOfBounds { .. }
                | BridgeError::InvalidText(_)
                | BridgeError::LengthTooLarge(..)
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::UnknownKind(byte) => write!(f, "unknown slot kind {byte}"),
            BridgeError::UnknownElementKind(raw) => {
                write!(f, "unknown view element kind {raw}")
            }
            BridgeError::UnknownReference(id) => write!(f, "reference id {id} is not live"),
            BridgeError::UnknownRawValue(id) => write!(f, "raw value id {id} is not registered"),
            BridgeError::OutOfBounds { address, length } => {
                write!(f, "guest memory access out of range at {address} ({length} bytes)")
            }
            BridgeError::InvalidText(pointer) => {
                write!(f, "text at {pointer} is not valid utf-8")
            }
            BridgeError::LengthTooLarge(what, count) => {
                write!(f, "{what} of {count} elements does not fit the wire format")
            }
            BridgeError::AllocationFailed(size) => {
                write!(f, "guest allocator returned null for {size} bytes")
            }
            BridgeError::ClosureDropped => write!(f, "closure called after it was dropped"),
            BridgeError::ClosureConsumed => write!(f, "single-use closure called again"),
            BridgeError::ClosureBusy => {
                write!(f, "exclusive closure reentered while a call is ongoing")
            }
            BridgeError::Guest(message) => write!(f, "guest fault: {message}"),
        }
    }
}

impl std::error::Error for BridgeError {}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Host-side marshalling context: the reference table, the raw value
/// registry, the memory view cache and the one-shot call result cell.
/// One bridge serves one guest instance.
pub struct Bridge {
    pub(crate) refs: ReferenceTable,
    pub(crate) raw: RawValueRegistry,
    pub(crate) views: ViewManager,
    call_result: Option<HostValue>,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            refs: ReferenceTable::new(),
            raw: RawValueRegistry::new(),
            views: ViewManager::new(),
            call_result: None,
        }
    }

    /// Drops all state and restarts id assignment, as if the guest
    /// instance had just been created.
    pub fn reset(&mut self) {
        self.refs.reset();
        self.raw.reset();
        self.views.reset();
        self.call_result = None;
    }

    pub fn decode(&mut self, guest: &dyn GuestRuntime, address: u32) -> BridgeResult<HostValue> {
        slot::decode(self, guest, address)
    }

    pub fn encode(
        &mut self,
        guest: &mut dyn GuestRuntime,
        address: u32,
        value: &HostValue,
    ) -> BridgeResult<()> {
        slot::encode(self, guest, address, value)
    }

    pub fn encode_new_slot(
        &mut self,
        guest: &mut dyn GuestRuntime,
        value: &HostValue,
    ) -> BridgeResult<u32> {
        slot::encode_new_slot(self, guest, value)
    }

    pub fn acquire_handle(&mut self, value: &HostValue) -> u32 {
        self.refs.acquire(value)
    }

    pub fn lookup_handle(&self, id: u32) -> BridgeResult<HostValue> {
        self.refs.lookup(id)
    }

    pub fn increment_handle(&mut self, id: u32) -> BridgeResult<()> {
        self.refs.increment(id)
    }

    pub fn release_handle(&mut self, id: u32) -> BridgeResult<()> {
        self.refs.decrement(id)
    }

    pub fn handle_refcount(&self, id: u32) -> Option<u32> {
        self.refs.refcount(id)
    }

    pub fn register_raw(&mut self, value: HostValue) -> u32 {
        self.raw.register(value)
    }

    pub fn unregister_raw(&mut self, id: u32) -> BridgeResult<()> {
        self.raw.unregister(id)
    }

    pub fn raw_value(&self, id: u32) -> BridgeResult<HostValue> {
        self.raw.get(id)
    }

    pub fn make_closure(
        &self,
        variant: ClosureVariant,
        adapter: u32,
        function: u32,
        deallocator: u32,
    ) -> ClosureHandle {
        ClosureHandle::new(variant, adapter, function, deallocator)
    }

    pub fn set_call_result(&mut self, value: HostValue) {
        self.call_result = Some(value);
    }

    pub fn take_call_result(&mut self) -> Option<HostValue> {
        self.call_result.take()
    }

    pub fn notify_grown(&mut self, memory: &GuestMemory) {
        self.views.sync(memory);
    }

    pub fn live_references(&self) -> usize {
        self.refs.len()
    }

    pub fn live_raw_values(&self) -> usize {
        self.raw.len()
    }

    pub fn view_rebuilds(&self) -> u64 {
        self.views.rebuilds()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}
