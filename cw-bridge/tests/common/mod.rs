#![allow(dead_code, unused_imports)]

pub use bridge::{
    Bridge, BridgeError, BridgeResult, ClosureHandle, ClosureVariant, ElementKind, GuestMemory,
    GuestRuntime, HostObject, HostValue, KIND_OFFSET, Kind, SLOT_SIZE, TypedView, UniqueToken,
};

use std::collections::HashMap;

/// Table index the fake guest treats as the closure deallocator.
pub const DEALLOC_INDEX: u32 = 1000;

#[derive(Clone)]
pub enum GuestScript {
    Noop,
    SetResultInt(i32),
    EchoArgs,
    DropPendingHandle,
    ReenterPendingHandle,
    DropPendingThenFail(&'static str),
    Fail(&'static str),
}

/// Scripted stand-in for a real guest instance. Function table entries
/// are driven by `GuestScript`s; allocation is a bump allocator that
/// grows the backing memory on demand.
pub struct FakeGuest {
    pub memory: GuestMemory,
    pub next_block: u32,
    pub freed: Vec<u32>,
    pub deallocated_closures: Vec<u32>,
    pub scripts: HashMap<u32, GuestScript>,
    pub pending: Option<ClosureHandle>,
    pub inner_outcomes: Vec<BridgeResult<HostValue>>,
    pub dealloc_count_at_inner_drop: Option<usize>,
    pub fail_alloc: bool,
}

impl FakeGuest {
    pub fn new() -> Self {
        Self {
            memory: GuestMemory::new(1024),
            next_block: 8,
            freed: Vec::new(),
            deallocated_closures: Vec::new(),
            scripts: HashMap::new(),
            pending: None,
            inner_outcomes: Vec::new(),
            dealloc_count_at_inner_drop: None,
            fail_alloc: false,
        }
    }

    pub fn with_script(index: u32, script: GuestScript) -> Self {
        let mut guest = Self::new();
        guest.scripts.insert(index, script);
        guest
    }

    pub fn add_script(&mut self, index: u32, script: GuestScript) {
        self.scripts.insert(index, script);
    }

    /// Writes a raw 16-byte slot straight into guest memory, bypassing
    /// the encoder. Used to fabricate guest-produced slots.
    pub fn write_slot(&mut self, address: u32, first: u32, second: u32, third: u32, kind: u8) {
        let bytes = self.memory.as_mut_slice();
        let base = address as usize;
        bytes[base..base + 4].copy_from_slice(&first.to_le_bytes());
        bytes[base + 4..base + 8].copy_from_slice(&second.to_le_bytes());
        bytes[base + 8..base + 12].copy_from_slice(&third.to_le_bytes());
        bytes[base + 12] = kind;
    }

    pub fn write_raw(&mut self, address: u32, data: &[u8]) {
        let base = address as usize;
        self.memory.as_mut_slice()[base..base + data.len()].copy_from_slice(data);
    }

    pub fn read_u8(&self, address: u32) -> u8 {
        self.memory.as_slice()[address as usize]
    }

    pub fn read_u32(&self, address: u32) -> u32 {
        let base = address as usize;
        u32::from_le_bytes(self.memory.as_slice()[base..base + 4].try_into().unwrap())
    }

    pub fn read_raw(&self, address: u32, length: u32) -> &[u8] {
        let base = address as usize;
        &self.memory.as_slice()[base..base + length as usize]
    }
}

impl GuestRuntime for FakeGuest {
    fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut GuestMemory {
        &mut self.memory
    }

    fn allocate(&mut self, size: u32) -> BridgeResult<u32> {
        if self.fail_alloc {
            return Ok(0);
        }
        let address = self.next_block;
        self.next_block += size.div_ceil(8) * 8;
        if self.next_block > self.memory.len() {
            let shortfall = self.next_block - self.memory.len();
            self.memory.grow(shortfall.max(256));
        }
        Ok(address)
    }

    fn deallocate(&mut self, address: u32) -> BridgeResult<()> {
        self.freed.push(address);
        Ok(())
    }

    fn call_indirect(
        &mut self,
        bridge: &mut Bridge,
        index: u32,
        args: &[u32],
    ) -> BridgeResult<()> {
        if index == DEALLOC_INDEX {
            self.deallocated_closures
                .push(args.first().copied().unwrap_or(0));
            return Ok(());
        }
        let script = match self.scripts.get(&index) {
            Some(script) => script.clone(),
            None => return Err(BridgeError::Guest(format!("no table entry at {index}"))),
        };
        match script {
            GuestScript::Noop => Ok(()),
            GuestScript::SetResultInt(value) => {
                bridge.set_call_result(HostValue::Int(value));
                Ok(())
            }
            GuestScript::EchoArgs => {
                let slot = args.get(1).copied().unwrap_or(0);
                let value = bridge.decode(&*self, slot)?;
                bridge.set_call_result(value);
                Ok(())
            }
            GuestScript::DropPendingHandle => {
                if let Some(handle) = self.pending.take() {
                    self.dealloc_count_at_inner_drop = Some(self.deallocated_closures.len());
                    handle.drop_handle(bridge, self)?;
                }
                bridge.set_call_result(HostValue::Int(7));
                Ok(())
            }
            GuestScript::ReenterPendingHandle => {
                if let Some(handle) = self.pending.take() {
                    let outcome = handle.call(bridge, self, &[]);
                    self.inner_outcomes.push(outcome);
                    bridge.set_call_result(HostValue::Int(22));
                } else {
                    bridge.set_call_result(HostValue::Int(11));
                }
                Ok(())
            }
            GuestScript::DropPendingThenFail(message) => {
                if let Some(handle) = self.pending.take() {
                    handle.drop_handle(bridge, self)?;
                }
                Err(BridgeError::Guest(message.to_string()))
            }
            GuestScript::Fail(message) => Err(BridgeError::Guest(message.to_string())),
        }
    }
}
