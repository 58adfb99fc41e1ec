use std::collections::HashMap;

use bridge::{Bridge, BridgeError, BridgeResult, GuestMemory, GuestRuntime};

pub type GuestFunction = Box<dyn FnMut(&mut LocalGuest, &mut Bridge, &[u32]) -> BridgeResult<()>>;

/// An in-process guest instance: linear memory, a free-list allocator
/// and an indirect function table, the same surface a sandboxed guest
/// module would export.
pub struct LocalGuest {
    memory: GuestMemory,
    table: Vec<GuestFunction>,
    free_blocks: Vec<(u32, u32)>,
    allocated: HashMap<u32, u32>,
    next_block: u32,
    call_depth: u32,
}

impl LocalGuest {
    pub fn new(memory_bytes: u32) -> Self {
        Self {
            memory: GuestMemory::new(memory_bytes),
            table: Vec::new(),
            free_blocks: Vec::new(),
            allocated: HashMap::new(),
            next_block: 8,
            call_depth: 0,
        }
    }

    pub fn register_function(&mut self, function: GuestFunction) -> u32 {
        let index = self.table.len() as u32;
        self.table.push(function);
        index
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    pub fn allocated_blocks(&self) -> usize {
        self.allocated.len()
    }

    pub fn call_depth(&self) -> u32 {
        self.call_depth
    }
}

impl GuestRuntime for LocalGuest {
    fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut GuestMemory {
        &mut self.memory
    }

    fn allocate(&mut self, size: u32) -> BridgeResult<u32> {
        let size = size
            .checked_next_multiple_of(8)
            .ok_or_else(|| BridgeError::Guest("guest address space exhausted".to_string()))?;

        if let Some(position) = self
            .free_blocks
            .iter()
            .position(|&(_, block_size)| block_size >= size)
        {
            let (address, block_size) = self.free_blocks.remove(position);
            if block_size > size {
                self.free_blocks.push((address + size, block_size - size));
            }
            self.allocated.insert(address, size);
            return Ok(address);
        }

        let address = self.next_block;
        let end = address
            .checked_add(size)
            .ok_or_else(|| BridgeError::Guest("guest address space exhausted".to_string()))?;
        self.next_block = end;
        if end > self.memory.len() {
            let shortfall = end - self.memory.len();
            self.memory.grow(shortfall.div_ceil(4096) * 4096);
        }
        self.allocated.insert(address, size);
        Ok(address)
    }

    fn deallocate(&mut self, address: u32) -> BridgeResult<()> {
        match self.allocated.remove(&address) {
            Some(size) => {
                self.free_blocks.push((address, size));
                Ok(())
            }
            None => Err(BridgeError::Guest(format!(
                "deallocate of unknown block {address}"
            ))),
        }
    }

    fn call_indirect(
        &mut self,
        bridge: &mut Bridge,
        index: u32,
        args: &[u32],
    ) -> BridgeResult<()> {
        // entries may reenter the guest through `self`; the table
        // itself must not be mutated while a call is on the stack
        let entry = self
            .table
            .get_mut(index as usize)
            .ok_or_else(|| BridgeError::Guest(format!("no function table entry at {index}")))?
            as *mut GuestFunction;
        self.call_depth += 1;
        let outcome = unsafe {
            let entry = &mut *entry;
            entry(self, bridge, args)
        };
        self.call_depth = self.call_depth.saturating_sub(1);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::HostValue;

    #[test]
    fn blocks_are_aligned_and_do_not_overlap() {
        let mut guest = LocalGuest::new(1024);
        let first = guest.allocate(20).expect("allocate");
        let second = guest.allocate(1).expect("allocate");

        assert_eq!(first % 8, 0);
        assert_eq!(second % 8, 0);
        assert!(second >= first + 24);
        assert_eq!(guest.allocated_blocks(), 2);
    }

    #[test]
    fn freed_blocks_are_recycled() {
        let mut guest = LocalGuest::new(1024);
        let first = guest.allocate(32).expect("allocate");
        guest.deallocate(first).expect("deallocate");

        let reused = guest.allocate(16).expect("allocate");
        assert_eq!(reused, first);
    }

    #[test]
    fn unknown_blocks_cannot_be_freed() {
        let mut guest = LocalGuest::new(1024);
        let error = guest.deallocate(64).expect_err("deallocate should fail");
        assert!(matches!(error, BridgeError::Guest(_)));

        let block = guest.allocate(8).expect("allocate");
        guest.deallocate(block).expect("deallocate");
        assert!(guest.deallocate(block).is_err());
    }

    #[test]
    fn memory_grows_to_satisfy_large_requests() {
        let mut guest = LocalGuest::new(64);
        let address = guest.allocate(10_000).expect("allocate");
        assert!(guest.memory().len() >= address + 10_000);
    }

    #[test]
    fn table_entries_dispatch_by_index() {
        let mut guest = LocalGuest::new(1024);
        let mut bridge = Bridge::new();

        let index = guest.register_function(Box::new(|_guest, bridge, args| {
            let value = args.first().copied().unwrap_or(0) as i32;
            bridge.set_call_result(HostValue::Int(value + 1));
            Ok(())
        }));
        assert_eq!(index, 0);
        assert_eq!(guest.table_len(), 1);

        guest
            .call_indirect(&mut bridge, index, &[41])
            .expect("call");
        assert_eq!(bridge.take_call_result(), Some(HostValue::Int(42)));

        let error = guest
            .call_indirect(&mut bridge, 9, &[])
            .expect_err("call should fail");
        assert!(matches!(error, BridgeError::Guest(_)));
    }
}
