use crate::bridge::{Bridge, BridgeResult};
use crate::views::GuestMemory;

/// The guest side of the boundary: linear memory plus the exported
/// allocator and the indirect function table.
pub trait GuestRuntime {
    fn memory(&self) -> &GuestMemory;

    fn memory_mut(&mut self) -> &mut GuestMemory;

    /// Returns the address of a fresh block, or 0 if the guest
    /// allocator failed. May grow the memory.
    fn allocate(&mut self, size: u32) -> BridgeResult<u32>;

    fn deallocate(&mut self, address: u32) -> BridgeResult<()>;

    /// Invokes the guest function table entry at `index` with raw
    /// word arguments. The callee reports values back through the
    /// bridge's transfer cell.
    fn call_indirect(
        &mut self,
        bridge: &mut Bridge,
        index: u32,
        args: &[u32],
    ) -> BridgeResult<()>;
}
