use crate::bridge::{BridgeError, BridgeResult};
use crate::guest::GuestRuntime;
use crate::slot::SLOT_SIZE;

pub fn alloc(guest: &mut dyn GuestRuntime, size: u32) -> BridgeResult<u32> {
    if size == 0 {
        return Ok(0);
    }
    let address = guest.allocate(size)?;
    if address == 0 {
        return Err(BridgeError::AllocationFailed(size));
    }
    Ok(address)
}

pub fn alloc_slot(guest: &mut dyn GuestRuntime) -> BridgeResult<u32> {
    alloc(guest, SLOT_SIZE)
}

pub fn free(guest: &mut dyn GuestRuntime, address: u32) -> BridgeResult<()> {
    if address == 0 {
        return Ok(());
    }
    guest.deallocate(address)
}
