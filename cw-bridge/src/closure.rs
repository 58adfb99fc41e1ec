use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::arena;
use crate::bridge::{Bridge, BridgeError, BridgeResult};
use crate::guest::GuestRuntime;
use crate::slot;
use crate::value::HostValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosureVariant {
    Shared,
    Exclusive,
    Once,
}

impl ClosureVariant {
    pub fn name(self) -> &'static str {
        match self {
            ClosureVariant::Shared => "shared",
            ClosureVariant::Exclusive => "exclusive",
            ClosureVariant::Once => "once",
        }
    }
}

#[derive(Debug)]
struct ClosureState {
    function: u32,
    ongoing_calls: u32,
    drop_queued: bool,
    consumed: bool,
}

/// Callable handle over a guest closure. The wire slot carries three
/// table indices: the adapter that unpacks arguments, the boxed
/// function it forwards to, and the deallocator that frees the box.
/// Clones share state, so consuming or dropping one affects all.
#[derive(Clone)]
pub struct ClosureHandle {
    variant: ClosureVariant,
    adapter: u32,
    deallocator: u32,
    state: Rc<RefCell<ClosureState>>,
}

impl ClosureHandle {
    pub fn new(variant: ClosureVariant, adapter: u32, function: u32, deallocator: u32) -> Self {
        Self {
            variant,
            adapter,
            deallocator,
            state: Rc::new(RefCell::new(ClosureState {
                function,
                ongoing_calls: 0,
                drop_queued: false,
                consumed: false,
            })),
        }
    }

    pub fn variant(&self) -> ClosureVariant {
        self.variant
    }

    pub fn adapter(&self) -> u32 {
        self.adapter
    }

    pub fn is_live(&self) -> bool {
        let state = self.state.borrow();
        state.function != 0 && !state.drop_queued
    }

    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.state) as *const () as usize
    }

    pub fn call(
        &self,
        bridge: &mut Bridge,
        guest: &mut dyn GuestRuntime,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let function = {
            let mut state = self.state.borrow_mut();
            if state.function == 0 || state.drop_queued {
                return Err(if state.consumed {
                    BridgeError::ClosureConsumed
                } else {
                    BridgeError::ClosureDropped
                });
            }
            if self.variant != ClosureVariant::Shared && state.ongoing_calls != 0 {
                return Err(BridgeError::ClosureBusy);
            }
            let function = state.function;
            if self.variant == ClosureVariant::Once {
                // consumed before the body runs, so reentry sees it
                state.function = 0;
                state.consumed = true;
            }
            state.ongoing_calls += 1;
            function
        };

        let result = self.invoke(bridge, guest, function, args);

        let queued = {
            let mut state = self.state.borrow_mut();
            state.ongoing_calls -= 1;
            state.drop_queued && state.ongoing_calls == 0
        };
        let finished = if queued {
            self.finish_drop(bridge, guest)
        } else {
            Ok(())
        };

        let value = result?;
        finished?;
        Ok(value)
    }

    fn invoke(
        &self,
        bridge: &mut Bridge,
        guest: &mut dyn GuestRuntime,
        function: u32,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        let args_slot = arena::alloc_slot(guest)?;
        slot::serialize_array(bridge, guest, args_slot, args)?;
        let call = guest.call_indirect(bridge, self.adapter, &[function, args_slot]);
        // drain the transfer cell even on failure so it stays one-shot
        let result = bridge.take_call_result();
        call?;
        Ok(result.unwrap_or(HostValue::Undefined))
    }

    /// Releases the guest-side box. Deferred while calls are ongoing,
    /// a no-op once the closure was consumed or already dropped.
    pub fn drop_handle(
        &self,
        bridge: &mut Bridge,
        guest: &mut dyn GuestRuntime,
    ) -> BridgeResult<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.ongoing_calls != 0 {
                if !state.consumed {
                    state.drop_queued = true;
                }
                return Ok(());
            }
        }
        self.finish_drop(bridge, guest)
    }

    fn finish_drop(&self, bridge: &mut Bridge, guest: &mut dyn GuestRuntime) -> BridgeResult<()> {
        let function = {
            let mut state = self.state.borrow_mut();
            state.drop_queued = false;
            let function = state.function;
            state.function = 0;
            function
        };
        if function == 0 {
            return Ok(());
        }
        guest.call_indirect(bridge, self.deallocator, &[function])
    }
}

impl PartialEq for ClosureHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for ClosureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ClosureHandle")
            .field("variant", &self.variant)
            .field("adapter", &self.adapter)
            .field("function", &state.function)
            .field("live", &(state.function != 0 && !state.drop_queued))
            .finish()
    }
}
