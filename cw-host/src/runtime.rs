use bridge::{
    Bridge, BridgeError, BridgeResult, ClosureHandle, ClosureVariant, GuestRuntime, HostValue,
};
use host_abi::{
    FN_CALL_SET_RESULT, FN_MEMORY_ON_GROW, FN_RAW_UNREGISTER, FN_REF_DECREMENT, FN_REF_INCREMENT,
};
use tracing::{debug, error, warn};

use crate::logging::{category_bridge, category_guest};

/// One guest instance and the bridge serving it. All boundary
/// crossings of an instance funnel through here.
pub struct HostRuntime<G: GuestRuntime> {
    bridge: Bridge,
    guest: G,
}

impl<G: GuestRuntime> HostRuntime<G> {
    pub fn new(guest: G) -> Self {
        Self {
            bridge: Bridge::new(),
            guest,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge {
        &mut self.bridge
    }

    pub fn guest(&self) -> &G {
        &self.guest
    }

    pub fn guest_mut(&mut self) -> &mut G {
        &mut self.guest
    }

    pub fn send(&mut self, value: &HostValue) -> BridgeResult<u32> {
        match self.bridge.encode_new_slot(&mut self.guest, value) {
            Ok(address) => {
                debug!(
                    "{} encoded {} into slot {address}",
                    category_bridge(),
                    value.kind_name()
                );
                Ok(address)
            }
            Err(err) => {
                self.report(&err, "encode");
                Err(err)
            }
        }
    }

    pub fn send_into(&mut self, address: u32, value: &HostValue) -> BridgeResult<()> {
        match self.bridge.encode(&mut self.guest, address, value) {
            Ok(()) => {
                debug!(
                    "{} encoded {} into slot {address}",
                    category_bridge(),
                    value.kind_name()
                );
                Ok(())
            }
            Err(err) => {
                self.report(&err, "encode");
                Err(err)
            }
        }
    }

    pub fn receive(&mut self, address: u32) -> BridgeResult<HostValue> {
        match self.bridge.decode(&self.guest, address) {
            Ok(value) => {
                debug!(
                    "{} decoded {} from slot {address}",
                    category_bridge(),
                    value.kind_name()
                );
                Ok(value)
            }
            Err(err) => {
                self.report(&err, "decode");
                Err(err)
            }
        }
    }

    pub fn make_closure(
        &self,
        variant: ClosureVariant,
        adapter: u32,
        function: u32,
        deallocator: u32,
    ) -> ClosureHandle {
        self.bridge.make_closure(variant, adapter, function, deallocator)
    }

    pub fn call_closure(
        &mut self,
        handle: &ClosureHandle,
        args: &[HostValue],
    ) -> BridgeResult<HostValue> {
        debug!(
            "{} calling {} closure through adapter {}",
            category_guest(),
            handle.variant().name(),
            handle.adapter()
        );
        match handle.call(&mut self.bridge, &mut self.guest, args) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.report(&err, "closure call");
                Err(err)
            }
        }
    }

    pub fn drop_closure(&mut self, handle: &ClosureHandle) -> BridgeResult<()> {
        match handle.drop_handle(&mut self.bridge, &mut self.guest) {
            Ok(()) => {
                debug!(
                    "{} {} closure dropped",
                    category_guest(),
                    handle.variant().name()
                );
                Ok(())
            }
            Err(err) => {
                self.report(&err, "closure drop");
                Err(err)
            }
        }
    }

    /// Entry point for the guest's host imports.
    pub fn host_call(&mut self, index: u16, args: &[u32]) -> BridgeResult<()> {
        debug!("{} host function {index} invoked", category_guest());
        match dispatch(&mut self.bridge, &mut self.guest, index, args) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report(&err, "host call");
                Err(err)
            }
        }
    }

    pub fn memory_grown(&mut self) {
        self.bridge.notify_grown(self.guest.memory());
        debug!(
            "{} memory growth acknowledged ({} bytes)",
            category_guest(),
            self.guest.memory().len()
        );
    }

    pub fn reset(&mut self) {
        self.bridge.reset();
        debug!("{} bridge state reset", category_bridge());
    }

    fn report(&self, err: &BridgeError, action: &str) {
        if err.is_protocol_violation() {
            error!(
                "{} protocol violation during {action}: {err}",
                category_bridge()
            );
        } else {
            warn!("{} {action} failed: {err}", category_bridge());
        }
    }
}

pub fn dispatch(
    bridge: &mut Bridge,
    guest: &mut dyn GuestRuntime,
    index: u16,
    args: &[u32],
) -> BridgeResult<()> {
    match index {
        FN_REF_INCREMENT => {
            expect_arg_count("ref::increment", args, 1)?;
            bridge.increment_handle(args[0])
        }
        FN_REF_DECREMENT => {
            expect_arg_count("ref::decrement", args, 1)?;
            bridge.release_handle(args[0])
        }
        FN_RAW_UNREGISTER => {
            expect_arg_count("raw::unregister", args, 1)?;
            bridge.unregister_raw(args[0])
        }
        FN_CALL_SET_RESULT => {
            expect_arg_count("call::set_result", args, 1)?;
            let value = bridge.decode(&*guest, args[0])?;
            bridge.set_call_result(value);
            Ok(())
        }
        FN_MEMORY_ON_GROW => {
            expect_arg_count("memory::on_grow", args, 0)?;
            bridge.notify_grown(guest.memory());
            Ok(())
        }
        other => Err(BridgeError::Guest(format!(
            "unknown host function index {other}"
        ))),
    }
}

fn expect_arg_count(name: &str, args: &[u32], expected: usize) -> BridgeResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(BridgeError::Guest(format!(
            "{name} expected {expected} arguments, got {}",
            args.len()
        )))
    }
}
