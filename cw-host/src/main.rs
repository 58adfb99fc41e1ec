use std::env;

use bridge::{
    BridgeError, ClosureVariant, GuestRuntime, HostObject, HostValue, UniqueToken,
};
use host::{FN_RAW_UNREGISTER, FN_REF_DECREMENT, HostRuntime, LocalGuest, init_logging};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let memory_bytes = parse_memory_bytes("GUEST_MEMORY_BYTES", 64 * 1024)?;
    let mut guest = LocalGuest::new(memory_bytes);

    let sum_adapter = guest.register_function(Box::new(|guest, bridge, args| {
        let slot = args.get(1).copied().unwrap_or(0);
        let HostValue::List(items) = bridge.decode(&*guest, slot)? else {
            return Err(BridgeError::Guest(
                "adapter expects a sequence of arguments".to_string(),
            ));
        };
        let mut total = 0_i32;
        for item in &items {
            match item {
                HostValue::Int(value) => total = total.wrapping_add(*value),
                other => {
                    return Err(BridgeError::Guest(format!(
                        "cannot sum a {}",
                        other.kind_name()
                    )));
                }
            }
        }
        bridge.set_call_result(HostValue::Int(total));
        Ok(())
    }));
    let deallocator = guest.register_function(Box::new(|_guest, _bridge, args| {
        info!(
            "guest freed closure box {}",
            args.first().copied().unwrap_or(0)
        );
        Ok(())
    }));

    let mut runtime = HostRuntime::new(guest);
    info!("guest instance up with {memory_bytes} bytes of linear memory");

    // a structured value crosses the boundary and comes back
    let record = HostValue::Map(vec![
        ("name".to_string(), HostValue::Text("edge-01".to_string())),
        (
            "ports".to_string(),
            HostValue::List(vec![HostValue::Int(80), HostValue::Int(443)]),
        ),
        ("ratio".to_string(), HostValue::Float(0.75)),
    ]);
    let slot = runtime.send(&record)?;
    let echoed = runtime.receive(slot)?;
    info!(
        "round-tripped a {} through guest memory: {echoed:?}",
        echoed.kind_name()
    );

    // the same host object crosses twice and shares one handle
    let object = HostValue::Object(HostObject::new("session-alpha"));
    let first = runtime.send(&object)?;
    runtime.send(&object)?;
    let id = slot_payload(runtime.guest(), first)?;
    info!(
        "object crossed twice as handle {id}, refcount {:?}",
        runtime.bridge().handle_refcount(id)
    );
    runtime.host_call(FN_REF_DECREMENT, &[id])?;
    runtime.host_call(FN_REF_DECREMENT, &[id])?;
    info!(
        "guest released both holds, {} references remain live",
        runtime.bridge().live_references()
    );

    // tokens never deduplicate
    let token = HostValue::Token(UniqueToken::labeled("boot"));
    let first_token = runtime.send(&token)?;
    let second_token = runtime.send(&token)?;
    info!(
        "token registered twice, {} raw values live",
        runtime.bridge().live_raw_values()
    );
    runtime.host_call(FN_RAW_UNREGISTER, &[slot_payload(runtime.guest(), first_token)?])?;
    runtime.host_call(FN_RAW_UNREGISTER, &[slot_payload(runtime.guest(), second_token)?])?;

    // a guest closure: call it, drop it, watch the late call bounce
    let closure = runtime.make_closure(ClosureVariant::Exclusive, sum_adapter, 7, deallocator);
    let result = runtime.call_closure(
        &closure,
        &[HostValue::Int(1), HostValue::Int(2), HostValue::Int(39)],
    )?;
    info!("closure summed its arguments to {result:?}");
    runtime.drop_closure(&closure)?;
    match runtime.call_closure(&closure, &[]) {
        Err(err) => info!("call after drop rejected: {err}"),
        Ok(value) => warn!("expected the call to fail, got {value:?}"),
    }

    Ok(())
}

fn slot_payload(guest: &LocalGuest, slot: u32) -> Result<u32, Box<dyn std::error::Error>> {
    let base = slot as usize;
    let payload = guest
        .memory()
        .as_slice()
        .get(base..base + 4)
        .ok_or("slot out of range")?;
    Ok(u32::from_le_bytes(payload.try_into()?))
}

fn parse_memory_bytes(key: &str, default: u32) -> Result<u32, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
