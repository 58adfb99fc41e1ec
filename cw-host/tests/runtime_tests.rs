use std::cell::RefCell;
use std::rc::Rc;

use bridge::{BridgeError, ClosureVariant, GuestRuntime, HostObject, HostValue};
use host::{
    FN_CALL_SET_RESULT, FN_MEMORY_ON_GROW, FN_REF_DECREMENT, FN_REF_INCREMENT, HostRuntime,
    LocalGuest,
};

fn sum_guest() -> (LocalGuest, u32, u32, Rc<RefCell<Vec<u32>>>) {
    let mut guest = LocalGuest::new(4096);
    let adapter = guest.register_function(Box::new(|guest, bridge, args| {
        let slot = args.get(1).copied().unwrap_or(0);
        let HostValue::List(items) = bridge.decode(&*guest, slot)? else {
            return Err(BridgeError::Guest("expected a sequence".to_string()));
        };
        let mut total = 0_i32;
        for item in &items {
            if let HostValue::Int(value) = item {
                total = total.wrapping_add(*value);
            }
        }
        bridge.set_call_result(HostValue::Int(total));
        Ok(())
    }));

    let freed = Rc::new(RefCell::new(Vec::new()));
    let freed_inner = freed.clone();
    let deallocator = guest.register_function(Box::new(move |_guest, _bridge, args| {
        freed_inner
            .borrow_mut()
            .push(args.first().copied().unwrap_or(0));
        Ok(())
    }));

    (guest, adapter, deallocator, freed)
}

#[test]
fn values_round_trip_through_a_local_guest() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    let value = HostValue::Map(vec![
        ("id".to_string(), HostValue::Int(12)),
        (
            "tags".to_string(),
            HostValue::List(vec![
                HostValue::Text("a".to_string()),
                HostValue::Text("b".to_string()),
            ]),
        ),
    ]);
    let slot = runtime.send(&value).expect("send");
    assert_eq!(runtime.receive(slot).expect("receive"), value);
}

#[test]
fn host_calls_manage_reference_lifecycles() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    let object = HostValue::Object(HostObject::new("shared"));
    runtime.send(&object).expect("send");
    runtime.send(&object).expect("send");
    assert_eq!(runtime.bridge().handle_refcount(1), Some(2));

    runtime
        .host_call(FN_REF_INCREMENT, &[1])
        .expect("increment");
    assert_eq!(runtime.bridge().handle_refcount(1), Some(3));

    for _ in 0..3 {
        runtime
            .host_call(FN_REF_DECREMENT, &[1])
            .expect("decrement");
    }
    assert_eq!(runtime.bridge().live_references(), 0);
    assert!(matches!(
        runtime.host_call(FN_REF_DECREMENT, &[1]),
        Err(BridgeError::UnknownReference(1))
    ));
}

#[test]
fn set_result_crosses_through_the_transfer_cell() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    let slot = runtime.send(&HostValue::Int(9)).expect("send");
    runtime
        .host_call(FN_CALL_SET_RESULT, &[slot])
        .expect("set result");
    assert_eq!(
        runtime.bridge_mut().take_call_result(),
        Some(HostValue::Int(9))
    );
    assert_eq!(runtime.bridge_mut().take_call_result(), None);
}

#[test]
fn dispatch_rejects_bad_arity_and_unknown_indices() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    let error = runtime
        .host_call(FN_REF_INCREMENT, &[])
        .expect_err("arity should be checked");
    assert!(matches!(&error, BridgeError::Guest(_)));
    assert!(error.to_string().contains("expected 1 arguments, got 0"));

    let error = runtime
        .host_call(99, &[])
        .expect_err("unknown index should fail");
    assert!(error.to_string().contains("unknown host function index 99"));
}

#[test]
fn closures_run_through_the_real_function_table() {
    let (guest, adapter, deallocator, freed) = sum_guest();
    let mut runtime = HostRuntime::new(guest);

    let closure = runtime.make_closure(ClosureVariant::Exclusive, adapter, 7, deallocator);
    let result = runtime
        .call_closure(
            &closure,
            &[HostValue::Int(40), HostValue::Int(1), HostValue::Int(1)],
        )
        .expect("call");
    assert_eq!(result, HostValue::Int(42));
    assert!(freed.borrow().is_empty());

    runtime.drop_closure(&closure).expect("drop");
    assert_eq!(*freed.borrow(), vec![7]);

    assert!(matches!(
        runtime.call_closure(&closure, &[]),
        Err(BridgeError::ClosureDropped)
    ));
    assert_eq!(*freed.borrow(), vec![7]);
}

#[test]
fn growth_notifications_rebuild_views() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    runtime.send(&HostValue::Int(1)).expect("send");
    assert_eq!(runtime.bridge().view_rebuilds(), 1);

    runtime.guest_mut().memory_mut().grow(64);
    runtime
        .host_call(FN_MEMORY_ON_GROW, &[])
        .expect("on grow");
    assert_eq!(runtime.bridge().view_rebuilds(), 2);

    runtime.memory_grown();
    assert_eq!(runtime.bridge().view_rebuilds(), 2);
}

#[test]
fn reset_restarts_handle_assignment() {
    let mut runtime = HostRuntime::new(LocalGuest::new(4096));

    let object = HostValue::Object(HostObject::new(1_u8));
    assert_eq!(runtime.bridge_mut().acquire_handle(&object), 1);
    let other = HostValue::Object(HostObject::new(2_u8));
    assert_eq!(runtime.bridge_mut().acquire_handle(&other), 2);

    runtime.reset();
    assert_eq!(runtime.bridge().live_references(), 0);
    assert_eq!(runtime.bridge_mut().acquire_handle(&other), 1);
}
