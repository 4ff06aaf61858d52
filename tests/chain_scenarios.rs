//! S3 and universal property 7 ("path stability") from spec §8: a chained
//! observer on `a.b.c` re-wires when an intermediate segment is replaced,
//! and stops forwarding changes from the subtree it left behind.

mod common;

use std::rc::Rc;
use std::sync::Arc;

use common::{ChainRecorder, Node};
use hub_core::{ChainObserver, KvoObject, Observable, ObservationContext, Path, PropertyValue};

#[test]
fn chain_observer_fires_on_leaf_change_and_rewires_on_intermediate_replacement() {
    let ctx = ObservationContext::new();
    let root = Node::new();

    let node_a1 = Node::new();
    let node_b1 = Node::new();
    node_b1.borrow_mut().raw_set("c", PropertyValue::from(1.0));
    node_a1.borrow_mut().raw_set("b", PropertyValue::Object(node_b1.clone()));
    root.borrow_mut().raw_set("a", PropertyValue::Object(node_a1.clone()));

    let recorder = ChainRecorder::new();
    let path = Path::parse("a.b.c").unwrap();
    let chain = ChainObserver::install(
        Rc::downgrade(&root),
        &path,
        recorder.clone(),
        Arc::from("chainChanged"),
        None,
    );

    // Installing the chain over an already-resolved path does not itself
    // notify — only subsequent changes do.
    assert_eq!(recorder.call_count.get(), 0);

    // Mutating the currently-wired leaf fires the master observer with the
    // new terminal value.
    node_b1.borrow_mut().set(&ctx, "c", PropertyValue::from(2.0));
    assert_eq!(recorder.call_count.get(), 1);
    assert_eq!(recorder.calls.borrow().last(), Some(&PropertyValue::from(2.0)));

    // Reassign `root.a` to a brand new subtree with its own `b.c`.
    let node_a2 = Node::new();
    let node_b2 = Node::new();
    node_b2.borrow_mut().raw_set("c", PropertyValue::from(10.0));
    node_a2.borrow_mut().raw_set("b", PropertyValue::Object(node_b2.clone()));
    root.borrow_mut().set(&ctx, "a", PropertyValue::Object(node_a2.clone()));

    // The old leaf is no longer wired: mutating it must not reach the master.
    let calls_before = recorder.call_count.get();
    node_b1.borrow_mut().set(&ctx, "c", PropertyValue::from(999.0));
    assert_eq!(recorder.call_count.get(), calls_before);

    // The new leaf is: mutating it does reach the master, with the new value.
    node_b2.borrow_mut().set(&ctx, "c", PropertyValue::from(20.0));
    assert_eq!(recorder.call_count.get(), calls_before + 1);
    assert_eq!(recorder.calls.borrow().last(), Some(&PropertyValue::from(20.0)));

    chain.destroy_chain();

    // After explicit teardown, further changes on the live leaf are silent.
    let calls_after_destroy = recorder.call_count.get();
    node_b2.borrow_mut().set(&ctx, "c", PropertyValue::from(30.0));
    assert_eq!(recorder.call_count.get(), calls_after_destroy);
}

#[test]
fn chain_observer_pauses_while_an_intermediate_segment_is_undefined() {
    let ctx = ObservationContext::new();
    let root = Node::new();
    // `root.a` is not set at all yet: the chain must install without
    // panicking and simply wait.
    let recorder = ChainRecorder::new();
    let path = Path::parse("a.b.c").unwrap();
    let _chain = ChainObserver::install(
        Rc::downgrade(&root),
        &path,
        recorder.clone(),
        Arc::from("chainChanged"),
        None,
    );
    assert_eq!(recorder.call_count.get(), 0);

    let node_a = Node::new();
    let node_b = Node::new();
    node_b.borrow_mut().raw_set("c", PropertyValue::from(7.0));
    node_a.borrow_mut().raw_set("b", PropertyValue::Object(node_b.clone()));

    // Resolving `a` wires the rest of the chain down to `c` but, per the
    // implementation's contract, only forwards to the master on a
    // subsequent *change* at the terminal segment, not the initial wiring.
    root.borrow_mut().set(&ctx, "a", PropertyValue::Object(node_a));
    assert_eq!(recorder.call_count.get(), 0);

    node_b.borrow_mut().set(&ctx, "c", PropertyValue::from(8.0));
    assert_eq!(recorder.call_count.get(), 1);
}
