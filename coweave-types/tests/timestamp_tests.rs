use coweave_types::{HybridTimestamp, canonical_json, wall_clock_millis};
use serde_json::json;
use proptest::prelude::*;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn first_tick_leaves_zero_for_wall_clock() {
    let ts = HybridTimestamp::zero().tick();
    assert_eq!(ts.logical(), 0);
    assert!(ts.wall_time() > 0);
    assert!(ts.wall_time() <= wall_clock_millis());
}

#[test]
fn components_are_preserved() {
    let ts = HybridTimestamp::new(42, 7);
    assert_eq!(ts.wall_time(), 42);
    assert_eq!(ts.logical(), 7);
}

#[test]
fn logical_breaks_wall_time_ties() {
    assert!(HybridTimestamp::new(100, 0) < HybridTimestamp::new(100, 1));
    assert!(HybridTimestamp::new(100, 9) < HybridTimestamp::new(101, 0));
}

// ── tick ─────────────────────────────────────────────────────────

#[test]
fn tick_is_monotonic() {
    let t1 = HybridTimestamp::zero().tick();
    let t2 = t1.tick();
    let t3 = t2.tick();
    assert!(t1 < t2);
    assert!(t2 < t3);
}

#[test]
fn tick_from_future_clock_bumps_logical() {
    let ts = HybridTimestamp::new(u64::MAX / 2, 0);
    let ticked = ts.tick();
    assert_eq!(ticked.wall_time(), ts.wall_time());
    assert_eq!(ticked.logical(), 1);
}

// ── receive ──────────────────────────────────────────────────────

#[test]
fn receive_from_past_peer_keeps_local_clock_ahead() {
    let local = HybridTimestamp::new(u64::MAX / 2, 3);
    let remote = HybridTimestamp::new(10, 9);
    let merged = local.receive(&remote);
    assert_eq!(merged.wall_time(), u64::MAX / 2);
    assert_eq!(merged.logical(), 4);
}

#[test]
fn receive_from_future_peer_follows_it() {
    let local = HybridTimestamp::new(1, 0);
    let remote = HybridTimestamp::new(u64::MAX / 2, 7);
    let merged = local.receive(&remote);
    assert_eq!(merged.wall_time(), u64::MAX / 2);
    assert_eq!(merged.logical(), 8);
}

proptest! {
    #[test]
    fn receive_is_after_both(
        a_wall in 0u64..u64::MAX / 2, a_log in 0u32..1000,
        b_wall in 0u64..u64::MAX / 2, b_log in 0u32..1000,
    ) {
        let local = HybridTimestamp::new(a_wall, a_log);
        let remote = HybridTimestamp::new(b_wall, b_log);
        let merged = local.receive(&remote);
        prop_assert!(merged > local);
        prop_assert!(merged > remote);
    }
}

// ── Canonical JSON ───────────────────────────────────────────────

#[derive(serde::Serialize)]
struct Unsorted {
    zeta: u32,
    alpha: u32,
}

#[test]
fn canonical_json_sorts_keys() {
    let bytes = canonical_json(&Unsorted { zeta: 1, alpha: 2 }).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"alpha":2,"zeta":1}"#);
}

#[test]
fn canonical_json_sorts_nested_keys() {
    let value = json!({
        "b": [{ "z": 1, "a": { "d": 0, "c": 0 } }],
        "a": { "y": true, "x": null },
    });
    let bytes = canonical_json(&value).unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        r#"{"a":{"x":null,"y":true},"b":[{"a":{"c":0,"d":0},"z":1}]}"#
    );
}

#[test]
fn canonical_json_is_stable_for_equal_values() {
    let one = json!({ "k": 1, "j": [2, 3] });
    let mut two = serde_json::Map::new();
    two.insert("j".into(), json!([2, 3]));
    two.insert("k".into(), json!(1));
    assert_eq!(
        canonical_json(&one).unwrap(),
        canonical_json(&serde_json::Value::Object(two)).unwrap()
    );
}

#[test]
fn timestamp_serde_roundtrip() {
    let ts = HybridTimestamp::new(1_234_567_890, 42);
    let json = serde_json::to_string(&ts).unwrap();
    let parsed: HybridTimestamp = serde_json::from_str(&json).unwrap();
    assert_eq!(ts, parsed);
}
