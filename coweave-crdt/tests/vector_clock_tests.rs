use coweave_crdt::VectorClock;
use coweave_types::SessionId;
use pretty_assertions::assert_eq;

fn session(name: &str) -> SessionId {
    SessionId::new(name, "1")
}

#[test]
fn new_clock_is_empty() {
    let clock = VectorClock::new();
    assert!(clock.is_empty());
    assert_eq!(clock.get(&session("agent_za")), 0);
    assert_eq!(clock.total(), 0);
}

#[test]
fn update_never_lowers() {
    let mut clock = VectorClock::new();
    clock.update(session("agent_za"), 5);
    clock.update(session("agent_za"), 3);
    assert_eq!(clock.get(&session("agent_za")), 5);
}

#[test]
fn set_can_lower() {
    let mut clock = VectorClock::new();
    clock.update(session("agent_za"), 5);
    clock.set(session("agent_za"), 2);
    assert_eq!(clock.get(&session("agent_za")), 2);
}

#[test]
fn merge_takes_maximum() {
    let mut a = VectorClock::new();
    a.update(session("agent_za"), 3);
    a.update(session("agent_zb"), 1);
    let mut b = VectorClock::new();
    b.update(session("agent_zb"), 4);
    b.update(session("agent_zc"), 2);

    let mut merged = a.clone();
    merged.merge(&b);
    assert_eq!(merged.get(&session("agent_za")), 3);
    assert_eq!(merged.get(&session("agent_zb")), 4);
    assert_eq!(merged.get(&session("agent_zc")), 2);
    assert_eq!(merged.total(), 9);
}

#[test]
fn serializes_as_session_map() {
    let mut clock = VectorClock::new();
    clock.update(session("agent_za"), 2);
    let json = serde_json::to_value(&clock).unwrap();
    assert_eq!(json, serde_json::json!({ "agent_za_session_z1": 2 }));
}
