use coweave_crdt::{LWWRegister, OpId, OpStamp};
use coweave_types::{HybridTimestamp, SessionId};
use pretty_assertions::assert_eq;

fn stamp(wall: u64, session: &str, tx: u32) -> OpStamp {
    OpStamp::new(
        HybridTimestamp::new(wall, 0),
        OpId::new(SessionId::new(session, "1"), tx, 0),
    )
}

#[test]
fn empty_register_has_no_value() {
    let reg: LWWRegister<i32> = LWWRegister::new();
    assert!(reg.is_empty());
    assert_eq!(reg.value(), None);
    assert_eq!(reg.stamp(), None);
}

#[test]
fn higher_stamp_wins_regardless_of_apply_order() {
    let mut reg = LWWRegister::new();
    reg.set(stamp(200, "agent_za", 0), "new");
    reg.set(stamp(100, "agent_zb", 0), "old");
    assert_eq!(reg.value(), Some(&"new"));
}

#[test]
fn equal_made_at_breaks_tie_by_session() {
    let mut reg = LWWRegister::new();
    reg.set(stamp(100, "agent_zb", 0), "b");
    reg.set(stamp(100, "agent_za", 0), "a");
    assert_eq!(reg.value(), Some(&"b"));
}

#[test]
fn duplicate_stamp_is_ignored() {
    let mut reg = LWWRegister::new();
    assert!(reg.set(stamp(1, "agent_za", 0), 1));
    assert!(!reg.set(stamp(1, "agent_za", 0), 2));
    assert_eq!(reg.value(), Some(&1));
    assert_eq!(reg.history().count(), 1);
}

#[test]
fn delete_clears_current_value() {
    let mut reg = LWWRegister::new();
    reg.set(stamp(1, "agent_za", 0), "x");
    reg.delete(stamp(2, "agent_za", 1));
    assert_eq!(reg.value(), None);
    assert!(!reg.is_empty());
}

// ── History ──────────────────────────────────────────────────────

#[test]
fn value_at_reads_past_writes() {
    let mut reg = LWWRegister::new();
    reg.set(stamp(100, "agent_za", 0), "reader");
    reg.set(stamp(200, "agent_za", 1), "writer");

    assert_eq!(reg.value_at(HybridTimestamp::new(50, 0)), None);
    assert_eq!(reg.value_at(HybridTimestamp::new(100, 0)), Some(&"reader"));
    assert_eq!(reg.value_at(HybridTimestamp::new(150, 0)), Some(&"reader"));
    assert_eq!(reg.value_at(HybridTimestamp::new(250, 0)), Some(&"writer"));
}

#[test]
fn history_keeps_deletions_in_stamp_order() {
    let mut reg = LWWRegister::new();
    reg.delete(stamp(300, "agent_za", 2));
    reg.set(stamp(100, "agent_za", 0), "a");
    reg.set(stamp(200, "agent_zb", 0), "b");

    let history: Vec<Option<&&str>> = reg.history().map(|(_, v)| v).collect();
    assert_eq!(history, vec![Some(&"a"), Some(&"b"), None]);
    assert_eq!(reg.value(), None);
    assert_eq!(reg.value_at(HybridTimestamp::new(250, 0)), Some(&"b"));
}
