use coweave_crdt::{OpId, OpStamp, RGA};
use coweave_types::{HybridTimestamp, SessionId};
use pretty_assertions::assert_eq;

fn op(session: &str, tx: u32) -> OpId {
    OpId::new(SessionId::new(session, "1"), tx, 0)
}

fn stamp(wall: u64, session: &str, tx: u32) -> OpStamp {
    OpStamp::new(HybridTimestamp::new(wall, 0), op(session, tx))
}

/// Appends `values` one after another from a single session.
fn sequential(session: &str, values: &[char]) -> RGA<char> {
    let mut rga = RGA::new();
    let mut prev = None;
    for (i, v) in values.iter().enumerate() {
        let s = stamp(i as u64 + 1, session, i as u32);
        rga.insert_with_id(s.clone(), prev, *v);
        prev = Some(s.op);
    }
    rga
}

// ── Basics ───────────────────────────────────────────────────────

#[test]
fn new_rga_is_empty() {
    let rga: RGA<char> = RGA::new();
    assert!(rga.is_empty());
    assert_eq!(rga.len(), 0);
    assert_eq!(rga.get(0), None);
}

#[test]
fn sequential_appends_keep_order() {
    let rga = sequential("agent_za", &['a', 'b', 'c']);
    assert_eq!(rga.to_vec(), vec!['a', 'b', 'c']);
    assert_eq!(rga.get(1), Some(&'b'));
    assert_eq!(rga.element_id_at(2), Some(op("agent_za", 2)));
    assert_eq!(rga.last_element_id(), Some(op("agent_za", 2)));
}

#[test]
fn insert_at_head() {
    let mut rga = sequential("agent_za", &['b']);
    rga.insert_with_id(stamp(10, "agent_za", 5), None, 'a');
    assert_eq!(rga.to_vec(), vec!['a', 'b']);
}

#[test]
fn concurrent_inserts_after_same_origin_later_first() {
    let mut rga = sequential("agent_za", &['x']);
    let origin = Some(op("agent_za", 0));
    rga.insert_with_id(stamp(5, "agent_zb", 0), origin.clone(), 'b');
    rga.insert_with_id(stamp(7, "agent_zc", 0), origin, 'c');
    assert_eq!(rga.to_vec(), vec!['x', 'c', 'b']);
}

#[test]
fn insert_is_idempotent() {
    let mut rga = sequential("agent_za", &['a']);
    rga.insert_with_id(stamp(1, "agent_za", 0), None, 'z');
    assert_eq!(rga.to_vec(), vec!['a']);
}

// ── Deletes ──────────────────────────────────────────────────────

#[test]
fn delete_hides_element() {
    let mut rga = sequential("agent_za", &['a', 'b', 'c']);
    rga.delete_by_id(op("agent_za", 1));
    assert_eq!(rga.to_vec(), vec!['a', 'c']);
    assert_eq!(rga.element_id_at(1), Some(op("agent_za", 2)));
    assert_eq!(rga.len(), 2);
}

#[test]
fn delete_before_insert_still_wins() {
    let mut rga: RGA<char> = RGA::new();
    rga.delete_by_id(op("agent_za", 0));
    rga.insert_with_id(stamp(1, "agent_za", 0), None, 'a');
    assert!(rga.is_empty());
}

#[test]
fn children_of_deleted_element_remain_visible() {
    let mut rga = sequential("agent_za", &['a', 'b']);
    rga.delete_by_id(op("agent_za", 0));
    assert_eq!(rga.to_vec(), vec!['b']);
}

#[test]
fn orphan_without_origin_is_hidden() {
    let mut rga: RGA<char> = RGA::new();
    rga.insert_with_id(stamp(2, "agent_zb", 0), Some(op("agent_za", 9)), 'q');
    assert!(rga.is_empty());
}

// ── Convergence ──────────────────────────────────────────────────

#[test]
fn concurrent_edits_converge_in_any_order() {
    let edits = |rga: &mut RGA<char>, order: &[usize]| {
        for &i in order {
            match i {
                0 => rga.insert_with_id(stamp(10, "agent_zb", 0), Some(op("agent_za", 1)), '!'),
                1 => rga.delete_by_id(op("agent_za", 0)),
                _ => rga.insert_with_id(stamp(11, "agent_zc", 0), None, '>'),
            }
        }
    };
    let mut forward = sequential("agent_za", &['h', 'i']);
    edits(&mut forward, &[0, 1, 2]);
    let mut backward = sequential("agent_za", &['h', 'i']);
    edits(&mut backward, &[2, 1, 0]);

    assert_eq!(forward.to_vec(), backward.to_vec());
    assert_eq!(forward.to_vec(), vec!['>', 'i', '!']);
}
