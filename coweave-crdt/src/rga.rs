//! Replicated Growable Array (RGA) for CoList content.
//!
//! A CRDT for ordered sequences that supports insert and delete operations.
//! Every element is identified by the [`OpId`] of the change that appended
//! it and remembers the element it was inserted after (its origin).
//!
//! Based on "A comprehensive study of Convergent and Commutative Replicated Data Types"
//! (Shapiro et al.).

use std::collections::{HashMap, HashSet};

use crate::op::{OpId, OpStamp};

/// An element in the RGA sequence.
#[derive(Debug, Clone)]
struct Element<T> {
    stamp: OpStamp,
    /// The element this was inserted after; `None` means the head.
    origin: Option<OpId>,
    value: T,
}

/// A Replicated Growable Array.
///
/// Inserts and deletes commute: a delete that arrives before the insert it
/// targets is remembered and applied when the insert shows up.
#[derive(Debug, Clone)]
pub struct RGA<T> {
    elements: HashMap<OpId, Element<T>>,
    tombstones: HashSet<OpId>,
}

impl<T: Clone> RGA<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    /// Builds the ordered list of element ids by traversing the origin graph.
    ///
    /// The order is computed deterministically from the element data, not
    /// from the order in which inserts were applied. Elements whose origin is
    /// unknown are unreachable and stay hidden.
    fn build_order(&self) -> Vec<&OpId> {
        let mut children: HashMap<Option<&OpId>, Vec<(&OpStamp, &OpId)>> = HashMap::new();
        for (id, elem) in &self.elements {
            children
                .entry(elem.origin.as_ref())
                .or_default()
                .push((&elem.stamp, id));
        }

        // Later inserts after the same origin appear first.
        for siblings in children.values_mut() {
            siblings.sort_by(|a, b| b.0.cmp(a.0));
        }

        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<&OpId> = Vec::new();
        if let Some(kids) = children.get(&None) {
            stack.extend(kids.iter().rev().map(|(_, id)| *id));
        }

        while let Some(current) = stack.pop() {
            order.push(current);
            if let Some(kids) = children.get(&Some(current)) {
                stack.extend(kids.iter().rev().map(|(_, id)| *id));
            }
        }

        order
    }

    fn visible_ids(&self) -> impl Iterator<Item = &OpId> {
        self.build_order()
            .into_iter()
            .filter(move |id| !self.tombstones.contains(*id))
    }

    /// Returns the number of visible (non-deleted) elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible_ids().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the visible elements in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.visible_ids()
            .filter_map(|id| self.elements.get(id).map(|e| e.value.clone()))
            .collect()
    }

    /// Visible elements paired with their ids.
    #[must_use]
    pub fn entries(&self) -> Vec<(OpId, T)> {
        self.visible_ids()
            .filter_map(|id| self.elements.get(id).map(|e| (id.clone(), e.value.clone())))
            .collect()
    }

    /// Returns the element at the given visible index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        let id = self.visible_ids().nth(index)?;
        self.elements.get(id).map(|e| &e.value)
    }

    /// Returns the id of the element at a visible index.
    #[must_use]
    pub fn element_id_at(&self, index: usize) -> Option<OpId> {
        self.visible_ids().nth(index).cloned()
    }

    /// Returns the id of the last visible element.
    #[must_use]
    pub fn last_element_id(&self) -> Option<OpId> {
        self.visible_ids().last().cloned()
    }

    /// Inserts a value after `origin` (or at the head).
    pub fn insert_with_id(&mut self, stamp: OpStamp, origin: Option<OpId>, value: T) {
        let id = stamp.op.clone();
        self.elements.entry(id).or_insert(Element {
            stamp,
            origin,
            value,
        });
    }

    /// Deletes an element by id. The delete wins even if the insert arrives later.
    pub fn delete_by_id(&mut self, id: OpId) {
        self.tombstones.insert(id);
    }
}

impl<T: Clone> Default for RGA<T> {
    fn default() -> Self {
        Self::new()
    }
}
