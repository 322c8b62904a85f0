//! Annotation registry
//!
//! The single source of truth for every balloon and GD&T record in a
//! session. Display layouts, table rows and exporters read through it by id;
//! nothing else holds a mutable copy.

use crate::annotation::{AnnotationId, AnnotationRef, BalloonRecord, GdtRecord};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Error types for registry mutations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("annotation {0} is already registered")]
    DuplicateId(AnnotationId),

    #[error("annotation {0} not found")]
    NotFound(AnnotationId),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Change notification delivered to subscribers after each mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(AnnotationId),
    Removed(AnnotationId),
    Updated(AnnotationId),
    /// Numbers of several balloons changed at once
    Renumbered,
    GdtAdded(AnnotationId),
    GdtRemoved(AnnotationId),
}

/// Handle returned by [`AnnotationRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&RegistryEvent)>;

/// Owns all annotation records, indexed by id and by page.
#[derive(Default)]
pub struct AnnotationRegistry {
    balloons: HashMap<AnnotationId, BalloonRecord>,
    gdt: HashMap<AnnotationId, GdtRecord>,

    /// Ids per page in insertion (draw) order, balloons and GD&T mixed
    by_page: BTreeMap<u32, Vec<AnnotationId>>,

    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a balloon. Ids are never reused, so a duplicate is rejected.
    pub fn add(&mut self, record: BalloonRecord) -> RegistryResult<()> {
        let id = record.id();
        if self.contains(id) {
            return Err(RegistryError::DuplicateId(id));
        }
        self.index(record.page(), id);
        self.balloons.insert(id, record);
        self.notify(RegistryEvent::Added(id));
        Ok(())
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<BalloonRecord> {
        let record = self.balloons.remove(&id)?;
        self.unindex(record.page(), id);
        self.notify(RegistryEvent::Removed(id));
        Some(record)
    }

    /// Mutate a balloon in place. Returns `false` without doing anything when
    /// the id is no longer registered.
    pub fn update(&mut self, id: AnnotationId, mutator: impl FnOnce(&mut BalloonRecord)) -> bool {
        match self.balloons.get_mut(&id) {
            Some(record) => {
                mutator(record);
                self.notify(RegistryEvent::Updated(id));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: AnnotationId) -> Option<&BalloonRecord> {
        self.balloons.get(&id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.balloons.contains_key(&id) || self.gdt.contains_key(&id)
    }

    /// Every balloon, by page then insertion order.
    pub fn all(&self) -> Vec<&BalloonRecord> {
        self.by_page
            .values()
            .flatten()
            .filter_map(|id| self.balloons.get(id))
            .collect()
    }

    pub fn by_page(&self, page: u32) -> Vec<&BalloonRecord> {
        self.page_ids(page).filter_map(|id| self.balloons.get(id)).collect()
    }

    /// Number of balloons
    pub fn len(&self) -> usize {
        self.balloons.len()
    }

    /// True when there are no balloons and no GD&T labels
    pub fn is_empty(&self) -> bool {
        self.balloons.is_empty() && self.gdt.is_empty()
    }

    /// Pages holding at least one annotation of either kind, ascending.
    pub fn pages(&self) -> Vec<u32> {
        self.by_page.keys().copied().collect()
    }

    /// Every annotation on a page in draw order.
    pub fn page_annotations(&self, page: u32) -> Vec<AnnotationRef<'_>> {
        self.page_ids(page)
            .filter_map(|id| {
                self.balloons
                    .get(id)
                    .map(AnnotationRef::Balloon)
                    .or_else(|| self.gdt.get(id).map(AnnotationRef::Gdt))
            })
            .collect()
    }

    /// Lowest positive number not used by any balloon.
    pub fn next_free_number(&self) -> u32 {
        let mut used: Vec<u32> = self.balloons.values().map(|b| b.number).collect();
        used.sort_unstable();
        used.dedup();

        let mut candidate = 1;
        for number in used {
            match number.cmp(&candidate) {
                Ordering::Less => continue,
                Ordering::Equal => candidate += 1,
                Ordering::Greater => break,
            }
        }
        candidate
    }

    /// Balloon ids in reading order: page ascending, then top to bottom
    /// (document Y descending), then left to right, then id.
    pub fn reading_order(&self) -> Vec<AnnotationId> {
        let mut records: Vec<&BalloonRecord> = self.balloons.values().collect();
        records.sort_by(|a, b| {
            a.page()
                .cmp(&b.page())
                .then_with(|| b.center_point.y.total_cmp(&a.center_point.y))
                .then_with(|| a.center_point.x.total_cmp(&b.center_point.x))
                .then_with(|| a.id().cmp(&b.id()))
        });
        records.into_iter().map(BalloonRecord::id).collect()
    }

    /// Current `(id, number)` pairs for every balloon, in reading order.
    pub fn numbering(&self) -> Vec<(AnnotationId, u32)> {
        self.reading_order()
            .into_iter()
            .filter_map(|id| self.balloons.get(&id).map(|b| (id, b.number)))
            .collect()
    }

    /// The numbering [`renumber_all`](Self::renumber_all) would produce.
    pub fn canonical_numbering(&self) -> Vec<(AnnotationId, u32)> {
        self.reading_order().into_iter().zip(1..).collect()
    }

    /// Assign numbers in bulk; ids that are gone are skipped.
    pub fn assign_numbers(&mut self, numbering: &[(AnnotationId, u32)]) {
        for &(id, number) in numbering {
            if let Some(record) = self.balloons.get_mut(&id) {
                record.number = number;
            }
        }
        self.notify(RegistryEvent::Renumbered);
    }

    /// Renumber every balloon 1..=n in reading order.
    pub fn renumber_all(&mut self) {
        let numbering = self.canonical_numbering();
        self.assign_numbers(&numbering);
    }

    pub fn add_gdt(&mut self, record: GdtRecord) -> RegistryResult<()> {
        let id = record.id();
        if self.contains(id) {
            return Err(RegistryError::DuplicateId(id));
        }
        self.index(record.page(), id);
        self.gdt.insert(id, record);
        self.notify(RegistryEvent::GdtAdded(id));
        Ok(())
    }

    pub fn remove_gdt(&mut self, id: AnnotationId) -> Option<GdtRecord> {
        let record = self.gdt.remove(&id)?;
        self.unindex(record.page(), id);
        self.notify(RegistryEvent::GdtRemoved(id));
        Some(record)
    }

    pub fn get_gdt(&self, id: AnnotationId) -> Option<&GdtRecord> {
        self.gdt.get(&id)
    }

    /// Every GD&T label, by page then insertion order.
    pub fn all_gdt(&self) -> Vec<&GdtRecord> {
        self.by_page
            .values()
            .flatten()
            .filter_map(|id| self.gdt.get(id))
            .collect()
    }

    /// Drop every record. Subscribers receive one removal event per record.
    pub fn clear(&mut self) {
        let ids: Vec<AnnotationId> = self.by_page.values().flatten().copied().collect();
        for id in ids {
            if self.remove(id).is_none() {
                self.remove_gdt(id);
            }
        }
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&RegistryEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    fn notify(&mut self, event: RegistryEvent) {
        for (_, observer) in &mut self.observers {
            observer(&event);
        }
    }

    fn page_ids(&self, page: u32) -> impl Iterator<Item = &AnnotationId> {
        self.by_page.get(&page).into_iter().flatten()
    }

    fn index(&mut self, page: u32, id: AnnotationId) {
        self.by_page.entry(page).or_default().push(id);
    }

    fn unindex(&mut self, page: u32, id: AnnotationId) {
        if let Some(ids) = self.by_page.get_mut(&page) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_page.remove(&page);
            }
        }
    }
}

impl fmt::Debug for AnnotationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationRegistry")
            .field("balloons", &self.balloons.len())
            .field("gdt", &self.gdt.len())
            .field("pages", &self.by_page.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PageCoordinate;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn balloon(number: u32, page: u32, x: f64, y: f64) -> BalloonRecord {
        let point = PageCoordinate::new(x, y);
        BalloonRecord::new(number, page, point, point)
    }

    #[test]
    fn add_and_remove_keep_page_index() {
        let mut registry = AnnotationRegistry::new();
        let a = balloon(1, 0, 10.0, 10.0);
        let b = balloon(2, 1, 10.0, 10.0);
        let (a_id, b_id) = (a.id(), b.id());

        registry.add(a).unwrap();
        registry.add(b).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.by_page(0).len(), 1);
        assert_eq!(registry.pages(), vec![0, 1]);

        let removed = registry.remove(a_id).unwrap();
        assert_eq!(removed.id(), a_id);
        assert!(registry.by_page(0).is_empty());
        assert_eq!(registry.pages(), vec![1]);
        assert!(registry.get(b_id).is_some());
        assert!(registry.remove(a_id).is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = AnnotationRegistry::new();
        let record = balloon(1, 0, 0.0, 0.0);
        registry.add(record.clone()).unwrap();
        assert_eq!(registry.add(record.clone()), Err(RegistryError::DuplicateId(record.id())));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_of_missing_id_is_a_no_op() {
        let mut registry = AnnotationRegistry::new();
        let record = balloon(1, 0, 0.0, 0.0);
        let id = record.id();
        registry.add(record).unwrap();
        registry.remove(id);

        let mut called = false;
        assert!(!registry.update(id, |_| called = true));
        assert!(!called);
        assert!(registry.is_empty());
    }

    #[test]
    fn next_free_number_fills_gaps() {
        let mut registry = AnnotationRegistry::new();
        assert_eq!(registry.next_free_number(), 1);

        let two = balloon(2, 0, 0.0, 0.0);
        let two_id = two.id();
        registry.add(balloon(1, 0, 0.0, 0.0)).unwrap();
        registry.add(two).unwrap();
        registry.add(balloon(4, 1, 0.0, 0.0)).unwrap();
        assert_eq!(registry.next_free_number(), 3);

        registry.add(balloon(3, 0, 0.0, 0.0)).unwrap();
        assert_eq!(registry.next_free_number(), 5);

        registry.remove(two_id);
        assert_eq!(registry.next_free_number(), 2);
    }

    #[test]
    fn next_free_number_ignores_duplicates() {
        let mut registry = AnnotationRegistry::new();
        registry.add(balloon(1, 0, 0.0, 0.0)).unwrap();
        registry.add(balloon(1, 0, 5.0, 0.0)).unwrap();
        registry.add(balloon(3, 0, 9.0, 0.0)).unwrap();
        assert_eq!(registry.next_free_number(), 2);
    }

    #[test]
    fn renumber_follows_reading_order() {
        let mut registry = AnnotationRegistry::new();
        let top = balloon(7, 0, 10.0, 100.0);
        let left = balloon(2, 0, 5.0, 50.0);
        let right = balloon(9, 0, 20.0, 50.0);
        let next_page = balloon(1, 1, 0.0, 700.0);
        let ids = [top.id(), left.id(), right.id(), next_page.id()];
        for record in [right, next_page, top, left] {
            registry.add(record).unwrap();
        }

        registry.renumber_all();

        let numbers: Vec<u32> = ids.iter().map(|id| registry.get(*id).unwrap().number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn identical_positions_are_numbered_by_id() {
        let low = AnnotationId::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
        let high = AnnotationId::parse_str("ffffffff-0000-4000-8000-000000000001").unwrap();
        let at = |id, number| {
            let point = PageCoordinate::new(30.0, 30.0);
            BalloonRecord::with_id(id, number, 0, point, point)
        };

        for order in [[high, low], [low, high]] {
            let mut registry = AnnotationRegistry::new();
            for id in order {
                registry.add(at(id, 5)).unwrap();
            }
            registry.renumber_all();

            assert_eq!(registry.reading_order(), vec![low, high]);
            assert_eq!(registry.get(low).unwrap().number, 1);
            assert_eq!(registry.get(high).unwrap().number, 2);
        }
    }

    #[test]
    fn observers_see_every_mutation_until_unsubscribed() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        let mut registry = AnnotationRegistry::new();
        let subscription = registry.subscribe(move |event| sink.borrow_mut().push(*event));

        let record = balloon(1, 0, 0.0, 0.0);
        let id = record.id();
        registry.add(record).unwrap();
        registry.update(id, |b| b.description = "bore".into());
        registry.renumber_all();
        let gdt = GdtRecord::new("⏥", 0, PageCoordinate::new(1.0, 1.0));
        let gdt_id = gdt.id();
        registry.add_gdt(gdt).unwrap();
        registry.remove_gdt(gdt_id);
        registry.remove(id);

        assert_eq!(
            *events.borrow(),
            vec![
                RegistryEvent::Added(id),
                RegistryEvent::Updated(id),
                RegistryEvent::Renumbered,
                RegistryEvent::GdtAdded(gdt_id),
                RegistryEvent::GdtRemoved(gdt_id),
                RegistryEvent::Removed(id),
            ]
        );

        assert!(registry.unsubscribe(subscription));
        assert!(!registry.unsubscribe(subscription));
        registry.add(balloon(2, 0, 0.0, 0.0)).unwrap();
        assert_eq!(events.borrow().len(), 6);
    }

    #[test]
    fn page_annotations_mix_kinds_in_draw_order() {
        let mut registry = AnnotationRegistry::new();
        let first = balloon(1, 2, 0.0, 0.0);
        let gdt = GdtRecord::new("⌖", 2, PageCoordinate::new(3.0, 3.0));
        let last = balloon(2, 2, 0.0, 0.0);
        let ids = [first.id(), gdt.id(), last.id()];
        registry.add(first).unwrap();
        registry.add_gdt(gdt).unwrap();
        registry.add(last).unwrap();

        let drawn: Vec<AnnotationId> = registry.page_annotations(2).iter().map(|a| a.id()).collect();
        assert_eq!(drawn, ids);
        assert_eq!(registry.all_gdt().len(), 1);
        assert_eq!(registry.all().len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.pages().is_empty());
    }
}
