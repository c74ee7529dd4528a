//! The layout registry: single owner of the current layout.
//!
//! # Observer pattern (for beginners)
//!
//! Many parts of the system care about the layout: the active mode resizes
//! its canvases, connected clients redraw their editor, and so on.  Rather
//! than having the registry know about each of them, interested parties
//! *subscribe* a handler closure.  After every successful mutation the
//! registry calls each handler, in the order they subscribed, with the new
//! layout.  A mutation that changes nothing (adding a display that is
//! already present, removing one that is absent) notifies nobody.
//!
//! The registry is single-writer: only its own methods mutate the layout,
//! and [`LayoutRegistry::get`] hands out a cloned snapshot, so a caller
//! holding an old snapshot is never affected by later writes.

use std::sync::Arc;

use tracing::{debug, warn};

use super::display::{DisplayId, LogicalDisplay};
use super::layout::{Layout, Placement, Position};

/// Callback invoked with the new layout after each change.
pub type LayoutHandler = Box<dyn FnMut(&Layout) + Send>;

/// Token returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Anything layout changes can be observed on.
pub trait LayoutSource {
    /// Registers `handler`; it runs after every subsequent change.
    fn subscribe(&mut self, handler: LayoutHandler) -> SubscriptionId;

    /// Removes a handler.  Returns `false` if the id was unknown.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Current layout snapshot.
    fn get(&self) -> Layout;
}

/// Observable, single-writer store for the current [`Layout`].
#[derive(Default)]
pub struct LayoutRegistry {
    layout: Layout,
    subscribers: Vec<(SubscriptionId, LayoutHandler)>,
    next_subscription: u64,
}

impl LayoutRegistry {
    /// Creates a registry holding an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `display` at `position`.
    ///
    /// No-op (returns `false`) if a display with the same id is already
    /// present; callers must `remove` it first.  Also a no-op if the display
    /// would reach past [`MAX_EXTENT`](super::layout::MAX_EXTENT).
    pub fn add(&mut self, logical: LogicalDisplay, position: Position) -> bool {
        if self.layout.contains(&logical.id) {
            debug!(display_id = %logical.id, "add ignored: display already in layout");
            return false;
        }
        let placement = Placement::new(logical, position);
        if let Err(e) = placement.check_extent() {
            warn!("add ignored: {e}");
            return false;
        }
        self.layout.push(placement);
        self.commit();
        true
    }

    /// Appends `display` immediately to the right of the current bounds, on
    /// the top row.
    pub fn add_at_right_edge(&mut self, display: LogicalDisplay) -> bool {
        let position = Position::new(self.layout.bounds().width, 0);
        self.add(display, position)
    }

    /// Removes every entry for `id`.  Returns `false` if none existed.
    pub fn remove(&mut self, id: &DisplayId) -> bool {
        if !self.layout.remove(id) {
            return false;
        }
        self.commit();
        true
    }

    /// Moves the display `id` to `position`.  Returns `false` if absent or
    /// if the display would reach past the layout limit.
    pub fn move_display(&mut self, id: &DisplayId, position: Position) -> bool {
        let Some(current) = self.layout.get(id) else {
            return false;
        };
        if let Err(e) = Placement::new(current.display.clone(), position).check_extent() {
            warn!("move ignored: {e}");
            return false;
        }
        self.layout.set_position(id, position);
        self.commit();
        true
    }

    pub fn has(&self, id: &DisplayId) -> bool {
        self.layout.contains(id)
    }

    /// Current layout snapshot.
    pub fn get(&self) -> Layout {
        self.layout.clone()
    }

    /// Borrow the current layout without cloning.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Normalises and then notifies every subscriber, in order.
    fn commit(&mut self) {
        self.layout = self.layout.normalized();
        debug!(
            displays = self.layout.len(),
            subscribers = self.subscribers.len(),
            "layout changed"
        );
        for (_, handler) in self.subscribers.iter_mut() {
            handler(&self.layout);
        }
    }
}

impl LayoutSource for LayoutRegistry {
    fn subscribe(&mut self, handler: LayoutHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, handler));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn get(&self) -> Layout {
        LayoutRegistry::get(self)
    }
}

// ── Conditional delivery ──────────────────────────────────────────────────────

/// Decorator that forwards layout events only while `predicate()` holds.
///
/// The predicate is evaluated at delivery time, not at subscription time, so
/// one long-lived subscription can be muted and unmuted without ever being
/// removed from the underlying source.
pub struct Conditional<'a, S: LayoutSource + ?Sized> {
    source: &'a mut S,
    predicate: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl<'a, S: LayoutSource + ?Sized> Conditional<'a, S> {
    pub fn new<P>(source: &'a mut S, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            source,
            predicate: Arc::new(predicate),
        }
    }
}

impl<S: LayoutSource + ?Sized> LayoutSource for Conditional<'_, S> {
    fn subscribe(&mut self, mut handler: LayoutHandler) -> SubscriptionId {
        let predicate = Arc::clone(&self.predicate);
        self.source.subscribe(Box::new(move |layout: &Layout| {
            if predicate() {
                handler(layout);
            }
        }))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.source.unsubscribe(id)
    }

    fn get(&self) -> Layout {
        self.source.get()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::display::{DisplayKind, Resolution};
    use crate::domain::layout::MAX_EXTENT;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn display(id: &str, w: u32, h: u32) -> LogicalDisplay {
        LogicalDisplay::new(
            DisplayId::new(id),
            DisplayKind::Matrix,
            Resolution::new(w, h).unwrap(),
        )
    }

    /// Subscribes a handler that records every layout it is called with.
    fn record(registry: &mut impl LayoutSource) -> Arc<Mutex<Vec<Layout>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe(Box::new(move |l: &Layout| sink.lock().unwrap().push(l.clone())));
        seen
    }

    #[test]
    fn test_add_at_right_edge_places_displays_side_by_side() {
        // Arrange
        let mut registry = LayoutRegistry::new();

        // Act
        registry.add_at_right_edge(display("D1", 64, 64));
        registry.add_at_right_edge(display("D2", 64, 64));

        // Assert
        let layout = registry.get();
        assert_eq!(layout.get(&DisplayId::new("D1")).unwrap().position, Position::new(0, 0));
        assert_eq!(layout.get(&DisplayId::new("D2")).unwrap().position, Position::new(64, 0));
    }

    #[test]
    fn test_add_duplicate_id_is_noop_without_notification() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        registry.add(display("A", 8, 8), Position::ORIGIN);
        let seen = record(&mut registry);

        // Act
        let added = registry.add(display("A", 16, 16), Position::new(100, 0));

        // Assert
        assert!(!added);
        assert_eq!(registry.layout().len(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop_without_notification() {
        let mut registry = LayoutRegistry::new();
        let seen = record(&mut registry);

        assert!(!registry.remove(&DisplayId::new("missing")));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_move_absent_is_noop() {
        let mut registry = LayoutRegistry::new();
        assert!(!registry.move_display(&DisplayId::new("missing"), Position::new(1, 1)));
    }

    #[test]
    fn test_move_past_the_limit_is_rejected_without_notification() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        registry.add_at_right_edge(display("A", 8, 8));
        registry.add_at_right_edge(display("B", 8, 8));
        let seen = record(&mut registry);

        // Act: twice, so the second call sees the first one's outcome
        let first = registry.move_display(&DisplayId::new("B"), Position::new(u32::MAX, 0));
        let second = registry.move_display(&DisplayId::new("B"), Position::new(u32::MAX, 0));

        // Assert
        assert!(!first);
        assert!(!second);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(registry.layout().bounds().width, 16);
    }

    #[test]
    fn test_add_past_the_limit_is_rejected() {
        let mut registry = LayoutRegistry::new();

        let added = registry.add(display("A", 8, 8), Position::new(MAX_EXTENT, 0));

        assert!(!added);
        assert!(registry.layout().is_empty());
    }

    #[test]
    fn test_remove_renormalizes_remaining_displays() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        registry.add_at_right_edge(display("A", 64, 64));
        registry.add_at_right_edge(display("B", 64, 64));

        // Act
        registry.remove(&DisplayId::new("A"));

        // Assert
        let b = registry.get().get(&DisplayId::new("B")).cloned().unwrap();
        assert_eq!(b.position, Position::ORIGIN);
    }

    #[test]
    fn test_add_with_offset_is_normalized() {
        let mut registry = LayoutRegistry::new();
        registry.add(display("A", 8, 8), Position::new(40, 12));
        assert_eq!(registry.get().get(&DisplayId::new("A")).unwrap().position, Position::ORIGIN);
    }

    #[test]
    fn test_handler_receives_new_layout() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        let seen = record(&mut registry);

        // Act
        registry.add_at_right_edge(display("A", 8, 8));

        // Assert
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(&DisplayId::new("A")));
    }

    #[test]
    fn test_every_mutation_notifies_without_coalescing() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        let seen = record(&mut registry);

        // Act
        registry.add_at_right_edge(display("A", 8, 8));
        registry.add_at_right_edge(display("B", 8, 8));
        registry.move_display(&DisplayId::new("B"), Position::new(0, 8));

        // Assert
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = registry.subscribe(Box::new(move |_: &Layout| *c.lock().unwrap() += 1));

        // Act
        registry.add_at_right_edge(display("A", 8, 8));
        assert!(registry.unsubscribe(id));
        registry.add_at_right_edge(display("B", 8, 8));

        // Assert
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!registry.unsubscribe(id), "second unsubscribe must report unknown id");
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_writes() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        registry.add_at_right_edge(display("A", 8, 8));
        let snapshot = registry.get();

        // Act
        registry.add_at_right_edge(display("B", 8, 8));

        // Assert
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_conditional_delivers_only_while_predicate_holds() {
        // Arrange
        let mut registry = LayoutRegistry::new();
        let enabled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&enabled);
        let seen = record(&mut Conditional::new(&mut registry, move || {
            flag.load(Ordering::SeqCst)
        }));

        // Act: one change while muted, one while unmuted
        registry.add_at_right_edge(display("A", 8, 8));
        enabled.store(true, Ordering::SeqCst);
        registry.add_at_right_edge(display("B", 8, 8));

        // Assert
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2);
    }
}
