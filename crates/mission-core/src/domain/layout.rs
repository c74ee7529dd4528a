//! Layout domain entity.
//!
//! A layout places every logical display in one shared 2-D coordinate space
//! ("layout space").  The origin is the top-left corner, `x` grows to the
//! right and `y` grows downwards.  Displays are axis-aligned rectangles;
//! overlap is legal.
//!
//! # Why normalise? (for beginners)
//!
//! Displays get added, removed and dragged around at runtime.  If the
//! left-most display is removed, every remaining display would sit some
//! distance away from `x = 0` and that empty margin would grow with each
//! change.  [`Layout::normalized`] shifts everything back so the smallest
//! `x` and the smallest `y` are both 0.  The registry applies it after every
//! mutation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::display::{DisplayId, LogicalDisplay};

/// Largest right or bottom edge a display may reach in layout space.
pub const MAX_EXTENT: u32 = 1 << 16;

/// Errors that can occur when building a layout.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    /// The same display id appears more than once.
    #[error("display {0} appears more than once in the layout")]
    DuplicateDisplay(DisplayId),

    /// The referenced display is not part of the layout.
    #[error("display not found: {0}")]
    DisplayNotFound(DisplayId),

    /// The display would extend past [`MAX_EXTENT`].
    #[error("display {id} at ({x}, {y}) extends past the layout limit of {MAX_EXTENT}")]
    OutOfRange { id: DisplayId, x: u32, y: u32 },
}

/// Top-left corner of a display in layout space.
///
/// Serialised as an `[x, y]` JSON array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for Position {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (u32, u32) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

/// Size of the smallest rectangle enclosing every display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

/// One display and where it sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub display: LogicalDisplay,
    pub position: Position,
}

impl Placement {
    pub fn new(display: LogicalDisplay, position: Position) -> Self {
        Self { display, position }
    }

    /// Right edge in layout space (exclusive), saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.position.x.saturating_add(self.display.resolution.width())
    }

    /// Bottom edge in layout space (exclusive), saturating at `u32::MAX`.
    pub fn bottom(&self) -> u32 {
        self.position.y.saturating_add(self.display.resolution.height())
    }

    /// Checks that both edges stay within [`MAX_EXTENT`].
    ///
    /// # Errors
    ///
    /// [`LayoutError::OutOfRange`] naming the display and position.
    pub fn check_extent(&self) -> Result<(), LayoutError> {
        if self.right() <= MAX_EXTENT && self.bottom() <= MAX_EXTENT {
            Ok(())
        } else {
            Err(LayoutError::OutOfRange {
                id: self.display.id.clone(),
                x: self.position.x,
                y: self.position.y,
            })
        }
    }

    /// Converts a layout-space point into this display's local coordinates,
    /// or `None` if the point falls outside the display.
    pub fn to_local(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        if x >= self.position.x && x < self.right() && y >= self.position.y && y < self.bottom() {
            Some((x - self.position.x, y - self.position.y))
        } else {
            None
        }
    }
}

/// An immutable arrangement of displays.
///
/// Display ids are unique within a layout.  Iteration follows insertion
/// order, which carries no meaning beyond making tests stable.
///
/// Serialised as a JSON array of placements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Placement>", into = "Vec<Placement>")]
pub struct Layout {
    placements: Vec<Placement>,
}

impl Layout {
    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a layout from placements, enforcing unique display ids and
    /// [`MAX_EXTENT`].
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::DuplicateDisplay`] for the first repeated id
    /// and [`LayoutError::OutOfRange`] for the first oversized placement.
    pub fn from_placements(placements: Vec<Placement>) -> Result<Self, LayoutError> {
        for (i, p) in placements.iter().enumerate() {
            if placements[..i].iter().any(|q| q.display.id == p.display.id) {
                return Err(LayoutError::DuplicateDisplay(p.display.id.clone()));
            }
            p.check_extent()?;
        }
        Ok(Self { placements })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Looks up a placement by display id.
    pub fn get(&self, id: &DisplayId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.display.id == id)
    }

    pub fn contains(&self, id: &DisplayId) -> bool {
        self.get(id).is_some()
    }

    /// Smallest enclosing rectangle, measured from the origin.
    ///
    /// `(max(x + width), max(y + height))` over every placement, and `(0, 0)`
    /// for an empty layout.
    pub fn bounds(&self) -> Bounds {
        self.placements.iter().fold(Bounds::default(), |b, p| Bounds {
            width: b.width.max(p.right()),
            height: b.height.max(p.bottom()),
        })
    }

    /// Returns a copy shifted so the minimum `x` and minimum `y` are both 0.
    pub fn normalized(&self) -> Layout {
        let min_x = self.placements.iter().map(|p| p.position.x).min().unwrap_or(0);
        let min_y = self.placements.iter().map(|p| p.position.y).min().unwrap_or(0);
        if min_x == 0 && min_y == 0 {
            return self.clone();
        }

        let placements = self
            .placements
            .iter()
            .map(|p| Placement {
                display: p.display.clone(),
                position: Position::new(p.position.x - min_x, p.position.y - min_y),
            })
            .collect();
        Layout { placements }
    }

    /// Every placement covering the layout-space point `(x, y)`, together
    /// with the point in that display's local coordinates.
    pub fn locate(&self, x: u32, y: u32) -> impl Iterator<Item = (&Placement, u32, u32)> {
        self.placements
            .iter()
            .filter_map(move |p| p.to_local(x, y).map(|(lx, ly)| (p, lx, ly)))
    }

    // ── Mutation helpers for the registry ───────────────────────────────────

    pub(crate) fn push(&mut self, placement: Placement) {
        self.placements.push(placement);
    }

    /// Drops every placement for `id`; returns `true` if any was removed.
    pub(crate) fn remove(&mut self, id: &DisplayId) -> bool {
        let before = self.placements.len();
        self.placements.retain(|p| &p.display.id != id);
        self.placements.len() != before
    }

    /// Replaces the position for `id`; returns `true` if found.
    pub(crate) fn set_position(&mut self, id: &DisplayId, position: Position) -> bool {
        match self.placements.iter_mut().find(|p| &p.display.id == id) {
            Some(p) => {
                p.position = position;
                true
            }
            None => false,
        }
    }
}

impl TryFrom<Vec<Placement>> for Layout {
    type Error = LayoutError;

    fn try_from(placements: Vec<Placement>) -> Result<Self, Self::Error> {
        Self::from_placements(placements)
    }
}

impl From<Layout> for Vec<Placement> {
    fn from(layout: Layout) -> Self {
        layout.placements
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = &'a Placement;
    type IntoIter = std::slice::Iter<'a, Placement>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::display::{DisplayKind, Resolution};

    fn display(id: &str, w: u32, h: u32) -> LogicalDisplay {
        LogicalDisplay::new(
            DisplayId::new(id),
            DisplayKind::Matrix,
            Resolution::new(w, h).unwrap(),
        )
    }

    fn layout_of(entries: &[(&str, u32, u32, u32, u32)]) -> Layout {
        Layout::from_placements(
            entries
                .iter()
                .map(|&(id, w, h, x, y)| Placement::new(display(id, w, h), Position::new(x, y)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_layout_bounds_are_zero() {
        assert_eq!(Layout::new().bounds(), Bounds { width: 0, height: 0 });
    }

    #[test]
    fn test_bounds_covers_every_display() {
        // Arrange
        let layout = layout_of(&[("A", 64, 64, 0, 0), ("B", 32, 16, 64, 80)]);

        // Act
        let bounds = layout.bounds();

        // Assert
        assert_eq!(bounds, Bounds { width: 96, height: 96 });
    }

    #[test]
    fn test_normalized_shifts_minimum_to_origin() {
        // Arrange
        let layout = layout_of(&[("A", 8, 8, 10, 20), ("B", 8, 8, 30, 5)]);

        // Act
        let n = layout.normalized();

        // Assert
        assert_eq!(n.get(&DisplayId::new("A")).unwrap().position, Position::new(0, 15));
        assert_eq!(n.get(&DisplayId::new("B")).unwrap().position, Position::new(20, 0));
    }

    #[test]
    fn test_normalized_is_identity_for_normal_layout() {
        let layout = layout_of(&[("A", 8, 8, 0, 0), ("B", 8, 8, 8, 3)]);
        assert_eq!(layout.normalized(), layout);
    }

    #[test]
    fn test_from_placements_rejects_duplicate_ids() {
        // Arrange
        let placements = vec![
            Placement::new(display("A", 8, 8), Position::ORIGIN),
            Placement::new(display("A", 16, 16), Position::new(8, 0)),
        ];

        // Act
        let result = Layout::from_placements(placements);

        // Assert
        assert_eq!(result, Err(LayoutError::DuplicateDisplay(DisplayId::new("A"))));
    }

    #[test]
    fn test_locate_returns_local_coordinates() {
        // Arrange
        let layout = layout_of(&[("A", 64, 64, 0, 0), ("B", 64, 64, 64, 0)]);

        // Act
        let hits: Vec<_> = layout
            .locate(70, 3)
            .map(|(p, x, y)| (p.display.id.as_str().to_string(), x, y))
            .collect();

        // Assert
        assert_eq!(hits, vec![("B".to_string(), 6, 3)]);
    }

    #[test]
    fn test_locate_outside_every_display_is_empty() {
        let layout = layout_of(&[("A", 64, 64, 0, 0)]);
        assert_eq!(layout.locate(64, 0).count(), 0);
    }

    #[test]
    fn test_layout_wire_format() {
        // Arrange
        let layout = layout_of(&[("A", 64, 32, 0, 0)]);

        // Act
        let json = serde_json::to_value(&layout).unwrap();

        // Assert
        assert_eq!(
            json,
            serde_json::json!([{
                "display": { "id": "A", "kind": "matrix", "resolution": [64, 32] },
                "position": [0, 0]
            }])
        );
    }

    #[test]
    fn test_layout_deserialize_rejects_duplicates() {
        let json = r#"[
            {"display":{"id":"A","kind":"matrix","resolution":[1,1]},"position":[0,0]},
            {"display":{"id":"A","kind":"strip","resolution":[1,1]},"position":[1,0]}
        ]"#;
        assert!(serde_json::from_str::<Layout>(json).is_err());
    }

    #[test]
    fn test_edges_saturate_instead_of_overflowing() {
        // Arrange
        let p = Placement::new(display("A", 8, 8), Position::new(u32::MAX, u32::MAX - 1));

        // Act / Assert
        assert_eq!(p.right(), u32::MAX);
        assert_eq!(p.bottom(), u32::MAX);
        assert_eq!(p.to_local(u32::MAX - 1, 0), None);
    }

    #[test]
    fn test_check_extent_rejects_positions_past_the_limit() {
        let inside = Placement::new(display("A", 8, 8), Position::new(MAX_EXTENT - 8, 0));
        let outside = Placement::new(display("A", 8, 8), Position::new(MAX_EXTENT - 7, 0));
        let overflow = Placement::new(display("A", 8, 8), Position::new(u32::MAX, 0));

        assert_eq!(inside.check_extent(), Ok(()));
        assert!(matches!(outside.check_extent(), Err(LayoutError::OutOfRange { .. })));
        assert!(matches!(overflow.check_extent(), Err(LayoutError::OutOfRange { .. })));
    }

    #[test]
    fn test_layout_deserialize_rejects_out_of_range_position() {
        let json = r#"[
            {"display":{"id":"A","kind":"matrix","resolution":[8,8]},"position":[4294967295,0]}
        ]"#;
        assert!(serde_json::from_str::<Layout>(json).is_err());
    }

    #[test]
    fn test_remove_drops_matching_entries() {
        // Arrange
        let mut layout = layout_of(&[("A", 8, 8, 0, 0), ("B", 8, 8, 8, 0)]);

        // Act
        let removed = layout.remove(&DisplayId::new("A"));

        // Assert
        assert!(removed);
        assert_eq!(layout.len(), 1);
        assert!(!layout.remove(&DisplayId::new("A")));
    }
}
