//! Logical display entity.
//!
//! A [`LogicalDisplay`] is the stable, layout-level identity of a physical
//! lighting device.  The physical device may disconnect and be replaced by a
//! new handle, but the logical display (and therefore its place in the
//! layout) survives because identity is carried by [`DisplayId`] alone.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when constructing display values.
#[derive(Debug, Error, PartialEq)]
pub enum DisplayError {
    /// Width or height was zero.
    #[error("resolution must be at least 1x1, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },
}

/// Opaque, stable identifier of a logical display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(String);

impl DisplayId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh synthetic identifier.
    ///
    /// Uniqueness within one process lifetime is all that is required, so
    /// the first 12 hex digits of a UUID v4 are plenty.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(simple[..12].to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of lighting device behind a logical display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    /// A 2-D LED matrix.
    Matrix,
    /// A 1xN strip of LEDs.
    Strip,
}

/// Width and height of a display in pixels.  Both are always at least 1.
///
/// Serialised as a `[width, height]` JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a resolution.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::ZeroResolution`] if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, DisplayError> {
        if width == 0 || height == 0 {
            return Err(DisplayError::ZeroResolution { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels covered by this resolution.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl TryFrom<(u32, u32)> for Resolution {
    type Error = DisplayError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(r: Resolution) -> Self {
        (r.width, r.height)
    }
}

/// A logical display: the layout-level stand-in for one physical device.
///
/// Values are never mutated in place.  Two displays with the same `id` are
/// the same display even if the other fields differ; use [`same_display`]
/// for identity comparisons and `==` for full value equality.
///
/// [`same_display`]: LogicalDisplay::same_display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalDisplay {
    pub id: DisplayId,
    pub kind: DisplayKind,
    pub resolution: Resolution,
}

impl LogicalDisplay {
    pub fn new(id: DisplayId, kind: DisplayKind, resolution: Resolution) -> Self {
        Self {
            id,
            kind,
            resolution,
        }
    }

    /// Creates a matrix display with a freshly generated id.
    pub fn matrix(resolution: Resolution) -> Self {
        Self::new(DisplayId::generate(), DisplayKind::Matrix, resolution)
    }

    /// Returns `true` if `other` has the same identity.
    pub fn same_display(&self, other: &LogicalDisplay) -> bool {
        self.id == other.id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_rejects_zero_width() {
        assert_eq!(
            Resolution::new(0, 64),
            Err(DisplayError::ZeroResolution { width: 0, height: 64 })
        );
    }

    #[test]
    fn test_resolution_rejects_zero_height() {
        assert!(Resolution::new(64, 0).is_err());
    }

    #[test]
    fn test_resolution_pixel_count() {
        let r = Resolution::new(64, 32).unwrap();
        assert_eq!(r.pixel_count(), 2048);
    }

    #[test]
    fn test_resolution_serializes_as_pair() {
        let r = Resolution::new(64, 32).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "[64,32]");
    }

    #[test]
    fn test_resolution_deserialize_rejects_zero() {
        let result: Result<Resolution, _> = serde_json::from_str("[0,32]");
        assert!(result.is_err());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = DisplayId::generate();
        let b = DisplayId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn test_same_display_compares_identity_only() {
        // Arrange: same id, different resolution
        let id = DisplayId::new("A");
        let a = LogicalDisplay::new(id.clone(), DisplayKind::Matrix, Resolution::new(64, 64).unwrap());
        let b = LogicalDisplay::new(id, DisplayKind::Strip, Resolution::new(1, 300).unwrap());

        // Assert
        assert!(a.same_display(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DisplayKind::Matrix).unwrap(), "\"matrix\"");
        assert_eq!(serde_json::to_string(&DisplayKind::Strip).unwrap(), "\"strip\"");
    }
}
