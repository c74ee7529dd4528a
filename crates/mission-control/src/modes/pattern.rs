//! `pattern`: a scrolling rainbow test pattern across the whole layout.
//!
//! Each display renders its own rectangle of one layout-wide rainbow, using
//! its layout position as the column offset, so a stripe that leaves one
//! matrix continues on its neighbour.  Memory per tick is the sum of the
//! display sizes, whatever the gaps between them.  Useful for checking that
//! the layout matches the physical arrangement.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde_json::json;

use mission_core::{Frame, Layout, PixelBuffer, Privilege, Resolution};

use crate::application::channel_router::ChannelSpec;
use crate::application::mode_coordinator::{Mode, ModeBroadcaster};

pub const NAME: &str = "pattern";
pub const SPEED: &str = "speed";

/// Scroll rate at start, in pixels per second.
pub const DEFAULT_SPEED: f32 = 16.0;

/// Width in pixels of one full hue cycle.
const WAVELENGTH: u32 = 64;

#[derive(Debug)]
struct Scroll {
    speed: f32,
    phase: f32,
    last: Instant,
}

impl Scroll {
    fn new() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            phase: 0.0,
            last: Instant::now(),
        }
    }

    /// Advances the phase to `now` at the current speed.
    fn advance(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.phase = (self.phase + self.speed * dt) % WAVELENGTH as f32;
        self.last = now;
        self.phase
    }

    fn set_speed(&mut self, speed: f32, now: Instant) {
        self.advance(now);
        self.speed = speed;
    }
}

pub struct PatternMode {
    broadcaster: ModeBroadcaster,
    scroll: Arc<Mutex<Scroll>>,
}

impl PatternMode {
    pub fn new(broadcaster: ModeBroadcaster) -> Self {
        Self {
            broadcaster,
            scroll: Arc::new(Mutex::new(Scroll::new())),
        }
    }

    pub fn speed(&self) -> f32 {
        self.scroll.lock().unwrap_or_else(PoisonError::into_inner).speed
    }
}

impl Mode for PatternMode {
    fn start(&self, _layout: &Layout) {
        let mut scroll = self.scroll.lock().unwrap_or_else(PoisonError::into_inner);
        scroll.phase = 0.0;
        scroll.last = Instant::now();
    }

    fn stop(&self) {}

    fn render(&self, layout: &Layout) -> Frame {
        let phase = self
            .scroll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .advance(Instant::now());
        let mut frame = Frame::new();
        for placement in layout {
            frame.insert(
                placement.display.id.clone(),
                rainbow(placement.display.resolution, placement.position.x, phase),
            );
        }
        frame
    }

    fn channels(&self) -> Vec<ChannelSpec> {
        let scroll = Arc::clone(&self.scroll);
        let broadcaster = self.broadcaster.clone();
        vec![ChannelSpec::new(
            SPEED,
            Privilege::Admin,
            |message, _ctx| {
                let speed: f32 = serde_json::from_value(message).map_err(|e| e.to_string())?;
                if speed.is_finite() && speed >= 0.0 {
                    Ok(speed)
                } else {
                    Err(format!("speed must be a finite number >= 0, got {speed}"))
                }
            },
            move |speed: f32, _ctx| {
                scroll
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_speed(speed, Instant::now());
                broadcaster.broadcast(SPEED, json!(speed));
            },
        )]
    }
}

/// The `size` rectangle of a horizontal rainbow whose left edge sits at
/// layout column `origin_x`, shifted left by `phase` pixels.
fn rainbow(size: Resolution, origin_x: u32, phase: f32) -> PixelBuffer {
    let mut canvas = PixelBuffer::new(size);
    for x in 0..size.width() {
        let column = (u64::from(origin_x) + u64::from(x)) % u64::from(WAVELENGTH);
        let hue = ((column as f32 + phase) % WAVELENGTH as f32) / WAVELENGTH as f32;
        let [r, g, b] = hue_to_rgb(hue);
        for y in 0..size.height() {
            canvas.put_pixel(x, y, [r, g, b, 255]);
        }
    }
    canvas
}

/// Fully saturated, full value HSV to RGB.  `hue` is in `[0, 1)`.
fn hue_to_rgb(hue: f32) -> [u8; 3] {
    let h = hue.rem_euclid(1.0) * 6.0;
    let f = h.fract();
    let up = (f * 255.0).round() as u8;
    let down = 255 - up;
    match h as u32 {
        0 => [255, up, 0],
        1 => [down, 255, 0],
        2 => [0, 255, up],
        3 => [0, down, 255],
        4 => [up, 0, 255],
        _ => [255, 0, down],
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connections::ConnectionSet;
    use crate::application::mode_coordinator::ActiveMode;
    use mission_core::{DisplayId, DisplayKind, LogicalDisplay, Placement, Position, MAX_EXTENT};
    use std::time::Duration;

    fn placement(id: &str, w: u32, h: u32, x: u32, y: u32) -> Placement {
        Placement::new(
            LogicalDisplay::new(DisplayId::new(id), DisplayKind::Matrix, Resolution::new(w, h).unwrap()),
            Position::new(x, y),
        )
    }

    fn broadcaster() -> ModeBroadcaster {
        ModeBroadcaster::new(NAME, ActiveMode::new(), Arc::new(ConnectionSet::new()))
    }

    #[test]
    fn test_hue_wheel_primary_colors() {
        assert_eq!(hue_to_rgb(0.0), [255, 0, 0]);
        assert_eq!(hue_to_rgb(1.0 / 3.0), [0, 255, 0]);
        assert_eq!(hue_to_rgb(2.0 / 3.0), [0, 0, 255]);
    }

    #[test]
    fn test_rainbow_columns_are_uniform() {
        let canvas = rainbow(Resolution::new(8, 3).unwrap(), 0, 0.0);
        for x in 0..8 {
            let top = canvas.pixel(x, 0);
            assert_eq!(canvas.pixel(x, 1), top);
            assert_eq!(canvas.pixel(x, 2), top);
        }
        assert_eq!(canvas.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_per_display_render_matches_slicing_the_full_canvas() {
        // Arrange
        let layout = Layout::from_placements(vec![
            placement("A", 40, 4, 0, 0),
            placement("B", 30, 2, 40, 4),
        ])
        .unwrap();
        let full = rainbow(Resolution::new(70, 6).unwrap(), 0, 5.0);

        // Act
        let expected = Frame::from_canvas(&full, &layout);
        let rendered: Vec<_> = layout
            .iter()
            .map(|p| rainbow(p.display.resolution, p.position.x, 5.0))
            .collect();

        // Assert
        assert_eq!(expected.get(&DisplayId::new("A")), Some(&rendered[0]));
        assert_eq!(expected.get(&DisplayId::new("B")), Some(&rendered[1]));
    }

    #[test]
    fn test_render_allocates_only_display_sized_buffers() {
        // Arrange: one display far out in layout space
        let mode = PatternMode::new(broadcaster());
        let far = MAX_EXTENT - 8;
        let layout = Layout::from_placements(vec![
            placement("A", 8, 8, 0, 0),
            placement("B", 8, 8, far, far),
        ])
        .unwrap();

        // Act
        let frame = mode.render(&layout);

        // Assert
        assert_eq!(frame.len(), 2);
        let b = frame.get(&DisplayId::new("B")).unwrap();
        assert_eq!(b.resolution(), Resolution::new(8, 8).unwrap());
        assert_eq!(b.as_bytes().len(), 8 * 8 * 4);
    }

    #[test]
    fn test_render_of_empty_layout_is_empty() {
        let mode = PatternMode::new(broadcaster());
        assert!(mode.render(&Layout::new()).is_empty());
    }

    #[test]
    fn test_scroll_phase_accumulates_across_speed_changes() {
        // Arrange
        let t0 = Instant::now();
        let mut scroll = Scroll {
            speed: 10.0,
            phase: 0.0,
            last: t0,
        };

        // Act: 1 s at 10 px/s, then 2 s at 5 px/s
        scroll.set_speed(5.0, t0 + Duration::from_secs(1));
        let phase = scroll.advance(t0 + Duration::from_secs(3));

        // Assert
        assert!((phase - 20.0).abs() < 1e-3, "phase was {phase}");
    }

    #[test]
    fn test_zero_speed_freezes_pattern() {
        let t0 = Instant::now();
        let mut scroll = Scroll {
            speed: 0.0,
            phase: 7.0,
            last: t0,
        };
        assert_eq!(scroll.advance(t0 + Duration::from_secs(10)), 7.0);
    }
}
