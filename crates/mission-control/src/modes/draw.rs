//! `draw`: a shared paint canvas, one RGBA buffer per display.
//!
//! Clients paint in layout (global) coordinates.  Each painted pixel is
//! mapped onto whichever display covers it; pixels that fall between
//! displays are ignored.  Canvases survive layout changes as long as their
//! display stays in the layout with the same resolution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mission_core::{DisplayId, Frame, Layout, PixelBuffer, Privilege};

use crate::application::channel_router::ChannelSpec;
use crate::application::mode_coordinator::{Mode, ModeBroadcaster};

pub const NAME: &str = "draw";
pub const PAINT: &str = "paint";
pub const CLEAR: &str = "clear";

/// Payload of the `paint` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintCommand {
    pub pixels: Vec<[u32; 2]>,
    pub color: [u8; 3],
}

type Canvases = Arc<Mutex<HashMap<DisplayId, PixelBuffer>>>;

pub struct DrawMode {
    broadcaster: ModeBroadcaster,
    canvases: Canvases,
}

impl DrawMode {
    pub fn new(broadcaster: ModeBroadcaster) -> Self {
        Self {
            broadcaster,
            canvases: Arc::default(),
        }
    }
}

impl Mode for DrawMode {
    fn start(&self, layout: &Layout) {
        let mut canvases = lock(&self.canvases);
        canvases.clear();
        sync_canvases(&mut canvases, layout);
    }

    fn stop(&self) {}

    fn render(&self, _layout: &Layout) -> Frame {
        let canvases = lock(&self.canvases);
        let mut frame = Frame::new();
        for (id, canvas) in canvases.iter() {
            frame.insert(id.clone(), canvas.clone());
        }
        frame
    }

    fn channels(&self) -> Vec<ChannelSpec> {
        let canvases = Arc::clone(&self.canvases);
        let broadcaster = self.broadcaster.clone();
        let paint = ChannelSpec::json(PAINT, Privilege::Player, move |cmd: PaintCommand, ctx| {
            let painted = apply_paint(&mut lock(&canvases), ctx.layout().layout(), &cmd);
            debug!(painted, requested = cmd.pixels.len(), "paint applied");
            match serde_json::to_value(&cmd) {
                Ok(v) => {
                    broadcaster.broadcast(PAINT, v);
                }
                Err(e) => warn!("failed to encode paint command: {e}"),
            }
        });

        let canvases = Arc::clone(&self.canvases);
        let clear = ChannelSpec::json(CLEAR, Privilege::Admin, move |_: serde_json::Value, _ctx| {
            for canvas in lock(&canvases).values_mut() {
                canvas.fill([0, 0, 0, 0]);
            }
        });

        vec![paint, clear]
    }

    fn on_layout_changed(&self, layout: &Layout) {
        sync_canvases(&mut lock(&self.canvases), layout);
    }
}

fn lock(canvases: &Canvases) -> std::sync::MutexGuard<'_, HashMap<DisplayId, PixelBuffer>> {
    canvases.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops canvases whose display left the layout (or changed size) and
/// creates blank ones for new displays.
fn sync_canvases(canvases: &mut HashMap<DisplayId, PixelBuffer>, layout: &Layout) {
    canvases.retain(|id, canvas| {
        layout
            .get(id)
            .is_some_and(|p| p.display.resolution == canvas.resolution())
    });
    for placement in layout {
        canvases
            .entry(placement.display.id.clone())
            .or_insert_with(|| PixelBuffer::new(placement.display.resolution));
    }
}

/// Applies `cmd` and returns how many display pixels changed.
fn apply_paint(canvases: &mut HashMap<DisplayId, PixelBuffer>, layout: &Layout, cmd: &PaintCommand) -> usize {
    let [r, g, b] = cmd.color;
    let mut painted = 0;
    for &[x, y] in &cmd.pixels {
        for (placement, lx, ly) in layout.locate(x, y) {
            if let Some(canvas) = canvases.get_mut(&placement.display.id) {
                if canvas.put_pixel(lx, ly, [r, g, b, 255]) {
                    painted += 1;
                }
            }
        }
    }
    painted
}

// ── Tests ─────────────────────────────────────────────────────────────────────
