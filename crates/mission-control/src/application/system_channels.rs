//! Global channels that exist regardless of the active mode.
//!
//! | channel  | privilege | payload                        |
//! |----------|-----------|--------------------------------|
//! | `ping`   | Player    | anything, echoed back as `pong`|
//! | `mode`   | Admin     | name of a registered mode      |
//! | `layout` | Admin     | `{ "id": .., "position": [x, y] }` |

use serde::Deserialize;
use serde_json::Value;

use mission_core::{DisplayId, Envelope, Placement, Position, Privilege};

use super::channel_router::ChannelSpec;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const MODE: &str = "mode";
pub const LAYOUT: &str = "layout";

/// Replies `{channel: "pong", message: <same>}` to the sender only.
pub fn ping() -> ChannelSpec {
    ChannelSpec::json(PING, Privilege::Player, |message: Value, ctx| {
        ctx.reply(&Envelope::global(PONG, message));
    })
}

/// Requests a switch to the named mode.  The name must be one of `modes`.
pub fn mode(modes: Vec<String>) -> ChannelSpec {
    ChannelSpec::new(
        MODE,
        Privilege::Admin,
        move |message, _ctx| {
            let name: String = serde_json::from_value(message).map_err(|e| e.to_string())?;
            if modes.contains(&name) {
                Ok(name)
            } else {
                Err(format!("unknown mode {name:?}"))
            }
        },
        |name: String, ctx| ctx.request_switch(name),
    )
}

/// Payload of the `layout` channel.
#[derive(Debug, Deserialize)]
pub struct MoveDisplay {
    pub id: DisplayId,
    pub position: Position,
}

/// Moves one display.  The id must be in the current layout and the new
/// position must keep it within the layout limit.
pub fn layout() -> ChannelSpec {
    ChannelSpec::new(
        LAYOUT,
        Privilege::Admin,
        |message, ctx| {
            let cmd: MoveDisplay = serde_json::from_value(message).map_err(|e| e.to_string())?;
            let Some(current) = ctx.layout().layout().get(&cmd.id) else {
                return Err(format!("unknown display {}", cmd.id));
            };
            Placement::new(current.display.clone(), cmd.position)
                .check_extent()
                .map_err(|e| e.to_string())?;
            Ok(cmd)
        },
        |cmd: MoveDisplay, ctx| {
            ctx.layout_mut().move_display(&cmd.id, cmd.position);
        },
    )
}
