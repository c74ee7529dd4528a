//! Built-in modes.
//!
//! - **`draw`** – Shared paint canvas, one buffer per display.
//! - **`pattern`** – Scrolling rainbow across the whole layout.
//!
//! [`builtin_modes`] turns the `[modes] enabled` list from the config file
//! into factories for [`MissionControl::new`].
//!
//! [`MissionControl::new`]: crate::application::mission_control::MissionControl::new

pub mod draw;
pub mod pattern;

use std::sync::Arc;

use crate::application::mode_coordinator::{Mode, ModeContext, ModeFactory, StartupError};

use self::draw::DrawMode;
use self::pattern::PatternMode;

/// Names of every built-in mode, in default registration order.
pub const BUILTIN: [&str; 2] = [draw::NAME, pattern::NAME];

/// Factories for the named built-in modes, in the order given.
///
/// # Errors
///
/// [`StartupError::UnknownBuiltinMode`] for a name that is not built in.
pub fn builtin_modes(enabled: &[String]) -> Result<Vec<(String, ModeFactory)>, StartupError> {
    enabled
        .iter()
        .map(|name| {
            let factory: ModeFactory = match name.as_str() {
                draw::NAME => Box::new(|ctx: ModeContext| Arc::new(DrawMode::new(ctx.broadcaster)) as Arc<dyn Mode>),
                pattern::NAME => {
                    Box::new(|ctx: ModeContext| Arc::new(PatternMode::new(ctx.broadcaster)) as Arc<dyn Mode>)
                }
                other => return Err(StartupError::UnknownBuiltinMode(other.to_string())),
            };
            Ok((name.clone(), factory))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_modes_keeps_requested_order() {
        let modes = builtin_modes(&["pattern".into(), "draw".into()]).unwrap();
        let names: Vec<_> = modes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["pattern", "draw"]);
    }

    #[test]
    fn test_builtin_modes_rejects_unknown_name() {
        let result = builtin_modes(&["draw".into(), "pong".into()]);
        assert!(matches!(result, Err(StartupError::UnknownBuiltinMode(n)) if n == "pong"));
    }
}
