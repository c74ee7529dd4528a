//! Coarse privilege tag carried by every connection.

use serde::{Deserialize, Serialize};

/// What a connection is allowed to do.  `Admin > Player`.
///
/// The variant order matters: the derived `Ord` ranks later variants higher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    #[default]
    Player,
    Admin,
}

impl Privilege {
    /// Returns `true` if this privilege satisfies `required`.
    pub fn permits(self, required: Privilege) -> bool {
        self >= required
    }
}
