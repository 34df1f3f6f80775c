//! Signal detectors
//!
//! The only detector shipped is the 5-bar rally exhaustion pattern; the shared
//! rounding and percent-change helpers live in [`helpers`] because the rollup
//! reuses them.

pub mod exhaustion;
pub mod helpers;

pub use exhaustion::*;
pub use helpers::*;
