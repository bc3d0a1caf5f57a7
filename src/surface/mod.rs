//! Control surface - level mapping, button indicators and the console table

pub mod indicators;
pub mod level;
pub mod view;

pub use indicators::{ButtonDef, ButtonStatus};
pub use level::{fraction_across, fraction_to_gain, LevelControl, LevelWrite};
pub use view::{render_table, ViewOptions};
