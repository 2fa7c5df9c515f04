pub mod aggregator;
pub mod blame_attributor;
pub mod change_set;
pub mod collaborators;
pub mod color;
pub mod commit_resolver;
pub mod gate;
pub mod highlight_map;
pub mod line_tracker;
pub mod options;
pub mod render_throttle;

pub use aggregator::{AddCommitsReport, HighlightSession};
pub use gate::ConcurrencyGate;
pub use highlight_map::{FileKey, HighlightMap};
