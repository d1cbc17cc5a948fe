pub mod filter_loader;
pub mod heuristics_loader;

pub use filter_loader::{load_filter_file, parse_filters};
pub use heuristics_loader::load_heuristics;
