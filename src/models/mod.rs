pub mod filter_set;
pub mod heuristics;
pub mod loaders;

pub use filter_set::{translate_job_type, FilterSet};
pub use heuristics::{ApplyProbe, Heuristics, ProbeKind, Timings};
pub use loaders::{load_filter_file, load_heuristics, parse_filters};
