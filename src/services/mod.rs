pub mod application_log;
pub mod classifier;
pub mod highlight;
pub mod popup;
pub mod resilience;

pub use application_log::ApplicationLog;
pub use classifier::{Classification, EasyApplyClassifier, Evidence, Signal};
pub use highlight::highlight;
pub use popup::PopupDismisser;
pub use resilience::RetryPolicy;
