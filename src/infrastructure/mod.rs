pub mod chromium;
pub mod driver;
#[cfg(test)]
pub mod fake;
pub mod js_executor;

pub use chromium::ChromiumDriver;
pub use driver::{
    ActiveContext, ContextHandle, DriverError, DriverResult, ElementHandle, FailureKind, Locator,
    UiDriver, WaitCondition,
};
pub use driver::recoverable;
pub use js_executor::JsExecutor;
