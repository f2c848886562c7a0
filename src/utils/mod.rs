// Shared browser utility modules
pub mod constants;
mod timeout;
mod wait_for_element;

pub use timeout::{validate_navigation_timeout, validate_wait_timeout};
pub use wait_for_element::{WaitOptions, wait_for, wait_for_element};
