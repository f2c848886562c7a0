//! Browser infrastructure for launching, connecting to and managing Chrome instances

mod wrapper;

pub use wrapper::{BrowserWrapper, connect_browser, find_target_page, launch_browser};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("DevTools command failed: {0}")]
    Cdp(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
