mod automation;
mod chromium;
mod error;
mod executor;
mod profile;

pub use automation::{BrowserAutomation, BrowserContext, BrowserLauncher, ViewportSpec};
pub use chromium::{ChromiumSession, ChromiumSessionFactory};
pub use error::{BrowserError, BrowserResult};
pub use executor::{
    extraction_script, ClickTarget, DomPredicate, ExtractedRecord, FieldSelector,
    NavigationMarker, PageStepExecutor, SessionFactory,
};
pub use profile::BrowserProfile;
