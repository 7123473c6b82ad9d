pub mod browser;
pub mod checker;
pub mod config;
pub mod error;
pub mod notify;
pub mod otp;
pub mod runner;
pub mod scheduler;

pub use browser::{
    BrowserError, BrowserLauncher, BrowserResult, ChromiumSessionFactory, PageStepExecutor,
    SessionFactory,
};
pub use checker::{
    AvailabilityChecker, CheckError, CheckResult, CheckerMetrics, MetricsHandle, RunOutcome,
    RunReport, Step,
};
pub use config::{load_config, Credentials, RunMode, SlotwatchConfig};
pub use error::{ConfigError, Result};
pub use notify::{GmailNotifier, Notifier, NotifyError, NotifyResult};
pub use otp::{OneTimeCodeGenerator, OtpError, TotpGenerator};
pub use runner::{execute, Execution};
pub use scheduler::Scheduler;
