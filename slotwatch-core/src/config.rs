use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const USERNAME_ENV: &str = "SLOTWATCH_USERNAME";
pub const PASSWORD_ENV: &str = "SLOTWATCH_PASSWORD";
pub const OTP_SECRET_ENV: &str = "SLOTWATCH_OTP_SECRET";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SlotwatchConfig {
    pub portal: PortalSection,
    pub chromium: ChromiumSection,
    pub timeouts: TimeoutSection,
    pub selectors: SelectorSection,
    pub notifier: NotifierSection,
    pub schedule: ScheduleSection,
    pub diagnostics: DiagnosticsSection,
}

impl SlotwatchConfig {
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.portal.entry_url).map_err(|err| {
            ConfigError::Invalid(format!(
                "portal.entry_url {:?} is not a valid url: {err}",
                self.portal.entry_url
            ))
        })?;
        if self.portal.queue_domain.trim().is_empty() {
            return Err(ConfigError::Invalid("portal.queue_domain is empty".into()));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "schedule.interval_minutes must be positive".into(),
            ));
        }
        if let Some(name) = self.selectors.first_empty() {
            return Err(ConfigError::Invalid(format!("selectors.{name} is empty")));
        }
        Ok(())
    }
}

/// Relative paths in the config are taken from the config file's directory.
pub fn resolve_path<P: AsRef<Path>>(base_dir: &Path, candidate: P) -> PathBuf {
    let path = candidate.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSection {
    pub entry_url: String,
    pub queue_domain: String,
    /// Used in the notification text only; extraction does not filter by it.
    pub target_location: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
    pub window_size: [u32; 2],
    pub viewport_jitter_pixels: u32,
}

/// Per-step bounded waits. All values are seconds unless the name says otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    pub navigation_seconds: u64,
    pub queue_detect_seconds: u64,
    pub queue_wait_seconds: u64,
    pub optional_screen_seconds: u64,
    pub entry_point_seconds: u64,
    pub confirmation_seconds: u64,
    pub confirmation_navigation_seconds: u64,
    pub credential_fields_seconds: u64,
    pub one_time_code_seconds: u64,
    pub post_login_navigation_seconds: u64,
    pub advance_settle_seconds: u64,
    pub advance_buttons_seconds: u64,
    pub advance_navigation_seconds: u64,
    pub continue_button_seconds: u64,
    pub location_menu_seconds: u64,
    pub menu_settle_seconds: u64,
    pub menu_poll_millis: u64,
}

impl TimeoutSection {
    pub fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    pub fn menu_poll(&self) -> Duration {
        Duration::from_millis(self.menu_poll_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSection {
    pub cookie_consent: String,
    pub welcome_dismiss: String,
    pub federated_login: String,
    pub confirmation_button: String,
    pub confirmation_text: String,
    pub username_field: String,
    pub password_field: String,
    pub login_submit: String,
    pub one_time_code_field: String,
    pub action_button: String,
    pub location_menu: String,
    pub menu_container: String,
    pub menu_item: String,
    pub location_name: String,
    pub location_availability: String,
}

impl SelectorSection {
    fn first_empty(&self) -> Option<&'static str> {
        [
            ("cookie_consent", &self.cookie_consent),
            ("welcome_dismiss", &self.welcome_dismiss),
            ("federated_login", &self.federated_login),
            ("confirmation_button", &self.confirmation_button),
            ("confirmation_text", &self.confirmation_text),
            ("username_field", &self.username_field),
            ("password_field", &self.password_field),
            ("login_submit", &self.login_submit),
            ("one_time_code_field", &self.one_time_code_field),
            ("action_button", &self.action_button),
            ("location_menu", &self.location_menu),
            ("menu_container", &self.menu_container),
            ("menu_item", &self.menu_item),
            ("location_name", &self.location_name),
            ("location_availability", &self.location_availability),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierSection {
    pub client_secret_path: String,
    pub token_path: String,
    pub to: String,
    pub from: String,
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    pub interval_minutes: u64,
    pub run_on_start: bool,
}

impl ScheduleSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsSection {
    pub screenshot_path: String,
}

/// Login material for the federated identity provider. Supplied once per
/// process and never mutated.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: SecretString,
    pub password: SecretString,
    pub otp_secret: SecretString,
}

impl Credentials {
    pub fn new(username: &str, password: &str, otp_secret: &str) -> Self {
        Self {
            username: SecretString::new(username.to_string()),
            password: SecretString::new(password.to_string()),
            otp_secret: SecretString::new(otp_secret.to_string()),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            username: SecretString::new(read_env(USERNAME_ENV)?),
            password: SecretString::new(read_env(PASSWORD_ENV)?),
            otp_secret: SecretString::new(read_env(OTP_SECRET_ENV)?),
        })
    }
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(name.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Scheduled,
    Once,
    TestNotification,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunMode::Scheduled => "scheduled",
            RunMode::Once => "once",
            RunMode::TestNotification => "test-notification",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "scheduled" => Ok(RunMode::Scheduled),
            "once" => Ok(RunMode::Once),
            "test-notification" | "test" => Ok(RunMode::TestNotification),
            other => Err(ConfigError::Invalid(format!("invalid run mode: {other}"))),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SlotwatchConfig> {
    let config: SlotwatchConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn fixture_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/slotwatch.toml")
    }

    #[test]
    fn load_fixture_config() {
        let config = load_config(fixture_path()).expect("config should parse");
        assert_eq!(config.portal.queue_domain, "rsaie.queue-it.net");
        assert_eq!(config.selectors.federated_login, "button#myGov");
        assert_eq!(config.timeouts.location_menu_seconds, 60);
        assert_eq!(config.schedule.interval_minutes, 15);
        assert!(config.chromium.headless);
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = load_config(fixture_path()).unwrap();
        config.schedule.interval_minutes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_selector() {
        let mut config = load_config(fixture_path()).unwrap();
        config.selectors.menu_item = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("selectors.menu_item"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/slotwatch.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/slotwatch.toml"));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let base = Path::new("/etc/slotwatch");
        assert_eq!(
            resolve_path(base, "token.json"),
            PathBuf::from("/etc/slotwatch/token.json")
        );
        assert_eq!(
            resolve_path(base, "/var/lib/token.json"),
            PathBuf::from("/var/lib/token.json")
        );
    }

    #[test]
    fn run_mode_parses_aliases() {
        assert_eq!("once".parse::<RunMode>().unwrap(), RunMode::Once);
        assert_eq!("TEST".parse::<RunMode>().unwrap(), RunMode::TestNotification);
        assert!("forever".parse::<RunMode>().is_err());
        assert_eq!(RunMode::TestNotification.to_string(), "test-notification");
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials::new("driver@example.ie", "hunter2", "JBSWY3DPEHPK3PXP");
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("driver@example.ie"));
        assert_eq!(credentials.password.expose_secret(), "hunter2");
    }
}
