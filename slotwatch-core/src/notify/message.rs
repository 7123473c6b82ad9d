use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

pub const RETRY_ESCALATION_MESSAGE: &str = "The Driving Test Checker encountered an error while attempting to click the button. The website structure might have changed. Please check the website for any unusual behavior.";

pub const STRUCTURE_CHANGED_MESSAGE: &str = "The Driving Test Checker encountered an error. The website structure might have changed. Please check the website for any unusual behavior.";

pub const TEST_MESSAGE: &str = "This is a test email from the Driving Test Checker application.";

pub fn availability_message(target_location: &str, detail: &str) -> String {
    format!(
        "Driving test slots are available in {target_location}! Log in now to book!\nSite Text: {detail}"
    )
}

#[derive(Debug, Clone)]
pub struct EmailMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

impl EmailMessage<'_> {
    pub fn render(&self) -> String {
        [
            format!("From: {}", self.from),
            format!("To: {}", self.to),
            "Content-Type: text/plain; charset=utf-8".to_string(),
            "MIME-Version: 1.0".to_string(),
            format!("Subject: {}", encode_subject(self.subject)),
            String::new(),
            self.body.to_string(),
        ]
        .join("\r\n")
    }
}

/// RFC 2047 encoded-word so non-ASCII subjects survive transport.
pub fn encode_subject(subject: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(subject.as_bytes()))
}

pub fn encode_raw(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}
