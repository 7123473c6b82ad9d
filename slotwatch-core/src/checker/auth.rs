use secrecy::ExposeSecret;
use tracing::info;

use crate::browser::{BrowserError, ClickTarget};
use crate::config::{Credentials, SelectorSection, TimeoutSection};
use crate::otp::OneTimeCodeGenerator;

use super::session::{Session, Step};
use super::{missing_as, tolerate, CheckError, CheckResult};

/// Login sub-sequence: consent screens, federated hand-off, credentials and
/// the one-time code. Only the entry point, the credential form and its
/// submit button are required; every other screen is rendered conditionally
/// by the portal.
pub struct AuthenticationFlow<'a> {
    pub selectors: &'a SelectorSection,
    pub timeouts: &'a TimeoutSection,
    pub credentials: &'a Credentials,
    pub otp: &'a dyn OneTimeCodeGenerator,
}

impl AuthenticationFlow<'_> {
    pub async fn run(&self, session: &mut Session) -> CheckResult<()> {
        let sel = self.selectors;
        let t = self.timeouts;

        self.dismiss_optional(session, &sel.cookie_consent, "cookie consent")
            .await?;
        self.dismiss_optional(session, &sel.welcome_dismiss, "welcome dialog")
            .await?;
        session.advance(Step::ConsentDismissed);

        let entry_missing = missing_as(CheckError::LoginEntryPointMissing);
        session
            .page()
            .wait_for_selector(&sel.federated_login, TimeoutSection::secs(t.entry_point_seconds))
            .await
            .map_err(&entry_missing)?;
        let before_login = session.page().navigation_marker().await?;
        session
            .page()
            .click(&ClickTarget::selector(&sel.federated_login))
            .await
            .map_err(&entry_missing)?;
        info!("federated login started");

        let confirmation = session
            .page()
            .wait_for_selector(
                &sel.confirmation_button,
                TimeoutSection::secs(t.confirmation_seconds),
            )
            .await;
        if tolerate(confirmation, "login confirmation")? {
            let click = session
                .page()
                .click(&ClickTarget::with_text(
                    &sel.confirmation_button,
                    &sel.confirmation_text,
                ))
                .await;
            if tolerate(click, "login confirmation")? {
                info!("confirmed federated login dialog");
            }
        }
        let settled = session
            .page()
            .wait_for_navigation(
                &before_login,
                TimeoutSection::secs(t.confirmation_navigation_seconds),
            )
            .await;
        tolerate(settled, "identity provider navigation")?;
        session.advance(Step::FederatedLoginStarted);

        let field_missing = missing_as(CheckError::CredentialFieldMissing);
        session
            .page()
            .wait_for_selector(
                &sel.username_field,
                TimeoutSection::secs(t.credential_fields_seconds),
            )
            .await
            .map_err(&field_missing)?;
        session
            .page()
            .type_text(&sel.username_field, self.credentials.username.expose_secret())
            .await
            .map_err(&field_missing)?;
        session
            .page()
            .type_text(&sel.password_field, self.credentials.password.expose_secret())
            .await
            .map_err(&field_missing)?;

        session
            .page()
            .wait_for_selector(
                &sel.login_submit,
                TimeoutSection::secs(t.credential_fields_seconds),
            )
            .await?;
        let mut before_landing = session.page().navigation_marker().await?;
        session
            .page()
            .click(&ClickTarget::selector(&sel.login_submit))
            .await?;
        session.advance(Step::CredentialsEntered);
        info!("credentials submitted");

        let prompt = session
            .page()
            .wait_for_selector(
                &sel.one_time_code_field,
                TimeoutSection::secs(t.one_time_code_seconds),
            )
            .await;
        if tolerate(prompt, "one-time code prompt")? {
            let code = self.otp.generate(&self.credentials.otp_secret)?;
            // Entering the last digit submits the form.
            before_landing = session.page().navigation_marker().await?;
            session
                .page()
                .type_text(&sel.one_time_code_field, &code)
                .await
                .map_err(|err| match err {
                    BrowserError::ElementNotFound(_) => CheckError::CredentialFieldMissing(err),
                    other => CheckError::Browser(other),
                })?;
            info!("one-time code entered");
        } else {
            info!("no one-time code prompt; continuing");
        }
        session.advance(Step::TwoFactorEntered);

        let landed = session
            .page()
            .wait_for_navigation(
                &before_landing,
                TimeoutSection::secs(t.post_login_navigation_seconds),
            )
            .await;
        tolerate(landed, "post-login navigation")?;
        session.advance(Step::PostLoginNav);
        info!("logged in");
        Ok(())
    }

    async fn dismiss_optional(
        &self,
        session: &Session,
        selector: &str,
        label: &str,
    ) -> CheckResult<()> {
        let wait = TimeoutSection::secs(self.timeouts.optional_screen_seconds);
        if !tolerate(session.page().wait_for_selector(selector, wait).await, label)? {
            info!(step = label, "not shown");
            return Ok(());
        }
        if tolerate(
            session.page().click(&ClickTarget::selector(selector)).await,
            label,
        )? {
            info!(step = label, "dismissed");
        }
        Ok(())
    }
}
