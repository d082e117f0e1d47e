//! ewant report portal interactions: login, search, course entry, navigation.

use async_trait::async_trait;
use playwright::api::frame::FrameState;
use playwright::api::page::{Event, EventType};
use playwright::api::Page;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::crawler::CoursePortal;

/// Login entry point for the reporting portal.
const LOGIN_URL: &str = "https://report.ewant.org/Login";

/// Page markup is dumped here on unexpected browser faults.
const ERROR_PAGE_FILE: &str = "error_page.html";

/// CSS selectors for page elements. The site's markup is unversioned; any
/// change here breaks scraping either silently or as a wait timeout.
mod selectors {
    pub const AGREE_CHECKBOX: &str = "#agree";
    pub const USERNAME: &str = "input[name='user_email']";
    pub const PASSWORD: &str = "input[name='user_pw']";
    pub const SUBMIT: &str = "button[type='submit'], input[type='submit'], .btn-primary";
    pub const ERROR_SUMMARY: &str = ".validation-summary-errors";
    pub const SEARCH_BUTTON: &str = "button.btn-primary.hidden-xs";
    pub const SEARCH_INPUT: &str = "#fullname";
    pub const COURSE_TABLE: &str = ".table-responsive table";
    pub const COURSE_PANEL: &str = ".panel-heading";
    /// The summary link is only identifiable by its text.
    pub const SUMMARY_LINK: &str = "a:has-text('課程摘要')";
    pub const SUMMARY_TABLE: &str = ".panel-body table";
}

/// Bounded waits. Element waits are correctness waits; the settle delays are
/// deliberate pauses letting client-side rendering catch up after a click.
const ELEMENT_WAIT: Duration = Duration::from_secs(15);
const DIALOG_WAIT: Duration = Duration::from_secs(3);
const LOGIN_REDIRECT_WAIT: Duration = Duration::from_secs(10);
const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const CLICK_SETTLE: Duration = Duration::from_secs(2);
const BACK_SETTLE: Duration = Duration::from_secs(1);

/// Session-level failures, per the error taxonomy: bounded-wait timeouts,
/// site-reported validation errors (surfaced verbatim), and driver faults
/// (which dump the page for post-mortem inspection).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("{0}")]
    Site(String),
    #[error("browser fault during {step}: {message} (page saved to {ERROR_PAGE_FILE})")]
    Driver { step: &'static str, message: String },
}

/// Drives one logged-in browser page against the reporting portal.
pub struct SessionDriver {
    page: Page,
}

impl SessionDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Log in and land on the rendered course table.
    ///
    /// Handles the occasional pre-login alert (dismissed, then the login
    /// page is reloaded), ticks the terms checkbox if needed, submits the
    /// form and waits for the URL to leave the login page. A post-submit
    /// validation panel is surfaced verbatim as [`SessionError::Site`].
    pub async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        info!("navigating to login page");
        self.goto_login().await?;

        // The site sometimes greets with a native alert before the form is
        // usable. Unhandled dialogs are auto-dismissed by the driver;
        // afterwards the page state is unreliable, so reload the login page.
        if let Ok(Ok(Event::Dialog)) =
            timeout(DIALOG_WAIT, self.page.expect_event(EventType::Dialog)).await
        {
            info!("pre-login alert appeared, reloading login page");
            self.goto_login().await?;
        }

        self.wait_visible(selectors::AGREE_CHECKBOX, "terms checkbox")
            .await?;
        let tick = format!(
            r#"() => {{
                const box = document.querySelector('{}');
                if (box && !box.checked) {{ box.click(); return true; }}
                return false;
            }}"#,
            selectors::AGREE_CHECKBOX
        );
        let ticked: bool = self.eval("tick terms checkbox", &tick).await?;
        if ticked {
            debug!("terms checkbox was unchecked, ticked it");
        }

        info!("filling credentials for {}", credentials.username);
        self.fill(selectors::USERNAME, &credentials.username, "username field")
            .await?;
        self.fill(selectors::PASSWORD, &credentials.password, "password field")
            .await?;
        self.click(selectors::SUBMIT, "login submit button").await?;

        self.wait_for_login_redirect().await?;

        // Post-login: trigger the search so the course table renders.
        info!("login accepted, loading course table");
        self.click(selectors::SEARCH_BUTTON, "search button").await?;
        self.wait_visible(selectors::COURSE_TABLE, "course table")
            .await?;
        Ok(())
    }

    async fn goto_login(&self) -> Result<(), SessionError> {
        self.page
            .goto_builder(LOGIN_URL)
            .goto()
            .await
            .map_err(|e| self.driver_fault_sync("navigate to login page", e))?;
        Ok(())
    }

    /// Poll until the URL leaves the login page. On timeout, a rendered
    /// validation panel means bad credentials; otherwise a generic timeout.
    async fn wait_for_login_redirect(&self) -> Result<(), SessionError> {
        let deadline = tokio::time::Instant::now() + LOGIN_REDIRECT_WAIT;
        loop {
            let url: String = self
                .eval("read current url", "() => window.location.href")
                .await?;
            if url.trim_end_matches('/') != LOGIN_URL {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(URL_POLL_INTERVAL).await;
        }

        let probe = format!(
            r#"() => {{
                const el = document.querySelector('{}');
                return el ? el.innerText.trim() : null;
            }}"#,
            selectors::ERROR_SUMMARY
        );
        let summary: Option<String> = self.eval("read validation summary", &probe).await?;
        match summary.filter(|text| !text.is_empty()) {
            Some(text) => Err(SessionError::Site(text)),
            None => Err(SessionError::Timeout("login redirect")),
        }
    }

    /// Bounded visibility wait for a selector.
    async fn wait_visible(
        &self,
        selector: &str,
        what: &'static str,
    ) -> Result<(), SessionError> {
        let wait = self
            .page
            .wait_for_selector_builder(selector)
            .state(FrameState::Visible)
            .wait_for_selector();
        match timeout(ELEMENT_WAIT, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(self.driver_fault(what, e).await),
            Err(_) => Err(SessionError::Timeout(what)),
        }
    }

    async fn click(&self, selector: &str, what: &'static str) -> Result<(), SessionError> {
        match timeout(ELEMENT_WAIT, self.page.click_builder(selector).click()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.driver_fault(what, e).await),
            Err(_) => Err(SessionError::Timeout(what)),
        }
    }

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        what: &'static str,
    ) -> Result<(), SessionError> {
        match timeout(ELEMENT_WAIT, self.page.fill_builder(selector, value).fill()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.driver_fault(what, e).await),
            Err(_) => Err(SessionError::Timeout(what)),
        }
    }

    async fn eval<R: DeserializeOwned>(
        &self,
        what: &'static str,
        expression: &str,
    ) -> Result<R, SessionError> {
        self.page
            .evaluate::<(), R>(expression, ())
            .await
            .map_err(|e| self.driver_fault_sync(what, e))
    }

    /// Full page markup, used both for parsing and for fault dumps.
    async fn page_html(&self) -> Result<String, SessionError> {
        self.eval("capture page markup", "() => document.documentElement.outerHTML")
            .await
    }

    /// Record a driver-level fault, dumping the page markup for post-mortem.
    async fn driver_fault(
        &self,
        step: &'static str,
        error: impl std::fmt::Display,
    ) -> SessionError {
        if let Ok(html) = self.page_html().await {
            if let Err(io) = std::fs::write(ERROR_PAGE_FILE, html) {
                warn!("could not write {ERROR_PAGE_FILE}: {io}");
            }
        }
        SessionError::Driver {
            step,
            message: error.to_string(),
        }
    }

    /// Like [`Self::driver_fault`] without the page dump, for faults where
    /// the page itself is what failed to respond.
    fn driver_fault_sync(
        &self,
        step: &'static str,
        error: impl std::fmt::Display,
    ) -> SessionError {
        SessionError::Driver {
            step,
            message: error.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl CoursePortal for SessionDriver {
    /// Apply the optional search text and (re-)trigger the search, leaving
    /// the filtered course table rendered. Search state lives server-side,
    /// which is why later navigation goes through browser history.
    async fn search(&self, text: Option<&str>) -> anyhow::Result<()> {
        self.click(selectors::SEARCH_BUTTON, "search button").await?;
        tokio::time::sleep(CLICK_SETTLE).await;

        if let Some(text) = text {
            info!("applying course search: {text}");
            self.wait_visible(selectors::SEARCH_INPUT, "search input")
                .await?;
            self.fill(selectors::SEARCH_INPUT, text, "search input").await?;
            self.click(selectors::SEARCH_BUTTON, "search button").await?;
            tokio::time::sleep(CLICK_SETTLE).await;
        }

        self.wait_visible(selectors::COURSE_TABLE, "course table")
            .await?;
        Ok(())
    }

    async fn course_table_html(&self) -> anyhow::Result<String> {
        self.wait_visible(selectors::COURSE_TABLE, "course table")
            .await?;
        Ok(self.page_html().await?)
    }

    /// Enter the course at `row_index` (position in the live table), open
    /// its summary sub-page and return the rendered markup.
    async fn open_course_summary(&self, row_index: usize) -> anyhow::Result<String> {
        self.wait_visible(selectors::COURSE_TABLE, "course table")
            .await?;

        // Row re-entry is index-based against the current table render.
        let enter_button = format!(
            ".table-responsive table tbody tr:nth-child({}) \
             input.btn.btn-primary[type='button'][value='進入課程']",
            row_index + 1
        );
        self.click(&enter_button, "course entry button").await?;
        tokio::time::sleep(CLICK_SETTLE).await;
        self.wait_visible(selectors::COURSE_PANEL, "course panel")
            .await?;

        self.click(selectors::SUMMARY_LINK, "course summary link")
            .await?;
        tokio::time::sleep(CLICK_SETTLE).await;
        self.wait_visible(selectors::SUMMARY_TABLE, "summary statistics tables")
            .await?;

        Ok(self.page_html().await?)
    }

    /// Two steps back through history (summary → course page → list), so the
    /// server-side search and filter state survives the round trip.
    async fn back_to_course_list(&self) -> anyhow::Result<()> {
        self.eval::<()>("history back to course list", "() => window.history.go(-2)")
            .await?;
        tokio::time::sleep(BACK_SETTLE).await;
        self.wait_visible(selectors::COURSE_TABLE, "course table")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_the_step() {
        let err = SessionError::Timeout("course table");
        assert_eq!(err.to_string(), "timed out waiting for course table");
    }

    #[test]
    fn test_site_error_is_verbatim() {
        let err = SessionError::Site("帳號或密碼錯誤".to_string());
        assert_eq!(err.to_string(), "帳號或密碼錯誤");
    }

    #[test]
    fn test_driver_fault_names_dump_file() {
        let err = SessionError::Driver {
            step: "navigate to login page",
            message: "browser closed".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("navigate to login page"));
        assert!(text.contains("error_page.html"));
    }
}
