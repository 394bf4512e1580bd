use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SlotCheckerError;

/// Querying this project identifier hits the caller's own profile slots
/// instead of a project page.
pub const DEBUG_PROJECT: &str = "42";

/// The platform reports slot starts in its own timezone, pinned to UTC+1.
const SLOT_START_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

const REQUEST_TIMEOUT: Duration = Duration::from_millis(3050);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub signin_url: String,
    pub projects_url: String,
    pub profile_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            signin_url: "https://signin.intra.42.fr/users/sign_in".to_string(),
            projects_url: "https://projects.intra.42.fr/projects".to_string(),
            profile_url: "https://profile.intra.42.fr".to_string(),
        }
    }
}

/// One reported evaluation opening. Platform fields beyond `id` and `start`
/// are kept as-is so discovery logs show the full payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Slot {
    pub id: u64,
    pub start: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Slot {
    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.start, SLOT_START_FORMAT).ok()
    }
}

/// An authenticated Intra session. Values only exist once the sign-in
/// handshake completed, so every query runs on a logged-in cookie jar.
pub struct IntraClient {
    login: String,
    client: reqwest::Client,
    endpoints: Endpoints,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl IntraClient {
    /// Sign into the Intra: fetch the sign-in page, lift the authenticity
    /// token out of the form, and post the credentials back with the session
    /// cookies. The platform answers a failed login with an error banner on
    /// an otherwise successful response.
    pub async fn signin(
        login: &str,
        password: &str,
        endpoints: Endpoints,
    ) -> Result<Self, SlotCheckerError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SlotCheckerError::AuthNetwork)?;

        let page = client
            .get(&endpoints.signin_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(SlotCheckerError::AuthNetwork)?
            .text()
            .await
            .map_err(SlotCheckerError::AuthNetwork)?;
        let token = extract_authenticity_token(&page).ok_or(SlotCheckerError::MissingToken)?;

        let form = [
            ("utf8", "✓"),
            ("authenticity_token", token.as_str()),
            ("user[login]", login),
            ("user[password]", password),
            ("commit", "Sign in"),
        ];
        let body = client
            .post(&endpoints.signin_url)
            .form(&form)
            .send()
            .await
            .map_err(SlotCheckerError::AuthNetwork)?
            .text()
            .await
            .map_err(SlotCheckerError::AuthNetwork)?;
        if let Some(banner) = extract_error_banner(&body) {
            return Err(SlotCheckerError::AuthRejected(banner));
        }

        info!("Successfully logged in the Intra as {login}");
        Ok(Self {
            login: login.to_string(),
            client,
            endpoints,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// Shrink the retry budget. The defaults are right for production; tests
    /// exercise the exhaustion path with a smaller budget.
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    fn slots_url(&self, project: &str) -> String {
        slots_url(&self.endpoints, project)
    }

    /// Fetch the available slots for one project between two dates.
    ///
    /// 404 (unknown project) and 403 (no access to corrections) are reported
    /// as warnings and yield no slots. Transport failures are retried with a
    /// fixed backoff; the budget resets on every call and its exhaustion is
    /// fatal to the checker.
    pub async fn project_slots(
        &self,
        project: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, SlotCheckerError> {
        let url = self.slots_url(project);
        let mut attempts = 0u32;
        let resp = loop {
            attempts += 1;
            let result = self
                .client
                .get(&url)
                .query(&[("start", start.to_string()), ("end", end.to_string())])
                .send()
                .await;
            match result {
                Ok(resp) => break resp,
                Err(err) => {
                    if attempts >= self.max_attempts {
                        return Err(SlotCheckerError::SlotQuery(err));
                    }
                    debug!(
                        "Failed attempt #{attempts} to get project slots (max {})",
                        self.max_attempts
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        };

        match resp.status() {
            StatusCode::NOT_FOUND => {
                warn!("Project {project} does not exist");
                return Ok(Vec::new());
            }
            StatusCode::FORBIDDEN => {
                warn!("You don't have access to any correction slots for project {project}");
                return Ok(Vec::new());
            }
            _ => {}
        }
        resp.json::<Vec<Slot>>()
            .await
            .map_err(SlotCheckerError::SlotQuery)
    }
}

fn slots_url(endpoints: &Endpoints, project: &str) -> String {
    if project == DEBUG_PROJECT {
        format!("{}/slots.json", endpoints.profile_url)
    } else {
        format!("{}/{}/slots.json", endpoints.projects_url, project)
    }
}

fn extract_authenticity_token(page: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let selector = Selector::parse(r#"input[name="authenticity_token"]"#).ok()?;
    document
        .select(&selector)
        .next()?
        .value()
        .attr("value")
        .map(str::to_string)
}

fn extract_error_banner(page: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let selector = Selector::parse("div.alert-danger").ok()?;
    let banner = document.select(&selector).next()?;
    Some(banner.text().collect::<String>().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNIN_PAGE: &str = r#"<html><body>
        <form action="/users/sign_in" method="post">
            <input type="hidden" name="authenticity_token" value="tok-123" />
            <input type="text" name="user[login]" />
        </form>
    </body></html>"#;

    #[test]
    fn authenticity_token_is_extracted_from_the_signin_form() {
        assert_eq!(
            extract_authenticity_token(SIGNIN_PAGE),
            Some("tok-123".to_string())
        );
    }

    #[test]
    fn missing_token_yields_none() {
        assert_eq!(extract_authenticity_token("<html><body></body></html>"), None);
    }

    #[test]
    fn error_banner_text_is_extracted() {
        let page = r#"<html><body>
            <div class="alert alert-danger">Invalid <b>login</b> or password.</div>
        </body></html>"#;
        assert_eq!(
            extract_error_banner(page),
            Some("Invalid login or password.".to_string())
        );
    }

    #[test]
    fn page_without_banner_yields_none() {
        assert_eq!(extract_error_banner(SIGNIN_PAGE), None);
    }

    #[test]
    fn debug_project_is_routed_to_the_profile_endpoint() {
        let endpoints = Endpoints::default();
        assert_eq!(
            slots_url(&endpoints, DEBUG_PROJECT),
            "https://profile.intra.42.fr/slots.json"
        );
        assert_eq!(
            slots_url(&endpoints, "cpp_module1"),
            "https://projects.intra.42.fr/projects/cpp_module1/slots.json"
        );
    }

    #[test]
    fn slot_json_keeps_platform_extras() {
        let slot: Slot = serde_json::from_str(
            r#"{"id": 7, "start": "2024-03-01T10:00:00.000+01:00", "end": "2024-03-01T10:30:00.000+01:00", "user": null}"#,
        )
        .expect("slot should deserialize");
        assert_eq!(slot.id, 7);
        assert!(slot.extra.contains_key("end"));
        assert!(slot.extra.contains_key("user"));
    }

    #[test]
    fn slot_start_parses_the_platform_format() {
        let slot = Slot {
            id: 1,
            start: "2024-03-01T10:00:00.000+01:00".to_string(),
            extra: serde_json::Map::new(),
        };
        let start = slot.start_time().expect("start should parse");
        assert_eq!(start.format("%H:%M").to_string(), "10:00");
        assert_eq!(start.format("%d/%m/%Y").to_string(), "01/03/2024");
    }

    #[test]
    fn unexpected_start_format_yields_none() {
        let slot = Slot {
            id: 1,
            start: "tomorrow at noon".to_string(),
            extra: serde_json::Map::new(),
        };
        assert!(slot.start_time().is_none());
    }
}
