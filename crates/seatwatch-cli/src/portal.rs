//! HTTP client for the enrollment portal.
//!
//! Holds the authenticated cookie session, logs in through the portal's login
//! form, fetches the enrollment page and posts the enrollment form. A cookie
//! session restored from disk gets one silent re-login if the portal rejects
//! it on first use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::StatusCode;
use url::Url;

use seatwatch::{
    EnrollmentPortal, FetchedPage, HtmlDocument, HtmlForm, MarkupNode, TrackerError, TrackerResult,
};

/// Login form on the portal root page.
pub const LOGIN_FORM: &str = "form.form-horizontal";
const USERNAME_FIELD: &str = "_username";
const PASSWORD_FIELD: &str = "_password";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Endpoints derived from the portal base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    pub base: Url,
    pub login: Url,
    pub enrollment: Url,
    pub submit: Url,
}

impl PortalUrls {
    pub fn from_base(base: &str) -> TrackerResult<Self> {
        let mut base = Url::parse(base)
            .map_err(|e| TrackerError::Config(format!("invalid portal url '{base}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TrackerError::Config(format!("invalid portal path '{path}': {e}")))
        };
        Ok(Self {
            login: base.clone(),
            enrollment: join("enrolment")?,
            submit: join("enrolment/submit")?,
            base,
        })
    }
}

/// Connection options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// Cookie-authenticated portal session.
pub struct PortalClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    urls: PortalUrls,
    credentials: Option<Credentials>,
    /// Set while cookies loaded from disk have not yet been accepted.
    restored: bool,
}

impl PortalClient {
    pub fn new(base_url: &str, options: &ClientOptions) -> TrackerResult<Self> {
        let urls = PortalUrls::from_base(base_url)?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|e| TrackerError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            client,
            jar,
            urls,
            credentials: None,
            restored: false,
        })
    }

    /// Remember credentials used by [`login`](Self::login) and re-login.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn urls(&self) -> &PortalUrls {
        &self.urls
    }

    /// Current session cookies as `name=value` pairs.
    pub fn cookies(&self) -> Vec<String> {
        let Some(header) = self.jar.cookies(&self.urls.base) else {
            return Vec::new();
        };
        header
            .to_str()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }

    /// Load previously saved `name=value` pairs into the cookie jar.
    pub fn restore_cookies(&mut self, cookies: &[String]) {
        for cookie in cookies {
            self.jar
                .add_cookie_str(&format!("{cookie}; Path=/"), &self.urls.base);
        }
        self.restored = !cookies.is_empty();
        tracing::debug!(count = cookies.len(), "restored session cookies");
    }

    /// Log in through the portal's login form.
    pub async fn login(&mut self) -> TrackerResult<()> {
        let credentials = self
            .credentials
            .clone()
            .ok_or_else(|| TrackerError::Authentication("no credentials configured".into()))?;

        let resp = self
            .client
            .get(self.urls.login.clone())
            .send()
            .await
            .map_err(transport)?;
        let page_url = resp.url().clone();
        let body = read_body(resp).await?;

        let mut form = login_form(&body)?;
        form.set(USERNAME_FIELD, &credentials.username);
        form.set(PASSWORD_FIELD, &credentials.password);
        let target = resolve_action(&page_url, form.action(), &self.urls.login)?;

        tracing::debug!(url = %target, method = form.method(), "submitting login form");
        let resp = self
            .form_request(&form, target)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if status.is_client_error() {
            return Err(TrackerError::Authentication(format!("login returned HTTP {status}")));
        }
        let body = read_body(resp).await?;
        if is_login_page(&body) {
            return Err(TrackerError::Authentication("portal rejected the credentials".into()));
        }

        self.restored = false;
        tracing::info!(user = %credentials.username, "logged in to portal");
        Ok(())
    }

    /// Request that submits `form` the way its `method` says: a query string
    /// for GET, an url-encoded body otherwise.
    fn form_request(&self, form: &HtmlForm, target: Url) -> reqwest::RequestBuilder {
        if form.method() == "GET" {
            self.client.get(target).query(form.fields())
        } else {
            self.client.post(target).form(form.fields())
        }
    }

    async fn fetch_once(&self) -> TrackerResult<FetchedPage> {
        let resp = self
            .client
            .get(self.urls.enrollment.clone())
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if is_auth_status(status) {
            return Err(TrackerError::SessionExpired);
        }
        let url = resp.url().to_string();
        let html = read_body(resp).await?;
        if is_login_page(&html) {
            return Err(TrackerError::SessionExpired);
        }
        Ok(FetchedPage { url, html })
    }
}

#[async_trait]
impl EnrollmentPortal for PortalClient {
    async fn fetch_enrollment_page(&mut self) -> TrackerResult<FetchedPage> {
        match self.fetch_once().await {
            Err(TrackerError::SessionExpired) if self.restored && self.credentials.is_some() => {
                tracing::info!("saved session rejected, logging in again");
                self.login().await?;
                self.fetch_once().await
            }
            Ok(page) => {
                self.restored = false;
                Ok(page)
            }
            other => other,
        }
    }

    async fn submit_enrollment(&mut self, form: &HtmlForm) -> TrackerResult<String> {
        let target = resolve_action(&self.urls.enrollment, form.action(), &self.urls.submit)?;
        tracing::debug!(
            url = %target,
            method = form.method(),
            fields = form.fields().len(),
            "submitting enrollment form"
        );

        let resp = self
            .form_request(form, target)
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if is_auth_status(status) {
            return Err(TrackerError::SessionExpired);
        }
        if status.is_server_error() {
            return Err(TrackerError::Transport(format!("enrollment submit returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(TrackerError::Submission(format!("enrollment submit returned HTTP {status}")));
        }
        resp.text().await.map_err(transport)
    }
}

fn transport(e: reqwest::Error) -> TrackerError {
    TrackerError::Transport(e.to_string())
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

async fn read_body(resp: reqwest::Response) -> TrackerResult<String> {
    let status = resp.status();
    if !status.is_success() {
        return Err(TrackerError::Transport(format!("{} returned HTTP {status}", resp.url())));
    }
    resp.text().await.map_err(transport)
}

fn login_form(html: &str) -> TrackerResult<HtmlForm> {
    let doc = HtmlDocument::parse(html);
    HtmlForm::locate(&doc.root(), LOGIN_FORM)
}

/// Whether a page is the portal's login screen.
pub fn is_login_page(html: &str) -> bool {
    let doc = HtmlDocument::parse(html);
    let root = doc.root();
    root.find_first(LOGIN_FORM)
        .is_some_and(|form| form.contains(&format!("input[name=\"{USERNAME_FIELD}\"]")))
}

/// Resolve a form `action` against the page it came from.
fn resolve_action(page: &Url, action: Option<&str>, fallback: &Url) -> TrackerResult<Url> {
    match action {
        Some(action) => page
            .join(action)
            .map_err(|e| TrackerError::Structure(format!("bad form action '{action}': {e}"))),
        None => Ok(fallback.clone()),
    }
}
