//! Subcommand implementations behind the `seatwatch` binary.

use anyhow::{Context, Result};

use seatwatch::{
    CancelSignal, CatalogExtractor, Course, EnrollmentPortal, ExtractionRules, HtmlDocument,
    TrackerError, TrackerResult, TrackingOutcome, TrackingSession,
};

use crate::config::Config;
use crate::notify::PushbulletNotifier;
use crate::portal::{ClientOptions, PortalClient};
use crate::session_store::{SessionStore, StoredSession};

fn client_options(config: &Config) -> ClientOptions {
    ClientOptions {
        timeout: config.timeout(),
        accept_invalid_certs: config.accept_invalid_certs,
    }
}

fn new_client(config: &Config) -> Result<PortalClient> {
    let (username, password) = config.credentials()?;
    Ok(PortalClient::new(&config.portal_url, &client_options(config))?
        .with_credentials(username, password))
}

/// Persist the client's cookies. Failure is logged, never fatal.
fn save_session(store: &SessionStore, config: &Config, portal: &PortalClient) {
    let cookies = portal.cookies();
    if cookies.is_empty() {
        return;
    }
    if let Err(e) = store.save(&StoredSession::new(&config.portal_url, cookies)) {
        tracing::warn!("could not save session to {}: {e}", store.path().display());
    }
}

/// Save the session after a run, or drop it when the portal refused it so the
/// next start logs in afresh.
fn settle_session(
    store: &SessionStore,
    config: &Config,
    portal: &PortalClient,
    error: Option<&TrackerError>,
) {
    match error {
        Some(TrackerError::SessionExpired | TrackerError::Authentication(_)) => {
            tracing::info!("discarding rejected session at {}", store.path().display());
            if let Err(e) = store.clear() {
                tracing::warn!("could not remove session file {}: {e}", store.path().display());
            }
        }
        _ => save_session(store, config, portal),
    }
}

/// Portal client with a usable session: the saved one if present, a fresh
/// login otherwise.
pub async fn connect(config: &Config, store: &SessionStore) -> Result<PortalClient> {
    let mut portal = new_client(config)?;
    match store.load(&config.portal_url) {
        Some(saved) => {
            tracing::info!(saved_at = %saved.saved_at, "reusing saved portal session");
            portal.restore_cookies(&saved.cookies);
        }
        None => {
            portal.login().await.context("portal login failed")?;
            save_session(store, config, &portal);
        }
    }
    Ok(portal)
}

/// Log in unconditionally and save the new session.
pub async fn login(config: &Config) -> Result<SessionStore> {
    let store = SessionStore::new(config.session_path());
    let mut portal = new_client(config)?;
    portal.login().await.context("portal login failed")?;
    save_session(&store, config, &portal);
    Ok(store)
}

/// Parse an enrollment page into its catalog.
pub fn extract_catalog(html: &str, rules: ExtractionRules) -> TrackerResult<Vec<Course>> {
    let doc = HtmlDocument::parse(html);
    CatalogExtractor::new(rules).extract(&doc.root())
}

/// Fetch the enrollment page once and list every course on it.
pub async fn catalog(config: &Config) -> Result<Vec<Course>> {
    let store = SessionStore::new(config.session_path());
    let mut portal = connect(config, &store).await?;
    let page = portal.fetch_enrollment_page().await;
    settle_session(&store, config, &portal, page.as_ref().err());
    let page = page?;
    Ok(extract_catalog(&page.html, config.rules.resolve())?)
}

/// Track until enrolled, cancelled, or a fatal error.
pub async fn run(config: &Config, cancel: &CancelSignal) -> Result<TrackingOutcome> {
    config.validate()?;
    let store = SessionStore::new(config.session_path());
    let portal = connect(config, &store).await?;

    let mut session = TrackingSession::new(portal, config.tracking_config()?);
    if let Some(token) = config.pushbullet_token.as_deref().filter(|t| !t.is_empty()) {
        let mut notifier = PushbulletNotifier::new(token, config.timeout())?;
        if let Some(endpoint) = &config.pushbullet_endpoint {
            notifier = notifier.with_endpoint(endpoint);
        }
        session = session.with_notifier(Box::new(notifier));
    }

    let result = session.run(cancel).await;
    settle_session(&store, config, session.portal(), result.as_ref().err());
    Ok(result?)
}
