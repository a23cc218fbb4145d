//! Collaborator traits at the edge of the core: the enrollment portal and the
//! notification channel.
//!
//! The tracking loop only talks to these traits. The HTTP implementations
//! live in `seatwatch-cli`.

use async_trait::async_trait;

use crate::form::HtmlForm;
use crate::types::TrackerResult;

/// A fetched enrollment page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    /// Raw HTML body.
    pub html: String,
}

/// An authenticated view of the enrollment portal.
#[async_trait]
pub trait EnrollmentPortal: Send {
    /// Re-read the enrollment page on the current session.
    async fn fetch_enrollment_page(&mut self) -> TrackerResult<FetchedPage>;

    /// Submit a filled-in enrollment form and return the raw response body.
    async fn submit_enrollment(&mut self, form: &HtmlForm) -> TrackerResult<String>;
}

/// Outbound push notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> TrackerResult<()>;
}
