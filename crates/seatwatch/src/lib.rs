//! Seatwatch: watches an enrollment portal for open seats in tracked courses.
//!
//! The core turns an enrollment page into a course catalog, decides which
//! tracked courses are enrollable, and drives the poll/act/sleep loop. The
//! portal and notification channel are traits implemented elsewhere.

pub mod action;
pub mod evaluate;
pub mod extract;
pub mod form;
pub mod markup;
pub mod portal;
pub mod tracking;
pub mod types;

pub use action::{enroll, notify_available, ActionOutcome};
pub use evaluate::{find_enrollable, find_enrollable_in};
pub use extract::{CatalogExtractor, CodeStrategy, ExtractionRules, TableLayout};
pub use form::{course_field_name, HtmlForm};
pub use markup::{HtmlDocument, HtmlNode, MarkupNode};
pub use portal::{EnrollmentPortal, FetchedPage, Notifier};
pub use tracking::{
    CancelSignal, CycleReport, CycleState, TrackingConfig, TrackingOutcome, TrackingSession,
};
pub use types::*;
