//! The poll/act/sleep loop.
//!
//! Each cycle walks `Fetch → Extract → Evaluate → Act` and then either
//! finishes (`Done`, enrollment confirmed) or sleeps until the next cycle.
//! Cancellation is checked at the top of every cycle and raced against the
//! sleep.
//!
//! Failures are classified per cycle with [`TrackerError::is_recoverable`]:
//! recoverable ones are logged and retried next cycle, until
//! `max_consecutive_failures` of them in a row escalate to fatal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

use crate::action::{self, ActionOutcome};
use crate::evaluate::find_enrollable_in;
use crate::extract::{CatalogExtractor, ExtractionRules};
use crate::form::HtmlForm;
use crate::markup::HtmlDocument;
use crate::portal::{EnrollmentPortal, FetchedPage, Notifier};
use crate::types::{ActionMode, Course, Semester, TrackedCourses, TrackerError, TrackerResult};

const DEFAULT_REFRESH_SECS: u64 = 60;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Where a cycle is in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    Fetch,
    Extract,
    Evaluate,
    Act,
    Submitted,
    Sleep,
    Done,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "FETCH",
            Self::Extract => "EXTRACT",
            Self::Evaluate => "EVALUATE",
            Self::Act => "ACT",
            Self::Submitted => "SUBMITTED",
            Self::Sleep => "SLEEP",
            Self::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// Static settings for a tracking session.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub semester: Semester,
    pub mode: ActionMode,
    pub tracked: TrackedCourses,
    pub refresh_interval: Duration,
    pub max_consecutive_failures: u32,
    pub rules: ExtractionRules,
}

impl TrackingConfig {
    pub fn new(semester: Semester, mode: ActionMode, tracked: TrackedCourses) -> Self {
        Self {
            semester,
            mode,
            tracked,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            rules: ExtractionRules::default(),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn with_rules(mut self, rules: ExtractionRules) -> Self {
        self.rules = rules;
        self
    }
}

/// What one cycle observed and did.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub catalog_size: usize,
    pub enrollable: Vec<String>,
    pub outcome: ActionOutcome,
    /// States visited, in order.
    pub states: Vec<CycleState>,
    /// `Sleep` to keep going, `Done` once enrolled.
    pub next: CycleState,
}

/// How a tracking run ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    /// The portal confirmed the enrollment.
    Enrolled { message: String, cycles: u64 },
    /// The cancel signal fired.
    Cancelled { cycles: u64 },
}

/// Stop signal shared between the loop and whoever wants to stop it.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything one tracking run owns: the portal handle, its settings and
/// the completion flag.
pub struct TrackingSession<P> {
    portal: P,
    notifier: Option<Box<dyn Notifier>>,
    config: TrackingConfig,
    extractor: CatalogExtractor,
    completed: bool,
    cycles: u64,
    last_message: Option<String>,
}

/// Result of the synchronous middle of a cycle.
struct Evaluation {
    catalog_size: usize,
    enrollable: Vec<Course>,
    form: Option<HtmlForm>,
}

impl<P: EnrollmentPortal> TrackingSession<P> {
    pub fn new(portal: P, config: TrackingConfig) -> Self {
        let extractor = CatalogExtractor::new(config.rules);
        Self {
            portal,
            notifier: None,
            config,
            extractor,
            completed: false,
            cycles: 0,
            last_message: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn portal_mut(&mut self) -> &mut P {
        &mut self.portal
    }

    /// Whether enrollment has been confirmed.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one `Fetch → Extract → Evaluate → Act` pass.
    ///
    /// A completed session does no I/O and reports `Done` straight away.
    pub async fn run_cycle(&mut self) -> TrackerResult<CycleReport> {
        if self.completed {
            return Ok(CycleReport {
                cycle: self.cycles,
                catalog_size: 0,
                enrollable: Vec::new(),
                outcome: ActionOutcome::Idle,
                states: vec![CycleState::Done],
                next: CycleState::Done,
            });
        }

        self.cycles += 1;
        let cycle = self.cycles;
        let mut states = Vec::new();

        enter(&mut states, cycle, CycleState::Fetch);
        let page = self.portal.fetch_enrollment_page().await?;

        let Evaluation {
            catalog_size,
            enrollable,
            form,
        } = self.evaluate_page(&page, &mut states, cycle)?;

        let codes: Vec<String> = enrollable.iter().map(|c| c.code.clone()).collect();
        tracing::info!(
            cycle,
            catalog = catalog_size,
            "{} tracked course(s) enrollable in semester {}",
            codes.len(),
            self.config.semester
        );

        let outcome = if enrollable.is_empty() {
            ActionOutcome::Idle
        } else {
            enter(&mut states, cycle, CycleState::Act);
            tracing::debug!(cycle, courses = ?codes, "acting on enrollable courses");
            self.act(&enrollable, form).await?
        };

        if let ActionOutcome::Submitted(r) = &outcome {
            enter(&mut states, cycle, CycleState::Submitted);
            if r.success {
                self.last_message = Some(r.message.clone());
            }
        }

        let next = if outcome.is_enrolled() {
            self.completed = true;
            CycleState::Done
        } else {
            CycleState::Sleep
        };
        enter(&mut states, cycle, next);

        Ok(CycleReport {
            cycle,
            catalog_size,
            enrollable: codes,
            outcome,
            states,
            next,
        })
    }

    fn enrolled_outcome(&self) -> TrackingOutcome {
        TrackingOutcome::Enrolled {
            message: self.last_message.clone().unwrap_or_default(),
            cycles: self.cycles,
        }
    }

    /// Cycle until enrolled, cancelled, or a fatal failure.
    pub async fn run(&mut self, cancel: &CancelSignal) -> TrackerResult<TrackingOutcome> {
        if self.completed {
            tracing::info!("already enrolled; nothing to track");
            return Ok(self.enrolled_outcome());
        }
        if self.config.mode == ActionMode::Notify && self.notifier.is_none() {
            return Err(TrackerError::Config(
                "notify mode needs a notifier".to_string(),
            ));
        }
        if self.config.tracked.is_empty() {
            tracing::warn!("no courses are tracked; the loop will never act");
        }

        tracing::info!(
            semester = %self.config.semester,
            mode = %self.config.mode,
            refresh_secs = self.config.refresh_interval.as_secs(),
            "tracking started for {:?}",
            self.config.tracked.codes()
        );

        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("tracking cancelled");
                return Ok(TrackingOutcome::Cancelled {
                    cycles: self.cycles,
                });
            }

            match self.run_cycle().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    if report.next == CycleState::Done {
                        let outcome = self.enrolled_outcome();
                        tracing::info!(
                            cycles = self.cycles,
                            message = self.last_message.as_deref().unwrap_or(""),
                            "successfully enrolled"
                        );
                        return Ok(outcome);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        cycle = self.cycles,
                        failures = consecutive_failures,
                        "cycle failed, retrying next cycle: {e}"
                    );
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        return Err(TrackerError::TooManyFailures {
                            count: consecutive_failures,
                            last: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::error!(cycle = self.cycles, "fatal: {e}");
                    return Err(e);
                }
            }

            tracing::debug!("sleeping {:?}", self.config.refresh_interval);
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("tracking cancelled while sleeping");
                    return Ok(TrackingOutcome::Cancelled { cycles: self.cycles });
                }
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
            }
        }
    }

    /// Parse, extract and evaluate. Never holds the parsed document across an await.
    fn evaluate_page(
        &self,
        page: &FetchedPage,
        states: &mut Vec<CycleState>,
        cycle: u64,
    ) -> TrackerResult<Evaluation> {
        let document = HtmlDocument::parse(&page.html);
        let root = document.root();

        enter(states, cycle, CycleState::Extract);
        let catalog = self.extractor.extract(&root)?;
        enter(states, cycle, CycleState::Evaluate);
        let enrollable = find_enrollable_in(&catalog, &self.config.tracked, self.config.semester);

        let form = if self.config.mode == ActionMode::Enroll && !enrollable.is_empty() {
            Some(HtmlForm::enrollment(&root)?)
        } else {
            None
        };

        Ok(Evaluation {
            catalog_size: catalog.len(),
            enrollable,
            form,
        })
    }

    async fn act(&mut self, enrollable: &[Course], form: Option<HtmlForm>) -> TrackerResult<ActionOutcome> {
        let semester = self.config.semester;
        match self.config.mode {
            ActionMode::Notify => match &self.notifier {
                Some(notifier) => action::notify_available(notifier.as_ref(), enrollable, semester).await,
                None => Err(TrackerError::Config("notify mode needs a notifier".to_string())),
            },
            ActionMode::Enroll => {
                let form = form.ok_or_else(|| {
                    TrackerError::Structure("enrollment form was not captured".to_string())
                })?;
                action::enroll(&mut self.portal, form, enrollable, semester).await
            }
        }
    }
}

fn enter(states: &mut Vec<CycleState>, cycle: u64, state: CycleState) {
    tracing::debug!(cycle, state = %state);
    states.push(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_signal_wakes_waiter() {
        let signal = std::sync::Arc::new(CancelSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::task::yield_now().await;
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_set() {
        let signal = CancelSignal::new();
        signal.cancel();
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("already cancelled");
    }

    #[test]
    fn test_config_builders() {
        let config = TrackingConfig::new(Semester::FIRST, ActionMode::Enroll, TrackedCourses::default())
            .with_refresh_interval(Duration::from_secs(5))
            .with_max_consecutive_failures(0);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.max_consecutive_failures, 1);
    }
}
