//! Acting on enrollable courses: notify the operator or submit enrollment.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::form::HtmlForm;
use crate::portal::{EnrollmentPortal, Notifier};
use crate::types::{Course, Semester, SubmissionResponse, TrackerResult};

/// What an action step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Nothing was enrollable.
    Idle,
    /// Notifications sent (and how many failed to deliver).
    Notified { sent: usize, failed: usize },
    /// The enrollment form was submitted.
    Submitted(SubmissionResponse),
}

/// Title and body of the notification for one course.
pub fn notification_for(course: &Course, semester: Semester, at: DateTime<Local>) -> (String, String) {
    let title = format!("{} is open", course.code);
    let body = format!(
        "{} ({}) has a seat in semester {} as of {}",
        course.name,
        course.code,
        semester,
        at.format("%Y-%m-%d %H:%M:%S")
    );
    (title, body)
}

/// Notify about each course. A failed delivery does not stop the rest.
///
/// Errors only when every delivery failed.
pub async fn notify_available(
    notifier: &dyn Notifier,
    courses: &[Course],
    semester: Semester,
) -> TrackerResult<ActionOutcome> {
    let now = Local::now();
    let mut sent = 0;
    let mut last_error = None;

    for course in courses {
        let (title, body) = notification_for(course, semester, now);
        match notifier.notify(&title, &body).await {
            Ok(()) => {
                sent += 1;
                tracing::info!(code = %course.code, "notification sent");
            }
            Err(e) => {
                tracing::warn!(code = %course.code, "notification failed: {e}");
                last_error = Some(e);
            }
        }
    }

    let failed = courses.len() - sent;
    match last_error {
        Some(e) if sent == 0 => Err(e),
        _ => Ok(ActionOutcome::Notified { sent, failed }),
    }
}

/// Mark every course on the form, submit once, and read the verdict.
pub async fn enroll<P>(
    portal: &mut P,
    mut form: HtmlForm,
    courses: &[Course],
    semester: Semester,
) -> TrackerResult<ActionOutcome>
where
    P: EnrollmentPortal + ?Sized,
{
    if courses.is_empty() {
        return Ok(ActionOutcome::Idle);
    }

    for course in courses {
        form.mark(&course.selection_key(semester))?;
        tracing::info!(code = %course.code, name = %course.name, "course marked for enrollment");
    }

    let body = portal.submit_enrollment(&form).await?;
    tracing::info!("enrollment submitted");

    let response = SubmissionResponse::parse(&body)?;
    if response.success {
        tracing::info!(message = %response.message, "enrollment accepted");
    } else {
        tracing::warn!(message = %response.message, "enrollment rejected");
    }
    Ok(ActionOutcome::Submitted(response))
}

impl ActionOutcome {
    /// Whether this outcome ends tracking.
    pub fn is_enrolled(&self) -> bool {
        matches!(self, ActionOutcome::Submitted(r) if r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::HtmlDocument;
    use crate::portal::FetchedPage;
    use crate::types::{CourseCategory, SemesterState, TrackerError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail_codes: Vec<&'static str>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, title: &str, body: &str) -> TrackerResult<()> {
            if self.fail_codes.iter().any(|c| title.contains(c)) {
                return Err(TrackerError::Notify("push rejected".into()));
            }
            self.sent.lock().unwrap().push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct CannedPortal {
        response: String,
        submitted: Vec<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EnrollmentPortal for CannedPortal {
        async fn fetch_enrollment_page(&mut self) -> TrackerResult<FetchedPage> {
            Err(TrackerError::Transport("not used".into()))
        }

        async fn submit_enrollment(&mut self, form: &HtmlForm) -> TrackerResult<String> {
            self.submitted.push(form.fields().to_vec());
            Ok(self.response.clone())
        }
    }

    fn course(code: &str) -> Course {
        Course {
            code: code.to_string(),
            name: format!("{code} title"),
            category: CourseCategory::Roadmap,
            semesters: [SemesterState::Available; 3],
        }
    }

    fn form() -> HtmlForm {
        let html = r#"<form id="frmEnrolment" action="/enrolment/submit">
            <input type="checkbox" name="form[courses][COSC2657-SEM2]" value="1" />
            <input type="checkbox" name="form[courses][ISYS2077-SEM2]" value="1" />
            </form>"#;
        HtmlForm::enrollment(&HtmlDocument::parse(html).root()).unwrap()
    }

    #[test]
    fn test_notification_text() {
        let at = Local::now();
        let (title, body) = notification_for(&course("COSC2657"), Semester::SECOND, at);
        assert!(title.contains("COSC2657"));
        assert!(body.contains("COSC2657 title"));
        assert!(body.contains("semester 2"));
    }

    #[tokio::test]
    async fn test_notify_continues_after_failure() {
        let notifier = RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail_codes: vec!["COSC2657"],
        };
        let outcome = notify_available(&notifier, &[course("COSC2657"), course("ISYS2077")], Semester::FIRST)
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Notified { sent: 1, failed: 1 });
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_all_failed_is_error() {
        let notifier = RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail_codes: vec!["COSC2657"],
        };
        let err = notify_available(&notifier, &[course("COSC2657")], Semester::FIRST)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_enroll_marks_all_then_submits_once() {
        let mut portal = CannedPortal {
            response: r#"{"success": true, "message": "OK"}"#.into(),
            submitted: Vec::new(),
        };
        let outcome = enroll(&mut portal, form(), &[course("COSC2657"), course("ISYS2077")], Semester::SECOND)
            .await
            .unwrap();

        assert!(outcome.is_enrolled());
        assert_eq!(portal.submitted.len(), 1);
        let names: Vec<&str> = portal.submitted[0].iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["form[courses][COSC2657-SEM2]", "form[courses][ISYS2077-SEM2]"]
        );
    }

    #[tokio::test]
    async fn test_enroll_rejection_is_not_enrolled() {
        let mut portal = CannedPortal {
            response: r#"{"success": false, "message": "Seats full"}"#.into(),
            submitted: Vec::new(),
        };
        let outcome = enroll(&mut portal, form(), &[course("COSC2657")], Semester::SECOND)
            .await
            .unwrap();
        assert!(!outcome.is_enrolled());
        match outcome {
            ActionOutcome::Submitted(r) => assert_eq!(r.message, "Seats full"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_enroll_unparseable_response() {
        let mut portal = CannedPortal {
            response: "<html>Service Unavailable</html>".into(),
            submitted: Vec::new(),
        };
        let err = enroll(&mut portal, form(), &[course("COSC2657")], Semester::SECOND)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Submission(_)));
    }

    #[tokio::test]
    async fn test_enroll_missing_checkbox_does_not_submit() {
        let mut portal = CannedPortal {
            response: r#"{"success": true, "message": "OK"}"#.into(),
            submitted: Vec::new(),
        };
        let err = enroll(&mut portal, form(), &[course("EEET2574")], Semester::SECOND)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Structure(_)));
        assert!(portal.submitted.is_empty());
    }
}
