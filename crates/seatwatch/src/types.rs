//! Core data types for the enrollment catalog and tracking configuration.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of semester slots a course can be offered in.
pub const SEMESTER_COUNT: usize = 3;

/// Which page section a course was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourseCategory {
    Roadmap,
    ProgramElective,
    GeneralElective,
}

impl CourseCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roadmap => "ROADMAP",
            Self::ProgramElective => "PROGRAM_ELECTIVE",
            Self::GeneralElective => "GENERAL_ELECTIVE",
        }
    }
}

impl fmt::Display for CourseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrollment state of a course in one semester slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemesterState {
    Unavailable,
    Available,
    Selected,
}

impl SemesterState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::Available => "AVAILABLE",
            Self::Selected => "SELECTED",
        }
    }
}

impl fmt::Display for SemesterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semester slot number, always 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Semester(u8);

impl Semester {
    pub const FIRST: Semester = Semester(1);
    pub const SECOND: Semester = Semester(2);
    pub const THIRD: Semester = Semester(3);

    /// Validate a raw slot number.
    pub fn new(number: u8) -> TrackerResult<Self> {
        if (1..=SEMESTER_COUNT as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(TrackerError::InvalidInput(format!(
                "semester must be 1, 2 or 3 (got {number})"
            )))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based index into [`Course::semesters`].
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for Semester {
    type Error = TrackerError;

    fn try_from(value: u8) -> TrackerResult<Self> {
        Self::new(value)
    }
}

impl From<Semester> for u8 {
    fn from(s: Semester) -> u8 {
        s.0
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One catalog entry, rebuilt from the page on every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: String,
    pub category: CourseCategory,
    pub semesters: [SemesterState; SEMESTER_COUNT],
}

impl Course {
    /// State of this course in the given semester slot.
    pub fn state(&self, semester: Semester) -> SemesterState {
        self.semesters[semester.index()]
    }

    /// Key identifying this course/semester pair on the enrollment form.
    pub fn selection_key(&self, semester: Semester) -> String {
        selection_key(&self.code, semester)
    }
}

/// Build the `<code>-SEM<semester>` selection key.
pub fn selection_key(code: &str, semester: Semester) -> String {
    format!("{code}-SEM{semester}")
}

/// Course codes the operator wants to watch, grouped the way the portal lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCourses {
    #[serde(default)]
    pub roadmap: Vec<String>,
    #[serde(default)]
    pub program_elective: Vec<String>,
    #[serde(default)]
    pub general_elective: Vec<String>,
}

impl TrackedCourses {
    /// Whether `code` is tracked in any group.
    pub fn contains(&self, code: &str) -> bool {
        self.roadmap
            .iter()
            .chain(&self.program_elective)
            .chain(&self.general_elective)
            .any(|c| c == code)
    }

    /// All tracked codes, deduplicated and sorted.
    pub fn codes(&self) -> BTreeSet<&str> {
        self.roadmap
            .iter()
            .chain(&self.program_elective)
            .chain(&self.general_elective)
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.roadmap.is_empty() && self.program_elective.is_empty() && self.general_elective.is_empty()
    }
}

/// What to do when a tracked course opens up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    /// Push a notification and keep watching.
    #[default]
    Notify,
    /// Mark the course on the enrollment form and submit it.
    Enroll,
}

impl ActionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Enroll => "enroll",
        }
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionMode {
    type Err = TrackerError;

    fn from_str(s: &str) -> TrackerResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify" => Ok(Self::Notify),
            "enroll" | "enrol" => Ok(Self::Enroll),
            other => Err(TrackerError::InvalidInput(format!(
                "unknown action mode '{other}' (expected 'notify' or 'enroll')"
            ))),
        }
    }
}

/// Body returned by the enrollment submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl SubmissionResponse {
    /// Parse a raw response body.
    pub fn parse(body: &str) -> TrackerResult<Self> {
        serde_json::from_str(body.trim()).map_err(|e| {
            let preview: String = body.chars().take(120).collect();
            TrackerError::Submission(format!("unexpected response ({e}): {preview}"))
        })
    }
}

/// Errors that can occur while tracking.
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("Page structure error: {0}")]
    Structure(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Giving up after {count} consecutive failures; last: {last}")]
    TooManyFailures { count: u32, last: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    /// Whether the tracking loop may log this and try again next cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrackerError::Transport(_) | TrackerError::Submission(_) | TrackerError::Notify(_)
        )
    }
}

/// Convenience result type.
pub type TrackerResult<T> = Result<T, TrackerError>;
