//! Availability evaluation: which tracked courses can be enrolled right now.

use crate::types::{Course, Semester, SemesterState, TrackedCourses};

/// Tracked courses whose state in `semester` is `AVAILABLE`.
///
/// `SELECTED` courses are left alone. A semester outside 1..=3 matches
/// nothing.
pub fn find_enrollable(catalog: &[Course], tracked: &TrackedCourses, semester: u8) -> Vec<Course> {
    match Semester::new(semester) {
        Ok(semester) => find_enrollable_in(catalog, tracked, semester),
        Err(_) => {
            tracing::debug!("semester {semester} out of range; nothing is enrollable");
            Vec::new()
        }
    }
}

/// [`find_enrollable`] for an already validated semester.
pub fn find_enrollable_in(catalog: &[Course], tracked: &TrackedCourses, semester: Semester) -> Vec<Course> {
    catalog
        .iter()
        .filter(|c| tracked.contains(&c.code) && c.state(semester) == SemesterState::Available)
        .cloned()
        .collect()
}
