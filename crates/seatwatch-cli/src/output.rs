//! Terminal rendering for catalog listings and tracking results.

use serde::Serialize;

use seatwatch::{Course, SemesterState, TrackingOutcome};

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn state_cell(state: SemesterState) -> &'static str {
    match state {
        SemesterState::Unavailable => "-",
        SemesterState::Available => "open",
        SemesterState::Selected => "selected",
    }
}

/// Fixed-width table of a catalog, one course per line.
pub fn catalog_table(courses: &[Course]) -> String {
    if courses.is_empty() {
        return "  No courses found on the enrollment page.\n".to_string();
    }

    let name_width = courses
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(4, 48);

    let mut out = format!(
        "  {:<10} {:<name_width$} {:<17} {:<9} {:<9} {:<9}\n",
        "CODE", "NAME", "CATEGORY", "SEM1", "SEM2", "SEM3"
    );
    for course in courses {
        let name: String = course.name.chars().take(name_width).collect();
        out.push_str(&format!(
            "  {:<10} {:<name_width$} {:<17} {:<9} {:<9} {:<9}\n",
            course.code,
            name,
            course.category.as_str(),
            state_cell(course.semesters[0]),
            state_cell(course.semesters[1]),
            state_cell(course.semesters[2]),
        ));
    }
    out
}

/// One-line summary of how tracking ended.
pub fn outcome_line(outcome: &TrackingOutcome) -> String {
    match outcome {
        TrackingOutcome::Enrolled { message, cycles } => {
            format!("Enrolled after {cycles} cycle(s): {message}")
        }
        TrackingOutcome::Cancelled { cycles } => {
            format!("Stopped after {cycles} cycle(s)")
        }
    }
}
