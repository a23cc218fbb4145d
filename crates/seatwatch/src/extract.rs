//! Catalog extraction from the enrollment page.
//!
//! The page carries three course tables: the roadmap table (the student's
//! program plan) and two elective tables nested in named containers. Each
//! table has its own column layout and its own way of marking availability,
//! captured here as [`ExtractionRules`].
//!
//! Rows that cannot be read are dropped with a warning; a missing table is a
//! structural error and fails the whole extraction.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::markup::MarkupNode;
use crate::types::{Course, CourseCategory, SemesterState, TrackerError, TrackerResult};

/// The roadmap course table.
pub const ROADMAP_TABLE: &str = "table.tbl-courses";
/// Container holding the program-elective table.
pub const PROGRAM_ELECTIVE_CONTAINER: &str = "div#programElective";
/// Container holding the general-elective table.
pub const GENERAL_ELECTIVE_CONTAINER: &str = "div#generalElective";
/// Marker present on roadmap rows the student has already passed.
pub const COMPLETED_MARKER: &str = "span.course-success";

const ROADMAP_HEADER_ROWS: usize = 2;
const ELECTIVE_HEADER_ROWS: usize = 1;

fn code_search() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z]+[0-9]+").expect("course code regex is valid"))
}

fn code_exact() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]+[0-9]+$").expect("exact course code regex is valid"))
}

/// How the course code is recovered from its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStrategy {
    /// First `[A-Z]+[0-9]+` match anywhere in the cell text.
    Pattern,
    /// The whole trimmed cell text, which must itself be a code.
    DirectText,
}

impl CodeStrategy {
    /// Recover a course code from raw cell text.
    pub fn recover(self, text: &str) -> Option<String> {
        match self {
            CodeStrategy::Pattern => code_search().find(text).map(|m| m.as_str().to_string()),
            CodeStrategy::DirectText => {
                let trimmed = text.trim();
                code_exact()
                    .is_match(trimmed)
                    .then(|| trimmed.to_string())
            }
        }
    }
}

/// Column positions for one table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    pub code_column: usize,
    pub name_column: usize,
    pub semester_columns: [usize; 3],
    pub code_strategy: CodeStrategy,
}

impl TableLayout {
    /// Number of cells a row needs for every configured column to exist.
    fn required_cells(&self) -> usize {
        let widest = self
            .semester_columns
            .iter()
            .copied()
            .chain([self.code_column, self.name_column])
            .max()
            .unwrap_or(0);
        widest + 1
    }
}

/// Column layouts for the roadmap and elective tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    pub roadmap: TableLayout,
    pub elective: TableLayout,
}

impl ExtractionRules {
    /// Code cells carry annotation text around the code
    /// (e.g. `"Elective Notes COSC2657 elective"`).
    pub fn annotated() -> Self {
        Self {
            roadmap: TableLayout {
                code_column: 1,
                name_column: 2,
                semester_columns: [4, 5, 6],
                code_strategy: CodeStrategy::Pattern,
            },
            elective: TableLayout {
                code_column: 0,
                name_column: 1,
                semester_columns: [5, 6, 7],
                code_strategy: CodeStrategy::Pattern,
            },
        }
    }

    /// Narrower tables whose code cells hold nothing but the code.
    pub fn plain() -> Self {
        Self {
            roadmap: TableLayout {
                code_column: 0,
                name_column: 1,
                semester_columns: [3, 4, 5],
                code_strategy: CodeStrategy::DirectText,
            },
            elective: TableLayout {
                code_column: 0,
                name_column: 1,
                semester_columns: [4, 5, 6],
                code_strategy: CodeStrategy::DirectText,
            },
        }
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::annotated()
    }
}

/// Roadmap cells: no control ⇒ unavailable, unchecked ⇒ available, checked ⇒ selected.
pub fn roadmap_state<N: MarkupNode>(cell: &N) -> SemesterState {
    match cell.find_first("input") {
        None => SemesterState::Unavailable,
        Some(input) if input.has_attr("checked") => SemesterState::Selected,
        Some(_) => SemesterState::Available,
    }
}

/// Elective cells: an icon element marks the slot as open.
pub fn elective_state<N: MarkupNode>(cell: &N) -> SemesterState {
    if cell.contains("i") {
        SemesterState::Available
    } else {
        SemesterState::Unavailable
    }
}

/// Turns an enrollment page into an ordered course catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogExtractor {
    rules: ExtractionRules,
}

impl CatalogExtractor {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Extract every course: roadmap first, then general, then program electives.
    ///
    /// A code seen twice in one pass keeps its first occurrence.
    pub fn extract<N: MarkupNode>(&self, document: &N) -> TrackerResult<Vec<Course>> {
        let mut courses = self.roadmap_courses(document)?;
        courses.extend(self.elective_courses(document, CourseCategory::GeneralElective)?);
        courses.extend(self.elective_courses(document, CourseCategory::ProgramElective)?);

        let mut seen = HashSet::new();
        courses.retain(|c| {
            let fresh = seen.insert(c.code.clone());
            if !fresh {
                tracing::warn!(code = %c.code, category = %c.category, "duplicate course code dropped");
            }
            fresh
        });

        tracing::debug!("extracted {} courses", courses.len());
        Ok(courses)
    }

    /// Courses from the roadmap table, excluding completed ones.
    pub fn roadmap_courses<N: MarkupNode>(&self, document: &N) -> TrackerResult<Vec<Course>> {
        let table = document
            .find_first(ROADMAP_TABLE)
            .ok_or_else(|| TrackerError::Structure(format!("missing roadmap table '{ROADMAP_TABLE}'")))?;

        let layout = &self.rules.roadmap;
        let mut courses = Vec::new();

        for (index, row) in table.find_all("tr").into_iter().enumerate().skip(ROADMAP_HEADER_ROWS) {
            if row.contains(COMPLETED_MARKER) {
                continue;
            }
            if let Some(course) = read_row(&row, index, layout, CourseCategory::Roadmap, roadmap_state) {
                courses.push(course);
            }
        }

        Ok(courses)
    }

    /// Courses from one of the elective tables.
    pub fn elective_courses<N: MarkupNode>(
        &self,
        document: &N,
        category: CourseCategory,
    ) -> TrackerResult<Vec<Course>> {
        let container_selector = match category {
            CourseCategory::ProgramElective => PROGRAM_ELECTIVE_CONTAINER,
            CourseCategory::GeneralElective => GENERAL_ELECTIVE_CONTAINER,
            CourseCategory::Roadmap => {
                return Err(TrackerError::InvalidInput(
                    "roadmap is not an elective section".to_string(),
                ))
            }
        };

        let container = document.find_first(container_selector).ok_or_else(|| {
            TrackerError::Structure(format!("missing elective container '{container_selector}'"))
        })?;
        let table = container.find_first("table").ok_or_else(|| {
            TrackerError::Structure(format!("no table inside '{container_selector}'"))
        })?;

        let layout = &self.rules.elective;
        let courses = table
            .find_all("tr")
            .into_iter()
            .enumerate()
            .skip(ELECTIVE_HEADER_ROWS)
            .filter_map(|(index, row)| read_row(&row, index, layout, category, elective_state))
            .collect();

        Ok(courses)
    }
}

/// Read one body row, or `None` (with a warning) when it cannot be read.
fn read_row<N: MarkupNode>(
    row: &N,
    index: usize,
    layout: &TableLayout,
    category: CourseCategory,
    state_of: fn(&N) -> SemesterState,
) -> Option<Course> {
    let cells = row.find_all("td");
    if cells.len() < layout.required_cells() {
        tracing::warn!(
            %category,
            row = index,
            "row has {} cells, expected at least {}; skipped",
            cells.len(),
            layout.required_cells()
        );
        return None;
    }

    let code_text = cells[layout.code_column].text();
    let Some(code) = layout.code_strategy.recover(&code_text) else {
        tracing::warn!(
            %category,
            row = index,
            "no course code in '{}'; skipped",
            code_text.trim()
        );
        return None;
    };

    let [s1, s2, s3] = layout.semester_columns;
    Some(Course {
        code,
        name: cells[layout.name_column].text().trim().to_string(),
        category,
        semesters: [state_of(&cells[s1]), state_of(&cells[s2]), state_of(&cells[s3])],
    })
}
