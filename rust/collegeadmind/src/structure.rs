use serde::{Deserialize, Serialize};

pub const MIN_TOTAL_YEARS: i64 = 1;
pub const MAX_TOTAL_YEARS: i64 = 10;
pub const MIN_SEMESTERS_PER_YEAR: i64 = 1;
pub const MAX_SEMESTERS_PER_YEAR: i64 = 4;

/// Overrides the semester count for one year of a course or branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSemesterOverride {
    pub year: i64,
    pub semesters: i64,
}

/// The structural fields of a course or branch. Branch values take precedence
/// over the owning course when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureSource<'a> {
    pub total_years: Option<i64>,
    pub semesters_per_year: Option<i64>,
    pub year_semester_config: Option<&'a [YearSemesterOverride]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSemester {
    pub semester_number: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageYear {
    pub year_number: i64,
    pub label: String,
    pub semesters: Vec<StageSemester>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStructure {
    pub total_years: i64,
    pub semesters_per_year: i64,
    pub years: Vec<StageYear>,
}

impl StageStructure {
    pub fn semesters_in_year(&self, year: i64) -> Option<i64> {
        self.years
            .iter()
            .find(|y| y.year_number == year)
            .map(|y| y.semesters.len() as i64)
    }

    /// True when `(year, semester)` names a stage of this structure.
    pub fn contains(&self, year: i64, semester: i64) -> bool {
        match self.semesters_in_year(year) {
            Some(count) => semester >= 1 && semester <= count,
            None => false,
        }
    }
}

pub fn clamp_total_years(v: i64) -> i64 {
    v.clamp(MIN_TOTAL_YEARS, MAX_TOTAL_YEARS)
}

pub fn clamp_semesters_per_year(v: i64) -> i64 {
    v.clamp(MIN_SEMESTERS_PER_YEAR, MAX_SEMESTERS_PER_YEAR)
}

/// Expands a course (and optional branch) into its year/semester stages.
///
/// Out-of-range values are clamped rather than rejected. When neither source
/// carries a year count the structure has no years and callers must treat it
/// as "no valid stage".
pub fn resolve_stage_structure(
    course: &StructureSource<'_>,
    branch: Option<&StructureSource<'_>>,
) -> StageStructure {
    let pick = |f: fn(&StructureSource<'_>) -> Option<i64>| {
        branch.and_then(f).or_else(|| f(course))
    };

    let total_years = pick(|s| s.total_years).map(clamp_total_years).unwrap_or(0);
    let semesters_per_year = pick(|s| s.semesters_per_year)
        .map(clamp_semesters_per_year)
        .unwrap_or(MIN_SEMESTERS_PER_YEAR);
    let overrides = branch
        .and_then(|b| b.year_semester_config)
        .or(course.year_semester_config)
        .unwrap_or(&[]);

    let years = (1..=total_years)
        .map(|year_number| {
            let count = overrides
                .iter()
                .find(|o| o.year == year_number)
                .map(|o| clamp_semesters_per_year(o.semesters))
                .unwrap_or(semesters_per_year);
            StageYear {
                year_number,
                label: format!("Year {year_number}"),
                semesters: (1..=count)
                    .map(|semester_number| StageSemester {
                        semester_number,
                        label: format!("Semester {semester_number}"),
                    })
                    .collect(),
            }
        })
        .collect();

    StageStructure {
        total_years,
        semesters_per_year,
        years,
    }
}

/// Parses a stored `year_semester_config` JSON column. Malformed JSON is
/// treated as "no overrides".
pub fn parse_year_semester_config(raw: Option<&str>) -> Option<Vec<YearSemesterOverride>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed: Vec<YearSemesterOverride> = serde_json::from_str(raw).ok()?;
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}
