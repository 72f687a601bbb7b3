use super::{
    find_academic_year, require_branch, require_college, require_course, AcademicYearRecord,
    BranchRecord, CollegeRecord, CourseRecord,
};
use crate::db::now_rfc3339;
use crate::error::{conflict_on_unique, AdminError, AdminResult};
use crate::structure::{
    YearSemesterOverride, MAX_SEMESTERS_PER_YEAR, MAX_TOTAL_YEARS, MIN_SEMESTERS_PER_YEAR,
    MIN_TOTAL_YEARS,
};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewCollege {
    pub name: String,
    pub code: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub college_id: String,
    pub name: String,
    pub code: Option<String>,
    pub total_years: i64,
    pub semesters_per_year: i64,
    pub year_semester_config: Option<Vec<YearSemesterOverride>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewBranch {
    pub course_id: String,
    pub name: String,
    pub code: String,
    pub total_years: Option<i64>,
    pub semesters_per_year: Option<i64>,
    pub year_semester_config: Option<Vec<YearSemesterOverride>>,
    pub academic_year_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct BranchCreated {
    pub branch: BranchRecord,
    /// The request upgraded an existing generic row instead of inserting.
    pub upgraded: bool,
}

pub(crate) fn check_total_years(v: i64) -> AdminResult<i64> {
    if !(MIN_TOTAL_YEARS..=MAX_TOTAL_YEARS).contains(&v) {
        return Err(AdminError::bad_params(format!(
            "totalYears must be in {MIN_TOTAL_YEARS}..={MAX_TOTAL_YEARS}"
        )));
    }
    Ok(v)
}

pub(crate) fn check_semesters_per_year(v: i64) -> AdminResult<i64> {
    if !(MIN_SEMESTERS_PER_YEAR..=MAX_SEMESTERS_PER_YEAR).contains(&v) {
        return Err(AdminError::bad_params(format!(
            "semestersPerYear must be in {MIN_SEMESTERS_PER_YEAR}..={MAX_SEMESTERS_PER_YEAR}"
        )));
    }
    Ok(v)
}

/// Rejects override lists with repeated or out-of-range entries and
/// serializes the accepted list for storage.
pub(crate) fn check_year_semester_config(
    cfg: Option<&[YearSemesterOverride]>,
    total_years: Option<i64>,
) -> AdminResult<Option<String>> {
    let Some(cfg) = cfg else {
        return Ok(None);
    };
    if cfg.is_empty() {
        return Ok(None);
    }
    let max_year = total_years.unwrap_or(MAX_TOTAL_YEARS);
    let mut seen = Vec::new();
    for o in cfg {
        if o.year < 1 || o.year > max_year {
            return Err(AdminError::bad_params(format!(
                "yearSemesterConfig year {} is outside 1..={max_year}",
                o.year
            )));
        }
        check_semesters_per_year(o.semesters)?;
        if seen.contains(&o.year) {
            return Err(AdminError::bad_params(format!(
                "yearSemesterConfig lists year {} more than once",
                o.year
            )));
        }
        seen.push(o.year);
    }
    let mut sorted = cfg.to_vec();
    sorted.sort_by_key(|o| o.year);
    serde_json::to_string(&sorted)
        .map(Some)
        .map_err(|e| AdminError::bad_params(e.to_string()))
}

pub(crate) fn required_name(v: &str, field: &str) -> AdminResult<String> {
    let t = v.trim();
    if t.is_empty() {
        return Err(AdminError::bad_params(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

pub(crate) fn optional_code(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub(crate) fn metadata_text(v: Option<&serde_json::Value>) -> String {
    v.filter(|m| m.is_object())
        .map(|m| m.to_string())
        .unwrap_or_else(|| "{}".to_string())
}

pub fn create_college(conn: &Connection, new: &NewCollege) -> AdminResult<CollegeRecord> {
    let name = required_name(&new.name, "name")?;
    let code = optional_code(new.code.as_deref());
    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO colleges(id, name, code, is_active, metadata, created_at, updated_at)
         VALUES(?, ?, ?, 1, ?, ?, ?)",
        (
            &id,
            &name,
            &code,
            metadata_text(new.metadata.as_ref()),
            &now,
            &now,
        ),
    )
    .map_err(|e| conflict_on_unique(e, format!("College name or code already exists: '{name}'")))?;
    info!(college_id = %id, name = %name, "college created");
    require_college(conn, &id)
}

pub fn create_course(conn: &Connection, new: &NewCourse) -> AdminResult<CourseRecord> {
    let college = require_college(conn, &new.college_id)?;
    let name = required_name(&new.name, "name")?;
    let code = optional_code(new.code.as_deref());
    let total_years = check_total_years(new.total_years)?;
    let semesters_per_year = check_semesters_per_year(new.semesters_per_year)?;
    let cfg = check_year_semester_config(new.year_semester_config.as_deref(), Some(total_years))?;

    let id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO courses(id, college_id, name, code, total_years, semesters_per_year, year_semester_config, metadata, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &id,
            &college.id,
            &name,
            &code,
            total_years,
            semesters_per_year,
            &cfg,
            metadata_text(new.metadata.as_ref()),
            &now,
            &now,
        ),
    )
    .map_err(|e| conflict_on_unique(e, format!("Course name or code already exists: '{name}'")))?;
    info!(course_id = %id, college = %college.name, name = %name, "course created");
    require_course(conn, &id)
}

/// Creates a branch. A per-year request whose name and code match the
/// course's generic (no academic year) row upgrades that row in place,
/// keeping its stored name so student rows still refer to it. If the names
/// differ, or another writer upgraded the row first, a distinct row is
/// inserted instead.
pub fn create_branch(conn: &Connection, new: &NewBranch) -> AdminResult<BranchCreated> {
    let course = require_course(conn, &new.course_id)?;
    let name = required_name(&new.name, "name")?;
    let code = required_name(&new.code, "code")?;
    let total_years = new.total_years.map(check_total_years).transpose()?;
    let semesters_per_year = new
        .semesters_per_year
        .map(check_semesters_per_year)
        .transpose()?;
    let cfg = check_year_semester_config(
        new.year_semester_config.as_deref(),
        Some(total_years.unwrap_or(course.total_years)),
    )?;
    if let Some(year_id) = new.academic_year_id.as_deref() {
        if find_academic_year(conn, year_id)?.is_none() {
            return Err(AdminError::not_found("academic year", year_id));
        }
    }
    let metadata = metadata_text(new.metadata.as_ref());
    let now = now_rfc3339();
    let conflict_msg = || {
        format!(
            "Branch '{name}' ({code}) already exists under course '{}' for this academic year",
            course.name
        )
    };

    if let Some(year_id) = new.academic_year_id.as_deref() {
        let generic: Option<String> = conn
            .query_row(
                "SELECT id FROM branches
                 WHERE course_id = ? AND code = ? AND LOWER(name) = LOWER(?)
                   AND academic_year_id IS NULL",
                (&course.id, &code, &name),
                |r| r.get(0),
            )
            .optional()?;
        if let Some(generic_id) = generic {
            let changed = conn
                .execute(
                    "UPDATE branches
                     SET academic_year_id = ?, total_years = ?, semesters_per_year = ?,
                         year_semester_config = ?, metadata = ?, is_active = 1, updated_at = ?
                     WHERE id = ? AND academic_year_id IS NULL",
                    (
                        year_id,
                        total_years,
                        semesters_per_year,
                        &cfg,
                        &metadata,
                        &now,
                        &generic_id,
                    ),
                )
                .map_err(|e| conflict_on_unique(e, conflict_msg()))?;
            if changed == 1 {
                info!(branch_id = %generic_id, academic_year_id = %year_id, "generic branch upgraded to academic year");
                return Ok(BranchCreated {
                    branch: require_branch(conn, &generic_id)?,
                    upgraded: true,
                });
            }
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO branches(id, course_id, name, code, total_years, semesters_per_year, year_semester_config, academic_year_id, metadata, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &id,
            &course.id,
            &name,
            &code,
            total_years,
            semesters_per_year,
            &cfg,
            &new.academic_year_id,
            &metadata,
            &now,
            &now,
        ),
    )
    .map_err(|e| conflict_on_unique(e, conflict_msg()))?;
    info!(branch_id = %id, course = %course.name, name = %name, "branch created");
    Ok(BranchCreated {
        branch: require_branch(conn, &id)?,
        upgraded: false,
    })
}

pub fn create_academic_year(conn: &Connection, label: &str) -> AdminResult<AcademicYearRecord> {
    let label = required_name(label, "label")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO academic_years(id, label, is_active, created_at) VALUES(?, ?, 1, ?)",
        (&id, &label, now_rfc3339()),
    )
    .map_err(|e| conflict_on_unique(e, format!("Academic year '{label}' already exists")))?;
    Ok(AcademicYearRecord {
        id,
        label,
        is_active: true,
    })
}
