//! Colleges, courses, branches and academic years: the configured academic
//! hierarchy that student rows refer to by name.

mod create;
mod snapshot;

pub use create::{
    create_academic_year, create_branch, create_college, create_course, NewBranch, NewCollege,
    NewCourse,
};
pub(crate) use create::{
    check_semesters_per_year, check_total_years, check_year_semester_config, metadata_text,
    optional_code, required_name,
};
pub use snapshot::AcademicSnapshot;

use crate::error::{AdminError, AdminResult};
use crate::scope::{AccessScope, EntityRef, ScopeTarget};
use crate::structure::{
    parse_year_semester_config, resolve_stage_structure, StageStructure, StructureSource,
    YearSemesterOverride,
};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeRecord {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub is_active: bool,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub id: String,
    pub college_id: String,
    pub name: String,
    pub code: Option<String>,
    pub total_years: i64,
    pub semesters_per_year: i64,
    pub year_semester_config: Option<Vec<YearSemesterOverride>>,
    pub metadata: serde_json::Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub code: String,
    pub total_years: Option<i64>,
    pub semesters_per_year: Option<i64>,
    pub year_semester_config: Option<Vec<YearSemesterOverride>>,
    pub academic_year_id: Option<String>,
    pub metadata: serde_json::Value,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearRecord {
    pub id: String,
    pub label: String,
    pub is_active: bool,
}

impl CourseRecord {
    pub fn structure_source(&self) -> StructureSource<'_> {
        StructureSource {
            total_years: Some(self.total_years),
            semesters_per_year: Some(self.semesters_per_year),
            year_semester_config: self.year_semester_config.as_deref(),
        }
    }
}

impl BranchRecord {
    pub fn structure_source(&self) -> StructureSource<'_> {
        StructureSource {
            total_years: self.total_years,
            semesters_per_year: self.semesters_per_year,
            year_semester_config: self.year_semester_config.as_deref(),
        }
    }

    pub fn is_generic(&self) -> bool {
        self.academic_year_id.is_none()
    }
}

pub fn stage_structure(course: &CourseRecord, branch: Option<&BranchRecord>) -> StageStructure {
    let branch_src = branch.map(BranchRecord::structure_source);
    resolve_stage_structure(&course.structure_source(), branch_src.as_ref())
}

fn metadata_from_column(raw: Option<String>) -> serde_json::Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

pub(crate) const COLLEGE_COLUMNS: &str = "id, name, code, is_active, metadata";
pub(crate) const COURSE_COLUMNS: &str = "id, college_id, name, code, total_years, semesters_per_year, year_semester_config, metadata, is_active";
pub(crate) const BRANCH_COLUMNS: &str = "id, course_id, name, code, total_years, semesters_per_year, year_semester_config, academic_year_id, metadata, is_active";

pub(crate) fn college_from_row(r: &Row<'_>) -> rusqlite::Result<CollegeRecord> {
    Ok(CollegeRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        is_active: r.get::<_, i64>(3)? != 0,
        metadata: metadata_from_column(r.get(4)?),
    })
}

pub(crate) fn course_from_row(r: &Row<'_>) -> rusqlite::Result<CourseRecord> {
    let cfg: Option<String> = r.get(6)?;
    Ok(CourseRecord {
        id: r.get(0)?,
        college_id: r.get(1)?,
        name: r.get(2)?,
        code: r.get(3)?,
        total_years: r.get(4)?,
        semesters_per_year: r.get(5)?,
        year_semester_config: parse_year_semester_config(cfg.as_deref()),
        metadata: metadata_from_column(r.get(7)?),
        is_active: r.get::<_, i64>(8)? != 0,
    })
}

pub(crate) fn branch_from_row(r: &Row<'_>) -> rusqlite::Result<BranchRecord> {
    let cfg: Option<String> = r.get(6)?;
    Ok(BranchRecord {
        id: r.get(0)?,
        course_id: r.get(1)?,
        name: r.get(2)?,
        code: r.get(3)?,
        total_years: r.get(4)?,
        semesters_per_year: r.get(5)?,
        year_semester_config: parse_year_semester_config(cfg.as_deref()),
        academic_year_id: r.get(7)?,
        metadata: metadata_from_column(r.get(8)?),
        is_active: r.get::<_, i64>(9)? != 0,
    })
}

pub(crate) fn academic_year_from_row(r: &Row<'_>) -> rusqlite::Result<AcademicYearRecord> {
    Ok(AcademicYearRecord {
        id: r.get(0)?,
        label: r.get(1)?,
        is_active: r.get::<_, i64>(2)? != 0,
    })
}

pub fn find_college(conn: &Connection, id: &str) -> rusqlite::Result<Option<CollegeRecord>> {
    conn.query_row(
        &format!("SELECT {COLLEGE_COLUMNS} FROM colleges WHERE id = ?"),
        [id],
        college_from_row,
    )
    .optional()
}

pub fn find_course(conn: &Connection, id: &str) -> rusqlite::Result<Option<CourseRecord>> {
    conn.query_row(
        &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"),
        [id],
        course_from_row,
    )
    .optional()
}

pub fn find_branch(conn: &Connection, id: &str) -> rusqlite::Result<Option<BranchRecord>> {
    conn.query_row(
        &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?"),
        [id],
        branch_from_row,
    )
    .optional()
}

pub fn find_academic_year(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<AcademicYearRecord>> {
    conn.query_row(
        "SELECT id, label, is_active FROM academic_years WHERE id = ?",
        [id],
        academic_year_from_row,
    )
    .optional()
}

pub fn require_college(conn: &Connection, id: &str) -> AdminResult<CollegeRecord> {
    find_college(conn, id)?.ok_or_else(|| AdminError::not_found("college", id))
}

pub fn require_course(conn: &Connection, id: &str) -> AdminResult<CourseRecord> {
    find_course(conn, id)?.ok_or_else(|| AdminError::not_found("course", id))
}

pub fn require_branch(conn: &Connection, id: &str) -> AdminResult<BranchRecord> {
    find_branch(conn, id)?.ok_or_else(|| AdminError::not_found("branch", id))
}

/// Loads a college the scope may touch. Out-of-scope rows read as missing.
pub fn visible_college(
    conn: &Connection,
    scope: &AccessScope,
    id: &str,
) -> AdminResult<CollegeRecord> {
    let college = require_college(conn, id)?;
    if !scope.allows_college(EntityRef::new(&college.id, &college.name)) {
        return Err(AdminError::not_found("college", id));
    }
    Ok(college)
}

/// Course lookup that also requires its college to be in scope.
pub fn visible_course(
    conn: &Connection,
    scope: &AccessScope,
    id: &str,
) -> AdminResult<CourseRecord> {
    let course = require_course(conn, id)?;
    let allowed = scope.allows_course(EntityRef::new(&course.id, &course.name))
        && find_college(conn, &course.college_id)?
            .is_some_and(|c| scope.allows_college(EntityRef::new(&c.id, &c.name)));
    if !allowed {
        return Err(AdminError::not_found("course", id));
    }
    Ok(course)
}

/// Branch lookup checked against the whole college/course/branch chain.
pub fn visible_branch(
    conn: &Connection,
    scope: &AccessScope,
    id: &str,
) -> AdminResult<(CourseRecord, BranchRecord)> {
    let branch = require_branch(conn, id)?;
    if !scope.allows_branch(EntityRef::new(&branch.id, &branch.name)) {
        return Err(AdminError::not_found("branch", id));
    }
    match visible_course(conn, scope, &branch.course_id) {
        Ok(course) => Ok((course, branch)),
        Err(AdminError::NotFound { .. }) => Err(AdminError::not_found("branch", id)),
        Err(e) => Err(e),
    }
}

pub fn list_colleges(
    conn: &Connection,
    scope: &AccessScope,
    include_inactive: bool,
) -> rusqlite::Result<Vec<CollegeRecord>> {
    let pred = scope.predicate(ScopeTarget::Colleges, "c");
    let sql = format!(
        "SELECT {} FROM colleges c WHERE {} {} ORDER BY c.name",
        prefixed(COLLEGE_COLUMNS, "c"),
        pred.sql(),
        if include_inactive { "" } else { "AND c.is_active = 1" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(pred.params.iter()), college_from_row)?;
    rows.collect()
}

pub fn list_courses(
    conn: &Connection,
    scope: &AccessScope,
    college_id: Option<&str>,
    include_inactive: bool,
) -> rusqlite::Result<Vec<CourseRecord>> {
    let pred = scope.predicate(ScopeTarget::Courses, "k");
    let mut params: Vec<SqlValue> = pred.params.clone();
    let mut sql = format!(
        "SELECT {} FROM courses k WHERE {}",
        prefixed(COURSE_COLUMNS, "k"),
        pred.sql()
    );
    if let Some(cid) = college_id {
        sql.push_str(" AND k.college_id = ?");
        params.push(SqlValue::Text(cid.to_string()));
    }
    if !include_inactive {
        sql.push_str(" AND k.is_active = 1");
    }
    sql.push_str(" ORDER BY k.name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), course_from_row)?;
    rows.collect()
}

pub fn list_branches(
    conn: &Connection,
    scope: &AccessScope,
    course_id: &str,
    include_inactive: bool,
) -> rusqlite::Result<Vec<BranchRecord>> {
    let pred = scope.predicate(ScopeTarget::Branches, "b");
    let mut params: Vec<SqlValue> = vec![SqlValue::Text(course_id.to_string())];
    params.extend(pred.params.iter().cloned());
    let sql = format!(
        "SELECT {} FROM branches b
         LEFT JOIN academic_years ay ON ay.id = b.academic_year_id
         WHERE b.course_id = ? AND {} {}
         ORDER BY b.name, IFNULL(ay.label, '')",
        prefixed(BRANCH_COLUMNS, "b"),
        pred.sql(),
        if include_inactive { "" } else { "AND b.is_active = 1" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), branch_from_row)?;
    rows.collect()
}

pub fn list_academic_years(conn: &Connection) -> rusqlite::Result<Vec<AcademicYearRecord>> {
    let mut stmt =
        conn.prepare("SELECT id, label, is_active FROM academic_years ORDER BY label")?;
    let rows = stmt.query_map([], academic_year_from_row)?;
    rows.collect()
}

/// Qualifies a comma-separated column list with a table alias.
pub(crate) fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
