use crate::cascade::{
    delete_branch, delete_college, delete_course, update_branch, update_college, update_course,
    BranchPatch, CollegePatch, CoursePatch, DeleteMode,
};
use crate::catalog::{
    create_academic_year, create_branch, create_college, create_course, list_academic_years,
    list_branches, list_colleges, list_courses, stage_structure, visible_branch, visible_college,
    visible_course, NewBranch, NewCollege, NewCourse,
};
use crate::error::{AdminError, AdminResult};
use crate::ipc::helpers::{
    metadata, nullable_i64, nullable_str, opt_bool, opt_i64, opt_str, overrides, scope, str_param,
    to_value, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::scope::{AccessScope, EntityRef};
use crate::setup::StructureSettings;
use rusqlite::Connection;
use serde_json::{json, Value};

fn delete_mode(req: &Request) -> AdminResult<DeleteMode> {
    Ok(DeleteMode::from_flags(
        opt_bool(req, "hard")?.unwrap_or(false),
        opt_bool(req, "cascade")?.unwrap_or(false),
    ))
}

/// A restricted caller may not create or rename a row out of its own reach.
fn new_name_in_scope(
    scope: &AccessScope,
    what: &str,
    name: Option<&str>,
    allows: impl Fn(&AccessScope, EntityRef<'_>) -> bool,
    id: &str,
) -> AdminResult<()> {
    match name {
        Some(n) if !allows(scope, EntityRef::new(id, n)) => Err(AdminError::bad_params(format!(
            "{what} '{}' is outside your access scope",
            n.trim()
        ))),
        _ => Ok(()),
    }
}

fn include_inactive(req: &Request) -> AdminResult<bool> {
    Ok(opt_bool(req, "includeInactive")?.unwrap_or(false))
}

fn colleges_list(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let colleges = list_colleges(conn, &scope(req)?, include_inactive(req)?)?;
    Ok(json!({ "colleges": colleges }))
}

fn colleges_get(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let college = visible_college(conn, &scope(req)?, str_param(req, "collegeId")?)?;
    Ok(json!({ "college": college }))
}

fn colleges_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let name = str_param(req, "name")?;
    new_name_in_scope(&scope(req)?, "College", Some(name), AccessScope::allows_college, "")?;
    let college = create_college(
        conn,
        &NewCollege {
            name: name.to_string(),
            code: opt_str(req, "code")?.map(str::to_string),
            metadata: metadata(req)?,
        },
    )?;
    Ok(json!({ "college": college }))
}

fn colleges_update(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let college = visible_college(conn, &scope, str_param(req, "collegeId")?)?;
    let patch = CollegePatch {
        name: opt_str(req, "name")?.map(str::to_string),
        code: nullable_str(req, "code")?,
        is_active: opt_bool(req, "isActive")?,
        metadata: metadata(req)?,
    };
    new_name_in_scope(
        &scope,
        "College",
        patch.name.as_deref(),
        AccessScope::allows_college,
        &college.id,
    )?;
    let out = update_college(conn, &college.id, &patch)?;
    Ok(json!({ "college": out.record, "studentsUpdated": out.students_updated }))
}

fn colleges_delete(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let college = visible_college(conn, &scope(req)?, str_param(req, "collegeId")?)?;
    to_value(&delete_college(conn, &college.id, delete_mode(req)?)?)
}

fn courses_list(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let courses = list_courses(
        conn,
        &scope(req)?,
        opt_str(req, "collegeId")?,
        include_inactive(req)?,
    )?;
    Ok(json!({ "courses": courses }))
}

fn courses_get(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let course = visible_course(conn, &scope(req)?, str_param(req, "courseId")?)?;
    let structure = stage_structure(&course, None);
    Ok(json!({ "course": course, "structure": structure }))
}

fn courses_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let college = visible_college(conn, &scope, str_param(req, "collegeId")?)?;
    let name = str_param(req, "name")?;
    new_name_in_scope(&scope, "Course", Some(name), AccessScope::allows_course, "")?;
    let defaults = StructureSettings::load(conn)?;
    let course = create_course(
        conn,
        &NewCourse {
            college_id: college.id,
            name: name.to_string(),
            code: opt_str(req, "code")?.map(str::to_string),
            total_years: opt_i64(req, "totalYears")?.unwrap_or(defaults.default_total_years),
            semesters_per_year: opt_i64(req, "semestersPerYear")?
                .unwrap_or(defaults.default_semesters_per_year),
            year_semester_config: overrides(req, "yearSemesterConfig")?.flatten(),
            metadata: metadata(req)?,
        },
    )?;
    Ok(json!({ "course": course }))
}

fn courses_update(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let course = visible_course(conn, &scope, str_param(req, "courseId")?)?;
    let patch = CoursePatch {
        name: opt_str(req, "name")?.map(str::to_string),
        code: nullable_str(req, "code")?,
        total_years: opt_i64(req, "totalYears")?,
        semesters_per_year: opt_i64(req, "semestersPerYear")?,
        year_semester_config: overrides(req, "yearSemesterConfig")?,
        is_active: opt_bool(req, "isActive")?,
        metadata: metadata(req)?,
    };
    new_name_in_scope(
        &scope,
        "Course",
        patch.name.as_deref(),
        AccessScope::allows_course,
        &course.id,
    )?;
    let out = update_course(conn, &course.id, &patch)?;
    Ok(json!({ "course": out.record, "studentsUpdated": out.students_updated }))
}

fn courses_delete(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let course = visible_course(conn, &scope(req)?, str_param(req, "courseId")?)?;
    to_value(&delete_course(conn, &course.id, delete_mode(req)?)?)
}

fn courses_structure(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let course = visible_course(conn, &scope, str_param(req, "courseId")?)?;
    let branch = match opt_str(req, "branchId")? {
        Some(id) => {
            let (_, branch) = visible_branch(conn, &scope, id)?;
            if branch.course_id != course.id {
                return Err(AdminError::bad_params(format!(
                    "branch '{}' does not belong to course '{}'",
                    branch.name, course.name
                )));
            }
            Some(branch)
        }
        None => None,
    };
    let structure = stage_structure(&course, branch.as_ref());
    Ok(json!({ "structure": structure }))
}

fn branches_list(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let course = visible_course(conn, &scope, str_param(req, "courseId")?)?;
    let branches = list_branches(conn, &scope, &course.id, include_inactive(req)?)?;
    Ok(json!({ "branches": branches }))
}

fn branches_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let course = visible_course(conn, &scope, str_param(req, "courseId")?)?;
    let name = str_param(req, "name")?;
    new_name_in_scope(&scope, "Branch", Some(name), AccessScope::allows_branch, "")?;
    let created = create_branch(
        conn,
        &NewBranch {
            course_id: course.id,
            name: name.to_string(),
            code: str_param(req, "code")?.to_string(),
            total_years: opt_i64(req, "totalYears")?,
            semesters_per_year: opt_i64(req, "semestersPerYear")?,
            year_semester_config: overrides(req, "yearSemesterConfig")?.flatten(),
            academic_year_id: opt_str(req, "academicYearId")?.map(str::to_string),
            metadata: metadata(req)?,
        },
    )?;
    Ok(json!({ "branch": created.branch, "upgraded": created.upgraded }))
}

fn branches_update(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let (_, branch) = visible_branch(conn, &scope, str_param(req, "branchId")?)?;
    let patch = BranchPatch {
        name: opt_str(req, "name")?.map(str::to_string),
        code: opt_str(req, "code")?.map(str::to_string),
        total_years: nullable_i64(req, "totalYears")?,
        semesters_per_year: nullable_i64(req, "semestersPerYear")?,
        year_semester_config: overrides(req, "yearSemesterConfig")?,
        academic_year_id: nullable_str(req, "academicYearId")?,
        is_active: opt_bool(req, "isActive")?,
        metadata: metadata(req)?,
    };
    new_name_in_scope(
        &scope,
        "Branch",
        patch.name.as_deref(),
        AccessScope::allows_branch,
        &branch.id,
    )?;
    let out = update_branch(conn, &branch.id, &patch)?;
    Ok(json!({ "branch": out.record, "studentsUpdated": out.students_updated }))
}

fn branches_delete(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let (_, branch) = visible_branch(conn, &scope(req)?, str_param(req, "branchId")?)?;
    to_value(&delete_branch(conn, &branch.id, delete_mode(req)?)?)
}

fn academic_years_list(conn: &Connection, _req: &Request) -> AdminResult<Value> {
    Ok(json!({ "academicYears": list_academic_years(conn)? }))
}

fn academic_years_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let year = create_academic_year(conn, str_param(req, "label")?)?;
    Ok(json!({ "academicYear": year }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "colleges.list" => colleges_list,
        "colleges.get" => colleges_get,
        "colleges.create" => colleges_create,
        "colleges.update" => colleges_update,
        "colleges.delete" => colleges_delete,
        "courses.list" => courses_list,
        "courses.get" => courses_get,
        "courses.create" => courses_create,
        "courses.update" => courses_update,
        "courses.delete" => courses_delete,
        "courses.structure" => courses_structure,
        "branches.list" => branches_list,
        "branches.create" => branches_create,
        "branches.update" => branches_update,
        "branches.delete" => branches_delete,
        "academicYears.list" => academic_years_list,
        "academicYears.create" => academic_years_create,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
