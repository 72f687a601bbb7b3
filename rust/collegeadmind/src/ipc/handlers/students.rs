use crate::error::AdminResult;
use crate::ipc::helpers::{object_param, opt_i64, opt_str, scope, str_param, to_value, with_db};
use crate::ipc::types::{AppState, Request};
use crate::students::{
    create_student, delete_student, get_student, list_students, update_student, StudentFilter,
};
use rusqlite::Connection;
use serde_json::{json, Value};

fn students_list(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let text = |key: &str| -> AdminResult<Option<String>> {
        Ok(opt_str(req, key)?.map(str::to_string))
    };
    let filter = StudentFilter {
        college: text("college")?,
        course: text("course")?,
        branch: text("branch")?,
        batch: text("batch")?,
        search: text("search")?,
        limit: opt_i64(req, "limit")?,
        offset: opt_i64(req, "offset")?,
    };
    to_value(&list_students(conn, &scope(req)?, &filter)?)
}

fn students_get(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let student = get_student(conn, &scope(req)?, str_param(req, "studentId")?)?;
    Ok(json!({ "student": student }))
}

fn students_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let student = create_student(conn, &scope(req)?, object_param(req, "student")?)?;
    Ok(json!({ "student": student }))
}

fn students_update(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let student = update_student(
        conn,
        &scope(req)?,
        str_param(req, "studentId")?,
        object_param(req, "patch")?,
    )?;
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let fees = delete_student(conn, &scope(req)?, str_param(req, "studentId")?)?;
    Ok(json!({ "deleted": true, "deletedFeeRecords": fees }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "students.list" => students_list,
        "students.get" => students_get,
        "students.create" => students_create,
        "students.update" => students_update,
        "students.delete" => students_delete,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
