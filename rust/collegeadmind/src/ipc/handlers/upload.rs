use crate::error::{AdminError, AdminResult};
use crate::ipc::helpers::{opt_str, scope, str_param, to_value, with_db};
use crate::ipc::types::{AppState, Request};
use crate::upload::{build_preview, commit_rows, CommitRow, PreviewInput, SheetFormat};
use rusqlite::Connection;
use serde_json::Value;

fn bulk_preview(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let in_path = str_param(req, "inPath")?;
    let bytes = std::fs::read(in_path)?;
    let format = SheetFormat::detect(opt_str(req, "mimeType")?, Some(in_path), &bytes)?;
    let scope = scope(req)?;
    let preview = build_preview(
        conn,
        &PreviewInput {
            bytes: &bytes,
            format,
            college_id: opt_str(req, "collegeId")?,
            form_id: opt_str(req, "formId")?,
            scope: &scope,
        },
    )?;
    to_value(&preview)
}

fn bulk_commit(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let records = req
        .params
        .get("records")
        .cloned()
        .ok_or_else(|| AdminError::bad_params("missing records"))?;
    let rows: Vec<CommitRow> = serde_json::from_value(records)
        .map_err(|e| AdminError::bad_params(format!("records are malformed: {e}")))?;
    let report = commit_rows(conn, &scope(req)?, &rows, opt_str(req, "collegeId")?)?;
    to_value(&report)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "students.bulkUpload.preview" => bulk_preview,
        "students.bulkUpload.commit" => bulk_commit,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
