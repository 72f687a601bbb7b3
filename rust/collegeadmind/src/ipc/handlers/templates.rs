use crate::catalog::{list_branches, list_courses};
use crate::error::{AdminError, AdminResult};
use crate::ipc::helpers::{opt_str, scope, str_param, with_db};
use crate::ipc::types::{AppState, Request};
use crate::upload::StudentField;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::info;

fn template_fields() -> Vec<Value> {
    StudentField::ALL
        .iter()
        .map(|f| {
            json!({
                "key": f.json_key(),
                "label": f.label(),
                "required": StudentField::REQUIRED.contains(f),
            })
        })
        .collect()
}

/// Course and branch choices the caller may upload into. Branch rows that
/// share a name (generic and per-year) are listed once.
fn template_metadata(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let scope = scope(req)?;
    let mut course_options = Vec::new();
    for course in list_courses(conn, &scope, opt_str(req, "collegeId")?, false)? {
        let mut seen = HashSet::new();
        let branches: Vec<Value> = list_branches(conn, &scope, &course.id, false)?
            .into_iter()
            .filter(|b| seen.insert(b.name.to_lowercase()))
            .map(|b| json!({ "id": b.id, "name": b.name }))
            .collect();
        course_options.push(json!({
            "id": course.id,
            "name": course.name,
            "branches": branches,
        }));
    }
    Ok(json!({
        "formId": opt_str(req, "formId")?,
        "courseOptions": course_options,
        "fields": template_fields(),
    }))
}

fn csv_error(e: csv::Error) -> AdminError {
    AdminError::Io(std::io::Error::other(e.to_string()))
}

/// Writes a header-only CSV the upload accepts as is.
fn template_export_csv(_conn: &Connection, req: &Request) -> AdminResult<Value> {
    let out_path = str_param(req, "outPath")?;
    let labels: Vec<&str> = StudentField::ALL.iter().map(|f| f.label()).collect();
    let mut writer = csv::Writer::from_path(out_path).map_err(csv_error)?;
    writer.write_record(&labels).map_err(csv_error)?;
    writer.flush()?;
    info!(path = %out_path, "upload template written");
    Ok(json!({ "outPath": out_path, "columns": labels }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "templates.metadata" => template_metadata,
        "templates.exportCsv" => template_export_csv,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
