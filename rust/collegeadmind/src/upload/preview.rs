use super::draft::StudentDraft;
use super::fields::{HeaderMap, StudentField};
use super::seal::RowSealer;
use super::sheet::{parse_sheet, ParsedSheet, SheetFormat};
use super::validate::{RowValidator, ValidationContext, ValidationIssue};
use crate::catalog::{visible_college, AcademicSnapshot};
use crate::db;
use crate::error::{AdminError, AdminResult};
use crate::scope::AccessScope;
use crate::setup::UploadSettings;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRecord {
    pub row_number: usize,
    pub raw_data: Map<String, Value>,
    pub sanitized_data: StudentDraft,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seal: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issue_details: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub total_rows: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub college_id: Option<String>,
    pub valid_records: Vec<PreviewRecord>,
    pub invalid_records: Vec<PreviewRecord>,
    pub summary: PreviewSummary,
    pub unmapped_headers: Vec<String>,
}

pub struct PreviewInput<'a> {
    pub bytes: &'a [u8],
    pub format: SheetFormat,
    pub college_id: Option<&'a str>,
    pub form_id: Option<&'a str>,
    pub scope: &'a AccessScope,
}

/// Parses and validates an upload. Reads the catalog and the stored admission
/// numbers; writes nothing.
pub fn build_preview(conn: &Connection, input: &PreviewInput<'_>) -> AdminResult<BulkPreview> {
    let settings = UploadSettings::load(conn)?;
    let selected = input
        .college_id
        .map(|id| visible_college(conn, input.scope, id))
        .transpose()?;

    let sheet = parse_sheet(input.bytes, input.format)?;
    if sheet.rows.len() > settings.max_rows {
        return Err(AdminError::InvalidUpload(format!(
            "upload has {} rows; the limit is {}",
            sheet.rows.len(),
            settings.max_rows
        )));
    }
    let map = HeaderMap::resolve(&sheet.headers);
    if map.columns.iter().all(Option::is_none) {
        return Err(AdminError::InvalidUpload(
            "none of the column headers match a known student field".into(),
        ));
    }
    if !map.unmapped.is_empty() {
        debug!(headers = ?map.unmapped, "upload columns left unmapped");
    }

    let snapshot = AcademicSnapshot::load(conn)?;
    let existing = existing_admission_numbers(conn, &sheet, &map)?;
    let sealer = RowSealer::new(db::seal_key(conn)?);
    let ctx = ValidationContext {
        snapshot: &snapshot,
        selected_college: selected.as_ref(),
        scope: input.scope,
        existing_admission_numbers: &existing,
        auto_generate_admission_numbers: settings.auto_generate_admission_numbers,
        default_status: settings.default_student_status,
    };

    let mut preview = classify(&sheet, &map, ctx, &sealer);
    preview.form_id = input.form_id.map(str::to_string);
    preview.college_id = selected.map(|c| c.id);
    info!(
        total = preview.summary.total_rows,
        valid = preview.summary.valid_count,
        invalid = preview.summary.invalid_count,
        "bulk upload preview built"
    );
    Ok(preview)
}

/// Runs every row through the validator in file order.
pub fn classify(
    sheet: &ParsedSheet,
    map: &HeaderMap,
    ctx: ValidationContext<'_>,
    sealer: &RowSealer,
) -> BulkPreview {
    let mut validator = RowValidator::new(ctx);
    let mut valid_records = Vec::new();
    let mut invalid_records = Vec::new();
    for row in &sheet.rows {
        let outcome = validator.validate_row(map, row);
        if outcome.is_valid() {
            valid_records.push(PreviewRecord {
                row_number: outcome.row_number,
                seal: Some(sealer.seal(outcome.row_number, &outcome.sanitized)),
                raw_data: outcome.raw_data,
                sanitized_data: outcome.sanitized,
                issues: Vec::new(),
                issue_details: Vec::new(),
            });
        } else {
            invalid_records.push(PreviewRecord {
                row_number: outcome.row_number,
                raw_data: outcome.raw_data,
                sanitized_data: outcome.sanitized,
                seal: None,
                issues: outcome.issues.iter().map(|i| i.message.clone()).collect(),
                issue_details: outcome.issues,
            });
        }
    }
    BulkPreview {
        form_id: None,
        college_id: None,
        summary: PreviewSummary {
            total_rows: sheet.rows.len(),
            valid_count: valid_records.len(),
            invalid_count: invalid_records.len(),
        },
        valid_records,
        invalid_records,
        unmapped_headers: map.unmapped.clone(),
    }
}

/// Lowercased admission numbers from the sheet that are already stored.
fn existing_admission_numbers(
    conn: &Connection,
    sheet: &ParsedSheet,
    map: &HeaderMap,
) -> rusqlite::Result<HashSet<String>> {
    let mut out = HashSet::new();
    let Some(col) = map
        .columns
        .iter()
        .position(|c| *c == Some(StudentField::AdmissionNumber))
    else {
        return Ok(out);
    };
    let mut stmt = conn.prepare("SELECT 1 FROM students WHERE admission_number = ?")?;
    let mut checked = HashSet::new();
    for row in &sheet.rows {
        let Some(adm) = row.cells.get(col).map(|c| c.trim()).filter(|c| !c.is_empty()) else {
            continue;
        };
        let key = adm.to_lowercase();
        if !checked.insert(key.clone()) {
            continue;
        }
        let hit: Option<i64> = stmt.query_row([adm], |r| r.get(0)).optional()?;
        if hit.is_some() {
            out.insert(key);
        }
    }
    Ok(out)
}
