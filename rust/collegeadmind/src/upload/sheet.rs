use crate::error::{AdminError, AdminResult};
use calamine::{open_workbook_from_rs, Data, DataType, Reader, Xlsx};
use std::io::Cursor;
use zip::ZipArchive;

const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Xlsx,
}

impl SheetFormat {
    /// Resolves the declared type from the mime type, falling back to the
    /// file extension. The bytes are only consulted for the ambiguous
    /// `application/vnd.ms-excel`, which browsers send for plain CSV files.
    pub fn detect(mime: Option<&str>, file_name: Option<&str>, bytes: &[u8]) -> AdminResult<Self> {
        let mime = mime.map(|m| {
            m.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        });
        match mime.as_deref() {
            Some("text/csv") | Some("application/csv") | Some("text/plain") => Ok(Self::Csv),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet") => {
                Ok(Self::Xlsx)
            }
            Some("application/vnd.ms-excel") => {
                if bytes.starts_with(&ZIP_SIGNATURE) {
                    Ok(Self::Xlsx)
                } else {
                    Ok(Self::Csv)
                }
            }
            Some("") | Some("application/octet-stream") | None => {
                let ext = file_name
                    .and_then(|n| n.rsplit_once('.'))
                    .map(|(_, e)| e.to_ascii_lowercase());
                match ext.as_deref() {
                    Some("csv") | Some("txt") => Ok(Self::Csv),
                    Some("xlsx") => Ok(Self::Xlsx),
                    _ => Err(AdminError::InvalidUpload(
                        "unsupported file type: upload a .csv or .xlsx file".into(),
                    )),
                }
            }
            Some(other) => Err(AdminError::InvalidUpload(format!(
                "unsupported file type '{other}': upload a .csv or .xlsx file"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based position below the header row in the source file.
    pub row_number: usize,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

pub fn parse_sheet(bytes: &[u8], format: SheetFormat) -> AdminResult<ParsedSheet> {
    if bytes.is_empty() {
        return Err(AdminError::InvalidUpload("uploaded file is empty".into()));
    }
    let sheet = match format {
        SheetFormat::Csv => parse_csv(bytes)?,
        SheetFormat::Xlsx => parse_xlsx(bytes)?,
    };
    if sheet.rows.is_empty() {
        return Err(AdminError::InvalidUpload(
            "uploaded file contains no data rows".into(),
        ));
    }
    Ok(sheet)
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn parse_csv(bytes: &[u8]) -> AdminResult<ParsedSheet> {
    if bytes.starts_with(&ZIP_SIGNATURE) {
        return Err(AdminError::InvalidUpload(
            "file was declared as CSV but contains a spreadsheet archive".into(),
        ));
    }
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(body)
        .map_err(|_| AdminError::InvalidUpload("CSV file is not valid UTF-8 text".into()))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    // Rows are counted as records, not lines: a quoted cell may span lines.
    // Blank records still take a number so later rows line up with the sheet.
    let mut header: Option<Vec<String>> = None;
    let mut seen = 0;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| AdminError::InvalidUpload(format!("CSV could not be parsed: {e}")))?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        if header.is_none() {
            if !is_blank(&cells) {
                header = Some(cells);
            }
            continue;
        }
        seen += 1;
        if !is_blank(&cells) {
            rows.push(SheetRow {
                row_number: seen,
                cells,
            });
        }
    }

    let Some(headers) = header else {
        return Err(AdminError::InvalidUpload(
            "uploaded file has no header row".into(),
        ));
    };
    Ok(ParsedSheet { headers, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        other => other.to_string().trim().to_string(),
    }
}

fn parse_xlsx(bytes: &[u8]) -> AdminResult<ParsedSheet> {
    // Confirm the archive is really a workbook before handing it to the reader.
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|_| {
        AdminError::InvalidUpload("file was declared as XLSX but is not a spreadsheet".into())
    })?;
    if archive.by_name("xl/workbook.xml").is_err() {
        return Err(AdminError::InvalidUpload(
            "file was declared as XLSX but has no workbook".into(),
        ));
    }

    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AdminError::InvalidUpload(format!("XLSX could not be opened: {e}")))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(r)) => r,
        Some(Err(e)) => {
            return Err(AdminError::InvalidUpload(format!(
                "first worksheet could not be read: {e}"
            )))
        }
        None => {
            return Err(AdminError::InvalidUpload(
                "workbook has no worksheets".into(),
            ))
        }
    };

    // Range rows are relative to the first used cell.
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let mut header: Option<(usize, Vec<String>)> = None;
    let mut rows = Vec::new();
    for (offset, row) in range.rows().enumerate() {
        let sheet_row = first_row + offset;
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        match &header {
            None => {
                if !is_blank(&cells) {
                    header = Some((sheet_row, cells));
                }
            }
            Some((header_row, _)) => {
                if is_blank(&cells) {
                    continue;
                }
                rows.push(SheetRow {
                    row_number: sheet_row - header_row,
                    cells,
                });
            }
        }
    }

    let Some((_, headers)) = header else {
        return Err(AdminError::InvalidUpload(
            "uploaded file has no header row".into(),
        ));
    };
    Ok(ParsedSheet { headers, rows })
}
