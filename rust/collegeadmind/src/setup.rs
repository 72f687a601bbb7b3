//! Workspace configuration stored as JSON sections in the `settings` table.

use crate::db;
use crate::error::{AdminError, AdminResult};
use crate::upload::StudentStatus;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Upload,
    Structure,
}

impl SetupSection {
    pub const ALL: [Self; 2] = [Self::Upload, Self::Structure];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "structure" => Some(Self::Structure),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Structure => "structure",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Upload => "setup.upload",
            Self::Structure => "setup.structure",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Upload => json!({
            "autoGenerateAdmissionNumbers": false,
            "admissionNumberPrefix": "ADM",
            "maxRows": 5000,
            "defaultStudentStatus": "Regular",
            "requireSealedRows": false
        }),
        SetupSection::Structure => json!({
            "defaultTotalYears": 4,
            "defaultSemestersPerYear": 2
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    pub auto_generate_admission_numbers: bool,
    pub admission_number_prefix: String,
    pub max_rows: usize,
    pub default_student_status: StudentStatus,
    pub require_sealed_rows: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSettings {
    pub default_total_years: i64,
    pub default_semesters_per_year: i64,
}

/// Stored values layered over defaults, so sections written by older builds
/// still carry every field.
pub fn load_section(conn: &Connection, section: SetupSection) -> rusqlite::Result<Value> {
    let mut out = default_section(section);
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, section.key())? {
        if let Some(obj) = out.as_object_mut() {
            for (k, v) in stored {
                if obj.contains_key(&k) {
                    obj.insert(k, v);
                }
            }
        }
    }
    Ok(out)
}

fn typed<T: for<'de> Deserialize<'de>>(conn: &Connection, section: SetupSection) -> AdminResult<T> {
    let value = load_section(conn, section)?;
    match serde_json::from_value(value) {
        Ok(v) => Ok(v),
        // A hand-edited row that no longer parses falls back to defaults.
        Err(_) => serde_json::from_value(default_section(section))
            .map_err(|e| AdminError::bad_params(e.to_string())),
    }
}

impl UploadSettings {
    pub fn load(conn: &Connection) -> AdminResult<Self> {
        typed(conn, SetupSection::Upload)
    }
}

impl StructureSettings {
    pub fn load(conn: &Connection) -> AdminResult<Self> {
        typed(conn, SetupSection::Structure)
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Upload => match k.as_str() {
                "autoGenerateAdmissionNumbers" | "requireSealedRows" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "admissionNumberPrefix" => {
                    let s = parse_string_max(v, k, 12)?;
                    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/') {
                        return Err(
                            "admissionNumberPrefix may only contain letters, digits, '-' and '/'"
                                .into(),
                        );
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "maxRows" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50_000)?));
                }
                "defaultStudentStatus" => {
                    let s = parse_string_max(v, k, 32)?;
                    let status = StudentStatus::parse(&s).ok_or_else(|| {
                        format!(
                            "defaultStudentStatus must be one of: {}",
                            StudentStatus::ALL
                                .iter()
                                .map(|s| s.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )
                    })?;
                    obj.insert(k.clone(), Value::String(status.as_str().to_string()));
                }
                _ => return Err(format!("unknown upload field: {}", k)),
            },
            SetupSection::Structure => match k.as_str() {
                "defaultTotalYears" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10)?));
                }
                "defaultSemestersPerYear" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 4)?));
                }
                _ => return Err(format!("unknown structure field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Validates and applies a partial update to one section.
pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> AdminResult<Value> {
    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch).map_err(AdminError::BadParams)?;
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_into_typed_settings() {
        let conn = db::open_memory();
        let upload = UploadSettings::load(&conn).expect("upload");
        assert!(!upload.auto_generate_admission_numbers);
        assert_eq!(upload.admission_number_prefix, "ADM");
        assert_eq!(upload.max_rows, 5000);
        assert_eq!(upload.default_student_status, StudentStatus::Regular);
        let structure = StructureSettings::load(&conn).expect("structure");
        assert_eq!(structure.default_total_years, 4);
    }

    #[test]
    fn patch_is_validated_per_field() {
        let conn = db::open_memory();
        let mut patch = Map::new();
        patch.insert("maxRows".into(), json!(0));
        assert!(update_section(&conn, SetupSection::Upload, &patch).is_err());

        let mut patch = Map::new();
        patch.insert("bogus".into(), json!(true));
        assert!(update_section(&conn, SetupSection::Upload, &patch).is_err());

        let mut patch = Map::new();
        patch.insert("autoGenerateAdmissionNumbers".into(), json!(true));
        patch.insert("defaultStudentStatus".into(), json!("lateral entry"));
        update_section(&conn, SetupSection::Upload, &patch).expect("update");
        let upload = UploadSettings::load(&conn).expect("upload");
        assert!(upload.auto_generate_admission_numbers);
        assert_eq!(upload.default_student_status, StudentStatus::Lateral);
    }
}
