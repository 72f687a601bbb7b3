use super::draft::{non_blank, StudentDraft};
use super::seal::RowSealer;
use crate::catalog::{visible_college, AcademicSnapshot};
use crate::db;
use crate::error::{is_unique_violation, AdminResult};
use crate::scope::{AccessScope, EntityRef};
use crate::setup::UploadSettings;
use crate::students::insert_student;
use chrono::Datelike;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

/// One approved preview row as re-sent by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRow {
    pub row_number: usize,
    #[serde(default)]
    pub sanitized_data: Value,
    #[serde(default)]
    pub seal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFailure {
    pub row_number: usize,
    pub admission_number: Option<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInserted {
    pub row_number: usize,
    pub admission_number: String,
    pub student_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitDetails {
    pub failures: Vec<CommitFailure>,
    pub inserted: Vec<CommitInserted>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub success_count: usize,
    pub skipped_count: usize,
    pub details: CommitDetails,
}

impl CommitReport {
    fn fail(&mut self, row_number: usize, admission_number: Option<String>, errors: Vec<String>) {
        self.skipped_count += 1;
        self.details.failures.push(CommitFailure {
            row_number,
            admission_number,
            errors,
        });
    }
}

/// Hands out `<prefix><batch start year><4-digit sequence>` numbers that are
/// not yet stored.
pub(crate) struct AdmissionNumbers {
    prefix: String,
    next: HashMap<String, u32>,
}

impl AdmissionNumbers {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: HashMap::new(),
        }
    }

    pub(crate) fn next(
        &mut self,
        conn: &Connection,
        batch: Option<&str>,
    ) -> rusqlite::Result<String> {
        let year = batch
            .map(str::trim)
            .filter(|b| b.len() >= 4 && b.as_bytes()[..4].iter().all(u8::is_ascii_digit))
            .map(|b| b[..4].to_string())
            .unwrap_or_else(|| chrono::Utc::now().year().to_string());
        let stem = format!("{}{}", self.prefix, year);

        let mut seq = match self.next.get(&stem) {
            Some(n) => *n,
            None => highest_sequence(conn, &stem)? + 1,
        };
        let mut exists = conn.prepare("SELECT 1 FROM students WHERE admission_number = ?")?;
        let candidate = loop {
            let candidate = format!("{stem}{seq:04}");
            let taken: Option<i64> = exists.query_row([&candidate], |r| r.get(0)).optional()?;
            if taken.is_none() {
                break candidate;
            }
            seq += 1;
        };
        self.next.insert(stem, seq + 1);
        Ok(candidate)
    }
}

fn highest_sequence(conn: &Connection, stem: &str) -> rusqlite::Result<u32> {
    let mut stmt =
        conn.prepare("SELECT admission_number FROM students WHERE admission_number LIKE ? || '%'")?;
    let rows = stmt.query_map([stem], |r| r.get::<_, String>(0))?;
    let mut max = 0;
    for adm in rows {
        let adm = adm?;
        let Some(suffix) = adm.get(stem.len()..) else {
            continue;
        };
        if let Ok(n) = suffix.parse::<u32>() {
            max = max.max(n);
        }
    }
    Ok(max)
}

fn required_errors(d: &StudentDraft) -> Vec<String> {
    let checks = [
        (&d.student_name, "Student Name"),
        (&d.college, "College"),
        (&d.course, "Course"),
        (&d.branch, "Branch"),
        (&d.batch, "Batch"),
    ];
    checks
        .iter()
        .filter(|(v, _)| non_blank(v.as_deref()).is_none())
        .map(|(_, label)| format!("{label} is required"))
        .collect()
}

/// Client-echoed rows are not trusted to stay inside the caller's scope, so
/// their college, course and branch are resolved again and checked.
fn outside_scope(snapshot: &AcademicSnapshot, scope: &AccessScope, d: &StudentDraft) -> bool {
    if scope.unrestricted {
        return false;
    }
    let college = non_blank(d.college.as_deref())
        .and_then(|n| snapshot.college_by_name(n))
        .filter(|c| scope.allows_college(EntityRef::new(&c.id, &c.name)));
    let course = college
        .zip(non_blank(d.course.as_deref()))
        .and_then(|(c, n)| snapshot.course_by_name(&c.id, n))
        .filter(|k| scope.allows_course(EntityRef::new(&k.id, &k.name)));
    let branch_allowed = course
        .zip(non_blank(d.branch.as_deref()))
        .is_some_and(|(k, n)| {
            snapshot
                .branches_named(&k.id, n)
                .iter()
                .any(|b| scope.allows_branch(EntityRef::new(&b.id, &b.name)))
        });
    !branch_allowed
}

/// Inserts the approved rows. Rows are only checked against live database
/// constraints (plus their seals); a failing row is rolled back on its own
/// savepoint and reported, and the rest of the batch continues.
pub fn commit_rows(
    conn: &Connection,
    scope: &AccessScope,
    rows: &[CommitRow],
    college_id: Option<&str>,
) -> AdminResult<CommitReport> {
    let settings = UploadSettings::load(conn)?;
    let selected = college_id
        .map(|id| visible_college(conn, scope, id))
        .transpose()?;
    let snapshot = AcademicSnapshot::load(conn)?;
    let sealer = RowSealer::new(db::seal_key(conn)?);
    let mut numbers = AdmissionNumbers::new(&settings.admission_number_prefix);
    let mut report = CommitReport::default();

    let mut tx = conn.unchecked_transaction()?;
    for row in rows {
        let draft: StudentDraft = match serde_json::from_value(row.sanitized_data.clone()) {
            Ok(d) => d,
            Err(e) => {
                report.fail(row.row_number, None, vec![format!("sanitizedData is malformed: {e}")]);
                continue;
            }
        };
        let given = draft.admission().map(str::to_string);

        let mut errors = Vec::new();
        match row.seal.as_deref() {
            Some(seal) if !sealer.verify(row.row_number, &draft, seal) => {
                errors.push("Row data does not match its preview seal".to_string());
            }
            None if settings.require_sealed_rows => {
                errors.push("Row was not sealed by a preview".to_string());
            }
            _ => {}
        }
        errors.extend(required_errors(&draft));
        if outside_scope(&snapshot, scope, &draft) {
            errors.push("Row is outside your access scope".to_string());
        }
        if let (Some(sel), Some(college)) = (selected.as_ref(), non_blank(draft.college.as_deref())) {
            if !sel.name.eq_ignore_ascii_case(college) {
                errors.push(format!(
                    "College '{college}' does not match the selected college '{}'",
                    sel.name
                ));
            }
        }
        if given.is_none() && !settings.auto_generate_admission_numbers {
            errors.push("Admission Number is required".to_string());
        }
        if !errors.is_empty() {
            report.fail(row.row_number, given, errors);
            continue;
        }

        let inserted = {
            let sp = tx.savepoint()?;
            let admission = match given {
                Some(a) => Ok(a),
                None => numbers.next(&sp, draft.batch.as_deref()),
            };
            let result = match admission {
                Ok(adm) => match insert_student(&sp, &draft, &adm) {
                    Ok(student_id) => Ok((adm, student_id)),
                    Err(e) => Err((Some(adm), e)),
                },
                Err(e) => Err((None, e)),
            };
            if result.is_ok() {
                sp.commit()?;
            }
            result
        };
        match inserted {
            Ok((admission, student_id)) => {
                report.success_count += 1;
                report.details.inserted.push(CommitInserted {
                    row_number: row.row_number,
                    admission_number: admission,
                    student_id,
                });
            }
            Err((admission, e)) => {
                let message = match admission.as_deref() {
                    Some(adm) if is_unique_violation(&e) => format!(
                        "Duplicate admission number '{adm}': a student with this admission number already exists"
                    ),
                    _ => e.to_string(),
                };
                debug!(row = row.row_number, error = %message, "commit row skipped");
                report.fail(row.row_number, admission, vec![message]);
            }
        }
    }
    tx.commit()?;

    info!(
        inserted = report.success_count,
        skipped = report.skipped_count,
        "bulk upload committed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{update_section, SetupSection};
    use serde_json::{json, Map};

    fn row(n: usize, adm: Option<&str>) -> CommitRow {
        CommitRow {
            row_number: n,
            sanitized_data: json!({
                "admissionNumber": adm,
                "studentName": format!("Student {n}"),
                "gender": "Female",
                "college": "Tech U",
                "course": "B.Tech",
                "branch": "CSE",
                "batch": "2023-2027",
                "currentYear": 1,
                "currentSemester": 1,
                "studentStatus": "Regular",
                "studentMobile": "9876543210"
            }),
            seal: None,
        }
    }

    fn all() -> AccessScope {
        AccessScope::unrestricted()
    }

    fn count(conn: &Connection) -> usize {
        conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get::<_, i64>(0))
            .expect("count") as usize
    }

    #[test]
    fn duplicate_inserted_between_preview_and_commit_is_skipped() {
        let conn = db::open_memory();
        // Another upload landed B2 after the preview was built.
        let first = commit_rows(&conn, &all(), &[row(9, Some("B2"))], None).expect("first");
        assert_eq!(first.success_count, 1);

        let rows = [row(1, Some("A1")), row(2, Some("b2"))];
        let report = commit_rows(&conn, &all(), &rows, None).expect("commit");
        assert_eq!(report.success_count, 1);
        assert_eq!(report.skipped_count, 1);
        assert_eq!(report.details.failures[0].row_number, 2);
        assert!(report.details.failures[0].errors[0].contains("Duplicate admission number"));
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn rows_failing_checks_do_not_stop_the_batch() {
        let conn = db::open_memory();
        let mut broken = row(2, Some("A2"));
        broken.sanitized_data["branch"] = Value::Null;
        let mut garbage = row(3, Some("A3"));
        garbage.sanitized_data = json!({ "currentYear": "two" });
        let rows = [row(1, Some("A1")), broken, garbage, row(4, Some("A4"))];
        let report = commit_rows(&conn, &all(), &rows, None).expect("commit");
        assert_eq!(report.success_count, 2);
        assert_eq!(report.skipped_count, 2);
        assert_eq!(count(&conn), report.success_count);
        let failed: Vec<usize> = report.details.failures.iter().map(|f| f.row_number).collect();
        assert_eq!(failed, vec![2, 3]);
        assert_eq!(report.details.failures[0].errors, vec!["Branch is required".to_string()]);
    }

    #[test]
    fn tampered_seal_is_rejected_and_valid_seal_accepted() {
        let conn = db::open_memory();
        let sealer = RowSealer::new(db::seal_key(&conn).expect("key"));
        let mut good = row(1, Some("A1"));
        let draft: StudentDraft =
            serde_json::from_value(good.sanitized_data.clone()).expect("draft");
        good.seal = Some(sealer.seal(1, &draft));

        let mut edited = good.clone();
        edited.row_number = 2;
        edited.sanitized_data["admissionNumber"] = json!("A2");

        let report = commit_rows(&conn, &all(), &[good, edited], None).expect("commit");
        assert_eq!(report.success_count, 1);
        assert_eq!(report.details.failures[0].row_number, 2);
    }

    #[test]
    fn unsealed_rows_are_rejected_when_seals_are_required() {
        let conn = db::open_memory();
        let mut patch = Map::new();
        patch.insert("requireSealedRows".into(), json!(true));
        update_section(&conn, SetupSection::Upload, &patch).expect("setup");
        let report = commit_rows(&conn, &all(), &[row(1, Some("A1"))], None).expect("commit");
        assert_eq!(report.success_count, 0);
        assert_eq!(report.skipped_count, 1);
    }

    #[test]
    fn blank_admission_numbers_are_generated_when_enabled() {
        let conn = db::open_memory();
        let report = commit_rows(&conn, &all(), &[row(1, None)], None).expect("commit");
        assert_eq!(report.skipped_count, 1);

        let mut patch = Map::new();
        patch.insert("autoGenerateAdmissionNumbers".into(), json!(true));
        patch.insert("admissionNumberPrefix".into(), json!("TU"));
        update_section(&conn, SetupSection::Upload, &patch).expect("setup");
        commit_rows(&conn, &all(), &[row(1, Some("TU20230001"))], None).expect("seed");

        let rows = [row(1, None), row(2, Some("")), row(3, None)];
        let report = commit_rows(&conn, &all(), &rows, None).expect("commit");
        let numbers: Vec<&str> = report
            .details
            .inserted
            .iter()
            .map(|i| i.admission_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["TU20230002", "TU20230003", "TU20230004"]);
    }

    #[test]
    fn selected_college_must_match_and_exist() {
        let conn = db::open_memory();
        let college = crate::catalog::create_college(
            &conn,
            &crate::catalog::NewCollege {
                name: "Arts U".into(),
                code: None,
                metadata: None,
            },
        )
        .expect("college");
        let report = commit_rows(&conn, &all(), &[row(1, Some("A1"))], Some(&college.id))
            .expect("commit");
        assert_eq!(report.skipped_count, 1);
        assert!(report.details.failures[0].errors[0].contains("does not match"));
        assert!(commit_rows(&conn, &all(), &[row(1, Some("A1"))], Some("missing")).is_err());
    }

    #[test]
    fn rows_outside_the_callers_scope_are_skipped() {
        let conn = db::open_memory();
        let seeded = crate::cascade::tests::seed(&conn);
        let mut other = row(2, Some("A2"));
        other.sanitized_data["course"] = json!("M.Tech");
        let mut unknown = row(3, Some("A3"));
        unknown.sanitized_data["college"] = json!("Nowhere U");
        let scope = AccessScope {
            college_names: vec!["Tech U".into()],
            course_names: vec!["B.Tech".into()],
            all_branches: true,
            ..AccessScope::default()
        };

        let report = commit_rows(&conn, &scope, &[row(1, Some("A1")), other, unknown], None)
            .expect("commit");
        assert_eq!(report.success_count, 1);
        let failed: Vec<usize> = report.details.failures.iter().map(|f| f.row_number).collect();
        assert_eq!(failed, vec![2, 3]);
        assert!(report.details.failures[0].errors[0].contains("outside your access scope"));
        assert_eq!(count(&conn), 1);

        // A selected college the caller cannot see reads as missing.
        let hidden = AccessScope::default();
        let selected = commit_rows(&conn, &hidden, &[row(4, Some("A4"))], Some(&seeded.college_id));
        assert!(matches!(selected, Err(crate::error::AdminError::NotFound { .. })));
    }

    #[test]
    fn a_rejected_generated_row_is_reported_and_the_batch_continues() {
        let conn = db::open_memory();
        let mut patch = Map::new();
        patch.insert("autoGenerateAdmissionNumbers".into(), json!(true));
        patch.insert("admissionNumberPrefix".into(), json!("TU"));
        update_section(&conn, SetupSection::Upload, &patch).expect("setup");
        conn.execute_batch(
            "CREATE TRIGGER reject_second BEFORE INSERT ON students
             WHEN NEW.student_name = 'Student 2'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .expect("trigger");

        let rows = [row(1, None), row(2, None), row(3, None)];
        let report = commit_rows(&conn, &all(), &rows, None).expect("commit");
        assert_eq!(report.success_count, 2);
        assert_eq!(report.details.failures[0].row_number, 2);
        assert_eq!(
            report.details.failures[0].admission_number.as_deref(),
            Some("TU20230002")
        );
        assert!(report.details.failures[0].errors[0].contains("rejected"));
        assert_eq!(count(&conn), 2);
    }
}
