//! Per-row validation: normalize raw cells into a [`StudentDraft`], then check
//! it against the academic hierarchy. Every failed check becomes an issue on
//! the row; nothing here returns an error.

use super::draft::{
    non_blank, normalize_date, normalize_email, normalize_gender, normalize_mobile,
    parse_stage_number, StudentDraft, StudentStatus,
};
use super::fields::{HeaderMap, StudentField};
use super::sheet::SheetRow;
use crate::catalog::{
    stage_structure, AcademicSnapshot, AcademicYearRecord, BranchRecord, CollegeRecord,
    CourseRecord,
};
use crate::scope::{AccessScope, EntityRef};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    InvalidValue,
    UnknownCollege,
    InactiveCollege,
    CollegeMismatch,
    UnknownCourse,
    InactiveCourse,
    UnknownBranch,
    InactiveBranch,
    BranchNotOffered,
    UnknownAcademicYear,
    InactiveAcademicYear,
    StageOutOfRange,
    OutOfScope,
    DuplicateInFile,
    DuplicateInDatabase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, field: StudentField, message: String) -> Self {
        Self {
            kind,
            field: Some(field.json_key()),
            message,
        }
    }
}

/// Cell values keyed by canonical field. Blank cells are absent.
pub type FieldValues = HashMap<StudentField, String>;

/// Collects the mapped cells of one sheet row, plus the raw header -> cell
/// view echoed back to the client.
pub fn collect_row(map: &HeaderMap, row: &SheetRow) -> (Map<String, Value>, FieldValues) {
    let mut raw = Map::new();
    let mut values = FieldValues::new();
    for (idx, header) in map.headers.iter().enumerate() {
        let cell = row.cells.get(idx).map(|c| c.trim()).unwrap_or("");
        if !header.is_empty() && !raw.contains_key(header) {
            raw.insert(header.clone(), Value::String(cell.to_string()));
        }
        if let Some(Some(field)) = map.columns.get(idx) {
            if !cell.is_empty() {
                values.insert(*field, cell.to_string());
            }
        }
    }
    (raw, values)
}

/// Reads field values from a JSON object keyed by [`StudentField::json_key`].
pub fn values_from_json(obj: &Map<String, Value>) -> FieldValues {
    let mut values = FieldValues::new();
    for field in StudentField::ALL {
        let text = match obj.get(field.json_key()) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            values.insert(field, text);
        }
    }
    values
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coerces raw values into a draft. Values that cannot be coerced stay in the
/// draft as typed (numbers excepted) and produce an issue.
pub fn normalize_values(
    values: &FieldValues,
    default_status: StudentStatus,
) -> (StudentDraft, Vec<ValidationIssue>) {
    let mut d = StudentDraft::default();
    let mut issues = Vec::new();
    let mut invalid = |field: StudentField, raw: &str, hint: &str| {
        issues.push(ValidationIssue::new(
            IssueKind::InvalidValue,
            field,
            format!("{} '{}' {}", field.label(), raw, hint),
        ));
    };

    for field in StudentField::ALL {
        let Some(raw) = values.get(&field).map(String::as_str) else {
            continue;
        };
        match field {
            StudentField::AdmissionNumber => d.admission_number = Some(raw.to_string()),
            StudentField::PinNo => d.pin_no = Some(raw.to_string()),
            StudentField::StudentName => d.student_name = Some(collapse_spaces(raw)),
            StudentField::FatherName => d.father_name = Some(collapse_spaces(raw)),
            StudentField::MotherName => d.mother_name = Some(collapse_spaces(raw)),
            StudentField::College => d.college = Some(raw.to_string()),
            StudentField::Course => d.course = Some(raw.to_string()),
            StudentField::Branch => d.branch = Some(raw.to_string()),
            StudentField::Batch => d.batch = Some(raw.to_string()),
            StudentField::Address => d.address = Some(raw.to_string()),
            StudentField::Category => d.category = Some(raw.to_string()),
            StudentField::Gender => match normalize_gender(raw) {
                Some(g) => d.gender = Some(g.to_string()),
                None => {
                    d.gender = Some(raw.to_string());
                    invalid(field, raw, "is not recognized (use Male, Female or Other)");
                }
            },
            StudentField::CurrentYear | StudentField::CurrentSemester => {
                match parse_stage_number(raw) {
                    Some(n) if field == StudentField::CurrentYear => d.current_year = Some(n),
                    Some(n) => d.current_semester = Some(n),
                    None => invalid(field, raw, "is not a number"),
                }
            }
            StudentField::StudentStatus => match StudentStatus::parse(raw) {
                Some(s) => d.student_status = Some(s.as_str().to_string()),
                None => {
                    d.student_status = Some(raw.to_string());
                    invalid(field, raw, "is not a known student status");
                }
            },
            StudentField::StudentMobile | StudentField::ParentMobile => {
                let slot = if field == StudentField::StudentMobile {
                    &mut d.student_mobile
                } else {
                    &mut d.parent_mobile
                };
                match normalize_mobile(raw) {
                    Some(m) => *slot = Some(m),
                    None => {
                        *slot = Some(raw.to_string());
                        invalid(field, raw, "must be a 10-digit mobile number");
                    }
                }
            }
            StudentField::Email => match normalize_email(raw) {
                Some(e) => d.email = Some(e),
                None => {
                    d.email = Some(raw.to_string());
                    invalid(field, raw, "is not a valid email address");
                }
            },
            StudentField::DateOfBirth => match normalize_date(raw) {
                Some(v) => d.date_of_birth = Some(v),
                None => {
                    d.date_of_birth = Some(raw.to_string());
                    invalid(field, raw, "is not a recognizable date");
                }
            },
        }
    }

    // Blank stage cells start the student at the first stage.
    if !values.contains_key(&StudentField::CurrentYear) {
        d.current_year = Some(1);
    }
    if !values.contains_key(&StudentField::CurrentSemester) {
        d.current_semester = Some(1);
    }
    if d.student_status.is_none() {
        d.student_status = Some(default_status.as_str().to_string());
    }
    (d, issues)
}

fn text_of(d: &StudentDraft, field: StudentField) -> Option<&str> {
    let v = match field {
        StudentField::AdmissionNumber => &d.admission_number,
        StudentField::PinNo => &d.pin_no,
        StudentField::StudentName => &d.student_name,
        StudentField::Gender => &d.gender,
        StudentField::College => &d.college,
        StudentField::Course => &d.course,
        StudentField::Branch => &d.branch,
        StudentField::Batch => &d.batch,
        StudentField::StudentStatus => &d.student_status,
        StudentField::StudentMobile => &d.student_mobile,
        StudentField::ParentMobile => &d.parent_mobile,
        StudentField::Email => &d.email,
        StudentField::DateOfBirth => &d.date_of_birth,
        StudentField::FatherName => &d.father_name,
        StudentField::MotherName => &d.mother_name,
        StudentField::Address => &d.address,
        StudentField::Category => &d.category,
        StudentField::CurrentYear | StudentField::CurrentSemester => return None,
    };
    non_blank(v.as_deref())
}

/// Everything a row is checked against. Built once per preview.
pub struct ValidationContext<'a> {
    pub snapshot: &'a AcademicSnapshot,
    pub selected_college: Option<&'a CollegeRecord>,
    pub scope: &'a AccessScope,
    /// Lowercased admission numbers already stored.
    pub existing_admission_numbers: &'a HashSet<String>,
    pub auto_generate_admission_numbers: bool,
    pub default_status: StudentStatus,
}

#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub row_number: usize,
    pub raw_data: Map<String, Value>,
    pub sanitized: StudentDraft,
    pub issues: Vec<ValidationIssue>,
}

impl RowOutcome {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validates rows in file order. Remembers admission numbers it has seen so
/// later rows repeating one are flagged.
pub struct RowValidator<'a> {
    ctx: ValidationContext<'a>,
    seen: HashMap<String, usize>,
}

impl<'a> RowValidator<'a> {
    pub fn new(ctx: ValidationContext<'a>) -> Self {
        Self {
            ctx,
            seen: HashMap::new(),
        }
    }

    pub fn validate_row(&mut self, map: &HeaderMap, row: &SheetRow) -> RowOutcome {
        let (raw_data, values) = collect_row(map, row);
        let (sanitized, issues) = self.validate_values(row.row_number, &values);
        RowOutcome {
            row_number: row.row_number,
            raw_data,
            sanitized,
            issues,
        }
    }

    pub fn validate_values(
        &mut self,
        row_number: usize,
        values: &FieldValues,
    ) -> (StudentDraft, Vec<ValidationIssue>) {
        let (mut draft, mut issues) = normalize_values(values, self.ctx.default_status);

        if draft.college.is_none() {
            if let Some(selected) = self.ctx.selected_college {
                draft.college = Some(selected.name.clone());
            }
        }

        if draft.admission().is_none() && !self.ctx.auto_generate_admission_numbers {
            issues.push(missing(StudentField::AdmissionNumber));
        }
        for field in StudentField::REQUIRED {
            if text_of(&draft, field).is_none() {
                issues.push(missing(field));
            }
        }

        let college = self.resolve_college(&draft, &mut issues);
        let course = self.resolve_course(&draft, college, &mut issues);
        let year = self.resolve_batch(&draft, &mut issues);
        let branch = course.and_then(|c| self.resolve_branch(&draft, c, year, &mut issues));
        if let Some(c) = course {
            check_stage(&draft, c, branch, &mut issues);
        }
        self.check_admission(row_number, &draft, &mut issues);

        // Resolved names are stored in their configured spelling.
        if let Some(c) = college {
            draft.college = Some(c.name.clone());
        }
        if let Some(c) = course {
            draft.course = Some(c.name.clone());
        }
        if let Some(b) = branch {
            draft.branch = Some(b.name.clone());
        }
        if let Some(y) = year {
            draft.batch = Some(y.label.clone());
        }
        (draft, issues)
    }

    fn resolve_college(
        &self,
        draft: &StudentDraft,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<&'a CollegeRecord> {
        let snapshot: &'a AcademicSnapshot = self.ctx.snapshot;
        let name = text_of(draft, StudentField::College)?;
        let Some(college) = snapshot.college_by_name(name) else {
            issues.push(ValidationIssue::new(
                IssueKind::UnknownCollege,
                StudentField::College,
                format!("College '{name}' not found"),
            ));
            return None;
        };
        if let Some(selected) = self.ctx.selected_college {
            if selected.id != college.id {
                issues.push(ValidationIssue::new(
                    IssueKind::CollegeMismatch,
                    StudentField::College,
                    format!(
                        "College '{name}' does not match the selected college '{}'",
                        selected.name
                    ),
                ));
            }
        }
        if !college.is_active {
            issues.push(ValidationIssue::new(
                IssueKind::InactiveCollege,
                StudentField::College,
                format!("College '{}' is inactive", college.name),
            ));
        }
        if !self
            .ctx
            .scope
            .allows_college(EntityRef::new(&college.id, &college.name))
        {
            issues.push(out_of_scope(StudentField::College, "College", &college.name));
        }
        Some(college)
    }

    fn resolve_course(
        &self,
        draft: &StudentDraft,
        college: Option<&'a CollegeRecord>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<&'a CourseRecord> {
        let snapshot: &'a AcademicSnapshot = self.ctx.snapshot;
        let name = text_of(draft, StudentField::Course)?;
        let found = match college {
            Some(c) => snapshot.course_by_name(&c.id, name),
            None => snapshot.course_named_anywhere(name),
        };
        let Some(course) = found else {
            let message = match college {
                Some(c) => format!("Course '{name}' not found under college '{}'", c.name),
                None => format!("Course '{name}' not found"),
            };
            issues.push(ValidationIssue::new(
                IssueKind::UnknownCourse,
                StudentField::Course,
                message,
            ));
            return None;
        };
        if !course.is_active {
            issues.push(ValidationIssue::new(
                IssueKind::InactiveCourse,
                StudentField::Course,
                format!("Course '{}' is inactive", course.name),
            ));
        }
        if !self
            .ctx
            .scope
            .allows_course(EntityRef::new(&course.id, &course.name))
        {
            issues.push(out_of_scope(StudentField::Course, "Course", &course.name));
        }
        Some(course)
    }

    fn resolve_batch(
        &self,
        draft: &StudentDraft,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<&'a AcademicYearRecord> {
        let snapshot: &'a AcademicSnapshot = self.ctx.snapshot;
        let label = text_of(draft, StudentField::Batch)?;
        let Some(year) = snapshot.academic_year_by_label(label) else {
            issues.push(ValidationIssue::new(
                IssueKind::UnknownAcademicYear,
                StudentField::Batch,
                format!("Batch '{label}' is not a configured academic year"),
            ));
            return None;
        };
        if !year.is_active {
            issues.push(ValidationIssue::new(
                IssueKind::InactiveAcademicYear,
                StudentField::Batch,
                format!("Batch '{}' is inactive", year.label),
            ));
        }
        Some(year)
    }

    /// A branch row specific to the row's batch wins over the generic row.
    fn resolve_branch(
        &self,
        draft: &StudentDraft,
        course: &'a CourseRecord,
        year: Option<&'a AcademicYearRecord>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<&'a BranchRecord> {
        let snapshot: &'a AcademicSnapshot = self.ctx.snapshot;
        let name = text_of(draft, StudentField::Branch)?;
        let candidates = snapshot.branches_named(&course.id, name);
        if candidates.is_empty() {
            issues.push(ValidationIssue::new(
                IssueKind::UnknownBranch,
                StudentField::Branch,
                format!("Branch '{name}' not found under course '{}'", course.name),
            ));
            return None;
        }

        let generic = candidates.iter().copied().find(|b| b.is_generic());
        let chosen = match year {
            Some(y) => candidates
                .iter()
                .copied()
                .find(|b| b.academic_year_id.as_deref() == Some(y.id.as_str()))
                .or(generic),
            // Batch is missing or unknown and already reported.
            None => generic.or_else(|| candidates.first().copied()),
        };
        let Some(branch) = chosen else {
            let batch = year.map(|y| y.label.as_str()).unwrap_or_default();
            issues.push(ValidationIssue::new(
                IssueKind::BranchNotOffered,
                StudentField::Branch,
                format!(
                    "Branch '{name}' under course '{}' is not offered for batch '{batch}'",
                    course.name
                ),
            ));
            return None;
        };

        if !branch.is_active {
            issues.push(ValidationIssue::new(
                IssueKind::InactiveBranch,
                StudentField::Branch,
                format!(
                    "Branch '{}' under course '{}' is inactive",
                    branch.name, course.name
                ),
            ));
        }
        if !self
            .ctx
            .scope
            .allows_branch(EntityRef::new(&branch.id, &branch.name))
        {
            issues.push(out_of_scope(StudentField::Branch, "Branch", &branch.name));
        }
        Some(branch)
    }

    fn check_admission(
        &mut self,
        row_number: usize,
        draft: &StudentDraft,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(adm) = draft.admission() else {
            return;
        };
        let key = adm.to_lowercase();
        match self.seen.get(&key) {
            Some(first) => issues.push(ValidationIssue::new(
                IssueKind::DuplicateInFile,
                StudentField::AdmissionNumber,
                format!("Duplicate admission number '{adm}' in file (first seen on row {first})"),
            )),
            None => {
                self.seen.insert(key.clone(), row_number);
            }
        }
        if self.ctx.existing_admission_numbers.contains(&key) {
            issues.push(ValidationIssue::new(
                IssueKind::DuplicateInDatabase,
                StudentField::AdmissionNumber,
                format!("Admission number '{adm}' already exists"),
            ));
        }
    }
}

fn missing(field: StudentField) -> ValidationIssue {
    ValidationIssue::new(
        IssueKind::MissingField,
        field,
        format!("{} is required", field.label()),
    )
}

fn out_of_scope(field: StudentField, what: &str, name: &str) -> ValidationIssue {
    ValidationIssue::new(
        IssueKind::OutOfScope,
        field,
        format!("{what} '{name}' is outside your access scope"),
    )
}

/// Checks the row's stage against the course (and branch) structure. Rows
/// whose year or semester failed to parse were already reported.
pub fn check_stage(
    draft: &StudentDraft,
    course: &CourseRecord,
    branch: Option<&BranchRecord>,
    issues: &mut Vec<ValidationIssue>,
) {
    let (Some(year), Some(semester)) = (draft.current_year, draft.current_semester) else {
        return;
    };
    let structure = stage_structure(course, branch);
    if structure.total_years == 0 {
        issues.push(ValidationIssue::new(
            IssueKind::StageOutOfRange,
            StudentField::CurrentYear,
            format!("Course '{}' has no configured years", course.name),
        ));
        return;
    }
    let Some(semesters) = structure.semesters_in_year(year) else {
        issues.push(ValidationIssue::new(
            IssueKind::StageOutOfRange,
            StudentField::CurrentYear,
            format!(
                "Current year {year} is outside 1..={} for course '{}'",
                structure.total_years, course.name
            ),
        ));
        return;
    };
    if !structure.contains(year, semester) {
        issues.push(ValidationIssue::new(
            IssueKind::StageOutOfRange,
            StudentField::CurrentSemester,
            format!("Current semester {semester} is outside 1..={semesters} for year {year}"),
        ));
    }
}
