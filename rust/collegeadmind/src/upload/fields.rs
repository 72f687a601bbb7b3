use std::collections::HashMap;

/// Canonical student fields an upload column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StudentField {
    AdmissionNumber,
    PinNo,
    StudentName,
    Gender,
    College,
    Course,
    Branch,
    Batch,
    CurrentYear,
    CurrentSemester,
    StudentStatus,
    StudentMobile,
    ParentMobile,
    Email,
    DateOfBirth,
    FatherName,
    MotherName,
    Address,
    Category,
}

impl StudentField {
    pub const ALL: [Self; 19] = [
        Self::AdmissionNumber,
        Self::PinNo,
        Self::StudentName,
        Self::Gender,
        Self::College,
        Self::Course,
        Self::Branch,
        Self::Batch,
        Self::CurrentYear,
        Self::CurrentSemester,
        Self::StudentStatus,
        Self::StudentMobile,
        Self::ParentMobile,
        Self::Email,
        Self::DateOfBirth,
        Self::FatherName,
        Self::MotherName,
        Self::Address,
        Self::Category,
    ];

    /// Fields whose absence makes a row invalid. Admission number is handled
    /// separately because it may be generated at commit.
    pub const REQUIRED: [Self; 7] = [
        Self::StudentName,
        Self::Gender,
        Self::College,
        Self::Course,
        Self::Branch,
        Self::Batch,
        Self::StudentMobile,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::AdmissionNumber => "admission_number",
            Self::PinNo => "pin_no",
            Self::StudentName => "student_name",
            Self::Gender => "gender",
            Self::College => "college",
            Self::Course => "course",
            Self::Branch => "branch",
            Self::Batch => "batch",
            Self::CurrentYear => "current_year",
            Self::CurrentSemester => "current_semester",
            Self::StudentStatus => "student_status",
            Self::StudentMobile => "student_mobile",
            Self::ParentMobile => "parent_mobile",
            Self::Email => "email",
            Self::DateOfBirth => "date_of_birth",
            Self::FatherName => "father_name",
            Self::MotherName => "mother_name",
            Self::Address => "address",
            Self::Category => "category",
        }
    }

    /// Key used in JSON payloads (`sanitizedData`, student records).
    pub fn json_key(self) -> &'static str {
        match self {
            Self::AdmissionNumber => "admissionNumber",
            Self::PinNo => "pinNo",
            Self::StudentName => "studentName",
            Self::Gender => "gender",
            Self::College => "college",
            Self::Course => "course",
            Self::Branch => "branch",
            Self::Batch => "batch",
            Self::CurrentYear => "currentYear",
            Self::CurrentSemester => "currentSemester",
            Self::StudentStatus => "studentStatus",
            Self::StudentMobile => "studentMobile",
            Self::ParentMobile => "parentMobile",
            Self::Email => "email",
            Self::DateOfBirth => "dateOfBirth",
            Self::FatherName => "fatherName",
            Self::MotherName => "motherName",
            Self::Address => "address",
            Self::Category => "category",
        }
    }

    /// Header written to generated templates and used in issue messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::AdmissionNumber => "Admission Number",
            Self::PinNo => "Pin Number",
            Self::StudentName => "Student Name",
            Self::Gender => "Gender",
            Self::College => "College",
            Self::Course => "Course",
            Self::Branch => "Branch",
            Self::Batch => "Batch",
            Self::CurrentYear => "Current Year",
            Self::CurrentSemester => "Current Semester",
            Self::StudentStatus => "Student Status",
            Self::StudentMobile => "Student Mobile",
            Self::ParentMobile => "Parent Mobile",
            Self::Email => "Email",
            Self::DateOfBirth => "Date of Birth",
            Self::FatherName => "Father Name",
            Self::MotherName => "Mother Name",
            Self::Address => "Address",
            Self::Category => "Category",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::AdmissionNumber => &[
                "admission_number",
                "admission no",
                "admission num",
                "adm no",
                "admn no",
                "admission id",
                "roll number",
                "roll no",
            ],
            Self::PinNo => &["pin_no", "pin number", "pin", "hall ticket number", "hall ticket no"],
            Self::StudentName => &["student_name", "name", "full name", "name of the student"],
            Self::Gender => &["gender", "sex"],
            Self::College => &["college", "college name", "institution", "institute"],
            Self::Course => &["course", "course name", "program", "programme", "degree"],
            Self::Branch => &["branch", "branch name", "specialization", "department", "stream"],
            Self::Batch => &["batch", "academic year", "admission batch", "admission year"],
            Self::CurrentYear => &["current_year", "year", "current academic year", "study year"],
            Self::CurrentSemester => &["current_semester", "semester", "sem", "current sem"],
            Self::StudentStatus => &["student_status", "status"],
            Self::StudentMobile => &[
                "student_mobile",
                "student mobile number",
                "mobile",
                "mobile number",
                "phone",
                "phone number",
                "contact number",
            ],
            Self::ParentMobile => &[
                "parent_mobile",
                "parent mobile number",
                "parent phone",
                "guardian mobile",
                "father mobile",
            ],
            Self::Email => &["email", "email id", "email address", "mail"],
            Self::DateOfBirth => &["date_of_birth", "dob", "birth date", "date of birth"],
            Self::FatherName => &["father_name", "father", "fathers name", "father's name"],
            Self::MotherName => &["mother_name", "mother", "mothers name", "mother's name"],
            Self::Address => &["address", "permanent address", "residential address"],
            Self::Category => &["category", "caste category", "reservation category"],
        }
    }
}

/// Lowercases and drops everything but letters and digits, so
/// "Pin Number", "pin_number" and "PIN-NUMBER" compare equal.
pub fn normalize_header(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized alias -> field, built once per upload.
pub struct AliasTable {
    by_alias: HashMap<String, StudentField>,
}

impl AliasTable {
    pub fn new() -> Self {
        let mut by_alias = HashMap::new();
        for field in StudentField::ALL {
            by_alias.insert(normalize_header(field.key()), field);
            by_alias.insert(normalize_header(field.label()), field);
            for alias in field.aliases() {
                by_alias.entry(normalize_header(alias)).or_insert(field);
            }
        }
        Self { by_alias }
    }

    pub fn lookup(&self, header: &str) -> Option<StudentField> {
        self.by_alias.get(&normalize_header(header)).copied()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Column index -> field for one uploaded sheet.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    pub headers: Vec<String>,
    pub columns: Vec<Option<StudentField>>,
    pub unmapped: Vec<String>,
}

impl HeaderMap {
    /// The first column claiming a field wins; later duplicates are reported
    /// as unmapped.
    pub fn resolve(headers: &[String]) -> Self {
        let table = AliasTable::new();
        let mut columns = Vec::with_capacity(headers.len());
        let mut unmapped = Vec::new();
        let mut claimed = Vec::new();
        for h in headers {
            match table.lookup(h) {
                Some(field) if !claimed.contains(&field) => {
                    claimed.push(field);
                    columns.push(Some(field));
                }
                _ => {
                    if !h.trim().is_empty() {
                        unmapped.push(h.trim().to_string());
                    }
                    columns.push(None);
                }
            }
        }
        Self {
            headers: headers.iter().map(|h| h.trim().to_string()).collect(),
            columns,
            unmapped,
        }
    }

    pub fn has(&self, field: StudentField) -> bool {
        self.columns.iter().any(|c| *c == Some(field))
    }
}
