use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Normalized student fields. This is the `sanitizedData` of a preview row and
/// the payload a commit re-sends; field order is fixed so its JSON form is
/// canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentDraft {
    pub admission_number: Option<String>,
    pub pin_no: Option<String>,
    pub student_name: Option<String>,
    pub gender: Option<String>,
    pub college: Option<String>,
    pub course: Option<String>,
    pub branch: Option<String>,
    pub batch: Option<String>,
    pub current_year: Option<i64>,
    pub current_semester: Option<i64>,
    pub student_status: Option<String>,
    pub student_mobile: Option<String>,
    pub parent_mobile: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
}

impl StudentDraft {
    pub fn admission(&self) -> Option<&str> {
        non_blank(self.admission_number.as_deref())
    }

    /// Serialization used for sealing. Struct field order keeps it stable.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StudentStatus {
    Regular,
    Lateral,
    Detained,
    Discontinued,
    Transferred,
    PassedOut,
}

impl StudentStatus {
    pub const ALL: [Self; 6] = [
        Self::Regular,
        Self::Lateral,
        Self::Detained,
        Self::Discontinued,
        Self::Transferred,
        Self::PassedOut,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "regular" => Some(Self::Regular),
            "lateral" | "lateralentry" | "le" => Some(Self::Lateral),
            "detained" | "detainee" => Some(Self::Detained),
            "discontinued" | "dropout" | "dropped" => Some(Self::Discontinued),
            "transferred" | "transfer" => Some(Self::Transferred),
            "passedout" | "passout" | "completed" | "alumni" => Some(Self::PassedOut),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Lateral => "Lateral",
            Self::Detained => "Detained",
            Self::Discontinued => "Discontinued",
            Self::Transferred => "Transferred",
            Self::PassedOut => "Passed Out",
        }
    }
}

impl TryFrom<String> for StudentStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("unknown student status '{s}'"))
    }
}

impl From<StudentStatus> for String {
    fn from(s: StudentStatus) -> Self {
        s.as_str().to_string()
    }
}

pub fn normalize_gender(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "m" | "male" | "boy" => Some("Male"),
        "f" | "female" | "girl" => Some("Female"),
        "o" | "other" | "others" | "transgender" => Some("Other"),
        _ => None,
    }
}

/// Reduces a phone number to its 10 local digits. Spaces, dashes, dots and
/// brackets are ignored and an Indian country code is stripped.
pub fn normalize_mobile(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }
    if digits.len() == 12 && digits.starts_with("91") {
        digits.drain(..2);
    }
    (digits.len() == 10).then_some(digits)
}

pub fn normalize_email(s: &str) -> Option<String> {
    let s = s.trim().to_lowercase();
    if s.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = s.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    let (host, tld) = domain.rsplit_once('.')?;
    if host.is_empty() || tld.len() < 2 {
        return None;
    }
    Some(s)
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
];

/// Accepts common day-first spellings and spreadsheet serial numbers and
/// returns an ISO `YYYY-MM-DD` date.
pub fn normalize_date(s: &str) -> Option<String> {
    let s = s.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    // Serial day numbers as written by spreadsheets without a date style.
    if s.len() == 5 && s.chars().all(|c| c.is_ascii_digit()) {
        let serial: i64 = s.parse().ok()?;
        let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        let d = epoch.checked_add_signed(Duration::days(serial))?;
        return Some(d.format("%Y-%m-%d").to_string());
    }
    None
}

fn roman(s: &str) -> Option<i64> {
    let n = match s {
        "i" => 1,
        "ii" => 2,
        "iii" => 3,
        "iv" => 4,
        "v" => 5,
        "vi" => 6,
        "vii" => 7,
        "viii" => 8,
        "ix" => 9,
        "x" => 10,
        _ => return None,
    };
    Some(n)
}

/// Parses year/semester cells such as `2`, `2.0`, `2nd`, `II` or `Year 2`.
pub fn parse_stage_number(s: &str) -> Option<i64> {
    let lower = s.trim().to_lowercase();
    let mut t = lower.as_str();
    for prefix in ["semester", "year", "sem", "yr"] {
        if let Some(rest) = t.strip_prefix(prefix) {
            t = rest.trim_start_matches(|c: char| c == ' ' || c == '-' || c == '.');
            break;
        }
    }
    if let Ok(f) = t.parse::<f64>() {
        return (f.fract() == 0.0 && f >= 0.0 && f < 100.0).then_some(f as i64);
    }
    let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() {
        let suffix = &t[digits.len()..];
        if matches!(suffix, "st" | "nd" | "rd" | "th") {
            return digits.parse().ok();
        }
        return None;
    }
    roman(t)
}
