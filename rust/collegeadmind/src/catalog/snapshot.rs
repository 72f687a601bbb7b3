use super::{
    academic_year_from_row, branch_from_row, college_from_row, course_from_row,
    AcademicYearRecord, BranchRecord, CollegeRecord, CourseRecord, BRANCH_COLUMNS,
    COLLEGE_COLUMNS, COURSE_COLUMNS,
};
use rusqlite::Connection;

/// A point-in-time copy of the academic hierarchy. Validation runs entirely
/// against a snapshot so a preview is a pure function of (file, snapshot).
#[derive(Debug, Clone, Default)]
pub struct AcademicSnapshot {
    pub colleges: Vec<CollegeRecord>,
    pub courses: Vec<CourseRecord>,
    pub branches: Vec<BranchRecord>,
    pub academic_years: Vec<AcademicYearRecord>,
}

fn same(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl AcademicSnapshot {
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let colleges = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLLEGE_COLUMNS} FROM colleges ORDER BY name, id"
            ))?;
            let rows = stmt.query_map([], college_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let courses = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COURSE_COLUMNS} FROM courses ORDER BY name, id"
            ))?;
            let rows = stmt.query_map([], course_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let branches = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRANCH_COLUMNS} FROM branches ORDER BY course_id, name, id"
            ))?;
            let rows = stmt.query_map([], branch_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let academic_years = {
            let mut stmt =
                conn.prepare("SELECT id, label, is_active FROM academic_years ORDER BY label, id")?;
            let rows = stmt.query_map([], academic_year_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self {
            colleges,
            courses,
            branches,
            academic_years,
        })
    }

    pub fn college_by_name(&self, name: &str) -> Option<&CollegeRecord> {
        self.colleges.iter().find(|c| same(&c.name, name))
    }

    /// Course lookup restricted to one college.
    pub fn course_by_name(&self, college_id: &str, name: &str) -> Option<&CourseRecord> {
        self.courses
            .iter()
            .find(|c| c.college_id == college_id && same(&c.name, name))
    }

    /// Any course with this name, regardless of college.
    pub fn course_named_anywhere(&self, name: &str) -> Option<&CourseRecord> {
        self.courses.iter().find(|c| same(&c.name, name))
    }

    pub fn branches_named(&self, course_id: &str, name: &str) -> Vec<&BranchRecord> {
        self.branches
            .iter()
            .filter(|b| b.course_id == course_id && same(&b.name, name))
            .collect()
    }

    pub fn branches_of(&self, course_id: &str) -> Vec<&BranchRecord> {
        self.branches
            .iter()
            .filter(|b| b.course_id == course_id)
            .collect()
    }

    pub fn academic_year_by_label(&self, label: &str) -> Option<&AcademicYearRecord> {
        self.academic_years.iter().find(|y| same(&y.label, label))
    }
}
