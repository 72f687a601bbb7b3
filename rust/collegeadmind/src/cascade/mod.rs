//! Mutations of the academic hierarchy that must carry the denormalized
//! student columns along with them: renames and deletes.

mod delete;
mod rename;

pub use delete::{delete_branch, delete_college, delete_course, DeleteMode};
pub use rename::{
    update_branch, update_college, update_course, BranchPatch, CollegePatch, CoursePatch,
};

use crate::catalog::{BranchRecord, CourseRecord};
use rusqlite::{types::Value as SqlValue, Connection, OptionalExtension};

/// Students that belong to a branch row, as a `WHERE` fragment over the
/// `students` table.
///
/// Students carry the branch by name only. When the course keeps other rows
/// with the same name (one generic, others per academic year), a year-specific
/// row owns only its batch and the generic row owns every other batch.
pub(crate) fn branch_students(
    conn: &Connection,
    branch: &BranchRecord,
    course: &CourseRecord,
) -> rusqlite::Result<(String, Vec<SqlValue>)> {
    let mut sql = String::from("course = ? AND branch = ?");
    let mut params = vec![
        SqlValue::Text(course.name.clone()),
        SqlValue::Text(branch.name.clone()),
    ];

    let mut stmt = conn.prepare(
        "SELECT ay.label FROM branches b
         LEFT JOIN academic_years ay ON ay.id = b.academic_year_id
         WHERE b.course_id = ? AND b.name = ? AND b.id <> ?",
    )?;
    let siblings: Vec<Option<String>> = stmt
        .query_map((&course.id, &branch.name, &branch.id), |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    if siblings.is_empty() {
        return Ok((sql, params));
    }

    match branch.academic_year_id.as_deref() {
        Some(year_id) => {
            let label: Option<String> = conn
                .query_row(
                    "SELECT label FROM academic_years WHERE id = ?",
                    [year_id],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(label) = label {
                sql.push_str(" AND batch = ?");
                params.push(SqlValue::Text(label));
            }
        }
        None => {
            let labels: Vec<String> = siblings.into_iter().flatten().collect();
            if !labels.is_empty() {
                let marks = vec!["?"; labels.len()].join(", ");
                sql.push_str(&format!(" AND batch NOT IN ({marks})"));
                params.extend(labels.into_iter().map(SqlValue::Text));
            }
        }
    }
    Ok((sql, params))
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::catalog::{
        create_academic_year, create_branch, create_college, create_course, NewBranch,
        NewCollege, NewCourse,
    };
    use rusqlite::Connection;

    pub struct Seeded {
        pub college_id: String,
        pub course_id: String,
        pub mtech_id: String,
        pub cse_id: String,
        pub mtech_cse_id: String,
    }

    fn course(conn: &Connection, college_id: &str, name: &str) -> String {
        create_course(
            conn,
            &NewCourse {
                college_id: college_id.to_string(),
                name: name.into(),
                code: None,
                total_years: 4,
                semesters_per_year: 2,
                year_semester_config: None,
                metadata: None,
            },
        )
        .expect("course")
        .id
    }

    fn branch(conn: &Connection, course_id: &str, name: &str) -> String {
        create_branch(
            conn,
            &NewBranch {
                course_id: course_id.to_string(),
                name: name.into(),
                code: name.into(),
                total_years: None,
                semesters_per_year: None,
                year_semester_config: None,
                academic_year_id: None,
                metadata: None,
            },
        )
        .expect("branch")
        .branch
        .id
    }

    /// Tech U with B.Tech/CSE and M.Tech/CSE, both generic, and batch 2023-2027.
    pub fn seed(conn: &Connection) -> Seeded {
        let college_id = create_college(
            conn,
            &NewCollege {
                name: "Tech U".into(),
                code: None,
                metadata: None,
            },
        )
        .expect("college")
        .id;
        let course_id = course(conn, &college_id, "B.Tech");
        let mtech_id = course(conn, &college_id, "M.Tech");
        let cse_id = branch(conn, &course_id, "CSE");
        let mtech_cse_id = branch(conn, &mtech_id, "CSE");
        create_academic_year(conn, "2023-2027").expect("year");
        Seeded {
            college_id,
            course_id,
            mtech_id,
            cse_id,
            mtech_cse_id,
        }
    }

    pub fn student(conn: &Connection, adm: &str, college: &str, course: &str, branch: &str, batch: &str) {
        let now = crate::db::now_rfc3339();
        conn.execute(
            "INSERT INTO students(id, admission_number, student_name, college, course, branch, batch, created_at, updated_at)
             VALUES(?1, ?1, ?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            (adm, college, course, branch, batch, &now),
        )
        .expect("student");
    }

    pub fn count_where(conn: &Connection, cond: &str) -> i64 {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM students WHERE {cond}"),
            [],
            |r| r.get(0),
        )
        .expect("count")
    }
}
