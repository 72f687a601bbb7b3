//! Access scope filtering.
//!
//! A scope arrives from the caller as an opaque value and is turned into SQL
//! conditions (for read paths) or checked in memory (for upload validation).
//! Any level that is restricted but lists nothing matches nothing.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

const MATCH_NOTHING: &str = "1 = 0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessScope {
    pub unrestricted: bool,
    pub college_ids: Vec<String>,
    pub college_names: Vec<String>,
    pub all_courses: bool,
    pub course_ids: Vec<String>,
    pub course_names: Vec<String>,
    pub all_branches: bool,
    pub branch_ids: Vec<String>,
    pub branch_names: Vec<String>,
}

/// Id and name of one catalog entity for in-memory checks.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

impl<'a> EntityRef<'a> {
    pub fn new(id: &'a str, name: &'a str) -> Self {
        Self { id, name }
    }
}

/// Table shapes a predicate can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    Students,
    Colleges,
    Courses,
    Branches,
}

#[derive(Debug, Clone, Default)]
pub struct ScopePredicate {
    pub conditions: Vec<String>,
    pub params: Vec<Value>,
}

impl ScopePredicate {
    /// Joins the conditions with AND; an empty predicate renders as `1 = 1`.
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            "1 = 1".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }
}

enum Catalog {
    Colleges,
    Courses,
    Branches,
}

impl Catalog {
    fn table(&self) -> &'static str {
        match self {
            Self::Colleges => "colleges",
            Self::Courses => "courses",
            Self::Branches => "branches",
        }
    }
}

/// How a table exposes one scope level.
enum LevelColumn {
    /// Both the id and the name live on the row.
    Row { id: String, name: String },
    /// Only a reference id is available (e.g. `courses.college_id`).
    Id(String),
    /// Only a denormalized name is available (e.g. `students.course`).
    Name(String),
}

struct Level<'a> {
    all: bool,
    ids: &'a [String],
    names: &'a [String],
}

impl AccessScope {
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            ..Self::default()
        }
    }

    fn college_level(&self) -> Level<'_> {
        Level {
            all: false,
            ids: &self.college_ids,
            names: &self.college_names,
        }
    }

    fn course_level(&self) -> Level<'_> {
        Level {
            all: self.all_courses,
            ids: &self.course_ids,
            names: &self.course_names,
        }
    }

    fn branch_level(&self) -> Level<'_> {
        Level {
            all: self.all_branches,
            ids: &self.branch_ids,
            names: &self.branch_names,
        }
    }

    pub fn allows_college(&self, college: EntityRef<'_>) -> bool {
        self.unrestricted || level_allows(&self.college_level(), college)
    }

    pub fn allows_course(&self, course: EntityRef<'_>) -> bool {
        self.unrestricted || level_allows(&self.course_level(), course)
    }

    pub fn allows_branch(&self, branch: EntityRef<'_>) -> bool {
        self.unrestricted || level_allows(&self.branch_level(), branch)
    }

    /// Builds the restricting conditions for `target` rows aliased as `alias`.
    pub fn predicate(&self, target: ScopeTarget, alias: &str) -> ScopePredicate {
        let mut out = ScopePredicate::default();
        if self.unrestricted {
            return out;
        }

        let col = |c: &str| format!("{alias}.{c}");
        let (college, course, branch) = match target {
            ScopeTarget::Students => (
                Some(LevelColumn::Name(col("college"))),
                Some(LevelColumn::Name(col("course"))),
                Some(LevelColumn::Name(col("branch"))),
            ),
            ScopeTarget::Colleges => (
                Some(LevelColumn::Row {
                    id: col("id"),
                    name: col("name"),
                }),
                None,
                None,
            ),
            ScopeTarget::Courses => (
                Some(LevelColumn::Id(col("college_id"))),
                Some(LevelColumn::Row {
                    id: col("id"),
                    name: col("name"),
                }),
                None,
            ),
            ScopeTarget::Branches => (
                Some(LevelColumn::Id(format!(
                    "(SELECT sc.college_id FROM courses sc WHERE sc.id = {alias}.course_id)"
                ))),
                Some(LevelColumn::Id(col("course_id"))),
                Some(LevelColumn::Row {
                    id: col("id"),
                    name: col("name"),
                }),
            ),
        };

        if let Some(c) = college {
            push_level(&mut out, &self.college_level(), &c, Catalog::Colleges);
        }
        if let Some(c) = course {
            push_level(&mut out, &self.course_level(), &c, Catalog::Courses);
        }
        if let Some(c) = branch {
            push_level(&mut out, &self.branch_level(), &c, Catalog::Branches);
        }
        out
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn level_allows(level: &Level<'_>, entity: EntityRef<'_>) -> bool {
    if level.all {
        return true;
    }
    if level.ids.iter().any(|x| x == entity.id) {
        return true;
    }
    let name = norm(entity.name);
    level.names.iter().any(|n| norm(n) == name)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn push_level(out: &mut ScopePredicate, level: &Level<'_>, column: &LevelColumn, catalog: Catalog) {
    if level.all {
        return;
    }
    let ids: Vec<&String> = level.ids.iter().filter(|s| !s.trim().is_empty()).collect();
    let names: Vec<String> = level
        .names
        .iter()
        .map(|s| norm(s))
        .filter(|s| !s.is_empty())
        .collect();
    if ids.is_empty() && names.is_empty() {
        out.conditions.push(MATCH_NOTHING.to_string());
        return;
    }

    let table = catalog.table();
    let mut alternatives: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if !ids.is_empty() {
        let ph = placeholders(ids.len());
        alternatives.push(match column {
            LevelColumn::Row { id, .. } | LevelColumn::Id(id) => format!("{id} IN ({ph})"),
            LevelColumn::Name(name) => format!(
                "LOWER(TRIM({name})) IN (SELECT LOWER(t.name) FROM {table} t WHERE t.id IN ({ph}))"
            ),
        });
        params.extend(ids.iter().map(|s| Value::Text((*s).clone())));
    }
    if !names.is_empty() {
        let ph = placeholders(names.len());
        alternatives.push(match column {
            LevelColumn::Row { name, .. } | LevelColumn::Name(name) => {
                format!("LOWER(TRIM({name})) IN ({ph})")
            }
            LevelColumn::Id(id) => format!(
                "{id} IN (SELECT t.id FROM {table} t WHERE LOWER(t.name) IN ({ph}))"
            ),
        });
        params.extend(names.into_iter().map(Value::Text));
    }

    out.conditions.push(format!("({})", alternatives.join(" OR ")));
    out.params.extend(params);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::{params_from_iter, Connection};

    fn seed(conn: &Connection) {
        let now = db::now_rfc3339();
        conn.execute(
            "INSERT INTO colleges(id, name, created_at, updated_at) VALUES('c1', 'Tech U', ?1, ?1), ('c2', 'Arts U', ?1, ?1)",
            [&now],
        )
        .expect("colleges");
        conn.execute(
            "INSERT INTO courses(id, college_id, name, total_years, semesters_per_year, created_at, updated_at)
             VALUES('k1', 'c1', 'B.Tech', 4, 2, ?1, ?1), ('k2', 'c2', 'B.A', 3, 2, ?1, ?1)",
            [&now],
        )
        .expect("courses");
        for (id, adm, college, course, branch) in [
            ("s1", "A1", "Tech U", "B.Tech", "CSE"),
            ("s2", "A2", "Tech U", "B.Tech", "ECE"),
            ("s3", "A3", "Arts U", "B.A", "History"),
        ] {
            conn.execute(
                "INSERT INTO students(id, admission_number, student_name, college, course, branch, batch, created_at, updated_at)
                 VALUES(?1, ?2, 'x', ?3, ?4, ?5, '2023-2027', ?6, ?6)",
                (id, adm, college, course, branch, &now),
            )
            .expect("student");
        }
    }

    fn count(conn: &Connection, table: &str, scope: &AccessScope, target: ScopeTarget) -> i64 {
        let p = scope.predicate(target, "x");
        let sql = format!("SELECT COUNT(*) FROM {table} x WHERE {}", p.sql());
        conn.query_row(&sql, params_from_iter(p.params.iter()), |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn unrestricted_scope_adds_no_conditions() {
        let p = AccessScope::unrestricted().predicate(ScopeTarget::Students, "s");
        assert!(p.conditions.is_empty());
        assert_eq!(p.sql(), "1 = 1");
    }

    #[test]
    fn empty_course_list_without_all_courses_matches_nothing() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope {
            college_names: vec!["Tech U".into()],
            all_courses: false,
            all_branches: true,
            ..AccessScope::default()
        };
        assert_eq!(count(&conn, "students", &scope, ScopeTarget::Students), 0);
        assert_eq!(count(&conn, "courses", &scope, ScopeTarget::Courses), 0);
    }

    #[test]
    fn default_scope_is_fail_closed() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope::default();
        assert_eq!(count(&conn, "students", &scope, ScopeTarget::Students), 0);
        assert_eq!(count(&conn, "colleges", &scope, ScopeTarget::Colleges), 0);
        assert!(!scope.allows_college(EntityRef::new("c1", "Tech U")));
    }

    #[test]
    fn college_ids_resolve_to_names_for_student_rows() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope {
            college_ids: vec!["c1".into()],
            all_courses: true,
            all_branches: true,
            ..AccessScope::default()
        };
        assert_eq!(count(&conn, "students", &scope, ScopeTarget::Students), 2);
        assert_eq!(count(&conn, "colleges", &scope, ScopeTarget::Colleges), 1);
        assert_eq!(count(&conn, "courses", &scope, ScopeTarget::Courses), 1);
    }

    #[test]
    fn branch_names_are_case_insensitive() {
        let conn = db::open_memory();
        seed(&conn);
        let scope = AccessScope {
            college_names: vec!["tech u".into()],
            all_courses: true,
            branch_names: vec![" cse ".into()],
            ..AccessScope::default()
        };
        assert_eq!(count(&conn, "students", &scope, ScopeTarget::Students), 1);
        assert!(scope.allows_college(EntityRef::new("x", "TECH U")));
        assert!(scope.allows_branch(EntityRef::new("b1", "Cse")));
        assert!(!scope.allows_branch(EntityRef::new("b2", "ECE")));
    }

    #[test]
    fn course_ids_match_by_id_in_memory() {
        let scope = AccessScope {
            college_ids: vec!["c1".into()],
            course_ids: vec!["k1".into()],
            all_branches: true,
            ..AccessScope::default()
        };
        assert!(scope.allows_college(EntityRef::new("c1", "Tech U")));
        assert!(scope.allows_course(EntityRef::new("k1", "B.Tech")));
        assert!(!scope.allows_course(EntityRef::new("k2", "B.A")));
        // A matching name cannot satisfy an id-only restriction.
        assert!(!scope.allows_course(EntityRef::new("k9", "B.Tech")));
    }

    #[test]
    fn scope_deserializes_with_missing_fields() {
        let scope: AccessScope =
            serde_json::from_value(serde_json::json!({ "collegeNames": ["Tech U"] }))
                .expect("scope");
        assert!(!scope.unrestricted);
        assert!(!scope.all_courses);
        assert_eq!(scope.college_names, vec!["Tech U".to_string()]);
    }
}
