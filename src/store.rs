//! Read-only access to the academic records a dashboard needs.

use crate::model::*;
use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("corrupt {table} row {id}: {message}")]
    Corrupt {
        table: &'static str,
        id: String,
        message: String,
    },
}

fn corrupt(table: &'static str, id: &str, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table,
        id: id.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScope<'a> {
    All,
    Teacher(&'a str),
    /// Classes the student is (or was) enrolled in, with every classmate loaded.
    Student(&'a str),
    Class(&'a str),
}

pub trait AcademicStore {
    fn class_graphs(&self, scope: ClassScope<'_>) -> Result<Vec<ClassGraph>, StoreError>;
    fn users(&self, role: Role) -> Result<Vec<User>, StoreError>;
    fn user(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn courses(&self) -> Result<Vec<Course>, StoreError>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

// Keeps every IN (...) list well under SQLite's bound-parameter limit.
const ID_CHUNK: usize = 500;

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn timestamp(table: &'static str, id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(raw).ok_or_else(|| corrupt(table, id, format!("bad timestamp {:?}", raw)))
}

fn optional_date(table: &'static str, id: &str, raw: Option<String>) -> Result<Option<chrono::NaiveDate>, StoreError> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| corrupt(table, id, format!("bad date {:?}", s))),
    }
}

/// Runs `sql` (which must end in `IN ({})`) once per chunk of `ids`.
fn query_in<T, F>(conn: &Connection, sql: &str, ids: &[String], mut map: F) -> Result<Vec<T>, StoreError>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut out = Vec::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let full = sql.replace("{}", &placeholders(chunk.len()));
        let mut stmt = conn.prepare(&full)?;
        let values: Vec<Value> = chunk.iter().map(|id| Value::Text(id.clone())).collect();
        let rows = stmt
            .query_map(params_from_iter(values), |r| map(r))?
            .collect::<Result<Vec<_>, _>>()?;
        out.extend(rows);
    }
    Ok(out)
}

struct RawClass {
    id: String,
    name: String,
    course_id: String,
    teacher_id: String,
    level: String,
    status: String,
    room: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    created_at: String,
}

impl RawClass {
    fn into_record(self) -> Result<ClassRecord, StoreError> {
        let status = ClassStatus::parse(&self.status)
            .ok_or_else(|| corrupt("classes", &self.id, format!("bad status {:?}", self.status)))?;
        let level = CourseLevel::parse(&self.level);
        if level.is_none() {
            tracing::warn!(
                class_id = %self.id,
                level = %self.level,
                "unrecognised course level; class excluded from pass rate"
            );
        }
        Ok(ClassRecord {
            level,
            status,
            start_date: optional_date("classes", &self.id, self.start_date)?,
            end_date: optional_date("classes", &self.id, self.end_date)?,
            created_at: timestamp("classes", &self.id, &self.created_at)?,
            id: self.id,
            name: self.name,
            course_id: self.course_id,
            teacher_id: self.teacher_id,
            level_raw: self.level,
            room: self.room,
        })
    }
}

const CLASS_COLUMNS: &str =
    "id, name, course_id, teacher_id, course_level, status, room, start_date, end_date, created_at";

fn map_raw_class(r: &Row<'_>) -> rusqlite::Result<RawClass> {
    Ok(RawClass {
        id: r.get(0)?,
        name: r.get(1)?,
        course_id: r.get(2)?,
        teacher_id: r.get(3)?,
        level: r.get(4)?,
        status: r.get(5)?,
        room: r.get(6)?,
        start_date: r.get(7)?,
        end_date: r.get(8)?,
        created_at: r.get(9)?,
    })
}

fn map_score(r: &Row<'_>, offset: usize) -> rusqlite::Result<Score> {
    Ok(Score {
        id: r.get(offset)?,
        listening: r.get(offset + 1)?,
        reading: r.get(offset + 2)?,
        speaking: r.get(offset + 3)?,
        writing: r.get(offset + 4)?,
        feedback: r.get(offset + 5)?,
    })
}

struct RawUser {
    id: String,
    name: String,
    email: String,
    role: String,
    status: String,
    specialization: Option<String>,
    phone: Option<String>,
    parent_phone: Option<String>,
    input_level: Option<String>,
    created_at: String,
}

const USER_COLUMNS: &str =
    "id, name, email, role, status, specialization, phone, parent_phone, input_level, created_at";

fn map_raw_user(r: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        role: r.get(3)?,
        status: r.get(4)?,
        specialization: r.get(5)?,
        phone: r.get(6)?,
        parent_phone: r.get(7)?,
        input_level: r.get(8)?,
        created_at: r.get(9)?,
    })
}

impl RawUser {
    fn into_user(self) -> Result<User, StoreError> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| corrupt("users", &self.id, format!("bad role {:?}", self.role)))?;
        Ok(User {
            role,
            status: self.status.trim().to_ascii_lowercase(),
            created_at: timestamp("users", &self.id, &self.created_at)?,
            id: self.id,
            name: self.name,
            email: self.email,
            specialization: self.specialization,
            phone: self.phone,
            parent_phone: self.parent_phone,
            input_level: self.input_level,
        })
    }
}

impl SqliteStore<'_> {
    fn load_classes(&self, scope: ClassScope<'_>) -> Result<Vec<ClassRecord>, StoreError> {
        let (sql, arg) = match scope {
            ClassScope::All => (
                format!("SELECT {} FROM classes ORDER BY created_at, id", CLASS_COLUMNS),
                None,
            ),
            ClassScope::Teacher(id) => (
                format!(
                    "SELECT {} FROM classes WHERE lower(teacher_id) = lower(?) ORDER BY created_at, id",
                    CLASS_COLUMNS
                ),
                Some(id),
            ),
            ClassScope::Student(id) => (
                format!(
                    "SELECT {} FROM classes
                     WHERE id IN (SELECT class_id FROM enrollments WHERE lower(student_id) = lower(?))
                     ORDER BY created_at, id",
                    CLASS_COLUMNS
                ),
                Some(id),
            ),
            ClassScope::Class(id) => (
                format!("SELECT {} FROM classes WHERE lower(id) = lower(?)", CLASS_COLUMNS),
                Some(id),
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = match arg {
            Some(a) => stmt.query_map([a], map_raw_class)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_raw_class)?.collect::<Result<Vec<_>, _>>()?,
        };
        raws.into_iter().map(RawClass::into_record).collect()
    }

    fn load_enrollments(&self, class_ids: &[String]) -> Result<Vec<EnrollmentGraph>, StoreError> {
        let raws = query_in(
            self.conn,
            "SELECT e.id, e.class_id, e.student_id, e.status, e.created_at,
                    s.id, s.listening, s.reading, s.speaking, s.writing, s.feedback
             FROM enrollments e
             LEFT JOIN scores s ON s.enrollment_id = e.id
             WHERE e.class_id IN ({})
             ORDER BY e.created_at, e.id",
            class_ids,
            |r| {
                let score_id: Option<String> = r.get(5)?;
                let score = match score_id {
                    Some(_) => Some(map_score(r, 5)?),
                    None => None,
                };
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    score,
                ))
            },
        )?;
        raws.into_iter()
            .map(|(id, class_id, student_id, status, created_at, score)| {
                let status = EnrollmentStatus::parse(&status)
                    .ok_or_else(|| corrupt("enrollments", &id, format!("bad status {:?}", status)))?;
                Ok(EnrollmentGraph {
                    enrollment: Enrollment {
                        created_at: timestamp("enrollments", &id, &created_at)?,
                        id,
                        class_id,
                        student_id,
                        status,
                    },
                    scores: score.into_iter().collect(),
                })
            })
            .collect()
    }

    fn load_sessions(&self, class_ids: &[String]) -> Result<Vec<SessionGraph>, StoreError> {
        let raws = query_in(
            self.conn,
            "SELECT id, class_id, schedule_id, topic, created_at
             FROM sessions
             WHERE class_id IN ({})
             ORDER BY created_at, id",
            class_ids,
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )?;
        let mut sessions = Vec::with_capacity(raws.len());
        for (id, class_id, schedule_id, topic, created_at) in raws {
            sessions.push(SessionGraph {
                session: Session {
                    created_at: timestamp("sessions", &id, &created_at)?,
                    id,
                    class_id,
                    schedule_id,
                    topic,
                },
                attendances: Vec::new(),
                homeworks: Vec::new(),
            });
        }

        let session_ids: Vec<String> = sessions.iter().map(|s| s.session.id.clone()).collect();
        let index: HashMap<String, usize> = session_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let attendances = query_in(
            self.conn,
            "SELECT id, session_id, student_id, is_present
             FROM attendances
             WHERE session_id IN ({})
             ORDER BY rowid",
            &session_ids,
            |r| {
                Ok(Attendance {
                    id: r.get(0)?,
                    session_id: r.get(1)?,
                    student_id: r.get(2)?,
                    present: r.get::<_, i64>(3)? != 0,
                })
            },
        )?;
        for a in attendances {
            if let Some(&i) = index.get(&a.session_id) {
                sessions[i].attendances.push(a);
            }
        }

        let homeworks = query_in(
            self.conn,
            "SELECT id, session_id, student_id, status, feedback
             FROM homeworks
             WHERE session_id IN ({})
             ORDER BY rowid",
            &session_ids,
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )?;
        for (id, session_id, student_id, status, feedback) in homeworks {
            let status = HomeworkStatus::parse(&status)
                .ok_or_else(|| corrupt("homeworks", &id, format!("bad status {:?}", status)))?;
            if let Some(&i) = index.get(&session_id) {
                sessions[i].homeworks.push(Homework {
                    id,
                    session_id,
                    student_id,
                    status,
                    feedback,
                });
            }
        }
        Ok(sessions)
    }

    fn load_schedules(&self, class_ids: &[String]) -> Result<Vec<Schedule>, StoreError> {
        let raws = query_in(
            self.conn,
            "SELECT id, class_id, weekday, start_time, end_time
             FROM schedules
             WHERE class_id IN ({})",
            class_ids,
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )?;
        let mut out = Vec::with_capacity(raws.len());
        for (id, class_id, weekday, start, end) in raws {
            let weekday = parse_weekday(&weekday)
                .ok_or_else(|| corrupt("schedules", &id, format!("bad weekday {:?}", weekday)))?;
            let start_time = parse_time(&start)
                .ok_or_else(|| corrupt("schedules", &id, format!("bad start_time {:?}", start)))?;
            let end_time = parse_time(&end)
                .ok_or_else(|| corrupt("schedules", &id, format!("bad end_time {:?}", end)))?;
            out.push(Schedule {
                id,
                class_id,
                weekday,
                start_time,
                end_time,
            });
        }
        Ok(out)
    }

    fn load_exams(&self, class_ids: &[String]) -> Result<Vec<ExamGraph>, StoreError> {
        let raws = query_in(
            self.conn,
            "SELECT id, class_id, name, duration, start_time
             FROM exams
             WHERE class_id IN ({})
             ORDER BY start_time, id",
            class_ids,
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )?;
        let mut exams = Vec::with_capacity(raws.len());
        for (id, class_id, name, duration, start) in raws {
            exams.push(ExamGraph {
                exam: Exam {
                    start_time: timestamp("exams", &id, &start)?,
                    id,
                    class_id,
                    name,
                    duration_minutes: duration,
                },
                scores: Vec::new(),
            });
        }
        let exam_ids: Vec<String> = exams.iter().map(|x| x.exam.id.clone()).collect();
        let index: HashMap<String, usize> = exam_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let scores = query_in(
            self.conn,
            "SELECT exam_id, student_id, id, listening, reading, speaking, writing, feedback
             FROM scores
             WHERE exam_id IN ({}) AND student_id IS NOT NULL",
            &exam_ids,
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    ExamScore {
                        student_id: r.get(1)?,
                        score: map_score(r, 2)?,
                    },
                ))
            },
        )?;
        for (exam_id, score) in scores {
            if let Some(&i) = index.get(&exam_id) {
                exams[i].scores.push(score);
            }
        }
        Ok(exams)
    }
}

impl AcademicStore for SqliteStore<'_> {
    fn class_graphs(&self, scope: ClassScope<'_>) -> Result<Vec<ClassGraph>, StoreError> {
        let classes = self.load_classes(scope)?;
        if classes.is_empty() {
            return Ok(Vec::new());
        }
        let class_ids: Vec<String> = classes.iter().map(|c| c.id.clone()).collect();
        let index: HashMap<String, usize> = class_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let enrollments = self.load_enrollments(&class_ids)?;
        let sessions = self.load_sessions(&class_ids)?;
        let schedules = self.load_schedules(&class_ids)?;
        let exams = self.load_exams(&class_ids)?;

        let mut out: Vec<ClassGraph> = classes
            .into_iter()
            .map(|class| ClassGraph {
                class,
                enrollments: Vec::new(),
                sessions: Vec::new(),
                schedules: Vec::new(),
                exams: Vec::new(),
            })
            .collect();
        for e in enrollments {
            if let Some(&i) = index.get(&e.enrollment.class_id) {
                out[i].enrollments.push(e);
            }
        }
        for s in sessions {
            if let Some(&i) = index.get(&s.session.class_id) {
                out[i].sessions.push(s);
            }
        }
        for s in schedules {
            if let Some(&i) = index.get(&s.class_id) {
                out[i].schedules.push(s);
            }
        }
        for x in exams {
            if let Some(&i) = index.get(&x.exam.class_id) {
                out[i].exams.push(x);
            }
        }
        Ok(out)
    }

    fn users(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM users WHERE lower(role) = ? ORDER BY created_at, id",
            USER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map([role.as_str()], map_raw_user)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawUser::into_user).collect()
    }

    fn user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE lower(id) = lower(?)", USER_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, [id], map_raw_user)
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    fn courses(&self) -> Result<Vec<Course>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, price FROM courses ORDER BY name, id")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Course {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    price: r.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
