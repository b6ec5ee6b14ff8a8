use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CourseLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
}

impl CourseLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Some(Self::A1),
            "A2" => Some(Self::A2),
            "B1" => Some(Self::B1),
            "B2" => Some(Self::B2),
            "C1" => Some(Self::C1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassStatus {
    Active,
    Completed,
    Cancelled,
}

impl ClassStatus {
    // Older rows were written as 'ACTIVE', newer ones as 'active'.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "dropped" => Some(Self::Dropped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeworkStatus {
    Pending,
    Passed,
    Failed,
}

impl HomeworkStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Staff,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "staff" => Some(Self::Staff),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Listening,
    Reading,
    Speaking,
    Writing,
}

impl Skill {
    pub const ALL: [Skill; 4] = [
        Skill::Listening,
        Skill::Reading,
        Skill::Speaking,
        Skill::Writing,
    ];

    /// Top of the scale a single skill test is graded on.
    pub fn max_score(self) -> f64 {
        match self {
            Self::Listening | Self::Reading => 495.0,
            Self::Speaking | Self::Writing => 200.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Lowercased free text; students use active/graduated/inactive/suspended.
    pub status: String,
    pub specialization: Option<String>,
    pub phone: Option<String>,
    pub parent_phone: Option<String>,
    pub input_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn contact_phone(&self) -> Option<&str> {
        self.parent_phone
            .as_deref()
            .or(self.phone.as_deref())
            .filter(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub course_id: String,
    pub teacher_id: String,
    /// `None` when `level_raw` is not a recognised course level.
    pub level: Option<CourseLevel>,
    pub level_raw: String,
    pub status: ClassStatus,
    pub room: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl ClassRecord {
    pub fn room_or_tba(&self) -> String {
        self.room
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("TBA")
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Score {
    pub id: String,
    pub listening: Option<f64>,
    pub reading: Option<f64>,
    pub speaking: Option<f64>,
    pub writing: Option<f64>,
    pub feedback: Option<String>,
}

impl Score {
    pub fn skill(&self, skill: Skill) -> Option<f64> {
        match skill {
            Skill::Listening => self.listening,
            Skill::Reading => self.reading,
            Skill::Speaking => self.speaking,
            Skill::Writing => self.writing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: String,
    pub class_id: String,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub class_id: String,
    pub schedule_id: Option<String>,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Attendance {
    pub id: String,
    pub session_id: String,
    pub student_id: String,
    pub present: bool,
}

#[derive(Debug, Clone)]
pub struct Homework {
    pub id: String,
    pub session_id: String,
    pub student_id: String,
    pub status: HomeworkStatus,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Exam {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExamScore {
    pub student_id: String,
    pub score: Score,
}

#[derive(Debug, Clone)]
pub struct EnrollmentGraph {
    pub enrollment: Enrollment,
    pub scores: Vec<Score>,
}

#[derive(Debug, Clone)]
pub struct SessionGraph {
    pub session: Session,
    pub attendances: Vec<Attendance>,
    pub homeworks: Vec<Homework>,
}

#[derive(Debug, Clone)]
pub struct ExamGraph {
    pub exam: Exam,
    pub scores: Vec<ExamScore>,
}

/// One class with everything hanging off it, as read for a single request.
#[derive(Debug, Clone)]
pub struct ClassGraph {
    pub class: ClassRecord,
    pub enrollments: Vec<EnrollmentGraph>,
    pub sessions: Vec<SessionGraph>,
    pub schedules: Vec<Schedule>,
    pub exams: Vec<ExamGraph>,
}

impl ClassGraph {
    pub fn is_active(&self) -> bool {
        self.class.status == ClassStatus::Active
    }

    pub fn active_enrollments(&self) -> impl Iterator<Item = &EnrollmentGraph> {
        self.enrollments
            .iter()
            .filter(|e| e.enrollment.status == EnrollmentStatus::Active)
    }

    pub fn active_student_count(&self) -> usize {
        self.active_enrollments().count()
    }
}

/// Accepts RFC 3339, SQLite's `YYYY-MM-DD HH:MM:SS` (taken as UTC), or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(t, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .ok()
}

pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
