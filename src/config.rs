use crate::db;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};

pub const SETTINGS_KEY: &str = "engine.config";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Absence percentage a student must exceed to be listed as an absentee.
    pub absence_threshold: f64,
    pub top_classes: usize,
    pub top_teachers: usize,
    pub top_late_students: usize,
    pub top_absentees: usize,
    pub revenue_months: usize,
    pub new_student_months: usize,
    pub staff_attendance_weeks: usize,
    pub teacher_progress_months: usize,
    pub student_progress_months: usize,
    /// How far ahead staff look for classes starting or ending.
    pub horizon_days: i64,
    pub recent_homework_limit: usize,
    pub upcoming_exam_limit: usize,
    pub low_attendance_reminder: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            absence_threshold: 30.0,
            top_classes: 5,
            top_teachers: 5,
            top_late_students: 10,
            top_absentees: 10,
            revenue_months: 8,
            new_student_months: 8,
            staff_attendance_weeks: 6,
            teacher_progress_months: 4,
            student_progress_months: 4,
            horizon_days: 30,
            recent_homework_limit: 10,
            upcoming_exam_limit: 5,
            low_attendance_reminder: 80.0,
        }
    }
}

fn parse_count(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_percent(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=100.0).contains(&n) {
        return Err(format!("{} must be in 0..=100", key));
    }
    Ok(n)
}

impl EngineConfig {
    /// Applies one field. Unknown keys and out-of-range values are rejected.
    pub fn apply_field(&mut self, key: &str, v: &Value) -> Result<(), String> {
        match key {
            "absenceThreshold" => self.absence_threshold = parse_percent(v, key)?,
            "lowAttendanceReminder" => self.low_attendance_reminder = parse_percent(v, key)?,
            "topClasses" => self.top_classes = parse_count(v, key, 1, 50)? as usize,
            "topTeachers" => self.top_teachers = parse_count(v, key, 1, 50)? as usize,
            "topLateStudents" => self.top_late_students = parse_count(v, key, 1, 100)? as usize,
            "topAbsentees" => self.top_absentees = parse_count(v, key, 1, 100)? as usize,
            "revenueMonths" => self.revenue_months = parse_count(v, key, 1, 24)? as usize,
            "newStudentMonths" => self.new_student_months = parse_count(v, key, 1, 24)? as usize,
            "staffAttendanceWeeks" => {
                self.staff_attendance_weeks = parse_count(v, key, 1, 26)? as usize
            }
            "teacherProgressMonths" => {
                self.teacher_progress_months = parse_count(v, key, 1, 24)? as usize
            }
            "studentProgressMonths" => {
                self.student_progress_months = parse_count(v, key, 1, 24)? as usize
            }
            "horizonDays" => self.horizon_days = parse_count(v, key, 1, 365)?,
            "recentHomeworkLimit" => {
                self.recent_homework_limit = parse_count(v, key, 1, 100)? as usize
            }
            "upcomingExamLimit" => self.upcoming_exam_limit = parse_count(v, key, 1, 50)? as usize,
            _ => return Err(format!("unknown config field: {}", key)),
        }
        Ok(())
    }

    /// All-or-nothing patch.
    pub fn merge_patch(&self, patch: &Map<String, Value>) -> Result<EngineConfig, String> {
        let mut next = self.clone();
        for (k, v) in patch {
            next.apply_field(k, v)?;
        }
        Ok(next)
    }
}

/// Defaults overlaid with whatever stored fields still validate.
pub fn load(conn: &Connection) -> anyhow::Result<EngineConfig> {
    let mut cfg = EngineConfig::default();
    if let Some(saved) = db::settings_get_json(conn, SETTINGS_KEY)? {
        if let Some(obj) = saved.as_object() {
            for (k, v) in obj {
                if let Err(msg) = cfg.apply_field(k, v) {
                    tracing::warn!(field = %k, "ignoring stored engine setting: {}", msg);
                }
            }
        }
    }
    Ok(cfg)
}

pub fn save(conn: &Connection, cfg: &EngineConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_dashboard_shapes() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.absence_threshold, 30.0);
        assert_eq!((cfg.top_classes, cfg.top_teachers, cfg.top_late_students), (5, 5, 10));
        assert_eq!((cfg.revenue_months, cfg.staff_attendance_weeks), (8, 6));
    }

    #[test]
    fn patch_rejects_unknown_and_out_of_range() {
        let cfg = EngineConfig::default();
        let bad = json!({ "topClasses": 0 });
        assert!(cfg.merge_patch(bad.as_object().unwrap()).is_err());
        let unknown = json!({ "colour": "red" });
        assert!(cfg.merge_patch(unknown.as_object().unwrap()).is_err());
        let good = json!({ "topClasses": 3, "absenceThreshold": 25.5 });
        let next = cfg.merge_patch(good.as_object().unwrap()).expect("patch");
        assert_eq!(next.top_classes, 3);
        assert_eq!(next.absence_threshold, 25.5);
    }

    #[test]
    fn load_skips_malformed_stored_fields() {
        let conn = Connection::open_in_memory().expect("open");
        db::ensure_schema(&conn).expect("schema");
        db::settings_set_json(
            &conn,
            SETTINGS_KEY,
            &json!({ "topAbsentees": 3, "horizonDays": "soon", "legacyField": true }),
        )
        .expect("set");
        let cfg = load(&conn).expect("load");
        assert_eq!(cfg.top_absentees, 3);
        assert_eq!(cfg.horizon_days, 30);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let conn = Connection::open_in_memory().expect("open");
        db::ensure_schema(&conn).expect("schema");
        let cfg = EngineConfig {
            top_late_students: 7,
            ..EngineConfig::default()
        };
        save(&conn, &cfg).expect("save");
        assert_eq!(load(&conn).expect("load"), cfg);
    }
}
