use super::{elapsed_progress, name_of, planned_sessions, DashboardError, Directory};
use crate::aggregate::PerformanceAggregator;
use crate::calc;
use crate::config::EngineConfig;
use crate::distribution::{self, Bucket, Buckets, Category};
use crate::model::{ClassGraph, ClassStatus, HomeworkStatus};
use crate::store::{AcademicStore, ClassScope};
use crate::windows::{self, Granularity};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAttendance {
    pub week: String,
    pub attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingClass {
    pub class_id: String,
    pub class_name: String,
    pub start_date: String,
    pub teacher: String,
    pub room: String,
    pub students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndingClass {
    pub class_id: String,
    pub class_name: String,
    pub end_date: String,
    pub teacher: String,
    pub room: String,
    pub students: usize,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProgress {
    pub class_id: String,
    pub class_name: String,
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub progress: f64,
    pub students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LateStudent {
    pub student_id: String,
    pub name: String,
    pub pending_homework: usize,
    pub class_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffDashboard {
    pub total_students: usize,
    pub unassigned_students: usize,
    pub active_classes: usize,
    pub weekly_sessions: usize,
    pub attendance_data: Vec<WeeklyAttendance>,
    pub homework_status: Vec<Bucket>,
    pub upcoming_classes: Vec<UpcomingClass>,
    pub ending_classes: Vec<EndingClass>,
    pub class_progress: Vec<ClassProgress>,
    pub top_late_students: Vec<LateStudent>,
}

fn within(date: Option<NaiveDate>, from: NaiveDate, to: NaiveDate) -> Option<NaiveDate> {
    date.filter(|d| *d >= from && *d <= to)
}

/// Pending homework per student, with the class holding most of it.
fn late_students(classes: &[ClassGraph], directory: &Directory, limit: usize) -> Vec<LateStudent> {
    let mut order: Vec<&str> = Vec::new();
    let mut per_class: HashMap<&str, Vec<(&ClassGraph, usize)>> = HashMap::new();
    for graph in classes {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for h in graph.sessions.iter().flat_map(|s| s.homeworks.iter()) {
            if h.status == HomeworkStatus::Pending {
                *counts.entry(h.student_id.as_str()).or_default() += 1;
            }
        }
        // Keep first-seen order stable across HashMap iteration.
        for h in graph.sessions.iter().flat_map(|s| s.homeworks.iter()) {
            let sid = h.student_id.as_str();
            let Some(n) = counts.remove(sid) else {
                continue;
            };
            let slots = per_class.entry(sid).or_insert_with(|| {
                order.push(sid);
                Vec::new()
            });
            slots.push((graph, n));
        }
    }

    let rows: Vec<LateStudent> = order
        .into_iter()
        .filter_map(|sid| {
            let slots = per_class.get(sid)?;
            let total: usize = slots.iter().map(|(_, n)| n).sum();
            let (worst, _) = calc::top_n(slots.clone(), 1, |(_, n)| *n).into_iter().next()?;
            let user = directory.students.get(sid);
            Some(LateStudent {
                student_id: sid.to_string(),
                name: user.map(|u| u.name.clone()).unwrap_or_else(|| sid.to_string()),
                pending_homework: total,
                class_name: worst.class.name.clone(),
                phone: user
                    .and_then(|u| u.contact_phone())
                    .unwrap_or("Chưa cập nhật")
                    .to_string(),
            })
        })
        .collect();
    calc::top_n(rows, limit, |r| r.pending_homework)
}

pub fn assemble(
    store: &dyn AcademicStore,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<StaffDashboard, DashboardError> {
    let classes = store.class_graphs(ClassScope::All)?;
    let directory = Directory::load(store)?;
    let agg = PerformanceAggregator::new(&classes);
    let today = now.date_naive();
    let horizon = today + Duration::days(cfg.horizon_days);

    let enrolled: HashSet<&str> = classes
        .iter()
        .flat_map(|g| g.active_enrollments())
        .map(|e| e.enrollment.student_id.as_str())
        .collect();
    let unassigned_students = directory
        .students
        .keys()
        .filter(|id| !enrolled.contains(id.as_str()))
        .count();

    let active: Vec<&ClassGraph> = classes.iter().filter(|g| g.is_active()).collect();
    let this_week = windows::current(now, Granularity::Week);

    let attendance_data = windows::windows(now, cfg.staff_attendance_weeks, Granularity::Week)
        .iter()
        .map(|w| WeeklyAttendance {
            week: w.label.clone(),
            attendance: agg.attendance_tally(None, Some(w)).rate(),
        })
        .collect();

    let homework_status = distribution::distribute(
        classes
            .iter()
            .flat_map(|g| g.sessions.iter())
            .flat_map(|s| s.homeworks.iter()),
        Category::HomeworkStatus,
        Buckets::Fixed,
        |h| h.status.as_str().to_string(),
    );

    let mut upcoming: Vec<(NaiveDate, UpcomingClass)> = classes
        .iter()
        .filter(|g| g.class.status != ClassStatus::Cancelled)
        .filter_map(|g| {
            let start = within(g.class.start_date, today, horizon)?;
            Some((
                start,
                UpcomingClass {
                    class_id: g.class.id.clone(),
                    class_name: g.class.name.clone(),
                    start_date: start.to_string(),
                    teacher: name_of(&directory.teachers, &g.class.teacher_id),
                    room: g.class.room_or_tba(),
                    students: g.active_student_count(),
                },
            ))
        })
        .collect();
    upcoming.sort_by_key(|(d, _)| *d);

    let mut ending: Vec<(NaiveDate, EndingClass)> = active
        .iter()
        .filter_map(|g| {
            let end = within(g.class.end_date, today, horizon)?;
            Some((
                end,
                EndingClass {
                    class_id: g.class.id.clone(),
                    class_name: g.class.name.clone(),
                    end_date: end.to_string(),
                    teacher: name_of(&directory.teachers, &g.class.teacher_id),
                    room: g.class.room_or_tba(),
                    students: g.active_student_count(),
                    progress: elapsed_progress(&g.class, today),
                },
            ))
        })
        .collect();
    ending.sort_by_key(|(d, _)| *d);

    let class_progress = active
        .iter()
        .map(|g| {
            let planned = planned_sessions(g);
            ClassProgress {
                class_id: g.class.id.clone(),
                class_name: g.class.name.clone(),
                total_sessions: planned,
                completed_sessions: g.sessions.len(),
                progress: calc::rate(g.sessions.len(), planned),
                students: g.active_student_count(),
            }
        })
        .collect();

    Ok(StaffDashboard {
        total_students: directory.students.len(),
        unassigned_students,
        active_classes: active.len(),
        weekly_sessions: agg.session_count(Some(&this_week)),
        attendance_data,
        homework_status,
        upcoming_classes: upcoming.into_iter().map(|(_, c)| c).collect(),
        ending_classes: ending.into_iter().map(|(_, c)| c).collect(),
        class_progress,
        top_late_students: late_students(&classes, &directory, cfg.top_late_students),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use crate::store::{seed, SqliteStore};

    fn now() -> DateTime<Utc> {
        // Thursday
        parse_timestamp("2025-03-13T08:00:00Z").unwrap()
    }

    #[test]
    fn empty_workspace_still_has_three_homework_buckets() {
        let conn = seed::conn();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), now()).expect("dashboard");
        let keys: Vec<&str> = d.homework_status.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["passed", "pending", "failed"]);
        assert!(d.homework_status.iter().all(|b| b.count == 0 && b.percentage == 0.0));
        assert_eq!(d.attendance_data.len(), 6);
        assert_eq!(d.attendance_data[5].week, "Tuần 6");
        assert_eq!(d.total_students, 0);
    }

    fn seeded() -> rusqlite::Connection {
        let conn = seed::conn();
        seed::user(&conn, "t1", "Minh", "teacher", "active", "2024-01-01T00:00:00Z");
        for s in ["s1", "s2", "s3", "s4"] {
            seed::user(&conn, s, &format!("Student {}", s), "student", "active", "2025-01-01T00:00:00Z");
        }
        seed::course(&conn, "k1", 1.0);
        seed::class(&conn, "c1", "k1", "t1", "A1", "active", Some("2025-03-03"), Some("2025-04-02"), "2025-01-01T00:00:00Z");
        seed::class(&conn, "c2", "k1", "t1", "A2", "active", Some("2025-03-20"), Some("2025-06-30"), "2025-01-02T00:00:00Z");
        seed::class(&conn, "c3", "k1", "t1", "B1", "cancelled", Some("2025-03-25"), None, "2025-01-03T00:00:00Z");
        seed::schedule(&conn, "sc1", "c1", "Monday", "18:00", "19:30");
        seed::enroll(&conn, "e1", "c1", "s1", "active", "2025-03-01T00:00:00Z");
        seed::enroll(&conn, "e2", "c1", "s2", "active", "2025-03-01T00:00:00Z");
        seed::enroll(&conn, "e3", "c2", "s2", "active", "2025-03-01T00:00:00Z");
        seed::enroll(&conn, "e4", "c2", "s3", "dropped", "2025-03-01T00:00:00Z");
        seed::session(&conn, "x1", "c1", "2025-03-03T18:00:00Z", &[("s1", true, "pending"), ("s2", true, "passed")]);
        seed::session(&conn, "x2", "c1", "2025-03-10T18:00:00Z", &[("s1", false, "pending"), ("s2", true, "pending")]);
        seed::session(&conn, "x3", "c2", "2025-03-11T18:00:00Z", &[("s2", true, "pending")]);
        seed::session(&conn, "x4", "c2", "2025-03-12T18:00:00Z", &[("s2", true, "pending")]);
        conn
    }

    #[test]
    fn staff_overview_counts() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), now()).expect("dashboard");
        assert_eq!(d.total_students, 4);
        // s3 only has a dropped enrollment, s4 none.
        assert_eq!(d.unassigned_students, 2);
        assert_eq!(d.active_classes, 2);
        assert_eq!(d.weekly_sessions, 3);
        assert_eq!(d.attendance_data[5].attendance, 75.0);
        assert_eq!(d.attendance_data[4].attendance, 100.0);

        let pending = d.homework_status.iter().find(|b| b.key == "pending").unwrap();
        assert_eq!(pending.count, 5);
        assert_eq!(pending.percentage, 83.33);
    }

    #[test]
    fn horizon_lists_upcoming_and_ending() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), now()).expect("dashboard");
        let upcoming: Vec<&str> = d.upcoming_classes.iter().map(|c| c.class_id.as_str()).collect();
        assert_eq!(upcoming, vec!["c2"]);
        assert_eq!(d.upcoming_classes[0].teacher, "Minh");
        assert_eq!(d.ending_classes.len(), 1);
        assert_eq!(d.ending_classes[0].class_id, "c1");
        // 10 of 30 days elapsed.
        assert_eq!(d.ending_classes[0].progress, 33.33);
    }

    #[test]
    fn class_progress_uses_schedule() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), now()).expect("dashboard");
        let c1 = d.class_progress.iter().find(|c| c.class_id == "c1").unwrap();
        // Mondays 3, 10, 17, 24, 31 March.
        assert_eq!(c1.total_sessions, 5);
        assert_eq!(c1.completed_sessions, 2);
        assert_eq!(c1.progress, 40.0);
        let c2 = d.class_progress.iter().find(|c| c.class_id == "c2").unwrap();
        assert_eq!(c2.progress, 100.0);
    }

    #[test]
    fn late_students_ranked_by_pending() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), now()).expect("dashboard");
        let late = &d.top_late_students;
        assert_eq!(late.len(), 2);
        assert_eq!(late[0].student_id, "s2");
        assert_eq!(late[0].pending_homework, 3);
        assert_eq!(late[0].class_name, "Class c2");
        assert_eq!(late[1].student_id, "s1");
        assert_eq!(late[1].pending_homework, 2);
        assert_eq!(late[1].phone, "092");

        let cfg = EngineConfig {
            top_late_students: 1,
            ..EngineConfig::default()
        };
        assert_eq!(assemble(&store, &cfg, now()).expect("dashboard").top_late_students.len(), 1);
    }
}
