use super::{DashboardError, Directory};
use crate::aggregate::{PerformanceAggregator, SkillAverage};
use crate::config::EngineConfig;
use crate::model::{HomeworkStatus, Role};
use crate::store::{AcademicStore, ClassScope};
use crate::windows::{self, Granularity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::slice;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub id: String,
    pub name: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetric {
    pub class_id: String,
    pub class_name: String,
    pub level: String,
    pub students: usize,
    pub attendance: f64,
    pub average_score: f64,
    pub homework: f64,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyScore {
    pub month: String,
    pub average_score: f64,
    pub attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentHomework {
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub status: HomeworkStatus,
    pub feedback: Option<String>,
    pub session_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassHomework {
    pub class_id: String,
    pub class_name: String,
    pub passed: usize,
    pub pending: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsentStudent {
    pub student_id: String,
    pub name: String,
    /// Class where the student missed the most sessions.
    pub class_name: String,
    pub absent_sessions: usize,
    pub total_sessions: usize,
    pub absence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub sessions: usize,
    pub attendance_rate: f64,
    pub homework_passed: usize,
    pub homework_pending: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub teacher: TeacherSummary,
    pub active_classes: usize,
    pub total_students: usize,
    pub weekly_sessions: usize,
    pub class_metrics: Vec<ClassMetric>,
    pub skill_averages: Vec<SkillAverage>,
    pub monthly_progress: Vec<MonthlyScore>,
    pub recent_homework: Vec<RecentHomework>,
    pub homework_by_class: Vec<ClassHomework>,
    pub absent_students: Vec<AbsentStudent>,
    pub weekly_summary: WeeklySummary,
}

pub fn assemble(
    store: &dyn AcademicStore,
    cfg: &EngineConfig,
    teacher_id: &str,
    now: DateTime<Utc>,
) -> Result<TeacherDashboard, DashboardError> {
    let teacher = store
        .user(teacher_id)?
        .filter(|u| u.role == Role::Teacher)
        .ok_or_else(|| DashboardError::NotFound(format!("teacher {}", teacher_id)))?;
    let directory = Directory::load(store)?;

    // Completed and cancelled classes drop off the teaching dashboard.
    let classes: Vec<_> = store
        .class_graphs(ClassScope::Teacher(teacher_id))?
        .into_iter()
        .filter(|g| g.is_active())
        .collect();
    let agg = PerformanceAggregator::new(&classes);

    let students: HashSet<&str> = classes
        .iter()
        .flat_map(|g| g.active_enrollments())
        .map(|e| e.enrollment.student_id.as_str())
        .collect();

    let class_metrics = classes
        .iter()
        .map(|g| {
            let one = PerformanceAggregator::new(slice::from_ref(g));
            let rates = one.rates(None);
            ClassMetric {
                class_id: g.class.id.clone(),
                class_name: g.class.name.clone(),
                level: g.class.level_raw.clone(),
                students: g.active_student_count(),
                attendance: rates.rate_attendanced,
                average_score: one.average_pair_score().unwrap_or(0.0),
                homework: rates.rate_passed_homework,
                pass_rate: rates.rate_passed,
            }
        })
        .collect();

    let monthly_progress = windows::windows(now, cfg.teacher_progress_months, Granularity::Month)
        .iter()
        .map(|w| MonthlyScore {
            month: w.label.clone(),
            average_score: agg.exam_score_mean(None, w).unwrap_or(0.0),
            attendance: agg.attendance_tally(None, Some(w)).rate(),
        })
        .collect();

    let student_name = |id: &str| {
        directory
            .students
            .get(id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    let mut graded: Vec<(DateTime<Utc>, RecentHomework)> = Vec::new();
    for g in &classes {
        for s in &g.sessions {
            for h in s.homeworks.iter().filter(|h| h.status != HomeworkStatus::Pending) {
                graded.push((
                    s.session.created_at,
                    RecentHomework {
                        student_id: h.student_id.clone(),
                        student_name: student_name(&h.student_id),
                        class_name: g.class.name.clone(),
                        status: h.status,
                        feedback: h.feedback.clone(),
                        session_date: super::format_instant(s.session.created_at),
                    },
                ));
            }
        }
    }
    graded.sort_by(|a, b| b.0.cmp(&a.0));
    graded.truncate(cfg.recent_homework_limit);

    let homework_by_class = classes
        .iter()
        .map(|g| {
            let one = PerformanceAggregator::new(slice::from_ref(g));
            ClassHomework {
                class_id: g.class.id.clone(),
                class_name: g.class.name.clone(),
                passed: one.homework_count(HomeworkStatus::Passed, None, None),
                pending: one.homework_count(HomeworkStatus::Pending, None, None),
                failed: one.homework_count(HomeworkStatus::Failed, None, None),
            }
        })
        .collect();

    let absent_students = agg
        .absentees(cfg.absence_threshold, cfg.top_absentees)
        .into_iter()
        .map(|r| AbsentStudent {
            name: student_name(&r.student_id),
            class_name: classes
                .iter()
                .find(|g| g.class.id == r.class_id)
                .map(|g| g.class.name.clone())
                .unwrap_or_default(),
            absent_sessions: r.tally.total - r.tally.hits,
            total_sessions: r.tally.total,
            absence_rate: r.absence_rate(),
            student_id: r.student_id,
        })
        .collect();

    let week = windows::current(now, Granularity::Week);
    let weekly_summary = WeeklySummary {
        sessions: agg.session_count(Some(&week)),
        attendance_rate: agg.attendance_tally(None, Some(&week)).rate(),
        homework_passed: agg.homework_count(HomeworkStatus::Passed, None, Some(&week)),
        homework_pending: agg.homework_count(HomeworkStatus::Pending, None, Some(&week)),
    };

    Ok(TeacherDashboard {
        teacher: TeacherSummary {
            id: teacher.id,
            name: teacher.name,
            specialization: teacher.specialization,
        },
        active_classes: classes.len(),
        total_students: students.len(),
        weekly_sessions: weekly_summary.sessions,
        class_metrics,
        skill_averages: agg.skill_averages(None),
        monthly_progress,
        recent_homework: graded.into_iter().map(|(_, r)| r).collect(),
        homework_by_class,
        absent_students,
        weekly_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_timestamp;
    use crate::store::{seed, SqliteStore};
    use rusqlite::Connection;

    fn now() -> DateTime<Utc> {
        parse_timestamp("2025-03-13T08:00:00Z").unwrap()
    }

    fn seeded() -> Connection {
        let conn = seed::conn();
        seed::user(&conn, "t1", "Minh", "teacher", "active", "2024-01-01T00:00:00Z");
        seed::user(&conn, "t2", "Hoa", "teacher", "active", "2024-01-01T00:00:00Z");
        for s in ["s1", "s2", "s3"] {
            seed::user(&conn, s, &format!("Student {}", s), "student", "active", "2025-01-01T00:00:00Z");
        }
        seed::course(&conn, "k1", 1.0);
        seed::class(&conn, "c1", "k1", "t1", "B1", "active", None, None, "2025-01-01T00:00:00Z");
        seed::class(&conn, "c2", "k1", "t1", "A1", "completed", None, None, "2025-01-01T00:00:00Z");
        seed::class(&conn, "c3", "k1", "t2", "A1", "active", None, None, "2025-01-01T00:00:00Z");
        seed::enroll(&conn, "e1", "c1", "s1", "active", "2025-01-05T00:00:00Z");
        seed::enroll(&conn, "e2", "c1", "s2", "active", "2025-01-05T00:00:00Z");
        seed::enroll(&conn, "e3", "c1", "s3", "active", "2025-01-05T00:00:00Z");
        seed::score(&conn, "e1", [Some(260.0), Some(260.0), Some(100.0), None]);
        seed::score(&conn, "e2", [Some(200.0), Some(200.0), None, None]);
        seed::score(&conn, "e3", [None, None, None, None]);
        // s3 misses 2 of 3 sessions, s2 misses 1 of 3 (33.33%), s1 misses none.
        seed::session(&conn, "x1", "c1", "2025-02-20T18:00:00Z", &[("s1", true, "passed"), ("s2", false, "failed"), ("s3", false, "pending")]);
        seed::session(&conn, "x2", "c1", "2025-03-10T18:00:00Z", &[("s1", true, "passed"), ("s2", true, "pending"), ("s3", false, "pending")]);
        seed::session(&conn, "x3", "c1", "2025-03-12T18:00:00Z", &[("s1", true, "failed"), ("s2", true, "passed"), ("s3", true, "pending")]);
        seed::exam(&conn, "ex1", "c1", "2025-03-05T09:00:00Z");
        seed::exam_score(&conn, "ex1", "s1", [Some(300.0), Some(200.0), None, None]);
        conn
    }

    #[test]
    fn unknown_teacher_is_not_found() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let err = assemble(&store, &EngineConfig::default(), "ghost", now()).expect_err("missing");
        assert!(matches!(err, DashboardError::NotFound(_)));
        let err = assemble(&store, &EngineConfig::default(), "s1", now()).expect_err("not a teacher");
        assert!(matches!(err, DashboardError::NotFound(_)));
    }

    #[test]
    fn class_metrics_cover_active_classes_only() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), "t1", now()).expect("dashboard");
        assert_eq!(d.active_classes, 1);
        assert_eq!(d.total_students, 3);
        let m = &d.class_metrics[0];
        assert_eq!(m.class_id, "c1");
        assert_eq!(m.students, 3);
        // 6 of 9 attendance rows present.
        assert_eq!(m.attendance, 66.67);
        // 520 passes B1, 400 fails, the all-null score is left out.
        assert_eq!(m.pass_rate, 50.0);
        assert_eq!(m.average_score, 460.0);
        assert_eq!(m.homework, 33.33);
        assert_eq!(d.skill_averages[0].average, 230.0);
        assert_eq!(d.skill_averages[2].average, 100.0);
    }

    #[test]
    fn absentees_strictly_above_threshold() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), "t1", now()).expect("dashboard");
        let ids: Vec<&str> = d.absent_students.iter().map(|a| a.student_id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s2"]);
        assert_eq!(d.absent_students[0].absence_rate, 66.67);
        assert_eq!(d.absent_students[0].absent_sessions, 2);
        assert_eq!(d.absent_students[0].class_name, "Class c1");

        let cfg = EngineConfig {
            absence_threshold: 34.0,
            ..EngineConfig::default()
        };
        let d = assemble(&store, &cfg, "t1", now()).expect("dashboard");
        assert_eq!(d.absent_students.len(), 1);
    }

    #[test]
    fn absence_is_judged_over_all_of_a_students_classes() {
        let conn = seed::conn();
        seed::user(&conn, "t1", "Minh", "teacher", "active", "2024-01-01T00:00:00Z");
        seed::user(&conn, "s1", "Lan", "student", "active", "2025-01-01T00:00:00Z");
        seed::user(&conn, "s2", "Huy", "student", "active", "2025-01-01T00:00:00Z");
        seed::course(&conn, "k1", 1.0);
        seed::class(&conn, "ca", "k1", "t1", "A1", "active", None, None, "2025-01-01T00:00:00Z");
        seed::class(&conn, "cb", "k1", "t1", "A2", "active", None, None, "2025-01-02T00:00:00Z");
        // s1: 4/10 missed in ca, 2/10 in cb. s2: 3/10 in ca, 5/10 in cb.
        for i in 0..10 {
            let at = format!("2025-02-{:02}T09:00:00Z", i + 1);
            seed::session(&conn, &format!("a{}", i), "ca", &at, &[("s1", i >= 4, "pending"), ("s2", i >= 3, "pending")]);
            seed::session(&conn, &format!("b{}", i), "cb", &at, &[("s1", i >= 2, "pending"), ("s2", i >= 5, "pending")]);
        }
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), "t1", now()).expect("dashboard");
        assert_eq!(d.absent_students.len(), 1);
        let huy = &d.absent_students[0];
        assert_eq!(huy.student_id, "s2");
        assert_eq!((huy.absent_sessions, huy.total_sessions), (8, 20));
        assert_eq!(huy.absence_rate, 40.0);
        assert_eq!(huy.class_name, "Class cb");
    }

    #[test]
    fn recent_homework_is_graded_newest_first() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let cfg = EngineConfig {
            recent_homework_limit: 3,
            ..EngineConfig::default()
        };
        let d = assemble(&store, &cfg, "t1", now()).expect("dashboard");
        let rows: Vec<(&str, HomeworkStatus)> = d
            .recent_homework
            .iter()
            .map(|r| (r.student_id.as_str(), r.status))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("s1", HomeworkStatus::Failed),
                ("s2", HomeworkStatus::Passed),
                ("s1", HomeworkStatus::Passed),
            ]
        );
        assert_eq!(d.recent_homework[0].student_name, "Student s1");
        let hw = &d.homework_by_class[0];
        assert_eq!((hw.passed, hw.pending, hw.failed), (3, 4, 2));
    }

    #[test]
    fn weekly_and_monthly_views() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let d = assemble(&store, &EngineConfig::default(), "t1", now()).expect("dashboard");
        assert_eq!(d.weekly_sessions, 2);
        assert_eq!(
            d.weekly_summary,
            WeeklySummary {
                sessions: 2,
                attendance_rate: 83.33,
                homework_passed: 2,
                homework_pending: 3,
            }
        );
        let months: Vec<&str> = d.monthly_progress.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["T12", "T1", "T2", "T3"]);
        assert_eq!(d.monthly_progress[3].average_score, 250.0);
        assert_eq!(d.monthly_progress[2].average_score, 0.0);
        assert_eq!(d.monthly_progress[2].attendance, 33.33);
    }
}
