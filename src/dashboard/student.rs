use super::{name_of, planned_sessions, session_progress, DashboardError, Directory};
use crate::aggregate::PerformanceAggregator;
use crate::calc;
use crate::config::EngineConfig;
use crate::model::{weekday_name, ClassGraph, EnrollmentStatus, HomeworkStatus, Role, Skill};
use crate::store::{AcademicStore, ClassScope};
use crate::windows::{self, Granularity};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::slice;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStudent {
    pub id: String,
    pub name: String,
    pub level: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillScore {
    pub skill: Skill,
    pub my_score: f64,
    pub class_avg: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarPoint {
    pub subject: Skill,
    pub my_score: f64,
    pub class_avg: f64,
    pub full_mark: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingExam {
    pub exam_id: String,
    pub exam_name: String,
    pub class_name: String,
    pub date: String,
    pub time: String,
    pub duration: i64,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: String,
    pub time: String,
    pub subject: String,
    pub teacher: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub class_id: String,
    pub course_name: String,
    pub total_sessions: usize,
    pub attended_sessions: usize,
    /// Sessions held over sessions planned.
    pub progress: f64,
    /// Sessions attended over sessions held.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Homework,
    Exam,
    Attendance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyReminder {
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub message: String,
    pub priority: Priority,
    pub due_date: String,
    #[serde(skip)]
    due: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyProgress {
    pub month: String,
    pub attendance: f64,
    pub homework: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub current_student: CurrentStudent,
    pub enrolled_classes: usize,
    pub personal_attendance: f64,
    pub submitted_homework: usize,
    pub total_homework: usize,
    pub skill_scores: Vec<SkillScore>,
    pub radar_data: Vec<RadarPoint>,
    pub upcoming_exams: Vec<UpcomingExam>,
    pub weekly_schedule: Vec<ScheduleSlot>,
    pub course_progress: Vec<CourseProgress>,
    pub study_reminders: Vec<StudyReminder>,
    pub monthly_progress: Vec<MonthlyProgress>,
}

const REMINDER_DAYS: i64 = 7;

fn reminder(kind: ReminderKind, priority: Priority, due: NaiveDate, message: String) -> StudyReminder {
    StudyReminder {
        kind,
        message,
        priority,
        due_date: due.to_string(),
        due,
    }
}

fn percent_of(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    calc::round_to(100.0 * value / max, 2)
}

fn is_current(graph: &ClassGraph, student_id: &str) -> bool {
    graph.is_active()
        && graph.enrollments.iter().any(|e| {
            e.enrollment.student_id == student_id && e.enrollment.status == EnrollmentStatus::Active
        })
}

fn reminders(
    current: &[&ClassGraph],
    student_id: &str,
    cfg: &EngineConfig,
    now: DateTime<Utc>,
) -> Vec<StudyReminder> {
    let today = now.date_naive();
    let mut out = Vec::new();
    for g in current {
        for s in &g.sessions {
            let pending = s
                .homeworks
                .iter()
                .any(|h| h.student_id == student_id && h.status == HomeworkStatus::Pending);
            if !pending {
                continue;
            }
            let overdue = now - s.session.created_at > Duration::days(REMINDER_DAYS);
            let topic = s.session.topic.as_deref().unwrap_or("buổi học");
            out.push(reminder(
                ReminderKind::Homework,
                if overdue { Priority::High } else { Priority::Medium },
                s.session.created_at.date_naive() + Duration::days(REMINDER_DAYS),
                format!("Hoàn thành bài tập {} lớp {}", topic, g.class.name),
            ));
        }

        for x in &g.exams {
            let start = x.exam.start_time;
            if start >= now && start - now <= Duration::days(REMINDER_DAYS) {
                out.push(reminder(
                    ReminderKind::Exam,
                    Priority::High,
                    start.date_naive(),
                    format!("Chuẩn bị cho {} lớp {}", x.exam.name, g.class.name),
                ));
            }
        }

        let tally = PerformanceAggregator::new(slice::from_ref(*g)).attendance_tally(Some(student_id), None);
        if tally.total > 0 && tally.rate() < cfg.low_attendance_reminder {
            out.push(reminder(
                ReminderKind::Attendance,
                Priority::Medium,
                today,
                format!(
                    "Tỷ lệ chuyên cần lớp {} chỉ đạt {:.1}%",
                    g.class.name,
                    tally.rate()
                ),
            ));
        }
    }
    out.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.due.cmp(&b.due)));
    out
}

pub fn assemble(
    store: &dyn AcademicStore,
    cfg: &EngineConfig,
    student_id: &str,
    now: DateTime<Utc>,
) -> Result<StudentDashboard, DashboardError> {
    let student = store
        .user(student_id)?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| DashboardError::NotFound(format!("student {}", student_id)))?;
    // Row comparisons below use the id as stored.
    let stored_id = student.id.clone();
    let student_id = stored_id.as_str();
    let directory = Directory::load(store)?;
    let classes = store.class_graphs(ClassScope::Student(student_id))?;
    let agg = PerformanceAggregator::new(&classes);
    let me = Some(student_id);

    let current: Vec<&ClassGraph> = classes.iter().filter(|g| is_current(g, student_id)).collect();

    let level = current
        .iter()
        .filter_map(|g| {
            let e = g
                .enrollments
                .iter()
                .find(|e| e.enrollment.student_id == student_id)?;
            Some((e.enrollment.created_at, g.class.level_raw.clone()))
        })
        .max_by_key(|(at, _)| *at)
        .map(|(_, level)| level)
        .or_else(|| student.input_level.clone())
        .unwrap_or_else(|| "Chưa xác định".to_string());

    let attendance = agg.attendance_tally(me, None);
    let homework = agg.homework_tally(me, None);
    let pending = agg.homework_count(HomeworkStatus::Pending, me, None);

    let mine = agg.skill_averages(me);
    let everyone = agg.skill_averages(None);
    let skill_scores: Vec<SkillScore> = mine
        .iter()
        .zip(everyone.iter())
        .map(|(m, c)| SkillScore {
            skill: m.skill,
            my_score: m.average,
            class_avg: c.average,
            max_score: m.skill.max_score(),
        })
        .collect();
    let radar_data = skill_scores
        .iter()
        .map(|s| RadarPoint {
            subject: s.skill,
            my_score: percent_of(s.my_score, s.max_score),
            class_avg: percent_of(s.class_avg, s.max_score),
            full_mark: 100.0,
        })
        .collect();

    let mut exams: Vec<(DateTime<Utc>, UpcomingExam)> = current
        .iter()
        .flat_map(|g| g.exams.iter().map(move |x| (g, x)))
        .filter(|(_, x)| x.exam.start_time >= now)
        .map(|(g, x)| {
            (
                x.exam.start_time,
                UpcomingExam {
                    exam_id: x.exam.id.clone(),
                    exam_name: x.exam.name.clone(),
                    class_name: g.class.name.clone(),
                    date: x.exam.start_time.format("%Y-%m-%d").to_string(),
                    time: x.exam.start_time.format("%H:%M").to_string(),
                    duration: x.exam.duration_minutes,
                    room: g.class.room_or_tba(),
                },
            )
        })
        .collect();
    exams.sort_by_key(|(at, _)| *at);
    exams.truncate(cfg.upcoming_exam_limit);

    let mut slots: Vec<_> = current
        .iter()
        .flat_map(|g| g.schedules.iter().map(move |s| (g, s)))
        .collect();
    slots.sort_by_key(|(_, s)| (s.weekday.num_days_from_monday(), s.start_time));
    let weekly_schedule = slots
        .into_iter()
        .map(|(g, s)| ScheduleSlot {
            day: weekday_name(s.weekday).to_string(),
            time: format!("{} - {}", s.start_time.format("%H:%M"), s.end_time.format("%H:%M")),
            subject: g.class.name.clone(),
            teacher: name_of(&directory.teachers, &g.class.teacher_id),
            room: g.class.room_or_tba(),
        })
        .collect();

    let course_progress = current
        .iter()
        .map(|g| {
            let mine = PerformanceAggregator::new(slice::from_ref(*g)).attendance_tally(me, None);
            CourseProgress {
                class_id: g.class.id.clone(),
                course_name: g.class.name.clone(),
                total_sessions: planned_sessions(g),
                attended_sessions: mine.hits,
                progress: session_progress(g),
                completion_rate: calc::rate(mine.hits, g.sessions.len()),
            }
        })
        .collect();

    let monthly_progress = windows::windows(now, cfg.student_progress_months, Granularity::Month)
        .iter()
        .map(|w| MonthlyProgress {
            month: w.label.clone(),
            attendance: agg.attendance_tally(me, Some(w)).rate(),
            homework: agg.homework_tally(me, Some(w)).rate(),
            score: agg.exam_score_mean(me, w).unwrap_or(0.0),
        })
        .collect();

    Ok(StudentDashboard {
        current_student: CurrentStudent {
            id: student.id,
            name: student.name,
            level,
            status: student.status,
        },
        enrolled_classes: current.len(),
        personal_attendance: attendance.rate(),
        submitted_homework: homework.total - pending,
        total_homework: homework.total,
        skill_scores,
        radar_data,
        upcoming_exams: exams.into_iter().map(|(_, x)| x).collect(),
        weekly_schedule,
        course_progress,
        study_reminders: reminders(&current, student_id, cfg, now),
        monthly_progress,
    })
}
