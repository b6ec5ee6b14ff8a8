use super::{percent_change, ChangeType, DashboardError, Directory, StatCard};
use crate::calc;
use crate::config::EngineConfig;
use crate::distribution::{self, Bucket, Buckets, Category};
use crate::model::{ClassGraph, EnrollmentStatus};
use crate::store::{AcademicStore, ClassScope};
use crate::windows::{self, Granularity, TimeWindow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Period {
    ThisWeek,
    ThisMonth,
    ThisQuarter,
    ThisYear,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "thisWeek" => Some(Self::ThisWeek),
            "thisMonth" => Some(Self::ThisMonth),
            "thisQuarter" => Some(Self::ThisQuarter),
            "thisYear" => Some(Self::ThisYear),
            _ => None,
        }
    }

    /// `[start, now]` for this period and the equally long span right before it.
    pub fn spans(self, now: DateTime<Utc>) -> (TimeWindow, TimeWindow) {
        let today = now.date_naive();
        let start = match self {
            Period::ThisWeek => now - Duration::days(7),
            Period::ThisMonth => midnight(today.with_day(1).unwrap_or(today)),
            Period::ThisQuarter => {
                let month = ((today.month() - 1) / 3) * 3 + 1;
                midnight(NaiveDate::from_ymd_opt(today.year(), month, 1).unwrap_or(today))
            }
            Period::ThisYear => {
                midnight(NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today))
            }
        };
        // Inclusive of `now` itself.
        let end = now + Duration::nanoseconds(1);
        let previous_start = start - (end - start);
        (
            TimeWindow {
                label: "current".to_string(),
                start,
                end,
            },
            TimeWindow {
                label: "previous".to_string(),
                start: previous_start,
                end: start,
            },
        )
    }
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub month: String,
    pub revenue: f64,
    pub courses: usize,
    pub enrollments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudentPoint {
    pub month: String,
    pub new_students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopClass {
    pub class_id: String,
    pub class_name: String,
    pub student_count: usize,
    pub teacher: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTeacher {
    pub teacher_id: String,
    pub name: String,
    pub class_count: usize,
    pub students: usize,
    pub specialization: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetail {
    pub total: usize,
    pub completed: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub total_revenue: StatCard,
    pub active_students: StatCard,
    pub completion_rate: StatCard,
    pub active_classes: StatCard,
    pub revenue_by_month: Vec<RevenuePoint>,
    pub student_status_distribution: Vec<Bucket>,
    pub new_students_by_month: Vec<NewStudentPoint>,
    pub level_distribution: Vec<Bucket>,
    pub top_classes: Vec<TopClass>,
    pub top_teachers: Vec<TopTeacher>,
    pub completion_rate_detail: CompletionDetail,
    pub average_class_size: StatCard,
    pub last_updated: String,
    pub period: Period,
}

/// Thousands-separated amount in dong, e.g. `1,250,000 ₫`.
pub fn format_vnd(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if whole < 0 {
        out.insert(0, '-');
    }
    format!("{} ₫", out)
}

struct Revenue {
    amount: f64,
    enrollments: usize,
    courses: usize,
}

fn revenue_in(classes: &[ClassGraph], prices: &HashMap<String, f64>, window: &TimeWindow) -> Revenue {
    let mut amount = 0.0;
    let mut enrollments = 0usize;
    let mut courses: HashSet<&str> = HashSet::new();
    for g in classes {
        let price = prices.get(&g.class.course_id).copied().unwrap_or(0.0);
        for e in g.active_enrollments() {
            if window.contains(e.enrollment.created_at) {
                amount += price;
                enrollments += 1;
                courses.insert(g.class.course_id.as_str());
            }
        }
    }
    Revenue {
        amount,
        enrollments,
        courses: courses.len(),
    }
}

pub fn assemble(
    store: &dyn AcademicStore,
    cfg: &EngineConfig,
    period: Period,
    now: DateTime<Utc>,
) -> Result<AdminDashboard, DashboardError> {
    let classes = store.class_graphs(ClassScope::All)?;
    let directory = Directory::load(store)?;
    let prices: HashMap<String, f64> = store
        .courses()?
        .into_iter()
        .map(|c| (c.id, c.price))
        .collect();
    let students = &directory.student_list;

    let (current, previous) = period.spans(now);

    // Revenue
    let rev_now = revenue_in(&classes, &prices, &current);
    let rev_before = revenue_in(&classes, &prices, &previous);
    let (change, change_type) = percent_change(rev_now.amount, rev_before.amount);
    let total_revenue = StatCard {
        title: "Tổng Doanh Thu".to_string(),
        value: format_vnd(rev_now.amount),
        change,
        change_type,
        subtitle: Some(format!("Từ {} lượt đăng ký", rev_now.enrollments)),
    };

    // Students
    let active_count = students.iter().filter(|s| s.status == "active").count();
    let graduated_count = students.iter().filter(|s| s.status == "graduated").count();
    let joined_now = students.iter().filter(|s| current.contains(s.created_at)).count();
    let joined_before = students.iter().filter(|s| previous.contains(s.created_at)).count();
    let (change, change_type) = percent_change(joined_now as f64, joined_before as f64);
    let active_students = StatCard {
        title: "Học Viên Đang Học".to_string(),
        value: active_count.to_string(),
        change,
        change_type,
        subtitle: Some(format!(
            "{} đang học, {} đã hoàn thành",
            active_count, graduated_count
        )),
    };

    // Completion
    let all_enrollments: Vec<_> = classes.iter().flat_map(|g| g.enrollments.iter()).collect();
    let completed = all_enrollments
        .iter()
        .filter(|e| e.enrollment.status == EnrollmentStatus::Completed)
        .count();
    let completion_detail = CompletionDetail {
        total: all_enrollments.len(),
        completed,
        rate: calc::rate(completed, all_enrollments.len()),
    };
    let completion_rate = StatCard {
        title: "Tỷ Lệ Hoàn Thành Khóa Học".to_string(),
        value: format!("{:.1}%", completion_detail.rate),
        change: None,
        change_type: ChangeType::Neutral,
        subtitle: Some(format!(
            "{} trong tổng số {} đã hoàn thành",
            completed,
            all_enrollments.len()
        )),
    };

    // Classes
    let active: Vec<&ClassGraph> = classes.iter().filter(|g| g.is_active()).collect();
    let active_teachers: HashSet<&str> = active.iter().map(|g| g.class.teacher_id.as_str()).collect();
    let new_classes = classes
        .iter()
        .filter(|g| current.contains(g.class.created_at))
        .count();
    let active_classes = StatCard {
        title: "Lớp Đang Hoạt Động".to_string(),
        value: active.len().to_string(),
        change: Some(format!("{} lớp mới trong kỳ", new_classes)),
        change_type: if new_classes > 0 {
            ChangeType::Positive
        } else {
            ChangeType::Neutral
        },
        subtitle: Some(format!("{} giáo viên tham gia", active_teachers.len())),
    };

    let avg_size = calc::mean(active.iter().map(|g| g.active_student_count() as f64));
    let average_class_size = StatCard {
        title: "Quy mô lớp học trung bình".to_string(),
        value: avg_size
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "0".to_string()),
        change: None,
        change_type: ChangeType::Neutral,
        subtitle: Some("học sinh mỗi lớp".to_string()),
    };

    // Series
    let revenue_by_month = windows::windows(now, cfg.revenue_months, Granularity::Month)
        .iter()
        .map(|w| {
            let r = revenue_in(&classes, &prices, w);
            RevenuePoint {
                month: w.label.clone(),
                revenue: r.amount,
                courses: r.courses,
                enrollments: r.enrollments,
            }
        })
        .collect();
    let new_students_by_month = windows::windows(now, cfg.new_student_months, Granularity::Month)
        .iter()
        .map(|w| NewStudentPoint {
            month: w.label.clone(),
            new_students: students.iter().filter(|s| w.contains(s.created_at)).count(),
        })
        .collect();

    // Distributions
    let student_status_distribution = distribution::distribute(
        students.iter(),
        Category::StudentStatus,
        Buckets::Observed,
        |s| s.status.clone(),
    );
    let mut level_students: Vec<(String, &str)> = Vec::new();
    let mut seen: HashSet<(String, &str)> = HashSet::new();
    for g in &classes {
        let level = g
            .class
            .level
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| g.class.level_raw.clone());
        for e in g.active_enrollments() {
            let key = (level.clone(), e.enrollment.student_id.as_str());
            if seen.insert(key.clone()) {
                level_students.push(key);
            }
        }
    }
    let level_distribution = distribution::distribute(
        level_students,
        Category::CourseLevel,
        Buckets::Observed,
        |(level, _)| level.clone(),
    );

    // Rankings
    let class_rows: Vec<TopClass> = active
        .iter()
        .map(|g| TopClass {
            class_id: g.class.id.clone(),
            class_name: g.class.name.clone(),
            student_count: g.active_student_count(),
            teacher: super::name_of(&directory.teachers, &g.class.teacher_id),
            room: g.class.room_or_tba(),
        })
        .collect();
    let top_classes = calc::top_n(class_rows, cfg.top_classes, |c| c.student_count);

    let teacher_rows: Vec<TopTeacher> = directory
        .teacher_list
        .iter()
        .filter_map(|t| {
            let mine: Vec<&&ClassGraph> = active
                .iter()
                .filter(|g| g.class.teacher_id == t.id)
                .collect();
            if mine.is_empty() {
                return None;
            }
            let students: HashSet<&str> = mine
                .iter()
                .flat_map(|g| g.active_enrollments())
                .map(|e| e.enrollment.student_id.as_str())
                .collect();
            Some(TopTeacher {
                teacher_id: t.id.clone(),
                name: t.name.clone(),
                class_count: mine.len(),
                students: students.len(),
                specialization: t
                    .specialization
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Chưa cập nhật".to_string()),
            })
        })
        .collect();
    let top_teachers = calc::top_n(teacher_rows, cfg.top_teachers, |t| t.class_count);

    Ok(AdminDashboard {
        total_revenue,
        active_students,
        completion_rate,
        active_classes,
        revenue_by_month,
        student_status_distribution,
        new_students_by_month,
        level_distribution,
        top_classes,
        top_teachers,
        completion_rate_detail: completion_detail,
        average_class_size,
        last_updated: super::format_instant(now),
        period,
    })
}
