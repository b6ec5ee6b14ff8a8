//! Roster listings annotated with derived pass, attendance and homework rates.

use crate::aggregate::{PerformanceAggregator, PerformanceRates};
use crate::dashboard::{name_of, user_index, DashboardError};
use crate::model::{ClassGraph, Role, User};
use crate::store::{AcademicStore, ClassScope};
use serde::Serialize;
use std::collections::HashSet;
use std::slice;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPerformance {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: String,
    pub specialization: Option<String>,
    pub class_count: usize,
    #[serde(flatten)]
    pub rates: PerformanceRates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: String,
    pub input_level: Option<String>,
    #[serde(flatten)]
    pub rates: PerformanceRates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPerformance {
    pub class_id: String,
    pub class_name: String,
    pub level: String,
    pub status: &'static str,
    pub teacher: String,
    pub students: usize,
    pub pass_rate: f64,
    pub attendance_rate: f64,
    pub homework_rate: f64,
    pub average_score: f64,
}

/// Every teacher with rates over all classes they have taught.
pub fn teachers(store: &dyn AcademicStore) -> Result<Vec<TeacherPerformance>, DashboardError> {
    let classes = store.class_graphs(ClassScope::All)?;
    let out = store
        .users(Role::Teacher)?
        .into_iter()
        .map(|t| {
            let mine: Vec<ClassGraph> = classes
                .iter()
                .filter(|g| g.class.teacher_id == t.id)
                .cloned()
                .collect();
            TeacherPerformance {
                class_count: mine.len(),
                rates: PerformanceAggregator::new(&mine).rates(None),
                id: t.id,
                name: t.name,
                email: t.email,
                status: t.status,
                specialization: t.specialization,
            }
        })
        .collect();
    Ok(out)
}

fn student_row(u: User, rates: PerformanceRates) -> StudentPerformance {
    StudentPerformance {
        id: u.id,
        name: u.name,
        email: u.email,
        status: u.status,
        input_level: u.input_level,
        rates,
    }
}

/// Every student, or only those enrolled in `class_id` with rates limited to that class.
pub fn students(
    store: &dyn AcademicStore,
    class_id: Option<&str>,
) -> Result<Vec<StudentPerformance>, DashboardError> {
    let students = store.users(Role::Student)?;
    match class_id {
        None => {
            let classes = store.class_graphs(ClassScope::All)?;
            let agg = PerformanceAggregator::new(&classes);
            Ok(students
                .into_iter()
                .map(|u| {
                    let rates = agg.rates(Some(&u.id));
                    student_row(u, rates)
                })
                .collect())
        }
        Some(id) => {
            let classes = store.class_graphs(ClassScope::Class(id))?;
            let Some(graph) = classes.first() else {
                return Err(DashboardError::NotFound(format!("class {}", id)));
            };
            let enrolled: HashSet<&str> = graph
                .enrollments
                .iter()
                .map(|e| e.enrollment.student_id.as_str())
                .collect();
            let agg = PerformanceAggregator::new(&classes);
            Ok(students
                .into_iter()
                .filter(|u| enrolled.contains(u.id.as_str()))
                .map(|u| {
                    let rates = agg.rates(Some(&u.id));
                    student_row(u, rates)
                })
                .collect())
        }
    }
}

fn status_str(g: &ClassGraph) -> &'static str {
    use crate::model::ClassStatus;
    match g.class.status {
        ClassStatus::Active => "active",
        ClassStatus::Completed => "completed",
        ClassStatus::Cancelled => "cancelled",
    }
}

/// Per-class metric rows, optionally for one teacher.
pub fn classes(
    store: &dyn AcademicStore,
    teacher_id: Option<&str>,
) -> Result<Vec<ClassPerformance>, DashboardError> {
    let scope = match teacher_id {
        Some(id) => ClassScope::Teacher(id),
        None => ClassScope::All,
    };
    let graphs = store.class_graphs(scope)?;
    let teachers = user_index(store.users(Role::Teacher)?);
    Ok(graphs
        .iter()
        .map(|g| {
            let agg = PerformanceAggregator::new(slice::from_ref(g));
            let rates = agg.rates(None);
            ClassPerformance {
                class_id: g.class.id.clone(),
                class_name: g.class.name.clone(),
                level: g.class.level_raw.clone(),
                status: status_str(g),
                teacher: name_of(&teachers, &g.class.teacher_id),
                students: g.active_student_count(),
                pass_rate: rates.rate_passed,
                attendance_rate: rates.rate_attendanced,
                homework_rate: rates.rate_passed_homework,
                average_score: agg.average_pair_score().unwrap_or(0.0),
            }
        })
        .collect())
}
