//! Audience-specific dashboard payloads assembled from the aggregation engine.

pub mod admin;
pub mod staff;
pub mod student;
pub mod teacher;

use crate::calc;
use crate::model::{ClassGraph, ClassRecord, User};
use crate::store::{AcademicStore, StoreError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatCard {
    pub title: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

/// Relative change of `current` against `previous`, e.g. `+12.5%`.
pub fn percent_change(current: f64, previous: f64) -> (Option<String>, ChangeType) {
    if previous <= 0.0 {
        if current > 0.0 {
            return (Some("mới".to_string()), ChangeType::Positive);
        }
        return (None, ChangeType::Neutral);
    }
    let pct = calc::round_to(100.0 * (current - previous) / previous, 1);
    let kind = if pct > 0.0 {
        ChangeType::Positive
    } else if pct < 0.0 {
        ChangeType::Negative
    } else {
        ChangeType::Neutral
    };
    (Some(format!("{:+.1}%", pct)), kind)
}

pub fn user_index(users: Vec<User>) -> HashMap<String, User> {
    users.into_iter().map(|u| (u.id.clone(), u)).collect()
}

pub fn name_of(users: &HashMap<String, User>, id: &str) -> String {
    users
        .get(id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| "Chưa phân công".to_string())
}

/// Teachers and students in creation order, plus lookups by id.
pub struct Directory {
    pub teacher_list: Vec<User>,
    pub student_list: Vec<User>,
    pub teachers: HashMap<String, User>,
    pub students: HashMap<String, User>,
}

impl Directory {
    pub fn load(store: &dyn AcademicStore) -> Result<Self, StoreError> {
        let teacher_list = store.users(crate::model::Role::Teacher)?;
        let student_list = store.users(crate::model::Role::Student)?;
        Ok(Self {
            teachers: user_index(teacher_list.clone()),
            students: user_index(student_list.clone()),
            teacher_list,
            student_list,
        })
    }
}

/// Occurrences of the class's weekly slots between its start and end dates inclusive.
///
/// Falls back to the number of sessions already held when the class has no dates
/// or no schedule.
pub fn planned_sessions(graph: &ClassGraph) -> usize {
    let held = graph.sessions.len();
    let (Some(start), Some(end)) = (graph.class.start_date, graph.class.end_date) else {
        return held;
    };
    if graph.schedules.is_empty() || end < start {
        return held;
    }
    let mut planned = 0usize;
    let mut day = start;
    while day <= end {
        let wd = day.weekday();
        planned += graph.schedules.iter().filter(|s| s.weekday == wd).count();
        day += Duration::days(1);
    }
    planned.max(held)
}

pub fn session_progress(graph: &ClassGraph) -> f64 {
    calc::rate(graph.sessions.len(), planned_sessions(graph))
}

/// Share of the class's date span already elapsed at `today`.
pub fn elapsed_progress(class: &ClassRecord, today: NaiveDate) -> f64 {
    let (Some(start), Some(end)) = (class.start_date, class.end_date) else {
        return 0.0;
    };
    let span = (end - start).num_days();
    if span <= 0 {
        return if today >= end { 100.0 } else { 0.0 };
    }
    let elapsed = (today - start).num_days().clamp(0, span);
    calc::rate(elapsed as usize, span as usize)
}

pub fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}
