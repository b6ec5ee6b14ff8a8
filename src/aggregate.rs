//! Pass, attendance and homework rates over a set of class graphs.
//!
//! Pass-rate denominator: enrollments whose first score has both skills of the
//! level's pair graded. Ungraded enrollments and classes with an unrecognised
//! course level are left out of numerator and denominator alike.

use crate::calc;
use crate::model::{ClassGraph, HomeworkStatus, Session, Skill};
use crate::windows::TimeWindow;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub hits: usize,
    pub total: usize,
}

impl Tally {
    pub fn rate(&self) -> f64 {
        calc::rate(self.hits, self.total)
    }

    fn add(&mut self, hit: bool) {
        self.total += 1;
        if hit {
            self.hits += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Passed,
    Failed,
    Ungraded,
    UnknownLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRates {
    pub rate_passed: f64,
    pub rate_attendanced: f64,
    pub rate_passed_homework: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillAverage {
    pub skill: Skill,
    pub average: f64,
    pub graded: usize,
}

/// Attendance of one student across every class in scope.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentAttendance {
    pub student_id: String,
    pub tally: Tally,
    /// Class where the student missed the most sessions; first seen on ties.
    pub class_id: String,
}

impl StudentAttendance {
    pub fn absence_rate(&self) -> f64 {
        calc::round_to(100.0 - self.tally.rate(), 2)
    }
}

/// Filter applied to per-student rows; `None` means every student in scope.
pub type StudentFilter<'s> = Option<&'s str>;

fn student_matches(filter: StudentFilter<'_>, student_id: &str) -> bool {
    filter.map_or(true, |s| s == student_id)
}

fn session_in(window: Option<&TimeWindow>, session: &Session) -> bool {
    window.map_or(true, |w| w.contains(session.created_at))
}

pub struct PerformanceAggregator<'a> {
    classes: &'a [ClassGraph],
}

impl<'a> PerformanceAggregator<'a> {
    pub fn new(classes: &'a [ClassGraph]) -> Self {
        Self { classes }
    }

    /// Outcome of every enrollment in scope, in class then enrollment order.
    pub fn pass_outcomes(&self, student: StudentFilter<'_>) -> Vec<PassOutcome> {
        let mut out = Vec::new();
        for graph in self.classes {
            let threshold = graph.class.level.map(calc::threshold_for);
            for e in &graph.enrollments {
                if !student_matches(student, &e.enrollment.student_id) {
                    continue;
                }
                let outcome = match (threshold, e.scores.first()) {
                    (None, _) => PassOutcome::UnknownLevel,
                    (Some(_), None) => PassOutcome::Ungraded,
                    (Some(t), Some(score)) => match t.passes(score) {
                        Some(true) => PassOutcome::Passed,
                        Some(false) => PassOutcome::Failed,
                        None => PassOutcome::Ungraded,
                    },
                };
                out.push(outcome);
            }
        }
        out
    }

    pub fn pass_tally(&self, student: StudentFilter<'_>) -> Tally {
        let mut tally = Tally::default();
        for outcome in self.pass_outcomes(student) {
            match outcome {
                PassOutcome::Passed => tally.add(true),
                PassOutcome::Failed => tally.add(false),
                PassOutcome::Ungraded | PassOutcome::UnknownLevel => {}
            }
        }
        tally
    }

    pub fn attendance_tally(
        &self,
        student: StudentFilter<'_>,
        window: Option<&TimeWindow>,
    ) -> Tally {
        let mut tally = Tally::default();
        for graph in self.classes {
            for s in graph.sessions.iter().filter(|s| session_in(window, &s.session)) {
                for a in &s.attendances {
                    if student_matches(student, &a.student_id) {
                        tally.add(a.present);
                    }
                }
            }
        }
        tally
    }

    /// Passed homework over all homework rows, graded or not.
    pub fn homework_tally(
        &self,
        student: StudentFilter<'_>,
        window: Option<&TimeWindow>,
    ) -> Tally {
        let mut tally = Tally::default();
        for graph in self.classes {
            for s in graph.sessions.iter().filter(|s| session_in(window, &s.session)) {
                for h in &s.homeworks {
                    if student_matches(student, &h.student_id) {
                        tally.add(h.status == HomeworkStatus::Passed);
                    }
                }
            }
        }
        tally
    }

    pub fn homework_count(
        &self,
        status: HomeworkStatus,
        student: StudentFilter<'_>,
        window: Option<&TimeWindow>,
    ) -> usize {
        self.classes
            .iter()
            .flat_map(|g| g.sessions.iter())
            .filter(|s| session_in(window, &s.session))
            .flat_map(|s| s.homeworks.iter())
            .filter(|h| h.status == status && student_matches(student, &h.student_id))
            .count()
    }

    pub fn rates(&self, student: StudentFilter<'_>) -> PerformanceRates {
        PerformanceRates {
            rate_passed: self.pass_tally(student).rate(),
            rate_attendanced: self.attendance_tally(student, None).rate(),
            rate_passed_homework: self.homework_tally(student, None).rate(),
        }
    }

    pub fn session_count(&self, window: Option<&TimeWindow>) -> usize {
        self.classes
            .iter()
            .flat_map(|g| g.sessions.iter())
            .filter(|s| session_in(window, &s.session))
            .count()
    }

    /// Mean of the level's skill-pair sum over scored enrollments.
    pub fn average_pair_score(&self) -> Option<f64> {
        let sums = self.classes.iter().flat_map(|g| {
            let threshold = g.class.level.map(calc::threshold_for);
            g.enrollments.iter().filter_map(move |e| {
                let t = threshold?;
                t.pair.sum(e.scores.first()?)
            })
        });
        calc::mean(sums).map(|m| calc::round_to(m, 2))
    }

    /// Per-skill mean over graded enrollment scores; skills never graded report 0.
    pub fn skill_averages(&self, student: StudentFilter<'_>) -> Vec<SkillAverage> {
        Skill::ALL
            .iter()
            .map(|&skill| {
                let values: Vec<f64> = self
                    .classes
                    .iter()
                    .flat_map(|g| g.enrollments.iter())
                    .filter(|e| student_matches(student, &e.enrollment.student_id))
                    .filter_map(|e| e.scores.first()?.skill(skill))
                    .collect();
                SkillAverage {
                    skill,
                    average: calc::mean(values.iter().copied())
                        .map(|m| calc::round_to(m, 2))
                        .unwrap_or(0.0),
                    graded: values.len(),
                }
            })
            .collect()
    }

    /// Mean of every graded skill value on exams starting inside `window`.
    pub fn exam_score_mean(&self, student: StudentFilter<'_>, window: &TimeWindow) -> Option<f64> {
        let values = self
            .classes
            .iter()
            .flat_map(|g| g.exams.iter())
            .filter(|x| window.contains(x.exam.start_time))
            .flat_map(|x| x.scores.iter())
            .filter(|s| student_matches(student, &s.student_id))
            .flat_map(|s| Skill::ALL.iter().filter_map(move |&k| s.score.skill(k)));
        calc::mean(values).map(|m| calc::round_to(m, 2))
    }

    /// One row per student with at least one attendance record, in first-seen order.
    pub fn attendance_by_student(&self) -> Vec<StudentAttendance> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<(StudentAttendance, Vec<(&str, usize)>)> = Vec::new();
        for graph in self.classes {
            let class_id = graph.class.id.as_str();
            for a in graph.sessions.iter().flat_map(|s| s.attendances.iter()) {
                let pos = *index.entry(a.student_id.as_str()).or_insert_with(|| {
                    rows.push((
                        StudentAttendance {
                            student_id: a.student_id.clone(),
                            tally: Tally::default(),
                            class_id: class_id.to_string(),
                        },
                        Vec::new(),
                    ));
                    rows.len() - 1
                });
                let (row, missed) = &mut rows[pos];
                row.tally.add(a.present);
                if a.present {
                    continue;
                }
                match missed.iter_mut().find(|(c, _)| *c == class_id) {
                    Some((_, n)) => *n += 1,
                    None => missed.push((class_id, 1)),
                }
            }
        }
        rows.into_iter()
            .map(|(mut row, missed)| {
                if let Some((worst, _)) = calc::top_n(missed, 1, |(_, n)| *n).into_iter().next() {
                    row.class_id = worst.to_string();
                }
                row
            })
            .collect()
    }

    /// Students whose absence rate is strictly above `threshold`, worst first.
    pub fn absentees(&self, threshold: f64, limit: usize) -> Vec<StudentAttendance> {
        let flagged: Vec<StudentAttendance> = self
            .attendance_by_student()
            .into_iter()
            .filter(|r| r.tally.total > 0 && r.absence_rate() > threshold)
            .collect();
        calc::top_n(flagged, limit, |r| r.absence_rate())
    }
}
