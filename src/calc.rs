use crate::model::{CourseLevel, Score, Skill};
use serde::Serialize;
use std::cmp::Ordering;

/// The two skills whose sum decides pass/fail for a course level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkillPair {
    ReadingListening,
    SpeakingWriting,
}

impl SkillPair {
    pub fn skills(self) -> [Skill; 2] {
        match self {
            SkillPair::ReadingListening => [Skill::Reading, Skill::Listening],
            SkillPair::SpeakingWriting => [Skill::Speaking, Skill::Writing],
        }
    }

    /// `None` unless both skills of the pair are graded.
    pub fn sum(self, score: &Score) -> Option<f64> {
        let [a, b] = self.skills();
        Some(score.skill(a)? + score.skill(b)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassThreshold {
    pub pair: SkillPair,
    pub pass_score: f64,
}

impl PassThreshold {
    pub fn passes(&self, score: &Score) -> Option<bool> {
        self.pair.sum(score).map(|total| total >= self.pass_score)
    }
}

pub fn threshold_for(level: CourseLevel) -> PassThreshold {
    let (pair, pass_score) = match level {
        CourseLevel::A1 => (SkillPair::ReadingListening, 150.0),
        CourseLevel::A2 => (SkillPair::ReadingListening, 350.0),
        CourseLevel::B1 => (SkillPair::ReadingListening, 500.0),
        CourseLevel::B2 => (SkillPair::ReadingListening, 750.0),
        CourseLevel::C1 => (SkillPair::SpeakingWriting, 250.0),
    };
    PassThreshold { pair, pass_score }
}

pub fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

/// Percentage of `numerator` over `denominator`, 2 decimals; 0 for an empty denominator.
pub fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let pct = 100.0 * (numerator.min(denominator) as f64) / (denominator as f64);
    round_to(pct, 2)
}

pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut n: usize = 0;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(sum / (n as f64))
    }
}

/// First `n` items ordered by `key` descending. Equal keys keep their input order.
pub fn top_n<T, K, F>(mut items: Vec<T>, n: usize, key: F) -> Vec<T>
where
    K: PartialOrd,
    F: Fn(&T) -> K,
{
    items.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    items.truncate(n);
    items
}
