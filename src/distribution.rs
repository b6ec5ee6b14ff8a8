use crate::calc;
use serde::Serialize;

pub const FALLBACK_COLOR: &str = "#6B7280";

/// Which palette a distribution draws its labels and colors from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    StudentStatus,
    CourseLevel,
    HomeworkStatus,
}

struct PaletteEntry {
    key: &'static str,
    label: &'static str,
    color: &'static str,
}

const STUDENT_STATUS: &[PaletteEntry] = &[
    PaletteEntry { key: "active", label: "Đang học", color: "#10B981" },
    PaletteEntry { key: "graduated", label: "Đã tốt nghiệp", color: "#3B82F6" },
    PaletteEntry { key: "inactive", label: "Tạm nghỉ", color: "#F59E0B" },
    PaletteEntry { key: "suspended", label: "Bị đình chỉ", color: "#EF4444" },
];

const COURSE_LEVEL: &[PaletteEntry] = &[
    PaletteEntry { key: "A1", label: "A1", color: "#EF4444" },
    PaletteEntry { key: "A2", label: "A2", color: "#F59E0B" },
    PaletteEntry { key: "B1", label: "B1", color: "#10B981" },
    PaletteEntry { key: "B2", label: "B2", color: "#3B82F6" },
    PaletteEntry { key: "C1", label: "C1", color: "#8B5CF6" },
];

const HOMEWORK_STATUS: &[PaletteEntry] = &[
    PaletteEntry { key: "passed", label: "Đạt", color: "#10B981" },
    PaletteEntry { key: "pending", label: "Chờ chấm", color: "#F59E0B" },
    PaletteEntry { key: "failed", label: "Chưa đạt", color: "#EF4444" },
];

impl Category {
    fn entries(self) -> &'static [PaletteEntry] {
        match self {
            Category::StudentStatus => STUDENT_STATUS,
            Category::CourseLevel => COURSE_LEVEL,
            Category::HomeworkStatus => HOMEWORK_STATUS,
        }
    }

    /// Label and color for a bucket key; unknown keys keep their own text as label.
    pub fn style(self, key: &str) -> (String, &'static str) {
        match self.entries().iter().find(|e| e.key == key) {
            Some(e) => (e.label.to_string(), e.color),
            None => (key.to_string(), FALLBACK_COLOR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub key: String,
    pub label: String,
    pub count: usize,
    pub percentage: f64,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buckets {
    /// Only keys that occur in the input.
    Observed,
    /// Every palette key, in palette order, even at zero; unknown keys follow.
    Fixed,
}

/// Groups `items` by `key_fn` and attaches share of total plus palette styling.
///
/// Known keys come out in palette order, unknown keys in order of first appearance.
pub fn distribute<I, T, F>(items: I, category: Category, buckets: Buckets, key_fn: F) -> Vec<Bucket>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> String,
{
    let palette = category.entries();
    let mut known: Vec<usize> = vec![0; palette.len()];
    let mut unknown: Vec<(String, usize)> = Vec::new();
    let mut total: usize = 0;

    for item in items {
        let key = key_fn(&item);
        total += 1;
        if let Some(pos) = palette.iter().position(|e| e.key == key) {
            known[pos] += 1;
        } else if let Some(slot) = unknown.iter_mut().find(|(k, _)| *k == key) {
            slot.1 += 1;
        } else {
            unknown.push((key, 1));
        }
    }

    let mut out = Vec::new();
    for (entry, count) in palette.iter().zip(known) {
        if count == 0 && buckets == Buckets::Observed {
            continue;
        }
        out.push(Bucket {
            key: entry.key.to_string(),
            label: entry.label.to_string(),
            count,
            percentage: calc::rate(count, total),
            color: entry.color.to_string(),
        });
    }
    for (key, count) in unknown {
        let (label, color) = category.style(&key);
        out.push(Bucket {
            key,
            label,
            count,
            percentage: calc::rate(count, total),
            color: color.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_sum_to_hundred() {
        let statuses = ["active", "active", "graduated", "inactive", "active", "suspended", "active"];
        let out = distribute(statuses, Category::StudentStatus, Buckets::Observed, |s| s.to_string());
        let sum: f64 = out.iter().map(|b| b.percentage).sum();
        assert!((sum - 100.0).abs() < 0.05, "sum {}", sum);
        assert_eq!(out[0].key, "active");
        assert_eq!(out[0].count, 4);
        assert_eq!(out[0].color, "#10B981");
        assert_eq!(out[0].label, "Đang học");
    }

    #[test]
    fn unknown_keys_get_fallback_color() {
        let out = distribute(["active", "on_hold"], Category::StudentStatus, Buckets::Observed, |s| {
            s.to_string()
        });
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].key, "on_hold");
        assert_eq!(out[1].label, "on_hold");
        assert_eq!(out[1].color, FALLBACK_COLOR);
        assert_eq!(out[1].percentage, 50.0);
    }

    #[test]
    fn fixed_buckets_are_zero_when_empty() {
        let out = distribute(Vec::<&str>::new(), Category::HomeworkStatus, Buckets::Fixed, |s| {
            s.to_string()
        });
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|b| b.count == 0 && b.percentage == 0.0));
    }

    #[test]
    fn observed_buckets_skip_absent_keys() {
        let out = distribute(["B1", "B1", "C1"], Category::CourseLevel, Buckets::Observed, |s| {
            s.to_string()
        });
        let keys: Vec<&str> = out.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["B1", "C1"]);
        assert_eq!(out[0].percentage, 66.67);
        assert_eq!(out[1].color, "#8B5CF6");
    }
}
