use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::habit::{Comparison, Habit, HabitLog, HabitType, LogStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum HabitStatus {
    Complete,
    Partial,
    Pending,
}

impl HabitStatus {
    pub fn glyph(self) -> &'static str {
        match self {
            HabitStatus::Complete => "✓",
            HabitStatus::Partial => "◐",
            HabitStatus::Pending => "○",
        }
    }
}

impl From<HabitStatus> for LogStatus {
    fn from(status: HabitStatus) -> Self {
        match status {
            HabitStatus::Complete => LogStatus::Done,
            HabitStatus::Partial => LogStatus::Partial,
            HabitStatus::Pending => LogStatus::None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HabitEvaluation {
    pub status: HabitStatus,
    /// Fraction of the day's goal reached, clamped to `0.0..=1.0`.
    pub progress: f64,
}

impl HabitEvaluation {
    fn pending() -> Self {
        Self {
            status: HabitStatus::Pending,
            progress: 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == HabitStatus::Complete
    }
}

/// Classify a habit for one day from its definition and that day's log, if any.
pub fn evaluate(habit: &Habit, log: Option<&HabitLog>) -> HabitEvaluation {
    let Some(log) = log else {
        return HabitEvaluation::pending();
    };
    match habit.habit_type {
        HabitType::Binary => evaluate_binary(log),
        HabitType::Count | HabitType::Duration => evaluate_measured(habit, log),
        HabitType::Checklist => evaluate_checklist(habit, log),
    }
}

fn evaluate_binary(log: &HabitLog) -> HabitEvaluation {
    if log.status == LogStatus::Done {
        HabitEvaluation {
            status: HabitStatus::Complete,
            progress: 1.0,
        }
    } else {
        HabitEvaluation::pending()
    }
}

fn evaluate_measured(habit: &Habit, log: &HabitLog) -> HabitEvaluation {
    let value = log.value.unwrap_or(0.0);
    let (comparison, target) = match habit.target {
        Some(target) => (habit.comparison, target),
        None => (Comparison::AnyValue, 0.0),
    };

    let status = if comparison.holds(value, target) {
        HabitStatus::Complete
    } else if value > 0.0 {
        HabitStatus::Partial
    } else {
        HabitStatus::Pending
    };

    let progress = match status {
        HabitStatus::Complete => 1.0,
        HabitStatus::Pending => 0.0,
        HabitStatus::Partial if target > 0.0 => (value / target).clamp(0.0, 1.0),
        HabitStatus::Partial => 0.0,
    };
    HabitEvaluation { status, progress }
}

fn evaluate_checklist(habit: &Habit, log: &HabitLog) -> HabitEvaluation {
    let total = habit.checklist.len();
    if total == 0 {
        return HabitEvaluation::pending();
    }
    let known: HashSet<&str> = habit.checklist.iter().map(|item| item.id.as_str()).collect();
    let done = log
        .completed_items
        .iter()
        .map(String::as_str)
        .filter(|id| known.contains(id))
        .collect::<HashSet<_>>()
        .len();

    let status = if done == total {
        HabitStatus::Complete
    } else if done > 0 {
        HabitStatus::Partial
    } else {
        HabitStatus::Pending
    };
    HabitEvaluation {
        status,
        progress: done as f64 / total as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn log_for(habit_id: &str) -> HabitLog {
        HabitLog::new(habit_id, NaiveDate::from_ymd_opt(2025, 11, 7).unwrap())
    }

    fn counted(target: f64, comparison: Comparison) -> Habit {
        Habit::new("Glasses of water", HabitType::Count).with_target(target, comparison)
    }

    fn with_value(value: f64) -> HabitLog {
        let mut log = log_for("h");
        log.value = Some(value);
        log
    }

    #[test]
    fn binary_needs_done_log() {
        let habit = Habit::new("Meditate", HabitType::Binary);
        assert_eq!(evaluate(&habit, None).status, HabitStatus::Pending);

        let mut log = log_for("h");
        assert_eq!(evaluate(&habit, Some(&log)).status, HabitStatus::Pending);

        log.status = LogStatus::Done;
        let eval = evaluate(&habit, Some(&log));
        assert!(eval.is_complete());
        assert_eq!(eval.progress, 1.0);
    }

    #[test]
    fn binary_partial_log_is_not_complete() {
        let habit = Habit::new("Meditate", HabitType::Binary);
        let mut log = log_for("h");
        log.status = LogStatus::Partial;
        assert_eq!(evaluate(&habit, Some(&log)).status, HabitStatus::Pending);
    }

    #[test]
    fn count_at_least_target() {
        let habit = counted(10.0, Comparison::AtLeast);
        assert_eq!(
            evaluate(&habit, Some(&with_value(10.0))).status,
            HabitStatus::Complete
        );
        let partial = evaluate(&habit, Some(&with_value(5.0)));
        assert_eq!(partial.status, HabitStatus::Partial);
        assert_eq!(partial.progress, 0.5);
        assert_eq!(
            evaluate(&habit, Some(&with_value(0.0))).status,
            HabitStatus::Pending
        );
        assert_eq!(evaluate(&habit, Some(&log_for("h"))).status, HabitStatus::Pending);
        assert_eq!(evaluate(&habit, None).status, HabitStatus::Pending);
    }

    #[test]
    fn greater_than_excludes_target() {
        let habit = counted(10.0, Comparison::GreaterThan);
        assert_eq!(
            evaluate(&habit, Some(&with_value(10.0))).status,
            HabitStatus::Partial
        );
        assert_eq!(
            evaluate(&habit, Some(&with_value(11.0))).status,
            HabitStatus::Complete
        );
    }

    #[test]
    fn less_than_and_exactly() {
        let limit = counted(3.0, Comparison::LessThan);
        assert!(evaluate(&limit, Some(&with_value(2.0))).is_complete());
        assert_eq!(
            evaluate(&limit, Some(&with_value(4.0))).status,
            HabitStatus::Partial
        );
        // Logging zero against an upper bound meets it.
        assert!(evaluate(&limit, Some(&with_value(0.0))).is_complete());

        let exact = counted(8.0, Comparison::Exactly);
        assert!(evaluate(&exact, Some(&with_value(8.0))).is_complete());
        assert_eq!(
            evaluate(&exact, Some(&with_value(9.0))).status,
            HabitStatus::Partial
        );
    }

    #[test]
    fn duration_without_target_accepts_any_value() {
        let habit = Habit::new("Read", HabitType::Duration);
        assert!(evaluate(&habit, Some(&with_value(0.5))).is_complete());
        assert_eq!(
            evaluate(&habit, Some(&with_value(0.0))).status,
            HabitStatus::Pending
        );
    }

    #[test]
    fn checklist_counts_known_items() {
        let habit = Habit::new("Morning routine", HabitType::Checklist)
            .with_checklist(["Bed", "Teeth", "Water"]);
        let mut log = log_for("h");
        assert_eq!(evaluate(&habit, Some(&log)).status, HabitStatus::Pending);

        log.completed_items = vec!["item-1".into(), "item-2".into()];
        assert_eq!(evaluate(&habit, Some(&log)).status, HabitStatus::Partial);

        log.completed_items.push("item-3".into());
        assert!(evaluate(&habit, Some(&log)).is_complete());
    }

    #[test]
    fn checklist_ignores_stale_and_duplicate_ids() {
        let habit = Habit::new("Routine", HabitType::Checklist).with_checklist(["A", "B"]);
        let mut log = log_for("h");
        log.completed_items = vec!["item-1".into(), "item-1".into(), "removed".into()];
        let eval = evaluate(&habit, Some(&log));
        assert_eq!(eval.status, HabitStatus::Partial);
        assert_eq!(eval.progress, 0.5);
    }

    #[test]
    fn empty_checklist_stays_pending() {
        let habit = Habit::new("Routine", HabitType::Checklist);
        assert_eq!(
            evaluate(&habit, Some(&log_for("h"))).status,
            HabitStatus::Pending
        );
    }
}
