// src/schedule/eval.rs

//! Pure schedule evaluation.
//!
//! Everything in this module is synchronous and deterministic: the tick task
//! feeds it wall-clock timestamps and it answers "should this rule fire in
//! this tick window". No Tokio, no IO, fully unit-testable.
//!
//! Timestamps are local wall-clock (`NaiveDateTime` from `chrono::Local`);
//! "same day" means same local calendar date. This keeps `daily|09:00`
//! firing once per calendar day across DST shifts.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use crate::schedule::rule::ScheduleRule;

/// The half-open evaluation window of one tick: `(prev, now]`.
///
/// A time-of-day trigger fires when its target instant falls inside the
/// window. Ticks may be arbitrarily late; a trigger due since the previous
/// tick still fires, but only once.
#[derive(Debug, Clone, Copy)]
pub struct TickWindow {
    pub prev: NaiveDateTime,
    pub now: NaiveDateTime,
}

/// Per-project fire bookkeeping.
///
/// `fired` is the last actual fire per project (persisted best-effort for
/// restart continuity of interval rules). `seen` anchors interval rules that
/// have never fired: the first fire happens one interval after the project
/// was first considered, never immediately.
#[derive(Debug, Default)]
pub struct FireTable {
    fired: HashMap<String, NaiveDateTime>,
    seen: HashMap<String, NaiveDateTime>,
}

impl FireTable {
    pub fn new(restored: HashMap<String, NaiveDateTime>) -> Self {
        Self {
            fired: restored,
            seen: HashMap::new(),
        }
    }

    /// Record that a project's rule was considered at `at`, if not already
    /// anchored.
    pub fn note_seen(&mut self, id: &str, at: NaiveDateTime) {
        self.seen.entry(id.to_string()).or_insert(at);
    }

    pub fn last_fired(&self, id: &str) -> Option<NaiveDateTime> {
        self.fired.get(id).copied()
    }

    /// The reference instant for an interval rule: last fire if any,
    /// otherwise when the project was first seen, otherwise `fallback`.
    pub fn interval_anchor(&self, id: &str, fallback: NaiveDateTime) -> NaiveDateTime {
        self.fired
            .get(id)
            .or_else(|| self.seen.get(id))
            .copied()
            .unwrap_or(fallback)
    }

    pub fn mark_fired(&mut self, id: &str, at: NaiveDateTime) {
        self.fired.insert(id.to_string(), at);
    }

    /// Drop records for projects that no longer exist.
    pub fn retain<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.fired.retain(|id, _| keep(id));
        self.seen.retain(|id, _| keep(id));
    }

    pub fn records(&self) -> &HashMap<String, NaiveDateTime> {
        &self.fired
    }
}

/// Decide whether `rule` is due for `id` within the tick window.
pub fn due(rule: &ScheduleRule, id: &str, table: &FireTable, window: &TickWindow) -> bool {
    match rule {
        ScheduleRule::Off => false,
        ScheduleRule::Daily { time } => {
            time_of_day_due(*time, None, table.last_fired(id), window)
        }
        ScheduleRule::Interval { every } => {
            let anchor = table.interval_anchor(id, window.prev);
            let elapsed = window.now.signed_duration_since(anchor);
            match chrono::Duration::from_std(*every) {
                Ok(every) => elapsed >= every,
                Err(_) => false,
            }
        }
        ScheduleRule::Weekdays { time, days } => {
            time_of_day_due(*time, Some(days), table.last_fired(id), window)
        }
    }
}

/// Shared logic for `Daily` and `Weekdays`.
///
/// Walks the calendar dates the window spans (normally one, two across
/// midnight) and fires if the target time for one of them falls inside
/// `(prev, now]` and that date has not fired yet.
fn time_of_day_due(
    time: NaiveTime,
    days: Option<&Vec<Weekday>>,
    last_fired: Option<NaiveDateTime>,
    window: &TickWindow,
) -> bool {
    let mut date = window.prev.date();
    let end = window.now.date();

    loop {
        let day_ok = days.is_none_or(|d| d.contains(&date.weekday()));
        if day_ok {
            let target = date.and_time(time);
            let in_window = target > window.prev && target <= window.now;
            let already_fired_today = last_fired.map(|l| l.date()) == Some(date);
            if in_window && !already_fired_today {
                return true;
            }
        }

        if date >= end {
            return false;
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn window(prev: NaiveDateTime, now: NaiveDateTime) -> TickWindow {
        TickWindow { prev, now }
    }

    #[test]
    fn interval_first_fire_is_one_interval_after_start() {
        let rule = ScheduleRule::Interval {
            every: Duration::from_secs(30 * 60),
        };
        let start = at(2025, 3, 10, 12, 0, 0);
        let mut table = FireTable::default();
        table.note_seen("p", start);

        // 10 minutes in: not due.
        let w = window(at(2025, 3, 10, 12, 9, 30), at(2025, 3, 10, 12, 10, 0));
        assert!(!due(&rule, "p", &table, &w));

        // 30 minutes in: due.
        let w = window(at(2025, 3, 10, 12, 29, 30), at(2025, 3, 10, 12, 30, 0));
        assert!(due(&rule, "p", &table, &w));
        table.mark_fired("p", w.now);

        // Ticks every 30s until the next interval: never due again early.
        let mut t = at(2025, 3, 10, 12, 30, 30);
        while t < at(2025, 3, 10, 12, 59, 30) {
            let prev = t - chrono::Duration::seconds(30);
            assert!(!due(&rule, "p", &table, &window(prev, t)), "fired early at {t}");
            t += chrono::Duration::seconds(30);
        }

        // One interval after the fire: due again.
        let w = window(at(2025, 3, 10, 12, 59, 40), at(2025, 3, 10, 13, 0, 10));
        assert!(due(&rule, "p", &table, &w));
    }

    #[test]
    fn daily_fires_once_per_calendar_day() {
        let rule = ScheduleRule::Daily {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let mut table = FireTable::default();

        // Two consecutive ticks both spanning/after 09:00.
        let w1 = window(at(2025, 3, 10, 8, 59, 40), at(2025, 3, 10, 9, 0, 10));
        assert!(due(&rule, "p", &table, &w1));
        table.mark_fired("p", w1.now);

        let w2 = window(at(2025, 3, 10, 9, 0, 10), at(2025, 3, 10, 9, 0, 40));
        assert!(!due(&rule, "p", &table, &w2));

        // Next calendar day fires again.
        let w3 = window(at(2025, 3, 11, 8, 59, 40), at(2025, 3, 11, 9, 0, 10));
        assert!(due(&rule, "p", &table, &w3));
    }

    #[test]
    fn daily_does_not_retro_fire_when_started_after_target() {
        let rule = ScheduleRule::Daily {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let table = FireTable::default();

        // Scheduler started 09:30; the window opens there.
        let w = window(at(2025, 3, 10, 9, 30, 0), at(2025, 3, 10, 9, 30, 30));
        assert!(!due(&rule, "p", &table, &w));
    }

    #[test]
    fn daily_catches_up_over_missed_ticks_exactly_once() {
        let rule = ScheduleRule::Daily {
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let mut table = FireTable::default();

        // Laptop slept from 08:50 to 11:23: the 09:00 trigger is caught up.
        let w = window(at(2025, 3, 10, 8, 50, 0), at(2025, 3, 10, 11, 23, 0));
        assert!(due(&rule, "p", &table, &w));
        table.mark_fired("p", w.now);

        // Follow-up tick does not double-fire.
        let w = window(at(2025, 3, 10, 11, 23, 0), at(2025, 3, 10, 11, 23, 30));
        assert!(!due(&rule, "p", &table, &w));
    }

    #[test]
    fn weekday_rule_respects_day_set() {
        // 2025-03-10 is a Monday.
        let rule: ScheduleRule = "weekdays|09:00|mon,fri".parse().unwrap();
        let table = FireTable::default();

        let monday = window(at(2025, 3, 10, 8, 59, 40), at(2025, 3, 10, 9, 0, 20));
        assert!(due(&rule, "p", &table, &monday));

        let tuesday = window(at(2025, 3, 11, 8, 59, 40), at(2025, 3, 11, 9, 0, 20));
        assert!(!due(&rule, "p", &table, &tuesday));
    }

    #[test]
    fn window_spanning_midnight_checks_both_dates() {
        let rule = ScheduleRule::Daily {
            time: NaiveTime::from_hms_opt(23, 59, 55).unwrap(),
        };
        let table = FireTable::default();

        let w = window(at(2025, 3, 10, 23, 59, 50), at(2025, 3, 11, 0, 0, 20));
        assert!(due(&rule, "p", &table, &w));
    }
}
