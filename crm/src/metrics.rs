//! Month-bucketed KPIs derived from the action history.
//!
//! Every function here is a pure fold over the full history; nothing is
//! cached between calls.

use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::history::HistoryEntry;

/// How far back a Lead/Negotiation entry may precede a win and still count
/// toward the booking rate.
pub const BOOKING_LOOKBACK_DAYS: i64 = 14;

/// A calendar month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthWindow {
    first: NaiveDate,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).expect("day 1 exists in every month"),
        }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn start(&self) -> NaiveDate {
        self.first
    }

    /// Last day of the month, inclusive.
    pub fn end(&self) -> NaiveDate {
        match self.shift(1).and_then(|next| next.start().pred_opt()) {
            Some(last) => last,
            // December of the last representable year
            None => self.first.with_day(31).unwrap_or(self.first),
        }
    }

    /// Moves `months` calendar months forward (negative moves back).
    /// `None` past the edges of the calendar.
    pub fn shift(&self, months: i32) -> Option<Self> {
        let index = self
            .year()
            .checked_mul(12)?
            .checked_add(self.month0())?
            .checked_add(months)?;
        let year = index.div_euclid(12);
        let month = index.rem_euclid(12) as u32 + 1;
        Self::new(year, month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year(), self.month())
    }

    /// `count` consecutive months, oldest first, ending at `anchor` when
    /// `include_anchor` is set and at the month before it otherwise. The
    /// series is cut short at the start of the calendar.
    pub fn trailing(anchor: MonthWindow, count: usize, include_anchor: bool) -> Vec<MonthWindow> {
        let last = if include_anchor {
            Some(anchor)
        } else {
            anchor.shift(-1)
        };
        let Some(last) = last else {
            return Vec::new();
        };
        let count = i32::try_from(count).unwrap_or(i32::MAX);
        let mut windows: Vec<_> = (0..count).map_while(|back| last.shift(-back)).collect();
        windows.reverse();
        windows
    }

    fn month0(&self) -> i32 {
        self.first.month0() as i32
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAggregate {
    pub period: String,
    pub contacts: u32,
    pub meetings: u32,
    pub negotiations: u32,
    pub closed_won: u32,
    pub budget_sum: i64,
    pub won_budget: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RatePoint {
    pub period: String,
    pub rate: f64,
}

fn in_window(
    history: &[HistoryEntry],
    window: MonthWindow,
) -> impl Iterator<Item = &HistoryEntry> + '_ {
    history
        .iter()
        .filter(move |entry| entry.date.is_some_and(|date| window.contains(date)))
}

pub fn monthly_aggregate(history: &[HistoryEntry], window: MonthWindow) -> MonthlyAggregate {
    let mut aggregate = MonthlyAggregate {
        period: window.label(),
        ..MonthlyAggregate::default()
    };
    for entry in in_window(history, window) {
        if entry.is_contact() {
            aggregate.contacts += 1;
        }
        if entry.is_meeting() {
            aggregate.meetings += 1;
        }
        if entry.is_negotiation() {
            aggregate.negotiations += 1;
        }
        if entry.is_closed_won() {
            aggregate.closed_won += 1;
            aggregate.won_budget = aggregate.won_budget.saturating_add(entry.budget);
        }
        aggregate.budget_sum = aggregate.budget_sum.saturating_add(entry.budget);
    }
    aggregate
}

pub fn trailing_series(
    history: &[HistoryEntry],
    anchor: MonthWindow,
    count: usize,
    include_anchor: bool,
) -> Vec<MonthlyAggregate> {
    MonthWindow::trailing(anchor, count, include_anchor)
        .into_iter()
        .map(|window| monthly_aggregate(history, window))
        .collect()
}

/// Share of contact events whose pipeline went on to a meeting within the
/// same month.
///
/// The denominator is the number of Email/Cold Call entries, not the number
/// of contacted pipelines, so several calls to one client dilute the rate.
pub fn meeting_conversion_rate(history: &[HistoryEntry], window: MonthWindow) -> f64 {
    let mut groups: HashMap<&str, Vec<&HistoryEntry>> = HashMap::new();
    let mut contacts = 0usize;
    for entry in in_window(history, window) {
        if entry.is_contact() {
            contacts += 1;
        }
        groups
            .entry(entry.pipeline_id.as_str())
            .or_default()
            .push(entry);
    }

    let converted = groups
        .into_values()
        .filter(|group| converted_to_meeting(group))
        .count();

    percentage(converted, contacts)
}

fn converted_to_meeting(group: &[&HistoryEntry]) -> bool {
    let mut ordered = group.to_vec();
    // same-day entries keep the order they were recorded in
    ordered.sort_by_key(|entry| (entry.date, entry.action_id));
    match ordered.iter().position(|entry| entry.is_meeting()) {
        Some(index) if index > 0 => ordered[..index].iter().any(|entry| entry.is_contact()),
        _ => false,
    }
}

/// Share of in-month negotiation entries that correspond to a win booked
/// within two weeks of a Lead/Negotiation step on the same pipeline.
pub fn booking_rate(history: &[HistoryEntry], window: MonthWindow) -> f64 {
    let mut negotiation_dates: HashMap<&str, Vec<NaiveDate>> = HashMap::new();
    for entry in history.iter().filter(|entry| entry.is_negotiation()) {
        if let Some(date) = entry.date {
            negotiation_dates
                .entry(entry.pipeline_id.as_str())
                .or_default()
                .push(date);
        }
    }

    let mut qualified = 0usize;
    let mut negotiations = 0usize;
    for entry in in_window(history, window) {
        if entry.is_negotiation() {
            negotiations += 1;
        }
        if !entry.is_closed_won() {
            continue;
        }
        let Some(won) = entry.date else { continue };
        let from = won - Duration::days(BOOKING_LOOKBACK_DAYS);
        let booked = negotiation_dates
            .get(entry.pipeline_id.as_str())
            .is_some_and(|dates| dates.iter().any(|date| *date >= from && *date < won));
        if booked {
            qualified += 1;
        }
    }

    percentage(qualified, negotiations)
}

pub fn meeting_conversion_series(
    history: &[HistoryEntry],
    anchor: MonthWindow,
    count: usize,
) -> Vec<RatePoint> {
    rate_series(history, anchor, count, meeting_conversion_rate)
}

pub fn booking_rate_series(
    history: &[HistoryEntry],
    anchor: MonthWindow,
    count: usize,
) -> Vec<RatePoint> {
    rate_series(history, anchor, count, booking_rate)
}

fn rate_series(
    history: &[HistoryEntry],
    anchor: MonthWindow,
    count: usize,
    rate: fn(&[HistoryEntry], MonthWindow) -> f64,
) -> Vec<RatePoint> {
    MonthWindow::trailing(anchor, count, true)
        .into_iter()
        .map(|window| RatePoint {
            period: window.label(),
            rate: rate(history, window),
        })
        .collect()
}

fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_one_decimal(numerator as f64 / denominator as f64 * 100.0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ActionLabel, StageLabel};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(
        pipeline: &str,
        on: NaiveDate,
        action: ActionLabel,
        stage: Option<StageLabel>,
        budget: i64,
    ) -> HistoryEntry {
        HistoryEntry {
            pipeline_id: pipeline.into(),
            action_id: 0,
            date: Some(on),
            action,
            stage,
            budget,
            memo: String::new(),
        }
    }

    fn january() -> Vec<HistoryEntry> {
        vec![
            entry("X", date(2025, 1, 5), ActionLabel::ColdCall, Some(StageLabel::Contact), 0),
            entry("X", date(2025, 1, 12), ActionLabel::Meeting, Some(StageLabel::Lead), 0),
        ]
    }

    #[test]
    fn month_window_bounds_and_shift() {
        let feb = MonthWindow::new(2024, 2).unwrap();
        assert_eq!(feb.end(), date(2024, 2, 29));
        assert!(feb.contains(date(2024, 2, 1)));
        assert!(!feb.contains(date(2024, 3, 1)));
        assert_eq!(feb.shift(-2).unwrap().label(), "2023-12");
        assert_eq!(feb.shift(11).unwrap().label(), "2025-01");
        assert_eq!(MonthWindow::containing(date(2025, 12, 31)).to_string(), "2025-12");
    }

    #[test]
    fn trailing_windows_roll_across_years() {
        let anchor = MonthWindow::new(2025, 2).unwrap();
        let labels: Vec<_> = MonthWindow::trailing(anchor, 3, false)
            .iter()
            .map(MonthWindow::label)
            .collect();
        assert_eq!(labels, ["2024-11", "2024-12", "2025-01"]);

        let labels: Vec<_> = MonthWindow::trailing(anchor, 3, true)
            .iter()
            .map(MonthWindow::label)
            .collect();
        assert_eq!(labels, ["2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn january_scenario() {
        let history = january();
        let window = MonthWindow::new(2025, 1).unwrap();
        let aggregate = monthly_aggregate(&history, window);
        assert_eq!(aggregate.contacts, 1);
        assert_eq!(aggregate.meetings, 1);
        assert_eq!(aggregate.negotiations, 1);
        assert_eq!(aggregate.closed_won, 0);
        assert_eq!(meeting_conversion_rate(&history, window), 100.0);
    }

    #[test]
    fn aggregate_counters_overlap_and_ignore_order() {
        let mut history = vec![
            entry("A", date(2025, 3, 3), ActionLabel::Meeting, Some(StageLabel::ClosedWon), 500),
            entry("A", date(2025, 3, 1), ActionLabel::Email, Some(StageLabel::Negotiation), 200),
            entry("B", date(2025, 3, 9), ActionLabel::ColdCall, None, 0),
            entry("B", date(2025, 4, 1), ActionLabel::Email, None, 900),
        ];
        let window = MonthWindow::new(2025, 3).unwrap();
        let forward = monthly_aggregate(&history, window);
        history.reverse();
        let backward = monthly_aggregate(&history, window);

        assert_eq!(forward, backward);
        assert_eq!(forward.contacts, 2);
        assert_eq!(forward.meetings, 1);
        assert_eq!(forward.negotiations, 1);
        assert_eq!(forward.closed_won, 1);
        assert_eq!(forward.budget_sum, 700);
        assert_eq!(forward.won_budget, 500);
        assert!(forward.budget_sum >= forward.won_budget);
    }

    #[test]
    fn undated_entries_are_ignored() {
        let mut orphan = entry("A", date(2025, 1, 1), ActionLabel::Email, None, 10);
        orphan.date = None;
        let aggregate = monthly_aggregate(&[orphan], MonthWindow::new(2025, 1).unwrap());
        assert_eq!(aggregate.contacts, 0);
        assert_eq!(aggregate.budget_sum, 0);
    }

    #[test]
    fn conversion_needs_a_prior_contact() {
        let window = MonthWindow::new(2025, 1).unwrap();
        let meeting_first = vec![
            entry("X", date(2025, 1, 2), ActionLabel::Meeting, None, 0),
            entry("X", date(2025, 1, 9), ActionLabel::Email, None, 0),
        ];
        assert_eq!(meeting_conversion_rate(&meeting_first, window), 0.0);
        assert_eq!(meeting_conversion_rate(&[], window), 0.0);
    }

    #[test]
    fn shift_stops_at_the_calendar_edge() {
        let jan = MonthWindow::new(2025, 1).unwrap();
        assert_eq!(jan.shift(i32::MIN), None);
        assert_eq!(jan.shift(i32::MAX), None);

        let first = MonthWindow::containing(NaiveDate::MIN);
        assert_eq!(first.shift(-1), None);
        assert!(MonthWindow::trailing(first, 3, false).is_empty());
        assert_eq!(MonthWindow::trailing(first, 3, true), [first]);
        assert_eq!(MonthWindow::containing(NaiveDate::MAX).end(), NaiveDate::MAX);
    }

    #[test]
    fn huge_budgets_saturate_instead_of_overflowing() {
        let won = entry(
            "X",
            date(2025, 1, 10),
            ActionLabel::Meeting,
            Some(StageLabel::ClosedWon),
            i64::MAX,
        );
        let aggregate =
            monthly_aggregate(&[won.clone(), won], MonthWindow::new(2025, 1).unwrap());
        assert_eq!(aggregate.closed_won, 2);
        assert_eq!(aggregate.won_budget, i64::MAX);
        assert_eq!(aggregate.budget_sum, i64::MAX);
        assert!(aggregate.budget_sum >= aggregate.won_budget);
    }

    #[test]
    fn meetings_without_in_month_contacts_convert_nothing() {
        let window = MonthWindow::new(2025, 2).unwrap();
        let history = vec![
            entry("X", date(2025, 1, 28), ActionLabel::Email, None, 0),
            entry("X", date(2025, 2, 3), ActionLabel::Meeting, Some(StageLabel::Lead), 0),
            entry("Y", date(2025, 2, 11), ActionLabel::Meeting, None, 0),
        ];
        assert_eq!(meeting_conversion_rate(&history, window), 0.0);
        assert_eq!(monthly_aggregate(&history, window).meetings, 2);
    }

    #[test]
    fn same_day_contact_then_meeting_converts() {
        let window = MonthWindow::new(2025, 1).unwrap();
        let mut email = entry("X", date(2025, 1, 5), ActionLabel::Email, None, 0);
        email.action_id = 10;
        let mut meeting = entry("X", date(2025, 1, 5), ActionLabel::Meeting, None, 0);
        meeting.action_id = 11;
        // newest first, the way the store lists actions
        let history = vec![meeting, email];
        assert_eq!(meeting_conversion_rate(&history, window), 100.0);
    }

    #[test]
    fn conversion_denominator_counts_contact_events() {
        let window = MonthWindow::new(2025, 1).unwrap();
        let history = vec![
            entry("X", date(2025, 1, 2), ActionLabel::Email, None, 0),
            entry("X", date(2025, 1, 3), ActionLabel::ColdCall, None, 0),
            entry("X", date(2025, 1, 4), ActionLabel::Meeting, None, 0),
        ];
        assert_eq!(meeting_conversion_rate(&history, window), 50.0);

        let history = vec![
            entry("X", date(2025, 1, 2), ActionLabel::Email, None, 0),
            entry("X", date(2025, 1, 4), ActionLabel::Meeting, None, 0),
            entry("Y", date(2025, 1, 5), ActionLabel::Email, None, 0),
            entry("Z", date(2025, 1, 6), ActionLabel::Email, None, 0),
        ];
        assert_eq!(meeting_conversion_rate(&history, window), 33.3);
    }

    #[test]
    fn booking_window_is_half_open() {
        let window = MonthWindow::new(2025, 2).unwrap();
        let won = date(2025, 2, 15);
        let exactly_two_weeks = vec![
            entry("X", date(2025, 2, 1), ActionLabel::Meeting, Some(StageLabel::Negotiation), 0),
            entry("X", won, ActionLabel::Meeting, Some(StageLabel::ClosedWon), 100),
        ];
        assert_eq!(booking_rate(&exactly_two_weeks, window), 100.0);

        let same_day = vec![
            entry("X", won, ActionLabel::Meeting, Some(StageLabel::Lead), 0),
            entry("X", won, ActionLabel::Meeting, Some(StageLabel::ClosedWon), 100),
        ];
        assert_eq!(booking_rate(&same_day, window), 0.0);

        let too_early = vec![
            entry("X", date(2025, 1, 31), ActionLabel::Email, Some(StageLabel::Lead), 0),
            entry("X", date(2025, 2, 9), ActionLabel::Email, Some(StageLabel::Contact), 0),
            entry("X", won, ActionLabel::Meeting, Some(StageLabel::ClosedWon), 100),
        ];
        assert_eq!(booking_rate(&too_early, window), 0.0);
    }

    #[test]
    fn booking_looks_back_across_month_boundary() {
        let window = MonthWindow::new(2025, 2).unwrap();
        let history = vec![
            entry("X", date(2025, 1, 28), ActionLabel::Email, Some(StageLabel::Lead), 0),
            entry("X", date(2025, 2, 3), ActionLabel::Meeting, Some(StageLabel::ClosedWon), 100),
            entry("Y", date(2025, 2, 10), ActionLabel::Email, Some(StageLabel::Negotiation), 0),
        ];
        // one qualified win over one in-window negotiation entry
        assert_eq!(booking_rate(&history, window), 100.0);
        assert_eq!(booking_rate(&history[..2], window), 0.0);
    }

    #[test]
    fn rate_series_end_at_anchor() {
        let anchor = MonthWindow::new(2025, 2).unwrap();
        let series = meeting_conversion_series(&january(), anchor, 3);
        let points: Vec<_> = series.iter().map(|p| (p.period.as_str(), p.rate)).collect();
        assert_eq!(points, [("2024-12", 0.0), ("2025-01", 100.0), ("2025-02", 0.0)]);
        assert_eq!(booking_rate_series(&january(), anchor, 2).len(), 2);
    }
}
