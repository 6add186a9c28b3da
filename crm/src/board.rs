use chrono::NaiveDate;
use serde::Serialize;

use crate::history::HistoryEntry;
use crate::metrics::{
    MonthWindow, MonthlyAggregate, RatePoint, booking_rate_series, meeting_conversion_series,
    monthly_aggregate, trailing_series,
};

pub const DEFAULT_BOARD_MONTHS: usize = 3;
/// Ten years of monthly points.
pub const MAX_BOARD_MONTHS: usize = 120;

/// Everything the analytics board shows for one reference day.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub period: String,
    /// KPI cards for the month containing the reference day.
    pub current: MonthlyAggregate,
    /// Completed months before the current one, oldest first.
    pub trend: Vec<MonthlyAggregate>,
    pub meeting_conversion: Vec<RatePoint>,
    pub booking_rate: Vec<RatePoint>,
    pub current_meeting_conversion: f64,
    pub current_booking_rate: f64,
}

impl Board {
    pub fn compute(history: &[HistoryEntry], today: NaiveDate, months: usize) -> Self {
        let months = months.clamp(1, MAX_BOARD_MONTHS);
        let anchor = MonthWindow::containing(today);
        let meeting_conversion = meeting_conversion_series(history, anchor, months);
        let booking_rate = booking_rate_series(history, anchor, months);

        Self {
            period: anchor.label(),
            current: monthly_aggregate(history, anchor),
            trend: trailing_series(history, anchor, months, false),
            current_meeting_conversion: last_rate(&meeting_conversion),
            current_booking_rate: last_rate(&booking_rate),
            meeting_conversion,
            booking_rate,
        }
    }
}

fn last_rate(series: &[RatePoint]) -> f64 {
    series.last().map_or(0.0, |point| point.rate)
}
