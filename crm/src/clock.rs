use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Source of "now" for timestamps, new pipeline ids and month windows.
#[derive(Clone, Copy, Debug)]
pub enum Clock {
    System { offset: FixedOffset },
    Fixed(DateTime<FixedOffset>),
}

impl Clock {
    pub fn utc() -> Self {
        Self::System {
            offset: FixedOffset::east_opt(0).expect("zero offset is valid"),
        }
    }

    /// Offsets outside ±24h fall back to UTC.
    pub fn system(offset_minutes: i32) -> Self {
        match offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
        {
            Some(offset) => Self::System { offset },
            None => Self::utc(),
        }
    }

    pub fn fixed(at: DateTime<FixedOffset>) -> Self {
        Self::Fixed(at)
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Clock::System { offset } => Utc::now().with_timezone(offset),
            Clock::Fixed(at) => *at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_day_follows_offset() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 20, 0, 0).unwrap();
        let kst = FixedOffset::east_opt(9 * 3600).unwrap();
        let clock = Clock::fixed(at.with_timezone(&kst));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
    }

    #[test]
    fn out_of_range_offset_is_utc() {
        let Clock::System { offset } = Clock::system(60 * 30) else {
            panic!("expected system clock");
        };
        assert_eq!(offset.local_minus_utc(), 0);
    }
}
