//! Public holiday calendars for the supported regions.

use chrono::{Datelike, NaiveDate, Weekday};

use super::Region;

/// Easter Sunday for a Gregorian year (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

impl Region {
    /// Weekly rest day that prices treat like a holiday.
    pub fn rest_day(&self) -> Weekday {
        Weekday::Sun
    }

    /// National public holidays.
    pub fn is_public_holiday(&self, date: NaiveDate) -> bool {
        let (month, day) = (date.month(), date.day());
        let fixed = match self {
            Region::DE => matches!(
                (month, day),
                (1, 1)     // New Year's Day
                | (5, 1)   // Labour Day
                | (10, 3)  // German Unity Day
                | (12, 25)
                | (12, 26)
            ),
            Region::AT => matches!(
                (month, day),
                (1, 1)
                | (1, 6)   // Epiphany
                | (5, 1)
                | (8, 15)  // Assumption
                | (10, 26) // National Day
                | (11, 1)  // All Saints
                | (12, 8)  // Immaculate Conception
                | (12, 25)
                | (12, 26)
            ),
        };
        if fixed {
            return true;
        }

        let Some(easter) = easter_sunday(date.year()) else {
            return false;
        };
        let offset = date.signed_duration_since(easter).num_days();
        match self {
            // Good Friday, Easter Monday, Ascension, Whit Monday
            Region::DE => matches!(offset, -2 | 1 | 39 | 50),
            // Easter Monday, Ascension, Whit Monday, Corpus Christi
            Region::AT => matches!(offset, 1 | 39 | 50 | 60),
        }
    }

    /// Holiday flag used as a feature: public holiday or weekly rest day.
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        date.weekday() == self.rest_day() || self.is_public_holiday(date)
    }
}
