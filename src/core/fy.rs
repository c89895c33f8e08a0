use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Financial year running 1 March to the end of February.
/// The value is the calendar year in which the period ends
/// (e.g. 2025 = 1 March 2024 to 28 February 2025).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FinancialYear(pub i32);

impl FinancialYear {
    pub fn from_date(date: NaiveDate) -> Self {
        // March or later belongs to the year ending next February
        if date.month() >= 3 {
            FinancialYear(date.year() + 1)
        } else {
            FinancialYear(date.year())
        }
    }

    /// 1 March of the previous calendar year
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 - 1, 3, 1).expect("1 March is always valid")
    }

    /// Last day of February (29th in leap years)
    pub fn end_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 3, 1)
            .and_then(|d| d.pred_opt())
            .expect("end of February is always valid")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        FinancialYear::from_date(date) == *self
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FY{}", self.0)
    }
}
