//! Session date format.
//!
//! A format is a pattern such as `MM/DD/YY` or `DD.MM.YYYY`, or one of the
//! dBASE named formats (`AMERICAN`, `ANSI`, `BRITISH`, ...). It is used to
//! read date strings supplied to seek.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Part {
    Day,
    Month,
    Year,
}

/// A parsed date format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFormat {
    code: String,
    order: [Part; 3],
}

impl Default for DateFormat {
    fn default() -> Self {
        Self {
            code: "MM/DD/YY".to_string(),
            order: [Part::Month, Part::Day, Part::Year],
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl FromStr for DateFormat {
    type Err = CoreError;

    fn from_str(code: &str) -> CoreResult<Self> {
        let code = code.trim().to_ascii_uppercase();
        let pattern = match code.as_str() {
            "AMERICAN" => "MM/DD/YY",
            "ANSI" => "YY.MM.DD",
            "BRITISH" | "FRENCH" => "DD/MM/YY",
            "GERMAN" => "DD.MM.YY",
            "ITALIAN" => "DD-MM-YY",
            "JAPAN" => "YY/MM/DD",
            "USA" => "MM-DD-YY",
            other => other,
        };
        let bad = || CoreError::invalid_argument(format!("unrecognized date format '{code}'"));
        let parts: Vec<&str> = pattern
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 3 {
            return Err(bad());
        }
        let mut order = [Part::Day; 3];
        for (slot, part) in order.iter_mut().zip(&parts) {
            *slot = match *part {
                "DD" => Part::Day,
                "MM" => Part::Month,
                "YY" | "YYYY" => Part::Year,
                _ => return Err(bad()),
            };
        }
        let distinct = [Part::Day, Part::Month, Part::Year]
            .iter()
            .all(|p| order.contains(p));
        if !distinct {
            return Err(bad());
        }
        Ok(Self { code, order })
    }
}

impl DateFormat {
    /// Converts a date string in this format to `CCYYMMDD`.
    ///
    /// Eight bare digits are taken as `CCYYMMDD` already; an empty string is
    /// the blank date. Two-digit years below 50 are in the 2000s.
    pub fn to_dtos(&self, text: &str) -> CoreResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }
        if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(text.to_string());
        }
        let bad = || {
            CoreError::invalid_argument(format!("'{text}' is not a date in {} format", self.code))
        };
        let numbers: Vec<u32> = text
            .split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| bad())?;
        if numbers.len() != 3 {
            return Err(bad());
        }
        let (mut day, mut month, mut year) = (0, 0, 0);
        for (part, value) in self.order.iter().zip(numbers) {
            match part {
                Part::Day => day = value,
                Part::Month => month = value,
                Part::Year => year = value,
            }
        }
        if year < 100 {
            year += if year < 50 { 2000 } else { 1900 };
        }
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || year > 9999 {
            return Err(bad());
        }
        Ok(format!("{year:04}{month:02}{day:02}"))
    }
}
