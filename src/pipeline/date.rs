//! Date label for a publication, taken from the document's filename.

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Tried in order; the first pattern that matches anywhere wins.
static DATE_PATTERNS: Lazy<[(Regex, DateOrder); 3]> = Lazy::new(|| {
    [
        (Regex::new(r"(\d{2})-(\d{2})-(\d{4})").unwrap(), DateOrder::DayFirst),
        (Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(), DateOrder::YearFirst),
        (Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})").unwrap(), DateOrder::DayFirst),
    ]
});

#[derive(Clone, Copy)]
enum DateOrder {
    DayFirst,
    YearFirst,
}

/// Extract a `DD.MM.YYYY` label from a filename, if it carries a date in
/// `DD-MM-YYYY`, `YYYY-MM-DD` or `DD.MM.YYYY` form.
pub fn extract_date(filename: &str) -> Option<String> {
    DATE_PATTERNS.iter().find_map(|(re, order)| {
        let caps = re.captures(filename)?;
        let (day, month, year) = match order {
            DateOrder::DayFirst => (&caps[1], &caps[2], &caps[3]),
            DateOrder::YearFirst => (&caps[3], &caps[2], &caps[1]),
        };
        Some(format!("{day}.{month}.{year}"))
    })
}

/// Last path segment of a link, without query or fragment.
pub fn file_name(link: &str) -> &str {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.rsplit('/').next().unwrap_or(path)
}

/// Label used in messages: the filename date, or `today` when there is none.
pub fn date_label(link: &str, today: NaiveDate) -> String {
    extract_date(file_name(link)).unwrap_or_else(|| today.format("%d.%m.%Y").to_string())
}

/// [`date_label`] against the local calendar.
pub fn date_label_now(link: &str) -> String {
    date_label(link, Local::now().date_naive())
}
