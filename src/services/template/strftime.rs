//! Timestamp formatting for `time`-family variables.
//!
//! Standard strftime tokens plus `%f` for the 6-digit microsecond part.
//! Inside templates `@` stands in for `%`, since `%` already delimits
//! variables.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::domain::error::TemplateError;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S.%f";

/// Map `@` to `%` and `%f` to chrono's fixed-width microseconds
fn normalize(fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len() + 4);
    let mut chars = fmt.chars().map(|c| if c == '@' { '%' } else { c });

    while let Some(c) = chars.next() {
        out.push(c);
        if c != '%' {
            continue;
        }
        match chars.next() {
            Some('f') => out.push_str("6f"),
            Some(next) => out.push(next),
            None => {}
        }
    }
    out
}

/// Format `time` with an optional user format (in `@` notation)
pub fn format_time(
    var: &str,
    time: &DateTime<Local>,
    fmt: Option<&str>,
) -> Result<String, TemplateError> {
    let fmt = match fmt {
        Some(f) => normalize(f),
        None => normalize(DEFAULT_TIME_FORMAT),
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(&fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::unresolved(var, format!("invalid time format \"{fmt}\"")));
    }

    Ok(time.format_with_items(items.into_iter()).to_string())
}
