//! Account, title and output file naming

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};

/// Longest file name stem produced by [`sanitize_filename`], in characters
pub const MAX_FILENAME_CHARS: usize = 200;

const PROFILE_MARKER: &str = "/profile/";

/// Reduce a profile URL or `@handle` to the bare handle.
///
/// `https://bsky.app/profile/example.com/` and `@example.com` both become
/// `example.com`. Other input is returned trimmed.
pub fn normalize_account(account: &str) -> String {
    let account = account.trim();
    if account.starts_with("http://") || account.starts_with("https://") {
        if let Some(pos) = account.find(PROFILE_MARKER) {
            let rest = &account[pos + PROFILE_MARKER.len()..];
            let handle = rest.split(['/', '?', '#']).next().unwrap_or_default();
            if !handle.is_empty() {
                return handle.trim_start_matches('@').to_string();
            }
        }
        return account.to_string();
    }
    account.trim_start_matches('@').to_string()
}

/// Replace characters that are invalid in file names with `_` and cap the
/// length.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect()
}

/// Default output file name: `<handle>-<YYYYmmdd-HHMMSS>.epub`.
pub fn default_output_name<Tz>(account: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: core::fmt::Display,
{
    let handle = sanitize_filename(&normalize_account(account));
    format!("{}-{}.epub", handle, at.format("%Y%m%d-%H%M%S"))
}

/// Default book title for an account
pub fn default_title(account: &str) -> String {
    format!("{} - BlueSky Book", normalize_account(account))
}

/// Default author for an account
pub fn default_author(account: &str) -> String {
    format!("@{}", normalize_account(account))
}

/// English ordinal suffix for a day of month
fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Cover subtitle, e.g. `Created on Sunday, 26th of October 2025`.
pub fn cover_subtitle(date: NaiveDate) -> String {
    format!(
        "Created on {}, {}{} of {}",
        date.format("%A"),
        date.day(),
        ordinal_suffix(date.day()),
        date.format("%B %Y")
    )
}
