use std::borrow::Cow;

use chrono::{DateTime, Utc};

use crate::models::job::Job;

/// Adobe Stock CSV header. Order and spelling are fixed by the importer.
pub const CSV_HEADER: [&str; 5] = ["Filename", "Title", "Keywords", "Category", "Releases"];

/// Separator between keywords inside the Keywords column.
pub const KEYWORD_SEPARATOR: &str = ", ";

/// Quotes a field when it contains a comma, double quote or line break.
pub fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Formats one CSV row. Jobs without metadata get blank Title and Keywords.
pub fn csv_row(job: &Job) -> String {
    let (title, keywords) = match job.metadata() {
        Some(meta) => (meta.title.as_str(), meta.tags.join(KEYWORD_SEPARATOR)),
        None => ("", String::new()),
    };

    [
        escape_field(job.filename()),
        escape_field(title),
        escape_field(&keywords),
        Cow::Borrowed(""),
        Cow::Borrowed(""),
    ]
    .join(",")
}

/// Renders the header plus one row per job, newline separated.
pub fn to_csv<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> String {
    std::iter::once(CSV_HEADER.join(","))
        .chain(jobs.into_iter().map(csv_row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Download name, e.g. `AdobeStock_Metadata_2024-05-01T09-30-00.csv`.
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("AdobeStock_Metadata_{}.csv", at.format("%Y-%m-%dT%H-%M-%S"))
}
