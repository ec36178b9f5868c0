use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use snitchr_types::models::{ANONYMOUS, Confession, ReactionKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),

    #[error("json export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export buffer error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export produced invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    export_date: DateTime<Utc>,
    total_confessions: usize,
    confessions: &'a [Confession],
}

const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Message",
    "Nickname",
    "Timestamp",
    "Location",
    "Mood",
    "Heart Reactions",
    "Laugh Reactions",
    "Think Reactions",
];

/// Renders `confessions` in `format`. `now` stamps the JSON document.
pub fn export(confessions: &[Confession], format: ExportFormat, now: DateTime<Utc>) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(confessions, now),
        ExportFormat::Csv => to_csv(confessions),
        ExportFormat::Txt => Ok(to_txt(confessions)),
    }
}

/// `snitchr-confessions-YYYY-MM-DD.<ext>`
pub fn export_file_name(format: ExportFormat, date: NaiveDate) -> String {
    format!("snitchr-confessions-{}.{}", date.format("%Y-%m-%d"), format.extension())
}

fn to_json(confessions: &[Confession], now: DateTime<Utc>) -> Result<String, ExportError> {
    let document = ExportDocument {
        export_date: now,
        total_confessions: confessions.len(),
        confessions,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

fn to_csv(confessions: &[Confession]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;
    for c in confessions {
        let location = c
            .location
            .map(|l| format!("{},{}", l.latitude, l.longitude))
            .unwrap_or_default();
        writer.write_record([
            c.id.clone(),
            c.message.clone(),
            c.display_name().to_string(),
            c.created_at.to_rfc3339(),
            location,
            c.mood.map(|m| m.label().to_string()).unwrap_or_default(),
            c.reactions.heart.count.to_string(),
            c.reactions.laugh.count.to_string(),
            c.reactions.think.count.to_string(),
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn to_txt(confessions: &[Confession]) -> String {
    let mut out = String::new();
    for (i, c) in confessions.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{}. {}", i + 1, c.message);
        let _ = writeln!(out, "   By: {}", c.nickname.as_deref().unwrap_or(ANONYMOUS));
        let _ = writeln!(out, "   Date: {}", c.created_at.format("%Y-%m-%d %H:%M UTC"));
        if let Some(mood) = c.mood {
            let _ = writeln!(out, "   Mood: {} {}", mood.glyph(), mood.label());
        }
        let reactions: Vec<String> = ReactionKind::ALL
            .into_iter()
            .map(|kind| (kind, c.reactions.get(kind).count))
            .filter(|(_, count)| *count > 0)
            .map(|(kind, count)| format!("{}{}", count, kind.glyph()))
            .collect();
        if !reactions.is_empty() {
            let _ = writeln!(out, "   Reactions: {}", reactions.join(" "));
        }
        if let Some(l) = c.location {
            let _ = writeln!(out, "   Location: {}, {}", l.latitude, l.longitude);
        }
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExportStats {
    pub total_confessions: usize,
    pub total_reactions: u64,
    pub with_reactions: usize,
    pub with_location: usize,
    pub with_mood: usize,
    /// Rounded to one decimal.
    pub average_reactions: f64,
}

pub fn export_stats(confessions: &[Confession]) -> ExportStats {
    let total_confessions = confessions.len();
    let total_reactions: u64 = confessions.iter().map(|c| c.reactions.total()).sum();
    let average_reactions = if total_confessions == 0 {
        0.0
    } else {
        (total_reactions as f64 / total_confessions as f64 * 10.0).round() / 10.0
    };
    ExportStats {
        total_confessions,
        total_reactions,
        with_reactions: confessions.iter().filter(|c| c.reactions.any()).count(),
        with_location: confessions.iter().filter(|c| c.location.is_some()).count(),
        with_mood: confessions.iter().filter(|c| c.mood.is_some()).count(),
        average_reactions,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use snitchr_types::models::{Location, Mood, Reactions};

    use super::*;

    fn sample() -> Vec<Confession> {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let mut reactions = Reactions::default();
        reactions.heart.count = 3;
        reactions.think.count = 1;
        vec![
            Confession {
                id: "a".into(),
                message: "I said \"hi\", then left".into(),
                nickname: Some("Bob".into()),
                mood: Some(Mood::Love),
                location: Some(Location::new(38.5, -9.25)),
                created_at: at,
                reactions,
            },
            Confession {
                id: "b".into(),
                message: "quiet one".into(),
                nickname: None,
                mood: None,
                location: None,
                created_at: at,
                reactions: Reactions::default(),
            },
        ]
    }

    #[test]
    fn json_document_carries_count_and_records() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let text = export(&sample(), ExportFormat::Json, now).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_confessions"], 2);
        assert_eq!(value["export_date"], "2024-06-02T00:00:00Z");
        assert_eq!(value["confessions"][0]["id"], "a");
        assert_eq!(value["confessions"][0]["reactions"]["heart"]["count"], 3);
    }

    #[test]
    fn csv_quotes_and_defaults() {
        let text = export(&sample(), ExportFormat::Csv, Utc::now()).unwrap();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, CSV_HEADERS);

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "I said \"hi\", then left");
        assert_eq!(&rows[0][4], "38.5,-9.25");
        assert_eq!(&rows[0][5], Mood::Love.label());
        assert_eq!(&rows[0][6], "3");
        assert_eq!(&rows[1][2], ANONYMOUS);
        assert_eq!(&rows[1][4], "");
    }

    #[test]
    fn txt_lists_only_present_details() {
        let text = export(&sample(), ExportFormat::Txt, Utc::now()).unwrap();
        let expected_first = format!(
            "1. I said \"hi\", then left\n   By: Bob\n   Date: 2024-06-01 09:30 UTC\n   Mood: {} {}\n   Reactions: 3{} 1{}\n   Location: 38.5, -9.25\n\n",
            Mood::Love.glyph(),
            Mood::Love.label(),
            ReactionKind::Heart.glyph(),
            ReactionKind::Think.glyph(),
        );
        assert!(text.starts_with(&expected_first), "got:\n{text}");
        assert!(text.ends_with("2. quiet one\n   By: Anonymous\n   Date: 2024-06-01 09:30 UTC\n\n"));
    }

    #[test]
    fn file_names_are_dated() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(export_file_name(ExportFormat::Csv, date), "snitchr-confessions-2024-01-09.csv");
        assert_eq!("TEXT".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn stats_average_to_one_decimal() {
        let stats = export_stats(&sample());
        assert_eq!(stats.total_confessions, 2);
        assert_eq!(stats.total_reactions, 4);
        assert_eq!(stats.with_reactions, 1);
        assert_eq!(stats.with_location, 1);
        assert_eq!(stats.with_mood, 1);
        assert_eq!(stats.average_reactions, 2.0);
        assert_eq!(export_stats(&[]).average_reactions, 0.0);
    }
}
