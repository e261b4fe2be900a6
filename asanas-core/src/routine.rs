//! Routine schedule formatter
//!
//! Turns a practice calendar exported as CSV into a printable plan. Each line
//! is `<label>,<dd/mm/YYYY>,<morning>,<evening>`; sections hold `;`-separated
//! items in which known abbreviations are spelled out.

use std::fmt::Write as _;

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::RoutineSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutineError {
    #[error("line {line}: expected 4 comma-separated fields, found {found}")]
    MissingFields { line: usize, found: usize },

    #[error("line {line}: invalid date {value:?}")]
    InvalidDate { line: usize, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDay {
    pub date: NaiveDate,
    pub morning: Vec<String>,
    pub evening: Vec<String>,
}

pub fn expand_section(section: &str, settings: &RoutineSettings) -> Vec<String> {
    section
        .trim()
        .split(';')
        .map(|item| {
            settings
                .abbreviations
                .iter()
                .fold(item.trim().to_string(), |acc, a| acc.trim().replace(&a.short, &a.full))
        })
        .collect()
}

pub fn parse_schedule(csv: &str, settings: &RoutineSettings) -> Result<Vec<RoutineDay>, RoutineError> {
    let mut days = vec![];
    for (idx, line) in csv.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 4 {
            return Err(RoutineError::MissingFields { line: line_no, found: fields.len() });
        }
        let date = NaiveDate::parse_from_str(fields[1].trim(), "%d/%m/%Y").map_err(|_| {
            RoutineError::InvalidDate { line: line_no, value: fields[1].trim().to_string() }
        })?;
        days.push(RoutineDay {
            date,
            morning: expand_section(fields[2], settings),
            evening: expand_section(fields[3], settings),
        });
    }
    Ok(days)
}

pub fn format_schedule(csv: &str, settings: &RoutineSettings) -> Result<String, RoutineError> {
    let mut out = String::new();
    for day in parse_schedule(csv, settings)? {
        let _ = writeln!(out, "\n {}", day.date.format("%d/%m/%Y (%a)"));
        let _ = writeln!(out, "{}", settings.morning);
        for item in &day.morning {
            let _ = writeln!(out, "- {}", item);
        }
        let _ = writeln!(out, "{}", settings.evening);
        for item in &day.evening {
            let _ = writeln!(out, "- {}", item);
        }
    }
    Ok(out)
}
