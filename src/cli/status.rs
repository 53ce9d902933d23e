use std::{fmt::Display, path::PathBuf};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use serde::Serialize;

use crate::{
    daemon::storage::{activity_log::ActivityLog, csv_row},
    utils::dir::AppLayout,
};

use super::{resolve_layout, Args};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct StatusCommand {
    #[arg(
        long,
        help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        short,
        help = "Day to inspect. Examples are \"today\", \"yesterday\", \"15/03/2025\". Defaults to the current UTC day"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print the report as json")]
    json: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub date: NaiveDate,
    pub log_file: PathBuf,
    pub rows: usize,
    /// Column name to value of the most recent row.
    pub last_row: Option<serde_json::Map<String, serde_json::Value>>,
}

fn parse_day(date: Option<String>, date_style: DateStyle) -> Result<NaiveDate> {
    let Some(date) = date else {
        return Ok(Utc::now().date_naive());
    };
    match parse_date_string(&date, Local::now(), date_style.into()) {
        Ok(v) => Ok(v.date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {e}"),
            )
            .into()),
    }
}

pub async fn build_report(layout: &AppLayout, date: NaiveDate) -> Result<StatusReport> {
    let log = ActivityLog::new(layout.logs(), layout.temp())?;
    let rows = log.row_count(date).await?;
    let last_row = log.last_row(date).await?.map(|line| {
        csv_row::split(&line)
            .into_iter()
            .map(|(column, value)| (column.to_string(), value.into()))
            .collect()
    });
    Ok(StatusReport {
        date,
        log_file: log.path_for(date),
        rows,
        last_row,
    })
}

fn print_report(report: &StatusReport) {
    let label = Style::new().bold();
    println!("{}\t{}", label.paint("Day"), report.date);
    println!("{}\t{}", label.paint("Log"), report.log_file.display());
    println!(
        "{}\t{}",
        label.paint("Rows"),
        Colour::Green.paint(report.rows.to_string())
    );
    let Some(last_row) = report.last_row.as_ref() else {
        println!("{}", Colour::Yellow.paint("Nothing recorded for this day"));
        return;
    };
    println!();
    println!("{}", label.paint("Last record"));
    for column in csv_row::COLUMNS {
        let value = last_row
            .get(column)
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        println!("  {}\t{value}", Colour::Cyan.paint(column));
    }
}

/// Command to process `status`. Shows how much was recorded for a day and what was recorded last.
pub async fn process_status_command(
    StatusCommand {
        dir,
        date,
        date_style,
        json,
    }: StatusCommand,
) -> Result<()> {
    let date = parse_day(date, date_style)?;
    let layout = resolve_layout(dir)?;
    let report = build_report(&layout, date).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::{
        daemon::{
            detection::{
                record::{MonitorType, NormalizedRecord},
                test_support::{snapshot, start_time},
            },
            storage::activity_log::{ActivityLog, ActivityStorage},
        },
        utils::dir::AppLayout,
    };

    use super::{build_report, parse_day, DateStyle};

    #[tokio::test]
    async fn reports_rows_and_last_record() -> Result<()> {
        let dir = tempdir()?;
        let layout = AppLayout::new(dir.path().to_path_buf());
        let date = start_time().date_naive();
        let log = ActivityLog::new(layout.logs(), layout.temp())?;
        let records = ["one", "two"].map(|title| {
            NormalizedRecord::from_process(
                start_time(),
                &snapshot(3, "code"),
                title,
                MonitorType::General,
            )
        });
        log.append_rows(date, &records).await?;

        let report = build_report(&layout, date).await?;
        assert_eq!(report.rows, 2);
        let last = report.last_row.unwrap();
        assert_eq!(last["window_title"], "two");
        assert_eq!(last["monitor_type"], "general");

        let empty = build_report(&layout, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).await?;
        assert_eq!(empty.rows, 0);
        assert!(empty.last_row.is_none());
        Ok(())
    }

    #[test]
    fn parses_explicit_days() -> Result<()> {
        assert_eq!(
            parse_day(Some("15/03/2025".into()), DateStyle::Uk)?,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert_eq!(
            parse_day(Some("03/15/2025".into()), DateStyle::Us)?,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert!(parse_day(Some("not a date at all".into()), DateStyle::Uk).is_err());
        Ok(())
    }
}
