use std::io::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ProgressError;
use crate::models::{ExportParams, LogExportRow, LogRecord, VerificationStatus};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const HEADER: [&str; 8] = [
    "Procedure",
    "Rotation",
    "Date",
    "Count",
    "Status",
    "Verifier",
    "Verified At",
    "Reason",
];

pub fn parse_date(value: &str) -> Result<NaiveDate, ProgressError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ProgressError::InvalidInput(format!("expected YYYY-MM-DD date, got {value:?}")))
}

impl ExportParams {
    /// Builds export parameters from optional `YYYY-MM-DD` strings.
    pub fn parse(user_id: Uuid, from: Option<&str>, to: Option<&str>) -> Result<Self, ProgressError> {
        Ok(ExportParams {
            user_id,
            from: from.map(parse_date).transpose()?,
            to: to.map(parse_date).transpose()?,
        })
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| from <= date) && self.to.map_or(true, |to| date <= to)
    }
}

/// Projects log rows inside the inclusive date range, oldest first.
pub fn export_rows(logs: &[LogRecord], params: &ExportParams, clock: &Clock) -> Vec<LogExportRow> {
    let mut selected: Vec<&LogRecord> = logs
        .iter()
        .filter(|log| log.intern_id == params.user_id)
        .filter(|log| params.contains(clock.local_date(log.performed_at)))
        .collect();

    selected.sort_by(|a, b| {
        a.performed_at
            .cmp(&b.performed_at)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    selected
        .into_iter()
        .map(|log| LogExportRow {
            procedure_name: log.procedure_name.clone(),
            rotation_name: log.rotation_name.clone(),
            date: clock.local_date(log.performed_at).format(DATE_FORMAT).to_string(),
            count: log.count,
            status: log.status,
            verifier_name: log.verifier_name.clone(),
            verified_at: log.verified_at.map(|at| {
                at.with_timezone(&clock.timezone())
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            }),
            reason: match log.status {
                VerificationStatus::Rejected => log.reason.clone(),
                _ => None,
            },
        })
        .collect()
}

pub fn write_csv<W: Write>(rows: &[LogExportRow], writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    // Serializing the first row emits the header; an empty export needs it too.
    if rows.is_empty() {
        csv_writer.write_record(HEADER)?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
