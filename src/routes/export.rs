// src/routes/export.rs
//! Shared measurement export pipeline.
//!
//! Every measurement route reduces its parameters to an [`ExportRequest`] and
//! hands it to [`export_measurements`], which runs:
//! lookup zone → compute window → query → render.
//!
//! All database work for one request happens on a single session.

use axum::response::Response;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    csv_export,
    db::{self, Connector, Session, SqlQuery, Table},
    error::ApiError,
    models::{
        self, date_label, explicit_window, month_label, month_window, Schema, TimeWindow,
        Timestamp,
    },
};

// ---

/// How the meter is identified, and whether access is checked against a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeterKey {
    /// Legacy lookup by serial number, no ownership check.
    Serial(String),
    /// Lookup by internal id, restricted to installations owned by `user_id`.
    Owned {
        powermeter_id: String,
        user_id: String,
    },
}

/// Reporting period as requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month { year: i32, month: u32 },
    Range { start: Timestamp, end: Timestamp },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub schema: Schema,
    pub meter: MeterKey,
    pub period: Period,
}

struct Extract {
    table: Table,
    window: TimeWindow,
}

impl MeterKey {
    fn identifier(&self) -> &str {
        match self {
            MeterKey::Serial(sn) => sn,
            MeterKey::Owned { powermeter_id, .. } => powermeter_id,
        }
    }

    /// Query returning the meter's IANA zone as its only cell.
    fn time_zone_query(&self, schema: Schema) -> SqlQuery {
        // ---
        let schema = schema.as_str();
        match self {
            MeterKey::Serial(sn) => SqlQuery::new(format!(
                "SELECT p.time_zone FROM {schema}.powermeters p \
                 WHERE p.serial_number::text = $1"
            ))
            .bind_text(sn.clone()),
            MeterKey::Owned {
                powermeter_id,
                user_id,
            } => SqlQuery::new(format!(
                "SELECT p.time_zone FROM {schema}.powermeters p \
                 JOIN {schema}.user_installations ui ON ui.installation_id = p.installation_id \
                 WHERE p.powermeter_id::text = $1 AND ui.user_id::text = $2"
            ))
            .bind_text(powermeter_id.clone())
            .bind_text(user_id.clone()),
        }
    }

    fn measurements_query(&self, schema: Schema, window: &TimeWindow) -> SqlQuery {
        // ---
        let schema = schema.as_str();
        let column = match self {
            MeterKey::Serial(_) => "serial_number",
            MeterKey::Owned { .. } => "powermeter_id",
        };

        SqlQuery::new(format!(
            "SELECT m.* FROM {schema}.measurements m \
             WHERE m.{column}::text = $1 \
             AND m.\"timestamp\" >= $2 AND m.\"timestamp\" < $3 \
             ORDER BY m.\"timestamp\""
        ))
        .bind_text(self.identifier().to_string())
        .bind_timestamp(window.start)
        .bind_timestamp(window.end)
    }

    /// Ownership failures are reported exactly like a missing meter.
    fn not_found(&self) -> ApiError {
        // ---
        match self {
            MeterKey::Serial(sn) => {
                ApiError::NotFound(format!("Powermeter with serial number {} not found.", sn))
            }
            MeterKey::Owned { powermeter_id, .. } => ApiError::NotFound(format!(
                "No data found for powermeter {}.",
                powermeter_id
            )),
        }
    }
}

impl Period {
    fn window(&self, tz: chrono_tz::Tz) -> Result<TimeWindow, ApiError> {
        match *self {
            Period::Month { year, month } => month_window(year, month, tz),
            Period::Range { start, end } => explicit_window(start, end, tz),
        }
    }

    fn label(&self, window: &TimeWindow) -> String {
        match self {
            Period::Month { year, month } => month_label(*year, *month),
            Period::Range { .. } => format!("{} to {}", window.start, window.end),
        }
    }

    fn file_suffix(&self, window: &TimeWindow) -> String {
        match self {
            Period::Month { year, month } => format!("{:04}_{:02}", year, month),
            Period::Range { .. } => {
                format!("{}_{}", date_label(&window.start), date_label(&window.end))
            }
        }
    }
}

/// Run the full export and build the CSV response.
///
/// `now` bounds the window so no rows at or after the current instant are
/// returned.
pub async fn export_measurements(
    connector: &dyn Connector,
    request: ExportRequest,
    now: DateTime<Utc>,
) -> Result<Response, ApiError> {
    // ---
    info!(
        "Exporting measurements for {} ({:?}) from schema {}",
        request.meter.identifier(),
        request.period,
        request.schema.as_str()
    );

    let job = request.clone();
    let extract = db::with_session(connector, move |session| {
        Box::pin(run_extract(session, job, now))
    })
    .await?;

    let identifier = request.meter.identifier();
    if extract.table.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No measurements found for {} in period {}.",
            identifier,
            request.period.label(&extract.window)
        )));
    }

    info!("Exporting {} measurement rows", extract.table.rows.len());

    let filename = format!(
        "measurements_{}_{}.csv",
        sanitize(identifier),
        request.period.file_suffix(&extract.window)
    );
    Ok(csv_export::attachment(
        &filename,
        csv_export::render(&extract.table)?,
    ))
}

async fn run_extract(
    session: &mut dyn Session,
    request: ExportRequest,
    now: DateTime<Utc>,
) -> Result<Extract, ApiError> {
    // ---
    let zone = session
        .fetch_table(&request.meter.time_zone_query(request.schema))
        .await?;
    let zone_name = zone.first_value().ok_or_else(|| request.meter.not_found())?;
    let tz = models::parse_time_zone(zone_name)?;
    debug!("Meter {} uses time zone {}", request.meter.identifier(), tz.name());

    let window = request.period.window(tz)?;
    let bounded = window.clamp_to(now);
    debug!("Querying window {} .. {}", bounded.start, bounded.end);

    let table = session
        .fetch_table(&request.meter.measurements_query(request.schema, &bounded))
        .await?;

    Ok(Extract { table, window })
}

/// Keep file names to a safe character set.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
