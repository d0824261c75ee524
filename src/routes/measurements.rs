// src/routes/measurements.rs
//! Measurement CSV routes.
//!
//! - `GET /api/generateMeasurementsCSV`
//!   - legacy form, selected when any of `sn`, `year`, `month` is given
//!     against the production schema
//!   - current form: `user_id`, `powermeter_id`, `start_utc`, `end_utc` and an
//!     optional `enviroment` (`production`, `demo`, `dev`)
//! - `GET /api/demoGenerateMeasurementsCSV`: legacy form against `demo`
//!
//! Parameters are fully validated before any database work.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{
    export::{self, ExportRequest, MeterKey, Period},
    AppState,
};
use crate::{
    error::ApiError,
    models::{Schema, Timestamp},
};

// ---

/// Union of both parameter sets; which ones are required depends on the form.
#[derive(Debug, Default, Deserialize)]
pub struct MeasurementsQuery {
    sn: Option<String>,
    year: Option<String>,
    month: Option<String>,
    user_id: Option<String>,
    powermeter_id: Option<String>,
    start_utc: Option<String>,
    end_utc: Option<String>,
    /// Spelled as the deployed clients send it.
    enviroment: Option<String>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/generateMeasurementsCSV", get(generate))
        .route("/demoGenerateMeasurementsCSV", get(generate_demo))
}

async fn generate(
    State(state): State<AppState>,
    Query(params): Query<MeasurementsQuery>,
) -> Result<Response, ApiError> {
    // ---
    info!("GET /api/generateMeasurementsCSV");

    let request = if params.is_legacy() {
        params.into_legacy(Schema::Public)?
    } else {
        params.into_owned()?
    };
    export::export_measurements(state.db.as_ref(), request, Utc::now()).await
}

async fn generate_demo(
    State(state): State<AppState>,
    Query(params): Query<MeasurementsQuery>,
) -> Result<Response, ApiError> {
    // ---
    info!("GET /api/demoGenerateMeasurementsCSV");

    let request = params.into_legacy(Schema::Demo)?;
    export::export_measurements(state.db.as_ref(), request, Utc::now()).await
}

impl MeasurementsQuery {
    fn is_legacy(&self) -> bool {
        [&self.sn, &self.year, &self.month]
            .into_iter()
            .any(|v| present(v).is_some())
    }

    /// `sn` + `year` + `month` against a fixed schema.
    fn into_legacy(self, schema: Schema) -> Result<ExportRequest, ApiError> {
        // ---
        let (sn, year, month) = match (present(&self.sn), present(&self.year), present(&self.month))
        {
            (Some(sn), Some(year), Some(month)) => (sn, year, month),
            (sn, year, month) => {
                let missing = [("sn", sn), ("year", year), ("month", month)]
                    .into_iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| name)
                    .collect::<Vec<_>>();
                return Err(ApiError::missing_fields(&missing));
            }
        };

        let year: i32 = year
            .parse()
            .map_err(|_| ApiError::Validation(format!("Invalid year '{}'.", year)))?;
        let month: u32 = month
            .parse()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| {
                ApiError::Validation(format!("Invalid month '{}'. Expected 1-12.", month))
            })?;

        Ok(ExportRequest {
            schema,
            meter: MeterKey::Serial(sn.to_string()),
            period: Period::Month { year, month },
        })
    }

    /// `user_id` + `powermeter_id` + explicit range, schema chosen by
    /// `enviroment`.
    fn into_owned(self) -> Result<ExportRequest, ApiError> {
        // ---
        let fields = [
            ("user_id", present(&self.user_id)),
            ("powermeter_id", present(&self.powermeter_id)),
            ("start_utc", present(&self.start_utc)),
            ("end_utc", present(&self.end_utc)),
        ];
        let missing = fields
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ApiError::missing_fields(&missing));
        }

        let value = |idx: usize| fields[idx].1.unwrap_or_default();
        let schema = Schema::from_selector(self.enviroment.as_deref())?;
        let start = Timestamp::parse("start_utc", value(2))?;
        let end = Timestamp::parse("end_utc", value(3))?;

        Ok(ExportRequest {
            schema,
            meter: MeterKey::Owned {
                powermeter_id: value(1).to_string(),
                user_id: value(0).to_string(),
            },
            period: Period::Range { start, end },
        })
    }
}

/// A parameter counts as present only when non-blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
