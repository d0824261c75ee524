// src/routes/modbus.rs
//! Whole-table export of the Modbus RTU command reference at
//! `/api/downloadModbusRTUcsv`.

use axum::{extract::State, response::Response, routing::get, Router};
use tracing::info;

use super::AppState;
use crate::{
    csv_export,
    db::{self, SqlQuery},
    error::ApiError,
};

const FILENAME: &str = "modbusrtu_commands.csv";

async fn handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    // ---
    info!("Processing request to download modbusrtu_commands table as CSV");

    let query = SqlQuery::new("SELECT * FROM public.modbusrtu_commands");
    let table = db::with_session(state.db.as_ref(), move |session| {
        Box::pin(async move { Ok::<_, ApiError>(session.fetch_table(&query).await?) })
    })
    .await?;

    info!("Exporting {} modbusrtu_commands rows", table.rows.len());
    Ok(csv_export::attachment(FILENAME, csv_export::render(&table)?))
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/downloadModbusRTUcsv", get(handler))
}
