//! CSV rendering of query results.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::db::Table;

/// Serialize `table` as CSV: a header row with the column names in query
/// order, then one record per row.
pub fn render(table: &Table) -> Result<Vec<u8>, csv::Error> {
    // ---
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// A `text/csv` download response.
pub fn attachment(filename: &str, body: Vec<u8>) -> Response {
    // ---
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        // ---
        Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_header_then_rows() {
        // ---
        let t = table(
            &["serial_number", "timestamp", "kwh"],
            &[
                &["PT-001", "2024-05-01 00:00:00+00:00", "1.5"],
                &["PT-001", "2024-05-01 00:15:00+00:00", ""],
            ],
        );
        let out = String::from_utf8(render(&t).unwrap()).unwrap();

        assert_eq!(
            out,
            "serial_number,timestamp,kwh\n\
             PT-001,2024-05-01 00:00:00+00:00,1.5\n\
             PT-001,2024-05-01 00:15:00+00:00,\n"
        );
    }

    #[test]
    fn test_fields_needing_quotes() {
        // ---
        let t = table(&["name", "notes"], &[&["read, holding", "say \"hi\""]]);
        let out = String::from_utf8(render(&t).unwrap()).unwrap();

        assert_eq!(out, "name,notes\n\"read, holding\",\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_header_only_for_empty_table() {
        // ---
        let t = table(&["id", "command"], &[]);
        let out = String::from_utf8(render(&t).unwrap()).unwrap();
        assert_eq!(out, "id,command\n");
    }

    #[test]
    fn test_attachment_headers() {
        // ---
        let resp = attachment("modbusrtu_commands.csv", b"a\n".to_vec());

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=modbusrtu_commands.csv"
        );
    }
}
