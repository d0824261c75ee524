//! PostgreSQL implementation of [`Connector`] and [`Session`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{
    postgres::{types::PgInterval, PgConnection, PgHasArrayType, PgRow, PgTypeKind, Postgres},
    types::{ipnetwork::IpNetwork, Decimal, JsonValue, Uuid},
    Column, Connection, Decode, Executor, Row, Statement, Type, TypeInfo, ValueRef,
};

use super::{Connector, Credentials, DbTarget, Session, SqlParam, SqlQuery, Table};
use crate::error::DbError;

// ---

/// Opens a fresh connection per [`Connector::acquire`] call.
#[derive(Debug, Clone)]
pub struct PgConnector {
    credentials: Credentials,
    target: DbTarget,
}

impl PgConnector {
    pub fn new(credentials: Credentials, target: DbTarget) -> Self {
        PgConnector {
            credentials,
            target,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn acquire(&self) -> Result<Box<dyn Session>, DbError> {
        // ---
        tracing::debug!(
            "Connecting to {}:{}/{} ({} credentials)",
            self.target.host,
            self.target.port,
            self.target.database,
            self.credentials.mode()
        );

        let options = self.credentials.connect_options(&self.target).await?;
        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(DbError::Connect)?;

        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl Session for PgSession {
    async fn fetch_table(&mut self, query: &SqlQuery) -> Result<Table, DbError> {
        // ---
        // Preparing first gives us column names even for an empty result.
        let statement = (&mut self.conn)
            .prepare(query.sql.as_str())
            .await
            .map_err(DbError::Query)?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut bound = statement.query();
        for param in &query.params {
            bound = match param {
                SqlParam::Text(v) => bound.bind(v.clone()),
                SqlParam::Timestamp(ts) => bound.bind(*ts),
            };
        }

        let rows = bound
            .fetch_all(&mut self.conn)
            .await
            .map_err(DbError::Query)?;

        let rows = rows
            .iter()
            .map(render_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table { columns, rows })
    }

    async fn release(self: Box<Self>) -> Result<(), DbError> {
        // ---
        self.conn.close().await.map_err(DbError::Connect)
    }
}

fn render_row(row: &PgRow) -> Result<Vec<String>, DbError> {
    // ---
    (0..row.len()).map(|idx| render_cell(row, idx)).collect()
}

/// Element type of a column we know how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Char,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Interval,
    Inet,
    Cidr,
    Bytea,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
    Scalar(Scalar),
    Array(Scalar),
}

impl Scalar {
    fn from_name(name: &str) -> Option<Self> {
        // ---
        let scalar = match name.to_ascii_uppercase().as_str() {
            "BOOL" => Scalar::Bool,
            "\"CHAR\"" => Scalar::Char,
            "INT2" => Scalar::Int2,
            "INT4" => Scalar::Int4,
            "INT8" => Scalar::Int8,
            "FLOAT4" => Scalar::Float4,
            "FLOAT8" => Scalar::Float8,
            "NUMERIC" => Scalar::Numeric,
            "UUID" => Scalar::Uuid,
            "JSON" | "JSONB" => Scalar::Json,
            "DATE" => Scalar::Date,
            "TIME" => Scalar::Time,
            "TIMESTAMP" => Scalar::Timestamp,
            "TIMESTAMPTZ" => Scalar::Timestamptz,
            "INTERVAL" => Scalar::Interval,
            "INET" => Scalar::Inet,
            "CIDR" => Scalar::Cidr,
            "BYTEA" => Scalar::Bytea,
            // sqlx reports bpchar as CHAR.
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
                Scalar::Text
            }
            _ => return None,
        };
        Some(scalar)
    }
}

impl CellType {
    /// `None` for types without a text rendering, such as geometry or ranges.
    fn classify(type_name: &str, is_enum: bool) -> Option<Self> {
        // ---
        if is_enum {
            return Some(CellType::Scalar(Scalar::Text));
        }
        match type_name.strip_suffix("[]") {
            Some(element) => Scalar::from_name(element).map(CellType::Array),
            None => Scalar::from_name(type_name).map(CellType::Scalar),
        }
    }
}

/// Render one cell to its natural text form. NULL becomes an empty string.
fn render_cell(row: &PgRow, idx: usize) -> Result<String, DbError> {
    // ---
    let column = &row.columns()[idx];
    let info = column.type_info();
    let type_name = info.name().to_string();

    let raw = row.try_get_raw(idx).map_err(DbError::Query)?;
    if raw.is_null() {
        return Ok(String::new());
    }

    let is_enum = matches!(info.kind(), PgTypeKind::Enum(_));
    let Some(cell_type) = CellType::classify(&type_name, is_enum) else {
        return Err(DbError::UnsupportedType {
            column: column.name().to_string(),
            type_name,
        });
    };

    let rendered = match cell_type {
        CellType::Scalar(scalar) => render_scalar(row, idx, scalar),
        CellType::Array(scalar) => render_array(row, idx, scalar),
    };

    rendered.map_err(|source| DbError::Decode {
        column: column.name().to_string(),
        type_name,
        source,
    })
}

fn render_scalar(row: &PgRow, idx: usize, scalar: Scalar) -> Result<String, sqlx::Error> {
    // ---
    let text = match scalar {
        Scalar::Bool => row.try_get::<bool, _>(idx)?.to_string(),
        Scalar::Char => row.try_get::<i8, _>(idx)?.to_string(),
        Scalar::Int2 => row.try_get::<i16, _>(idx)?.to_string(),
        Scalar::Int4 => row.try_get::<i32, _>(idx)?.to_string(),
        Scalar::Int8 => row.try_get::<i64, _>(idx)?.to_string(),
        Scalar::Float4 => row.try_get::<f32, _>(idx)?.to_string(),
        Scalar::Float8 => row.try_get::<f64, _>(idx)?.to_string(),
        Scalar::Numeric => row.try_get::<Decimal, _>(idx)?.to_string(),
        Scalar::Uuid => row.try_get::<Uuid, _>(idx)?.to_string(),
        Scalar::Json => row.try_get::<JsonValue, _>(idx)?.to_string(),
        Scalar::Date => row.try_get::<NaiveDate, _>(idx)?.to_string(),
        Scalar::Time => row.try_get::<NaiveTime, _>(idx)?.to_string(),
        Scalar::Timestamp => row.try_get::<NaiveDateTime, _>(idx)?.to_string(),
        Scalar::Timestamptz => format_timestamptz(&row.try_get::<DateTime<Utc>, _>(idx)?),
        Scalar::Interval => format_interval(&row.try_get::<PgInterval, _>(idx)?),
        Scalar::Inet => format_inet(&row.try_get::<IpNetwork, _>(idx)?),
        Scalar::Cidr => row.try_get::<IpNetwork, _>(idx)?.to_string(),
        Scalar::Bytea => format_bytea(&row.try_get::<Vec<u8>, _>(idx)?),
        // Text types and enums are UTF-8 on the wire.
        Scalar::Text => row.try_get_unchecked::<String, _>(idx)?,
    };
    Ok(text)
}

fn render_array(row: &PgRow, idx: usize, scalar: Scalar) -> Result<String, sqlx::Error> {
    // ---
    let items = match scalar {
        Scalar::Bool => elements::<bool>(row, idx, |v| v.to_string())?,
        Scalar::Char => elements::<i8>(row, idx, |v| v.to_string())?,
        Scalar::Int2 => elements::<i16>(row, idx, |v| v.to_string())?,
        Scalar::Int4 => elements::<i32>(row, idx, |v| v.to_string())?,
        Scalar::Int8 => elements::<i64>(row, idx, |v| v.to_string())?,
        Scalar::Float4 => elements::<f32>(row, idx, |v| v.to_string())?,
        Scalar::Float8 => elements::<f64>(row, idx, |v| v.to_string())?,
        Scalar::Numeric => elements::<Decimal>(row, idx, |v| v.to_string())?,
        Scalar::Uuid => elements::<Uuid>(row, idx, |v| v.to_string())?,
        Scalar::Json => elements::<JsonValue>(row, idx, |v| v.to_string())?,
        Scalar::Date => elements::<NaiveDate>(row, idx, |v| v.to_string())?,
        Scalar::Time => elements::<NaiveTime>(row, idx, |v| v.to_string())?,
        Scalar::Timestamp => elements::<NaiveDateTime>(row, idx, |v| v.to_string())?,
        Scalar::Timestamptz => {
            elements::<DateTime<Utc>>(row, idx, |v| format_timestamptz(&v))?
        }
        Scalar::Interval => elements::<PgInterval>(row, idx, |v| format_interval(&v))?,
        Scalar::Inet => elements::<IpNetwork>(row, idx, |v| format_inet(&v))?,
        Scalar::Cidr => elements::<IpNetwork>(row, idx, |v| v.to_string())?,
        Scalar::Bytea => elements::<Vec<u8>>(row, idx, |v| format_bytea(&v))?,
        Scalar::Text => elements::<String>(row, idx, |v| v)?,
    };
    Ok(array_literal(&items))
}

/// Decode a one-dimensional array, keeping NULL elements as `None`.
fn elements<T>(
    row: &PgRow,
    idx: usize,
    render: fn(T) -> String,
) -> Result<Vec<Option<String>>, sqlx::Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + PgHasArrayType,
{
    // ---
    let values = row.try_get::<Vec<Option<T>>, _>(idx)?;
    Ok(values.into_iter().map(|v| v.map(render)).collect())
}

/// `{a,b,NULL}` with Postgres quoting for elements that need it.
fn array_literal(items: &[Option<String>]) -> String {
    // ---
    let body = items
        .iter()
        .map(|item| match item {
            None => "NULL".to_string(),
            Some(v) if needs_quotes(v) => {
                format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Some(v) => v.clone(),
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

fn needs_quotes(v: &str) -> bool {
    // ---
    v.is_empty()
        || v.eq_ignore_ascii_case("NULL")
        || v.chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | ',' | '"' | '\\'))
}

/// `2024-05-01 10:00:00+00:00`, with six fractional digits only when present.
fn format_timestamptz(ts: &DateTime<Utc>) -> String {
    // ---
    if ts.timestamp_subsec_nanos() == 0 {
        ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
    }
}

/// Postgres `IntervalStyle = postgres` output, e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    // ---
    let mut parts = Vec::new();
    push_unit(&mut parts, interval.months / 12, "year");
    push_unit(&mut parts, interval.months % 12, "mon");
    push_unit(&mut parts, interval.days, "day");

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            clock.push_str(format!(".{:06}", frac).trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

fn push_unit(parts: &mut Vec<String>, value: i32, unit: &str) {
    if value != 0 {
        let plural = if value == 1 { "" } else { "s" };
        parts.push(format!("{} {}{}", value, unit, plural));
    }
}

/// Host addresses print without their full-length prefix, as Postgres does.
fn format_inet(net: &IpNetwork) -> String {
    // ---
    let full = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if net.prefix() == full {
        net.ip().to_string()
    } else {
        net.to_string()
    }
}

/// Hex escape format: `\x0a1b`.
fn format_bytea(bytes: &[u8]) -> String {
    // ---
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamptz_whole_seconds() {
        // ---
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamptz(&ts), "2024-05-01 10:00:00+00:00");
    }

    #[test]
    fn test_timestamptz_fractional_seconds() {
        // ---
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            format_timestamptz(&(base + chrono::Duration::milliseconds(500))),
            "2024-05-01 10:00:00.500000+00:00"
        );
        assert_eq!(
            format_timestamptz(&(base + chrono::Duration::microseconds(7))),
            "2024-05-01 10:00:00.000007+00:00"
        );
    }

    #[test]
    fn test_classify_scalars() {
        // ---
        assert_eq!(
            CellType::classify("INT4", false),
            Some(CellType::Scalar(Scalar::Int4))
        );
        assert_eq!(
            CellType::classify("\"CHAR\"", false),
            Some(CellType::Scalar(Scalar::Char))
        );
        assert_eq!(
            CellType::classify("INTERVAL", false),
            Some(CellType::Scalar(Scalar::Interval))
        );
        assert_eq!(
            CellType::classify("INET", false),
            Some(CellType::Scalar(Scalar::Inet))
        );
        assert_eq!(
            CellType::classify("CIDR", false),
            Some(CellType::Scalar(Scalar::Cidr))
        );
        assert_eq!(
            CellType::classify("BYTEA", false),
            Some(CellType::Scalar(Scalar::Bytea))
        );
    }

    #[test]
    fn test_classify_text_family() {
        // ---
        for name in ["TEXT", "VARCHAR", "CHAR", "NAME", "citext"] {
            assert_eq!(
                CellType::classify(name, false),
                Some(CellType::Scalar(Scalar::Text)),
                "{name}"
            );
        }
        // Enums carry their own type name.
        assert_eq!(
            CellType::classify("meter_phase", true),
            Some(CellType::Scalar(Scalar::Text))
        );
    }

    #[test]
    fn test_classify_arrays() {
        // ---
        assert_eq!(
            CellType::classify("INT4[]", false),
            Some(CellType::Array(Scalar::Int4))
        );
        assert_eq!(
            CellType::classify("TEXT[]", false),
            Some(CellType::Array(Scalar::Text))
        );
        assert_eq!(
            CellType::classify("TIMESTAMPTZ[]", false),
            Some(CellType::Array(Scalar::Timestamptz))
        );
    }

    #[test]
    fn test_classify_rejects_binary_only_types() {
        // ---
        for name in ["POINT", "INT4RANGE", "MONEY", "TSVECTOR", "POINT[]", "meter_phase"] {
            assert_eq!(CellType::classify(name, false), None, "{name}");
        }
    }

    #[test]
    fn test_interval_text() {
        // ---
        let iv = |months, days, microseconds| PgInterval {
            months,
            days,
            microseconds,
        };

        assert_eq!(format_interval(&iv(0, 0, 0)), "00:00:00");
        assert_eq!(format_interval(&iv(0, 0, 90_000_000)), "00:01:30");
        assert_eq!(
            format_interval(&iv(14, 3, 14_706_500_000)),
            "1 year 2 mons 3 days 04:05:06.5"
        );
        assert_eq!(format_interval(&iv(0, 1, 0)), "1 day");
        assert_eq!(format_interval(&iv(-24, -2, 0)), "-2 years -2 days");
        assert_eq!(format_interval(&iv(0, 1, -3_600_000_000)), "1 day -01:00:00");
    }

    #[test]
    fn test_inet_and_cidr_text() {
        // ---
        let host: IpNetwork = "192.168.0.7".parse().unwrap();
        assert_eq!(format_inet(&host), "192.168.0.7");

        let subnet: IpNetwork = "10.1.0.0/16".parse().unwrap();
        assert_eq!(format_inet(&subnet), "10.1.0.0/16");
        assert_eq!(subnet.to_string(), "10.1.0.0/16");

        let v6: IpNetwork = "::1".parse().unwrap();
        assert_eq!(format_inet(&v6), "::1");
    }

    #[test]
    fn test_array_literal() {
        // ---
        let ints = [Some("1".to_string()), None, Some("3".to_string())];
        assert_eq!(array_literal(&ints), "{1,NULL,3}");
        assert_eq!(array_literal(&[]), "{}");

        let text = [
            Some("plain".to_string()),
            Some("L1, L2".to_string()),
            Some("say \"hi\"".to_string()),
            Some(String::new()),
            Some("null".to_string()),
        ];
        assert_eq!(
            array_literal(&text),
            r#"{plain,"L1, L2","say \"hi\"","","null"}"#
        );
    }

    #[test]
    fn test_bytea_hex() {
        // ---
        assert_eq!(format_bytea(&[0x0a, 0xff, 0x00]), "\\x0aff00");
        assert_eq!(format_bytea(&[]), "\\x");
    }
}
