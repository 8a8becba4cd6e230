use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::calendar::{parse_date, parse_time};
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAppointment {
        appointment: NewAppointment,
        returning_id: bool,
    },
    /// `date: None` keeps the appointment's current date.
    Reschedule {
        id: AppointmentId,
        date: Option<NaiveDate>,
        time: NaiveTime,
        client_ref: Option<String>,
    },
    UpdateField {
        id: AppointmentId,
        field: AppointmentField,
        value: String,
    },
    Cancel {
        id: AppointmentId,
        client_ref: Option<String>,
    },
    DeleteAppointment {
        id: AppointmentId,
    },
    ArchiveStale {
        age_days: u32,
    },
    SelectAvailability {
        date: NaiveDate,
        exclude_id: Option<AppointmentId>,
    },
    SelectAppointments(AppointmentFilter),
    SelectClient {
        client_ref: String,
    },
    SelectStats,
    SelectServices,
}

#[derive(Debug, PartialEq)]
pub enum AppointmentFilter {
    ById(AppointmentId),
    ByDate(NaiveDate),
    ByClient { client_ref: String, include_past: bool },
    Search(String),
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(call) = trimmed
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("CALL "))
        .and_then(|_| trimmed.get(5..))
    {
        return parse_call(call.trim());
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// `CALL archive_stale(N)`
fn parse_call(call: &str) -> Result<Command, SqlError> {
    let (name, rest) = call
        .split_once('(')
        .ok_or_else(|| SqlError::Parse(format!("expected procedure call, got '{call}'")))?;
    let args = rest
        .strip_suffix(')')
        .ok_or_else(|| SqlError::Parse("unterminated argument list".into()))?;
    match name.trim().to_lowercase().as_str() {
        "archive_stale" => {
            let age_days = args
                .trim()
                .parse()
                .map_err(|_| SqlError::InvalidValue(format!("archive_stale expects a day count, got '{}'", args.trim())))?;
            Ok(Command::ArchiveStale { age_days })
        }
        other => Err(SqlError::Unsupported(format!("procedure {other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "appointments" {
        return Err(SqlError::UnknownTable(table));
    }
    let rows = extract_insert_rows(insert)?;
    if rows.len() != 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    if columns.is_empty() {
        return Err(SqlError::Parse("INSERT INTO appointments needs a column list".into()));
    }
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("appointments", columns.len(), values.len()));
    }

    let column = |name: &str| columns.iter().position(|c| c == name).map(|i| &values[i]);
    let required = |name: &'static str| column(name).ok_or(SqlError::MissingColumn(name));
    if let Some(unknown) = columns.iter().find(|c| !INSERT_COLUMNS.contains(&c.as_str())) {
        return Err(SqlError::Parse(format!("unknown column: {unknown}")));
    }

    let appointment = NewAppointment {
        client_name: parse_string(required("client_name")?)?,
        client_ref: column("client_ref").map(parse_string_or_null).transpose()?.flatten(),
        phone: column("phone").map(parse_string_or_null).transpose()?.flatten(),
        date: parse_date_expr(required("date")?)?,
        time: parse_time_expr(required("time")?)?,
        service: parse_string(required("service")?)?,
    };
    let returning_id = insert.returning.as_ref().is_some_and(|r| !r.is_empty());
    Ok(Command::InsertAppointment {
        appointment,
        returning_id,
    })
}

const INSERT_COLUMNS: [&str; 6] = ["client_name", "client_ref", "phone", "date", "time", "service"];

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "appointments" {
        return Err(SqlError::UnknownTable(name));
    }

    let mut set: Vec<(String, &Expr)> = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.push((column, &assignment.value));
    }
    let assigned = |col: &str| set.iter().find(|(c, _)| c == col).map(|(_, e)| *e);

    let filters = where_filters(selection)?;
    let id = parse_id(filter(&filters, "id").ok_or(SqlError::MissingFilter("id"))?)?;
    let client_ref = filter(&filters, "client_ref").map(parse_string).transpose()?;

    if let Some(status) = assigned("status") {
        if set.len() != 1 {
            return Err(SqlError::Unsupported("status must be updated on its own".into()));
        }
        let status = parse_string(status)?;
        return match Status::parse(&status) {
            Some(Status::CancelledByClient) => Ok(Command::Cancel { id, client_ref }),
            Some(Status::Deleted) => {
                id_only(client_ref.as_deref())?;
                Ok(Command::DeleteAppointment { id })
            }
            _ => Err(SqlError::InvalidValue(format!("cannot set status to '{status}'"))),
        };
    }

    if assigned("time").is_some() || assigned("date").is_some() {
        if set.iter().any(|(c, _)| c != "time" && c != "date") {
            return Err(SqlError::Unsupported("date/time must be updated without other columns".into()));
        }
        let time = parse_time_expr(assigned("time").ok_or(SqlError::MissingColumn("time"))?)?;
        let date = assigned("date").map(parse_date_expr).transpose()?;
        return Ok(Command::Reschedule {
            id,
            date,
            time,
            client_ref,
        });
    }

    match set.as_slice() {
        [(column, value)] => {
            let field = AppointmentField::parse(column)
                .ok_or_else(|| SqlError::Unsupported(format!("column {column} is not editable")))?;
            id_only(client_ref.as_deref())?;
            Ok(Command::UpdateField {
                id,
                field,
                value: parse_string(value)?,
            })
        }
        _ => Err(SqlError::Unsupported("update one editable column at a time".into())),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "appointments" {
        return Err(SqlError::UnknownTable(table));
    }
    let filters = where_filters(&delete.selection)?;
    let id = parse_id(filter(&filters, "id").ok_or(SqlError::MissingFilter("id"))?)?;
    let client_ref = filter(&filters, "client_ref").map(parse_string).transpose()?;
    id_only(client_ref.as_deref())?;
    Ok(Command::DeleteAppointment { id })
}

/// Administrator writes address a row by id alone.
fn id_only(client_ref: Option<&str>) -> Result<(), SqlError> {
    match client_ref {
        Some(r) => Err(SqlError::Unsupported(format!(
            "client_ref filter ('{r}') on an administrator write; match by id only"
        ))),
        None => Ok(()),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_filters(&select.selection)?;

    match table.as_str() {
        "availability" => Ok(Command::SelectAvailability {
            date: parse_date_expr(filter(&filters, "date").ok_or(SqlError::MissingFilter("date"))?)?,
            exclude_id: filter(&filters, "exclude_id").map(parse_id).transpose()?,
        }),
        "appointments" => {
            let by = if let Some(id) = filter(&filters, "id") {
                AppointmentFilter::ById(parse_id(id)?)
            } else if let Some(date) = filter(&filters, "date") {
                AppointmentFilter::ByDate(parse_date_expr(date)?)
            } else if let Some(client_ref) = filter(&filters, "client_ref") {
                AppointmentFilter::ByClient {
                    client_ref: parse_string(client_ref)?,
                    include_past: filter(&filters, "include_past").map(parse_bool).transpose()?.unwrap_or(false),
                }
            } else if let Some(term) = filter(&filters, "search") {
                AppointmentFilter::Search(parse_string(term)?)
            } else {
                return Err(SqlError::MissingFilter("id, date, client_ref or search"));
            };
            Ok(Command::SelectAppointments(by))
        }
        "clients" => Ok(Command::SelectClient {
            client_ref: parse_string(filter(&filters, "client_ref").ok_or(SqlError::MissingFilter("client_ref"))?)?,
        }),
        "stats" => Ok(Command::SelectStats),
        "services" => Ok(Command::SelectServices),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND b = y ...` into `(column, value)` pairs.
fn where_filters(selection: &Option<Expr>) -> Result<Vec<(String, Expr)>, SqlError> {
    let mut out = Vec::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut out)?;
    }
    Ok(out)
}

fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((column, right.as_ref().clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

fn filter<'a>(filters: &'a [(String, Expr)], column: &str) -> Option<&'a Expr> {
    filters.iter().find(|(c, _)| c == column).map(|(_, e)| e)
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// Text from a quoted string or a bare number (chat ids arrive as numbers).
fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::InvalidValue("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_id(expr: &Expr) -> Result<AppointmentId, SqlError> {
    let raw = parse_string(expr)?;
    raw.trim()
        .parse()
        .map_err(|_| SqlError::InvalidValue(format!("bad appointment id '{raw}'")))
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    parse_date(&parse_string(expr)?).map_err(|e| SqlError::InvalidValue(e.to_string()))
}

fn parse_time_expr(expr: &Expr) -> Result<NaiveTime, SqlError> {
    parse_time(&parse_string(expr)?).map_err(|e| SqlError::InvalidValue(e.to_string()))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::InvalidValue(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str),
    /// Well-formed SQL carrying a value the domain rejects.
    InvalidValue(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_insert_appointment() {
        let sql = "INSERT INTO appointments (client_name, client_ref, phone, date, time, service) \
                   VALUES ('Anna', 1001, NULL, '10.06.2024', '10:00', 'Haircut') RETURNING id";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertAppointment { appointment, returning_id } => {
                assert_eq!(appointment.client_name, "Anna");
                assert_eq!(appointment.client_ref.as_deref(), Some("1001"));
                assert_eq!(appointment.phone, None);
                assert_eq!(appointment.date, d(2024, 6, 10));
                assert_eq!(appointment.time, t(10, 0));
                assert_eq!(appointment.service, "Haircut");
                assert!(returning_id);
            }
            _ => panic!("expected InsertAppointment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_minimal_columns_any_order() {
        let sql = "INSERT INTO appointments (service, time, date, client_name) VALUES ('Massage', '14:30', '11.06.2024', 'Boris')";
        match parse_sql(sql).unwrap() {
            Command::InsertAppointment { appointment, returning_id } => {
                assert_eq!(appointment.client_name, "Boris");
                assert_eq!(appointment.client_ref, None);
                assert_eq!(appointment.time, t(14, 30));
                assert!(!returning_id);
            }
            other => panic!("expected InsertAppointment, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_errors() {
        let missing = "INSERT INTO appointments (client_name, date, time) VALUES ('A', '10.06.2024', '10:00')";
        assert!(matches!(parse_sql(missing), Err(SqlError::MissingColumn("service"))));

        let arity = "INSERT INTO appointments (client_name, date) VALUES ('A')";
        assert!(matches!(parse_sql(arity), Err(SqlError::WrongArity(..))));

        let bad_date = "INSERT INTO appointments (client_name, date, time, service) VALUES ('Anna', '2024-06-10', '10:00', 'Haircut')";
        assert!(matches!(parse_sql(bad_date), Err(SqlError::InvalidValue(_))));

        let off_grid = "INSERT INTO appointments (client_name, date, time, service) VALUES ('Anna', '10.06.2024', '10:15', 'Haircut')";
        assert!(matches!(parse_sql(off_grid), Err(SqlError::InvalidValue(_))));

        let unknown = "INSERT INTO bookings (client_name) VALUES ('A')";
        assert!(matches!(parse_sql(unknown), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_reschedule() {
        let sql = "UPDATE appointments SET date = '11.06.2024', time = '11:00' WHERE id = 5 AND client_ref = '1001'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::Reschedule {
                id: 5,
                date: Some(d(2024, 6, 11)),
                time: t(11, 0),
                client_ref: Some("1001".into()),
            }
        );

        let same_day = "UPDATE appointments SET time = '15:30' WHERE id = 5";
        assert_eq!(
            parse_sql(same_day).unwrap(),
            Command::Reschedule { id: 5, date: None, time: t(15, 30), client_ref: None }
        );

        let no_time = "UPDATE appointments SET date = '11.06.2024' WHERE id = 5";
        assert!(matches!(parse_sql(no_time), Err(SqlError::MissingColumn("time"))));
    }

    #[test]
    fn parse_update_field() {
        let sql = "UPDATE appointments SET service = 'Massage' WHERE id = 3";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpdateField { id: 3, field: AppointmentField::Service, value: "Massage".into() }
        );
        let bad = "UPDATE appointments SET phone = '1' WHERE id = 3";
        assert!(matches!(parse_sql(bad), Err(SqlError::Unsupported(_))));
        let no_id = "UPDATE appointments SET service = 'Massage'";
        assert!(matches!(parse_sql(no_id), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_status_updates() {
        let cancel = "UPDATE appointments SET status = 'cancelled_by_client' WHERE id = 9 AND client_ref = '77'";
        assert_eq!(
            parse_sql(cancel).unwrap(),
            Command::Cancel { id: 9, client_ref: Some("77".into()) }
        );
        let delete = "UPDATE appointments SET status = 'deleted' WHERE id = 9";
        assert_eq!(parse_sql(delete).unwrap(), Command::DeleteAppointment { id: 9 });
        let owned_delete = "UPDATE appointments SET status = 'deleted' WHERE id = 9 AND client_ref = '77'";
        assert!(matches!(parse_sql(owned_delete), Err(SqlError::Unsupported(_))));
        let archive = "UPDATE appointments SET status = 'archived' WHERE id = 9";
        assert!(matches!(parse_sql(archive), Err(SqlError::InvalidValue(_))));
    }

    #[test]
    fn parse_delete_appointment() {
        assert_eq!(
            parse_sql("DELETE FROM appointments WHERE id = 12").unwrap(),
            Command::DeleteAppointment { id: 12 }
        );
        assert!(matches!(
            parse_sql("DELETE FROM appointments"),
            Err(SqlError::MissingFilter("id"))
        ));
        assert!(matches!(
            parse_sql("DELETE FROM appointments WHERE id = 12 AND client_ref = '77'"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_call_archive() {
        assert_eq!(parse_sql("CALL archive_stale(30);").unwrap(), Command::ArchiveStale { age_days: 30 });
        assert_eq!(parse_sql("call ARCHIVE_STALE( 7 )").unwrap(), Command::ArchiveStale { age_days: 7 });
        assert!(matches!(parse_sql("CALL archive_stale(-1)"), Err(SqlError::InvalidValue(_))));
        assert!(matches!(parse_sql("CALL vacuum()"), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_availability() {
        let sql = "SELECT * FROM availability WHERE date = '10.06.2024' AND exclude_id = 4";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectAvailability { date: d(2024, 6, 10), exclude_id: Some(4) }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM availability"),
            Err(SqlError::MissingFilter("date"))
        ));
    }

    #[test]
    fn parse_select_appointments() {
        assert_eq!(
            parse_sql("SELECT * FROM appointments WHERE id = 3").unwrap(),
            Command::SelectAppointments(AppointmentFilter::ById(3))
        );
        assert_eq!(
            parse_sql("SELECT * FROM appointments WHERE date = '10.06.2024'").unwrap(),
            Command::SelectAppointments(AppointmentFilter::ByDate(d(2024, 6, 10)))
        );
        assert_eq!(
            parse_sql("SELECT * FROM appointments WHERE client_ref = '5' AND include_past = true").unwrap(),
            Command::SelectAppointments(AppointmentFilter::ByClient { client_ref: "5".into(), include_past: true })
        );
        assert_eq!(
            parse_sql("SELECT * FROM appointments WHERE search = 'ann'").unwrap(),
            Command::SelectAppointments(AppointmentFilter::Search("ann".into()))
        );
        assert!(matches!(
            parse_sql("SELECT * FROM appointments"),
            Err(SqlError::MissingFilter(_))
        ));
    }

    #[test]
    fn parse_select_other_tables() {
        assert_eq!(
            parse_sql("SELECT * FROM clients WHERE client_ref = 'abc'").unwrap(),
            Command::SelectClient { client_ref: "abc".into() }
        );
        assert_eq!(parse_sql("SELECT * FROM stats").unwrap(), Command::SelectStats);
        assert_eq!(parse_sql("select * from services").unwrap(), Command::SelectServices);
        assert!(matches!(parse_sql("SELECT * FROM resources"), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn non_equality_filters_rejected() {
        let sql = "SELECT * FROM appointments WHERE id > 3";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
