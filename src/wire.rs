use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type, METADATA_USER};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::auth::{Role, SlotwiseAuthSource};
use crate::booking::BookingManager;
use crate::calendar::{format_date, format_time};
use crate::config::ServiceCatalog;
use crate::engine::{EngineError, StorageFault};
use crate::model::*;
use crate::observability;
use crate::sql::{self, AppointmentFilter, Command, SqlError};

/// Who issued a statement.
struct Session {
    role: Role,
    user: String,
}

impl Session {
    fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn require_admin(&self, what: &str) -> PgWireResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(forbidden(format!("{what} is reserved for the administrator")))
        }
    }

    /// The `client_ref` a statement acts for. Clients may only act as
    /// themselves; the administrator may act for anyone.
    fn acting_ref(&self, client_ref: Option<String>) -> PgWireResult<Option<String>> {
        if self.is_admin() {
            return Ok(client_ref);
        }
        match client_ref {
            Some(r) if r.trim() == self.user => Ok(Some(self.user.clone())),
            Some(r) => Err(forbidden(format!("client {} cannot act as {r}", self.user))),
            None => Err(forbidden("client sessions must name their client_ref".into())),
        }
    }

    fn check_own(&self, client_ref: &str) -> PgWireResult<()> {
        if self.is_admin() || client_ref == self.user {
            Ok(())
        } else {
            Err(forbidden(format!("client {} cannot read {client_ref}", self.user)))
        }
    }
}

pub struct SlotwiseHandler {
    bookings: Arc<BookingManager>,
    catalog: Arc<ServiceCatalog>,
    admin_user: String,
    query_parser: Arc<SlotwiseQueryParser>,
}

impl SlotwiseHandler {
    pub fn new(bookings: Arc<BookingManager>, catalog: Arc<ServiceCatalog>, admin_user: String) -> Self {
        Self {
            bookings,
            catalog,
            admin_user,
            query_parser: Arc::new(SlotwiseQueryParser),
        }
    }

    fn session<C: ClientInfo>(&self, client: &C) -> PgWireResult<Session> {
        let user = client
            .metadata()
            .get(METADATA_USER)
            .cloned()
            .ok_or_else(|| forbidden("no user in startup message".into()))?;
        Ok(Session {
            role: Role::for_user(&user, &self.admin_user),
            user,
        })
    }

    async fn run(&self, session: &Session, query: &str, format: &Format) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(session, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        session: &Session,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let engine = self.bookings.engine();
        match cmd {
            Command::InsertAppointment {
                mut appointment,
                returning_id,
            } => {
                if !session.is_admin() {
                    let client_ref = appointment.client_ref.take().unwrap_or_else(|| session.user.clone());
                    appointment.client_ref = session.acting_ref(Some(client_ref))?;
                }
                let id = self.bookings.book(appointment).await.map_err(engine_err)?;
                if returning_id {
                    let schema = Arc::new(describe(id_columns(), format));
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&(id as i64))?;
                    let rows = vec![Ok(encoder.take_row())];
                    Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
                } else {
                    Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
                }
            }
            Command::Reschedule {
                id,
                date,
                time,
                client_ref,
            } => {
                let requester = session.acting_ref(client_ref)?;
                self.bookings
                    .reschedule(id, date, time, requester.as_deref())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::UpdateField { id, field, value } => {
                session.require_admin("editing appointments")?;
                self.bookings.change_field(id, field, &value).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::Cancel { id, client_ref } => {
                let client_ref = session
                    .acting_ref(client_ref)?
                    .ok_or_else(|| invalid("cancel needs the client_ref of the booking".into()))?;
                self.bookings.cancel_by_client(id, &client_ref).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteAppointment { id } => {
                session.require_admin("deleting appointments")?;
                self.bookings.delete(id).await.map_err(engine_err)?;
                info!("administrator {} deleted appointment {id}", session.user);
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::ArchiveStale { age_days } => {
                session.require_admin("archiving")?;
                let count = engine.archive_stale(age_days).await.map_err(engine_err)?;
                let schema = Arc::new(describe(archived_columns(), format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(count as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectAvailability { date, exclude_id } => {
                let slots = engine.available_slots(date, exclude_id).await.map_err(engine_err)?;
                let schema = Arc::new(describe(availability_columns(), format));
                let date_str = format_date(date);
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&format_time(slot))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectAppointments(filter) => {
                let rows = match filter {
                    AppointmentFilter::ById(id) => match engine.find_by_id(id).await {
                        Ok(a) => {
                            if let Some(owner) = &a.client_ref {
                                session.check_own(owner)?;
                            } else {
                                session.require_admin("reading this appointment")?;
                            }
                            vec![a]
                        }
                        Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    AppointmentFilter::ByDate(date) => {
                        session.require_admin("the day schedule")?;
                        engine.list_for_date(date).await.map_err(engine_err)?
                    }
                    AppointmentFilter::ByClient {
                        client_ref,
                        include_past,
                    } => {
                        session.check_own(&client_ref)?;
                        engine
                            .list_for_client(&client_ref, include_past)
                            .await
                            .map_err(engine_err)?
                    }
                    AppointmentFilter::Search(term) => {
                        session.require_admin("search")?;
                        engine.search(&term).await.map_err(engine_err)?
                    }
                };
                Ok(vec![appointments_response(rows, format)?])
            }
            Command::SelectClient { client_ref } => {
                session.check_own(&client_ref)?;
                let schema = Arc::new(describe(clients_columns(), format));
                let rows: Vec<PgWireResult<_>> = engine
                    .get_client(&client_ref)
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.client_ref)?;
                        encoder.encode_field(&c.name)?;
                        encoder.encode_field(&c.phone)?;
                        encoder.encode_field(&format_date(c.first_visit))?;
                        encoder.encode_field(&format_date(c.last_visit))?;
                        encoder.encode_field(&(c.total_visits as i64))?;
                        encoder.encode_field(&c.notes)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectStats => {
                session.require_admin("statistics")?;
                let stats = engine.stats().await.map_err(engine_err)?;
                let schema = Arc::new(describe(stats_columns(), format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                for n in [stats.today, stats.tomorrow, stats.week, stats.total] {
                    encoder.encode_field(&(n as i64))?;
                }
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectServices => {
                let schema = Arc::new(describe(services_columns(), format));
                let rows: Vec<PgWireResult<_>> = self
                    .catalog
                    .services()
                    .iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.name)?;
                        encoder.encode_field(&(s.duration_minutes as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
        }
    }
}

fn appointments_response(appointments: Vec<Appointment>, format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(describe(appointments_columns(), format));
    let rows: Vec<PgWireResult<_>> = appointments
        .into_iter()
        .map(|a| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&(a.id as i64))?;
            encoder.encode_field(&a.client_name)?;
            encoder.encode_field(&a.client_ref)?;
            encoder.encode_field(&a.phone)?;
            encoder.encode_field(&format_date(a.date))?;
            encoder.encode_field(&format_time(a.time))?;
            encoder.encode_field(&a.service)?;
            encoder.encode_field(&a.status.as_str())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

// ── Result schemas ───────────────────────────────────────────────

type Columns = Vec<(&'static str, Type)>;

/// Field descriptions in the result format the client asked for.
fn describe(columns: Columns, format: &Format) -> Vec<FieldInfo> {
    columns
        .into_iter()
        .enumerate()
        .map(|(i, (name, ty))| FieldInfo::new(name.into(), None, None, ty, format.format_for(i)))
        .collect()
}

fn id_columns() -> Columns {
    vec![("id", Type::INT8)]
}

fn archived_columns() -> Columns {
    vec![("archived", Type::INT8)]
}

fn availability_columns() -> Columns {
    vec![("date", Type::VARCHAR), ("time", Type::VARCHAR)]
}

fn appointments_columns() -> Columns {
    vec![
        ("id", Type::INT8),
        ("client_name", Type::VARCHAR),
        ("client_ref", Type::VARCHAR),
        ("phone", Type::VARCHAR),
        ("date", Type::VARCHAR),
        ("time", Type::VARCHAR),
        ("service", Type::VARCHAR),
        ("status", Type::VARCHAR),
    ]
}

fn clients_columns() -> Columns {
    vec![
        ("client_ref", Type::VARCHAR),
        ("name", Type::VARCHAR),
        ("phone", Type::VARCHAR),
        ("first_visit", Type::VARCHAR),
        ("last_visit", Type::VARCHAR),
        ("total_visits", Type::INT8),
        ("notes", Type::VARCHAR),
    ]
}

fn stats_columns() -> Columns {
    vec![
        ("today", Type::INT8),
        ("tomorrow", Type::INT8),
        ("week", Type::INT8),
        ("total", Type::INT8),
    ]
}

fn services_columns() -> Columns {
    vec![("name", Type::VARCHAR), ("duration_minutes", Type::INT8)]
}

/// Result columns a statement will produce, judged from its text so that
/// statements with unbound `$n` placeholders can be described.
fn result_columns(sql: &str) -> Columns {
    let upper = sql.trim_start().to_uppercase();
    if upper.starts_with("CALL") {
        return archived_columns();
    }
    if upper.starts_with("INSERT") {
        return if upper.contains("RETURNING") { id_columns() } else { vec![] };
    }
    if !upper.starts_with("SELECT") {
        return vec![];
    }
    let table = upper
        .split_once(" FROM ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|t| t.trim_end_matches(';'))
        .unwrap_or_default();
    match table {
        "AVAILABILITY" => availability_columns(),
        "APPOINTMENTS" => appointments_columns(),
        "CLIENTS" => clients_columns(),
        "STATS" => stats_columns(),
        "SERVICES" => services_columns(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotwiseHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client)?;
        self.run(&session, query, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotwiseQueryParser;

#[async_trait]
impl QueryParser for SlotwiseQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe(result_columns(stmt), column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotwiseHandler {
    type Statement = String;
    type QueryParser = SlotwiseQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client)?;
        let sql = substitute_params(portal);
        let mut responses = self.run(&session, &sql, &portal.result_column_format).await?;
        if responses.is_empty() {
            return Ok(Response::EmptyQuery);
        }
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe(result_columns(&target.statement), &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe(
            result_columns(&target.statement.statement),
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    substitute_text_params(&portal.statement.statement, &portal.parameters)
}

fn substitute_text_params(sql: &str, params: &[Option<Bytes>]) -> String {
    let mut result = sql.to_string();
    // Highest index first so `$1` never eats the prefix of `$10`.
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SlotwiseFactory {
    handler: Arc<SlotwiseHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<SlotwiseAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotwiseFactory {
    pub fn new(
        bookings: Arc<BookingManager>,
        catalog: Arc<ServiceCatalog>,
        admin_user: String,
        admin_password: String,
        client_password: String,
    ) -> Self {
        let auth_source = SlotwiseAuthSource::new(admin_user.clone(), admin_password, client_password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotwiseHandler::new(bookings, catalog, admin_user)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotwiseFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<SlotwiseFactory>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn forbidden(message: String) -> PgWireError {
    warn!("{message}");
    user_error("42501", message)
}

fn invalid(message: String) -> PgWireError {
    user_error("22023", message)
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::Conflict { .. } => "23505",
        EngineError::NotFound(_) => "P0002",
        EngineError::Forbidden(_) => "42501",
        EngineError::Validation(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::StorageFault(StorageFault::LockTimeout(_)) => "55P03",
        EngineError::StorageFault(StorageFault::Wal(_)) => "58000",
    };
    user_error(code, e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::InvalidValue(_) => "22023",
        _ => "42601",
    };
    user_error(code, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(err: PgWireError) -> String {
        match err {
            PgWireError::UserError(info) => format!("{info:?}"),
            other => panic!("expected user error, got {other:?}"),
        }
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM stats"), 0);
        assert_eq!(count_params("SELECT * FROM availability WHERE date = $1 AND exclude_id = $2"), 2);
        assert_eq!(count_params("UPDATE appointments SET time = $10 WHERE id = $2"), 10);
    }

    #[test]
    fn substitute_quotes_and_nulls() {
        let params = vec![
            Some(Bytes::from_static(b"O'Neil")),
            None,
            Some(Bytes::from_static(b"5")),
        ];
        let sql = "INSERT INTO appointments (client_name, phone, client_ref) VALUES ($1, $2, $3)";
        assert_eq!(
            substitute_text_params(sql, &params),
            "INSERT INTO appointments (client_name, phone, client_ref) VALUES ('O''Neil', NULL, '5')"
        );
    }

    #[test]
    fn result_columns_by_table() {
        assert_eq!(result_columns("SELECT * FROM availability WHERE date = $1").len(), 2);
        assert_eq!(result_columns("select * from appointments where id = $1").len(), 8);
        assert_eq!(result_columns("SELECT * FROM stats;").len(), 4);
        assert_eq!(result_columns("INSERT INTO appointments (x) VALUES ($1) RETURNING id").len(), 1);
        assert_eq!(result_columns("CALL archive_stale(30)")[0].0, "archived");
        assert!(result_columns("DELETE FROM appointments WHERE id = $1").is_empty());
    }

    #[test]
    fn engine_errors_map_to_sqlstate() {
        let cases = [
            (EngineError::Conflict { client_name: "Anna".into() }, "23505"),
            (EngineError::NotFound(1), "P0002"),
            (EngineError::Forbidden(1), "42501"),
            (EngineError::Validation("x".into()), "22023"),
            (EngineError::LimitExceeded("x"), "54000"),
            (
                EngineError::StorageFault(StorageFault::LockTimeout(std::time::Duration::from_millis(5))),
                "55P03",
            ),
            (EngineError::StorageFault(StorageFault::Wal("disk".into())), "58000"),
        ];
        for (err, code) in cases {
            assert!(code_of(engine_err(err)).contains(code));
        }
        assert!(code_of(sql_err(SqlError::Empty)).contains("42601"));
        assert!(code_of(sql_err(SqlError::InvalidValue("x".into()))).contains("22023"));
    }

    #[test]
    fn client_sessions_act_only_as_themselves() {
        let client = Session { role: Role::Client, user: "42".into() };
        assert_eq!(client.acting_ref(Some("42".into())).unwrap().as_deref(), Some("42"));
        assert!(code_of(client.acting_ref(Some("7".into())).unwrap_err()).contains("42501"));
        assert!(code_of(client.acting_ref(None).unwrap_err()).contains("42501"));
        assert!(client.check_own("7").is_err());

        let admin = Session { role: Role::Admin, user: "admin".into() };
        assert_eq!(admin.acting_ref(None).unwrap(), None);
        assert!(admin.check_own("7").is_ok());
        assert!(admin.require_admin("x").is_ok());
    }
}
