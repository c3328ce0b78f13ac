use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::AtriumAuthSource;
use crate::engine::{Engine, EngineError, TypeSelector};
use crate::model::*;
use crate::observability;
use crate::org::OrgManager;
use crate::pricing::Quote;
use crate::sql::{self, Command};

pub struct AtriumHandler {
    orgs: Arc<OrgManager>,
    query_parser: Arc<AtriumQueryParser>,
}

impl AtriumHandler {
    pub fn new(orgs: Arc<OrgManager>) -> Self {
        Self {
            orgs,
            query_parser: Arc::new(AtriumQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.orgs.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("organization error: {e}"),
            )))
        })
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = std::time::Instant::now();
        let result = self.dispatch_command(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn dispatch_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertRateType {
                id,
                name,
                tax,
                discount,
            } => {
                engine
                    .create_rate_type(id, name, tax, discount)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertFacilityType {
                id,
                name,
                category,
                price,
                rate_type_id,
                metadata,
            } => {
                engine
                    .create_facility_type(id, name, category, price, rate_type_id, metadata)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertFacility {
                id,
                type_id,
                name,
                location,
            } => {
                engine
                    .create_facility(id, type_id, name, location, None)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::RetireFacility { id } => {
                engine.retire_facility(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertReservation {
                id,
                facility_id,
                type_name,
                window,
                guests,
                status,
            } => {
                engine
                    .create_reservation(crate::engine::ReservationRequest {
                        id,
                        facility_id,
                        type_name,
                        window,
                        guests,
                        status: status.unwrap_or(ReservationStatus::Processing),
                        quote: None,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateReservationStatus { id, status } => {
                engine
                    .set_reservation_status(id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::UpdateReservationWindow { id, window } => {
                engine
                    .set_reservation_window(id, window)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RecordStay {
                id,
                check_in,
                check_out,
            } => {
                engine
                    .record_stay(id, check_in, check_out)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertMaintenance {
                id,
                facility_id,
                status,
                window,
            } => {
                engine
                    .schedule_maintenance(id, facility_id, status, window)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateMaintenanceStatus { id, status } => {
                engine
                    .set_maintenance_status(id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertHold {
                id,
                facility_id,
                type_name,
                window,
                guest_id,
                frontdesk_id,
                session_id,
                guests,
                ttl_ms,
            } => {
                engine
                    .place_hold(crate::engine::HoldRequest {
                        id,
                        facility_id,
                        type_name,
                        window,
                        guest_id,
                        frontdesk_id,
                        session_id,
                        guests,
                        ttl_ms,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::CancelHold { id } => {
                engine.cancel_hold(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::Assign {
                reservation_id,
                window,
            } => {
                let assignment = engine
                    .assign_facility(reservation_id, window)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(assignment_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&assignment.reservation_id.to_string())?;
                encoder.encode_field(&assignment.facility_id.to_string())?;
                encoder.encode_field(&assignment.already_assigned)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::AssignBatch { reservation_ids } => {
                let outcomes = engine
                    .batch_assign(&reservation_ids)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(batch_assign_schema());
                let rows: Vec<PgWireResult<_>> = outcomes
                    .into_iter()
                    .map(|o| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&o.reservation_id.to_string())?;
                        match o.outcome {
                            Ok(a) => {
                                encoder.encode_field(&Some(a.facility_id.to_string()))?;
                                encoder.encode_field(&a.already_assigned)?;
                                encoder.encode_field(&None::<String>)?;
                            }
                            Err(e) => {
                                encoder.encode_field(&None::<String>)?;
                                encoder.encode_field(&false)?;
                                encoder.encode_field(&Some(e.to_string()))?;
                            }
                        }
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::ConfirmHold {
                hold_id,
                reservation_id,
            } => {
                let created = engine
                    .confirm_hold(hold_id, reservation_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(confirm_hold_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&hold_id.to_string())?;
                encoder.encode_field(&created.to_string())?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SweepHolds => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .expect("clock before epoch")
                    .as_millis() as Ms;
                let count = engine
                    .sweep_expired_holds(now)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(count_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(count as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Quote {
                type_name,
                window,
                unit,
                override_price,
            } => {
                let quote = engine
                    .quote(&type_name, window, unit, override_price)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(quote_schema());
                let rows = vec![encode_quote(&schema, &quote)];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailability {
                window,
                type_name,
                filters,
            } => {
                let selector = match type_name {
                    Some(name) => TypeSelector::ByName(name),
                    None => TypeSelector::All,
                };
                let results = engine
                    .check_availability(window, selector, None, &filters)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(availability_schema());
                let rows: Vec<PgWireResult<_>> = results
                    .into_iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&a.type_id.to_string())?;
                        encoder.encode_field(&a.type_name)?;
                        encoder.encode_field(&a.category.as_str())?;
                        encoder.encode_field(&a.price.to_string())?;
                        encoder.encode_field(&(a.total_count as i64))?;
                        encoder.encode_field(&(a.available_count as i64))?;
                        encoder.encode_field(&(a.reserved_count as i64))?;
                        encoder.encode_field(&(a.maintenance_count as i64))?;
                        encoder.encode_field(&a.is_available)?;
                        let names: Vec<&str> = a
                            .available_facilities
                            .iter()
                            .map(|f| f.name.as_str())
                            .collect();
                        encoder.encode_field(&names.join(","))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFacilityTypes => {
                let types = engine.list_facility_types().await;
                let schema = Arc::new(facility_types_schema());
                let rows: Vec<PgWireResult<_>> = types
                    .into_iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&t.id.to_string())?;
                        encoder.encode_field(&t.name)?;
                        encoder.encode_field(&t.category.as_str())?;
                        encoder.encode_field(&t.price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFacilities { type_id } => {
                let facilities = engine.list_facilities(type_id).await;
                let schema = Arc::new(facilities_schema());
                let rows: Vec<PgWireResult<_>> = facilities
                    .into_iter()
                    .map(|f| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&f.id.to_string())?;
                        encoder.encode_field(&f.type_id.to_string())?;
                        encoder.encode_field(&f.name)?;
                        encoder.encode_field(&f.location)?;
                        encoder.encode_field(&f.retired)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectReservations { type_id } => {
                let reservations = engine.list_reservations(type_id).await;
                let schema = Arc::new(reservations_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.facility_id.map(|f| f.to_string()))?;
                        encoder.encode_field(&r.requested_type)?;
                        encoder.encode_field(&r.window.start)?;
                        encoder.encode_field(&r.window.end)?;
                        encoder.encode_field(&(r.guests as i64))?;
                        encoder.encode_field(&r.status.as_str())?;
                        encoder.encode_field(&r.payment_status.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectHolds { type_id } => {
                let holds = engine.list_holds(type_id).await;
                let schema = Arc::new(holds_schema());
                let rows: Vec<PgWireResult<_>> = holds
                    .into_iter()
                    .map(|h| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&h.id.to_string())?;
                        encoder.encode_field(&h.facility_id.map(|f| f.to_string()))?;
                        encoder.encode_field(&h.requested_type)?;
                        encoder.encode_field(&h.window.start)?;
                        encoder.encode_field(&h.window.end)?;
                        encoder.encode_field(&h.status.as_str())?;
                        encoder.encode_field(&h.expires_at)?;
                        encoder.encode_field(&h.frontdesk_id)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectMaintenance { type_id } => {
                let records = engine.list_maintenance(type_id).await;
                let schema = Arc::new(maintenance_schema());
                let rows: Vec<PgWireResult<_>> = records
                    .into_iter()
                    .map(|m| {
                        let (start, end, date) = match m.window {
                            MaintenanceWindow::Range(r) => (Some(r.start), Some(r.end), None),
                            MaintenanceWindow::OpenEnded { start } => (Some(start), None, None),
                            MaintenanceWindow::Day { date } => (None, None, Some(date)),
                        };
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&m.id.to_string())?;
                        encoder.encode_field(&m.facility_id.to_string())?;
                        encoder.encode_field(&m.status.as_str())?;
                        encoder.encode_field(&start)?;
                        encoder.encode_field(&end)?;
                        encoder.encode_field(&date)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let type_id_str = channel.strip_prefix("type_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected type_{{id}})"),
                    )))
                })?;
                let _type_id = Ulid::from_string(type_id_str).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad ULID in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

// ── Result row schemas ──────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("type_id", Type::VARCHAR),
        text_field("type_name", Type::VARCHAR),
        text_field("category", Type::VARCHAR),
        text_field("price", Type::VARCHAR),
        text_field("total", Type::INT8),
        text_field("available", Type::INT8),
        text_field("reserved", Type::INT8),
        text_field("maintenance", Type::INT8),
        text_field("is_available", Type::BOOL),
        text_field("available_facilities", Type::VARCHAR),
    ]
}

fn assignment_schema() -> Vec<FieldInfo> {
    vec![
        text_field("reservation_id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("already_assigned", Type::BOOL),
    ]
}

fn batch_assign_schema() -> Vec<FieldInfo> {
    vec![
        text_field("reservation_id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("already_assigned", Type::BOOL),
        text_field("error", Type::VARCHAR),
    ]
}

fn confirm_hold_schema() -> Vec<FieldInfo> {
    vec![
        text_field("hold_id", Type::VARCHAR),
        text_field("reservation_id", Type::VARCHAR),
    ]
}

fn count_schema() -> Vec<FieldInfo> {
    vec![text_field("count", Type::INT8)]
}

fn quote_schema() -> Vec<FieldInfo> {
    vec![
        text_field("unit", Type::VARCHAR),
        text_field("units", Type::INT8),
        text_field("subtotal", Type::VARCHAR),
        text_field("discount", Type::VARCHAR),
        text_field("tax", Type::VARCHAR),
        text_field("total", Type::VARCHAR),
    ]
}

fn facility_types_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("category", Type::VARCHAR),
        text_field("price", Type::VARCHAR),
    ]
}

fn facilities_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("type_id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("location", Type::VARCHAR),
        text_field("retired", Type::BOOL),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("type_name", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("guests", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("payment", Type::VARCHAR),
    ]
}

fn holds_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("type_name", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("expires_at", Type::INT8),
        text_field("held_by", Type::VARCHAR),
    ]
}

fn maintenance_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("status", Type::VARCHAR),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("date", Type::INT8),
    ]
}

fn encode_quote(
    schema: &Arc<Vec<FieldInfo>>,
    quote: &Quote,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&quote.unit.as_str())?;
    encoder.encode_field(&quote.units)?;
    encoder.encode_field(&quote.subtotal.to_string())?;
    encoder.encode_field(&quote.discount_amount.to_string())?;
    encoder.encode_field(&quote.tax_amount.to_string())?;
    encoder.encode_field(&quote.total.to_string())?;
    Ok(encoder.take_row())
}

/// Result schema inferred from statement text, shared by the describe paths.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("ASSIGN_BATCH") {
        batch_assign_schema()
    } else if upper.contains("ASSIGN") {
        assignment_schema()
    } else if upper.contains("CONFIRM_HOLD") {
        confirm_hold_schema()
    } else if upper.contains("SWEEP_HOLDS") {
        count_schema()
    } else if upper.contains("QUOTE") {
        quote_schema()
    } else if upper.contains("FROM FACILITY_TYPES") {
        facility_types_schema()
    } else if upper.contains("FROM FACILITIES") {
        facilities_schema()
    } else if upper.contains("FROM RESERVATIONS") {
        reservations_schema()
    } else if upper.contains("FROM HOLDS") {
        holds_schema()
    } else if upper.contains("FROM MAINTENANCE") {
        maintenance_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for AtriumHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AtriumQueryParser;

#[async_trait]
impl QueryParser for AtriumQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AtriumHandler {
    type Statement = String;
    type QueryParser = AtriumQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
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
            schema_for_statement(&target.statement),
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
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
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
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

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

pub struct AtriumFactory {
    handler: Arc<AtriumHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AtriumAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AtriumFactory {
    pub fn new(orgs: Arc<OrgManager>, password: String) -> Self {
        let auth_source = AtriumAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AtriumHandler::new(orgs)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AtriumFactory {
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

/// Serve one TCP connection: optional TLS, then the pgwire protocol.
pub async fn process_connection(
    socket: TcpStream,
    orgs: Arc<OrgManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> Result<(), std::io::Error> {
    let factory = Arc::new(AtriumFactory::new(orgs, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

/// Error code classes: conflicts are retryable (40001), duplicates map to
/// unique-violation (23505), not-found to no-data (P0002), exhausted
/// inventory to insufficient-resources (53000), timeouts to cancelled
/// (57014). Everything else is a generic raised exception.
fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::HoldConflict { .. }
        | EngineError::ReservationConflict { .. }
        | EngineError::AssignmentRace { .. } => "40001",
        EngineError::DuplicateReservation { .. } => "23505",
        EngineError::NotFound(_) | EngineError::UnknownFacilityType(_) => "P0002",
        EngineError::NoAvailability { .. } => "53000",
        EngineError::Timeout(_) => "57014",
        _ => "P0001",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
