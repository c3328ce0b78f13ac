use rust_decimal::Decimal;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;
use crate::pricing::PriceUnit;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRateType {
        id: Ulid,
        name: String,
        tax: Decimal,
        discount: Decimal,
    },
    InsertFacilityType {
        id: Ulid,
        name: String,
        category: FacilityCategory,
        price: Decimal,
        rate_type_id: Option<Ulid>,
        metadata: CategoryMetadata,
    },
    InsertFacility {
        id: Ulid,
        type_id: Ulid,
        name: String,
        location: Option<String>,
    },
    RetireFacility {
        id: Ulid,
    },
    InsertReservation {
        id: Ulid,
        facility_id: Option<Ulid>,
        type_name: Option<String>,
        window: DateRange,
        guests: u32,
        status: Option<ReservationStatus>,
    },
    UpdateReservationStatus {
        id: Ulid,
        status: ReservationStatus,
    },
    UpdateReservationWindow {
        id: Ulid,
        window: DateRange,
    },
    RecordStay {
        id: Ulid,
        check_in: Option<Ms>,
        check_out: Option<Ms>,
    },
    InsertMaintenance {
        id: Ulid,
        facility_id: Ulid,
        status: MaintenanceStatus,
        window: MaintenanceWindow,
    },
    UpdateMaintenanceStatus {
        id: Ulid,
        status: MaintenanceStatus,
    },
    InsertHold {
        id: Ulid,
        facility_id: Option<Ulid>,
        type_name: Option<String>,
        window: DateRange,
        guest_id: String,
        frontdesk_id: String,
        session_id: String,
        guests: u32,
        ttl_ms: Option<Ms>,
    },
    CancelHold {
        id: Ulid,
    },
    Assign {
        reservation_id: Ulid,
        window: Option<DateRange>,
    },
    AssignBatch {
        reservation_ids: Vec<Ulid>,
    },
    ConfirmHold {
        hold_id: Ulid,
        reservation_id: Ulid,
    },
    SweepHolds,
    Quote {
        type_name: String,
        window: DateRange,
        unit: PriceUnit,
        override_price: Option<Decimal>,
    },
    SelectAvailability {
        window: DateRange,
        type_name: Option<String>,
        filters: Vec<FilterGroup>,
    },
    SelectFacilityTypes,
    SelectFacilities {
        type_id: Option<Ulid>,
    },
    SelectReservations {
        type_id: Option<Ulid>,
    },
    SelectHolds {
        type_id: Option<Ulid>,
    },
    SelectMaintenance {
        type_id: Option<Ulid>,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rate_types" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("rate_types", 4, values.len()));
            }
            Ok(Command::InsertRateType {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                tax: parse_decimal(&values[2])?,
                discount: parse_decimal(&values[3])?,
            })
        }
        "facility_types" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("facility_types", 4, values.len()));
            }
            let category_str = parse_string(&values[2])?;
            let category = FacilityCategory::parse(&category_str)
                .ok_or_else(|| SqlError::Parse(format!("unknown category: {category_str}")))?;
            let rate_type_id = if values.len() >= 5 {
                parse_ulid_or_null(&values[4])?
            } else {
                None
            };
            let metadata = parse_metadata(category, values.get(5))?;
            Ok(Command::InsertFacilityType {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                category,
                price: parse_decimal(&values[3])?,
                rate_type_id,
                metadata,
            })
        }
        "facilities" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("facilities", 3, values.len()));
            }
            let location = if values.len() >= 4 {
                parse_string_or_null(&values[3])?
            } else {
                None
            };
            Ok(Command::InsertFacility {
                id: parse_ulid(&values[0])?,
                type_id: parse_ulid(&values[1])?,
                name: parse_string(&values[2])?,
                location,
            })
        }
        "reservations" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("reservations", 6, values.len()));
            }
            let status = if values.len() >= 7 {
                let s = parse_string(&values[6])?;
                Some(
                    ReservationStatus::parse(&s)
                        .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?,
                )
            } else {
                None
            };
            Ok(Command::InsertReservation {
                id: parse_ulid(&values[0])?,
                facility_id: parse_ulid_or_null(&values[1])?,
                type_name: parse_string_or_null(&values[2])?,
                window: DateRange {
                    start: parse_i64(&values[3])?,
                    end: parse_i64(&values[4])?,
                },
                guests: parse_u32(&values[5])?,
                status,
            })
        }
        "maintenance" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("maintenance", 4, values.len()));
            }
            let status_str = parse_string(&values[2])?;
            let status = MaintenanceStatus::parse(&status_str)
                .ok_or_else(|| SqlError::Parse(format!("unknown status: {status_str}")))?;
            let start = parse_i64_or_null(&values[3])?;
            let end = if values.len() >= 5 {
                parse_i64_or_null(&values[4])?
            } else {
                None
            };
            let date = if values.len() >= 6 {
                parse_i64_or_null(&values[5])?
            } else {
                None
            };
            let window = match (start, end, date) {
                (Some(s), Some(e), _) => MaintenanceWindow::Range(DateRange { start: s, end: e }),
                (Some(s), None, _) => MaintenanceWindow::OpenEnded { start: s },
                (None, None, Some(d)) => MaintenanceWindow::Day { date: d },
                _ => {
                    return Err(SqlError::Parse(
                        "maintenance needs start, start+end, or date".into(),
                    ));
                }
            };
            Ok(Command::InsertMaintenance {
                id: parse_ulid(&values[0])?,
                facility_id: parse_ulid(&values[1])?,
                status,
                window,
            })
        }
        "holds" => {
            if values.len() < 9 {
                return Err(SqlError::WrongArity("holds", 9, values.len()));
            }
            let ttl_ms = if values.len() >= 10 {
                parse_i64_or_null(&values[9])?
            } else {
                None
            };
            Ok(Command::InsertHold {
                id: parse_ulid(&values[0])?,
                facility_id: parse_ulid_or_null(&values[1])?,
                type_name: parse_string_or_null(&values[2])?,
                window: DateRange {
                    start: parse_i64(&values[3])?,
                    end: parse_i64(&values[4])?,
                },
                guest_id: parse_string(&values[5])?,
                frontdesk_id: parse_string(&values[6])?,
                session_id: parse_string(&values[7])?,
                guests: parse_u32(&values[8])?,
                ttl_ms,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "facilities" => Ok(Command::RetireFacility { id }),
        "holds" => Ok(Command::CancelHold { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    let mut cols: Vec<(String, &Expr)> = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            ast::AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty assignment target".into()))?,
            _ => return Err(SqlError::Parse("unsupported assignment target".into())),
        };
        cols.push((col, &a.value));
    }
    let col_names: Vec<&str> = cols.iter().map(|(c, _)| c.as_str()).collect();

    match table.as_str() {
        "reservations" => match col_names.as_slice() {
            ["status"] => {
                let s = parse_string(cols[0].1)?;
                let status = ReservationStatus::parse(&s)
                    .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?;
                Ok(Command::UpdateReservationStatus { id, status })
            }
            ["start", "end"] => Ok(Command::UpdateReservationWindow {
                id,
                window: DateRange {
                    start: parse_i64(cols[0].1)?,
                    end: parse_i64(cols[1].1)?,
                },
            }),
            ["check_in"] => Ok(Command::RecordStay {
                id,
                check_in: parse_i64_or_null(cols[0].1)?,
                check_out: None,
            }),
            ["check_out"] => Ok(Command::RecordStay {
                id,
                check_in: None,
                check_out: parse_i64_or_null(cols[0].1)?,
            }),
            ["check_in", "check_out"] => Ok(Command::RecordStay {
                id,
                check_in: parse_i64_or_null(cols[0].1)?,
                check_out: parse_i64_or_null(cols[1].1)?,
            }),
            _ => Err(SqlError::Unsupported(format!(
                "UPDATE reservations SET {}",
                col_names.join(", ")
            ))),
        },
        "maintenance" => match col_names.as_slice() {
            ["status"] => {
                let s = parse_string(cols[0].1)?;
                let status = MaintenanceStatus::parse(&s)
                    .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?;
                Ok(Command::UpdateMaintenanceStatus { id, status })
            }
            _ => Err(SqlError::Unsupported(format!(
                "UPDATE maintenance SET {}",
                col_names.join(", ")
            ))),
        },
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    // Function-style operations: SELECT assign('...'), SELECT sweep_holds(), ...
    if select.from.is_empty() {
        return parse_function_select(select);
    }

    let table = table_factor_name(&select.from[0].relation)?;

    if table == "availability" {
        let (mut start, mut end, mut type_name, mut filters) = (None, None, None, Vec::new());
        if let Some(selection) = &select.selection {
            extract_availability_filters(
                selection,
                &mut start,
                &mut end,
                &mut type_name,
                &mut filters,
            )?;
        }
        return Ok(Command::SelectAvailability {
            window: DateRange {
                start: start.ok_or(SqlError::MissingFilter("start"))?,
                end: end.ok_or(SqlError::MissingFilter("end"))?,
            },
            type_name,
            filters,
        });
    }

    let type_id = extract_where_type_id(&select.selection)?;
    match table.as_str() {
        "facility_types" => Ok(Command::SelectFacilityTypes),
        "facilities" => Ok(Command::SelectFacilities { type_id }),
        "reservations" => Ok(Command::SelectReservations { type_id }),
        "holds" => Ok(Command::SelectHolds { type_id }),
        "maintenance" => Ok(Command::SelectMaintenance { type_id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_function_select(select: &ast::Select) -> Result<Command, SqlError> {
    let expr = match select.projection.first() {
        Some(ast::SelectItem::UnnamedExpr(e)) => e,
        _ => return Err(SqlError::Unsupported("SELECT without FROM".into())),
    };
    let func = match expr {
        Expr::Function(f) => f,
        _ => return Err(SqlError::Unsupported("SELECT without FROM".into())),
    };
    let name = object_name_last(&func.name)
        .ok_or_else(|| SqlError::Parse("empty function name".into()))?;
    let args = function_args(func)?;

    match name.as_str() {
        "assign" => {
            if args.is_empty() {
                return Err(SqlError::WrongArity("assign", 1, 0));
            }
            let window = if args.len() >= 3 {
                Some(DateRange {
                    start: parse_i64(args[1])?,
                    end: parse_i64(args[2])?,
                })
            } else {
                None
            };
            Ok(Command::Assign {
                reservation_id: parse_ulid(args[0])?,
                window,
            })
        }
        "assign_batch" => {
            if args.is_empty() {
                return Err(SqlError::WrongArity("assign_batch", 1, 0));
            }
            let reservation_ids = args
                .iter()
                .map(|a| parse_ulid(a))
                .collect::<Result<Vec<_>, SqlError>>()?;
            Ok(Command::AssignBatch { reservation_ids })
        }
        "confirm_hold" => {
            if args.len() < 2 {
                return Err(SqlError::WrongArity("confirm_hold", 2, args.len()));
            }
            Ok(Command::ConfirmHold {
                hold_id: parse_ulid(args[0])?,
                reservation_id: parse_ulid(args[1])?,
            })
        }
        "sweep_holds" => Ok(Command::SweepHolds),
        "quote" => {
            if args.len() < 3 {
                return Err(SqlError::WrongArity("quote", 3, args.len()));
            }
            let unit = if args.len() >= 4 {
                let s = parse_string(args[3])?;
                PriceUnit::parse(&s)
                    .ok_or_else(|| SqlError::Parse(format!("unknown price unit: {s}")))?
            } else {
                PriceUnit::Night
            };
            let override_price = if args.len() >= 5 {
                Some(parse_decimal(args[4])?)
            } else {
                None
            };
            Ok(Command::Quote {
                type_name: parse_string(args[0])?,
                window: DateRange {
                    start: parse_i64(args[1])?,
                    end: parse_i64(args[2])?,
                },
                unit,
                override_price,
            })
        }
        _ => Err(SqlError::Unsupported(format!("function {name}"))),
    }
}

fn function_args(func: &ast::Function) -> Result<Vec<&Expr>, SqlError> {
    match &func.args {
        ast::FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => Ok(e),
                other => Err(SqlError::Parse(format!("unsupported argument: {other}"))),
            })
            .collect(),
        ast::FunctionArguments::None => Ok(Vec::new()),
        ast::FunctionArguments::Subquery(_) => {
            Err(SqlError::Unsupported("subquery argument".into()))
        }
    }
}

fn extract_availability_filters(
    expr: &Expr,
    start: &mut Option<Ms>,
    end: &mut Option<Ms>,
    type_name: &mut Option<String>,
    filters: &mut Vec<FilterGroup>,
) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_availability_filters(left, start, end, type_name, filters)?;
                extract_availability_filters(right, start, end, type_name, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("start") => *start = Some(parse_i64_expr(right)?),
                Some("end") => *end = Some(parse_i64_expr(right)?),
                Some("type_name") => *type_name = Some(parse_string(right)?),
                Some("filters") => {
                    let raw = parse_string(right)?;
                    *filters = serde_json::from_str(&raw)
                        .map_err(|e| SqlError::Parse(format!("filters: {e}")))?;
                }
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start") {
                    *start = Some(parse_i64_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end") {
                    *end = Some(parse_i64_expr(right)?);
                }
            }
            _ => {}
        }
    }
    Ok(())
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn extract_where_type_id(selection: &Option<Expr>) -> Result<Option<Ulid>, SqlError> {
    let Some(sel) = selection.as_ref() else {
        return Ok(None);
    };
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("type_id") => {
            Ok(Some(parse_ulid_expr(right)?))
        }
        _ => Err(SqlError::MissingFilter("type_id")),
    }
}

fn parse_metadata(
    category: FacilityCategory,
    expr: Option<&Expr>,
) -> Result<CategoryMetadata, SqlError> {
    let payload: serde_json::Value = match expr {
        Some(e) => match parse_string_or_null(e)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|err| SqlError::Parse(format!("metadata: {err}")))?,
            None => serde_json::json!({}),
        },
        None => serde_json::json!({}),
    };
    let tagged = serde_json::json!({ category.as_str(): payload });
    serde_json::from_value(tagged).map_err(|e| SqlError::Parse(format!("metadata: {e}")))
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

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_expr(expr)
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(Some(
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))?,
            )),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    parse_i64_expr(expr)
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(parse_i64_expr(expr)?)),
        }
    } else {
        Ok(Some(parse_i64_expr(expr)?))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!(
                "expected string or NULL, got {value:?}"
            ))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad decimal: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
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
        }
    }
}

impl std::error::Error for SqlError {}
