//! Generic database browser for the internal admin surface.
//!
//! Table and column names are validated against `information_schema` before
//! they are interpolated, and any column whose name looks credential-like is
//! masked in row output.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::AppState;

const SENSITIVE_PATTERNS: &[&str] = &["password", "hash", "secret", "api_key", "token", "private_key"];

fn is_sensitive_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Serialize)]
struct TableInfo {
    name: String,
    row_count: i64,
}

/// GET /admin/db/tables
#[tracing::instrument(skip_all)]
pub async fn list_tables(State(state): State<AppState>) -> Result<Json<Value>> {
    let schema = &state.config.database.schema;

    let tables = sqlx::query_as::<_, (String, i64)>(
        "SELECT t.table_name, COALESCE(s.n_live_tup, 0)::int8 AS row_count \
         FROM information_schema.tables t \
         LEFT JOIN pg_stat_user_tables s \
           ON s.schemaname = t.table_schema AND s.relname = t.table_name \
         WHERE t.table_schema = $1 AND t.table_type = 'BASE TABLE' \
         ORDER BY t.table_name",
    )
    .bind(schema)
    .fetch_all(&state.db)
    .await
    .map_err(|e| Error::Database(e.into()))?;

    let tables: Vec<TableInfo> = tables
        .into_iter()
        .map(|(name, row_count)| TableInfo { name, row_count })
        .collect();

    Ok(Json(json!({ "tables": tables })))
}

#[derive(Debug, Serialize)]
struct ColumnInfo {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_length: Option<i32>,
    is_primary: bool,
}

/// GET /admin/db/tables/{table}/schema
#[tracing::instrument(skip_all)]
pub async fn get_table_schema(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<Value>> {
    let schema = &state.config.database.schema;
    ensure_table_exists(&state, &table).await?;

    let columns = sqlx::query_as::<_, (String, String, String, Option<String>, Option<i32>)>(
        "SELECT column_name, data_type, is_nullable, column_default, character_maximum_length \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(schema)
    .bind(&table)
    .fetch_all(&state.db)
    .await
    .map_err(|e| Error::Database(e.into()))?;

    let primary_keys = get_primary_keys(&state, &table).await?;

    let columns: Vec<ColumnInfo> = columns
        .into_iter()
        .map(|(name, data_type, is_nullable, default, max_length)| ColumnInfo {
            is_primary: primary_keys.contains(&name),
            nullable: is_nullable == "YES",
            name,
            data_type,
            default,
            max_length,
        })
        .collect();

    Ok(Json(json!({ "table": table, "columns": columns })))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RowsQuery {
    page: i64,
    page_size: i64,
    search: String,
    sort_by: String,
    sort_order: String,
}

impl Default for RowsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            search: String::new(),
            sort_by: String::new(),
            sort_order: "desc".to_string(),
        }
    }
}

/// GET /admin/db/tables/{table}/rows?page&page_size&search&sort_by&sort_order
#[tracing::instrument(skip_all)]
pub async fn query_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<RowsQuery>,
) -> Result<Json<Value>> {
    let schema = state.config.database.schema.clone();
    ensure_table_exists(&state, &table).await?;

    let page = query.page.max(1);
    let page_size = if (1..=100).contains(&query.page_size) {
        query.page_size
    } else {
        50
    };
    let sort_order = if query.sort_order == "asc" { "ASC" } else { "DESC" };

    let columns = get_column_meta(&state, &table).await?;
    if columns.is_empty() {
        return Err(Error::Internal {
            operation: "read column info".to_string(),
        });
    }

    if !query.sort_by.is_empty() && !columns.iter().any(|c| c.0 == query.sort_by) {
        return Err(Error::BadRequest {
            message: format!("invalid sort_by column: {:?}", query.sort_by),
        });
    }

    let qualified = format!("\"{schema}\".\"{table}\"");

    // search applies to text-ish columns only
    let mut where_sql = String::new();
    let has_search = !query.search.is_empty();
    if has_search {
        let conditions: Vec<String> = columns
            .iter()
            .filter(|(_, is_text)| *is_text)
            .map(|(name, _)| format!("\"{name}\"::text ILIKE '%' || $1 || '%'"))
            .collect();
        if !conditions.is_empty() {
            where_sql = format!("WHERE ({})", conditions.join(" OR "));
        }
    }
    let binds_search = !where_sql.is_empty();

    let count_sql = format!("SELECT COUNT(*) FROM {qualified} {where_sql}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if binds_search {
        count_query = count_query.bind(&query.search);
    }
    let total = count_query
        .fetch_one(&state.db)
        .await
        .map_err(|e| Error::Database(e.into()))?;

    let order_sql = if query.sort_by.is_empty() {
        String::new()
    } else {
        format!("ORDER BY \"{}\" {sort_order}", query.sort_by)
    };

    let (limit_idx, offset_idx) = if binds_search { (2, 3) } else { (1, 2) };
    let data_sql = format!(
        "SELECT * FROM {qualified} {where_sql} {order_sql} LIMIT ${limit_idx} OFFSET ${offset_idx}"
    );

    let mut data_query = sqlx::query(&data_sql);
    if binds_search {
        data_query = data_query.bind(&query.search);
    }
    data_query = data_query.bind(page_size).bind((page - 1) * page_size);

    let rows = data_query
        .fetch_all(&state.db)
        .await
        .map_err(|e| Error::Database(e.into()))?;

    let results: Vec<Value> = rows.iter().map(row_to_json).collect();

    Ok(Json(json!({
        "table": table,
        "rows": results,
        "total": total,
        "page": page,
        "page_size": page_size,
    })))
}

fn row_to_json(row: &PgRow) -> Value {
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = if is_sensitive_column(&name) {
            Value::String("***".to_string())
        } else {
            column_value(row, idx)
        };
        object.insert(name, value);
    }
    Value::Object(object)
}

/// Decode one column into JSON by its Postgres type name. Unknown types are
/// rendered as a type marker rather than failing the whole row.
fn column_value(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        _ => {}
    }

    let type_name = row.columns()[idx].type_info().name().to_string();
    match type_name.as_str() {
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<String, _>(idx)
            .map(Value::String)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Uuid, _>(idx)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "INT8" => row.try_get::<i64, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "BOOL" => row.try_get::<bool, _>(idx).map(|v| json!(v)).unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).unwrap_or(Value::Null),
        other => Value::String(format!("<{other}>")),
    }
}

async fn ensure_table_exists(state: &AppState, table: &str) -> Result<()> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS( \
             SELECT 1 FROM information_schema.tables \
             WHERE table_schema = $1 AND table_name = $2 AND table_type = 'BASE TABLE')",
    )
    .bind(&state.config.database.schema)
    .bind(table)
    .fetch_one(&state.db)
    .await
    .map_err(|e| Error::Database(e.into()))?;

    if !exists {
        return Err(Error::NotFound {
            resource: "table".to_string(),
            id: table.to_string(),
        });
    }
    Ok(())
}

async fn get_primary_keys(state: &AppState, table: &str) -> Result<Vec<String>> {
    let keys = sqlx::query_scalar::<_, String>(
        "SELECT kcu.column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         WHERE tc.table_schema = $1 AND tc.table_name = $2 AND tc.constraint_type = 'PRIMARY KEY'",
    )
    .bind(&state.config.database.schema)
    .bind(table)
    .fetch_all(&state.db)
    .await
    .map_err(|e| Error::Database(e.into()))?;

    Ok(keys)
}

/// (column name, is searchable text type)
async fn get_column_meta(state: &AppState, table: &str) -> Result<Vec<(String, bool)>> {
    let columns = sqlx::query_as::<_, (String, String)>(
        "SELECT column_name, data_type \
         FROM information_schema.columns \
         WHERE table_schema = $1 AND table_name = $2 \
         ORDER BY ordinal_position",
    )
    .bind(&state.config.database.schema)
    .bind(table)
    .fetch_all(&state.db)
    .await
    .map_err(|e| Error::Database(e.into()))?;

    Ok(columns
        .into_iter()
        .map(|(name, data_type)| {
            let is_text =
                data_type.contains("char") || data_type.contains("text") || data_type == "uuid";
            (name, is_text)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_column_matching() {
        assert!(is_sensitive_column("api_key"));
        assert!(is_sensitive_column("password_hash"));
        assert!(is_sensitive_column("INTERNAL_SECRET"));
        assert!(is_sensitive_column("refresh_token"));
        assert!(is_sensitive_column("ssh_private_key"));
        assert!(!is_sensitive_column("public_key_fingerprint_display"));
        assert!(!is_sensitive_column("user_id"));
        assert!(!is_sensitive_column("status"));
    }
}
