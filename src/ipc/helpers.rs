use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value as JsonValue;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, JsonValue> {
    parse_opt_string(req.params.get(key))
        .map_err(|m| err(&req.id, "bad_params", format!("{} {}", key, m), None))
}

pub fn required_bool(req: &Request, key: &str) -> Result<bool, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None))
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None))
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

/// Optional string array; duplicates and blanks are dropped, order kept.
pub fn parse_opt_string_array(v: Option<&JsonValue>) -> Result<Option<Vec<String>>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of strings")?;
            let mut out: Vec<String> = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item
                    .as_str()
                    .ok_or("must be array of strings")?
                    .trim()
                    .to_string();
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            Ok(Some(out))
        }
    }
}

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Check a row exists, replying `not_found` (or the query error) when it doesn't.
pub fn ensure_exists(
    conn: &Connection,
    req: &Request,
    table: &str,
    id: &str,
    label: &str,
) -> Result<(), JsonValue> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    match conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
    {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(err(&req.id, "not_found", format!("{} not found", label), None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}
