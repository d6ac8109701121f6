use crate::error::EngineError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Map an engine failure onto the wire error shape.
pub fn engine_err(id: &str, e: &EngineError) -> serde_json::Value {
    match e {
        EngineError::DataAccess(inner) => {
            tracing::warn!(request_id = id, error = %inner, "data access failed")
        }
        other => tracing::debug!(request_id = id, error = %other, "request rejected"),
    }
    err(id, e.code(), e.to_string(), None)
}

/// Serialize a typed result, or report the (unexpected) serialization failure.
pub fn ok_json<T: serde::Serialize>(id: &str, key: &str, value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => {
            let mut result = serde_json::Map::new();
            result.insert(key.to_string(), v);
            ok(id, serde_json::Value::Object(result))
        }
        Err(e) => err(id, "internal", e.to_string(), None),
    }
}
