use crate::error::{AdminError, AdminResult};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scope::AccessScope;
use crate::structure::YearSemesterOverride;
use rusqlite::Connection;
use serde_json::{Map, Value};

/// Runs a handler body against the open workspace and renders its result.
pub fn with_db(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection) -> AdminResult<Value>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn param<'a>(req: &'a Request, key: &str) -> AdminResult<Option<&'a Value>> {
    match &req.params {
        Value::Object(m) => Ok(m.get(key)),
        Value::Null => Ok(None),
        _ => Err(AdminError::bad_params("params must be an object")),
    }
}

pub fn str_param<'a>(req: &'a Request, key: &str) -> AdminResult<&'a str> {
    opt_str(req, key)?.ok_or_else(|| AdminError::bad_params(format!("missing {key}")))
}

pub fn opt_str<'a>(req: &'a Request, key: &str) -> AdminResult<Option<&'a str>> {
    match param(req, key)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AdminError::bad_params(format!("{key} must be a string"))),
    }
}

pub fn opt_bool(req: &Request, key: &str) -> AdminResult<Option<bool>> {
    match param(req, key)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        // Query-string style flags.
        Some(Value::String(s)) if s == "true" => Ok(Some(true)),
        Some(Value::String(s)) if s == "false" => Ok(Some(false)),
        Some(_) => Err(AdminError::bad_params(format!("{key} must be boolean"))),
    }
}

pub fn opt_i64(req: &Request, key: &str) -> AdminResult<Option<i64>> {
    match param(req, key)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| AdminError::bad_params(format!("{key} must be an integer"))),
    }
}

pub fn opt_f64(req: &Request, key: &str) -> AdminResult<Option<f64>> {
    match param(req, key)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| AdminError::bad_params(format!("{key} must be a number"))),
    }
}

/// Absent leaves a field alone, `null` clears it.
pub fn nullable<T>(
    req: &Request,
    key: &str,
    parse: impl FnOnce(&Value) -> Option<T>,
    expected: &str,
) -> AdminResult<Option<Option<T>>> {
    match param(req, key)? {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => parse(v)
            .map(|t| Some(Some(t)))
            .ok_or_else(|| AdminError::bad_params(format!("{key} must be {expected}"))),
    }
}

pub fn nullable_str(req: &Request, key: &str) -> AdminResult<Option<Option<String>>> {
    nullable(req, key, |v| v.as_str().map(str::to_string), "a string or null")
}

pub fn nullable_i64(req: &Request, key: &str) -> AdminResult<Option<Option<i64>>> {
    nullable(req, key, Value::as_i64, "an integer or null")
}

pub fn overrides(
    req: &Request,
    key: &str,
) -> AdminResult<Option<Option<Vec<YearSemesterOverride>>>> {
    nullable(
        req,
        key,
        |v| serde_json::from_value(v.clone()).ok(),
        "a list of {year, semesters}",
    )
}

pub fn object_param<'a>(req: &'a Request, key: &str) -> AdminResult<&'a Map<String, Value>> {
    param(req, key)?
        .and_then(Value::as_object)
        .ok_or_else(|| AdminError::bad_params(format!("missing object {key}")))
}

pub fn metadata(req: &Request) -> AdminResult<Option<Value>> {
    match param(req, "metadata")? {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Object(_)) => Ok(Some(v.clone())),
        Some(_) => Err(AdminError::bad_params("metadata must be an object")),
    }
}

/// The caller's access scope. Without one the caller is the trusted gateway
/// acting unrestricted.
pub fn scope(req: &Request) -> AdminResult<AccessScope> {
    match param(req, "scope")? {
        None | Some(Value::Null) => Ok(AccessScope::unrestricted()),
        Some(v @ Value::Object(_)) => serde_json::from_value(v.clone())
            .map_err(|e| AdminError::bad_params(format!("scope is malformed: {e}"))),
        Some(_) => Err(AdminError::bad_params("scope must be an object")),
    }
}

pub fn to_value<T: serde::Serialize>(v: &T) -> AdminResult<Value> {
    serde_json::to_value(v).map_err(|e| AdminError::bad_params(e.to_string()))
}
