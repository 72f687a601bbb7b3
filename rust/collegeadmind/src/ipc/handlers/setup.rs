use crate::error::{AdminError, AdminResult};
use crate::ipc::helpers::{object_param, str_param, with_db};
use crate::ipc::types::{AppState, Request};
use crate::setup::{load_section, update_section, SetupSection};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

fn setup_get(conn: &Connection, _req: &Request) -> AdminResult<Value> {
    let mut out = Map::new();
    for section in SetupSection::ALL {
        out.insert(section.name().to_string(), load_section(conn, section)?);
    }
    Ok(Value::Object(out))
}

fn setup_update(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let name = str_param(req, "section")?;
    let section = SetupSection::parse(name)
        .ok_or_else(|| AdminError::bad_params(format!("unknown setup section: {name}")))?;
    let patch = object_param(req, "patch")?;
    let updated = update_section(conn, section, patch)?;
    Ok(json!({ "section": section.name(), "value": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "setup.get" => setup_get,
        "setup.update" => setup_update,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
