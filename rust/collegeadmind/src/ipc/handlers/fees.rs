use crate::error::{AdminError, AdminResult};
use crate::fees::{
    create_fee_header, list_fee_headers, list_student_fees, upsert_student_fee, FeeUpsert,
};
use crate::ipc::helpers::{opt_f64, opt_i64, opt_str, scope, str_param, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn headers_list(conn: &Connection, _req: &Request) -> AdminResult<Value> {
    Ok(json!({ "feeHeaders": list_fee_headers(conn)? }))
}

fn headers_create(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let header = create_fee_header(conn, str_param(req, "name")?, opt_str(req, "description")?)?;
    Ok(json!({ "feeHeader": header }))
}

fn student_upsert(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let required = |key: &str| -> AdminResult<i64> {
        opt_i64(req, key)?.ok_or_else(|| AdminError::bad_params(format!("missing {key}")))
    };
    let fee = FeeUpsert {
        student_id: str_param(req, "studentId")?.to_string(),
        fee_header_id: str_param(req, "feeHeaderId")?.to_string(),
        year: required("year")?,
        semester: required("semester")?,
        amount: opt_f64(req, "amount")?
            .ok_or_else(|| AdminError::bad_params("missing amount"))?,
        paid_amount: opt_f64(req, "paidAmount")?.unwrap_or(0.0),
    };
    let saved = upsert_student_fee(conn, &scope(req)?, &fee)?;
    Ok(json!({ "fee": saved }))
}

fn student_list(conn: &Connection, req: &Request) -> AdminResult<Value> {
    let fees = list_student_fees(conn, &scope(req)?, str_param(req, "studentId")?)?;
    Ok(json!({ "fees": fees }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let handler: fn(&Connection, &Request) -> AdminResult<Value> = match req.method.as_str() {
        "fees.headers.list" => headers_list,
        "fees.headers.create" => headers_create,
        "fees.student.upsert" => student_upsert,
        "fees.student.list" => student_list,
        _ => return None,
    };
    Some(with_db(state, req, |conn| handler(conn, req)))
}
