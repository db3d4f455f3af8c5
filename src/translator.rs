//! Maps raw backend failures to readable errors.
//!
//! Backend messages carry framing the user should never see: the
//! `Command failed with error ...` prefix, the full response dump, the
//! credential record in authentication failures. Only the clause that
//! explains the failure is re-rendered.

use crate::backend::{codes, BackendError};
use crate::error::ReadableError;
use once_cell::sync::Lazy;
use regex::Regex;

pub const CONNECTION_TIMEOUT: &str =
    "Connection timed out. Please check if the datasource configuration fields have been filled correctly.";
pub const AUTHENTICATION_FAILED: &str = "Exception authenticating MongoCredential.";
pub const PERMISSION_DENIED: &str =
    "The user is not authorized to perform this operation. Please check the permissions of the database user.";
pub const TIME_LIMIT_EXCEEDED: &str = "The operation exceeded the time limit set on the server.";

static WRONG_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"BSON field '(?:[^'.]+\.)?([^']+)' is the wrong type '[^']*', expected type '([^']+)'")
        .unwrap()
});

static UNKNOWN_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"BSON field '(?:[^'.]+\.)?([^']+)' is an unknown field").unwrap()
});

static FIELD_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'[^']+' field must be [^.]+\.").unwrap());

static UNKNOWN_OPERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"unknown (?:top level )?operator: \$[A-Za-z0-9_]+").unwrap()
});

const ARGUMENT_CODES: [i32; 8] = [
    codes::BAD_VALUE,
    codes::FAILED_TO_PARSE,
    codes::TYPE_MISMATCH,
    codes::INVALID_LIMIT,
    codes::STAGE_NOT_SINGLE_FIELD,
    codes::UNRECOGNIZED_STAGE,
    codes::UNKNOWN_FIELD,
    codes::INVALID_REGEX,
];

/// Translate one backend failure. Rules are tried in order; the first match wins.
pub fn translate(err: &BackendError) -> ReadableError {
    let (code, message) = match err {
        BackendError::Security { .. } => {
            return ReadableError::Authentication(AUTHENTICATION_FAILED.to_string())
        }
        BackendError::Timeout(_) => return ReadableError::Timeout(CONNECTION_TIMEOUT.to_string()),
        BackendError::Connection(detail) => {
            return ReadableError::Execution(first_line(detail).to_string())
        }
        BackendError::Command { code, message, .. } => (*code, message.as_str()),
    };

    if err.is_unauthorized() {
        return ReadableError::Permission(PERMISSION_DENIED.to_string());
    }
    match code {
        codes::AUTHENTICATION_FAILED => {
            return ReadableError::Authentication(AUTHENTICATION_FAILED.to_string())
        }
        codes::MAX_TIME_MS_EXPIRED => {
            return ReadableError::Timeout(TIME_LIMIT_EXCEEDED.to_string())
        }
        _ => {}
    }

    if let Some(clause) = argument_clause(message) {
        return ReadableError::Argument(clause);
    }
    if ARGUMENT_CODES.contains(&code) {
        return ReadableError::Argument(first_sentence(message));
    }
    ReadableError::Execution(first_line(message).to_string())
}

/// Re-render the message shapes whose meaning lives in a single clause.
fn argument_clause(message: &str) -> Option<String> {
    if let Some(caps) = WRONG_TYPE.captures(message) {
        return Some(format!(
            "'{}' field must be of BSON type {}.",
            &caps[1], &caps[2]
        ));
    }
    if let Some(caps) = UNKNOWN_FIELD.captures(message) {
        return Some(format!("Unrecognized field '{}'.", &caps[1]));
    }
    if message.starts_with("Failed to parse") {
        if let Some(found) = FIELD_CLAUSE.find(message) {
            return Some(found.as_str().to_string());
        }
    }
    UNKNOWN_OPERATOR
        .find(message)
        .map(|found| found.as_str().to_string())
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

fn first_sentence(message: &str) -> String {
    let line = first_line(message);
    match line.find(". ") {
        Some(end) => line[..=end].to_string(),
        None => line.to_string(),
    }
}
