//! Translation of raw backend responses into [`StatusModel`].
//!
//! Two response shapes exist: the submission/process-result shape (where a
//! `result` list means "interrupted") and the thread-state shape (where
//! interrupts arrive under `interrupts[0].value.message`). Which one a poll
//! uses is fixed per client by [`PollSource`].
//!
//! Precedence when several markers are present: error, then interrupt, then
//! the "still working" marker, then completion.

use serde::Deserialize;
use serde_json::Value;

use super::model::{JobState, StatusModel};
use crate::backend::{PollSource, ProtocolError, RawResponse};

const OK: u16 = 200;
const ACCEPTED: u16 = 202;
const UNAUTHORIZED: u16 = 401;

/// Response body fields shared by both shapes. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct ResponseBody {
    #[serde(default, alias = "job_id")]
    thread_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    current_node: Option<String>,
    #[serde(default)]
    interrupts: Option<Vec<InterruptEntry>>,
}

#[derive(Debug, Deserialize)]
struct InterruptEntry {
    #[serde(default)]
    value: Option<InterruptValue>,
}

#[derive(Debug, Deserialize)]
struct InterruptValue {
    #[serde(default)]
    message: Option<Value>,
}

/// Map the response of a submission (or feedback) request.
///
/// `known_job_id` is used when the body omits the job identifier, which the
/// backend does for accepted feedback. A fresh submission must carry one.
pub fn map_submit_response(
    raw: &RawResponse,
    known_job_id: Option<&str>,
) -> Result<StatusModel, ProtocolError> {
    check_status(raw)?;
    let body = parse_body(raw)?;
    let job_id = body
        .thread_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| known_job_id.map(str::to_owned))
        .ok_or(ProtocolError::MissingJobId)?;

    if raw.status == ACCEPTED {
        return Ok(StatusModel::processing(job_id));
    }
    map_process_body(body, job_id)
}

/// Map the response of a poll against `job_id`, using the shape of `source`.
pub fn map_poll_response(
    source: PollSource,
    raw: &RawResponse,
    job_id: &str,
) -> Result<StatusModel, ProtocolError> {
    check_status(raw)?;
    if raw.status == ACCEPTED {
        return Ok(StatusModel::processing(job_id));
    }
    let body = parse_body(raw)?;
    let job_id = body
        .thread_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| job_id.to_owned());

    match source {
        PollSource::ProcessResult => map_process_body(body, job_id),
        PollSource::ThreadState => map_thread_state_body(body, job_id),
    }
}

/// Remove the artifact marker `@` where it directly precedes a URL scheme.
pub fn strip_artifact_prefix(message: &str) -> String {
    message
        .replace("@https://", "https://")
        .replace("@http://", "http://")
}

fn check_status(raw: &RawResponse) -> Result<(), ProtocolError> {
    match raw.status {
        OK | ACCEPTED => Ok(()),
        UNAUTHORIZED => Err(ProtocolError::Unauthorized),
        status => Err(ProtocolError::UnexpectedStatus {
            status,
            body: raw.body.clone(),
        }),
    }
}

fn parse_body(raw: &RawResponse) -> Result<ResponseBody, ProtocolError> {
    if raw.body.trim().is_empty() {
        // An accepted marker may legitimately come without a body.
        return if raw.status == ACCEPTED {
            Ok(ResponseBody::default())
        } else {
            Err(ProtocolError::MalformedBody("empty body".into()))
        };
    }
    let value: Value = serde_json::from_str(&raw.body)
        .map_err(|e| ProtocolError::MalformedBody(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedBody(e.to_string()))
}

fn map_process_body(body: ResponseBody, job_id: String) -> Result<StatusModel, ProtocolError> {
    let state = if let Some(error) = body.error {
        JobState::Failed {
            error: stringify_error(error),
        }
    } else if let Some(messages) = body.result.as_ref().map(interrupt_list).transpose()?.flatten() {
        JobState::Interrupted {
            interrupt_messages: messages,
        }
    } else if is_pending(body.status.as_deref()) {
        return Ok(StatusModel::processing(job_id));
    } else {
        JobState::Completed {
            result: body.result.unwrap_or(Value::Null),
        }
    };

    Ok(StatusModel {
        job_id,
        session_id: body.session_id.unwrap_or_default(),
        state,
        current_stage: body.current_node,
    })
}

fn map_thread_state_body(
    body: ResponseBody,
    job_id: String,
) -> Result<StatusModel, ProtocolError> {
    let first_interrupt = body.interrupts.and_then(|entries| entries.into_iter().next());

    let state = if let Some(error) = body.error {
        JobState::Failed {
            error: stringify_error(error),
        }
    } else if let Some(entry) = first_interrupt {
        let messages = entry
            .value
            .and_then(|v| v.message)
            .as_ref()
            .map(interrupt_list)
            .transpose()?
            .flatten()
            .ok_or_else(|| ProtocolError::InvalidInterrupt("interrupt without messages".into()))?;
        JobState::Interrupted {
            interrupt_messages: messages,
        }
    } else {
        match body.status.as_deref() {
            Some("failed") => JobState::Failed {
                error: "processing failed".into(),
            },
            Some("pending" | "processing" | "running") => JobState::Processing,
            _ => JobState::Completed {
                result: body.result.unwrap_or(Value::Null),
            },
        }
    };

    Ok(StatusModel {
        job_id,
        session_id: if state == JobState::Processing {
            String::new()
        } else {
            body.session_id.unwrap_or_default()
        },
        state,
        current_stage: body.current_node,
    })
}

/// A non-empty list of strings is an interrupt; anything else is not.
fn interrupt_list(value: &Value) -> Result<Option<Vec<String>>, ProtocolError> {
    let Value::Array(items) = value else {
        return Ok(None);
    };
    if items.is_empty() {
        return Ok(None);
    }
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(strip_artifact_prefix(s)),
            other => Err(ProtocolError::InvalidInterrupt(format!(
                "expected string entry, got {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn is_pending(status: Option<&str>) -> bool {
    matches!(status, Some("pending"))
}

fn stringify_error(error: Value) -> String {
    match error {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
