//! Out-of-band body collection through a BiDi data collector

use serde::Deserialize;
use serde_json::{json, Value};

use crate::event::{BodyData, BytesValue};
use crate::transport::{Command, Driver};
use crate::{HarError, Result};

/// Body side requested from `network.getData`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Request body
    Request,
    /// Response body
    Response,
}

impl DataType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetDataResult {
    bytes: BytesValue,
}

/// Install a data collector for both bodies of the given contexts
///
/// # Errors
///
/// Returns error if the command fails or returns no collector id
pub async fn add_data_collector<D: Driver + ?Sized>(
    driver: &D,
    contexts: &[String],
    max_body_size: u64,
) -> Result<String> {
    let mut params = json!({
        "dataTypes": ["request", "response"],
        "maxEncodedDataSize": max_body_size,
    });
    if !contexts.is_empty() {
        params["contexts"] = json!(contexts);
    }

    let result = driver
        .send(Command::new("network.addDataCollector", params))
        .await?
        .into_result()?;

    result
        .get("collector")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HarError::Protocol("addDataCollector returned no collector".to_string()))
}

/// Remove a data collector
///
/// # Errors
///
/// Returns error if the command fails
pub async fn remove_data_collector<D: Driver + ?Sized>(driver: &D, collector: &str) -> Result<()> {
    driver
        .send(Command::new(
            "network.removeDataCollector",
            json!({ "collector": collector }),
        ))
        .await?
        .into_result()
        .map(|_| ())
}

/// Fetch one body side of a request
///
/// # Errors
///
/// Returns error if the command fails or the reply has no bytes
pub async fn get_data<D: Driver + ?Sized>(
    driver: &D,
    collector: &str,
    request_id: &str,
    data_type: DataType,
) -> Result<BytesValue> {
    let result = driver
        .send(Command::new(
            "network.getData",
            json!({
                "request": request_id,
                "dataType": data_type.as_str(),
                "collector": collector,
            }),
        ))
        .await?
        .into_result()?;

    let GetDataResult { bytes } = serde_json::from_value(result)?;
    Ok(bytes)
}

/// Fetch both bodies of a request. Failures are logged per side; a result
/// with neither side is reported as `None`.
pub async fn fetch_body_data<D: Driver + ?Sized>(
    driver: &D,
    collector: &str,
    request_id: &str,
    debug_logs: bool,
) -> Option<BodyData> {
    let mut body = BodyData::default();

    for data_type in [DataType::Request, DataType::Response] {
        match get_data(driver, collector, request_id, data_type).await {
            Ok(bytes) => {
                let side = match data_type {
                    DataType::Request => &mut body.request,
                    DataType::Response => &mut body.response,
                };
                *side = Some(bytes);
            }
            Err(e) => {
                warn_log!(debug_logs, %request_id, data_type = data_type.as_str(), "Failed to get body data: {e}");
            }
        }
    }

    if body.is_empty() {
        return None;
    }
    debug_log!(debug_logs, %request_id, "Collected body data");
    Some(body)
}
