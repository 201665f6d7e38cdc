use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::frame::RawFrame;

/// Semantic meaning of a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassifiedEvent {
    /// Progress message, optionally positioned as step `index` of `total`.
    Notification {
        message: String,
        index: Option<f64>,
        total: Option<f64>,
    },
    /// Generation finished; `payload` is passed through untouched.
    Completed { payload: Map<String, Value> },
    /// Generation failed.
    Failed { message: String },
    /// Unknown event name or malformed payload. Kept for diagnostics only.
    Unrecognized { raw: RawFrame },
}

impl ClassifiedEvent {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Short name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notification { .. } => "notification",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[derive(Deserialize)]
struct NotificationData {
    message: String,
    #[serde(default)]
    index: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorData {
    message: String,
}

/// Maps a frame to its semantic event. Never fails: anything that does not
/// match the expected shape becomes `Unrecognized`.
pub fn classify(frame: RawFrame) -> ClassifiedEvent {
    let object = match serde_json::from_str::<Value>(&frame.data) {
        Ok(Value::Object(object)) => object,
        _ => return ClassifiedEvent::Unrecognized { raw: frame },
    };

    match frame.event_name.as_str() {
        "notification" => match serde_json::from_value::<NotificationData>(Value::Object(object)) {
            Ok(data) => ClassifiedEvent::Notification {
                message: data.message,
                index: data.index,
                total: data.total,
            },
            Err(_) => ClassifiedEvent::Unrecognized { raw: frame },
        },
        "completed" => {
            let payload = match object.get("body") {
                Some(Value::Object(body)) => body.clone(),
                _ => object,
            };
            ClassifiedEvent::Completed { payload }
        }
        "error" => match serde_json::from_value::<ErrorData>(Value::Object(object)) {
            Ok(data) => ClassifiedEvent::Failed {
                message: data.message,
            },
            Err(_) => ClassifiedEvent::Unrecognized { raw: frame },
        },
        _ => ClassifiedEvent::Unrecognized { raw: frame },
    }
}
