//! Line protocol spoken with the Python bridge.
//!
//! Requests are single-line JSON objects written to Blender's stdin:
//!
//! ```text
//! {"id":7,"op":"find_object","name":"Rock_Low"}
//! ```
//!
//! Responses are single-line JSON objects on stdout, prefixed so they can be
//! told apart from Blender's own output:
//!
//! ```text
//! @@xbake {"id":7,"ok":true,"result":"Rock_Low"}
//! @@xbake {"id":8,"ok":false,"kind":"render","error":"No active image"}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{BlenderError, BlenderResult};

/// Prefix marking a bridge response line.
pub const RESPONSE_PREFIX: &str = "@@xbake ";

/// A bridge response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
    /// Failure classification, e.g. `object_not_found` or `render`.
    #[serde(default)]
    pub kind: Option<String>,
}

impl Response {
    /// Converts the response into its result value or a bridge error.
    pub fn into_result(self, op: &str) -> BlenderResult<Value> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(BlenderError::bridge(
                op,
                self.kind,
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// Encodes a request line. `args` must be a JSON object or null.
pub fn encode_request(id: u64, op: &str, args: Value) -> BlenderResult<String> {
    let mut request = Map::new();
    request.insert("id".to_string(), Value::from(id));
    request.insert("op".to_string(), Value::from(op));
    match args {
        Value::Object(fields) => request.extend(fields),
        Value::Null => {}
        other => {
            request.insert("args".to_string(), other);
        }
    }
    serde_json::to_string(&Value::Object(request)).map_err(BlenderError::EncodeRequest)
}

/// Parses one stdout line. Returns `None` for lines that are not responses.
pub fn parse_line(line: &str) -> Option<BlenderResult<Response>> {
    let payload = line.trim_end().strip_prefix(RESPONSE_PREFIX)?;
    Some(serde_json::from_str(payload).map_err(BlenderError::ParseResponse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_encode_flattens_arguments() {
        let line = encode_request(3, "set_hide_render", json!({"object": "Rock", "hidden": true}))
            .unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"id": 3, "op": "set_hide_render", "object": "Rock", "hidden": true})
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_encode_without_arguments() {
        let line = encode_request(1, "selection", Value::Null).unwrap();
        assert_eq!(line, r#"{"id":1,"op":"selection"}"#);
    }

    #[test]
    fn test_parse_ignores_chatter() {
        assert!(parse_line("Fra:1 Mem:12.00M | Baking").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_parse_success_and_failure() {
        let ok = parse_line("@@xbake {\"id\":2,\"ok\":true,\"result\":[1,2]}\n")
            .unwrap()
            .unwrap();
        assert_eq!(ok.id, 2);
        assert_eq!(ok.into_result("x").unwrap(), json!([1, 2]));

        let failed = parse_line(r#"@@xbake {"id":4,"ok":false,"kind":"render","error":"boom"}"#)
            .unwrap()
            .unwrap();
        let err = failed.into_result("bake").unwrap_err();
        assert_eq!(err.to_string(), "bake failed: boom");
    }

    #[test]
    fn test_parse_malformed_response() {
        let parsed = parse_line("@@xbake {not json").unwrap();
        assert!(matches!(parsed, Err(BlenderError::ParseResponse(_))));
    }
}
