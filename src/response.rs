use axum::Json;
use serde::Serialize;

/// Outcome marker carried by every JSON body.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Error")]
    Error,
}

/// Success body: `{"status": "OK", ...fields of T}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    #[serde(flatten)]
    pub data: T,
}

/// Error body: `{"status": "Error", "error": "...", "errors": [...]}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: Status,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: Status::Ok,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Greeting {
        message: &'static str,
    }

    #[test]
    fn envelope_flattens_payload_next_to_status() {
        let Json(body) = ok(Greeting { message: "hi" });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "OK", "message": "hi" }));
    }

    #[test]
    fn error_body_omits_empty_field_list() {
        let body = ErrorBody {
            status: Status::Error,
            error: "user not found".into(),
            errors: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "Error", "error": "user not found" }));
    }
}
