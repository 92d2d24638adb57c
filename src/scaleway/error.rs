//! Maps Scaleway failures onto [`CloudError`] kinds.

use scaleway_rs::ScalewayError;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::client::CloudError;

/// Error `type` values the API uses for resources that are busy changing
/// state.
const TRANSIENT_TYPES: &[&str] = &["conflict", "precondition_failed", "transient_state"];
const NOT_FOUND_TYPES: &[&str] = &["not_found", "unknown_resource"];

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    etype: String,
    #[serde(default)]
    message: String,
}

/// Classifies a non-success HTTP response.
///
/// 404 and `not_found` bodies become [`CloudErrorKind::NotFound`]; 409, 429,
/// 5xx and state-transition errors are transient; everything else is
/// permanent.
///
/// [`CloudErrorKind::NotFound`]: crate::client::CloudErrorKind::NotFound
#[must_use]
pub fn classify_response(status: u16, body: &[u8]) -> CloudError {
    let parsed: ApiErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let code = if parsed.etype.is_empty() {
        format!("http_{status}")
    } else {
        parsed.etype
    };
    let message = if parsed.message.is_empty() {
        String::from_utf8_lossy(body).into_owned()
    } else {
        parsed.message
    };
    classify(status, code, message)
}

fn classify(status: u16, code: String, message: String) -> CloudError {
    if status == 404 || NOT_FOUND_TYPES.contains(&code.as_str()) {
        CloudError::not_found(code, message)
    } else if matches!(status, 409 | 429 | 500..=599) || TRANSIENT_TYPES.contains(&code.as_str())
    {
        CloudError::transient(code, message)
    } else {
        CloudError::permanent(code, message)
    }
}

/// Classifies an SDK failure the same way as a raw response.
pub(super) fn from_sdk(error: ScalewayError) -> CloudError {
    match error {
        ScalewayError::Api(api_err) => classify(0, api_err.etype, api_err.message),
        other => CloudError::permanent("sdk_error", other.to_string()),
    }
}

/// Network failures may succeed on retry.
pub(super) fn transport(error: reqwest::Error) -> CloudError {
    CloudError::transient("http_transport", error.to_string())
}

pub(super) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, CloudError> {
    serde_json::from_slice(body)
        .map_err(|err| CloudError::permanent("invalid_response", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CloudErrorKind;
    use rstest::rstest;

    #[rstest]
    #[case(404, r#"{"type":"unknown_resource","message":"gone"}"#, CloudErrorKind::NotFound)]
    #[case(404, "", CloudErrorKind::NotFound)]
    #[case(409, r#"{"type":"conflict","message":"busy"}"#, CloudErrorKind::TransientConflict)]
    #[case(
        400,
        r#"{"type":"precondition_failed","message":"server is stopping"}"#,
        CloudErrorKind::TransientConflict
    )]
    #[case(503, "upstream unavailable", CloudErrorKind::TransientConflict)]
    #[case(
        400,
        r#"{"type":"invalid_arguments","message":"bad"}"#,
        CloudErrorKind::Permanent
    )]
    #[case(403, r#"{"type":"denied_authentication"}"#, CloudErrorKind::Permanent)]
    fn responses_are_classified(
        #[case] status: u16,
        #[case] body: &str,
        #[case] expected: CloudErrorKind,
    ) {
        assert_eq!(classify_response(status, body.as_bytes()).kind, expected);
    }

    #[test]
    fn unparsed_bodies_keep_status_code_and_text() {
        let err = classify_response(502, b"bad gateway");
        assert_eq!(err.code, "http_502");
        assert_eq!(err.message, "bad gateway");
    }

    #[test]
    fn decode_failures_are_permanent() {
        let result: Result<serde_json::Value, CloudError> = decode(b"not json");
        assert!(matches!(
            result,
            Err(CloudError {
                kind: CloudErrorKind::Permanent,
                ..
            })
        ));
    }
}
