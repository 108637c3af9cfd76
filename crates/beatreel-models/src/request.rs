//! Render request parsing and validation.
//!
//! Raw request bodies are deserialized leniently into [`ExportRequestBody`]
//! so that every violated constraint can be reported at once, then
//! normalized into an immutable [`RenderRequest`].

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::frames::total_frames;
use crate::plan::{Plan, ResolutionProfile, FRAME_RATE};

/// Hard cap on requested video duration.
pub const MAX_DURATION_SECS: u32 = 600;

/// Audio containers the encoder accepts, by file extension.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "wav", "m4a", "aac", "ogg", "oga", "opus", "flac", "webm"];

/// MIME types accepted when the container is only named in the query string
/// (e.g. `response-content-type=audio/mpeg` on presigned URLs).
const AUDIO_MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/webm", "webm"),
];

/// Lower bound for `durationSec`.
const MIN_DURATION_SECS: i64 = 1;
const MAX_DURATION: i64 = MAX_DURATION_SECS as i64;

/// Raw `POST /export` body.
///
/// Deserialization never fails on a field's JSON type: a mistyped field is
/// recorded as a `type` violation and left empty, so the remaining fields
/// are still validated.
#[derive(Debug, Clone, Default, Validate)]
pub struct ExportRequestBody {
    #[validate(
        required(message = "audioUrl is required"),
        custom(function = "validate_audio_url")
    )]
    pub audio_url: Option<String>,

    #[validate(
        required(message = "durationSec is required"),
        range(min = MIN_DURATION_SECS, max = MAX_DURATION)
    )]
    pub duration_sec: Option<i64>,

    #[validate(
        required(message = "plan is required"),
        custom(function = "validate_plan")
    )]
    pub plan: Option<String>,

    #[validate(custom(function = "validate_image_url"))]
    pub bg_image_url: Option<String>,

    #[validate(length(min = 1, max = 128, message = "presetId must be 1-128 characters"))]
    pub preset_id: Option<String>,

    pub preset_params: Option<Map<String, Value>>,

    type_errors: Vec<FieldViolation>,
}

impl ExportRequestBody {
    /// Decode a JSON document field by field.
    pub fn from_json(value: Value) -> Self {
        let mut errors = Vec::new();
        let Value::Object(mut map) = value else {
            return Self {
                type_errors: vec![FieldViolation::new(
                    "body",
                    "type",
                    "request body must be a JSON object",
                )],
                ..Default::default()
            };
        };

        Self {
            audio_url: take_field(&mut map, "audioUrl", "a string", &mut errors),
            duration_sec: take_field(&mut map, "durationSec", "an integer", &mut errors),
            plan: take_field(&mut map, "plan", "a string", &mut errors),
            bg_image_url: take_field(&mut map, "bgImageUrl", "a string", &mut errors),
            preset_id: take_field(&mut map, "presetId", "a string", &mut errors),
            preset_params: take_field(&mut map, "presetParams", "an object", &mut errors),
            type_errors: errors,
        }
    }
}

impl<'de> Deserialize<'de> for ExportRequestBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

/// Remove `field` from `map`; `null` counts as absent.
fn take_field<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    field: &'static str,
    expected: &str,
    errors: &mut Vec<FieldViolation>,
) -> Option<T> {
    match map.remove(field) {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.push(FieldViolation::new(
                    field,
                    "type",
                    format!("{} must be {}", field, expected),
                ));
                None
            }
        },
    }
}

/// A single violated constraint, keyed by the wire field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl ExportRequestBody {
    /// Validate every field and normalize into a [`RenderRequest`].
    ///
    /// Returns all violations, sorted by field, when any constraint fails.
    pub fn into_render_request(mut self) -> Result<RenderRequest, Vec<FieldViolation>> {
        let mut violations = std::mem::take(&mut self.type_errors);
        if let Err(errors) = self.validate() {
            // A mistyped field is already reported; skip its `required` echo
            let rest: Vec<FieldViolation> = collect_violations(&errors)
                .into_iter()
                .filter(|v| !violations.iter().any(|t| t.field == v.field))
                .collect();
            violations.extend(rest);
        }
        if !violations.is_empty() {
            sort_violations(&mut violations);
            return Err(violations);
        }

        // Validation guarantees these parse; the fallbacks only keep the
        // conversion total.
        let audio_url = self
            .audio_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| vec![FieldViolation::new("audioUrl", "url", "audioUrl is required")])?;
        let duration_sec = self
            .duration_sec
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| {
                vec![FieldViolation::new("durationSec", "range", "durationSec is required")]
            })?;
        let plan = self
            .plan
            .as_deref()
            .and_then(|p| p.parse::<Plan>().ok())
            .ok_or_else(|| vec![FieldViolation::new("plan", "plan", "plan is required")])?;
        let bg_image_url = self.bg_image_url.as_deref().and_then(|u| Url::parse(u).ok());

        Ok(RenderRequest {
            audio_url,
            duration_sec,
            plan,
            bg_image_url,
            preset_id: self.preset_id,
            preset_params: self.preset_params.unwrap_or_default(),
        })
    }
}

/// Validated, immutable render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub audio_url: Url,
    pub duration_sec: u32,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_image_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
    #[serde(default)]
    pub preset_params: Map<String, Value>,
}

impl RenderRequest {
    pub fn resolution(&self) -> ResolutionProfile {
        self.plan.resolution()
    }

    pub fn total_frames(&self) -> u64 {
        total_frames(self.duration_sec, FRAME_RATE)
    }

    /// Extension used for the downloaded audio file.
    pub fn audio_extension(&self) -> &'static str {
        // FFmpeg sniffs the content anyway; the name is only a hint.
        detect_audio_extension(&self.audio_url).unwrap_or("mp3")
    }
}

/// Find the audio container named by a URL's path or query string.
pub fn detect_audio_extension(url: &Url) -> Option<&'static str> {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(extension_of);
    if from_path.is_some() {
        return from_path;
    }

    url.query_pairs().find_map(|(_, value)| {
        let value = value.to_ascii_lowercase();
        extension_of(&value).or_else(|| {
            AUDIO_MIME_EXTENSIONS
                .iter()
                .find(|(mime, _)| value.starts_with(mime))
                .map(|(_, ext)| *ext)
        })
    })
}

fn extension_of(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_AUDIO_EXTENSIONS
        .iter()
        .find(|supported| **supported == ext)
        .copied()
}

fn parse_http_url(value: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(value.trim())
        .map_err(|_| validation_error("url", "must be a well-formed absolute URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(validation_error("url", "must use http or https")),
    }
}

fn validate_audio_url(value: &str) -> Result<(), ValidationError> {
    let url = parse_http_url(value)?;
    if detect_audio_extension(&url).is_none() {
        return Err(validation_error(
            "unsupported_audio_container",
            "audioUrl must point to a supported audio file (mp3, wav, m4a, aac, ogg, opus, flac, webm)",
        ));
    }
    Ok(())
}

fn validate_image_url(value: &str) -> Result<(), ValidationError> {
    parse_http_url(value).map(|_| ())
}

fn validate_plan(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<Plan>()
        .map(|_| ())
        .map_err(|_| validation_error("plan", "plan must be one of: free, premium"))
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn collect_violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut violations: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errors)| {
            let field = wire_field_name(field.as_ref());
            field_errors.iter().map(move |error| {
                let message = match &error.message {
                    Some(message) => message.to_string(),
                    None if error.code == "range" => format!(
                        "{} must be between {} and {}",
                        field,
                        error.params.get("min").map(|v| v.to_string()).unwrap_or_default(),
                        error.params.get("max").map(|v| v.to_string()).unwrap_or_default(),
                    ),
                    None => format!("{} is invalid", field),
                };
                FieldViolation::new(field, error.code.to_string(), message)
            })
        })
        .collect();

    sort_violations(&mut violations);
    violations
}

fn sort_violations(violations: &mut [FieldViolation]) {
    violations.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
}

fn wire_field_name(field: &str) -> &'static str {
    match field {
        "audio_url" | "audioUrl" => "audioUrl",
        "duration_sec" | "durationSec" => "durationSec",
        "plan" => "plan",
        "bg_image_url" | "bgImageUrl" => "bgImageUrl",
        "preset_id" | "presetId" => "presetId",
        "preset_params" | "presetParams" => "presetParams",
        _ => "body",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> ExportRequestBody {
        serde_json::from_value(value).unwrap()
    }

    fn fields(violations: &[FieldViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn test_valid_request_normalizes() {
        let request = body(json!({
            "audioUrl": "https://cdn.example.com/tracks/a.MP3",
            "durationSec": 10,
            "plan": "premium",
            "bgImageUrl": "https://cdn.example.com/bg.jpg",
            "presetId": "bars",
            "presetParams": { "color": "#ff0000", "bars": 64 }
        }))
        .into_render_request()
        .unwrap();

        assert_eq!(request.duration_sec, 10);
        assert_eq!(request.plan, Plan::Premium);
        assert_eq!(request.total_frames(), 300);
        assert_eq!(request.resolution(), ResolutionProfile::PREMIUM);
        assert_eq!(request.audio_extension(), "mp3");
        assert_eq!(request.preset_params["bars"], json!(64));
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let violations = body(json!({
            "audioUrl": "https://x/a.mp3",
            "durationSec": 100000,
            "plan": "free"
        }))
        .into_render_request()
        .unwrap_err();

        assert_eq!(fields(&violations), vec!["durationSec"]);
    }

    #[test]
    fn test_duration_bounds() {
        for (duration, ok) in [(0, false), (-5, false), (1, true), (600, true), (601, false)] {
            let result = body(json!({
                "audioUrl": "https://x/a.mp3",
                "durationSec": duration,
                "plan": "free"
            }))
            .into_render_request();
            assert_eq!(result.is_ok(), ok, "duration {}", duration);
        }
        assert_eq!(MAX_DURATION_SECS, 600);
    }

    #[test]
    fn test_all_violations_are_reported() {
        let violations = body(json!({
            "audioUrl": "https://x/cover.png",
            "durationSec": 0,
            "plan": "gold",
            "bgImageUrl": "not a url"
        }))
        .into_render_request()
        .unwrap_err();

        assert_eq!(
            fields(&violations),
            vec!["audioUrl", "bgImageUrl", "durationSec", "plan"]
        );
        assert_eq!(violations[0].code, "unsupported_audio_container");
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let violations = body(json!({})).into_render_request().unwrap_err();
        assert_eq!(fields(&violations), vec!["audioUrl", "durationSec", "plan"]);
        assert!(violations.iter().all(|v| v.code == "required"));
    }

    #[test]
    fn test_mistyped_fields_are_reported_with_the_rest() {
        let violations = body(json!({
            "audioUrl": "ftp://x/cover.png",
            "durationSec": "ten",
            "plan": "gold",
            "presetParams": [1, 2]
        }))
        .into_render_request()
        .unwrap_err();

        assert_eq!(
            fields(&violations),
            vec!["audioUrl", "durationSec", "plan", "presetParams"]
        );
        let duration = &violations[1];
        assert_eq!(duration.code, "type");
        assert_eq!(duration.message, "durationSec must be an integer");
        assert_eq!(violations[3].code, "type");
    }

    #[test]
    fn test_fractional_duration_is_a_type_error() {
        let violations = body(json!({ "audioUrl": "https://x/a.mp3", "durationSec": 1.5, "plan": "free" }))
            .into_render_request()
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "durationSec");
        assert_eq!(violations[0].code, "type");
    }

    #[test]
    fn test_non_object_body() {
        let violations = body(json!(["audioUrl"])).into_render_request().unwrap_err();
        assert_eq!(fields(&violations), vec!["body"]);
        assert_eq!(violations[0].code, "type");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let violations = body(json!({ "audioUrl": null, "durationSec": 5, "plan": "free" }))
            .into_render_request()
            .unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, "required");
    }

    #[test]
    fn test_range_message_names_the_cap() {
        let violations = body(json!({ "audioUrl": "https://x/a.mp3", "durationSec": 601, "plan": "free" }))
            .into_render_request()
            .unwrap_err();
        assert_eq!(violations[0].code, "range");
        assert_eq!(
            violations[0].message,
            format!("durationSec must be between 1 and {}", MAX_DURATION_SECS)
        );
    }

    #[test]
    fn test_audio_url_must_be_absolute_http() {
        for url in ["/relative/a.mp3", "ftp://x/a.mp3", "file:///tmp/a.mp3"] {
            let violations = body(json!({ "audioUrl": url, "durationSec": 5, "plan": "free" }))
                .into_render_request()
                .unwrap_err();
            assert_eq!(fields(&violations), vec!["audioUrl"], "url {}", url);
        }
    }

    #[test]
    fn test_detect_audio_extension_from_query() {
        let presigned =
            Url::parse("https://bucket.example.com/obj/123?X-Amz-Signature=abc&response-content-type=audio%2Fmpeg")
                .unwrap();
        assert_eq!(detect_audio_extension(&presigned), Some("mp3"));

        let named = Url::parse("https://api.example.com/download?file=song.flac").unwrap();
        assert_eq!(detect_audio_extension(&named), Some("flac"));

        let image = Url::parse("https://x/a.png?type=image/png").unwrap();
        assert_eq!(detect_audio_extension(&image), None);
    }

    #[test]
    fn test_render_request_round_trips_through_json() {
        let request = body(json!({
            "audioUrl": "https://x/a.wav",
            "durationSec": 3,
            "plan": "free"
        }))
        .into_render_request()
        .unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["audioUrl"], json!("https://x/a.wav"));
        assert!(value.get("bgImageUrl").is_none());
    }
}
