//! Parsing and post-processing of the model's JSON reply.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use tidytask_core::defaults::{COMPLEXITY_MAX, COMPLEXITY_MIN, MAX_CLEANED_TITLE_CHARS};
use tidytask_core::{
    DueDate, EnrichmentResult, Entity, EntityType, Error, FeatureFlag, FeatureSet, Result,
};

/// Strip a surrounding markdown code fence, if any.
pub fn unwrap_code_fence(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The first `{` through the last `}`.
fn object_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Parse the reply into a JSON object. Only a reply that holds no JSON
/// object at all is an error; the shape of individual keys is checked
/// later, per selected feature.
fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    let unwrapped = unwrap_code_fence(raw);
    let direct_err = match serde_json::from_str::<Value>(unwrapped) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(other) => format!("expected a JSON object, got {}", kind_of(&other)),
        Err(e) => e.to_string(),
    };
    match object_span(unwrapped).and_then(|span| serde_json::from_str::<Value>(span).ok()) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(Error::Parse(format!(
            "Failed to parse enrichment response: {}",
            direct_err
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A non-blank string value.
fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A boolean given as `true`/`false` or as the strings "true"/"false".
fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a completion into an [`EnrichmentResult`] for `features`.
///
/// `title` and `description` are the source texts the prompt was built
/// from; when the model reports no change they become the cleaned values.
/// Keys for unselected features are never looked at, and a malformed value
/// only loses its own feature.
pub fn parse_response(
    raw: &str,
    features: &FeatureSet,
    title: &str,
    description: Option<&str>,
) -> Result<EnrichmentResult> {
    let reply = parse_object(raw)?;
    let mut result = EnrichmentResult {
        features: features.clone(),
        ..Default::default()
    };

    if features.contains(FeatureFlag::CleanTitle) {
        let candidate = match (bool_field(&reply, "title_changed"), str_field(&reply, "title")) {
            (Some(true), Some(t)) => t,
            _ => title,
        };
        result.cleaned_title = clean_title(candidate);
    }

    if features.contains(FeatureFlag::CleanDescription) {
        let candidate = match (
            bool_field(&reply, "description_changed"),
            str_field(&reply, "description"),
        ) {
            (Some(true), Some(d)) => Some(d),
            _ => description,
        };
        result.cleaned_description = candidate
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
    }

    if features.contains(FeatureFlag::EntityExtraction) {
        result.entities = reply
            .get("entities")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .map(normalize_entities)
            .filter(|e| !e.is_empty());
    }

    if features.contains(FeatureFlag::Complexity) {
        result.complexity = reply.get("complexity").and_then(parse_complexity);
    }

    if features.contains(FeatureFlag::DueDate) {
        result.due = str_field(&reply, "due_date").and_then(parse_due_date);
    }

    Ok(result)
}

/// Strip one trailing period, then reject empty or overlong titles.
pub fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CLEANED_TITLE_CHARS {
        return None;
    }
    Some(trimmed.to_string())
}

fn parse_complexity(value: &Value) -> Option<i32> {
    let n = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    let n = i32::try_from(n).ok()?;
    (COMPLEXITY_MIN..=COMPLEXITY_MAX).contains(&n).then_some(n)
}

fn normalize_entities(items: &[Value]) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::with_capacity(items.len());
    for item in items {
        let Some(entity_type) = item
            .get("type")
            .and_then(Value::as_str)
            .and_then(EntityType::parse_lenient)
        else {
            continue;
        };
        let Some(value) = item
            .get("value")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            continue;
        };
        let duplicate = entities
            .iter()
            .any(|e| e.entity_type == entity_type && e.value.eq_ignore_ascii_case(value));
        if !duplicate {
            entities.push(Entity::new(entity_type, value));
        }
    }
    entities
}

const DATETIME_OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"];
const DATETIME_NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a due date. A bare date is all-day at midnight UTC; a timestamp
/// with an offset is converted to UTC; a naive timestamp is taken as UTC.
pub fn parse_due_date(raw: &str) -> Option<DueDate> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(DueDate {
            at: date.and_hms_opt(0, 0, 0)?.and_utc(),
            has_time: false,
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(DueDate {
            at: dt.with_timezone(&Utc),
            has_time: true,
        });
    }

    let with_offset = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => s.to_string(),
    };
    for format in DATETIME_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, format) {
            return Some(DueDate {
                at: dt.with_timezone(&Utc),
                has_time: true,
            });
        }
    }

    for format in DATETIME_NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(DueDate {
                at: naive.and_utc(),
                has_time: true,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn features(flags: &[FeatureFlag]) -> FeatureSet {
        flags.iter().copied().collect()
    }

    #[test]
    fn test_unwrap_code_fence() {
        assert_eq!(unwrap_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unwrap_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(unwrap_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_trailing_period_stripped_before_write() {
        let result = parse_response(
            r#"{"title":"Fix bug.", "title_changed":true}"#,
            &features(&[FeatureFlag::CleanTitle]),
            "fix bug",
            None,
        )
        .unwrap();
        assert_eq!(result.cleaned_title.as_deref(), Some("Fix bug"));
    }

    #[test]
    fn test_only_one_period_is_stripped() {
        assert_eq!(clean_title("Wait for it...").as_deref(), Some("Wait for it.."));
        assert_eq!(clean_title("Buy milk").as_deref(), Some("Buy milk"));
    }

    #[test]
    fn test_title_sanity_check() {
        assert_eq!(clean_title("."), None);
        assert_eq!(clean_title("   "), None);
        let long = "a".repeat(MAX_CLEANED_TITLE_CHARS + 1);
        assert_eq!(clean_title(&long), None);
        let long_with_period = format!("{}.", "a".repeat(MAX_CLEANED_TITLE_CHARS));
        assert!(clean_title(&long_with_period).is_some());
    }

    #[test]
    fn test_unchanged_title_falls_back_to_source() {
        let flags = features(&[FeatureFlag::CleanTitle, FeatureFlag::CleanDescription]);
        let result = parse_response(
            r#"{"title":"ignored","title_changed":false}"#,
            &flags,
            "Buy milk",
            Some(" Semi-skimmed "),
        )
        .unwrap();
        assert_eq!(result.cleaned_title.as_deref(), Some("Buy milk"));
        assert_eq!(result.cleaned_description.as_deref(), Some("Semi-skimmed"));
    }

    #[test]
    fn test_fenced_response_with_prose_falls_back_to_object_span() {
        let raw = "Sure! Here you go:\n```json\n{\"complexity\": 3}\n```\nLet me know.";
        let result = parse_response(raw, &features(&[FeatureFlag::Complexity]), "x", None).unwrap();
        assert_eq!(result.complexity, Some(3));
    }

    #[test]
    fn test_unparseable_response_is_parse_error() {
        let err = parse_response(
            "I could not do that.",
            &features(&[FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap_err();
        assert!(err.is_parse());

        let err = parse_response("[1,2,3]", &features(&[FeatureFlag::Complexity]), "x", None)
            .unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_unselected_keys_are_ignored() {
        let result = parse_response(
            r#"{"complexity": 2, "title": "Other", "title_changed": true, "due_date": "2026-10-20"}"#,
            &features(&[FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap();
        assert_eq!(result.complexity, Some(2));
        assert!(result.cleaned_title.is_none());
        assert!(result.due.is_none());
        assert_eq!(result.features, features(&[FeatureFlag::Complexity]));
    }

    #[test]
    fn test_malformed_unselected_key_does_not_fail_reply() {
        let result = parse_response(
            r#"{"complexity": 2, "due_date": {"date": "2026-10-20"}, "entities": "none"}"#,
            &features(&[FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap();
        assert_eq!(result.complexity, Some(2));
    }

    #[test]
    fn test_malformed_selected_key_loses_only_its_feature() {
        let result = parse_response(
            r#"{"due_date": {"date": "2026-10-20"}, "complexity": 3}"#,
            &features(&[FeatureFlag::DueDate, FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap();
        assert!(result.due.is_none());
        assert_eq!(result.complexity, Some(3));
    }

    #[test]
    fn test_bad_entity_element_is_skipped() {
        let result = parse_response(
            r#"{"entities": [{"type": "person", "value": "Ana"}, {"type": "phone", "value": 5551234}, "Lisbon", null],
                "complexity": 2}"#,
            &features(&[FeatureFlag::EntityExtraction, FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap();
        assert_eq!(
            result.entities,
            Some(vec![Entity::new(EntityType::Person, "Ana")])
        );
        assert_eq!(result.complexity, Some(2));
    }

    #[test]
    fn test_changed_flag_accepts_string_booleans() {
        let flags = features(&[FeatureFlag::CleanTitle, FeatureFlag::Complexity]);
        let result = parse_response(
            r#"{"title": "Fix bug", "title_changed": "true", "complexity": 2}"#,
            &flags,
            "fix bug",
            None,
        )
        .unwrap();
        assert_eq!(result.cleaned_title.as_deref(), Some("Fix bug"));
        assert_eq!(result.complexity, Some(2));

        let result = parse_response(
            r#"{"title": "Other", "title_changed": "false"}"#,
            &flags,
            "fix bug",
            None,
        )
        .unwrap();
        assert_eq!(result.cleaned_title.as_deref(), Some("fix bug"));
    }

    #[test]
    fn test_non_object_json_is_parse_error() {
        for raw in ["\"just text\"", "42", "null"] {
            let err = parse_response(raw, &features(&[FeatureFlag::Complexity]), "x", None)
                .unwrap_err();
            assert!(err.is_parse(), "{raw}");
        }
    }

    #[test]
    fn test_complexity_range_and_string_values() {
        let flags = features(&[FeatureFlag::Complexity]);
        for (raw, expected) in [
            (r#"{"complexity": 5}"#, Some(5)),
            (r#"{"complexity": "4"}"#, Some(4)),
            (r#"{"complexity": 0}"#, None),
            (r#"{"complexity": 6}"#, None),
            (r#"{"complexity": 2.5}"#, None),
            (r#"{"complexity": null}"#, None),
        ] {
            let result = parse_response(raw, &flags, "x", None).unwrap();
            assert_eq!(result.complexity, expected, "{raw}");
        }
    }

    #[test]
    fn test_entities_filtered_and_deduplicated() {
        let raw = r#"{"entities": [
            {"type": "person", "value": "Ana"},
            {"type": "PERSON", "value": "ana"},
            {"type": "place", "value": "Lisbon"},
            {"type": "spaceship", "value": "Enterprise"},
            {"type": "email", "value": "  "}
        ]}"#;
        let result =
            parse_response(raw, &features(&[FeatureFlag::EntityExtraction]), "x", None).unwrap();
        let entities = result.entities.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0], Entity::new(EntityType::Person, "Ana"));
        assert_eq!(entities[1].entity_type, EntityType::Location);
    }

    #[test]
    fn test_empty_entity_list_produces_no_update() {
        let result = parse_response(
            r#"{"entities": []}"#,
            &features(&[FeatureFlag::EntityExtraction]),
            "x",
            None,
        )
        .unwrap();
        assert!(result.entities.is_none());
        assert!(result.features.contains(FeatureFlag::EntityExtraction));
        assert!(!result.has_updates());
    }

    #[test]
    fn test_due_date_bare_date_is_all_day() {
        let due = parse_due_date("2026-10-20").unwrap();
        assert!(!due.has_time);
        assert_eq!(due.at, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_due_date_with_offset_is_converted_to_utc() {
        let due = parse_due_date("2026-10-20T15:30:00+02:00").unwrap();
        assert!(due.has_time);
        assert_eq!(due.at, Utc.with_ymd_and_hms(2026, 10, 20, 13, 30, 0).unwrap());

        let due = parse_due_date("2026-10-20T15:30Z").unwrap();
        assert_eq!(due.at, Utc.with_ymd_and_hms(2026, 10, 20, 15, 30, 0).unwrap());
    }

    #[test]
    fn test_due_date_naive_timestamp_is_utc() {
        let due = parse_due_date("2026-10-20T09:00").unwrap();
        assert!(due.has_time);
        assert_eq!(due.at, Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_unparseable_due_date_is_discarded_not_fatal() {
        assert!(parse_due_date("next tuesday").is_none());
        assert!(parse_due_date("null").is_none());

        let result = parse_response(
            r#"{"due_date": "soonish", "complexity": 1}"#,
            &features(&[FeatureFlag::DueDate, FeatureFlag::Complexity]),
            "x",
            None,
        )
        .unwrap();
        assert!(result.due.is_none());
        assert_eq!(result.complexity, Some(1));
    }
}
