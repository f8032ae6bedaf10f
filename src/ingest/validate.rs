/// Payload validation: the strict boundary between the loosely-typed API
/// JSON and the typed `WaterRecord`s the rest of the service works with.
///
/// A record is kept only if it is an object carrying both identity fields
/// (`type` and `nameOfRiver`) as strings. `avgTemp` is optional: a missing
/// or unparseable temperature surfaces as an unknown sensor value rather
/// than dropping the water body.

use crate::model::{Dataset, LastMeasurement, PayloadError, WaterRecord, WaterType, DEFAULT_UNIT};
use serde_json::Value;

/// Parses raw response text and validates it.
///
/// # Errors
/// - `PayloadError::InvalidJson` - the text is not JSON.
/// - any error `validate_payload` returns.
pub fn parse_payload(body: &str) -> Result<Dataset, PayloadError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;
    validate_payload(&payload)
}

/// Validates a decoded payload and extracts its records, in payload order.
///
/// # Errors
/// - `PayloadError::NotAnObject` - top level is not an object (or is `null`).
/// - `PayloadError::MissingData` - no `data` field.
/// - `PayloadError::DataNotArray` - `data` is not an array.
/// - `PayloadError::EmptyData` - `data` is an empty array.
/// - `PayloadError::NoValidRecords` - no element survived filtering.
pub fn validate_payload(payload: &Value) -> Result<Dataset, PayloadError> {
    let envelope = payload.as_object().ok_or(PayloadError::NotAnObject)?;

    let items = envelope
        .get("data")
        .ok_or(PayloadError::MissingData)?
        .as_array()
        .ok_or(PayloadError::DataNotArray)?;

    if items.is_empty() {
        return Err(PayloadError::EmptyData);
    }

    let records: Dataset = items.iter().filter_map(parse_record).collect();

    if records.is_empty() {
        return Err(PayloadError::NoValidRecords);
    }

    if records.len() < items.len() {
        log::debug!(
            "Dropped {} of {} records without type/nameOfRiver",
            items.len() - records.len(),
            items.len()
        );
    }

    Ok(records)
}

/// Converts one `data` element, or `None` if it lacks the identity fields.
fn parse_record(item: &Value) -> Option<WaterRecord> {
    let fields = item.as_object()?;
    let water_type = fields.get("type")?.as_str()?;
    let name = fields.get("nameOfRiver")?.as_str()?;

    let unit = fields
        .get("unitOfMeasurement")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_UNIT)
        .to_string();

    Some(WaterRecord {
        water_type: WaterType::from_api(water_type),
        name: name.to_string(),
        avg_temp: fields.get("avgTemp").and_then(coerce_temperature),
        unit,
        last_measurements: fields
            .get("lastMeasurement")
            .map(parse_last_measurements)
            .unwrap_or_default(),
    })
}

/// Numbers pass through; strings are parsed (surrounding whitespace
/// allowed). Anything else, or a non-finite result, is unknown.
fn coerce_temperature(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|t| t.is_finite())
}

/// Flattens `[{location: value}, ...]`. Non-object items are skipped, as is
/// a `lastMeasurement` that is not an array.
fn parse_last_measurements(value: &Value) -> Vec<LastMeasurement> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|fields| fields.iter())
        .map(|(location, raw)| LastMeasurement {
            location: location.clone(),
            value: display_value(raw),
        })
        .collect()
}

fn display_value(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use serde_json::json;

    // --- Envelope shape -----------------------------------------------------

    #[test]
    fn test_missing_data_field_is_rejected() {
        let result = validate_payload(&json!({ "items": [] }));
        assert_eq!(result, Err(PayloadError::MissingData));
    }

    #[test]
    fn test_non_array_data_is_rejected() {
        for data in [json!({}), json!("river"), json!(12), json!(null)] {
            let result = validate_payload(&json!({ "data": data.clone() }));
            assert_eq!(
                result,
                Err(PayloadError::DataNotArray),
                "data = {} should be rejected",
                data
            );
        }
    }

    #[test]
    fn test_non_object_top_level_is_rejected() {
        for payload in [json!(null), json!([]), json!("data"), json!(3.5)] {
            assert_eq!(validate_payload(&payload), Err(PayloadError::NotAnObject));
        }
    }

    #[test]
    fn test_empty_data_array_is_rejected() {
        assert_eq!(
            validate_payload(&json!({ "data": [] })),
            Err(PayloadError::EmptyData)
        );
    }

    #[test]
    fn test_invalid_json_text_is_rejected() {
        let result = parse_payload("{ not json");
        assert!(
            matches!(result, Err(PayloadError::InvalidJson(_))),
            "got {:?}",
            result
        );
    }

    // --- Record filtering ---------------------------------------------------

    #[test]
    fn test_records_without_identity_yield_no_valid_records() {
        assert_eq!(
            parse_payload(fixture_no_identity_json()),
            Err(PayloadError::NoValidRecords)
        );
    }

    #[test]
    fn test_only_qualifying_records_survive() {
        let records = parse_payload(fixture_mixed_validity_json()).expect("one record is valid");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Velencei-tó");
        assert_eq!(records[0].water_type, WaterType::Lake);
        assert_eq!(records[0].avg_temp, Some(14.9));
    }

    #[test]
    fn test_record_order_is_preserved() {
        let records = parse_payload(fixture_full_payload_json()).expect("fixture is valid");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Duna", "Tisza", "Balaton"]);
    }

    #[test]
    fn test_missing_avg_temp_keeps_record() {
        let records = validate_payload(&json!({
            "data": [{ "type": "river", "nameOfRiver": "Körös" }]
        }))
        .expect("identity is enough");

        assert_eq!(records[0].avg_temp, None);
    }

    // --- Field coercion -----------------------------------------------------

    #[test]
    fn test_string_temperature_is_coerced() {
        let records = parse_payload(fixture_tisza_string_temp_json()).expect("valid");
        assert_eq!(records[0].avg_temp, Some(12.5));
    }

    #[test]
    fn test_unparseable_temperature_is_unknown() {
        let records = parse_payload(fixture_unparseable_temp_json()).expect("valid");
        assert_eq!(records[0].avg_temp, None);
    }

    #[test]
    fn test_temperature_coercion_edge_cases() {
        assert_eq!(coerce_temperature(&json!(9.2)), Some(9.2));
        assert_eq!(coerce_temperature(&json!(" 7.5 ")), Some(7.5));
        assert_eq!(coerce_temperature(&json!("NaN")), None);
        assert_eq!(coerce_temperature(&json!(true)), None);
        assert_eq!(coerce_temperature(&json!(null)), None);
        assert_eq!(coerce_temperature(&json!([12])), None);
    }

    #[test]
    fn test_unit_defaults_to_celsius() {
        let records = parse_payload(fixture_full_payload_json()).expect("valid");
        let tisza = records.iter().find(|r| r.name == "Tisza").expect("Tisza present");
        assert_eq!(tisza.unit, DEFAULT_UNIT);
    }

    #[test]
    fn test_last_measurements_are_flattened() {
        let records = parse_payload(fixture_full_payload_json()).expect("valid");
        let duna = &records[0];

        assert_eq!(
            duna.last_measurements,
            vec![
                LastMeasurement {
                    location: "Budapest".to_string(),
                    value: "16.8".to_string(),
                },
                LastMeasurement {
                    location: "Mohács".to_string(),
                    value: "16.1".to_string(),
                },
            ],
            "string and numeric values kept, non-object entry skipped"
        );
    }

    #[test]
    fn test_non_array_last_measurement_is_ignored() {
        let records = validate_payload(&json!({
            "data": [{
                "type": "lake",
                "nameOfRiver": "Tisza-tó",
                "avgTemp": "13.0",
                "lastMeasurement": { "Poroszló": "13.2" }
            }]
        }))
        .expect("valid");

        assert!(records[0].last_measurements.is_empty());
    }
}
