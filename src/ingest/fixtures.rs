/// Test fixtures: representative JSON payloads from the OMW water
/// temperature API.
///
/// These fixtures mirror the envelope returned by:
///   https://api.omw.hu/water_temp_hu.php
///
/// Response shape:
///   data[]
///     .type              - "river" or "lake"
///     .nameOfRiver       - water body name (identity, together with type)
///     .avgTemp           - average temperature, a STRING or a number
///     .unitOfMeasurement - optional, "°C" when absent
///     .lastMeasurement[] - optional single-key objects: location → value
///
/// Note: `avgTemp` arrives as a JSON string in most records even though it
/// is numeric. The validator coerces both spellings.

/// Two rivers and a lake, with per-location measurements on the Danube.
#[cfg(test)]
pub(crate) fn fixture_full_payload_json() -> &'static str {
    r#"{
      "data": [
        {
          "type": "river",
          "nameOfRiver": "Duna",
          "avgTemp": "16.4",
          "unitOfMeasurement": "°C",
          "lastMeasurement": [
            { "Budapest": "16.8" },
            { "Mohács": 16.1 },
            "not an object"
          ]
        },
        {
          "type": "river",
          "nameOfRiver": "Tisza",
          "avgTemp": 9.2
        },
        {
          "type": "lake",
          "nameOfRiver": "Balaton",
          "avgTemp": "12",
          "unitOfMeasurement": "°C",
          "lastMeasurement": [
            { "Siófok": "12.3" },
            { "Keszthely": "11.7" }
          ]
        }
      ]
    }"#
}

/// The single-record example used throughout the documentation.
#[cfg(test)]
pub(crate) fn fixture_tisza_string_temp_json() -> &'static str {
    r#"{"data":[{"type":"river","nameOfRiver":"Tisza","avgTemp":"12.5"}]}"#
}

/// A record whose temperature is not a number at all.
#[cfg(test)]
pub(crate) fn fixture_unparseable_temp_json() -> &'static str {
    r#"{"data":[{"type":"river","nameOfRiver":"Tisza","avgTemp":"abc"}]}"#
}

/// Mixed quality: one usable record among records missing identity fields
/// or not being objects at all.
#[cfg(test)]
pub(crate) fn fixture_mixed_validity_json() -> &'static str {
    r#"{
      "data": [
        { "nameOfRiver": "Rába", "avgTemp": "10.1" },
        { "type": "river", "avgTemp": "11.0" },
        42,
        null,
        { "type": "lake", "nameOfRiver": "Velencei-tó", "avgTemp": "14.9" },
        { "type": 7, "nameOfRiver": "Dráva", "avgTemp": "8.0" }
      ]
    }"#
}

/// Every element lacks the identity fields.
#[cfg(test)]
pub(crate) fn fixture_no_identity_json() -> &'static str {
    r#"{
      "data": [
        { "avgTemp": "10.1" },
        { "nameOfRiver": "Rába" },
        "Tisza"
      ]
    }"#
}
