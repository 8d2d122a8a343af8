//! Assertion utilities for testing.
//!
//! Checks on the JSON documents served by the summary and bounds routes.

use serde_json::Value;

/// Default epsilon for floating-point comparisons
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Assert that two floating-point values are approximately equal.
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: Option<f64>) {
    let epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
    let diff = (actual - expected).abs();

    assert!(
        diff <= epsilon,
        "Values not approximately equal: actual = {}, expected = {}, diff = {}, epsilon = {}",
        actual,
        expected,
        diff,
        epsilon
    );
}

/// Assert that `value` is a GeoJSON Polygon with closed rings.
pub fn assert_polygon(value: &Value) {
    assert_eq!(value["type"], "Polygon", "not a polygon: {}", value);
    let rings = value["coordinates"]
        .as_array()
        .unwrap_or_else(|| panic!("polygon without coordinates: {}", value));
    assert!(!rings.is_empty(), "polygon without rings: {}", value);
    for ring in rings {
        let points = ring.as_array().expect("ring is not an array");
        assert!(points.len() >= 4, "ring too short: {}", ring);
        assert_eq!(points.first(), points.last(), "ring not closed: {}", ring);
    }
}

/// Assert the invariant shape of a summary document.
pub fn assert_summary(summary: &Value) {
    for key in ["pixelCount", "objectCount", "objectList"] {
        assert!(summary.get(key).is_some(), "summary lacks {}: {}", key, summary);
    }
    assert!(summary["pixelCount"].is_number());
    let objects = summary["objectList"]
        .as_array()
        .expect("objectList is not an array");
    assert_eq!(summary["objectCount"].as_u64(), Some(objects.len() as u64));
    for object in objects {
        assert_polygon(object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assert_approx_eq() {
        assert_approx_eq(1.0, 1.0, None);
        assert_approx_eq(1.0, 1.000_000_1, None);
        assert_approx_eq(1.0, 1.001, Some(0.01));
    }

    #[test]
    fn test_assert_summary() {
        assert_summary(&json!({
            "pixelCount": 1.0,
            "objectCount": 1,
            "objectList": [
                {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}
            ]
        }));
    }

    #[test]
    #[should_panic]
    fn test_assert_summary_count_mismatch() {
        assert_summary(&json!({"pixelCount": 0, "objectCount": 2, "objectList": []}));
    }
}
