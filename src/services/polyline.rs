//! Encoded polyline format (signed deltas, 5-bit chunks, 1e5 precision).

use crate::models::Coordinates;
use thiserror::Error;

const PRECISION: f64 = 1e5;

#[derive(Debug, Error, PartialEq)]
pub enum PolylineError {
    #[error("coordinate {index} is out of range or not finite")]
    InvalidCoordinate { index: usize },
}

/// Decode an encoded polyline. Malformed input truncates the result instead of failing.
pub fn decode(encoded: &str) -> Vec<Coordinates> {
    let bytes = encoded.trim().as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let Some((delta_lat, next)) = next_value(bytes, index) else {
            break;
        };
        let Some((delta_lng, next)) = next_value(bytes, next) else {
            break;
        };
        index = next;
        lat += delta_lat;
        lng += delta_lng;
        points.push(Coordinates {
            lat: lat as f64 / PRECISION,
            lng: lng as f64 / PRECISION,
        });
    }

    points
}

fn next_value(bytes: &[u8], mut index: usize) -> Option<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(index)?;
        index += 1;
        if byte < 63 || shift > 60 {
            return None;
        }
        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    let value = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Some((value, index))
}

/// Encode points into the polyline format.
pub fn encode(points: &[Coordinates]) -> Result<String, PolylineError> {
    let mut out = String::with_capacity(points.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for (index, point) in points.iter().enumerate() {
        if point.validate().is_err() {
            return Err(PolylineError::InvalidCoordinate { index });
        }
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    Ok(out)
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push(char::from((0x20 | (v & 0x1f)) as u8 + 63));
        v >>= 5;
    }
    out.push(char::from(v as u8 + 63));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FALLBACK_POLYLINE_LITERAL;

    fn pt(lat: f64, lng: f64) -> Coordinates {
        Coordinates { lat, lng }
    }

    #[test]
    fn decodes_reference_vector() {
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        assert_eq!(points.len(), 3);
        assert!((points[0].lat - 38.5).abs() < 1e-9);
        assert!((points[0].lng + 120.2).abs() < 1e-9);
        assert!((points[2].lat - 43.252).abs() < 1e-9);
        assert!((points[2].lng + 126.453).abs() < 1e-9);
    }

    #[test]
    fn encodes_reference_vector() {
        let encoded = encode(&[pt(38.5, -120.2), pt(40.7, -120.95), pt(43.252, -126.453)]).unwrap();
        assert_eq!(encoded, "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn round_trip_within_precision() {
        let points = vec![
            pt(35.681236, 139.767125),
            pt(35.68, 139.77),
            pt(-33.8688, 151.2093),
            pt(0.0, 0.0),
        ];
        let decoded = decode(&encode(&points).unwrap());
        assert_eq!(decoded.len(), points.len());
        for (a, b) in points.iter().zip(&decoded) {
            assert!((a.lat - b.lat).abs() <= 1e-5);
            assert!((a.lng - b.lng).abs() <= 1e-5);
        }
    }

    #[test]
    fn malformed_input_truncates() {
        let full = encode(&[pt(35.0, 139.0), pt(35.001, 139.001)]).unwrap();
        // Drop the final byte so the last longitude is incomplete
        let truncated = &full[..full.len() - 1];
        assert_eq!(decode(truncated).len(), 1);
        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
        // Bytes below '?' are invalid
        assert!(decode("\x01\x02").is_empty());
    }

    #[test]
    fn encode_rejects_non_finite() {
        let err = encode(&[pt(35.0, 139.0), pt(f64::NAN, 0.0)]).unwrap_err();
        assert_eq!(err, PolylineError::InvalidCoordinate { index: 1 });
    }

    #[test]
    fn fallback_literal_is_a_valid_two_point_path() {
        let points = decode(FALLBACK_POLYLINE_LITERAL);
        assert_eq!(points.len(), 2);
        assert_eq!(encode(&points).unwrap(), FALLBACK_POLYLINE_LITERAL);
    }
}
