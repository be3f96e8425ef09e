//! Offline estimation helpers.
//!
//! Used standalone, to fill gaps in live records ([`backfill_record`]) and
//! to build the synthetic fallback catalog.

use serde_json::Value;

use crate::{DatasetKind, Freshness, GeoPoint, Record};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Signal speed in optical fiber, roughly two thirds of c.
pub const FIBER_KM_PER_MS: f64 = 204.0;

/// Confidence assigned to records built only from estimates.
pub const ESTIMATED_CONFIDENCE: f64 = 0.35;

/// Haversine distance between two points.
pub fn great_circle_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (to.lon - from.lon).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Sum of great-circle legs along `path`.
pub fn route_length_km(path: &[GeoPoint]) -> f64 {
    path.windows(2)
        .map(|leg| great_circle_km(leg[0], leg[1]))
        .sum()
}

/// One-way propagation delay over `distance_km` of fiber, in milliseconds.
pub fn propagation_latency_ms(distance_km: f64) -> f64 {
    round_to(distance_km.max(0.0) / FIBER_KM_PER_MS, 2)
}

/// Design capacity heuristic by cable length bucket.
///
/// | Length | Capacity |
/// |--------|----------|
/// | < 1 000 km | 24 Tbps (regional festoon) |
/// | < 5 000 km | 72 Tbps |
/// | < 10 000 km | 160 Tbps (modern transatlantic) |
/// | otherwise | 108 Tbps (long-haul transpacific, fewer pairs) |
pub fn estimate_capacity_tbps(length_km: f64) -> f64 {
    match length_km {
        length if length < 1_000.0 => 24.0,
        length if length < 5_000.0 => 72.0,
        length if length < 10_000.0 => 160.0,
        _ => 108.0,
    }
}

/// Great-circle route between two points split into `segments` legs.
pub fn estimate_route(from: GeoPoint, to: GeoPoint, segments: usize) -> Vec<GeoPoint> {
    let segments = segments.max(1);
    let distance = great_circle_km(from, to) / EARTH_RADIUS_KM;
    if distance < 1e-9 {
        return vec![from, to];
    }

    let (lat1, lon1) = (from.lat.to_radians(), from.lon.to_radians());
    let (lat2, lon2) = (to.lat.to_radians(), to.lon.to_radians());
    let sin_distance = distance.sin();
    // Antipodal endpoints have no unique great circle.
    if sin_distance.abs() < 1e-6 {
        return linear_route(from, to, segments);
    }

    (0..=segments)
        .map(|step| {
            let fraction = step as f64 / segments as f64;
            let a = ((1.0 - fraction) * distance).sin() / sin_distance;
            let b = (fraction * distance).sin() / sin_distance;
            let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
            let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
            let z = a * lat1.sin() + b * lat2.sin();
            GeoPoint {
                lat: round_to(z.atan2((x * x + y * y).sqrt()).to_degrees(), 4),
                lon: round_to(y.atan2(x).to_degrees(), 4),
            }
        })
        .collect()
}

fn linear_route(from: GeoPoint, to: GeoPoint, segments: usize) -> Vec<GeoPoint> {
    (0..=segments)
        .map(|step| {
            let fraction = step as f64 / segments as f64;
            GeoPoint {
                lat: round_to(from.lat + (to.lat - from.lat) * fraction, 4),
                lon: round_to(from.lon + (to.lon - from.lon) * fraction, 4),
            }
        })
        .collect()
}

const COUNTRY_CENTROIDS: &[(&str, f64, f64)] = &[
    ("AE", 24.0, 54.0),
    ("AR", -34.0, -64.0),
    ("AU", -25.0, 134.0),
    ("BR", -10.0, -52.0),
    ("CA", 56.0, -106.0),
    ("CH", 46.8, 8.2),
    ("CL", -33.0, -71.0),
    ("CN", 35.0, 103.0),
    ("DE", 51.2, 10.4),
    ("EG", 26.8, 30.8),
    ("ES", 40.4, -3.7),
    ("FR", 46.6, 2.2),
    ("GB", 54.0, -2.0),
    ("HK", 22.3, 114.2),
    ("ID", -2.5, 118.0),
    ("IE", 53.4, -8.2),
    ("IN", 21.0, 78.0),
    ("IT", 42.8, 12.8),
    ("JP", 36.2, 138.3),
    ("KE", 0.0, 38.0),
    ("KR", 36.5, 127.9),
    ("MX", 23.6, -102.5),
    ("NG", 9.1, 8.7),
    ("NL", 52.1, 5.3),
    ("PL", 51.9, 19.1),
    ("PT", 39.4, -8.2),
    ("RU", 61.5, 105.3),
    ("SE", 60.1, 18.6),
    ("SG", 1.35, 103.8),
    ("TR", 39.0, 35.2),
    ("UA", 48.4, 31.2),
    ("US", 39.8, -98.6),
    ("VN", 14.1, 108.3),
    ("ZA", -30.6, 22.9),
];

/// Approximate geographic centre of an ISO 3166-1 alpha-2 country.
pub fn country_centroid(code: &str) -> Option<GeoPoint> {
    let code = code.trim().to_ascii_uppercase();
    COUNTRY_CENTROIDS
        .iter()
        .find(|(candidate, _, _)| *candidate == code)
        .map(|(_, lat, lon)| GeoPoint {
            lat: *lat,
            lon: *lon,
        })
}

pub fn known_countries() -> impl Iterator<Item = &'static str> {
    COUNTRY_CENTROIDS.iter().map(|(code, _, _)| *code)
}

/// Fill missing fields that can be derived from what is present.
///
/// Cables with a route but no capacity get [`estimate_capacity_tbps`];
/// records with a country but no coordinates get the country centroid.
/// Every filled field is listed in `attributes.estimated_fields`.
pub fn backfill_record(mut record: Record) -> Record {
    if record.kind == DatasetKind::Cables && record.path.len() >= 2 {
        let length_km = route_length_km(&record.path);
        record
            .attributes
            .entry(String::from("length_km"))
            .or_insert_with(|| Value::from(round_to(length_km, 0)));
        if record.capacity_tbps.is_none() {
            record.capacity_tbps = Some(estimate_capacity_tbps(length_km));
            record.mark_estimated_field("capacity_tbps");
        }
    }

    if record.location.is_none() && record.path.is_empty() {
        if let Some(centroid) = record.country.as_deref().and_then(country_centroid) {
            record.location = Some(centroid);
            record.mark_estimated_field("location");
        }
    }

    record
}

/// Cable record derived purely from two landing points.
pub fn estimate_cable(
    id: impl Into<String>,
    name: impl Into<String>,
    from: GeoPoint,
    to: GeoPoint,
) -> Record {
    let path = estimate_route(from, to, 8);
    let length_km = route_length_km(&path);
    let mut record = Record::new(id, name, DatasetKind::Cables)
        .with_path(path)
        .with_capacity_tbps(estimate_capacity_tbps(length_km))
        .with_attribute("length_km", round_to(length_km, 0))
        .with_attribute("latency_ms", propagation_latency_ms(length_km));
    record.mark_estimated_field("path");
    record.mark_estimated_field("capacity_tbps");
    record.stamped(ESTIMATED_CONFIDENCE, Freshness::Estimated, true)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
