use serde_json::Value;

use super::estimate::{country_centroid, estimate_route, propagation_latency_ms, route_length_km, round_to};
use crate::{DatasetKind, GeoPoint, Record};

struct CableEntry {
    id: &'static str,
    name: &'static str,
    from: (f64, f64),
    to: (f64, f64),
    landing_countries: [&'static str; 2],
    capacity_tbps: f64,
    owners: &'static [&'static str],
}

const CABLES: &[CableEntry] = &[
    CableEntry {
        id: "marea",
        name: "MAREA",
        from: (36.85, -75.98),
        to: (43.26, -2.93),
        landing_countries: ["US", "ES"],
        capacity_tbps: 200.0,
        owners: &["Microsoft", "Meta", "Telxius"],
    },
    CableEntry {
        id: "dunant",
        name: "Dunant",
        from: (36.85, -75.98),
        to: (46.72, -1.95),
        landing_countries: ["US", "FR"],
        capacity_tbps: 250.0,
        owners: &["Google"],
    },
    CableEntry {
        id: "grace-hopper",
        name: "Grace Hopper",
        from: (40.58, -73.66),
        to: (50.83, -4.55),
        landing_countries: ["US", "GB"],
        capacity_tbps: 350.0,
        owners: &["Google"],
    },
    CableEntry {
        id: "jupiter",
        name: "JUPITER",
        from: (33.92, -118.41),
        to: (34.30, 136.80),
        landing_countries: ["US", "JP"],
        capacity_tbps: 60.0,
        owners: &["Amazon", "Meta", "NTT", "SoftBank"],
    },
    CableEntry {
        id: "sea-me-we-6",
        name: "SEA-ME-WE 6",
        from: (1.29, 103.85),
        to: (43.30, 5.37),
        landing_countries: ["SG", "FR"],
        capacity_tbps: 126.0,
        owners: &["Orange", "Singtel", "Telecom Egypt", "Bharti Airtel"],
    },
    CableEntry {
        id: "curie",
        name: "Curie",
        from: (33.92, -118.41),
        to: (-33.05, -71.61),
        landing_countries: ["US", "CL"],
        capacity_tbps: 72.0,
        owners: &["Google"],
    },
    CableEntry {
        id: "equiano",
        name: "Equiano",
        from: (38.72, -9.14),
        to: (-33.72, 18.44),
        landing_countries: ["PT", "ZA"],
        capacity_tbps: 144.0,
        owners: &["Google"],
    },
    CableEntry {
        id: "ellalink",
        name: "EllaLink",
        from: (37.95, -8.87),
        to: (-3.73, -38.52),
        landing_countries: ["PT", "BR"],
        capacity_tbps: 100.0,
        owners: &["EllaLink Group"],
    },
    CableEntry {
        id: "2africa",
        name: "2Africa",
        from: (51.38, 1.38),
        to: (-29.86, 31.03),
        landing_countries: ["GB", "ZA"],
        capacity_tbps: 180.0,
        owners: &["Meta", "MTN", "Orange", "Vodafone", "China Mobile"],
    },
    CableEntry {
        id: "havfrue",
        name: "Havfrue/AEC-2",
        from: (40.22, -74.01),
        to: (53.60, -9.99),
        landing_countries: ["US", "IE"],
        capacity_tbps: 108.0,
        owners: &["Aqua Comms", "Bulk", "Google", "Meta"],
    },
];

/// `(id, name, city, country, lat, lon, participants)`
const EXCHANGE_POINTS: &[(&str, &str, &str, &str, f64, f64, u32)] = &[
    ("de-cix-fra", "DE-CIX Frankfurt", "Frankfurt", "DE", 50.11, 8.68, 1_100),
    ("ams-ix", "AMS-IX", "Amsterdam", "NL", 52.37, 4.90, 880),
    ("linx-lon1", "LINX LON1", "London", "GB", 51.51, -0.13, 850),
    ("equinix-ash", "Equinix Ashburn", "Ashburn", "US", 39.04, -77.49, 420),
    ("jpnap-tokyo", "JPNAP Tokyo", "Tokyo", "JP", 35.68, 139.69, 260),
    ("ix-br-sp", "IX.br Sao Paulo", "Sao Paulo", "BR", -23.55, -46.63, 2_300),
    ("france-ix-par", "France-IX Paris", "Paris", "FR", 48.86, 2.35, 500),
    ("sgix", "SGIX", "Singapore", "SG", 1.29, 103.85, 240),
    ("napafrica-jnb", "NAPAfrica Johannesburg", "Johannesburg", "ZA", -26.20, 28.05, 600),
    ("hkix", "HKIX", "Hong Kong", "HK", 22.32, 114.17, 330),
];

/// `(id, name, operator, city, country, lat, lon)`
const DATA_CENTERS: &[(&str, &str, &str, &str, &str, f64, f64)] = &[
    ("equinix-fr5", "Equinix FR5", "Equinix", "Frankfurt", "DE", 50.10, 8.63),
    ("equinix-ld8", "Equinix LD8", "Equinix", "London", "GB", 51.51, -0.01),
    ("dlr-ash", "Digital Realty Ashburn", "Digital Realty", "Ashburn", "US", 39.02, -77.46),
    ("equinix-sg1", "Equinix SG1", "Equinix", "Singapore", "SG", 1.32, 103.89),
    ("equinix-ty2", "Equinix TY2", "Equinix", "Tokyo", "JP", 35.62, 139.75),
    ("interxion-ams", "Interxion AMS1", "Digital Realty", "Amsterdam", "NL", 52.34, 4.83),
    ("teraco-jb1", "Teraco JB1", "Teraco", "Johannesburg", "ZA", -26.02, 28.20),
    ("equinix-sp4", "Equinix SP4", "Equinix", "Sao Paulo", "BR", -23.50, -46.85),
    ("coresite-la1", "CoreSite LA1", "CoreSite", "Los Angeles", "US", 34.05, -118.25),
    ("equinix-pa2", "Equinix PA2", "Equinix", "Paris", "FR", 48.92, 2.36),
];

/// `(origin, target, share_percent)`
const ATTACK_CORRIDORS: &[(&str, &str, f64)] = &[
    ("US", "US", 14.2),
    ("CN", "US", 6.8),
    ("DE", "US", 4.1),
    ("RU", "UA", 3.9),
    ("BR", "BR", 3.2),
    ("IN", "US", 2.7),
    ("NL", "DE", 2.5),
    ("ID", "SG", 2.1),
    ("VN", "JP", 1.8),
    ("US", "GB", 1.6),
];

pub(crate) fn records(kind: DatasetKind) -> Vec<Record> {
    match kind {
        DatasetKind::Cables => cables(),
        DatasetKind::ExchangePoints => exchange_points(),
        DatasetKind::DataCenters => data_centers(),
        DatasetKind::AttackTelemetry => attack_corridors(),
    }
}

fn cables() -> Vec<Record> {
    CABLES
        .iter()
        .map(|entry| {
            let from = GeoPoint {
                lat: entry.from.0,
                lon: entry.from.1,
            };
            let to = GeoPoint {
                lat: entry.to.0,
                lon: entry.to.1,
            };
            let path = estimate_route(from, to, 8);
            let length_km = route_length_km(&path);

            Record::new(entry.id, entry.name, DatasetKind::Cables)
                .with_path(path)
                .with_capacity_tbps(entry.capacity_tbps)
                .with_owners(entry.owners.iter().map(|owner| (*owner).to_owned()).collect())
                .with_attribute(
                    "landing_countries",
                    Value::from(entry.landing_countries.to_vec()),
                )
                .with_attribute("length_km", round_to(length_km, 0))
                .with_attribute("latency_ms", propagation_latency_ms(length_km))
        })
        .collect()
}

fn exchange_points() -> Vec<Record> {
    EXCHANGE_POINTS
        .iter()
        .map(|(id, name, city, country, lat, lon, participants)| {
            Record::new(*id, *name, DatasetKind::ExchangePoints)
                .with_location(GeoPoint {
                    lat: *lat,
                    lon: *lon,
                })
                .with_country(*country)
                .with_attribute("city", *city)
                .with_attribute("participants", *participants)
        })
        .collect()
}

fn data_centers() -> Vec<Record> {
    DATA_CENTERS
        .iter()
        .map(|(id, name, operator, city, country, lat, lon)| {
            Record::new(*id, *name, DatasetKind::DataCenters)
                .with_location(GeoPoint {
                    lat: *lat,
                    lon: *lon,
                })
                .with_owners(vec![(*operator).to_owned()])
                .with_country(*country)
                .with_attribute("city", *city)
        })
        .collect()
}

fn attack_corridors() -> Vec<Record> {
    ATTACK_CORRIDORS
        .iter()
        .map(|(origin, target, share)| attack_record(origin, target, *share))
        .collect()
}

pub(crate) fn attack_record(origin: &str, target: &str, share_percent: f64) -> Record {
    let mut record = Record::new(
        format!("attack-{}-{}", origin.to_ascii_lowercase(), target.to_ascii_lowercase()),
        format!("{origin} to {target}"),
        DatasetKind::AttackTelemetry,
    )
    .with_country(target)
    .with_attribute("origin_country", origin)
    .with_attribute("target_country", target)
    .with_attribute("share_percent", share_percent);

    if let (Some(from), Some(to)) = (country_centroid(origin), country_centroid(target)) {
        record = record.with_path(if origin == target {
            vec![from]
        } else {
            estimate_route(from, to, 4)
        });
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_well_known_entries() {
        for kind in DatasetKind::ALL {
            let records = records(kind);
            assert!(records.len() >= 10, "{kind} catalog is too small");
            assert!(records.iter().all(|record| record.kind == kind));
        }
    }

    #[test]
    fn catalog_coordinates_are_valid() {
        for kind in DatasetKind::ALL {
            for record in records(kind) {
                for point in record.location.iter().chain(record.path.iter()) {
                    assert!(GeoPoint::new(point.lat, point.lon).is_ok(), "{}", record.id);
                }
            }
        }
    }

    #[test]
    fn attack_records_link_origin_and_target() {
        let record = attack_record("CN", "US", 6.8);
        assert_eq!(record.id, "attack-cn-us");
        assert_eq!(record.country.as_deref(), Some("US"));
        assert_eq!(record.path.len(), 5);
    }
}
