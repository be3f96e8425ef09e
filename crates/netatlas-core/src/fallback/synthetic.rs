use fastrand::Rng;

use super::catalog::attack_record;
use super::estimate::{
    estimate_capacity_tbps, estimate_route, known_countries, propagation_latency_ms,
    route_length_km, round_to,
};
use crate::{DatasetKind, GeoPoint, Record};

/// Number of generated records per dataset kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticCounts {
    pub cables: usize,
    pub exchange_points: usize,
    pub data_centers: usize,
    pub attacks: usize,
}

impl Default for SyntheticCounts {
    fn default() -> Self {
        Self {
            cables: 450,
            exchange_points: 800,
            data_centers: 1_000,
            attacks: 120,
        }
    }
}

impl SyntheticCounts {
    pub const fn none() -> Self {
        Self {
            cables: 0,
            exchange_points: 0,
            data_centers: 0,
            attacks: 0,
        }
    }

    pub const fn for_kind(&self, kind: DatasetKind) -> usize {
        match kind {
            DatasetKind::Cables => self.cables,
            DatasetKind::ExchangePoints => self.exchange_points,
            DatasetKind::DataCenters => self.data_centers,
            DatasetKind::AttackTelemetry => self.attacks,
        }
    }
}

struct Region {
    country: &'static str,
    lat: (f64, f64),
    lon: (f64, f64),
    /// Coastal landing zone for cable endpoints.
    coast: (f64, f64),
}

const REGIONS: &[Region] = &[
    Region { country: "US", lat: (30.0, 47.0), lon: (-122.0, -75.0), coast: (36.85, -75.98) },
    Region { country: "BR", lat: (-30.0, -5.0), lon: (-55.0, -35.0), coast: (-3.73, -38.52) },
    Region { country: "GB", lat: (50.5, 55.5), lon: (-3.5, 0.5), coast: (50.83, -4.55) },
    Region { country: "FR", lat: (43.5, 49.5), lon: (-1.0, 7.0), coast: (43.30, 5.37) },
    Region { country: "DE", lat: (48.0, 54.0), lon: (7.0, 14.0), coast: (53.87, 8.70) },
    Region { country: "NL", lat: (51.5, 53.2), lon: (4.2, 6.8), coast: (52.46, 4.60) },
    Region { country: "ZA", lat: (-33.9, -25.0), lon: (18.4, 31.0), coast: (-33.72, 18.44) },
    Region { country: "NG", lat: (6.0, 12.0), lon: (3.0, 9.0), coast: (6.43, 3.42) },
    Region { country: "IN", lat: (12.0, 28.0), lon: (72.5, 88.0), coast: (19.08, 72.88) },
    Region { country: "SG", lat: (1.25, 1.45), lon: (103.6, 104.0), coast: (1.29, 103.85) },
    Region { country: "JP", lat: (33.0, 43.0), lon: (130.0, 141.5), coast: (34.30, 136.80) },
    Region { country: "AU", lat: (-37.8, -27.5), lon: (115.8, 153.0), coast: (-33.87, 151.21) },
    Region { country: "CL", lat: (-41.0, -20.0), lon: (-73.0, -70.0), coast: (-33.05, -71.61) },
    Region { country: "AE", lat: (23.0, 25.5), lon: (52.0, 56.0), coast: (25.27, 55.30) },
];

const OPERATORS: &[&str] = &[
    "Equinix",
    "Digital Realty",
    "NTT",
    "CyrusOne",
    "Iron Mountain",
    "Global Switch",
    "Africa Data Centres",
    "STACK Infrastructure",
];

const CABLE_OWNERS: &[&str] = &[
    "Google", "Meta", "Microsoft", "Amazon", "Orange", "Telxius", "NTT", "Tata", "SubCom",
];

/// Per-kind seed so each dataset is reproducible on its own.
pub(crate) const fn seed_for(kind: DatasetKind) -> u64 {
    match kind {
        DatasetKind::Cables => 0x00CA_B1E5,
        DatasetKind::ExchangePoints => 0x0001_8AE5,
        DatasetKind::DataCenters => 0x00DA_7ACE,
        DatasetKind::AttackTelemetry => 0x00A7_7ACC,
    }
}

/// Deterministic synthetic records of `kind` within regional bounds.
pub fn synthetic_records(kind: DatasetKind, count: usize, seed: u64) -> Vec<Record> {
    let mut rng = Rng::with_seed(seed);
    (0..count)
        .map(|index| match kind {
            DatasetKind::Cables => synthetic_cable(&mut rng, index),
            DatasetKind::ExchangePoints => synthetic_site(&mut rng, index, kind),
            DatasetKind::DataCenters => synthetic_site(&mut rng, index, kind),
            DatasetKind::AttackTelemetry => synthetic_attack(&mut rng, index),
        })
        .collect()
}

fn pick<'a, T>(rng: &mut Rng, items: &'a [T]) -> &'a T {
    &items[rng.usize(..items.len())]
}

fn between(rng: &mut Rng, (low, high): (f64, f64)) -> f64 {
    low + rng.f64() * (high - low)
}

fn synthetic_cable(rng: &mut Rng, index: usize) -> Record {
    let from = pick(rng, REGIONS);
    let mut to = pick(rng, REGIONS);
    while to.country == from.country {
        to = pick(rng, REGIONS);
    }

    // Nudge landing points along the coast so routes do not overlap exactly.
    let start = GeoPoint {
        lat: (from.coast.0 + between(rng, (-1.0, 1.0))).clamp(-89.0, 89.0),
        lon: from.coast.1 + between(rng, (-1.0, 1.0)),
    };
    let end = GeoPoint {
        lat: (to.coast.0 + between(rng, (-1.0, 1.0))).clamp(-89.0, 89.0),
        lon: to.coast.1 + between(rng, (-1.0, 1.0)),
    };
    let path = estimate_route(start, end, 6);
    let length_km = route_length_km(&path);
    let capacity = round_to(estimate_capacity_tbps(length_km) * between(rng, (0.5, 1.5)), 1);
    let owner_count = rng.usize(1..=3);
    let owners = (0..owner_count)
        .map(|_| (*pick(rng, CABLE_OWNERS)).to_owned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    Record::new(
        format!("synthetic-cable-{index:04}"),
        format!("{}-{} Express {}", from.country, to.country, index + 1),
        DatasetKind::Cables,
    )
    .with_path(path)
    .with_capacity_tbps(capacity)
    .with_owners(owners)
    .with_attribute("landing_countries", vec![from.country, to.country])
    .with_attribute("length_km", round_to(length_km, 0))
    .with_attribute("latency_ms", propagation_latency_ms(length_km))
}

fn synthetic_site(rng: &mut Rng, index: usize, kind: DatasetKind) -> Record {
    let region = pick(rng, REGIONS);
    let location = GeoPoint {
        lat: round_to(between(rng, region.lat), 4),
        lon: round_to(between(rng, region.lon), 4),
    };

    match kind {
        DatasetKind::ExchangePoints => Record::new(
            format!("synthetic-ixp-{index:04}"),
            format!("{}-IX {}", region.country, index + 1),
            kind,
        )
        .with_location(location)
        .with_country(region.country)
        .with_attribute("participants", rng.u32(5..400)),
        _ => {
            let operator = *pick(rng, OPERATORS);
            Record::new(
                format!("synthetic-dc-{index:04}"),
                format!("{operator} {}{}", region.country, index + 1),
                kind,
            )
            .with_location(location)
            .with_owners(vec![operator.to_owned()])
            .with_country(region.country)
        }
    }
}

fn synthetic_attack(rng: &mut Rng, index: usize) -> Record {
    let countries: Vec<&str> = known_countries().collect();
    let origin = *pick(rng, &countries);
    let target = *pick(rng, &countries);
    let share = round_to(between(rng, (0.05, 1.5)), 2);

    let mut record = attack_record(origin, target, share);
    record.id = format!("synthetic-attack-{index:04}");
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_yields_identical_records() {
        let first = synthetic_records(DatasetKind::DataCenters, 25, 42);
        let second = synthetic_records(DatasetKind::DataCenters, 25, 42);
        assert_eq!(first, second);
        assert_ne!(first, synthetic_records(DatasetKind::DataCenters, 25, 43));
    }

    #[test]
    fn sites_stay_inside_their_region() {
        for record in synthetic_records(DatasetKind::ExchangePoints, 200, seed_for(DatasetKind::ExchangePoints)) {
            let country = record.country.as_deref().expect("country");
            let region = REGIONS
                .iter()
                .find(|region| region.country == country)
                .expect("known region");
            let location = record.location.expect("location");
            assert!(location.lat >= region.lat.0 - 1e-3 && location.lat <= region.lat.1 + 1e-3);
            assert!(location.lon >= region.lon.0 - 1e-3 && location.lon <= region.lon.1 + 1e-3);
        }
    }

    #[test]
    fn cables_join_two_different_countries() {
        for record in synthetic_records(DatasetKind::Cables, 50, seed_for(DatasetKind::Cables)) {
            let countries = record.attributes["landing_countries"]
                .as_array()
                .expect("landing countries");
            assert_ne!(countries[0], countries[1]);
            assert!(record.capacity_tbps.unwrap_or_default() > 0.0);
            assert!(!record.owners.is_empty());
        }
    }
}
