use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Serialize;

use crate::clock::duration_ms;
use crate::{DataResult, DatasetKind};

/// Events that may trigger revalidation of a cached dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidateTrigger {
    Scheduled,
    ManualRefresh,
    UpstreamChange,
}

/// Freshness policy for one dataset kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationRule {
    pub ttl: Duration,
    /// Serve stale data immediately while refreshing in the background.
    pub stale_while_revalidate: bool,
    pub revalidate_triggers: BTreeSet<RevalidateTrigger>,
}

impl InvalidationRule {
    pub fn new(
        ttl: Duration,
        stale_while_revalidate: bool,
        triggers: impl IntoIterator<Item = RevalidateTrigger>,
    ) -> Self {
        Self {
            ttl,
            stale_while_revalidate,
            revalidate_triggers: triggers.into_iter().collect(),
        }
    }
}

/// Static table of invalidation rules keyed by dataset kind.
#[derive(Debug, Clone)]
pub struct InvalidationStrategy {
    rules: HashMap<String, InvalidationRule>,
    default_rule: InvalidationRule,
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

impl Default for InvalidationStrategy {
    fn default() -> Self {
        use RevalidateTrigger::{ManualRefresh, Scheduled, UpstreamChange};

        let directory = InvalidationRule::new(
            DAY * 7,
            true,
            [Scheduled, ManualRefresh, UpstreamChange],
        );

        let rules = HashMap::from([
            (
                DatasetKind::Cables.as_str().to_owned(),
                InvalidationRule::new(DAY * 30, true, [Scheduled, ManualRefresh, UpstreamChange]),
            ),
            (
                DatasetKind::AttackTelemetry.as_str().to_owned(),
                InvalidationRule::new(Duration::from_secs(60), false, [Scheduled, ManualRefresh]),
            ),
            (DatasetKind::ExchangePoints.as_str().to_owned(), directory.clone()),
            (DatasetKind::DataCenters.as_str().to_owned(), directory),
        ]);

        Self {
            rules,
            default_rule: InvalidationRule::new(
                Duration::from_secs(60 * 60),
                false,
                [Scheduled, ManualRefresh],
            ),
        }
    }
}

impl InvalidationStrategy {
    /// Replace the rule for one dataset kind.
    pub fn with_rule(mut self, kind: DatasetKind, rule: InvalidationRule) -> Self {
        self.rules.insert(kind.as_str().to_owned(), rule);
        self
    }

    pub fn rule_for_kind(&self, kind: &str) -> &InvalidationRule {
        self.rules.get(kind).unwrap_or(&self.default_rule)
    }

    pub fn rule_for(&self, kind: DatasetKind) -> &InvalidationRule {
        self.rule_for_kind(kind.as_str())
    }

    pub fn rule_for_key(&self, key: &str) -> &InvalidationRule {
        self.rule_for_kind(dataset_kind_of(key))
    }

    /// Whether `result` has outlived its rule's TTL, measured from the
    /// timestamp it was produced at.
    pub fn is_stale(&self, key: &str, result: &DataResult, now_ms: i64) -> bool {
        let ttl_ms = duration_ms(self.rule_for_key(key).ttl);
        result.age_ms(now_ms) > ttl_ms
    }

    pub fn accepts(&self, key: &str, trigger: RevalidateTrigger) -> bool {
        self.rule_for_key(key)
            .revalidate_triggers
            .contains(&trigger)
    }
}

/// Dataset kind encoded in a cache key: the second-to-last `:` segment, or
/// the first segment when the key has none.
pub fn dataset_kind_of(key: &str) -> &str {
    let segments: Vec<&str> = key.split(':').collect();
    if segments.len() >= 2 {
        segments[segments.len() - 2]
    } else {
        segments[0]
    }
}
