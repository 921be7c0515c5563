//! Configuration-driven routing: alert name to handler plus enriched payload.
//!
//! The route set is held behind an [`ArcSwap`] so an out-of-band reload can
//! replace rules and override tables atomically without a restart; in-flight
//! resolutions keep the snapshot they loaded.

use std::collections::BTreeMap;

use arc_swap::ArcSwap;
use regex::Regex;
use std::sync::Arc;

use crate::models::{
    alert::AlertEvent,
    route::{ResolvedRoute, RouteSet},
};

/// Matches `{label}` placeholders inside payload template values.
fn placeholder_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("static regex"))
}

/// Owns the current route set and resolves alerts against it.
pub struct RouteManager {
    inner: ArcSwap<RouteSet>,
}

impl RouteManager {
    /// Creates a manager over an initial route set.
    pub fn new(set: RouteSet) -> Self {
        Self { inner: ArcSwap::from_pointee(set) }
    }

    /// Atomically replaces the route set. Readers see either the old or the
    /// new snapshot, never a mix.
    pub fn update(&self, set: RouteSet) {
        let routes = set.routes.len();
        self.inner.store(Arc::new(set));
        tracing::info!(routes, "Route set replaced.");
    }

    /// Number of rules in the current snapshot.
    pub fn route_count(&self) -> usize {
        self.inner.load().routes.len()
    }

    /// Resolves an alert to a handler and enriched payload.
    ///
    /// Returns `None` when the alert's name has no configured rule; routing
    /// gaps are terminal, since retrying cannot fix a missing configuration
    /// entry.
    pub fn resolve(&self, alert: &AlertEvent) -> Option<ResolvedRoute> {
        let set = self.inner.load();
        let name = alert.name()?;
        let rule = set.routes.get(name)?;

        let mut payload: BTreeMap<String, String> = rule
            .payload
            .iter()
            .map(|(key, value)| (key.clone(), substitute(value, alert)))
            .collect();

        // Group overrides first, then exact per-target entries on top.
        let target = alert.target();
        for group in set.overrides.groups.values() {
            if group.members.iter().any(|member| member == target) {
                for (key, value) in &group.payload {
                    payload.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(overrides) = set.overrides.targets.get(target) {
            for (key, value) in overrides {
                payload.insert(key.clone(), value.clone());
            }
        }

        Some(ResolvedRoute { handler: rule.handler.clone(), payload })
    }
}

/// Substitutes `{label}` placeholders from the alert's labels.
///
/// A placeholder referencing a missing label is left literal; partial
/// enrichment is preferred over failing the whole route.
fn substitute(template: &str, alert: &AlertEvent) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match alert.label(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
