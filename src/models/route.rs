//! Declarative routing configuration: rules keyed by alert name plus
//! per-target override tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single routing rule: which handler to invoke and the parameter payload
/// to hand it.
///
/// Payload values may contain `{label}` placeholders that are substituted
/// from the alert's labels at match time. A placeholder whose label is absent
/// is left literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    /// The registered handler name.
    pub handler: String,

    /// The payload template handed to the handler after enrichment.
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

/// Overrides applied to every member of a named group of targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOverride {
    /// The target identities belonging to this group.
    #[serde(default)]
    pub members: Vec<String>,

    /// Key/value pairs merged into the payload for members.
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

/// Target-specific payload overrides, individual and group-based.
///
/// Exact per-target entries take precedence over group-level ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideTables {
    /// Overrides keyed by exact target identity.
    #[serde(default)]
    pub targets: BTreeMap<String, BTreeMap<String, String>>,

    /// Overrides keyed by group name.
    #[serde(default)]
    pub groups: BTreeMap<String, GroupOverride>,
}

/// The full routing configuration: rule table plus override tables.
///
/// Read-only to the pipeline; replaced atomically on out-of-band reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteSet {
    /// Routing rules keyed by alert name.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteRule>,

    /// Per-target and group override tables.
    #[serde(default)]
    pub overrides: OverrideTables,
}

/// A route after placeholder substitution and override enrichment, ready for
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The handler to invoke.
    pub handler: String,

    /// The fully enriched payload.
    pub payload: BTreeMap<String, String>,
}
