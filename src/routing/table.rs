//! Route tables: prefix-bucketed candidate storage with atomic publication.
//!
//! # Responsibilities
//! - Bucket routing entries by their literal pattern prefix
//! - Resolve lookups by walking the path right-to-left across `/` boundaries
//! - Publish replacement tables atomically (readers never see partial merges)
//!
//! # Design Decisions
//! - Tables are immutable once built; updates build a fresh table off to the
//!   side and publish it with one `ArcSwap::store`
//! - Lookup cost is bounded by path depth, not candidate count
//! - First matching candidate within a bucket wins (declaration order)

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::external::ModuleDescriptor;
use crate::observability::metrics as metric_names;
use crate::routing::entry::{MethodSpec, Endpoint, RoutingEntry};
use crate::routing::matcher::entry_matches;

/// Immutable mapping from literal prefix to ordered candidate lists.
#[derive(Debug, Default)]
pub struct RouteTable {
    buckets: HashMap<String, Vec<Arc<RoutingEntry>>>,
}

impl RouteTable {
    /// Build a table from entries, preserving declaration order per bucket.
    pub fn from_entries(entries: Vec<RoutingEntry>) -> Self {
        let mut buckets: HashMap<String, Vec<Arc<RoutingEntry>>> = HashMap::new();
        for entry in entries {
            let prefix = entry.literal_prefix().to_string();
            buckets.entry(prefix).or_default().push(Arc::new(entry));
        }
        Self { buckets }
    }

    /// Build a table from one module's declared interfaces.
    pub fn from_descriptor(descriptor: &ModuleDescriptor) -> Self {
        Self::from_descriptors(std::slice::from_ref(descriptor))
    }

    /// Build a table from the union of several modules' declared interfaces.
    pub fn from_descriptors(descriptors: &[ModuleDescriptor]) -> Self {
        let mut entries = Vec::new();
        for descriptor in descriptors {
            for interface in &descriptor.interfaces {
                for endpoint in &interface.endpoints {
                    entries.push(RoutingEntry {
                        module_id: descriptor.module_id.clone(),
                        base_location: descriptor.base_location.clone(),
                        interface_id: interface.id.clone(),
                        interface_type: interface.interface_type.clone(),
                        endpoint: Endpoint {
                            methods: MethodSpec::from_declared(&endpoint.methods),
                            path_pattern: endpoint.pattern().to_string(),
                            permissions_required: endpoint.permissions_required.clone(),
                            permissions_desired: endpoint.permissions_desired.clone(),
                        },
                    });
                }
            }
        }
        Self::from_entries(entries)
    }

    /// Number of candidate entries across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// True when the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Resolve a request to at most one entry.
    ///
    /// Walks the path right-to-left, truncating at successive `/` boundaries,
    /// and tests the bucket at each truncation. The first matching candidate
    /// wins; an empty bucket at every level means no match.
    pub fn lookup(
        &self,
        method: &str,
        path: &str,
        module_hint: Option<&str>,
    ) -> Option<Arc<RoutingEntry>> {
        for prefix in PrefixWalk::new(path) {
            if let Some(bucket) = self.buckets.get(prefix) {
                for candidate in bucket {
                    if entry_matches(candidate, method, path, module_hint) {
                        return Some(Arc::clone(candidate));
                    }
                }
            }
        }
        None
    }
}

/// Iterator over prefix truncations of a path, longest first.
///
/// `/foo/123` yields `/foo/123`, `/foo/`, `/`, and finally the empty prefix
/// (for patterns that start with a wildcard).
struct PrefixWalk<'a> {
    path: &'a str,
    next: Option<&'a str>,
}

impl<'a> PrefixWalk<'a> {
    fn new(path: &'a str) -> Self {
        Self { path, next: Some(path) }
    }
}

impl<'a> Iterator for PrefixWalk<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.next?;
        self.next = if current.is_empty() {
            None
        } else {
            let trimmed = current.strip_suffix('/').unwrap_or(current);
            match trimmed.rfind('/') {
                Some(idx) => Some(&self.path[..idx + 1]),
                None => Some(""),
            }
        };
        Some(current)
    }
}

/// Atomically swappable ingress/egress table pair.
///
/// Created empty at startup, populated by the bootstrap event, and replaced
/// wholesale on discovery or entitlement changes.
pub struct RouteTables {
    ingress: ArcSwap<RouteTable>,
    egress: ArcSwap<RouteTable>,
}

impl RouteTables {
    /// Create an empty pair.
    pub fn new() -> Self {
        Self {
            ingress: ArcSwap::from_pointee(RouteTable::default()),
            egress: ArcSwap::from_pointee(RouteTable::default()),
        }
    }

    /// Current ingress snapshot. One reference per lookup.
    pub fn ingress(&self) -> Arc<RouteTable> {
        self.ingress.load_full()
    }

    /// Current egress snapshot.
    pub fn egress(&self) -> Arc<RouteTable> {
        self.egress.load_full()
    }

    /// Publish a replacement ingress table.
    pub fn publish_ingress(&self, table: RouteTable) {
        tracing::info!(entries = table.len(), "Publishing ingress route table");
        self.ingress.store(Arc::new(table));
        metrics::counter!(metric_names::ROUTE_TABLE_SWAPS_TOTAL, "direction" => "ingress")
            .increment(1);
    }

    /// Publish a replacement egress table.
    pub fn publish_egress(&self, table: RouteTable) {
        tracing::info!(entries = table.len(), "Publishing egress route table");
        self.egress.store(Arc::new(table));
        metrics::counter!(metric_names::ROUTE_TABLE_SWAPS_TOTAL, "direction" => "egress")
            .increment(1);
    }
}

impl Default for RouteTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::entry::INTERFACE_TYPE_MULTIPLE;

    fn entry(module_id: &str, pattern: &str, methods: &[&str], multiple: bool) -> RoutingEntry {
        RoutingEntry {
            module_id: module_id.to_string(),
            base_location: "http://mod.local:8081/".parse().unwrap(),
            interface_id: "iface".to_string(),
            interface_type: multiple.then(|| INTERFACE_TYPE_MULTIPLE.to_string()),
            endpoint: Endpoint {
                methods: MethodSpec::from_declared(
                    &methods.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                ),
                path_pattern: pattern.to_string(),
                permissions_required: vec![],
                permissions_desired: vec![],
            },
        }
    }

    #[test]
    fn prefix_walk_order() {
        let walked: Vec<&str> = PrefixWalk::new("/foo/123").collect();
        assert_eq!(walked, vec!["/foo/123", "/foo/", "/", ""]);

        let walked: Vec<&str> = PrefixWalk::new("/").collect();
        assert_eq!(walked, vec!["/", ""]);
    }

    #[test]
    fn scenario_a_method_gate() {
        let table = RouteTable::from_entries(vec![entry("mod-foo-1.0.0", "/foo/{id}", &["GET"], false)]);
        assert!(table.lookup("GET", "/foo/123", None).is_some());
        assert!(table.lookup("POST", "/foo/123", None).is_none());
    }

    #[test]
    fn scenario_b_multiple_needs_hint() {
        let table = RouteTable::from_entries(vec![
            entry("mod-a-1.0.0", "/shared", &["*"], true),
            entry("mod-b-1.0.0", "/shared", &["*"], true),
        ]);
        assert!(table.lookup("GET", "/shared", None).is_none());
        let matched = table.lookup("GET", "/shared", Some("mod-b-1.0.0")).unwrap();
        assert_eq!(matched.module_id, "mod-b-1.0.0");
    }

    #[test]
    fn longest_literal_prefix_wins() {
        let table = RouteTable::from_entries(vec![
            entry("mod-wide-1.0.0", "/foo/*", &["*"], false),
            entry("mod-narrow-1.0.0", "/foo/bar/{id}", &["*"], false),
        ]);
        // The deeper bucket is tested first during the right-to-left walk.
        let matched = table.lookup("GET", "/foo/bar/7", None).unwrap();
        assert_eq!(matched.module_id, "mod-narrow-1.0.0");
        let matched = table.lookup("GET", "/foo/other", None).unwrap();
        assert_eq!(matched.module_id, "mod-wide-1.0.0");
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let table = RouteTable::from_entries(vec![
            entry("mod-first-1.0.0", "/foo/{id}", &["*"], false),
            entry("mod-second-1.0.0", "/foo/{id}", &["*"], false),
        ]);
        let matched = table.lookup("GET", "/foo/1", None).unwrap();
        assert_eq!(matched.module_id, "mod-first-1.0.0");
    }

    #[test]
    fn lookup_is_idempotent() {
        let table = RouteTable::from_entries(vec![entry("mod-foo-1.0.0", "/foo/{id}", &["GET"], false)]);
        let first = table.lookup("GET", "/foo/9", None).unwrap();
        let second = table.lookup("GET", "/foo/9", None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn swap_replaces_wholesale() {
        let tables = RouteTables::new();
        assert!(tables.ingress().is_empty());

        tables.publish_ingress(RouteTable::from_entries(vec![entry(
            "mod-foo-1.0.0",
            "/foo/{id}",
            &["GET"],
            false,
        )]));
        let snapshot = tables.ingress();
        assert_eq!(snapshot.len(), 1);

        // A reader holding the old snapshot is unaffected by the next swap.
        tables.publish_ingress(RouteTable::default());
        assert_eq!(snapshot.len(), 1);
        assert!(tables.ingress().is_empty());
    }
}
