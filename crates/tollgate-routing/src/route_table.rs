//! In-memory route table with weighted backend selection.
//!
//! Each `(method, path)` key maps to an ordered list of route entries. Several
//! entries may share a key to split traffic (canary releases, weighted fan-out);
//! [`RouteTable::match_route`] picks one enabled entry per call by a random
//! draw proportional to entry weight.
//!
//! The whole table sits behind one reader/writer lock. Entries are stored as
//! `Arc<RouteEntry>` and never mutated in place, so a matched entry stays
//! valid for the caller even if the table is rebuilt concurrently.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tollgate_core::RouteId;

use crate::error::{Result, RoutingError};

/// Tracing target for route table mutations.
const AUDIT_TARGET: &str = "tollgate::audit";

/// One `(method, path)` to backend binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Unique identity of this entry within its key.
    pub id: RouteId,
    /// HTTP method; normalised to upper case on insertion.
    pub method: String,
    /// Request path, matched exactly.
    pub path: String,
    /// Logical service name used for rate limiting and circuit breaking.
    pub service_name: String,
    /// Base URL of the backend that receives matched traffic.
    pub backend_url: String,
    /// Relative selection weight among entries sharing the key.
    #[serde(default = "RouteEntry::default_weight")]
    pub weight: u32,
    /// Headers set on the forwarded request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Disabled entries are kept but never matched.
    #[serde(default = "RouteEntry::default_enabled")]
    pub enabled: bool,
}

impl RouteEntry {
    /// Create an enabled entry with weight 1 and no header overrides.
    #[must_use]
    pub fn new(
        id: RouteId,
        method: impl Into<String>,
        path: impl Into<String>,
        service_name: impl Into<String>,
        backend_url: impl Into<String>,
    ) -> Self {
        Self {
            id,
            method: method.into(),
            path: path.into(),
            service_name: service_name.into(),
            backend_url: backend_url.into(),
            weight: Self::default_weight(),
            headers: HashMap::new(),
            enabled: Self::default_enabled(),
        }
    }

    /// Set the selection weight.
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a header override.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The routing key this entry is stored under.
    #[must_use]
    pub fn key(&self) -> RouteKey {
        RouteKey::new(&self.method, &self.path)
    }

    const fn default_weight() -> u32 {
        1
    }

    const fn default_enabled() -> bool {
        true
    }

    /// Check required fields and normalise the method.
    fn validated(mut self) -> Result<Self> {
        if self.method.trim().is_empty() {
            return Err(RoutingError::InvalidRoute("method is required".into()));
        }
        if self.path.trim().is_empty() {
            return Err(RoutingError::InvalidRoute("path is required".into()));
        }
        if !self.path.starts_with('/') {
            return Err(RoutingError::InvalidRoute(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.service_name.trim().is_empty() {
            return Err(RoutingError::InvalidRoute("service name is required".into()));
        }
        self.method = self.method.trim().to_ascii_uppercase();
        Ok(self)
    }
}

/// Routing key: upper-cased method plus exact path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    method: String,
    path: String,
}

impl RouteKey {
    /// Build a key, normalising the method.
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.trim().to_ascii_uppercase(),
            path: path.to_string(),
        }
    }

    /// The normalised method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

type Table = HashMap<RouteKey, Vec<Arc<RouteEntry>>>;

/// The live route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Table>,
}

impl RouteTable {
    /// Create an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route entry.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::InvalidRoute` if the method, path or service name
    /// is empty, and `RoutingError::DuplicateRoute` if an entry with the same
    /// ID already exists under the same key.
    pub fn add_route(&self, entry: RouteEntry) -> Result<()> {
        let entry = entry.validated()?;
        let mut routes = self.routes.write();
        insert_entry(&mut routes, entry.clone())?;
        drop(routes);

        tracing::info!(
            target: AUDIT_TARGET,
            action = "route.add",
            route_id = %entry.id,
            method = %entry.method,
            path = %entry.path,
            service = %entry.service_name,
            backend = %entry.backend_url,
            weight = entry.weight,
            "Route added"
        );
        Ok(())
    }

    /// Remove the first entry with the given ID.
    ///
    /// A key whose list becomes empty is dropped from the table.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::RouteNotFound` if no entry has this ID.
    pub fn remove_route(&self, id: &RouteId) -> Result<RouteEntry> {
        let removed = {
            let mut routes = self.routes.write();
            remove_entry(&mut routes, id)
        };
        let (_, _, entry) = removed.ok_or_else(|| RoutingError::RouteNotFound(id.clone()))?;

        tracing::info!(
            target: AUDIT_TARGET,
            action = "route.remove",
            route_id = %id,
            method = %entry.method,
            path = %entry.path,
            "Route removed"
        );
        Ok(RouteEntry::clone(&entry))
    }

    /// Replace an existing entry, matched by ID, with a new one.
    ///
    /// The removal and the insertion happen under a single write lock. If the
    /// new entry cannot be inserted the old one is put back where it was, so a
    /// failed update leaves the table unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::RouteNotFound` if no entry has the ID, plus any
    /// error [`RouteTable::add_route`] can return for the new entry.
    pub fn update_route(&self, entry: RouteEntry) -> Result<()> {
        let entry = entry.validated()?;
        let mut routes = self.routes.write();

        let (old_key, old_index, old) = remove_entry(&mut routes, &entry.id)
            .ok_or_else(|| RoutingError::RouteNotFound(entry.id.clone()))?;

        if let Err(err) = insert_entry(&mut routes, entry.clone()) {
            let list = routes.entry(old_key).or_default();
            let index = old_index.min(list.len());
            list.insert(index, old);
            return Err(err);
        }
        drop(routes);

        tracing::info!(
            target: AUDIT_TARGET,
            action = "route.update",
            route_id = %entry.id,
            method = %entry.method,
            path = %entry.path,
            service = %entry.service_name,
            weight = entry.weight,
            enabled = entry.enabled,
            "Route updated"
        );
        Ok(())
    }

    /// Select one enabled entry for `(method, path)`.
    ///
    /// Returns `None` if the key is unknown or none of its entries is enabled.
    #[must_use]
    pub fn match_route(&self, method: &str, path: &str) -> Option<Arc<RouteEntry>> {
        self.match_route_with(method, path, &mut rand::thread_rng())
    }

    /// Same as [`RouteTable::match_route`] with a caller-supplied random source.
    pub fn match_route_with<R>(&self, method: &str, path: &str, rng: &mut R) -> Option<Arc<RouteEntry>>
    where
        R: Rng + ?Sized,
    {
        let key = RouteKey::new(method, path);
        let routes = self.routes.read();
        let enabled: Vec<&Arc<RouteEntry>> =
            routes.get(&key)?.iter().filter(|e| e.enabled).collect();
        select_weighted(&enabled, rng).map(Arc::clone)
    }

    /// Snapshot of every entry in the table.
    #[must_use]
    pub fn list_routes(&self) -> Vec<RouteEntry> {
        let routes = self.routes.read();
        let mut entries: Vec<RouteEntry> = routes
            .values()
            .flatten()
            .map(|entry| RouteEntry::clone(entry))
            .collect();
        drop(routes);
        entries.sort_by(|a, b| (a.key(), &a.id).cmp(&(b.key(), &b.id)));
        entries
    }

    /// Snapshot of the entries under one key, enabled or not, in list order.
    #[must_use]
    pub fn get_routes(&self, method: &str, path: &str) -> Vec<RouteEntry> {
        let key = RouteKey::new(method, path);
        self.routes
            .read()
            .get(&key)
            .map(|list| list.iter().map(|entry| RouteEntry::clone(entry)).collect())
            .unwrap_or_default()
    }

    /// Rebuild the table from a complete list of entries.
    ///
    /// The new table is built and validated without holding the lock, then
    /// swapped in with one write. Concurrent matches see either the old table
    /// or the new one. On error the live table is untouched.
    ///
    /// # Errors
    ///
    /// Returns the first validation or duplicate error among `entries`.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = RouteEntry>) -> Result<usize> {
        let mut next = Table::new();
        let mut count = 0usize;
        for entry in entries {
            insert_entry(&mut next, entry.validated()?)?;
            count += 1;
        }

        let previous = std::mem::replace(&mut *self.routes.write(), next);
        let previous_count: usize = previous.values().map(Vec::len).sum();

        tracing::info!(
            target: AUDIT_TARGET,
            action = "route.replace_all",
            previous = previous_count,
            current = count,
            "Route table replaced"
        );
        Ok(count)
    }

    /// Total number of entries across all keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().values().map(Vec::len).sum()
    }

    /// Check if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

/// Append a validated entry to its key's list.
fn insert_entry(table: &mut Table, entry: RouteEntry) -> Result<()> {
    let key = entry.key();
    let list = table.entry(key).or_default();
    if list.iter().any(|existing| existing.id == entry.id) {
        return Err(RoutingError::DuplicateRoute {
            id: entry.id,
            method: entry.method,
            path: entry.path,
        });
    }
    list.push(Arc::new(entry));
    Ok(())
}

/// Remove the first entry with `id`, returning its key, position and value.
fn remove_entry(table: &mut Table, id: &RouteId) -> Option<(RouteKey, usize, Arc<RouteEntry>)> {
    let (key, index) = table.iter().find_map(|(key, list)| {
        list.iter()
            .position(|entry| entry.id == *id)
            .map(|index| (key.clone(), index))
    })?;

    let list = table.get_mut(&key)?;
    let entry = list.remove(index);
    if list.is_empty() {
        table.remove(&key);
    }
    Some((key, index, entry))
}

/// Weighted random pick.
///
/// Draws a uniform integer in `[0, total)` and returns the first entry whose
/// cumulative weight exceeds the draw. With a zero total every entry is
/// equally likely.
fn select_weighted<'a, R>(
    entries: &[&'a Arc<RouteEntry>],
    rng: &mut R,
) -> Option<&'a Arc<RouteEntry>>
where
    R: Rng + ?Sized,
{
    if entries.is_empty() {
        return None;
    }

    let total: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
    if total == 0 {
        return entries.choose(rng).copied();
    }

    let draw = rng.gen_range(0..total);
    let mut cumulative = 0u64;
    for &entry in entries {
        cumulative += u64::from(entry.weight);
        if draw < cumulative {
            return Some(entry);
        }
    }
    entries.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn id(s: &str) -> RouteId {
        RouteId::new(s).unwrap()
    }

    fn entry(route_id: &str, path: &str) -> RouteEntry {
        RouteEntry::new(id(route_id), "get", path, "svc", "http://backend:9000")
    }

    #[test]
    fn add_and_match() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        let matched = table.match_route("GET", "/x").unwrap();
        assert_eq!(matched.id, id("a"));
        assert_eq!(matched.method, "GET");
        assert!(table.match_route("POST", "/x").is_none());
        assert!(table.match_route("GET", "/y").is_none());
    }

    #[test]
    fn add_rejects_missing_fields() {
        let table = RouteTable::new();

        let mut no_method = entry("a", "/x");
        no_method.method = String::new();
        assert!(matches!(
            table.add_route(no_method),
            Err(RoutingError::InvalidRoute(_))
        ));

        assert!(matches!(
            table.add_route(entry("a", "")),
            Err(RoutingError::InvalidRoute(_))
        ));

        let mut no_service = entry("a", "/x");
        no_service.service_name = " ".into();
        assert!(matches!(
            table.add_route(no_service),
            Err(RoutingError::InvalidRoute(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn add_rejects_duplicate_id_under_same_key() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        let err = table.add_route(entry("a", "/x")).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateRoute { .. }));

        // Same ID under a different key is allowed.
        table.add_route(entry("a", "/y")).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_route_drops_empty_key() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        let removed = table.remove_route(&id("a")).unwrap();
        assert_eq!(removed.path, "/x");
        assert!(table.is_empty());
        assert!(table.get_routes("GET", "/x").is_empty());
    }

    #[test]
    fn remove_unknown_route_fails() {
        let table = RouteTable::new();
        assert_eq!(
            table.remove_route(&id("missing")),
            Err(RoutingError::RouteNotFound(id("missing")))
        );
    }

    #[test]
    fn update_replaces_entry() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        table.update_route(entry("a", "/z").with_weight(7)).unwrap();

        assert!(table.match_route("GET", "/x").is_none());
        let matched = table.match_route("GET", "/z").unwrap();
        assert_eq!(matched.weight, 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn update_unknown_route_adds_nothing() {
        let table = RouteTable::new();
        let err = table.update_route(entry("ghost", "/x")).unwrap_err();
        assert_eq!(err, RoutingError::RouteNotFound(id("ghost")));
        assert!(table.is_empty());
    }

    #[test]
    fn failed_update_restores_old_entry() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();
        table.add_route(entry("b", "/x")).unwrap();

        let mut invalid = entry("a", "/x");
        invalid.service_name = String::new();
        assert!(table.update_route(invalid).is_err());

        let ids: Vec<_> = table
            .get_routes("GET", "/x")
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![id("a"), id("b")]);
    }

    #[test]
    fn match_skips_disabled_entries() {
        let table = RouteTable::new();
        table
            .add_route(entry("off", "/x").with_enabled(false).with_weight(100))
            .unwrap();
        table.add_route(entry("on", "/x").with_weight(1)).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let matched = table.match_route_with("GET", "/x", &mut rng).unwrap();
            assert_eq!(matched.id, id("on"));
        }
    }

    #[test]
    fn match_none_when_all_disabled() {
        let table = RouteTable::new();
        table
            .add_route(entry("off", "/x").with_enabled(false))
            .unwrap();
        assert!(table.match_route("GET", "/x").is_none());
    }

    #[test]
    fn weighted_selection_converges() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x").with_weight(1)).unwrap();
        table.add_route(entry("b", "/x").with_weight(3)).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let picks_b = (0..4000)
            .filter(|_| table.match_route_with("GET", "/x", &mut rng).unwrap().id == id("b"))
            .count();

        assert!(
            (2900..=3100).contains(&picks_b),
            "entry b picked {picks_b} times"
        );
    }

    #[test]
    fn zero_weights_pick_uniformly() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x").with_weight(0)).unwrap();
        table.add_route(entry("b", "/x").with_weight(0)).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let picks_a = (0..2000)
            .filter(|_| table.match_route_with("GET", "/x", &mut rng).unwrap().id == id("a"))
            .count();
        assert!((850..=1150).contains(&picks_a), "entry a picked {picks_a} times");
    }

    #[test]
    fn zero_weight_entry_loses_to_weighted_one() {
        let table = RouteTable::new();
        table.add_route(entry("zero", "/x").with_weight(0)).unwrap();
        table.add_route(entry("one", "/x").with_weight(1)).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let matched = table.match_route_with("GET", "/x", &mut rng).unwrap();
            assert_eq!(matched.id, id("one"));
        }
    }

    #[test]
    fn list_routes_is_a_copy() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        let mut listed = table.list_routes();
        listed[0].enabled = false;

        assert!(table.match_route("GET", "/x").is_some());
    }

    #[test]
    fn replace_all_swaps_table() {
        let table = RouteTable::new();
        table.add_route(entry("old", "/old")).unwrap();

        let count = table
            .replace_all(vec![entry("a", "/x"), entry("b", "/x"), entry("c", "/y")])
            .unwrap();

        assert_eq!(count, 3);
        assert!(table.match_route("GET", "/old").is_none());
        assert_eq!(table.get_routes("GET", "/x").len(), 2);
    }

    #[test]
    fn replace_all_error_keeps_live_table() {
        let table = RouteTable::new();
        table.add_route(entry("old", "/old")).unwrap();

        let err = table
            .replace_all(vec![entry("a", "/x"), entry("a", "/x")])
            .unwrap_err();

        assert!(matches!(err, RoutingError::DuplicateRoute { .. }));
        assert!(table.match_route("GET", "/old").is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn matched_entry_outlives_removal() {
        let table = RouteTable::new();
        table.add_route(entry("a", "/x")).unwrap();

        let matched = table.match_route("GET", "/x").unwrap();
        table.remove_route(&id("a")).unwrap();

        assert_eq!(matched.backend_url, "http://backend:9000");
    }

    #[test]
    fn entry_deserializes_with_defaults() {
        let json = r#"{
            "id": "r1",
            "method": "post",
            "path": "/v1/chat",
            "service_name": "chat",
            "backend_url": "http://chat:8000"
        }"#;
        let entry: RouteEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.weight, 1);
        assert!(entry.enabled);
        assert!(entry.headers.is_empty());
    }
}
