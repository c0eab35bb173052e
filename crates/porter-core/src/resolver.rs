// Name resolution
//
// Maps human-readable location and shelf names to robot identifiers.
// Tables are built once per connection from the robot's own registries.
// Unknown inputs pass through unchanged: the robot is the authority on
// what exists, so a bad name surfaces as the remote call's own error
// rather than a second, local flavor of the same failure.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use porter_api::models::{Location, Shelf};

/// Immutable name → id tables for one robot.
#[derive(Debug, Default)]
pub struct Resolver {
    location_names: HashMap<String, String>,
    location_ids: HashSet<String>,
    shelf_names: HashMap<String, String>,
    shelf_ids: HashSet<String>,
}

impl Resolver {
    /// Build tables from the robot's registered locations and shelves.
    pub fn new(locations: &[Location], shelves: &[Shelf]) -> Self {
        let mut resolver = Self::default();
        for location in locations {
            resolver
                .location_names
                .insert(location.name.clone(), location.id.clone());
            resolver.location_ids.insert(location.id.clone());
        }
        for shelf in shelves {
            resolver
                .shelf_names
                .insert(shelf.name.clone(), shelf.id.clone());
            resolver.shelf_ids.insert(shelf.id.clone());
        }
        resolver
    }

    /// Resolve a location name to its id. Known ids and unknown strings
    /// both pass through unchanged.
    pub fn resolve_location(&self, name_or_id: &str) -> String {
        if self.location_ids.contains(name_or_id) {
            return name_or_id.to_owned();
        }
        if let Some(id) = self.location_names.get(name_or_id) {
            return id.clone();
        }
        warn!(input = name_or_id, "unknown location, passing through");
        name_or_id.to_owned()
    }

    /// Resolve a shelf name to its id, with the same pass-through rules
    /// as [`resolve_location`](Self::resolve_location).
    pub fn resolve_shelf(&self, name_or_id: &str) -> String {
        if self.shelf_ids.contains(name_or_id) {
            return name_or_id.to_owned();
        }
        if let Some(id) = self.shelf_names.get(name_or_id) {
            return id.clone();
        }
        warn!(input = name_or_id, "unknown shelf, passing through");
        name_or_id.to_owned()
    }

    pub fn location_count(&self) -> usize {
        self.location_ids.len()
    }

    pub fn shelf_count(&self) -> usize {
        self.shelf_ids.len()
    }
}
