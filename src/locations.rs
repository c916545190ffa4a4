/// Location registry for the flood risk monitoring service.
///
/// Holds the set of locations currently scheduled for monitoring, plus the
/// built-in catalog of cities used when no locations are configured. The
/// registry is an owned value passed to whoever needs lookups; there is no
/// process-wide list.
///
/// Registering a name that is already present is rejected with
/// `DuplicateLocation`. Upserting would silently change the vulnerability
/// profile of a location that already has history scored under the old one.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::model::{Location, MonitorError};

// ---------------------------------------------------------------------------
// Built-in city catalog
// ---------------------------------------------------------------------------

/// Static profile for a catalog city.
pub struct CityProfile {
    pub name: &'static str,
    /// State or union territory.
    pub region: &'static str,
    pub lat: f64,
    pub lng: f64,
    pub population: u64,
    pub vulnerability_factor: f64,
}

impl CityProfile {
    pub fn to_location(&self) -> Location {
        Location {
            name: self.name.to_string(),
            region: self.region.to_string(),
            lat: self.lat,
            lng: self.lng,
            population: self.population,
            vulnerability_factor: self.vulnerability_factor,
        }
    }
}

/// Cities monitored out of the box, with their baseline flood
/// vulnerability. Coastal and backwater cities sit near the top of the
/// scale; inland plateau cities near the bottom.
pub static CITY_CATALOG: &[CityProfile] = &[
    CityProfile { name: "Mumbai", region: "Maharashtra", lat: 19.0760, lng: 72.8777, population: 20_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Delhi", region: "Delhi", lat: 28.7041, lng: 77.1025, population: 19_000_000, vulnerability_factor: 0.3 },
    CityProfile { name: "Bangalore", region: "Karnataka", lat: 12.9716, lng: 77.5946, population: 12_000_000, vulnerability_factor: 0.4 },
    CityProfile { name: "Chennai", region: "Tamil Nadu", lat: 13.0827, lng: 80.2707, population: 11_000_000, vulnerability_factor: 0.9 },
    CityProfile { name: "Kolkata", region: "West Bengal", lat: 22.5726, lng: 88.3639, population: 15_000_000, vulnerability_factor: 0.85 },
    CityProfile { name: "Hyderabad", region: "Telangana", lat: 17.3850, lng: 78.4867, population: 10_000_000, vulnerability_factor: 0.5 },
    CityProfile { name: "Pune", region: "Maharashtra", lat: 18.5204, lng: 73.8567, population: 7_000_000, vulnerability_factor: 0.6 },
    CityProfile { name: "Ahmedabad", region: "Gujarat", lat: 23.0225, lng: 72.5714, population: 8_000_000, vulnerability_factor: 0.4 },
    CityProfile { name: "Jaipur", region: "Rajasthan", lat: 26.9124, lng: 75.7873, population: 4_000_000, vulnerability_factor: 0.2 },
    CityProfile { name: "Surat", region: "Gujarat", lat: 21.1702, lng: 72.8311, population: 6_000_000, vulnerability_factor: 0.7 },
    CityProfile { name: "Lucknow", region: "Uttar Pradesh", lat: 26.8467, lng: 80.9462, population: 4_000_000, vulnerability_factor: 0.5 },
    CityProfile { name: "Kanpur", region: "Uttar Pradesh", lat: 26.4499, lng: 80.3319, population: 3_000_000, vulnerability_factor: 0.6 },
    CityProfile { name: "Nagpur", region: "Maharashtra", lat: 21.1458, lng: 79.0882, population: 3_000_000, vulnerability_factor: 0.3 },
    CityProfile { name: "Thane", region: "Maharashtra", lat: 19.2183, lng: 72.9781, population: 2_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Visakhapatnam", region: "Andhra Pradesh", lat: 17.6868, lng: 83.2185, population: 2_000_000, vulnerability_factor: 0.7 },
    CityProfile { name: "Patna", region: "Bihar", lat: 25.5941, lng: 85.1376, population: 2_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Kochi", region: "Kerala", lat: 9.9312, lng: 76.2673, population: 2_000_000, vulnerability_factor: 0.9 },
    CityProfile { name: "Trivandrum", region: "Kerala", lat: 8.5241, lng: 76.9366, population: 1_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Alappuzha", region: "Kerala", lat: 9.5000, lng: 76.3333, population: 1_000_000, vulnerability_factor: 0.9 },
    CityProfile { name: "Cuddalore", region: "Tamil Nadu", lat: 11.7488, lng: 79.7714, population: 1_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Nagapattinam", region: "Tamil Nadu", lat: 10.7667, lng: 79.8333, population: 1_000_000, vulnerability_factor: 0.8 },
    CityProfile { name: "Madurai", region: "Tamil Nadu", lat: 9.9252, lng: 78.1198, population: 1_000_000, vulnerability_factor: 0.5 },
];

/// Looks up a catalog city by name. Returns `None` if not found.
pub fn find_city(name: &str) -> Option<&'static CityProfile> {
    CITY_CATALOG.iter().find(|c| c.name == name)
}

/// The whole catalog as owned `Location`s, ready to register.
pub fn catalog_locations() -> Vec<Location> {
    CITY_CATALOG.iter().map(CityProfile::to_location).collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks the shape of a location before it is admitted to the registry.
pub fn validate_location(location: &Location) -> Result<(), MonitorError> {
    let invalid = |reason: String| MonitorError::InvalidLocation {
        name: location.name.clone(),
        reason,
    };

    if location.name.trim().is_empty() {
        return Err(invalid("name must not be empty".to_string()));
    }
    if location.name.trim() != location.name {
        return Err(invalid("name must not have surrounding whitespace".to_string()));
    }
    if !location.lat.is_finite() || !(-90.0..=90.0).contains(&location.lat) {
        return Err(invalid(format!("latitude {} out of range", location.lat)));
    }
    if !location.lng.is_finite() || !(-180.0..=180.0).contains(&location.lng) {
        return Err(invalid(format!("longitude {} out of range", location.lng)));
    }
    if !location.vulnerability_factor.is_finite()
        || !(0.0..=1.0).contains(&location.vulnerability_factor)
    {
        return Err(invalid(format!(
            "vulnerability factor {} outside [0, 1]",
            location.vulnerability_factor
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The set of registered locations, keyed by name.
#[derive(Default)]
pub struct LocationRegistry {
    locations: RwLock<BTreeMap<String, Location>>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new location and returns its id.
    pub fn register(&self, location: Location) -> Result<String, MonitorError> {
        validate_location(&location)?;
        let mut locations = self.locations.write();
        if locations.contains_key(&location.name) {
            return Err(MonitorError::DuplicateLocation(location.name));
        }
        let id = location.name.clone();
        locations.insert(id.clone(), location);
        Ok(id)
    }

    pub fn deregister(&self, id: &str) -> Result<Location, MonitorError> {
        self.locations
            .write()
            .remove(id)
            .ok_or_else(|| MonitorError::UnknownLocation(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Location, MonitorError> {
        self.locations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownLocation(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locations.read().contains_key(id)
    }

    /// All registered locations, ordered by name.
    pub fn snapshot(&self) -> Vec<Location> {
        self.locations.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.locations.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.locations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
