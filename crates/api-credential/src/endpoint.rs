//! The closed set of rate-limited API endpoints.
//!
//! Per-endpoint usage counters and rate-limit overrides are keyed by this
//! enum only. Identifiers outside the set are ignored rather than stored,
//! so attacker-supplied route strings can never grow the counter maps.

use serde::{Deserialize, Serialize};

/// Known endpoint identifiers of the booking API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Bookings,
    Availability,
    Locations,
    Schedules,
}

impl Endpoint {
    /// Every known endpoint, in stable order.
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Bookings,
        Endpoint::Availability,
        Endpoint::Locations,
        Endpoint::Schedules,
    ];

    /// Number of known endpoints.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Bookings => "bookings",
            Endpoint::Availability => "availability",
            Endpoint::Locations => "locations",
            Endpoint::Schedules => "schedules",
        }
    }

    /// Parse an identifier. Unknown identifiers return `None`.
    pub fn parse(s: &str) -> Option<Endpoint> {
        match s {
            "bookings" => Some(Endpoint::Bookings),
            "availability" => Some(Endpoint::Availability),
            "locations" => Some(Endpoint::Locations),
            "schedules" => Some(Endpoint::Schedules),
            _ => None,
        }
    }

    /// Position in [`Self::ALL`], used to index counter arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }
}
