//! Place Filter - residential address check
//!
//! Place-lookup suggestions carry a set of place types. Anything tagged as a
//! business or institution is refused as a home location.

use std::collections::BTreeSet;

/// Place types that mark a candidate as non-residential
pub const DEFAULT_DENYLIST: &[&str] = &[
    "establishment",
    "point_of_interest",
    "store",
    "restaurant",
    "local_business",
    "lodging",
    "school",
    "church",
    "hospital",
    "shopping_mall",
    "bar",
    "cafe",
    "tourist_attraction",
    "night_club",
];

/// True if any of `types` is on the denylist
pub fn is_disallowed_candidate<'a, I>(types: I, denylist: &BTreeSet<String>) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    types.into_iter().any(|t| denylist.contains(t))
}

/// Configurable denylist wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceFilter {
    denylist: BTreeSet<String>,
}

impl PlaceFilter {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denylist: denylist.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma separated list (e.g. from the environment)
    pub fn from_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        )
    }

    pub fn is_disallowed(&self, place_types: &BTreeSet<String>) -> bool {
        is_disallowed_candidate(place_types, &self.denylist)
    }

    pub fn denylist(&self) -> &BTreeSet<String> {
        &self.denylist
    }
}

impl Default for PlaceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied())
    }
}
