//! Newtype identifiers for the four core entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(FacilityListId, "Identifies a `FacilityList`.");
id_type!(FacilityListItemId, "Identifies a `FacilityListItem`.");
id_type!(FacilityId, "Identifies a canonical `Facility`.");
id_type!(FacilityMatchId, "Identifies a `FacilityMatch`.");
