//! The domain data model: identifiers, entities, and the status and
//! processing-log types that govern how they move through the pipeline.

pub mod entities;
pub mod ids;
pub mod processing;
pub mod status;

pub use entities::{Facility, FacilityList, FacilityListItem, FacilityMatch, MatchResultsMeta, MatchType, Point};
pub use ids::{FacilityId, FacilityListId, FacilityListItemId, FacilityMatchId};
pub use processing::{ProcessingAction, ProcessingDetail, ProcessingResult};
pub use status::{MatchStatus, RowStatus, WrongRowStatus};
