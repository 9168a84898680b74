//! Raw tourism tables → `spots`
//!
//! - **region** / **sigungu**: static administrative code lookups
//! - **transformer**: per-category reshaping into [`NormalizedSpot`]
//! - **spot_store**: bulk insert that ignores rows already present
//! - **pipeline**: reader, processor and writer for a migration stage
//! - **images**: gallery backfill for spots migrated without images

pub mod images;
pub mod pipeline;
pub mod region;
pub mod sigungu;
pub mod spot;
pub mod spot_store;
pub mod transformer;

pub use spot::{NormalizedSpot, SpotType};
pub use spot_store::{MemorySpotStore, PgSpotStore, SpotImageTarget, SpotImageUpdate, SpotStore};
pub use transformer::transform;
