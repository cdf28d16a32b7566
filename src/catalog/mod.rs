//! Static lookup tables for display names.
//!
//! Pure functions over constant tables; nothing here holds state.

mod classes;
mod instances;

pub use classes::{class_name, spec_name};
pub use instances::{difficulty_name, encounter_name, map_name, raid_type_name};
