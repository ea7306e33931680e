pub mod data;
pub mod governorate;

pub use data::*;
pub use governorate::Governorate;
