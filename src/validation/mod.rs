pub mod national_id;

pub use national_id::{NationalIdDecoder, NATIONAL_ID_LENGTH};
