//! Time input normalization
//!
//! Every boundary the planner works with passes through here first:
//!
//! - **parser**: turns dates, zoned instants and free text into an [`Instant`]
//! - **error**: parse failures
//!
//! An [`Instant`] always carries an IANA zone. Day arithmetic is done on
//! local wall-clock time and re-localized, so a "day" in `Australia/Sydney`
//! covers a different UTC interval than a "day" in `UTC`.

mod error;
mod parser;

pub use error::{TimeError, TimeResult};
pub use parser::{
    end_of_day, localize, parse, parse_zone, start_of_day, to_utc_string, utc_string, Instant,
    TimeInput,
};
