mod error;
mod parser;
mod structs;

#[cfg(feature = "ics")]
mod ics;

pub use error::{EntryError, Locator, ParseError, ValidationError};
pub use parser::{parse_calendar, Mode, Parsed};
pub use structs::{Draft, Event, Invalid, Snapshot};
