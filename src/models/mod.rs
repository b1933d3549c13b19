pub mod earthquake;

pub use earthquake::{EventFilter, EventRequest};
