mod handler;

pub use handler::{CACHE_STATUS_HEADER, find_by_id, search};
