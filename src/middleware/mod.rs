mod error_handler;
mod rate_limit;

pub use error_handler::log_errors;
pub use rate_limit::{Admission, LIMIT_HEADER, REMAINING_HEADER, RateLimiter, rate_limit};
