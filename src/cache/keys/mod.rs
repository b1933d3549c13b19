/// 缓存键模块
/// 由请求的语义身份生成缓存键
pub mod earthquake_keys;

pub use earthquake_keys::{EMPTY_SEARCH_KEY, event_key, fingerprint, search_key};
