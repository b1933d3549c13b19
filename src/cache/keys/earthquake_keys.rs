use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{EventFilter, EventRequest};

/// 单个事件缓存键前缀
const EVENT_PREFIX: &str = "earthquake_";

/// 筛选查询缓存键前缀
const SEARCH_PREFIX: &str = "earthquakes_query_";

/// 无筛选条件时的固定缓存键
pub const EMPTY_SEARCH_KEY: &str = "earthquakes_query_all";

/// 生成单个事件缓存键
pub fn event_key(event_id: &str) -> String {
    format!("{}{}", EVENT_PREFIX, event_id)
}

/// 生成筛选查询缓存键
pub fn search_key(filter: &EventFilter) -> String {
    let provided = filter.provided();
    if provided.is_empty() {
        return EMPTY_SEARCH_KEY.to_string();
    }

    // 按参数名排序后做 JSON 编码，取值中的分隔符会被转义
    let canonical: serde_json::Map<String, Value> = provided
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::from(value)))
        .collect();
    let canonical = Value::Object(canonical).to_string();

    format!("{}{:x}", SEARCH_PREFIX, Sha256::digest(canonical.as_bytes()))
}

pub fn fingerprint(request: &EventRequest) -> String {
    match request {
        EventRequest::Search(filter) => search_key(filter),
        EventRequest::Event(id) => event_key(id),
    }
}
