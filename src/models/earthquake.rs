use std::collections::BTreeMap;

use serde::Deserialize;

/// 地震事件筛选条件，对应 `GET /earthquakes` 的查询参数
///
/// 参数值原样透传，不做格式校验。空字符串视为未提供。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventFilter {
    #[serde(rename = "startTime")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime")]
    pub end_time: Option<String>,
    #[serde(rename = "minMagnitude")]
    pub min_magnitude: Option<String>,
    #[serde(rename = "maxMagnitude")]
    pub max_magnitude: Option<String>,
}

impl EventFilter {
    /// (对外参数名, 上游参数名, 取值)
    fn fields(&self) -> [(&'static str, &'static str, Option<&str>); 4] {
        [
            ("startTime", "starttime", self.start_time.as_deref()),
            ("endTime", "endtime", self.end_time.as_deref()),
            ("minMagnitude", "minmagnitude", self.min_magnitude.as_deref()),
            ("maxMagnitude", "maxmagnitude", self.max_magnitude.as_deref()),
        ]
    }

    /// 已提供的筛选条件，按对外参数名排序
    pub fn provided(&self) -> BTreeMap<&'static str, &str> {
        self.fields()
            .into_iter()
            .filter_map(|(name, _, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v)))
            .collect()
    }

    /// 已提供的筛选条件，使用上游参数名
    pub fn upstream_params(&self) -> Vec<(&'static str, String)> {
        self.fields()
            .into_iter()
            .filter_map(|(_, upstream_name, value)| {
                value
                    .filter(|v| !v.is_empty())
                    .map(|v| (upstream_name, v.to_string()))
            })
            .collect()
    }
}

/// 一次请求的语义身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRequest {
    Search(EventFilter),
    Event(String),
}
