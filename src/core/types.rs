use chrono::{Duration, NaiveDateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// 时间戳的持久化格式，字典序即时间序
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// 一行记录：列名到字符串值的有序映射
///
/// 列的顺序就是插入顺序，新文件的表头按这个顺序写出。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut record = Record::new();
        for (key, value) in pairs {
            record.set(key, value);
        }
        record
    }

    /// 链式构造
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 设置字段；已存在的列保持原位置
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 字段级合并，patch 中的值覆盖原值，其余字段保留
    pub fn merge(&mut self, patch: &Record) {
        for (key, value) in patch.iter() {
            self.set(key, value);
        }
    }

    /// 去掉首尾空白后比较
    pub fn matches(&self, field: &str, value: &str) -> bool {
        self.get(field)
            .map_or(false, |v| v.trim() == value.trim())
    }

    /// 按给定表头顺序取值，缺失的列为空串
    pub fn values_in(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|h| self.get(h).unwrap_or("").to_string())
            .collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// 布尔字段按 "True"/"False" 写出
pub fn format_flag(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// 读回布尔字段，大小写不敏感
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn now_timestamp() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// 生成严格大于 previous 的时间戳
///
/// 同一时钟刻度内的连续更新也会得到递增的值。
pub fn next_timestamp(previous: Option<&str>) -> String {
    let now = Utc::now().naive_utc();
    let previous = previous
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .and_then(parse_timestamp);
    let stamp = match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    };
    stamp.format(TIMESTAMP_FORMAT).to_string()
}

/// 兼容带或不带小数秒、以及用空格分隔日期时间的旧数据
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}
