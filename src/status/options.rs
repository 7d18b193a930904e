//! 用户选项快照
//!
//! 镜像外部键值存储中的用户设置，通过变更通知保持同步

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// 是否启用完成后自动隐藏
pub const AUTOHIDE_ENABLE: &str = "autohideEnable";
/// 自动隐藏延迟（秒）
pub const AUTOHIDE_DURATION: &str = "autohideDuration";

/// 单个选项的变更通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChange {
    pub key: String,
    /// 为 `None` 表示该键已被删除
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
}

impl OptionChange {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            new_value: Some(value),
            old_value: None,
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_value: None,
            old_value: None,
        }
    }
}

/// 选项快照（键值映射）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsSnapshot {
    values: Map<String, Value>,
}

impl OptionsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 按到达顺序应用变更
    pub fn apply(&mut self, changes: &[OptionChange]) {
        for change in changes {
            match &change.new_value {
                Some(value) => {
                    self.values.insert(change.key.clone(), value.clone());
                }
                None => {
                    self.values.remove(&change.key);
                }
            }
        }
    }

    /// 计算从当前快照到 `next` 的变更列表
    pub fn diff(&self, next: &OptionsSnapshot) -> Vec<OptionChange> {
        let mut changes = Vec::new();

        for (key, value) in &next.values {
            let old = self.values.get(key);
            if old != Some(value) {
                changes.push(OptionChange {
                    key: key.clone(),
                    new_value: Some(value.clone()),
                    old_value: old.cloned(),
                });
            }
        }

        for (key, value) in &self.values {
            if !next.values.contains_key(key) {
                changes.push(OptionChange {
                    key: key.clone(),
                    new_value: None,
                    old_value: Some(value.clone()),
                });
            }
        }

        changes
    }

    pub fn autohide_enabled(&self) -> bool {
        self.get(AUTOHIDE_ENABLE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 配置的自动隐藏时长
    ///
    /// 缺失、非数字、不大于 0 或超出 `Duration` 表示范围时为 `None`
    pub fn autohide_duration(&self) -> Option<Duration> {
        let secs = self.get(AUTOHIDE_DURATION).and_then(Value::as_f64)?;
        if secs > 0.0 {
            Duration::try_from_secs_f64(secs).ok()
        } else {
            None
        }
    }

    /// 下载完成后需要等待多久再隐藏；未启用时为 `None`
    pub fn autohide_delay(&self) -> Option<Duration> {
        if self.autohide_enabled() {
            self.autohide_duration()
        } else {
            None
        }
    }
}
