//! 推論設定

use crate::{Result, ShError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Saturation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// 前方包含: 受理済み節の部分集合になる新しい節を破棄
    pub subset_elimination: bool,
    /// 後方包含: 新しい節に包含される受理済み節を除去
    pub backward_subsumption: bool,
    /// ロールごとに共有 Top コンテキストを使用
    pub top_sharing: bool,
    /// 全称制約を持つコンテキストの後続を、そのコンテキスト専用の二次コンテキストへ付け替え
    pub secondary_contexts: bool,
    /// この数を超える二項規則の相手を持つ概念はプレースホルダ経由に書き換え
    pub fanout_threshold: usize,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            subset_elimination: true,
            backward_subsumption: false,
            top_sharing: false,
            secondary_contexts: false,
            fanout_threshold: 100,
        }
    }
}

impl ReasonerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ShError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fanout_threshold == 0 {
            return Err(ShError::Config("fanout_threshold must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReasonerConfig::default();
        assert!(config.subset_elimination);
        assert!(!config.backward_subsumption);
        assert!(!config.top_sharing);
        assert!(!config.secondary_contexts);
        assert_eq!(config.fanout_threshold, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ReasonerConfig =
            serde_json::from_str(r#"{"top_sharing": true, "secondary_contexts": true}"#).unwrap();
        assert!(config.top_sharing);
        assert!(config.secondary_contexts);
        assert!(config.subset_elimination);
        assert_eq!(config.fanout_threshold, 100);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = ReasonerConfig { fanout_threshold: 0, ..ReasonerConfig::default() };
        assert!(matches!(config.validate(), Err(ShError::Config(_))));
    }
}
