//! Versioned analyzer configuration: preprocessing presets, keyword list and
//! the remote prompt. Ships with a built-in default and can be replaced by a
//! JSON file without rebuilding.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::keywords::{KeywordPattern, KeywordSet};
use crate::preprocess::{PreprocessConfig, PreprocessPreset};

pub const DEFAULT_PROFILE_VERSION: u32 = 3;

const DEFAULT_REMOTE_PROMPT: &str = "You are checking a screenshot of a running game or remote \
session. Decide whether it shows a disconnect, connection-lost, network-error or \
reconnecting dialog. Reply with JSON only, exactly of the form \
{\"isDisconnected\": boolean, \"confidence\": number between 0 and 1, \"reason\": string}.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerProfile {
    pub version: u32,
    pub normal: PreprocessConfig,
    pub focus: PreprocessConfig,
    pub keywords: Vec<KeywordPattern>,
    pub remote_prompt: String,
}

impl Default for AnalyzerProfile {
    fn default() -> Self {
        Self {
            version: DEFAULT_PROFILE_VERSION,
            normal: PreprocessConfig::normal(),
            focus: PreprocessConfig::focus(),
            keywords: default_keywords(),
            remote_prompt: DEFAULT_REMOTE_PROMPT.to_string(),
        }
    }
}

impl AnalyzerProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read analyzer profile {}", path.display()))?;
        let profile: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid analyzer profile {}", path.display()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        self.normal
            .validate()
            .map_err(|msg| anyhow!("normal preset: {msg}"))?;
        self.focus
            .validate()
            .map_err(|msg| anyhow!("focus preset: {msg}"))?;
        self.keyword_set()?;
        Ok(())
    }

    pub fn preset(&self, preset: PreprocessPreset) -> &PreprocessConfig {
        match preset {
            PreprocessPreset::Normal => &self.normal,
            PreprocessPreset::Focus => &self.focus,
        }
    }

    pub fn keyword_set(&self) -> Result<KeywordSet> {
        KeywordSet::compile(&self.keywords)
    }
}

/// Ordered most-specific first. English patterns run against normalized
/// (space-free) text.
fn default_keywords() -> Vec<KeywordPattern> {
    vec![
        KeywordPattern::phrase("与服务器断开连接"),
        KeywordPattern::phrase("连接已断开"),
        KeywordPattern::phrase("网络连接中断"),
        KeywordPattern::phrase("连接超时"),
        KeywordPattern::phrase("断开连接"),
        KeywordPattern::phrase("网络异常"),
        KeywordPattern::phrase("网络错误"),
        KeywordPattern::phrase("连接失败"),
        KeywordPattern::phrase("重新连接"),
        KeywordPattern::phrase("掉线"),
        KeywordPattern::english("connection(lost|closed|interrupted|failed)"),
        KeywordPattern::english("lostconnection"),
        KeywordPattern::english("connectiontimed?out"),
        KeywordPattern::english("disconnected"),
        KeywordPattern::english("unabletoconnect"),
        KeywordPattern::english("networkerror"),
        KeywordPattern::english("servernotresponding"),
        KeywordPattern::english("reconnecting"),
    ]
}
