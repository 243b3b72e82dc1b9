//! Agent configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use tandem_rl_core::{GradientClipping, OptimizerConfig, RLError, Result};

use crate::entropy_target::EntropyTargetConfig;

/// Configuration for [`crate::Agent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name used in logs
    pub name: String,
    /// Weight of the intrinsic reward
    pub intrinsic_reward_coef: f32,
    /// Weight of the environment reward
    pub extrinsic_reward_coef: f32,
    /// Attach an entropy-target controller
    pub enforce_entropy_target: bool,
    /// Entropy-target settings, used when `enforce_entropy_target` is set
    pub entropy_target: EntropyTargetConfig,
    /// Primary optimizer for the encoder and members without their own
    pub optimizer: Option<OptimizerConfig>,
    /// Positive threshold for clipping gradient norms
    pub gradient_clipping: Option<f32>,
    /// Clip by the norm over all gradients of a group instead of per tensor
    pub clip_by_global_norm: bool,
    /// Emit per-update loss summaries
    pub debug_summaries: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Agent".to_string(),
            intrinsic_reward_coef: 1.0,
            extrinsic_reward_coef: 1.0,
            enforce_entropy_target: false,
            entropy_target: EntropyTargetConfig::default(),
            optimizer: None,
            gradient_clipping: None,
            clip_by_global_norm: false,
            debug_summaries: false,
        }
    }
}

impl AgentConfig {
    /// Check the values that can be checked without building the agent
    pub fn validate(&self) -> Result<()> {
        if !self.intrinsic_reward_coef.is_finite() || !self.extrinsic_reward_coef.is_finite() {
            return Err(RLError::Config(
                "reward coefficients must be finite".to_string(),
            ));
        }
        if let Some(max_norm) = self.gradient_clipping {
            if !(max_norm.is_finite() && max_norm > 0.0) {
                return Err(RLError::Config(format!(
                    "gradient clipping threshold must be positive, got {max_norm}"
                )));
            }
        }
        if let Some(optimizer) = &self.optimizer {
            optimizer.validate()?;
        }
        Ok(())
    }

    /// Clipping policy described by this configuration
    #[must_use]
    pub fn clipping(&self) -> Option<GradientClipping> {
        self.gradient_clipping.map(|max_norm| GradientClipping {
            max_norm,
            by_global_norm: self.clip_by_global_norm,
        })
    }

    /// Load a configuration from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let config = AgentConfig {
            intrinsic_reward_coef: 0.5,
            enforce_entropy_target: true,
            optimizer: Some(OptimizerConfig::adam(1e-3)),
            gradient_clipping: Some(0.5),
            ..AgentConfig::default()
        };
        config.save(&path).await.unwrap();
        let loaded = AgentConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        tokio::fs::write(&path, r#"{"extrinsic_reward_coef": 2.0}"#)
            .await
            .unwrap();
        let loaded = AgentConfig::load(&path).await.unwrap();
        assert_eq!(loaded.extrinsic_reward_coef, 2.0);
        assert_eq!(loaded.name, "Agent");
        assert!(loaded.optimizer.is_none());
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, r#"{"gradient_clipping": -1.0}"#)
            .await
            .unwrap();
        assert!(matches!(
            AgentConfig::load(&path).await,
            Err(RLError::Config(_))
        ));
        assert!(matches!(
            AgentConfig::load(dir.path().join("missing.json")).await,
            Err(RLError::Io(_))
        ));
    }

    #[test]
    fn test_clipping_policy() {
        let config = AgentConfig {
            gradient_clipping: Some(1.0),
            clip_by_global_norm: true,
            ..AgentConfig::default()
        };
        assert_eq!(
            config.clipping(),
            Some(GradientClipping {
                max_norm: 1.0,
                by_global_norm: true
            })
        );
        assert!(AgentConfig::default().clipping().is_none());
    }
}
