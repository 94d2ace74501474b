//! Built-in model hyper-parameter shapes.
//!
//! Each model name selects one variant of [`ModelHypers`]. Parsing fills in
//! defaults, rejects unknown keys and checks value ranges.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure, from_map, to_map};
use crate::config::JsonMap;
use crate::error::ConfigError;

const DTYPES: [&str; 2] = ["float32", "float64"];

fn check_seed(seed: Option<i64>) -> Result<(), ConfigError> {
    if let Some(seed) = seed {
        ensure(
            (0..=i64::from(u32::MAX)).contains(&seed),
            "seed",
            "must be in [0, 2**32 - 1] or null for a random seed",
        )?;
    }
    Ok(())
}

fn check_unit_open(value: f64, field: &str) -> Result<(), ConfigError> {
    ensure(value > 0.0 && value <= 1.0, field, "must be in (0, 1]")
}

fn check_unit_closed(value: f64, field: &str) -> Result<(), ConfigError> {
    ensure((0.0..=1.0).contains(&value), field, "must be in [0, 1]")
}

/// Deep Q-learning network (also used by Double DQN).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DqnHypers {
    /// Observation dimension.
    pub obs_dim: i64,
    /// Number of discrete actions.
    pub act_num: i64,
    /// Hidden layer widths of the Q network.
    pub hidden_layers: Vec<i64>,
    /// Learning rate.
    pub lr: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Replay buffer capacity.
    pub replay_size: i64,
    /// Minibatch size.
    pub batch_size: i64,
    /// Initial exploration rate.
    pub epsilon_max: f64,
    /// Floor of the exploration rate.
    pub epsilon_min: f64,
    /// Multiplicative decay of the exploration rate.
    pub epsilon_decay: f64,
    /// Random-action steps before the policy acts.
    pub start_steps: i64,
    /// Steps collected before the first update.
    pub update_after: i64,
    /// Steps between online network updates.
    pub update_online_every: i64,
    /// Steps between target network syncs.
    pub update_target_every: i64,
    /// Float precision, `float32` or `float64`.
    pub dtype: String,
    /// Random seed; `None` picks one at random.
    pub seed: Option<i64>,
}

impl Default for DqnHypers {
    fn default() -> Self {
        Self {
            obs_dim: 4,
            act_num: 2,
            hidden_layers: vec![64, 64],
            lr: 0.001,
            gamma: 0.95,
            replay_size: 1_000_000,
            batch_size: 32,
            epsilon_max: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: 0.9,
            start_steps: 0,
            update_after: 32,
            update_online_every: 1,
            update_target_every: 200,
            dtype: "float32".to_string(),
            seed: None,
        }
    }
}

impl DqnHypers {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.obs_dim >= 1, "obs_dim", "must be greater than 0")?;
        ensure(self.act_num >= 2, "act_num", "must be greater than 1")?;
        ensure(!self.hidden_layers.is_empty(), "hidden_layers", "must have at least 1 element")?;
        check_unit_open(self.lr, "lr")?;
        check_unit_open(self.gamma, "gamma")?;
        ensure(self.replay_size >= 1, "replay_size", "must be greater than 0")?;
        ensure(self.batch_size >= 1, "batch_size", "must be greater than 0")?;
        check_unit_closed(self.epsilon_max, "epsilon_max")?;
        check_unit_closed(self.epsilon_min, "epsilon_min")?;
        check_unit_open(self.epsilon_decay, "epsilon_decay")?;
        ensure(self.start_steps >= 0, "start_steps", "must be greater than or equal to 0")?;
        ensure(
            self.update_after >= self.batch_size,
            "update_after",
            "must be greater than or equal to batch_size",
        )?;
        ensure(self.update_online_every >= 1, "update_online_every", "must be greater than 0")?;
        ensure(self.update_target_every >= 1, "update_target_every", "must be greater than 0")?;
        ensure(DTYPES.contains(&self.dtype.as_str()), "dtype", "must be float32 or float64")?;
        check_seed(self.seed)
    }
}

/// A scalar applied to every action dimension, or one value per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerDim {
    /// Same value for every dimension.
    Scalar(f64),
    /// One value per dimension.
    List(Vec<f64>),
}

impl PerDim {
    fn check(&self, field: &str, act_dim: i64) -> Result<(), ConfigError> {
        match self {
            Self::Scalar(v) => ensure(*v >= 0.0, field, "must be greater than or equal to 0"),
            Self::List(values) => {
                ensure(
                    i64::try_from(values.len()).ok() == Some(act_dim),
                    field,
                    "must have the same length as act_dim",
                )?;
                ensure(
                    values.iter().all(|v| *v >= 0.0),
                    field,
                    "must be greater than or equal to 0",
                )
            }
        }
    }
}

/// Noise process used by DDPG exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseType {
    /// Gaussian noise.
    Normal,
    /// Ornstein-Uhlenbeck noise.
    Ou,
}

/// Deep deterministic policy gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DdpgHypers {
    /// Observation dimension.
    pub obs_dim: i64,
    /// Action dimension.
    pub act_dim: i64,
    /// Hidden layer widths of the actor.
    pub hidden_layers_actor: Vec<i64>,
    /// Hidden layer widths of the critic.
    pub hidden_layers_critic: Vec<i64>,
    /// Actor learning rate.
    pub lr_actor: f64,
    /// Critic learning rate.
    pub lr_critic: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Soft update coefficient of the target networks.
    pub tau: f64,
    /// Replay buffer capacity.
    pub replay_size: i64,
    /// Minibatch size.
    pub batch_size: i64,
    /// Exploration noise process.
    pub noise_type: NoiseType,
    /// Noise scale.
    pub noise_sigma: PerDim,
    /// Mean reversion rate of OU noise.
    pub noise_theta: PerDim,
    /// Time step of OU noise.
    pub noise_dt: f64,
    /// Initial noise multiplier.
    pub noise_max: f64,
    /// Floor of the noise multiplier.
    pub noise_min: f64,
    /// Multiplicative decay of the noise multiplier.
    pub noise_decay: f64,
    /// Steps collected before the first update.
    pub update_after: i64,
    /// Steps between online network updates.
    pub update_online_every: i64,
    /// Float precision, `float32` or `float64`.
    pub dtype: String,
    /// Random seed; `None` picks one at random.
    pub seed: Option<i64>,
}

impl Default for DdpgHypers {
    fn default() -> Self {
        Self {
            obs_dim: 4,
            act_dim: 2,
            hidden_layers_actor: vec![64, 64],
            hidden_layers_critic: vec![64, 64],
            lr_actor: 0.0001,
            lr_critic: 0.001,
            gamma: 0.99,
            tau: 0.001,
            replay_size: 1_000_000,
            batch_size: 64,
            noise_type: NoiseType::Ou,
            noise_sigma: PerDim::Scalar(0.2),
            noise_theta: PerDim::Scalar(0.15),
            noise_dt: 0.01,
            noise_max: 1.0,
            noise_min: 1.0,
            noise_decay: 1.0,
            update_after: 64,
            update_online_every: 1,
            dtype: "float32".to_string(),
            seed: None,
        }
    }
}

impl DdpgHypers {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.obs_dim >= 1, "obs_dim", "must be greater than 0")?;
        ensure(self.act_dim >= 2, "act_dim", "must be greater than 1")?;
        ensure(
            !self.hidden_layers_actor.is_empty(),
            "hidden_layers_actor",
            "must have at least 1 element",
        )?;
        ensure(
            !self.hidden_layers_critic.is_empty(),
            "hidden_layers_critic",
            "must have at least 1 element",
        )?;
        check_unit_open(self.lr_actor, "lr_actor")?;
        check_unit_open(self.lr_critic, "lr_critic")?;
        check_unit_open(self.gamma, "gamma")?;
        check_unit_open(self.tau, "tau")?;
        ensure(self.replay_size >= 1, "replay_size", "must be greater than 0")?;
        ensure(self.batch_size >= 1, "batch_size", "must be greater than 0")?;
        self.noise_sigma.check("noise_sigma", self.act_dim)?;
        self.noise_theta.check("noise_theta", self.act_dim)?;
        ensure(self.noise_dt > 0.0, "noise_dt", "must be greater than 0")?;
        check_unit_closed(self.noise_max, "noise_max")?;
        check_unit_closed(self.noise_min, "noise_min")?;
        check_unit_open(self.noise_decay, "noise_decay")?;
        ensure(
            self.update_after >= self.batch_size,
            "update_after",
            "must be greater than or equal to batch_size",
        )?;
        ensure(self.update_online_every >= 1, "update_online_every", "must be greater than 0")?;
        ensure(DTYPES.contains(&self.dtype.as_str()), "dtype", "must be float32 or float64")?;
        check_seed(self.seed)
    }
}

/// PPO policy network family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PpoPolicy {
    /// Single discrete action.
    Discrete,
    /// Continuous action vector.
    Continuous,
    /// Several discrete actions.
    MultiDiscrete,
    /// Discrete choices each with continuous parameters.
    Hybrid,
}

fn default_hidden() -> Vec<i64> {
    vec![64, 64]
}
fn default_lr_pi() -> f64 {
    0.0003
}
fn default_lr_vf() -> f64 {
    0.001
}
fn default_gamma() -> f64 {
    0.99
}
fn default_lam() -> f64 {
    0.97
}
fn default_epsilon() -> f64 {
    0.2
}
fn default_buffer_size() -> i64 {
    4000
}
fn default_update_iter() -> i64 {
    80
}
fn default_max_kl() -> f64 {
    0.01
}

/// Proximal policy optimization. `policy`, `obs_dim` and `act_dim` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PpoHypers {
    /// Policy family.
    pub policy: PpoPolicy,
    /// Observation dimension.
    pub obs_dim: i64,
    /// An int for discrete/continuous, a list for multi-discrete,
    /// an `m x n` list of lists for hybrid.
    pub act_dim: Value,
    /// Hidden layer widths of the policy network.
    #[serde(default = "default_hidden")]
    pub hidden_layers_pi: Vec<i64>,
    /// Hidden layer widths of the value network.
    #[serde(default = "default_hidden")]
    pub hidden_layers_vf: Vec<i64>,
    /// Policy learning rate.
    #[serde(default = "default_lr_pi")]
    pub lr_pi: f64,
    /// Value function learning rate.
    #[serde(default = "default_lr_vf")]
    pub lr_vf: f64,
    /// Discount factor.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    /// GAE lambda.
    #[serde(default = "default_lam")]
    pub lam: f64,
    /// Clip ratio.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Steps collected per policy update.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: i64,
    /// Gradient steps per policy update.
    #[serde(default = "default_update_iter")]
    pub update_pi_iter: i64,
    /// Gradient steps per value update.
    #[serde(default = "default_update_iter")]
    pub update_vf_iter: i64,
    /// KL divergence that stops a policy update early.
    #[serde(default = "default_max_kl")]
    pub max_kl: f64,
    /// Random seed; `None` picks one at random.
    #[serde(default)]
    pub seed: Option<i64>,
}

impl PpoHypers {
    fn check_act_dim(&self) -> Result<(), ConfigError> {
        match self.policy {
            PpoPolicy::Discrete | PpoPolicy::Continuous => ensure(
                self.act_dim.as_i64().is_some_and(|d| d >= 1),
                "act_dim",
                "must be an int greater than 0 for discrete or continuous policies",
            ),
            PpoPolicy::MultiDiscrete => ensure(
                self.act_dim.as_array().is_some_and(|a| !a.is_empty()),
                "act_dim",
                "must be a non-empty list for multi-discrete policies",
            ),
            PpoPolicy::Hybrid => {
                let rows = self.act_dim.as_array().filter(|rows| !rows.is_empty());
                let valid = rows.is_some_and(|rows| {
                    let width = rows[0].as_array().map_or(0, Vec::len);
                    width > 0
                        && rows
                            .iter()
                            .all(|row| row.as_array().is_some_and(|r| r.len() == width))
                });
                ensure(
                    valid,
                    "act_dim",
                    "must be a list of lists with shape (m, n) for hybrid policies",
                )
            }
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(self.obs_dim >= 1, "obs_dim", "must be greater than 0")?;
        self.check_act_dim()?;
        ensure(!self.hidden_layers_pi.is_empty(), "hidden_layers_pi", "must have at least 1 element")?;
        ensure(!self.hidden_layers_vf.is_empty(), "hidden_layers_vf", "must have at least 1 element")?;
        ensure(self.lr_pi > 0.0, "lr_pi", "must be greater than 0")?;
        ensure(self.lr_vf > 0.0, "lr_vf", "must be greater than 0")?;
        ensure(self.gamma > 0.0 && self.gamma < 1.0, "gamma", "must be in (0, 1)")?;
        ensure(self.lam > 0.0 && self.lam < 1.0, "lam", "must be in (0, 1)")?;
        ensure(self.epsilon > 0.0 && self.epsilon < 1.0, "epsilon", "must be in (0, 1)")?;
        ensure(self.buffer_size >= 1, "buffer_size", "must be greater than 0")?;
        ensure(self.update_pi_iter >= 1, "update_pi_iter", "must be greater than 0")?;
        ensure(self.update_vf_iter >= 1, "update_vf_iter", "must be greater than 0")?;
        ensure(self.max_kl > 0.0, "max_kl", "must be greater than 0")?;
        check_seed(self.seed)
    }
}

/// Hyper-parameters of a registered model, tagged by model name.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelHypers {
    /// `DQN`.
    Dqn(DqnHypers),
    /// `DoubleDQN`.
    DoubleDqn(DqnHypers),
    /// `DDPG`.
    Ddpg(DdpgHypers),
    /// `PPO`.
    Ppo(PpoHypers),
}

impl ModelHypers {
    /// Registered name of this model.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dqn(_) => "DQN",
            Self::DoubleDqn(_) => "DoubleDQN",
            Self::Ddpg(_) => "DDPG",
            Self::Ppo(_) => "PPO",
        }
    }

    /// Parses and validates DQN hypers.
    pub fn parse_dqn(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: DqnHypers = from_map("DQN hypers", map)?;
        h.validate()?;
        Ok(Self::Dqn(h))
    }

    /// Parses and validates Double DQN hypers.
    pub fn parse_double_dqn(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: DqnHypers = from_map("DoubleDQN hypers", map)?;
        h.validate()?;
        Ok(Self::DoubleDqn(h))
    }

    /// Parses and validates DDPG hypers.
    pub fn parse_ddpg(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: DdpgHypers = from_map("DDPG hypers", map)?;
        h.validate()?;
        Ok(Self::Ddpg(h))
    }

    /// Parses and validates PPO hypers.
    pub fn parse_ppo(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: PpoHypers = from_map("PPO hypers", map)?;
        h.validate()?;
        Ok(Self::Ppo(h))
    }

    /// Dumps the hyper-parameters, defaults included.
    pub fn to_map(&self) -> Result<JsonMap, ConfigError> {
        match self {
            Self::Dqn(h) | Self::DoubleDqn(h) => to_map(self.name(), h),
            Self::Ddpg(h) => to_map(self.name(), h),
            Self::Ppo(h) => to_map(self.name(), h),
        }
    }
}
