//! Agent combining a policy algorithm with optional curiosity and entropy control
//!
//! The [`Agent`] owns one policy learner ([`RlAlgorithm`]), an optional
//! observation [`Encoder`], an optional [`CuriosityModule`] and an optional
//! [`EntropyTargetAlgorithm`]. It threads each member's state separately,
//! merges their per-step infos and losses into composite records keyed by
//! member, shapes the training reward with the curiosity bonus, and trains
//! every member with the optimizer of its [`OptimizerRegistry`] group.
//!
//! ```no_run
//! use tandem_rl_agent::{ActorCriticAlgorithm, ActorCriticConfig, AgentBuilder, AgentConfig};
//! use tandem_rl_core::{tensor, ActionSpec, OptimizerConfig, TimeStep};
//!
//! # fn main() -> tandem_rl_core::Result<()> {
//! let mut agent = AgentBuilder::new(ActionSpec::discrete(2))
//!     .config(AgentConfig {
//!         optimizer: Some(OptimizerConfig::adam(1e-3)),
//!         ..AgentConfig::default()
//!     })
//!     .build(|spec| ActorCriticAlgorithm::new(spec, 4, ActorCriticConfig::default()))?;
//!
//! let state = agent.initial_train_state(1);
//! let step = TimeStep::first(tensor::zeros(&[1, 4]));
//! let out = agent.rollout(&step, &state, false)?;
//! # let _ = out;
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tandem_rl_core::summary::{SummarySink, TracingSink};
use tandem_rl_core::tensor::{self, stack_field, Stack, Tensor};
use tandem_rl_core::{
    ActionSpec, Algorithm, CuriosityModule, Experience, GradientClipping, Gradients, LossInfo,
    Parameter, PolicyStep, RLError, Result, RlAlgorithm, StateSpec, StepType, TimeStep,
    TrainingInfo,
};

use crate::config::AgentConfig;
use crate::encoder::Encoder;
use crate::entropy_target::{EntropyTargetAlgorithm, EntropyTargetInfo, EntropyTargetLossExtra};
use crate::icm::IcmAlgorithm;
use crate::registry::{Member, OptimizerRegistry};
use crate::reward::{RewardComposer, TrainingReward};

/// Function applied to a tensor of a time step
pub type TensorFn = Box<dyn Fn(&Tensor) -> Result<Tensor> + Send + Sync>;

/// Recurrent state of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState<R, C> {
    /// Policy state
    pub rl: R,
    /// Curiosity state; `None` without a curiosity module and on the predict path
    pub icm: Option<C>,
}

/// Per-step info of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo<R, C> {
    /// Policy info
    pub rl: R,
    /// Curiosity info
    pub icm: Option<C>,
    /// Entropy-target info
    pub entropy_target: Option<EntropyTargetInfo>,
}

impl<R: Stack, C: Stack> Stack for AgentInfo<R, C> {
    fn stack(items: &[&Self]) -> Result<Self> {
        Ok(Self {
            rl: stack_field(items, |x| &x.rl)?,
            icm: stack_field(items, |x| &x.icm)?,
            entropy_target: stack_field(items, |x| &x.entropy_target)?,
        })
    }
}

/// Loss diagnostics of an agent, keyed by member.
///
/// Only the keys of members that exist are serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLossExtra<R, C> {
    /// Policy diagnostics
    pub rl: R,
    /// Curiosity diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icm: Option<C>,
    /// Entropy-target diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_target: Option<EntropyTargetLossExtra>,
}

impl<R, C> AgentLossExtra<R, C> {
    /// Keys of the members that contributed, in folding order
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = vec![Member::Rl.key()];
        if self.icm.is_some() {
            keys.push(Member::Icm.key());
        }
        if self.entropy_target.is_some() {
            keys.push(Member::EntropyTarget.key());
        }
        keys
    }
}

/// State of an agent built from `R` and `C`
pub type StateOf<R, C> =
    AgentState<<R as RlAlgorithm>::State, <C as CuriosityModule>::State>;
/// Info of an agent built from `R` and `C`
pub type InfoOf<R, C> = AgentInfo<<R as RlAlgorithm>::Info, <C as CuriosityModule>::Info>;
/// Loss diagnostics of an agent built from `R` and `C`
pub type LossExtraOf<R, C> =
    AgentLossExtra<<R as RlAlgorithm>::LossExtra, <C as CuriosityModule>::LossExtra>;

/// Builder for [`Agent`]
pub struct AgentBuilder<C: CuriosityModule = IcmAlgorithm> {
    action_spec: ActionSpec,
    config: AgentConfig,
    encoder: Option<Box<dyn Encoder>>,
    icm: Option<C>,
    reward_shaping: Option<TensorFn>,
    observation_transformer: Option<TensorFn>,
    summary: Arc<dyn SummarySink>,
}

impl AgentBuilder<IcmAlgorithm> {
    /// Start building an agent acting in `action_spec`
    #[must_use]
    pub fn new(action_spec: ActionSpec) -> Self {
        Self {
            action_spec,
            config: AgentConfig::default(),
            encoder: None,
            icm: None,
            reward_shaping: None,
            observation_transformer: None,
            summary: Arc::new(TracingSink),
        }
    }
}

impl<C: CuriosityModule> AgentBuilder<C> {
    /// Replace the whole configuration
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Encode observations before any member sees them
    #[must_use]
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    /// Attach a curiosity module
    #[must_use]
    pub fn curiosity<D: CuriosityModule>(self, module: D) -> AgentBuilder<D> {
        AgentBuilder {
            action_spec: self.action_spec,
            config: self.config,
            encoder: self.encoder,
            icm: Some(module),
            reward_shaping: self.reward_shaping,
            observation_transformer: self.observation_transformer,
            summary: self.summary,
        }
    }

    /// Attach an entropy-target controller
    #[must_use]
    pub fn enforce_entropy_target(mut self, enforce: bool) -> Self {
        self.config.enforce_entropy_target = enforce;
        self
    }

    /// Set the reward weights
    #[must_use]
    pub fn reward_coefs(mut self, extrinsic: f32, intrinsic: f32) -> Self {
        self.config.extrinsic_reward_coef = extrinsic;
        self.config.intrinsic_reward_coef = intrinsic;
        self
    }

    /// Transform environment rewards in [`Agent::transform_timestep`]
    #[must_use]
    pub fn reward_shaping<F>(mut self, f: F) -> Self
    where
        F: Fn(&Tensor) -> Result<Tensor> + Send + Sync + 'static,
    {
        self.reward_shaping = Some(Box::new(f));
        self
    }

    /// Transform observations in [`Agent::transform_timestep`]
    #[must_use]
    pub fn observation_transformer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Tensor) -> Result<Tensor> + Send + Sync + 'static,
    {
        self.observation_transformer = Some(Box::new(f));
        self
    }

    /// Send summaries to `sink` instead of `tracing`
    #[must_use]
    pub fn summary_sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.summary = sink;
        self
    }

    /// Instantiate the policy algorithm with `make_rl` and assemble the agent
    pub fn build<R, F>(self, make_rl: F) -> Result<Agent<R, C>>
    where
        R: RlAlgorithm,
        F: FnOnce(&ActionSpec) -> Result<R>,
    {
        self.config.validate()?;
        let action_spec = self.action_spec;

        let rl = make_rl(&action_spec).map_err(|e| match e {
            config @ RLError::Config(_) => config,
            other => RLError::Config(format!(
                "policy algorithm rejected the action spec: {other}"
            )),
        })?;
        if rl.action_spec() != &action_spec {
            return Err(RLError::Config(format!(
                "policy algorithm acts in {:?}, agent in {action_spec:?}",
                rl.action_spec()
            )));
        }

        let entropy_target = if self.config.enforce_entropy_target {
            Some(EntropyTargetAlgorithm::new(
                &action_spec,
                self.config.entropy_target.clone(),
            )?)
        } else {
            None
        };

        let mut registry = OptimizerRegistry::new(self.config.optimizer.as_ref())?;
        registry.add(Member::Rl, rl.optimizer())?;
        if let Some(icm) = &self.icm {
            registry.add(Member::Icm, icm.optimizer())?;
        }
        if let Some(et) = &entropy_target {
            registry.add(Member::EntropyTarget, et.optimizer())?;
        }

        let icm_train_spec = self
            .icm
            .as_ref()
            .map_or(StateSpec::Empty, |icm| icm.train_state_spec());
        let train_state_spec = StateSpec::record([
            (Member::Rl.key(), rl.train_state_spec()),
            (Member::Icm.key(), icm_train_spec),
        ]);
        let predict_state_spec = StateSpec::record([
            (Member::Rl.key(), rl.predict_state_spec()),
            (Member::Icm.key(), StateSpec::Empty),
        ]);

        let agent = Agent {
            name: self.config.name.clone(),
            action_spec,
            encoder: self.encoder,
            rl,
            icm: self.icm,
            entropy_target,
            reward: RewardComposer::new(
                self.config.extrinsic_reward_coef,
                self.config.intrinsic_reward_coef,
            ),
            registry,
            gradient_clipping: self.config.clipping(),
            reward_shaping: self.reward_shaping,
            observation_transformer: self.observation_transformer,
            summary: self.summary,
            debug_summaries: self.config.debug_summaries,
            train_state_spec,
            predict_state_spec,
        };

        if agent.registry.groups()[0].optimizer().is_none()
            && agent.group_variables(0).is_ok_and(|v| !v.is_empty())
        {
            warn!(
                agent = %agent.name,
                "primary group has trainable parameters but no optimizer"
            );
        }
        info!(
            agent = %agent.name,
            rl = agent.rl.name(),
            icm = agent.icm.is_some(),
            entropy_target = agent.entropy_target.is_some(),
            groups = agent.registry.len(),
            "built agent"
        );
        Ok(agent)
    }
}

/// Master algorithm combining a policy learner with optional helpers
pub struct Agent<R: RlAlgorithm, C: CuriosityModule = IcmAlgorithm> {
    name: String,
    action_spec: ActionSpec,
    encoder: Option<Box<dyn Encoder>>,
    rl: R,
    icm: Option<C>,
    entropy_target: Option<EntropyTargetAlgorithm>,
    reward: RewardComposer,
    registry: OptimizerRegistry,
    gradient_clipping: Option<GradientClipping>,
    reward_shaping: Option<TensorFn>,
    observation_transformer: Option<TensorFn>,
    summary: Arc<dyn SummarySink>,
    debug_summaries: bool,
    train_state_spec: StateSpec,
    predict_state_spec: StateSpec,
}

impl<R: RlAlgorithm, C: CuriosityModule> Agent<R, C> {
    /// Name used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actions the agent produces
    #[must_use]
    pub fn action_spec(&self) -> &ActionSpec {
        &self.action_spec
    }

    /// Policy algorithm
    #[must_use]
    pub fn rl(&self) -> &R {
        &self.rl
    }

    /// Curiosity module, if any
    #[must_use]
    pub fn icm(&self) -> Option<&C> {
        self.icm.as_ref()
    }

    /// Entropy-target controller, if any
    #[must_use]
    pub fn entropy_target(&self) -> Option<&EntropyTargetAlgorithm> {
        self.entropy_target.as_ref()
    }

    /// Optimizer groups
    #[must_use]
    pub fn registry(&self) -> &OptimizerRegistry {
        &self.registry
    }

    /// State threaded through [`Agent::rollout`]
    #[must_use]
    pub fn train_state_spec(&self) -> &StateSpec {
        &self.train_state_spec
    }

    /// State threaded through [`Agent::predict`]
    #[must_use]
    pub fn predict_state_spec(&self) -> &StateSpec {
        &self.predict_state_spec
    }

    /// State at the start of training episodes
    #[must_use]
    pub fn initial_train_state(&self, batch_size: usize) -> StateOf<R, C> {
        AgentState {
            rl: self.rl.initial_state(batch_size),
            icm: self.icm.as_ref().map(|icm| icm.initial_state(batch_size)),
        }
    }

    /// State at the start of inference episodes
    #[must_use]
    pub fn initial_predict_state(&self, batch_size: usize) -> StateOf<R, C> {
        AgentState {
            rl: self.rl.initial_state(batch_size),
            icm: None,
        }
    }

    /// Parameters of every member in group `index`, in member order
    pub fn group_variables(&self, index: usize) -> Result<Vec<&Parameter>> {
        let group = self.registry.groups().get(index).ok_or_else(|| {
            RLError::InvalidState(format!(
                "agent has {} optimizer groups, asked for group {index}",
                self.registry.len()
            ))
        })?;
        let mut vars = Vec::new();
        for member in group.members() {
            match member {
                Member::Encoder => {
                    if let Some(encoder) = &self.encoder {
                        vars.extend(encoder.trainable_variables());
                    }
                }
                Member::Rl => vars.extend(self.rl.trainable_variables()),
                Member::Icm => {
                    if let Some(icm) = &self.icm {
                        vars.extend(icm.trainable_variables());
                    }
                }
                Member::EntropyTarget => {
                    if let Some(et) = &self.entropy_target {
                        vars.extend(et.trainable_variables());
                    }
                }
            }
        }
        Ok(vars)
    }

    fn encode<'a>(&self, time_step: &'a TimeStep) -> Result<Cow<'a, TimeStep>> {
        match &self.encoder {
            Some(encoder) => {
                let observation = encoder.encode(&time_step.observation)?;
                Ok(Cow::Owned(time_step.with_observation(observation)))
            }
            None => Ok(Cow::Borrowed(time_step)),
        }
    }

    fn check_icm_slot<T>(&self, slot: Option<&T>, what: &str) -> Result<()> {
        match (self.icm.is_some(), slot.is_some()) {
            (true, false) => Err(RLError::InvalidState(format!(
                "{what} lacks the curiosity entry the agent was built with"
            ))),
            (false, true) => Err(RLError::InvalidState(format!(
                "{what} carries a curiosity entry but the agent has no curiosity module"
            ))),
            _ => Ok(()),
        }
    }

    fn check_info(&self, info: &InfoOf<R, C>) -> Result<()> {
        self.check_icm_slot(info.icm.as_ref(), "info")?;
        if self.entropy_target.is_some() != info.entropy_target.is_some() {
            return Err(RLError::InvalidState(
                "info entropy-target entry disagrees with the agent".to_string(),
            ));
        }
        Ok(())
    }

    /// Choose actions for inference. Curiosity and entropy control are not run.
    pub fn predict(
        &self,
        time_step: &TimeStep,
        state: &StateOf<R, C>,
    ) -> Result<PolicyStep<StateOf<R, C>, ()>> {
        if state.icm.is_some() {
            return Err(RLError::InvalidState(
                "predict state must not carry a curiosity entry".to_string(),
            ));
        }
        let time_step = self.encode(time_step)?;
        let step = self.rl.predict(&time_step, &state.rl)?;
        Ok(PolicyStep {
            action: step.action,
            action_distribution: step.action_distribution,
            state: AgentState {
                rl: step.state,
                icm: None,
            },
            info: (),
        })
    }

    /// Training-time step.
    ///
    /// Entries whose step opens an episode get a fresh curiosity state, so no
    /// transition is modelled across an episode boundary. Then it runs the
    /// curiosity module on `(features, prev_action)`, then the
    /// policy, then the entropy-target controller on the policy's action
    /// distribution. With `with_experience` set the curiosity module skips
    /// its intrinsic reward; it is recomputed from stored experience instead.
    pub fn rollout(
        &mut self,
        time_step: &TimeStep,
        state: &StateOf<R, C>,
        with_experience: bool,
    ) -> Result<PolicyStep<StateOf<R, C>, InfoOf<R, C>>> {
        self.check_icm_slot(state.icm.as_ref(), "rollout state")?;
        let time_step = self.encode(time_step)?;

        let (icm_state, icm_info) = match (&mut self.icm, &state.icm) {
            (Some(icm), Some(icm_state)) => {
                let is_first: Vec<bool> =
                    time_step.step_type.iter().map(StepType::is_first).collect();
                let icm_state = icm.reset_at_first_steps(icm_state, &is_first);
                let step = icm.train_step(
                    (&time_step.observation, &time_step.prev_action),
                    &icm_state,
                    !with_experience,
                )?;
                (Some(step.state), Some(step.info))
            }
            _ => (None, None),
        };

        let rl_step = self.rl.rollout(&time_step, &state.rl)?;

        let entropy_target = match &self.entropy_target {
            Some(et) => Some(et.train_step(&rl_step.action_distribution)?.info),
            None => None,
        };

        Ok(PolicyStep {
            action: rl_step.action,
            action_distribution: rl_step.action_distribution,
            state: AgentState {
                rl: rl_step.state,
                icm: icm_state,
            },
            info: AgentInfo {
                rl: rl_step.info,
                icm: icm_info,
                entropy_target,
            },
        })
    }

    /// Reward used for training: the weighted environment reward plus the
    /// weighted intrinsic reward, when one was computed for `info`
    pub fn calc_training_reward<'a>(
        &self,
        external_reward: &'a Tensor,
        info: &InfoOf<R, C>,
    ) -> Result<TrainingReward<'a>> {
        let intrinsic = match (&self.icm, &info.icm) {
            (Some(icm), Some(icm_info)) => icm.intrinsic_reward(icm_info),
            _ => None,
        };
        self.reward
            .compose(external_reward, intrinsic, self.summary.as_ref())
    }

    /// Aggregate loss of a time-major batch.
    ///
    /// When the curiosity info carries a computed reward the composed training
    /// reward replaces the batch reward first. A batch collected with
    /// `with_experience` carries none, and its reward is used as stored. The
    /// policy loss is folded with the curiosity loss and then the
    /// entropy-target loss. The entropy-target term `alpha * -H` carries the
    /// policy gradients of its entropy, weighted by the current `alpha`.
    pub fn calc_loss(
        &self,
        training_info: &TrainingInfo<InfoOf<R, C>>,
    ) -> Result<LossInfo<LossExtraOf<R, C>>> {
        self.check_info(&training_info.info)?;

        let has_intrinsic = match (&self.icm, &training_info.info.icm) {
            (Some(icm), Some(info)) => icm.intrinsic_reward(info).is_some(),
            _ => false,
        };
        let training_info = if has_intrinsic {
            let reward = self
                .calc_training_reward(&training_info.reward, &training_info.info)?
                .into_owned();
            Cow::Owned(training_info.with_reward(reward))
        } else {
            Cow::Borrowed(training_info)
        };

        let rl_info = training_info.with_info(training_info.info.rl.clone());
        let mut loss = self.rl.calc_loss(&rl_info)?.map_extra(|rl| AgentLossExtra {
            rl,
            icm: None,
            entropy_target: None,
        });

        if let (Some(icm), Some(info)) = (&self.icm, &training_info.info.icm) {
            loss = loss.fold(icm.calc_loss(info)?, |extra, icm_extra| {
                extra.icm = Some(icm_extra);
            })?;
        }
        if let (Some(et), Some(info)) = (&self.entropy_target, &training_info.info.entropy_target)
        {
            let entropy_gradients = self.rl.entropy_gradients(&rl_info, et.alpha())?;
            let et_loss = et.calc_loss(info)?.with_gradients(entropy_gradients);
            loss = loss.fold(et_loss, |extra, et_extra| {
                extra.entropy_target = Some(et_extra);
            })?;
        }
        Ok(loss)
    }

    /// Shape the stored reward of a replayed batch and hand the policy slice
    /// to the policy algorithm's own preprocessing.
    ///
    /// The intrinsic reward is moved out of the curiosity info and folded into
    /// the stored reward. Records collected with `with_experience` carry none;
    /// the curiosity module recomputes it here from the stored inputs. Either
    /// way the returned info holds no intrinsic reward, so [`Agent::calc_loss`]
    /// uses the shaped reward as is and does not add the bonus a second time.
    pub fn preprocess_experience(
        &self,
        experience: Experience<InfoOf<R, C>>,
    ) -> Result<Experience<InfoOf<R, C>>> {
        self.check_info(&experience.info)?;
        let (mut bare, info) = experience.into_parts();
        let AgentInfo {
            rl,
            mut icm,
            entropy_target,
        } = info;

        let intrinsic = match (&self.icm, icm.as_mut()) {
            (Some(module), Some(icm_info)) => match module.take_intrinsic_reward(icm_info) {
                Some(reward) => Some(reward),
                None => module.recompute_intrinsic_reward(icm_info)?,
            },
            _ => None,
        };
        bare.reward = self
            .reward
            .compose(&bare.reward, intrinsic.as_ref(), self.summary.as_ref())?
            .into_owned();

        let rl_experience = self.rl.preprocess_experience(bare.map_info(|()| rl))?;
        Ok(rl_experience.map_info(|rl| AgentInfo {
            rl,
            icm,
            entropy_target,
        }))
    }

    /// Apply `gradients` group by group.
    ///
    /// Each group with an optimizer selects the gradients of its members'
    /// parameters, clips them and takes one optimizer step. Returns the
    /// number of parameters that changed.
    pub fn apply_gradients(&mut self, gradients: &Gradients) -> Result<usize> {
        let Self {
            encoder,
            rl,
            icm,
            entropy_target,
            registry,
            gradient_clipping,
            summary,
            debug_summaries,
            ..
        } = self;

        let mut by_member: Vec<(Member, Vec<&mut Parameter>)> = Vec::new();
        if let Some(encoder) = encoder {
            by_member.push((Member::Encoder, encoder.trainable_variables_mut()));
        }
        by_member.push((Member::Rl, rl.trainable_variables_mut()));
        if let Some(icm) = icm {
            by_member.push((Member::Icm, icm.trainable_variables_mut()));
        }
        if let Some(et) = entropy_target {
            by_member.push((Member::EntropyTarget, et.trainable_variables_mut()));
        }

        let mut updated = 0;
        for (index, group) in registry.groups_mut().iter_mut().enumerate() {
            let members = group.members().to_vec();
            let Some(optimizer) = group.optimizer_mut() else {
                continue;
            };
            let params: Vec<&mut Parameter> = by_member
                .iter_mut()
                .filter(|(member, _)| members.contains(member))
                .flat_map(|(_, params)| params.iter_mut().map(|p| &mut **p))
                .collect();
            let mut selected = gradients.select(params.iter().map(|p| p.name.as_str()));
            if selected.is_empty() {
                continue;
            }
            if let Some(clipping) = gradient_clipping {
                let norm = clipping.clip(&mut selected);
                if *debug_summaries {
                    summary.scalar(&format!("grad_norm/group{index}"), norm);
                }
            }
            updated += optimizer.apply(params, &selected)?;
        }
        debug!(updated, "applied gradients");
        Ok(updated)
    }

    /// Compute the loss of a batch, train every group on it and adapt the
    /// entropy coefficient to the batch entropy
    pub fn train_complete(
        &mut self,
        training_info: &TrainingInfo<InfoOf<R, C>>,
    ) -> Result<LossInfo<LossExtraOf<R, C>>> {
        let loss = self.calc_loss(training_info)?;
        let updated = self.apply_gradients(&loss.gradients)?;
        debug!(
            steps = training_info.num_steps(),
            updated,
            total = loss.total(),
            "trained on batch"
        );

        if let (Some(et), Some(info)) =
            (&mut self.entropy_target, &training_info.info.entropy_target)
        {
            let alpha = et.adjust_alpha(tensor::mean(&info.entropy));
            if self.debug_summaries {
                self.summary.scalar("entropy_target/alpha", alpha);
            }
        }

        if self.debug_summaries {
            self.summary.scalar("loss/total", loss.total());
            if let Some(per_step) = &loss.loss {
                self.summary.scalar("loss/loss", tensor::mean(per_step));
            }
            if let Some(scalar_loss) = loss.scalar_loss {
                self.summary.scalar("loss/scalar_loss", scalar_loss);
            }
        }
        Ok(loss)
    }

    /// Apply the observation transformer and reward shaping, each when configured
    pub fn transform_timestep(&self, mut time_step: TimeStep) -> Result<TimeStep> {
        if let Some(transform) = &self.observation_transformer {
            time_step.observation = transform(&time_step.observation)?;
        }
        if let Some(shape) = &self.reward_shaping {
            time_step.reward = shape(&time_step.reward)?;
        }
        Ok(time_step)
    }
}

impl<R: RlAlgorithm, C: CuriosityModule> std::fmt::Debug for Agent<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("action_spec", &self.action_spec)
            .field("rl", &self.rl.name())
            .field("icm", &self.icm.as_ref().map(|icm| icm.name()))
            .field("entropy_target", &self.entropy_target.is_some())
            .field("groups", &self.registry.len())
            .finish_non_exhaustive()
    }
}
