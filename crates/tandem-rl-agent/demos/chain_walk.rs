//! Example: curious actor-critic agent walking a sparse-reward chain
//!
//! Each environment is a chain of cells. The agent starts at the left end and
//! is paid only when it reaches the right end, so early progress comes from
//! the curiosity bonus. An environment that reaches the goal restarts on its
//! next step, which is reported as the first step of a new episode. Pass a
//! JSON `AgentConfig` path to override defaults.

use tracing::info;

use tandem_rl_agent::{
    ActorCriticAlgorithm, ActorCriticConfig, AgentBuilder, AgentConfig, IcmAlgorithm, IcmConfig,
};
use tandem_rl_core::telemetry::init_tracing;
use tandem_rl_core::tensor::{self, stack_steps};
use tandem_rl_core::{ActionSpec, OptimizerConfig, StepType, Tensor, TimeStep, TrainingInfo};

const CHAIN_LEN: usize = 8;
const NUM_ENVS: usize = 4;
const UNROLL: usize = 16;
const ITERATIONS: usize = 200;

/// Batch of chain environments
struct ChainWalk {
    positions: Vec<usize>,
    /// Environments whose last step ended an episode
    restart: Vec<bool>,
}

impl ChainWalk {
    fn new() -> Self {
        Self {
            positions: vec![0; NUM_ENVS],
            restart: vec![false; NUM_ENVS],
        }
    }

    fn observe(&self) -> tandem_rl_core::Result<Tensor> {
        let mut data = vec![0.0; NUM_ENVS * CHAIN_LEN];
        for (env, &pos) in self.positions.iter().enumerate() {
            data[env * CHAIN_LEN + pos] = 1.0;
        }
        tensor::from_shape_vec(&[NUM_ENVS, CHAIN_LEN], data)
    }

    fn reset(&mut self) -> tandem_rl_core::Result<TimeStep> {
        self.positions.fill(0);
        self.restart.fill(false);
        Ok(TimeStep::first(self.observe()?))
    }

    /// Action 1 moves right, action 0 moves left. Environments restarting
    /// ignore the action.
    fn step(&mut self, action: &Tensor) -> tandem_rl_core::Result<TimeStep> {
        let mut rewards = vec![0.0; NUM_ENVS];
        let mut done = vec![false; NUM_ENVS];
        let mut prev_action = action.clone();
        for (env, &a) in action.iter().enumerate() {
            if self.restart[env] {
                self.positions[env] = 0;
                prev_action[[env]] = 0.0;
                continue;
            }
            let pos = &mut self.positions[env];
            if a >= 0.5 {
                *pos += 1;
            } else {
                *pos = pos.saturating_sub(1);
            }
            if *pos == CHAIN_LEN - 1 {
                rewards[env] = 1.0;
                done[env] = true;
            }
        }
        let mut time_step = TimeStep::transition(
            self.observe()?,
            prev_action,
            tensor::from_shape_vec(&[NUM_ENVS], rewards)?,
            &done,
        );
        for (env, _) in self.restart.iter().enumerate().filter(|(_, r)| **r) {
            time_step.step_type[[env]] = StepType::First;
        }
        self.restart = done;
        Ok(time_step)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let config = match std::env::args().nth(1) {
        Some(path) => AgentConfig::load(path).await?,
        None => AgentConfig {
            name: "chain_walk".to_string(),
            optimizer: Some(OptimizerConfig::adam(1e-2)),
            enforce_entropy_target: true,
            intrinsic_reward_coef: 0.5,
            gradient_clipping: Some(1.0),
            ..AgentConfig::default()
        },
    };

    let spec = ActionSpec::discrete(2);
    let icm = IcmAlgorithm::new(
        &spec,
        CHAIN_LEN,
        IcmConfig {
            normalize_reward: true,
            ..IcmConfig::default()
        },
    )?;
    // The entropy target takes over the policy's own entropy bonus.
    let policy_config = ActorCriticConfig {
        entropy_coef: if config.enforce_entropy_target {
            0.0
        } else {
            ActorCriticConfig::default().entropy_coef
        },
        ..ActorCriticConfig::default()
    };
    let mut agent = AgentBuilder::new(spec)
        .config(config)
        .curiosity(icm)
        .build(|spec| ActorCriticAlgorithm::new(spec, CHAIN_LEN, policy_config))?;

    let mut env = ChainWalk::new();
    let mut time_step = env.reset()?;
    let mut state = agent.initial_train_state(NUM_ENVS);
    let mut goals = 0usize;

    for iteration in 0..ITERATIONS {
        let mut records = Vec::with_capacity(UNROLL);
        for _ in 0..UNROLL {
            let time_step_in = agent.transform_timestep(time_step)?;
            let out = agent.rollout(&time_step_in, &state, false)?;
            records.push(TrainingInfo::from_step(
                &time_step_in,
                out.action.clone(),
                out.info,
            ));
            state = out.state;
            time_step = env.step(&out.action)?;
            goals += time_step.reward.iter().filter(|r| **r > 0.0).count();
        }

        let batch = stack_steps(&records)?;
        let loss = agent.train_complete(&batch)?;
        if iteration % 20 == 0 {
            info!(
                iteration,
                loss = loss.total(),
                pg_loss = loss.extra.rl.pg_loss,
                forward_loss = loss.extra.icm.as_ref().map_or(0.0, |e| e.forward_loss),
                alpha = agent.entropy_target().map_or(0.0, |et| et.alpha()),
                icm_reward_mean = agent.icm().map_or(0.0, |icm| icm.reward_stats().mean),
                goals,
                "training progress"
            );
        }
    }

    let eval_state = agent.initial_predict_state(NUM_ENVS);
    let greedy = agent.predict(&env.reset()?, &eval_state)?;
    println!("Goals reached during training: {goals}");
    println!("Greedy first actions: {:?}", greedy.action.as_slice());
    Ok(())
}
