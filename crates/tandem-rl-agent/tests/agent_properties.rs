//! Properties of agent composition that hold for any member configuration

use proptest::prelude::*;

use tandem_rl_agent::{
    ActorCriticAlgorithm, ActorCriticConfig, Agent, AgentBuilder, AgentConfig, IcmAlgorithm,
    IcmConfig, InfoOf, Member, RewardComposer,
};
use tandem_rl_core::tensor::{self, stack_steps};
use tandem_rl_core::{
    ActionSpec, Algorithm, CuriosityModule, MemorySink, OptimizerConfig, RlAlgorithm, Tensor,
    TimeStep, TrainingInfo,
};

const FEATURES: usize = 2;
const BATCH: usize = 3;

fn agent(seed: u64, curiosity: bool, entropy_target: bool) -> Agent<ActorCriticAlgorithm> {
    let builder = AgentBuilder::new(ActionSpec::discrete(3))
        .config(AgentConfig {
            optimizer: Some(OptimizerConfig::adam(1e-3)),
            enforce_entropy_target: entropy_target,
            ..AgentConfig::default()
        });
    let builder = if curiosity {
        builder.curiosity(
            IcmAlgorithm::new(
                &ActionSpec::discrete(3),
                FEATURES,
                IcmConfig {
                    seed,
                    ..IcmConfig::default()
                },
            )
            .unwrap(),
        )
    } else {
        builder
    };
    builder
        .build(|spec| {
            ActorCriticAlgorithm::new(
                spec,
                FEATURES,
                ActorCriticConfig {
                    seed,
                    ..ActorCriticConfig::default()
                },
            )
        })
        .unwrap()
}

fn observation(t: usize, phase: f32) -> Tensor {
    tensor::from_shape_vec(
        &[BATCH, FEATURES],
        (0..BATCH * FEATURES)
            .map(|v| (v as f32 * 0.3 + t as f32 + phase).cos())
            .collect(),
    )
    .unwrap()
}

fn collect(
    agent: &mut Agent<ActorCriticAlgorithm>,
    steps: usize,
    phase: f32,
    rewards: &[f32],
) -> TrainingInfo<InfoOf<ActorCriticAlgorithm, IcmAlgorithm>> {
    let mut state = agent.initial_train_state(BATCH);
    let mut time_step = TimeStep::first(observation(0, phase));
    let mut records = Vec::with_capacity(steps);
    for t in 0..steps {
        let out = agent.rollout(&time_step, &state, false).unwrap();
        records.push(TrainingInfo::from_step(&time_step, out.action.clone(), out.info));
        state = out.state;
        let reward = tensor::from_shape_vec(&[BATCH], vec![rewards[t % rewards.len()]; BATCH])
            .unwrap();
        time_step = TimeStep::transition(
            observation(t + 1, phase),
            out.action,
            reward,
            &[false, t % 2 == 1, false],
        );
    }
    stack_steps(&records).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_composed_reward_is_weighted_sum(
        pairs in prop::collection::vec((-10.0f32..10.0, 0.0f32..5.0), 1..16),
        extrinsic_coef in 0.0f32..3.0,
        intrinsic_coef in 0.0f32..3.0,
    ) {
        let (external, intrinsic): (Vec<f32>, Vec<f32>) = pairs.into_iter().unzip();
        let n = external.len();
        let external = tensor::from_shape_vec(&[n], external).unwrap();
        let intrinsic = tensor::from_shape_vec(&[n], intrinsic).unwrap();
        let sink = MemorySink::new();

        let composed = RewardComposer::new(extrinsic_coef, intrinsic_coef)
            .compose(&external, Some(&intrinsic), &sink)
            .unwrap();

        prop_assert!(composed.is_modified());
        for i in 0..n {
            let expected = extrinsic_coef * external[[i]] + intrinsic_coef * intrinsic[[i]];
            prop_assert!((composed.reward()[[i]] - expected).abs() < 1e-4);
        }
        prop_assert_eq!(sink.tags(), vec!["reward/icm".to_string(), "reward/overall".to_string()]);
    }

    #[test]
    fn test_agent_loss_is_sum_of_member_losses(
        seed in 0u64..1000,
        steps in 2usize..6,
        phase in 0.0f32..3.0,
        rewards in prop::collection::vec(-1.0f32..1.0, 1..4),
        curiosity in any::<bool>(),
        entropy_target in any::<bool>(),
    ) {
        let mut agent = agent(seed, curiosity, entropy_target);
        let batch = collect(&mut agent, steps, phase, &rewards);
        let loss = agent.calc_loss(&batch).unwrap();

        let reward = agent
            .calc_training_reward(&batch.reward, &batch.info)
            .unwrap()
            .into_owned();
        let rl_batch = batch.with_reward(reward).with_info(batch.info.rl.clone());
        let mut expected = agent.rl().calc_loss(&rl_batch).unwrap().total();
        if let (Some(icm), Some(info)) = (agent.icm(), &batch.info.icm) {
            expected += icm.calc_loss(info).unwrap().total();
        }
        if let (Some(et), Some(info)) = (agent.entropy_target(), &batch.info.entropy_target) {
            expected += et.calc_loss(info).unwrap().total();
        }

        prop_assert!((loss.total() - expected).abs() < 1e-4);
        prop_assert_eq!(loss.extra.icm.is_some(), curiosity);
        prop_assert_eq!(loss.extra.entropy_target.is_some(), entropy_target);
    }

    #[test]
    fn test_groups_follow_member_optimizers(
        rl_own in any::<bool>(),
        icm_own in any::<bool>(),
    ) {
        let own = |flag: bool| flag.then(|| OptimizerConfig::sgd(0.01));
        let icm = IcmAlgorithm::new(
            &ActionSpec::discrete(2),
            FEATURES,
            IcmConfig {
                optimizer: own(icm_own),
                ..IcmConfig::default()
            },
        )
        .unwrap();
        let agent = AgentBuilder::new(ActionSpec::discrete(2))
            .curiosity(icm)
            .enforce_entropy_target(true)
            .build(|spec| {
                ActorCriticAlgorithm::new(
                    spec,
                    FEATURES,
                    ActorCriticConfig {
                        optimizer: own(rl_own),
                        ..ActorCriticConfig::default()
                    },
                )
            })
            .unwrap();

        let registry = agent.registry();
        prop_assert_eq!(registry.len(), 1 + usize::from(rl_own) + usize::from(icm_own));
        prop_assert_eq!(registry.group_of(Member::Encoder), Some(0));
        prop_assert_eq!(registry.group_of(Member::EntropyTarget), Some(0));
        prop_assert_eq!(registry.group_of(Member::Rl) == Some(0), !rl_own);
        prop_assert_eq!(registry.group_of(Member::Icm) == Some(0), !icm_own);
        prop_assert!(agent.rl().optimizer().is_some() == rl_own);
    }
}

#[test]
fn test_training_reduces_curiosity_loss() {
    let mut agent = agent(3, true, true);
    let batch = collect(&mut agent, 5, 0.5, &[0.5, -0.5]);
    let icm_loss = |agent: &Agent<ActorCriticAlgorithm>| {
        agent
            .icm()
            .unwrap()
            .calc_loss(batch.info.icm.as_ref().unwrap())
            .unwrap()
            .total()
    };
    let before = icm_loss(&agent);
    for _ in 0..50 {
        agent.train_complete(&batch).unwrap();
    }
    assert!(icm_loss(&agent) < before);
}
