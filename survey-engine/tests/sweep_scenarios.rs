use std::convert::Infallible;
use std::io;

use survey_engine::{
    Aggregator, ClassificationRegistry, ClassificationRule, EntityMatch, FeatureKey,
    GenerationResult, KeyTemplate, PlacedEntity, SeedOrder, SweepConfig, SweepError,
    SweepOrchestrator, TargetDescriptor, TrialRecord, concat, from_fn,
};

fn eggs_floor(n: usize) -> GenerationResult {
    let mut result = GenerationResult::new();
    for _ in 0..n {
        result.push(PlacedEntity::creature("Egg"));
    }
    result
}

fn registry_with(target: &TargetDescriptor, rule: ClassificationRule) -> ClassificationRegistry {
    let mut registry = ClassificationRegistry::new();
    registry.register(target.clone(), rule).unwrap();
    registry
}

#[test]
fn one_trial_with_five_eggs() {
    let target = TargetDescriptor::new("A", 1);
    let registry = registry_with(
        &target,
        ClassificationRule::single(KeyTemplate::new().count("eggs", EntityMatch::creature("Egg"))),
    );
    let config = SweepConfig::new(target).with_base_seed(0x1234).with_trial_count(1);
    let mut generator = from_fn(|_, _: &TargetDescriptor| Ok::<_, Infallible>(eggs_floor(5)));

    let run = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, io::sink())
        .unwrap();

    assert_eq!(
        serde_json::to_string(run.histogram()).unwrap(),
        r#"{"{eggs: 5}":1}"#
    );
    assert_eq!(
        run.record().to_string(),
        r#"{"seed": 0x00001234, "num": 0x00000001, "result": {"{eggs: 5}": 1}}"#
    );
}

#[test]
fn wealthy_presence_over_two_trials() {
    let target = TargetDescriptor::new("FC", 7);
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(target).with_base_seed(0).with_trial_count(2);
    let mut generator = from_fn(|seed, _: &TargetDescriptor| {
        let mut result = GenerationResult::new();
        if seed == 1 {
            result.push(PlacedEntity::creature("Wealthy"));
        }
        Ok::<_, Infallible>(result)
    });

    let run = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, io::sink())
        .unwrap();

    let entries: Vec<_> = run.histogram().iter().collect();
    assert_eq!(entries, vec![("{oogane: false}", 1), ("{oogane: true}", 1)]);
}

#[test]
fn missing_kemekuji_is_reported_by_seed() {
    let target = TargetDescriptor::new("SR", 7);
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(target).with_base_seed(0xFF).with_trial_count(3);
    let mut generator = from_fn(|seed, _: &TargetDescriptor| {
        let mut result = GenerationResult::new();
        if seed != 0x100 {
            result.push(PlacedEntity::creature("UmiMushi"));
        }
        Ok::<_, Infallible>(result)
    });
    let mut notable = Vec::new();

    let run = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, &mut notable)
        .unwrap();

    assert_eq!(run.notable_reports(), 1);
    assert_eq!(
        String::from_utf8(notable).unwrap(),
        "kemekuji = false, seed = 0x00000100\n"
    );
    assert_eq!(run.histogram().get("{kemekuji: true}"), 2);
    assert_eq!(run.histogram().get("{kemekuji: false}"), 1);
}

#[test]
fn custom_notable_rule_from_json() {
    let target = TargetDescriptor::new("CH99", 1);
    let mut registry = ClassificationRegistry::new();
    registry
        .extend_from_json(
            r#"{"rules": [{
                "targets": ["CH99"],
                "keys": [[{"probe": "count", "field": "eggs", "entity": {"name": "Egg"}}]],
                "notable": {
                    "values": [{"probe": "count", "field": "eggs", "entity": {"name": "Egg"}}],
                    "when": {"kind": "at_least", "field": "eggs", "min": 3}
                }
            }]}"#,
        )
        .unwrap();
    let config = SweepConfig::new(target).with_base_seed(0).with_trial_count(5);
    let mut generator = from_fn(|seed, _: &TargetDescriptor| {
        Ok::<_, Infallible>(eggs_floor(seed as usize))
    });
    let mut notable = Vec::new();

    let run = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, &mut notable)
        .unwrap();

    assert_eq!(run.histogram().len(), 5);
    assert_eq!(
        String::from_utf8(notable).unwrap(),
        "eggs = 3, seed = 0x00000003\neggs = 4, seed = 0x00000004\n"
    );
}

#[test]
fn unsupported_target_leaves_no_output() {
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(TargetDescriptor::new("XYZ", 9)).with_trial_count(4);
    let mut notable = Vec::new();
    let mut generator = from_fn(|_, _: &TargetDescriptor| Ok::<_, Infallible>(eggs_floor(1)));

    let err = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, &mut notable)
        .unwrap_err();

    assert!(err.is_unsupported_target());
    assert!(notable.is_empty());
}

#[test]
fn failure_tolerance_toggles_between_skip_and_abort() {
    let target = TargetDescriptor::new("CH5", 2);
    let registry = ClassificationRegistry::builtin();
    let flaky = |seed: u32, _: &TargetDescriptor| {
        if seed == 2 {
            Err(io::Error::other("room overflow"))
        } else {
            Ok(eggs_floor(1))
        }
    };

    let tolerant = SweepConfig::new(target.clone()).with_trial_count(4);
    let run = SweepOrchestrator::new(&tolerant, &registry)
        .run(&mut from_fn(flaky), io::sink())
        .unwrap();
    assert_eq!(run.successful_trials(), 3);
    assert_eq!(run.failed_trials(), 1);
    assert_eq!(run.histogram().get("{eggs: 1}"), 3);

    let strict = tolerant.with_tolerate_failures(false);
    let err = SweepOrchestrator::new(&strict, &registry)
        .run(&mut from_fn(flaky), io::sink())
        .unwrap_err();
    assert!(matches!(err, SweepError::Generation(ref failure) if failure.seed == 2));
}

#[test]
fn histogram_total_tracks_keys_per_trial() {
    let target = TargetDescriptor::new("CH28", 1);
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(target).with_trial_count(50);
    let mut generator = from_fn(|seed, _: &TargetDescriptor| {
        let mut result = eggs_floor((seed % 4) as usize);
        if seed % 3 == 0 {
            result.set_flag("geyser");
        }
        Ok::<_, Infallible>(result)
    });

    let run = SweepOrchestrator::new(&config, &registry)
        .run(&mut generator, io::sink())
        .unwrap();

    assert_eq!(run.keys_per_trial(), 2);
    assert_eq!(run.histogram().total(), 100);
    assert_eq!(run.histogram().get("{geyser: true}"), 17);
}

#[test]
fn zero_and_negative_counts_finish_empty() {
    let registry = ClassificationRegistry::builtin();
    for count in [0, -5] {
        let config = SweepConfig::new(TargetDescriptor::new("CH8", 1)).with_trial_count(count);
        let mut generator = from_fn(|_, _: &TargetDescriptor| -> Result<GenerationResult, Infallible> {
            panic!("no trial should run")
        });
        let run = SweepOrchestrator::new(&config, &registry)
            .run(&mut generator, io::sink())
            .unwrap();
        assert!(run.histogram().is_empty());
        assert_eq!(
            run.record().to_string(),
            r#"{"seed": 0x00000000, "num": 0x00000000, "result": {}}"#
        );
    }
}

#[test]
fn sharded_sweep_matches_sequential() {
    let target = TargetDescriptor::new("CH21", 1);
    let registry = ClassificationRegistry::builtin();
    let floor = |seed: u32, _: &TargetDescriptor| {
        let mut result = GenerationResult::new();
        for (name, n) in [("Hana", 2 - seed % 2), ("Armor", 3), ("Wealthy", 1), ("UjiA", seed % 3)] {
            for _ in 0..n {
                result.push(PlacedEntity::creature(name));
            }
        }
        Ok::<_, Infallible>(result)
    };

    let sequential_config = SweepConfig::new(target.clone())
        .with_base_seed(0x40)
        .with_trial_count(97);
    let mut sequential_notable = Vec::new();
    let sequential = SweepOrchestrator::new(&sequential_config, &registry)
        .run(&mut from_fn(floor), &mut sequential_notable)
        .unwrap();

    let sharded_config = sequential_config.clone().with_workers(4);
    let mut sharded_notable = Vec::new();
    let sharded = SweepOrchestrator::new(&sharded_config, &registry)
        .run_sharded(|_| from_fn(floor), &mut sharded_notable)
        .unwrap();

    assert_eq!(sequential.histogram(), sharded.histogram());
    assert_eq!(sequential.notable_reports(), sharded.notable_reports());
    assert_eq!(sequential_notable, sharded_notable);
    assert_eq!(sequential.record().seed, sharded.record().seed);
}

#[test]
fn sharded_failure_aborts_every_worker() {
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(TargetDescriptor::new("CH5", 2))
        .with_trial_count(400)
        .with_workers(4)
        .with_tolerate_failures(false);
    let mut notable = Vec::new();
    let err = SweepOrchestrator::new(&config, &registry)
        .run_sharded(
            |_| {
                from_fn(|seed, _: &TargetDescriptor| {
                    if seed == 250 {
                        Err(io::Error::other("room overflow"))
                    } else {
                        Ok(eggs_floor(0))
                    }
                })
            },
            &mut notable,
        )
        .unwrap_err();
    assert!(matches!(err, SweepError::Generation(ref failure) if failure.seed == 250));
    assert!(notable.is_empty());
}

#[test]
fn permuted_order_covers_distinct_seeds() {
    let registry = ClassificationRegistry::builtin();
    let config = SweepConfig::new(TargetDescriptor::new("CH5", 2))
        .with_base_seed(7)
        .with_trial_count(64)
        .with_order(SeedOrder::Permuted);
    let mut seen = Vec::new();
    let mut generator = from_fn(|seed, _: &TargetDescriptor| {
        seen.push(seed);
        Ok::<_, Infallible>(eggs_floor(0))
    });
    let mut orchestrator = SweepOrchestrator::new(&config, &registry);
    let expected: Vec<u32> = orchestrator.sequencer().iter().collect();
    orchestrator.run(&mut generator, io::sink()).unwrap();
    drop(generator);

    assert_eq!(seen, expected);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 64);
}

#[test]
fn split_sweeps_concatenate_to_the_full_sweep() {
    let registry = ClassificationRegistry::builtin();
    let target = TargetDescriptor::new("CH8", 1);
    let floor = |seed: u32, _: &TargetDescriptor| {
        let mut result = GenerationResult::new();
        for _ in 0..(3 + seed % 13) {
            result.push(PlacedEntity::creature("Kochappy"));
        }
        Ok::<_, Infallible>(result)
    };
    let sweep = |base: u32, count: i64| -> TrialRecord {
        let config = SweepConfig::new(target.clone())
            .with_base_seed(base)
            .with_trial_count(count);
        SweepOrchestrator::new(&config, &registry)
            .run(&mut from_fn(floor), io::sink())
            .unwrap()
            .record()
    };

    let whole = sweep(0, 200);
    let parts = [sweep(120, 80), sweep(0, 50), sweep(50, 70)];
    let lines: Vec<String> = parts.iter().map(ToString::to_string).collect();
    let reparsed: Vec<TrialRecord> = lines.iter().map(|l| l.parse().unwrap()).collect();
    let merged = concat(reparsed).unwrap();

    assert_eq!(merged.seed, whole.seed);
    assert_eq!(merged.num, whole.num);
    assert_eq!(merged.result, whole.result);
}

#[test]
fn aggregator_merge_laws_hold_for_shards() {
    let keys: Vec<_> = (0..6u32)
        .map(|n| FeatureKey::new().with_count("eggs", n))
        .collect();
    let shard = |range: std::ops::Range<usize>| {
        let mut agg = Aggregator::new();
        for i in range {
            agg.record_trial([&keys[i % keys.len()]]);
        }
        agg
    };
    let (a, b, c) = (shard(0..7), shard(7..11), shard(11..20));

    let mut left = a.clone();
    left.merge(&b);
    left.merge(&c);
    let mut right = c.clone();
    right.merge(&b);
    right.merge(&a);

    assert_eq!(left.histogram(), right.histogram());
    assert_eq!(left.successful_trials(), 20);
    assert_eq!(left.histogram().total(), left.expected_total(1));
}
