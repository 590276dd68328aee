//! # Reaction Network Compilation Benchmarks
//!
//! Measures the one-time cost of compiling a reaction network and the per-call
//! cost of the compiled right-hand side against a hand-written implementation.
//!
//! ## System Description
//!
//! A linear pathway `S0 → S1 → ... → Sn` where every step follows
//! Michaelis-Menten kinetics with product inhibition:
//!
//! `v_i = vmax_i * S_i / (km_i + S_i) / (1 + S_{i+1} / ki_i)`
//!
//! ## Benchmark Details
//!
//! - **Compilation**: `OdeSystem::compile` for pathways of increasing length,
//!   covering parsing, symbolic Jacobian and lowering to stack programs
//! - **Evaluation**: one RHS call of the compiled system vs. direct Rust code
//! - **Emission**: rendering the Stan function of the largest pathway
//!
//! Run with: `cargo bench --bench compile`

use std::collections::HashMap;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kinetics_codegen::prelude::*;

const VMAX: f64 = 0.85;
const KM: f64 = 150.0;
const KI: f64 = 20.0;

/// Builds a pathway with `steps` reactions and `steps + 1` species.
fn pathway(steps: usize) -> ReactionNetwork {
    let species: Vec<String> = (0..=steps).map(|i| format!("S{i}")).collect();
    let reactions: Vec<String> = (0..steps).map(|i| format!("v{i}")).collect();

    let mut network = ReactionNetwork::new(species.clone(), reactions.clone(), HashMap::new());
    for i in 0..steps {
        network.rate_laws.insert(
            reactions[i].clone(),
            format!(
                "vmax_{i} * S{i} / (km_{i} + S{i}) / (1 + S{} / ki_{i})",
                i + 1
            ),
        );
        network
            .mass_balances
            .entry(species[i].clone())
            .or_default()
            .insert(reactions[i].clone(), -1.0);
        network
            .mass_balances
            .entry(species[i + 1].clone())
            .or_default()
            .insert(reactions[i].clone(), 1.0);
        network.parameters.insert(format!("vmax_{i}"), VMAX);
        network.parameters.insert(format!("km_{i}"), KM);
        network.parameters.insert(format!("ki_{i}"), KI);
    }
    network
}

/// Hand-written right-hand side of the same pathway.
fn direct_rhs(y: &[f64], dy: &mut [f64]) {
    dy.fill(0.0);
    for i in 0..y.len() - 1 {
        let rate = VMAX * y[i] / (KM + y[i]) / (1.0 + y[i + 1] / KI);
        dy[i] -= rate;
        dy[i + 1] += rate;
    }
}

fn benchmark_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compilation");
    for steps in [5, 20, 50] {
        let network = pathway(steps);
        group.bench_with_input(BenchmarkId::new("OdeSystem", steps), &network, |b, n| {
            b.iter(|| OdeSystem::compile(black_box(n)).unwrap())
        });
    }
    group.finish();
}

fn benchmark_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("RHS Evaluation");
    for steps in [5, 20, 50] {
        let network = pathway(steps);
        let system = OdeSystem::compile(&network).unwrap();
        let y: Vec<f64> = (0..=steps).map(|i| 1000.0 / (i + 1) as f64).collect();
        let mut dy = vec![0.0; y.len()];

        group.bench_with_input(BenchmarkId::new("Direct", steps), &y, |b, y| {
            b.iter(|| direct_rhs(black_box(y), &mut dy))
        });
        group.bench_with_input(BenchmarkId::new("Compiled", steps), &y, |b, y| {
            let mut out = vec![0.0; y.len()];
            b.iter(|| {
                system
                    .rhs_into(&Inputs::state(black_box(y)), &mut out)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn benchmark_emission(c: &mut Criterion) {
    let network = pathway(50);
    c.bench_function("Stan Emission", |b| {
        b.iter(|| StanEmitter::default().emit(black_box(&network)).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_compilation,
    benchmark_evaluation,
    benchmark_emission
);
criterion_main!(benches);
