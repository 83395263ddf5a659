//! Trains a small regression model described by a module config.
//!
//! Without `--config` a `Linear -> Tanh -> Linear` chain is used. The data
//! is synthetic: `y = sin(pi * x)` sampled on `[-1, 1]`.

use clap::Parser;
use dvitch::config::{ModuleConfig, Registry};
use dvitch::jit;
use dvitch::losses::mse_mean_objective;
use dvitch::nn::{Module, ModuleExt};
use dvitch::optimizers::{Optimizer, Sgd};
use ndarray::{Array, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "dvitch: train a module tree on synthetic data", long_about = None)]
struct Args {
    /// JSON module config; the model must map [n, 1] inputs to [n, 1] outputs
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 300)]
    epochs: usize,

    #[arg(long, default_value_t = 0.1)]
    lr: f32,

    #[arg(long, default_value_t = 0.0)]
    momentum: f32,

    /// Number of training samples
    #[arg(long, default_value_t = 64)]
    samples: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the traced forward graph as JSON
    #[arg(long)]
    dump_graph: Option<PathBuf>,
}

fn default_config(seed: u64) -> ModuleConfig {
    let linear = |i: u64, n_in: usize, n_out: usize| {
        ModuleConfig::new("Linear")
            .kwarg("in_features", n_in)
            .kwarg("out_features", n_out)
            .kwarg("seed", seed.wrapping_add(i))
    };
    ModuleConfig::new("Sequential")
        .child("0", Some(linear(0, 1, 16)))
        .child("1", Some(ModuleConfig::new("Tanh")))
        .child("2", Some(linear(1, 16, 1)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ModuleConfig::load(path)?,
        None => default_config(args.seed),
    };
    let mut model = Registry::standard().build(&config)?;
    info!(
        kind = %config.kind,
        modules = model.named_modules("", true, true).count(),
        parameters = model.num_parameters(),
        "model built"
    );

    let mut rng = StdRng::seed_from_u64(args.seed);
    let x = Array::random_using(IxDyn(&[args.samples, 1]), Uniform::new_inclusive(-1.0f32, 1.0), &mut rng);
    let y = x.mapv(|v| (std::f32::consts::PI * v).sin());

    if let Some(path) = &args.dump_graph {
        let compiled = jit::compile_forward(model.as_ref(), &model.parameter_values(), &model.buffer_values())?;
        std::fs::write(path, serde_json::to_string_pretty(compiled.graph())?)?;
        info!(path = %path.display(), nodes = compiled.graph().len(), "forward graph written");
    }

    model.train();
    let mut sgd = Sgd::with_momentum(args.lr, args.momentum);
    let report_every = (args.epochs / 10).max(1);
    for epoch in 0..args.epochs {
        let step = model.gradient(mse_mean_objective, &x, &[y.clone()])?;
        sgd.step(model.as_ref(), &step.grads)?;
        if epoch % report_every == 0 || epoch + 1 == args.epochs {
            info!(epoch, loss = step.value, "train");
        }
    }
    model.eval();

    let prediction = model.invoke(&x)?;
    let error = (&prediction - &y).mapv(|e| e * e).mean().unwrap_or(f32::NAN);
    info!(mse = error, compiled = model.core().compiled_count(), "done");
    println!("final mse: {error:.6}");
    Ok(())
}
