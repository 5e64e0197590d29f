use clap::Parser;

use gr1_rs::config::{MinimizerKind, SynthesisConfig};
use gr1_rs::countertrace::CountertraceOutcome;
use gr1_rs::formula::{Expr, Specification, Temporal};
use gr1_rs::graph::GraphOutcome;
use gr1_rs::synthesis::{Outcome, Synthesizer};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of clients.
    #[arg(value_name = "INT", default_value = "3")]
    clients: usize,

    /// Require every request to be granted in the same step (unrealizable for 2+ clients).
    #[clap(long)]
    strict: bool,

    /// Use linear deletion instead of delta debugging for core minimization.
    #[clap(long)]
    linear: bool,

    /// Sift the variable order between phases.
    #[clap(long)]
    reorder: bool,

    /// BDD size (in bits, so the actual size is `2^size` nodes).
    #[clap(long, value_name = "INT", default_value = "16")]
    size: usize,

    /// Write the controller (or the counterstrategy graph) to this DOT file.
    #[clap(long, value_name = "PATH")]
    dot: Option<std::path::PathBuf>,
}

fn arbiter(n: usize, strict: bool) -> Specification {
    let r = |i: usize| format!("r{}", i);
    let g = |i: usize| format!("g{}", i);

    let mut spec = Specification::new();
    for i in 0..n {
        spec = spec.input(&r(i));
    }
    for i in 0..n {
        spec = spec.output(&g(i));
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let both = Expr::next(Expr::var(g(i))) & Expr::next(Expr::var(g(j)));
            spec = spec.guarantee(&format!("mutex_{}_{}", i, j), Temporal::Always(!both));
        }
    }
    for i in 0..n {
        let served = !Expr::var(r(i)) | Expr::var(g(i));
        spec = spec.guarantee(&format!("fair_{}", i), Temporal::AlwaysEventually(served));
    }
    if strict {
        for i in 0..n {
            let prompt = Expr::next(Expr::var(r(i))).implies(Expr::next(Expr::var(g(i))));
            spec = spec.guarantee(&format!("prompt_{}", i), Temporal::Always(prompt));
        }
    }
    spec
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let spec = arbiter(args.clients, args.strict);
    println!("Arbiter with {} clients: {} formulas", args.clients, spec.formulas.len());

    let mut config = SynthesisConfig::default().with_reorder(args.reorder);
    config.table_bits = args.size;
    if args.linear {
        config = config.with_minimizer(Some(MinimizerKind::Linear));
    }

    let synthesizer = Synthesizer::new(config);
    let mut report = synthesizer.run(&spec)?;
    let dropped = report.collect_garbage();
    println!("Dropped {} dead node(s)", dropped);
    let bdd = report.bdd();
    println!("bdd = {:?}", bdd);

    match &report.outcome {
        Outcome::Realizable(realization) => {
            let controller = &realization.controller;
            println!("Realizable after {} iterations", realization.iterations);
            for f in controller.functions() {
                println!("  {}[{}] of size {}", f.name, f.bit, bdd.size(f.function));
            }
            if let Some(path) = &args.dot {
                let roots: Vec<_> = controller.functions().map(|f| f.function).collect();
                std::fs::write(path, bdd.to_dot(&roots)?)?;
                println!("Controller written to {}", path.display());
            }
        }
        Outcome::Unrealizable(diagnosis) => {
            println!("Unrealizable (satisfiable: {:?})", diagnosis.satisfiable);
            println!(
                "Core of {} out of {} formulas after {} oracle calls: {:?}",
                diagnosis.core_size(),
                diagnosis.total_formulas(),
                diagnosis.oracle_calls(),
                diagnosis.core_formulas
            );
            match &diagnosis.countertrace {
                Some(CountertraceOutcome::Found(trace)) => {
                    for (k, step) in trace.steps.iter().enumerate() {
                        let marker = if Some(k) == trace.repeat_index { " <- loop" } else { "" };
                        println!("  step {}: {:?}{}", k, step.inputs, marker);
                    }
                }
                other => println!("Countertrace: {:?}", other),
            }
            match &diagnosis.graph {
                Some(GraphOutcome::Built(graph)) => {
                    println!("Counterstrategy graph: {} states", graph.num_nodes());
                    if let Some(path) = &args.dot {
                        std::fs::write(path, graph.to_dot()?)?;
                        println!("Graph written to {}", path.display());
                    }
                }
                other => println!("Counterstrategy graph: {:?}", other),
            }
        }
        Outcome::Inconclusive(inconclusive) => {
            println!(
                "Inconclusive: {} formulas left after {} oracle calls",
                inconclusive.partial_core.formulas.len(),
                inconclusive.partial_core.oracle_calls
            );
        }
    }

    for (phase, elapsed) in &report.timings {
        println!("  {}: {:.3} s", phase, elapsed.as_secs_f64());
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
