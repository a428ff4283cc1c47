//! stakesim fuzz CLI
//!
//! Run named fuzz scenarios against the in-memory reference ledger.

use clap::Parser;
use stakesim_fuzz::{ScenarioId, ScenarioResult, ScenarioRunner};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Environment variable overriding the seed (for deterministic replay of a
/// failing run).
const SEED_ENV: &str = "STAKESIM_SEED";

/// Environment variable selecting a scenario, overriding `--scenario`.
const SCENARIO_ENV: &str = "STAKESIM_SCENARIO";

/// Stateful fuzzer for the staking/exchange ledger
#[derive(Parser, Debug)]
#[command(name = "stakesim-fuzz")]
#[command(about = "Run randomized staking/exchange simulations", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Driver steps per scenario run
    #[arg(long, default_value = "2000")]
    steps: u64,

    /// Scenario to run (staking, epochs, exchange, full, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if args.list {
        for scenario in ScenarioId::all() {
            println!("{:10} {}", scenario.name(), scenario.description());
        }
        return;
    }

    // Scenario selection: environment override wins over the flag.
    let scenario_selector = std::env::var(SCENARIO_ENV).unwrap_or_else(|_| args.scenario.clone());
    let scenarios: Vec<ScenarioId> = if scenario_selector == "all" {
        ScenarioId::all()
    } else {
        vec![scenario_selector.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: staking, epochs, exchange, full, all");
            std::process::exit(1);
        })]
    };

    // Seed: environment override, then the flag, then entropy.
    let base_seed = match std::env::var(SEED_ENV).ok().and_then(|s| s.parse().ok()) {
        Some(seed) => seed,
        None if args.seed == 0 => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42),
        None => args.seed,
    };

    if !args.json {
        info!("stakesim fuzzer");
        info!("base seed: {} (replay with {}={})", base_seed, SEED_ENV, base_seed);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_steps(args.steps);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary).unwrap());
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed", total);
        } else {
            error!("❌ {}/{} scenario runs failed", failed_count, total);
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
}
