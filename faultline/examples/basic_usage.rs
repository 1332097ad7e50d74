//! Basic usage example: a two-tier architecture under steady load, with one
//! backend instance killed halfway through.
//!
//! Run with: cargo run --package faultline --example basic_usage

use faultline::core::logging::init_simulation_logging_with_level;
use faultline::prelude::*;

const ARCHITECTURE: &str = r#"{
    "network_latency": {"type": "normal", "mean": 0.003, "std_dev": 0.001},
    "services": [
        {
            "name": "frontend",
            "instances": 2,
            "capacity": 1000,
            "load_balancer": "least_utilization",
            "operations": [{
                "name": "render",
                "demand": {"type": "exponential", "mean": 20},
                "dependencies": [{"service": "backend", "operation": "query", "probability": 0.8}]
            }]
        },
        {
            "name": "backend",
            "instances": 3,
            "capacity": 500,
            "threads": 2,
            "scheduler": {"type": "mlfq", "levels": 3, "base_quantum": 5},
            "operations": [{
                "name": "query",
                "demand": {"type": "log_normal", "mu": 3.0, "sigma": 0.4}
            }]
        }
    ]
}"#;

const EXPERIMENT: &str = r#"{
    "seed": 2024,
    "duration": 60.0,
    "generators": [{
        "service": "frontend",
        "operation": "render",
        "interval": {"type": "exponential", "mean": 0.01},
        "timeout": 1.0
    }],
    "faults": [{"service": "backend", "instances": 2, "time": 30.0}]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_simulation_logging_with_level("warn");

    let architecture = Architecture::from_descriptor(&serde_json::from_str(ARCHITECTURE)?)?;
    let experiment = Experiment::from_descriptor(&serde_json::from_str(EXPERIMENT)?, &architecture)?;
    let executor = experiment.executor();

    let tracker = RequestTracker::shared();
    let (mut sim, _mesh) = build_simulation(architecture, experiment, [tracker.clone() as SharedListener])?;
    sim.execute(executor)?;

    let tracker = tracker.borrow();
    println!("Simulation finished at {}", sim.time());
    println!("  events processed: {}", sim.events_processed());
    println!("  requests sent:    {}", tracker.sent());
    println!("  results received: {}", tracker.completed());
    for (reason, count) in tracker.failures_by_reason() {
        println!("  failed {reason:?}: {count}");
    }
    if let Some(mean) = tracker.mean_response_time() {
        println!("  mean response time: {mean}");
    }
    Ok(())
}
