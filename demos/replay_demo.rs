//! Demonstration of the Pulse Sentinel monitoring loop.
//!
//! This example shows how to:
//! 1. Replay a scripted sensor stream through the monitor
//! 2. Watch the classifier move from label fallback to model predictions
//! 3. Restart against the same store and pick up the checkpointed model
//!
//! Run with: cargo run --example replay_demo
//!
//! No sensor or network access is needed; everything stays in memory.

use pulse_sentinel::{
    core::{ForestSettings, ManagerSettings},
    monitor::{Monitor, MonitorSettings, NoopActuator, StepOutcome},
    source::ScriptedLineSource,
    store::{MemoryEventSink, MemoryModelStore},
    telemetry::create_shared_stats,
    DISCLAIMER,
};
use std::time::Duration;

/// A resting trace with a tachycardic episode in the middle.
fn synthetic_trace() -> Vec<String> {
    let mut lines = vec!["# sensor boot".to_string()];
    for i in 0..40u32 {
        let bpm = match i {
            15..=24 => 115 + (i * 7) % 25,
            _ => 62 + (i * 5) % 30,
        };
        lines.push(format!("BPM: {bpm}"));
        if i == 8 {
            lines.push("BPM: --".to_string());
        }
    }
    lines
}

fn demo_settings() -> MonitorSettings {
    MonitorSettings {
        read_timeout: Duration::from_millis(10),
        poll_delay: Duration::ZERO,
        device_id: "replay-demo".to_string(),
    }
}

fn manager_settings() -> ManagerSettings {
    ManagerSettings {
        forest: ForestSettings {
            n_trees: 25,
            ..ForestSettings::default()
        },
        ..ManagerSettings::default()
    }
}

fn main() {
    println!("Pulse Sentinel - Replay Demo");
    println!("============================");
    println!("{DISCLAIMER}");

    let models = MemoryModelStore::new();
    let events = MemoryEventSink::new();
    let stats = create_shared_stats();

    let mut monitor = Monitor::new(
        ScriptedLineSource::new(synthetic_trace()),
        models.clone(),
        events.clone(),
        manager_settings(),
    )
    .with_actuator(NoopActuator)
    .with_settings(demo_settings())
    .with_stats(stats.clone());

    println!("Startup: {:?}", monitor.initialize());
    println!();

    while let Ok(outcome) = monitor.step() {
        match outcome {
            StepOutcome::Processed(p) => {
                println!(
                    "  {:>3} bpm  label={:<5}  prediction={:<5} ({}){}",
                    p.sample.value,
                    p.sample.label,
                    p.prediction.abnormal,
                    p.prediction.source,
                    if p.retrained { "  [retrained]" } else { "" }
                );
            }
            StepOutcome::Rejected(e) => println!("  rejected: {e}"),
            StepOutcome::Ignored | StepOutcome::Idle => {}
        }
    }

    println!();
    println!("Buffer: {}", monitor.buffer().summary());
    println!("Events recorded: {}", events.len());
    println!("Model uploads: {}", models.upload_count());
    println!();
    println!("{}", stats.summary());

    // A second process sharing the store starts with the trained model.
    println!();
    println!("Restarting against the same store...");
    let mut restarted = Monitor::new(
        ScriptedLineSource::new(["BPM: 70", "BPM: 128"]),
        models,
        MemoryEventSink::new(),
        manager_settings(),
    )
    .with_actuator(NoopActuator)
    .with_settings(demo_settings());

    println!("Startup: {:?}", restarted.initialize());
    while let Ok(outcome) = restarted.step() {
        if let StepOutcome::Processed(p) = outcome {
            println!(
                "  {:>3} bpm  prediction={:<5} ({})",
                p.sample.value, p.prediction.abnormal, p.prediction.source
            );
        }
    }
}
