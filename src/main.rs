// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Instant;

use serde_json::{json, Value};
use the_banyan::config::{build_graph, load_config, OperatorRegistry};
use the_banyan::traits::op;

/// Build the registry of operators the demo configs may name.
///
/// A real application registers its own domain operators here; this set is
/// just enough to make the shipped configs do visible work.
fn demo_registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::new();
    registry
        .register(
            "increment",
            op(|input, _, _| Ok(json!(input.as_i64().unwrap_or(0) + 1))),
        )
        .register(
            "double",
            op(|input, _, _| Ok(json!(input.as_i64().unwrap_or(0) * 2))),
        )
        .register(
            "square",
            op(|input, _, _| {
                let n = input.as_i64().unwrap_or(0);
                Ok(json!(n * n))
            }),
        )
        .register(
            "scale",
            // Reads its multiplier from the node's extension properties, so a
            // config can write `factor: 10` next to `operator: scale`.
            op(|input, node, _| {
                let factor = node
                    .prop("factor")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(2);
                Ok(json!(input.as_i64().unwrap_or(0) * factor))
            }),
        )
        .register(
            "uppercase",
            op(|input, _, _| {
                let text = match input.as_str() {
                    Some(s) => s.to_uppercase(),
                    None => input.to_string().to_uppercase(),
                };
                Ok(json!(text))
            }),
        )
        .register(
            "reverse",
            op(|input, _, _| {
                let text = match input.as_str() {
                    Some(s) => s.chars().rev().collect::<String>(),
                    None => input.to_string().chars().rev().collect::<String>(),
                };
                Ok(json!(text))
            }),
        );
    registry
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} <config.yaml> <target-tag> [input-json]", args[0]);
        eprintln!("Example: {} configs/pipeline.yaml source 3", args[0]);
        eprintln!(
            "Example: {} configs/branching.yaml shout '\"hello world\"'",
            args[0]
        );
        std::process::exit(1);
    }

    let config_file = &args[1];
    let target_tag = &args[2];
    let input: Value = match args.get(3) {
        // Bare words that are not valid JSON run as strings.
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| json!(raw.as_str())),
        None => json!(1),
    };

    println!("🌳 Banyan Execution Demo");
    println!("═════════════════════════");
    println!("Config: {}", config_file);
    println!("Target: {}", target_tag);
    println!("Input:  {}", input);
    println!();

    match run_single_config(config_file, target_tag, input).await {
        Ok(_) => {
            println!("\n🎉 Run complete!");
        }
        Err(e) => {
            eprintln!("❌ Failed to execute {}: {}", config_file, e);
            std::process::exit(1);
        }
    }
}

async fn run_single_config(
    config_file: &str,
    target_tag: &str,
    input: Value,
) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    // Load configuration and assemble the tree
    let config = load_config(config_file)?;
    let registry = demo_registry();
    let graph = build_graph(&config, &registry)?;

    let options = graph.options();
    let mut tags = graph.tags();
    tags.sort();

    println!("📋 Configuration: {}", config_file);
    println!("🔢 Nodes: {} registered tags", graph.node_count());
    println!(
        "🔧 Options: strict_tags={}, max_depth={}",
        options.strict_tags, options.max_depth
    );
    println!("🏷️  Tags: {}", tags.join(", "));

    // Execute the target node and everything its flags propagate to
    let execution_start = Instant::now();
    let result = graph.run(target_tag, input.clone()).await?;
    let execution_time = execution_start.elapsed();

    println!("\n📊 Execution Results:");
    println!("⏱️  Execution Time: {:?}", execution_time);
    println!("\n🎯 Final Transformation:");
    println!("   Input:  {}", input);
    println!("   Output: {}", result);

    // Every tagged node that ran left its latest output in the store
    let snapshot = graph.store().snapshot();
    if snapshot.is_empty() {
        println!("\n📝 Store: no published outputs");
    } else {
        let mut entries: Vec<_> = snapshot.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        println!("\n📝 Store ({} tags):", entries.len());
        for (tag, value) in entries {
            println!("   • {} → {}", tag, value);
        }
    }

    let total_time = start_time.elapsed();
    println!("\n⏱️  Total Time (including config load): {:?}", total_time);

    Ok(())
}
