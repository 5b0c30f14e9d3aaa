use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{json, Value};
use the_banyan::engine::Graph;
use the_banyan::traits::op;
use the_banyan::tree::NodeSpec;

/// Demo walking through the propagation model: forward fan-out, backward
/// reporting, repeat/recursive scheduling, shared subtrees, and delay pacing.
async fn run_propagation_demo() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Banyan Propagation Demo ===\n");

    let graph = Graph::new();

    // Step 1: Forward propagation: source -> (left, right)
    println!("--- Forward propagation ---");
    graph.add_node(
        NodeSpec::new()
            .tag("source")
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) + 1))
            }))
            .child(NodeSpec::new().tag("left").operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) * 2))
            })))
            .child(NodeSpec::new().tag("right").operator(op(|input, _, _| {
                let n = input.as_i64().unwrap_or(0);
                Ok(json!(n * n))
            }))),
    )?;

    let result = graph.run("source", json!(3)).await?;
    println!("run(source, 3) returned {}", result);
    println!("left saw the source output: {:?}", graph.latest("left"));
    println!("right saw the source output: {:?}", graph.latest("right"));

    // Step 2: Backward propagation: a child reporting up to its parent
    println!("\n--- Backward propagation ---");
    graph.add_node(
        NodeSpec::new()
            .tag("monitor")
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) * 10))
            }))
            .child(
                NodeSpec::new()
                    .tag("probe")
                    .backward(true)
                    .operator(op(|input, _, _| {
                        Ok(json!(input.as_i64().unwrap_or(0) + 1))
                    })),
            ),
    )?;

    let result = graph.run("probe", json!(5)).await?;
    println!("run(probe, 5) returned {}", result);
    println!("monitor received the probe's output: {:?}", graph.latest("monitor"));

    // Step 3: Scheduling: repeat re-feeds the original input, recursive folds
    println!("\n--- Repeat vs recursive ---");
    let repeat_outputs: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&repeat_outputs);
    graph.subscribe("thrice", move |value| {
        sink.lock().unwrap().push(value.clone());
    });
    graph.add_node(
        NodeSpec::new()
            .tag("thrice")
            .repeat(3)
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) + 1))
            })),
    )?;
    graph.run("thrice", json!(5)).await?;
    println!(
        "repeat(3) increment on 5 published {:?} (original input every tick)",
        repeat_outputs.lock().unwrap().clone()
    );

    graph.add_node(
        NodeSpec::new()
            .tag("fold")
            .recursive(4)
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) + 1))
            })),
    )?;
    let result = graph.run("fold", json!(0)).await?;
    println!("recursive(4) increment folded 0 into {}", result);

    // Step 4: Shared subtree: two parents referencing one registered node
    println!("\n--- Shared subtree ---");
    let shared_runs = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&shared_runs);
    graph.add_node(
        NodeSpec::new()
            .tag("shared")
            .operator(op(move |input, _, _| {
                *counter.lock().unwrap() += 1;
                Ok(json!(input.as_i64().unwrap_or(0) + 100))
            })),
    )?;
    graph.add_node(
        NodeSpec::new()
            .tag("fan_a")
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) * 2))
            }))
            .child_ref("shared"),
    )?;
    graph.add_node(
        NodeSpec::new()
            .tag("fan_b")
            .operator(op(|input, _, _| {
                let n = input.as_i64().unwrap_or(0);
                Ok(json!(n * n))
            }))
            .child_ref("shared"),
    )?;

    graph.run("fan_a", json!(2)).await?;
    println!("after run(fan_a, 2): shared = {:?}", graph.latest("shared"));
    graph.run("fan_b", json!(3)).await?;
    println!("after run(fan_b, 3): shared = {:?}", graph.latest("shared"));
    println!("shared node executed {} times", shared_runs.lock().unwrap());

    // Step 5: Delay pacing: every tick waits, the first included
    println!("\n--- Delay pacing ---");
    let paced = graph.add_node(
        NodeSpec::new()
            .tag("paced")
            .repeat(3)
            .delay_ms(40)
            .operator(op(|input, _, _| {
                Ok(json!(input.as_i64().unwrap_or(0) + 1))
            })),
    )?;
    let started = Instant::now();
    graph.run(&paced, json!(0)).await?;
    println!("3 ticks at 40ms delay took {:?}", started.elapsed());

    // Everything that ran left its latest output behind
    println!("\n--- Store snapshot ---");
    let mut entries: Vec<_> = graph.store().snapshot().into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (tag, value) in entries {
        println!("- {}: {}", tag, value);
    }

    println!("\n=== Demo Summary ===");
    println!("✓ Forward propagation fanned one output into two children");
    println!("✓ Backward propagation reported a child result to its parent");
    println!("✓ repeat re-ran on the original input, recursive folded outputs");
    println!("✓ Two parents drove one shared registered node");
    println!("✓ Delay pacing throttled every tick");

    println!("\nDemo completed successfully!");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    run_propagation_demo().await
}
