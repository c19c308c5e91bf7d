use std::sync::Arc;

use tracing::{error, info, Level};

use cosi::config::CosiConfig;
use cosi::cosi::verify_signature_with_exceptions;
use cosi::error::DriverError;
use cosi::group::KeyPair;
use cosi::node::{Node, NodeEvent};
use cosi::payload::BatchSource;
use cosi::stats::RoundStats;
use cosi::transport::LocalNetwork;
use cosi::tree::{NodeId, Roster};

/// Run `n` nodes in one process, stamping a few items per node per round.
///
/// Usage: `cosi [nodes] [config.json]`
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DriverError> {
    let mut args = std::env::args().skip(1);
    let n = args
        .next()
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(7)
        .max(1);
    let config = match args.next() {
        Some(path) => CosiConfig::load(path)?,
        None => CosiConfig {
            round_interval_ms: 500,
            heartbeat_timeout_ms: 2_000,
            round_kind: "stamp".into(),
            max_rounds: Some(5),
            ..Default::default()
        },
    };
    config.validate()?;

    let keys: Vec<KeyPair> = {
        let mut rng = rand::thread_rng();
        (0..n).map(|_| KeyPair::generate(&mut rng)).collect()
    };
    let roster = Roster::from_keys(keys.iter().map(KeyPair::public));
    let network = LocalNetwork::new();
    let stats = RoundStats::new();

    let mut handles = vec![];
    let mut sources = vec![];
    for (i, key) in keys.into_iter().enumerate() {
        let id = NodeId(i as u32);
        let source = BatchSource::new();
        sources.push(source.clone());
        let node = Node::new(id, key, roster.clone(), config.clone(), Arc::new(network.clone()))?
            .with_payload(source)
            .with_stats(stats.clone());
        handles.push(node.run(network.register(id))?);
    }

    let mut root = handles.remove(0);
    let mut submitted = 0u64;
    while let Some(event) = root.next_event().await {
        match event {
            NodeEvent::RoundStarted { round, .. } => {
                for (i, source) in sources.iter().enumerate() {
                    source.submit(format!("node {} round {}", i, round).as_bytes());
                    submitted += 1;
                }
            }
            NodeEvent::RoundCompleted {
                round, broadcast, ..
            } => {
                let verified = verify_signature_with_exceptions(
                    &broadcast.aggregate_public,
                    &broadcast.message,
                    &broadcast.signature,
                    &broadcast.exceptions,
                )
                .is_ok();
                info!(
                    round,
                    verified,
                    messages = broadcast.messages,
                    exceptions = broadcast.exceptions.len(),
                    "published"
                );
            }
            NodeEvent::Closed => break,
            _ => {}
        }
    }

    root.join().await?;
    for handle in handles {
        handle.join().await?;
    }
    stats.close();

    let receipts: Vec<_> = sources
        .iter()
        .flat_map(BatchSource::take_receipts)
        .collect();
    let valid = receipts.iter().filter(|receipt| receipt.verify()).count();
    info!(
        submitted,
        receipts = receipts.len(),
        valid,
        stats = ?stats.snapshot(),
        "done"
    );
    Ok(())
}
