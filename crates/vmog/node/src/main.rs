use anyhow::Context;
use std::path::PathBuf;
use tracing::info;
use vmog_node::{scenario, Node, NodeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("VMOG_CONFIG"))
        .map(PathBuf::from);
    let config = NodeConfig::load(path.as_deref())?;
    vmog_node::init_tracing(&config.log_filter);

    let node = Node::new(config);
    let outcome = scenario::run(&node).await?;
    info!(
        active = ?outcome.active.map(|v| v.to_string()),
        committed = outcome.swap.is_ok(),
        "scenario finished"
    );

    let json = outcome.snapshot.to_json()?;
    match &node.config.snapshot_path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "snapshot written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
