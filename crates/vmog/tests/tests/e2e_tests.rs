#[path = "e2e/publish_and_lookup.rs"]
mod publish_and_lookup;

#[path = "e2e/dependency_graph.rs"]
mod dependency_graph;

#[path = "e2e/federation.rs"]
mod federation;

#[path = "e2e/fallback.rs"]
mod fallback;

#[path = "e2e/hot_swap.rs"]
mod hot_swap;
