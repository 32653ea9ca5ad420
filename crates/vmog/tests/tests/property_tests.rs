#[path = "property/fallback_ordering.rs"]
mod fallback_ordering;

#[path = "property/resolve_latest.rs"]
mod resolve_latest;
