#[path = "helpers/mod.rs"]
mod helpers;

#[path = "namespace/mod.rs"]
mod namespace;
