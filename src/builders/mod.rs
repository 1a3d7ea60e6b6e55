//! Builders to construct dispatch components from configuration.

pub mod pool_builder;

pub use pool_builder::{build_fan_out, build_pool, PoolBuilder};
