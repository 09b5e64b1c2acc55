//! Shared names and dimensions for integration tests

#![allow(dead_code)]

pub const ALIAS: &str = "app-keeps";

/// Index the alias points to before the first rebuild of a test.
pub const PREVIOUS_INDEX: &str = "app-keeps_20240101000000";

/// Name the first rebuild gets with a clock fixed at 2024-01-02 00:00:00.
pub const REBUILT_INDEX: &str = "app-keeps_20240102000000";

pub const DIMENSIONS: usize = 3;

/// Text the fake embedder refuses to embed.
pub const FAILING_MARKER: &str = "unembeddable";
