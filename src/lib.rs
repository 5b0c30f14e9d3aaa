// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // config + registry
pub mod engine;     // graph assembly + run loop
pub mod errors;     // error handling
pub mod observability;
pub mod store;      // tag-indexed outputs + subscriptions
pub mod traits;     // unified abstractions
pub mod tree;       // nodes and their build specs
