// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod build;
mod config;
mod run;

pub use build::BuildError;
pub use config::ConfigError;
pub use run::RunError;
