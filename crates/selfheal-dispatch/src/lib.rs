// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod dispatcher;
mod external;

pub use dispatcher::{BuildError, DispatchAcceptance, Dispatcher, IntakeError, RunResult};
pub use external::{ExternalAgentStrategy, ExternalError, ScrapedOutput};
