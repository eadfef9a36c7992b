// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can occur when constructing the ambient context machinery.
///
/// The error surface is deliberately narrow. Steady-state operations (scope
/// management, baggage reads and writes) never fail; absent state is modeled
/// with `Option`. The only fallible surface is construction-time
/// configuration, which fails immediately rather than deferring a broken
/// store to first use.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
