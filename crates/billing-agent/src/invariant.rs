// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Broken contracts between components.
//!
//! Recoverable failures are `Result`s. What lands here cannot happen under correct operation,
//! and carrying on would corrupt billing totals, so the process is brought down instead.

use tracing::error;

/// Logs the violated invariant and panics.
///
/// The collector runs on the main task, so the panic takes the whole process with it.
#[allow(clippy::panic)]
#[track_caller]
pub fn fatal(what: &str) -> ! {
    error!("Invariant violated: {what}");
    panic!("invariant violated: {what}")
}
