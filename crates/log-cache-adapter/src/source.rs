// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Eligibility of discovered log-cache source ids.
//!
//! Log-cache reports platform components alongside tenant resources. Only ids that parse as a
//! UUID belong to tenant resources and are aggregated.

use uuid::Uuid;

/// Returns true if `source_id` names a tenant resource.
///
/// Accepts every form of the standard UUID grammar: hyphenated, simple, braced and URN.
///
/// # Examples
///
/// ```
/// use log_cache_adapter::source::is_eligible;
///
/// assert!(is_eligible("aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa"));
/// assert!(!is_eligible("doppler"));
/// assert!(!is_eligible(""));
/// ```
pub fn is_eligible(source_id: &str) -> bool {
    Uuid::parse_str(source_id).is_ok()
}
