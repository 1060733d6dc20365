//! Counters for state lifecycle and provider failures
//!
//! - `sso_states_issued_total` (counter)
//! - `sso_state_validations_total` (counter): label `result` = `valid` | `invalid`
//! - `sso_states_purged_total` (counter): label `reason` = `lazy` | `sweep` | `capacity`
//! - `sso_provider_errors_total` (counter): label `operation`
//!
//! All calls are no-ops until the host process installs a recorder.

/// Record a newly issued CSRF state.
pub fn record_state_issued() {
    metrics::counter!("sso_states_issued_total").increment(1);
}

/// Record the outcome of a state validation.
pub fn record_validation(valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    metrics::counter!("sso_state_validations_total", "result" => result).increment(1);
}

/// Record entries removed from the state store.
pub fn record_purged(reason: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!("sso_states_purged_total", "reason" => reason).increment(count as u64);
}

/// Record a failed call to the SSO provider.
pub fn record_provider_error(operation: &'static str) {
    metrics::counter!("sso_provider_errors_total", "operation" => operation).increment(1);
}
