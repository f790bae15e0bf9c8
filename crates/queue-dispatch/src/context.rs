//! Execution context facts supplied by the surrounding function runtime.
//!
//! The dispatch layer never reads process-wide state from inside its core.
//! Region, account and offline facts are collected once here, per invocation,
//! and handed to [`DispatchService::new`](crate::DispatchService::new).

use serde::{Deserialize, Serialize};

/// Environment variable holding the deployment region
pub const REGION_ENV: &str = "AWS_REGION";
/// Fallback environment variable for the deployment region
pub const DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";
/// Environment variable overriding the account identifier
pub const ACCOUNT_ID_ENV: &str = "AWS_ACCOUNT_ID";
/// Environment variable forcing offline execution
pub const OFFLINE_ENV: &str = "IS_OFFLINE";

/// Facts about the current function invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    invocation_id: Option<String>,
    invoked_function_arn: Option<String>,
    region: Option<String>,
    account_id_override: Option<String>,
    offline_override: bool,
}

impl ExecutionContext {
    /// Create an empty context (which is offline, since it has no invocation id)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from the invocation facts plus the function environment
    ///
    /// Reads `AWS_REGION` (falling back to `AWS_DEFAULT_REGION`),
    /// `AWS_ACCOUNT_ID` and `IS_OFFLINE`.
    pub fn from_env(invocation_id: Option<String>, invoked_function_arn: Option<String>) -> Self {
        let region = non_empty_var(REGION_ENV).or_else(|| non_empty_var(DEFAULT_REGION_ENV));
        let account_id_override = non_empty_var(ACCOUNT_ID_ENV);
        let offline_override = non_empty_var(OFFLINE_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        Self {
            invocation_id,
            invoked_function_arn,
            region,
            account_id_override,
            offline_override,
        }
    }

    /// Set the invocation identifier
    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }

    /// Set the ARN of the function being invoked
    pub fn with_invoked_function_arn(mut self, arn: impl Into<String>) -> Self {
        self.invoked_function_arn = Some(arn.into());
        self
    }

    /// Set the deployment region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the account identifier used when none can be derived from the ARN
    pub fn with_account_id_override(mut self, account_id: impl Into<String>) -> Self {
        self.account_id_override = Some(account_id.into());
        self
    }

    /// Force offline execution regardless of the invocation identifier
    pub fn with_offline_override(mut self, offline: bool) -> Self {
        self.offline_override = offline;
        self
    }

    /// Get the invocation identifier
    pub fn invocation_id(&self) -> Option<&str> {
        self.invocation_id.as_deref()
    }

    /// Get the deployment region
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Check whether this execution is offline from the platform's perspective
    ///
    /// True when there is no invocation identifier, when the identifier
    /// contains `offline`, or when the offline override is set.
    pub fn is_offline(&self) -> bool {
        if self.offline_override {
            return true;
        }

        match self.invocation_id.as_deref() {
            None => true,
            Some(id) => id.contains("offline"),
        }
    }

    /// Resolve the account identifier
    ///
    /// Derived from the invoked function ARN
    /// (`arn:aws:lambda:<region>:<account>:function:<name>`) when available,
    /// otherwise the explicit override.
    pub fn account_id(&self) -> Option<&str> {
        self.invoked_function_arn
            .as_deref()
            .and_then(account_from_arn)
            .or(self.account_id_override.as_deref())
    }
}

fn account_from_arn(arn: &str) -> Option<&str> {
    let mut parts = arn.split(':');
    if parts.next() != Some("arn") {
        return None;
    }

    parts.nth(3).filter(|account| !account.is_empty())
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
