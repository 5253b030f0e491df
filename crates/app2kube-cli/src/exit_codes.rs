//! Process exit codes

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - missing or invalid values
pub const CONFIG_ERROR: i32 = 2;

/// Template error - values template rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// IO error - file not found, URL unreachable, permission denied
pub const IO_ERROR: i32 = 4;

/// Cluster error - the Kubernetes API rejected or failed a request
pub const CLUSTER_ERROR: i32 = 5;

/// Timeout - a rollout did not become ready in time
pub const TIMEOUT_ERROR: i32 = 6;
