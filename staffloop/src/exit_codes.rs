//! Stable exit codes for `staffloop` commands.

/// The reviewer passed a diff, or a non-run command succeeded.
pub const OK: u8 = 0;
/// The run aborted: invalid config or request, planning failure, or git/artifact errors.
pub const INVALID: u8 = 1;
/// Every iteration ended NONPASS.
pub const NONPASS: u8 = 2;
