//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for Loginward.
//!
//! Default option values mirror the settings a fresh installation starts
//! with. Ledger names are the suffixes appended to the configured key prefix.

// ============================================================================
// Lockout Defaults
// ============================================================================

/// Default number of failed attempts before a lockout tier fires.
pub const DEFAULT_ALLOWED_RETRIES: u32 = 4;

/// Default normal lockout duration (20 minutes).
pub const DEFAULT_LOCKOUT_DURATION_SECS: u64 = 1200;

/// Default number of normal lockouts before a long lockout.
pub const DEFAULT_ALLOWED_LOCKOUTS: u32 = 4;

/// Default long lockout duration (24 hours).
pub const DEFAULT_LONG_DURATION_SECS: u64 = 86400;

/// Default validity window of a retry counter (24 hours).
///
/// A failure recorded after the window has passed restarts the count at 1.
pub const DEFAULT_VALID_DURATION_SECS: u64 = 86400;

/// Default email notification interval, counted in lockouts.
pub const DEFAULT_NOTIFY_EMAIL_AFTER: u32 = 4;

// ============================================================================
// Registration Defaults
// ============================================================================

/// Default number of registrations allowed per address and window.
pub const DEFAULT_REGISTER_ALLOWED: u32 = 3;

/// Default registration window (24 hours).
pub const DEFAULT_REGISTER_DURATION_SECS: u64 = 86400;

// ============================================================================
// Storage
// ============================================================================

/// Default prefix for every ledger key.
pub const DEFAULT_KEY_PREFIX: &str = "loginward:";

/// Default site name used in notification subjects.
pub const DEFAULT_SITE_NAME: &str = "loginward";

/// Maximum optimistic update attempts for single-ledger read-modify-write.
///
/// After this many lost compare-and-swap races the update falls back to an
/// unconditional write.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

// ============================================================================
// Client Address
// ============================================================================

/// Header carrying the client address when running behind a reverse proxy.
pub const PROXY_ADDRESS_HEADER: &str = "x-forwarded-for";

// ============================================================================
// Time
// ============================================================================

/// Seconds per minute.
pub const SECS_PER_MINUTE: i64 = 60;

/// Minutes per hour.
pub const MINUTES_PER_HOUR: i64 = 60;

/// Upper bound for any configured duration (100 years).
pub const MAX_DURATION_SECS: u64 = 3_153_600_000;
