//! Structured logging schema and field name constants for mesa.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, best-effort side effect dropped |
//! | INFO  | Lifecycle events (startup, shutdown), state transitions |
//! | DEBUG | Decision points: candidate exclusions, negotiation misses |
//! | TRACE | Per-candidate iteration, slot-set contents |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP layer. Format: UUIDv7.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "engine", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "rank_and_propose", "accept", "decline", "adjust"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// User id the operation acts on behalf of.
pub const USER_ID: &str = "user_id";

/// Proposal UUID being operated on.
pub const PROPOSAL_ID: &str = "proposal_id";

/// Canonical pair key of a compatibility-score record.
pub const PAIR_KEY: &str = "pair_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of candidates considered or proposals returned.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Score delta applied by a ledger adjustment.
pub const SCORE_DELTA: &str = "score_delta";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Proposal status after a transition.
pub const STATUS: &str = "status";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
