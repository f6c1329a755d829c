//! Per-call settings.
//!
//! All settings are plain values with defaults, builder-style setters and serde
//! support so they can be loaded from application config.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Settings
// ============================================================================

/// Settings common to every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Client-side deadline for the whole call (unary) or for each stream part.
    pub transport_timeout: Option<Duration>,
    /// Server-side operation deadline, forwarded in the request.
    pub operation_timeout: Option<Duration>,
    /// Caller-provided trace id forwarded to the server.
    pub trace_id: Option<String>,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            transport_timeout: Some(Duration::from_secs(60)),
            operation_timeout: None,
            trace_id: None,
        }
    }
}

impl RequestSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = Some(timeout);
        self
    }

    /// Disable the client-side deadline.
    pub fn no_transport_timeout(mut self) -> Self {
        self.transport_timeout = None;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

// ============================================================================
// Execute Query Settings
// ============================================================================

/// How the server should process query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExecMode {
    Unspecified,
    Parse,
    Validate,
    Explain,
    #[default]
    Execute,
}

impl ExecMode {
    pub fn code(self) -> u32 {
        match self {
            ExecMode::Unspecified => 0,
            ExecMode::Parse => 10,
            ExecMode::Validate => 20,
            ExecMode::Explain => 30,
            ExecMode::Execute => 50,
        }
    }
}

/// Query language syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Syntax {
    /// Let the server pick its default syntax
    #[default]
    Unspecified,
    YqlV1,
    Pg,
}

impl Syntax {
    pub fn code(self) -> u32 {
        match self {
            Syntax::Unspecified => 0,
            Syntax::YqlV1 => 1,
            Syntax::Pg => 2,
        }
    }
}

/// Level of execution statistics collected by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StatsMode {
    #[default]
    Unspecified,
    None,
    Basic,
    Full,
    Profile,
}

impl StatsMode {
    pub fn code(self) -> u32 {
        match self {
            StatsMode::Unspecified => 0,
            StatsMode::None => 10,
            StatsMode::Basic => 20,
            StatsMode::Full => 30,
            StatsMode::Profile => 40,
        }
    }
}

/// Settings for a single `ExecuteQuery` call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteQuerySettings {
    pub request: RequestSettings,
    pub exec_mode: ExecMode,
    pub syntax: Syntax,
    pub stats_mode: StatsMode,
}

impl ExecuteQuerySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, request: RequestSettings) -> Self {
        self.request = request;
        self
    }

    pub fn exec_mode(mut self, mode: ExecMode) -> Self {
        self.exec_mode = mode;
        self
    }

    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn stats_mode(mut self, mode: StatsMode) -> Self {
        self.stats_mode = mode;
        self
    }
}

// ============================================================================
// Retry Settings
// ============================================================================

/// Retry policy for transport-level failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Add up to 100% random jitter on top of each backoff.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based): exponential, capped at
    /// `max_backoff`, plus jitter when enabled.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);

        if !self.jitter || base.is_zero() {
            return base;
        }

        let extra = rand::thread_rng().gen_range(0..=base.as_micros() as u64);
        (base + Duration::from_micros(extra)).min(self.max_backoff)
    }
}
