//! The four logical queues and their fixed profile (spec §4.6).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    High,
    Outbound,
    InboundWork,
    Low,
}

use serde::{Deserialize, Serialize};

impl QueueKind {
    pub const ALL: [QueueKind; 4] = [Self::High, Self::Outbound, Self::InboundWork, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Outbound => "outbound",
            Self::InboundWork => "inbound-work",
            Self::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "high" => Some(Self::High),
            "outbound" => Some(Self::Outbound),
            "inbound-work" => Some(Self::InboundWork),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn spec(self) -> QueueSpec {
        match self {
            Self::High => QueueSpec { concurrency: 5, max_retries: 3, job_timeout: Duration::from_secs(60) },
            Self::Outbound => QueueSpec { concurrency: 10, max_retries: 3, job_timeout: Duration::from_secs(120) },
            Self::InboundWork => QueueSpec { concurrency: 8, max_retries: 3, job_timeout: Duration::from_secs(90) },
            Self::Low => QueueSpec { concurrency: 3, max_retries: 2, job_timeout: Duration::from_secs(300) },
        }
    }
}

/// Per-queue concurrency and retry/timeout profile (spec §4.6 table).
/// Concurrency and timeouts may be overridden by configuration
/// (`htng-config`); `max_retries` is the ceiling fed into each job's
/// `SyncStatus.retry_cap`, so it stays fixed per queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueSpec {
    pub concurrency: u32,
    pub max_retries: u32,
    pub job_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_table_matches_section_4_6() {
        assert_eq!(QueueKind::High.spec().concurrency, 5);
        assert_eq!(QueueKind::Outbound.spec().concurrency, 10);
        assert_eq!(QueueKind::InboundWork.spec().concurrency, 8);
        assert_eq!(QueueKind::Low.spec().concurrency, 3);
        assert_eq!(QueueKind::Low.spec().job_timeout, Duration::from_secs(300));
    }

    #[test]
    fn wire_round_trips() {
        for q in QueueKind::ALL {
            assert_eq!(QueueKind::parse(q.as_str()), Some(q));
        }
    }
}
