//! Identity, id and clock sources for recorded changes.

use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum IdSource {
    Random,
    Sequential { prefix: String, next: u64 },
}

#[derive(Debug, Clone)]
enum Clock {
    System,
    Manual(i64),
}

/// Who is editing, plus where fresh ids and timestamps come from.
///
/// Production code uses random v4 UUIDs and the system clock; tests use
/// [`TrackContext::deterministic`] to get predictable ids and times.
#[derive(Debug, Clone)]
pub struct TrackContext {
    pub author_id: String,
    ids: IdSource,
    clock: Clock,
}

impl TrackContext {
    pub fn new(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            ids: IdSource::Random,
            clock: Clock::System,
        }
    }

    /// Sequential ids (`<prefix>-1`, `<prefix>-2`, ...) and a manual clock
    /// starting at `start_ms`.
    pub fn deterministic(author_id: impl Into<String>, prefix: &str, start_ms: i64) -> Self {
        Self {
            author_id: author_id.into(),
            ids: IdSource::Sequential {
                prefix: prefix.to_string(),
                next: 1,
            },
            clock: Clock::Manual(start_ms),
        }
    }

    pub fn set_author(&mut self, author_id: impl Into<String>) {
        self.author_id = author_id.into();
    }

    pub fn new_id(&mut self) -> String {
        match &mut self.ids {
            IdSource::Random => Uuid::new_v4().to_string(),
            IdSource::Sequential { prefix, next } => {
                let id = format!("{}-{}", prefix, next);
                *next += 1;
                id
            }
        }
    }

    /// Milliseconds since the epoch.
    pub fn now(&self) -> i64 {
        match self.clock {
            Clock::System => Utc::now().timestamp_millis(),
            Clock::Manual(ms) => ms,
        }
    }

    /// Move a manual clock forward. No effect on the system clock.
    pub fn advance(&mut self, ms: i64) {
        if let Clock::Manual(now) = &mut self.clock {
            *now += ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let mut ctx = TrackContext::deterministic("alice", "c", 1000);
        assert_eq!(ctx.new_id(), "c-1");
        assert_eq!(ctx.new_id(), "c-2");
        assert_eq!(ctx.now(), 1000);
        ctx.advance(5);
        assert_eq!(ctx.now(), 1005);
    }

    #[test]
    fn test_random_ids_are_uuids() {
        let mut ctx = TrackContext::new("alice");
        let id = ctx.new_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, ctx.new_id());
    }
}
