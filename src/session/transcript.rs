use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
}

/// A finalized utterance. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    /// When the turn-complete signal landed.
    pub committed_at: DateTime<Utc>,
}

/// Collects transcript fragments per speaker and commits them as turns.
///
/// The two pending buffers are owned exclusively here; the controller only
/// calls the public operations.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    pending_user: String,
    pending_agent: String,
    turns: Vec<TranscriptTurn>,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a fragment onto the speaker's pending buffer.
    pub fn append_fragment(&mut self, speaker: Speaker, text: &str) {
        match speaker {
            Speaker::User => self.pending_user.push_str(text),
            Speaker::Agent => self.pending_agent.push_str(text),
        }
    }

    /// Finalize the pending buffers into turns.
    ///
    /// User speech is committed before agent speech from the same turn
    /// window; fragments are not interleaved by arrival time. Both buffers
    /// are cleared unconditionally, so a stray turn-complete with nothing
    /// pending is a harmless no-op. Returns the number of turns appended.
    pub fn commit_turn(&mut self) -> usize {
        let now = Utc::now();
        let mut committed = 0;

        let user = self.pending_user.trim();
        if !user.is_empty() {
            self.turns.push(TranscriptTurn {
                speaker: Speaker::User,
                text: user.to_string(),
                committed_at: now,
            });
            committed += 1;
        }

        let agent = self.pending_agent.trim();
        if !agent.is_empty() {
            self.turns.push(TranscriptTurn {
                speaker: Speaker::Agent,
                text: agent.to_string(),
                committed_at: now,
            });
            committed += 1;
        }

        self.pending_user.clear();
        self.pending_agent.clear();

        committed
    }

    /// Committed turns in completion order.
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// Discard pending fragments from an ended run.
    ///
    /// Committed turns survive as conversation history; only uncommitted
    /// buffers are cleared so a new run cannot inherit them.
    pub fn reset(&mut self) {
        self.pending_user.clear();
        self.pending_agent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_user_only() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_fragment(Speaker::User, "hello ");
        acc.append_fragment(Speaker::User, "there");

        assert_eq!(acc.commit_turn(), 1);
        assert_eq!(acc.turns().len(), 1);
        assert_eq!(acc.turns()[0].speaker, Speaker::User);
        assert_eq!(acc.turns()[0].text, "hello there");

        // Nothing pending anymore; a second commit appends nothing.
        assert_eq!(acc.commit_turn(), 0);
        assert_eq!(acc.turns().len(), 1);
    }

    #[test]
    fn test_commit_orders_user_before_agent() {
        let mut acc = TranscriptAccumulator::new();
        // Agent fragment arrives first; commit order is still user-first.
        acc.append_fragment(Speaker::Agent, "I can help with that.");
        acc.append_fragment(Speaker::User, "Can you help?");

        assert_eq!(acc.commit_turn(), 2);
        assert_eq!(acc.turns()[0].speaker, Speaker::User);
        assert_eq!(acc.turns()[1].speaker, Speaker::Agent);
    }

    #[test]
    fn test_whitespace_only_buffer_is_discarded() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_fragment(Speaker::User, "   \n");
        acc.append_fragment(Speaker::Agent, "ok");

        assert_eq!(acc.commit_turn(), 1);
        assert_eq!(acc.turns()[0].speaker, Speaker::Agent);
        assert_eq!(acc.turns()[0].text, "ok");
    }

    #[test]
    fn test_stray_commit_is_noop() {
        let mut acc = TranscriptAccumulator::new();
        assert_eq!(acc.commit_turn(), 0);
        assert!(acc.turns().is_empty());
    }

    #[test]
    fn test_reset_clears_pending_but_keeps_turns() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_fragment(Speaker::User, "first");
        acc.commit_turn();
        acc.append_fragment(Speaker::User, "half-spoken");

        acc.reset();

        assert_eq!(acc.turns().len(), 1);
        assert_eq!(acc.commit_turn(), 0);
    }
}
