//! Retry policy applied around message subscriptions.

pub use crate::topology::RETRY_DELAYS_MS;
use crate::topology::retry_queue_name;

/// What the consumer runtime does when a handler returns an error.
///
/// One policy enum is reused by every subscription; which queues retry and
/// which dead-letter immediately is a wiring decision, not separate listener
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Reject without requeue. The queue's dead-letter arguments route the
    /// message to its DLQ. Used by the inventory and payment queues.
    #[default]
    DeadLetter,

    /// Bounded delayed retry via the parking-lot ladder, then DLQ.
    /// Used by the email queues.
    Ladder(&'static [u64]),
}

impl RetryPolicy {
    /// The standard six-rung ladder.
    pub fn standard_ladder() -> Self {
        RetryPolicy::Ladder(RETRY_DELAYS_MS)
    }

    /// Returns the delay for the given (1-based) attempt, or `None` when the
    /// ladder is exhausted or the policy never retries.
    pub fn next_delay_ms(&self, attempt: u32) -> Option<u64> {
        match self {
            RetryPolicy::DeadLetter => None,
            RetryPolicy::Ladder(delays) => {
                if attempt == 0 {
                    return None;
                }
                delays.get(attempt as usize - 1).copied()
            }
        }
    }

    /// Returns the parking-lot queue the message should be re-published to
    /// for the given attempt, or `None` to dead-letter.
    pub fn retry_queue(&self, origin_queue: &str, attempt: u32) -> Option<String> {
        self.next_delay_ms(attempt)
            .map(|delay| retry_queue_name(origin_queue, delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_never_retries() {
        let policy = RetryPolicy::DeadLetter;
        assert_eq!(policy.next_delay_ms(1), None);
        assert_eq!(policy.retry_queue("q.x", 1), None);
    }

    #[test]
    fn test_ladder_walks_the_rungs() {
        let policy = RetryPolicy::standard_ladder();
        assert_eq!(policy.next_delay_ms(1), Some(60_000));
        assert_eq!(policy.next_delay_ms(2), Some(120_000));
        assert_eq!(policy.next_delay_ms(3), Some(300_000));
        assert_eq!(policy.next_delay_ms(4), Some(600_000));
        assert_eq!(policy.next_delay_ms(5), Some(1_800_000));
        assert_eq!(policy.next_delay_ms(6), Some(3_600_000));
    }

    #[test]
    fn test_ladder_exhaustion_dead_letters() {
        let policy = RetryPolicy::standard_ladder();
        assert_eq!(policy.next_delay_ms(7), None);
    }

    #[test]
    fn test_attempt_zero_is_not_a_retry() {
        let policy = RetryPolicy::standard_ladder();
        assert_eq!(policy.next_delay_ms(0), None);
    }

    #[test]
    fn test_retry_queue_name_derivation() {
        let policy = RetryPolicy::standard_ladder();
        assert_eq!(
            policy.retry_queue("email.order_paid.q", 1),
            Some("email.order_paid.q.retry.60000.q".to_string())
        );
    }
}
