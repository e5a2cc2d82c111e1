//! Broadcast send loop.
//!
//! The engine never talks to users. It returns a [`BroadcastReport`] so the
//! caller (and tests) can see what happened; the command layer only logs it.

use tracing::{debug, info, warn};

use super::pacing::Pacer;
use super::pool::{Quantity, build_pool, render};
use crate::telegram::{MessageSender, SendError};

/// What a broadcast run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Messages in the pool.
    pub planned: usize,
    /// Send attempts made.
    pub attempted: usize,
    /// Messages delivered.
    pub delivered: usize,
    /// Messages dropped because of a flood wait.
    pub flood_skipped: usize,
    /// Messages dropped because of any other error.
    pub failed: usize,
    /// The loop stopped early because write access was revoked.
    pub aborted: bool,
}

/// Renders and delivers a pool of templates with pacing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcaster {
    pacer: Pacer,
}

impl Broadcaster {
    #[must_use]
    pub const fn new(pacer: Pacer) -> Self {
        Self { pacer }
    }

    /// Builds a pool of `quantity` templates and delivers it to `chat_id`.
    ///
    /// Callers must have checked authorization and the bot's admin status.
    pub async fn run(
        &self,
        sender: &dyn MessageSender,
        chat_id: i64,
        mention: &str,
        templates: &[String],
        quantity: Quantity,
    ) -> BroadcastReport {
        let pool = build_pool(templates, quantity, rand::thread_rng());
        self.deliver(sender, chat_id, mention, &pool).await
    }

    /// Delivers an already built pool, one message at a time.
    ///
    /// - flood wait: sleep the demanded time, drop that entry, go on
    /// - write forbidden: stop
    /// - anything else: drop that entry, go on
    pub async fn deliver(
        &self,
        sender: &dyn MessageSender,
        chat_id: i64,
        mention: &str,
        pool: &[String],
    ) -> BroadcastReport {
        let mut report = BroadcastReport {
            planned: pool.len(),
            ..BroadcastReport::default()
        };

        for (position, template) in pool.iter().enumerate() {
            let text = render(template, mention);
            report.attempted += 1;

            match sender.send(chat_id, &text).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.pacer.pause().await;
                }
                Err(SendError::FloodWait(wait)) => {
                    report.flood_skipped += 1;
                    self.pacer.flood_wait(wait).await;
                }
                Err(SendError::WriteForbidden) => {
                    warn!(
                        "Lost write access to chat {}, stopping broadcast at message {}/{}",
                        chat_id,
                        position + 1,
                        pool.len()
                    );
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    debug!("Broadcast message {} to {} failed: {}", position + 1, chat_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Broadcast to {} finished: {}/{} delivered, {} flood-skipped, {} failed{}",
            chat_id,
            report.delivered,
            report.planned,
            report.flood_skipped,
            report.failed,
            if report.aborted { ", aborted" } else { "" }
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Fails the n-th (1-based) attempt with the scripted error.
    #[derive(Default)]
    struct ScriptedSender {
        failures: HashMap<usize, SendError>,
        attempts: Mutex<Vec<(i64, String)>>,
    }

    impl ScriptedSender {
        fn failing_at(attempt: usize, error: SendError) -> Self {
            Self {
                failures: HashMap::from([(attempt, error)]),
                ..Self::default()
            }
        }

        fn attempts(&self) -> Vec<(i64, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for ScriptedSender {
        async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                attempts.push((chat_id, text.to_owned()));
                attempts.len()
            };
            match self.failures.get(&attempt) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }

    fn pool(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("m{i} {{mention}}")).collect()
    }

    #[tokio::test]
    async fn test_delivers_rendered_pool() {
        let sender = ScriptedSender::default();
        let report = Broadcaster::new(Pacer::disabled())
            .deliver(&sender, -5, "@bob", &pool(3))
            .await;

        assert_eq!(report.delivered, 3);
        assert_eq!(
            sender.attempts(),
            vec![
                (-5, "m1 @bob".to_owned()),
                (-5, "m2 @bob".to_owned()),
                (-5, "m3 @bob".to_owned()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_wait_skips_the_entry() {
        let sender =
            ScriptedSender::failing_at(3, SendError::FloodWait(Duration::from_secs(2)));
        let start = tokio::time::Instant::now();

        let report = Broadcaster::new(Pacer::disabled())
            .deliver(&sender, 1, "x", &pool(5))
            .await;

        assert!(start.elapsed() >= Duration::from_secs(2));
        let texts: Vec<_> = sender.attempts().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["m1 x", "m2 x", "m3 x", "m4 x", "m5 x"]);
        assert_eq!(
            report,
            BroadcastReport {
                planned: 5,
                attempted: 5,
                delivered: 4,
                flood_skipped: 1,
                failed: 0,
                aborted: false,
            }
        );
    }

    #[tokio::test]
    async fn test_write_forbidden_aborts() {
        let sender = ScriptedSender::failing_at(2, SendError::WriteForbidden);

        let report = Broadcaster::new(Pacer::disabled())
            .deliver(&sender, 1, "x", &pool(5))
            .await;

        assert_eq!(sender.attempts().len(), 2);
        assert!(report.aborted);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_other_errors_are_ignored() {
        let sender = ScriptedSender::failing_at(1, SendError::Other("boom".to_owned()));

        let report = Broadcaster::new(Pacer::disabled())
            .deliver(&sender, 1, "x", &pool(4))
            .await;

        assert_eq!(sender.attempts().len(), 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 3);
        assert!(!report.aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_after_each_delivery() {
        let sender = ScriptedSender::default();
        let pacer = Pacer::new(Duration::from_millis(300), Duration::from_millis(1500));
        let start = tokio::time::Instant::now();

        Broadcaster::new(pacer).deliver(&sender, 1, "x", &pool(4)).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(4 * 300));
        assert!(elapsed <= Duration::from_millis(4 * 1500 + 50));
    }

    #[tokio::test]
    async fn test_run_builds_pool_of_quantity() {
        let sender = ScriptedSender::default();
        let templates = vec!["a {mention}".to_owned(), "b {mention}".to_owned()];

        let report = Broadcaster::new(Pacer::disabled())
            .run(&sender, 9, "t", &templates, Quantity::new(5).unwrap())
            .await;

        assert_eq!(report.planned, 5);
        assert_eq!(report.delivered, 5);
        assert!(sender.attempts().iter().all(|(chat, _)| *chat == 9));
    }
}
