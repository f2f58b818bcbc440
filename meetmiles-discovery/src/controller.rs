use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinSet;

use meetmiles_shared::observability::SWIPES_TOTAL;
use meetmiles_shared::types::event::{payloads, DomainEvent, EventBus};

use crate::deck::{Release, SwipeDeck, SwipeDecision, SwipeDirection};

const SOURCE: &str = "meetmiles-discovery";

/// Receives committed likes. Runs detached from the deck, so it must not
/// report failures back through the swipe path.
pub trait LikeHandler: Send + Sync + 'static {
    type Output: Send + 'static;

    fn handle_like(
        &self,
        self_id: String,
        candidate_id: String,
    ) -> impl Future<Output = Self::Output> + Send + '_;
}

/// Drives a [`SwipeDeck`] with real timers and hands likes off to a [`LikeHandler`].
pub struct SwipeController<H: LikeHandler> {
    deck: SwipeDeck,
    self_id: String,
    handler: Arc<H>,
    bus: EventBus,
    in_flight: JoinSet<H::Output>,
}

impl<H: LikeHandler> SwipeController<H> {
    pub fn new(deck: SwipeDeck, self_id: impl Into<String>, handler: Arc<H>, bus: EventBus) -> Self {
        Self {
            deck,
            self_id: self_id.into(),
            handler,
            bus,
            in_flight: JoinSet::new(),
        }
    }

    pub fn deck(&self) -> &SwipeDeck {
        &self.deck
    }

    pub fn drag(&mut self, dx: f64, dy: f64) -> bool {
        self.deck.drag(dx, dy)
    }

    pub fn tap_photo(&mut self) -> usize {
        self.deck.tap_photo()
    }

    /// Likes handed off and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Finish a gesture. Resolves once the card is off screen and the deck advanced,
    /// or immediately after springing back.
    pub async fn release(&mut self) -> Option<SwipeDecision> {
        let release = self.deck.release();
        self.run(release).await
    }

    pub async fn press(&mut self, direction: SwipeDirection) -> Option<SwipeDecision> {
        let release = self.deck.press(direction);
        self.run(release).await
    }

    async fn run(&mut self, release: Release) -> Option<SwipeDecision> {
        match release {
            Release::Commit { decision, .. } => {
                self.commit(&decision);

                let settings = self.deck.settings().clone();
                tokio::time::sleep(settings.fly_off).await;
                self.deck.finish_fly_out();
                tokio::time::sleep(settings.advance_delay).await;
                self.deck.finish_advance();

                Some(decision)
            }
            Release::Cancel { .. } => {
                self.deck.finish_return();
                None
            }
            Release::Ignored => None,
        }
    }

    fn commit(&mut self, decision: &SwipeDecision) {
        counter!(SWIPES_TOTAL, "direction" => decision.direction.as_str()).increment(1);
        self.bus.publish(
            SOURCE,
            &self.self_id,
            DomainEvent::SwipeCommitted(payloads::SwipeCommitted {
                user_id: self.self_id.clone(),
                profile_id: decision.profile_id.clone(),
                direction: decision.direction.as_str().to_string(),
            }),
        );

        if !decision.direction.is_like() {
            return;
        }

        self.reap();

        let handler = self.handler.clone();
        let self_id = self.self_id.clone();
        let candidate_id = decision.profile_id.clone();
        tracing::debug!(user_id = %self_id, candidate_id = %candidate_id, "like committed");
        self.in_flight.spawn(async move {
            handler.handle_like(self_id, candidate_id).await
        });
    }

    /// Drop likes that already finished; their outcome is not collected.
    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "like handler task failed");
            }
        }
    }

    /// Wait for every like still in flight and collect its output.
    /// Likes that finished before a later commit were already reaped.
    pub async fn settle(&mut self) -> Vec<H::Output> {
        let mut outputs = Vec::with_capacity(self.in_flight.len());
        while let Some(result) = self.in_flight.join_next().await {
            match result {
                Ok(output) => outputs.push(output),
                Err(e) => tracing::error!(error = %e, "like handler task failed"),
            }
        }
        outputs
    }
}
