use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::battle::external::{AnswerOracle, BattleStore, QuestionSource};
use crate::battle::{Battle, BattleOptions, BattleSnapshot, Result};
use crate::models::BattleSettings;

struct Entry {
    battle: Battle,
    last_touched: Instant,
}

/// Live battles addressed by id over HTTP. A battle nobody has looked up
/// for `ttl` is discarded on the next sweep.
pub struct BattleRegistry {
    battles: RwLock<HashMap<Uuid, Entry>>,
    source: Arc<dyn QuestionSource>,
    oracle: Arc<dyn AnswerOracle>,
    store: Arc<dyn BattleStore>,
    options: BattleOptions,
    ttl: Duration,
}

impl BattleRegistry {
    pub fn new(
        source: Arc<dyn QuestionSource>,
        oracle: Arc<dyn AnswerOracle>,
        store: Arc<dyn BattleStore>,
        options: BattleOptions,
        ttl: Duration,
    ) -> Self {
        Self {
            battles: RwLock::new(HashMap::new()),
            source,
            oracle,
            store,
            options,
            ttl,
        }
    }

    /// Starts a new battle and registers it only if its questions loaded.
    pub async fn create(&self, settings: BattleSettings) -> Result<(Uuid, BattleSnapshot)> {
        self.evict_expired().await;

        let battle = Battle::new(
            self.source.clone(),
            self.oracle.clone(),
            self.store.clone(),
            self.options,
        );
        let snapshot = battle.start(settings).await?;

        let id = Uuid::new_v4();
        self.battles.write().await.insert(
            id,
            Entry {
                battle,
                last_touched: Instant::now(),
            },
        );
        tracing::info!("Registered battle {}", id);
        Ok((id, snapshot))
    }

    /// Looks a battle up and refreshes its idle deadline.
    pub async fn get(&self, id: &Uuid) -> Option<Battle> {
        let mut battles = self.battles.write().await;
        let entry = battles.get_mut(id)?;
        if entry.last_touched.elapsed() >= self.ttl {
            return None;
        }
        entry.last_touched = Instant::now();
        Some(entry.battle.clone())
    }

    /// Drops the battle. Its countdown stops once the last handle is gone.
    pub async fn remove(&self, id: &Uuid) -> Option<Battle> {
        let removed = self.battles.write().await.remove(id);
        let battle = removed.map(|entry| entry.battle);
        if let Some(battle) = &battle {
            battle.restart().await;
            tracing::info!("Removed battle {}", id);
        }
        battle
    }

    /// Discards every battle idle for longer than the TTL and returns how
    /// many went.
    pub async fn evict_expired(&self) -> usize {
        let expired: Vec<(Uuid, Battle)> = {
            let mut battles = self.battles.write().await;
            let ids: Vec<Uuid> = battles
                .iter()
                .filter(|(_, entry)| entry.last_touched.elapsed() >= self.ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| battles.remove(&id).map(|entry| (id, entry.battle)))
                .collect()
        };

        for (id, battle) in &expired {
            battle.restart().await;
            tracing::info!("Evicted idle battle {}", id);
        }
        expired.len()
    }

    /// Sweeps idle battles every `period` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_expired().await;
                if evicted > 0 {
                    tracing::debug!("Battle sweep evicted {} battles", evicted);
                }
            }
        })
    }

    pub async fn count(&self) -> usize {
        self.battles.read().await.len()
    }
}
