use crate::error::{VoiceError, VoiceResult};
use crate::events::Utterance;
use crate::session::{
    Collaborators, LifecycleEvent, SessionConfig, SessionEvent, SessionManager, SessionState,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: SessionConfig,
    pub collaborators: Collaborators,

    /// One lifecycle manager per user (user_id → manager)
    pub sessions: Arc<RwLock<HashMap<String, Arc<SessionManager>>>>,

    /// Finalised utterances of each user's current or last session
    pub transcripts: Arc<RwLock<HashMap<String, Vec<Utterance>>>>,
}

impl AppState {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            transcripts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Existing manager for `user_id`, if one was ever created
    pub async fn manager(&self, user_id: &str) -> Option<Arc<SessionManager>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Manager for `user_id`, created on first use
    pub async fn manager_for(&self, user_id: &str) -> Arc<SessionManager> {
        let mut sessions = self.sessions.write().await;
        if let Some(manager) = sessions.get(user_id) {
            return Arc::clone(manager);
        }

        let manager = Arc::new(SessionManager::new(
            self.config.clone(),
            self.collaborators.clone(),
        ));
        spawn_transcript_collector(
            user_id.to_string(),
            manager.subscribe(),
            Arc::clone(&self.transcripts),
        );
        sessions.insert(user_id.to_string(), Arc::clone(&manager));

        manager
    }

    /// Forget an idle or ended user's manager and transcript
    ///
    /// Managers otherwise live for the life of the process. Dropping one
    /// closes its event channel, which ends its transcript collector.
    pub async fn evict(&self, user_id: &str) -> VoiceResult<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(manager) = sessions.get(user_id) else {
            return Ok(false);
        };

        let state = manager.state().await;
        if matches!(state, SessionState::Connecting | SessionState::Active) {
            return Err(VoiceError::InvalidState(format!(
                "cannot evict {} while {}",
                user_id, state
            )));
        }

        sessions.remove(user_id);
        drop(sessions);
        self.transcripts.write().await.remove(user_id);
        debug!("Evicted voice manager for {}", user_id);

        Ok(true)
    }

    pub async fn transcript(&self, user_id: &str) -> Vec<Utterance> {
        self.transcripts
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn spawn_transcript_collector(
    user_id: String,
    mut events: broadcast::Receiver<SessionEvent>,
    transcripts: Arc<RwLock<HashMap<String, Vec<Utterance>>>>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Lifecycle(LifecycleEvent::Active { .. })) => {
                    transcripts.write().await.insert(user_id.clone(), Vec::new());
                }
                Ok(SessionEvent::Transcript(fragment)) if fragment.is_final => {
                    debug!("Final {} utterance for {}", fragment.speaker, user_id);
                    transcripts
                        .write()
                        .await
                        .entry(user_id.clone())
                        .or_default()
                        .push(Utterance {
                            speaker: fragment.speaker,
                            text: fragment.text,
                            finalized_at: Utc::now(),
                        });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Transcript collector for {} skipped {} events", user_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
