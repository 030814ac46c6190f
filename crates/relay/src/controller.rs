use std::sync::Arc;
use std::time::{Duration, Instant};

use codetrack_core::domain::{DeliveryId, DeliveryResult, IngestionClient, Submission, UserId};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dedup::DuplicateFilter;
use crate::events::{DropReason, EventBroadcaster, EventStream, RelayEvent};
use crate::protocol::{InboundMessage, OutboundResponse, UNKNOWN_MESSAGE_TYPE};
use crate::storage::{ENABLED_KEY, PersistentState, StateEntries, USER_ID_KEY};
use crate::Result;

/// In-memory relay state. Authoritative for gating even when persisting it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayState {
    pub user_id: Option<UserId>,
    pub enabled: bool,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            user_id: None,
            enabled: true,
        }
    }
}

impl RelayState {
    /// Submissions are forwarded only when enabled and identified.
    pub fn relaying_user(&self) -> std::result::Result<&UserId, DropReason> {
        if !self.enabled {
            return Err(DropReason::Disabled);
        }
        self.user_id.as_ref().ok_or(DropReason::Unidentified)
    }
}

/// The relay state machine.
///
/// Handles one message at a time. Accepted submissions are delivered on
/// detached tasks so the caller never waits on the ingestion endpoint.
pub struct RelayController {
    state: RelayState,
    store: Arc<dyn PersistentState>,
    ingestion: Arc<dyn IngestionClient>,
    events: Arc<EventBroadcaster>,
    dedup: DuplicateFilter,
    deliveries: JoinSet<()>,
}

impl RelayController {
    pub fn new(
        state: RelayState,
        store: Arc<dyn PersistentState>,
        ingestion: Arc<dyn IngestionClient>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            state,
            store,
            ingestion,
            events,
            dedup: DuplicateFilter::new(Duration::ZERO),
            deliveries: JoinSet::new(),
        }
    }

    /// Restores the persisted state before any message is handled.
    ///
    /// A failed read falls back to the defaults: enabled, no user.
    pub async fn hydrate(
        store: Arc<dyn PersistentState>,
        ingestion: Arc<dyn IngestionClient>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        let state = match store.get(&[USER_ID_KEY, ENABLED_KEY]).await {
            Ok(entries) => state_from_entries(&entries),
            Err(err) => {
                warn!(error = %err, "failed to read persisted relay state, using defaults");
                RelayState::default()
            }
        };

        info!(
            user_id = ?state.user_id,
            enabled = state.enabled,
            "relay state hydrated"
        );

        Self::new(state, store, ingestion, events)
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup = DuplicateFilter::new(window);
        self
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.state.user_id.as_ref()
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Number of dispatched deliveries that have not been reaped yet.
    pub fn in_flight(&self) -> usize {
        self.deliveries.len()
    }

    pub async fn handle(&mut self, message: InboundMessage) -> Result<OutboundResponse> {
        debug!(kind = message.kind(), "handling relay message");

        let response = match message {
            InboundMessage::SubmissionDetected { data } => self.submission_detected(data),
            InboundMessage::GetUserId => OutboundResponse::UserId(self.state.user_id.clone()),
            InboundMessage::SetUserId { user_id } => {
                self.set_user_id(user_id).await;
                OutboundResponse::Ok
            }
            InboundMessage::ToggleExtension { enabled } => {
                self.set_enabled(enabled).await;
                OutboundResponse::Ok
            }
            InboundMessage::Unknown => OutboundResponse::error(UNKNOWN_MESSAGE_TYPE),
        };

        Ok(response)
    }

    /// Waits for every detached delivery to finish.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.deliveries.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "delivery task ended abnormally");
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn set_user_id(&mut self, user_id: UserId) {
        info!(user_id = %user_id, "setting user id");
        self.state.user_id = Some(user_id.clone());
        self.emit_state_changed();

        self.persist(StateEntries::from([(
            USER_ID_KEY.to_string(),
            Value::String(user_id.into_inner()),
        )]))
        .await;
    }

    #[tracing::instrument(skip(self))]
    async fn set_enabled(&mut self, enabled: bool) {
        info!(enabled, "toggling relay");
        self.state.enabled = enabled;
        self.emit_state_changed();

        self.persist(StateEntries::from([(
            ENABLED_KEY.to_string(),
            Value::Bool(enabled),
        )]))
        .await;
    }

    async fn persist(&self, entries: StateEntries) {
        if let Err(err) = self.store.set(entries).await {
            warn!(error = %err, "failed to persist relay state, keeping in-memory value");
            self.events.emit(RelayEvent::PersistenceFailed {
                error: err.to_string(),
            });
        }
    }

    fn submission_detected(&mut self, submission: Submission) -> OutboundResponse {
        self.reap_finished();

        let problem = submission.problem_key().to_string();
        let user_id = match self.state.relaying_user() {
            Ok(user_id) => user_id.clone(),
            Err(reason) => {
                debug!(problem = %problem, ?reason, "submission dropped by gating");
                self.events
                    .emit(RelayEvent::SubmissionDropped { problem, reason });
                return OutboundResponse::Ok;
            }
        };

        if !self.dedup.admit(&submission, Instant::now()) {
            debug!(problem = %problem, "duplicate submission dropped");
            self.events.emit(RelayEvent::SubmissionDropped {
                problem,
                reason: DropReason::Duplicate,
            });
            return OutboundResponse::Ok;
        }

        let delivery_id = DeliveryId::new();
        info!(
            delivery_id = %delivery_id,
            problem = %problem,
            platform = %submission.platform,
            status = submission.status.as_str(),
            "dispatching submission"
        );
        self.events.emit(RelayEvent::DeliveryDispatched {
            delivery_id,
            problem,
        });

        let ingestion = Arc::clone(&self.ingestion);
        let events = Arc::clone(&self.events);
        self.deliveries.spawn(async move {
            match ingestion.send(&submission, &user_id).await {
                DeliveryResult::Delivered { server_id } => {
                    info!(delivery_id = %delivery_id, ?server_id, "submission delivered");
                    events.emit(RelayEvent::DeliverySucceeded {
                        delivery_id,
                        server_id,
                    });
                }
                DeliveryResult::Failed { reason } => {
                    warn!(delivery_id = %delivery_id, reason = %reason, "submission lost");
                    events.emit(RelayEvent::DeliveryFailed {
                        delivery_id,
                        reason,
                    });
                }
            }
        });

        OutboundResponse::Ok
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.deliveries.try_join_next() {
            if let Err(err) = joined {
                warn!(error = %err, "delivery task ended abnormally");
            }
        }
    }

    fn emit_state_changed(&self) {
        self.events.emit(RelayEvent::StateChanged {
            user_id: self.state.user_id.clone(),
            enabled: self.state.enabled,
        });
    }
}

fn state_from_entries(entries: &StateEntries) -> RelayState {
    let mut state = RelayState::default();

    match entries.get(USER_ID_KEY) {
        Some(Value::String(user_id)) => state.user_id = Some(UserId::new(user_id.as_str())),
        Some(Value::Null) | None => {}
        Some(other) => warn!(value = %other, "ignoring persisted userId that is not a string"),
    }

    match entries.get(ENABLED_KEY) {
        Some(Value::Bool(enabled)) => state.enabled = *enabled,
        Some(Value::Null) | None => {}
        Some(other) => {
            warn!(value = %other, "ignoring persisted extensionEnabled that is not a boolean")
        }
    }

    state
}
