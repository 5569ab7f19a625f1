//! Session commit orchestration.
//!
//! [`SessionMemory`] is the entry point an application talks to. Messages
//! accumulate in a [`SessionContext`] until the exchange is complete, then
//! [`SessionMemory::commit`] archives it, places it into head or tail,
//! persists the working memory and hands the rest to the compression
//! workers. Reads return whatever is persisted at the time, which may be
//! mid-compression.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use recall_compression::{CompressionLlm, Pipeline};
use recall_config::{MemoryConfig, RecallConfig};
use recall_core::storage::{ArchiveStore, WorkingMemoryStore};
use recall_core::{
    CompressionTask, ConversationLocks, EventBus, Exchange, MemoryEvent, Message, Pin, Provider,
    Result, Role, WorkingMemory,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backends::Backends;
use crate::context::{SessionContext, storage_key};
use crate::reaper::Reaper;
use crate::supervisor::QueueSupervisor;

/// Live session handles keyed by session id.
pub type SessionRegistry = Arc<RwLock<HashMap<String, Arc<Mutex<SessionContext>>>>>;

const FACTS_HEADER: &str = "You are a careful assistant and must respect these confirmed facts:\n";
const FACTS_FOOTER: &str = "Do not state anything that has not been confirmed.\n";

pub struct SessionMemory {
    archive: Arc<dyn ArchiveStore>,
    store: Arc<dyn WorkingMemoryStore>,
    supervisor: QueueSupervisor,
    locks: Arc<ConversationLocks>,
    config: MemoryConfig,
    sessions: SessionRegistry,
}

impl SessionMemory {
    pub fn new(
        archive: Arc<dyn ArchiveStore>,
        store: Arc<dyn WorkingMemoryStore>,
        supervisor: QueueSupervisor,
        locks: Arc<ConversationLocks>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            archive,
            store,
            supervisor,
            locks,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wire backends, pipeline and workers from configuration.
    pub fn from_backends(
        backends: Backends,
        provider: Arc<dyn Provider>,
        config: &RecallConfig,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let locks = Arc::new(ConversationLocks::new());
        let llm = CompressionLlm::new(
            provider,
            config.provider.model.clone(),
            config.provider.compression_temperature,
        );
        let pipeline = Pipeline::new(
            backends.store.clone(),
            llm,
            &config.memory,
            &config.compression,
        )
        .with_events(events.clone())
        .with_locks(locks.clone());
        let supervisor = QueueSupervisor::with_events(
            backends.queue,
            Arc::new(pipeline),
            config.queue.clone(),
            events,
        );

        Self::new(
            backends.archive,
            backends.store,
            supervisor,
            locks,
            config.memory.clone(),
        )
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.supervisor.events()
    }

    pub fn supervisor(&self) -> &QueueSupervisor {
        &self.supervisor
    }

    pub fn registry(&self) -> SessionRegistry {
        self.sessions.clone()
    }

    /// Start sweeping idle sessions out of the registry.
    pub fn start_reaper(&self, session: &recall_config::SessionConfig) -> Reaper {
        Reaper::start(
            self.sessions.clone(),
            self.locks.clone(),
            session.cleanup_interval(),
            session.max_inactive(),
        )
    }

    /// The session's handle, created on first use.
    ///
    /// A context that is locked elsewhere is not touched here; whoever holds
    /// it touches it on use.
    pub async fn get_session_context(&self, session_id: &str) -> Arc<Mutex<SessionContext>> {
        let existing = self.sessions.read().await.get(session_id).cloned();
        let ctx = match existing {
            Some(ctx) => ctx,
            None => self
                .sessions
                .write()
                .await
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    debug!(session_id, "Session context created");
                    Arc::new(Mutex::new(SessionContext::new(session_id)))
                })
                .clone(),
        };

        if let Ok(mut guard) = ctx.try_lock() {
            guard.touch();
        }
        ctx
    }

    /// Commit the context's open exchange.
    ///
    /// An incomplete exchange is discarded without error. Archive and
    /// working-memory failures are returned; compression runs later on the
    /// session's worker and never fails the commit.
    pub async fn commit(&self, ctx: &mut SessionContext) -> Result<()> {
        ctx.touch();
        let session_id = ctx.session_id().to_string();

        if !ctx.current_exchange().is_complete() {
            warn!(session_id = %session_id, "Exchange incomplete, skipping commit");
            ctx.clear_current();
            return Ok(());
        }
        let exchange = ctx.current_exchange().clone();

        self.archive.append(ctx.storage_key(), &exchange).await?;
        debug!(session_id = %session_id, "Exchange archived");

        let (evicted, total_rounds) = {
            let _guard = self.locks.acquire(&session_id).await;
            let mut memory = self.store.load(&session_id).await?;
            memory.ensure_conversation_id(&session_id);

            let was_empty = memory.total_rounds() == 0;
            let evicted =
                memory.admit(exchange.clone(), self.config.head_size, self.config.tail_size);
            if was_empty {
                info!(session_id = %session_id, "First exchange placed into head");
            }
            self.store.save(&memory).await?;
            (evicted, memory.total_rounds())
        };

        let events = self.events();
        events.publish(MemoryEvent::ExchangeCommitted {
            conversation_id: session_id.clone(),
            total_rounds,
            timestamp: Utc::now(),
        });
        if let Some(evicted) = &evicted {
            info!(
                session_id = %session_id,
                evicted_user_msg_id = evicted.user_id().unwrap_or("none"),
                "Exchange evicted from tail"
            );
            events.publish(MemoryEvent::TailEvicted {
                conversation_id: session_id.clone(),
                user_message_id: evicted.user_id().map(str::to_string),
                timestamp: Utc::now(),
            });
        }

        self.supervisor
            .submit(CompressionTask::new(session_id.clone(), exchange, evicted))
            .await;

        ctx.clear_current();
        debug!(session_id = %session_id, "Session context committed");
        Ok(())
    }

    /// Head, rolling window and tail messages in prompt order.
    pub async fn get_memory_messages(&self, ctx: &mut SessionContext) -> Result<Vec<Message>> {
        ctx.touch();
        Ok(self.store.load(ctx.session_id()).await?.assemble_messages())
    }

    pub async fn get_pinned_facts(&self, session_id: &str) -> Result<Vec<Pin>> {
        Ok(self.store.get_active_pins(session_id).await?)
    }

    pub async fn get_working_memory(&self, session_id: &str) -> Result<WorkingMemory> {
        Ok(self.store.load(session_id).await?)
    }

    /// Every archived message, oldest first.
    pub async fn get_original_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let exchanges = self.archive.get_all(&storage_key(session_id)).await?;
        Ok(exchanges.iter().flat_map(Exchange::to_messages).collect())
    }

    /// Archived user messages and the assistant replies that made no tool call.
    pub async fn get_interaction_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let exchanges = self.archive.get_all(&storage_key(session_id)).await?;
        let mut interactions = Vec::with_capacity(exchanges.len() * 2);
        for exchange in exchanges {
            if let Some(user) = exchange.user {
                interactions.push(user);
            }
            if let Some(assistant) = exchange.assistant {
                if assistant.role == Role::Assistant && !assistant.has_tool_use() {
                    interactions.push(assistant);
                }
            }
        }
        Ok(interactions)
    }

    /// Active pins as a fact list, or an empty string when there are none.
    pub async fn build_system_prompt(&self, session_id: &str) -> Result<String> {
        let pins = self.get_pinned_facts(session_id).await?;
        if pins.is_empty() {
            return Ok(String::new());
        }

        let mut prompt = String::from(FACTS_HEADER);
        for pin in &pins {
            prompt.push_str(&format!("- {}\n", pin.content));
        }
        prompt.push_str(FACTS_FOOTER);
        Ok(prompt)
    }

    /// Working memory rendered as a transcript, followed by the new input.
    pub async fn build_user_prompt(&self, ctx: &mut SessionContext, input: &str) -> Result<String> {
        let messages = self.get_memory_messages(ctx).await?;

        let mut prompt = String::new();
        if !messages.is_empty() {
            prompt.push_str("Conversation history:\n");
            for message in &messages {
                prompt.push_str(&format!(
                    "[{}] {}\n",
                    message.role.as_str().to_uppercase(),
                    message.text_content()
                ));
            }
        }
        prompt.push_str("\nCurrent user input:\n");
        prompt.push_str(input);
        Ok(prompt)
    }

    /// Rebuild head and tail from the archive. The rolling window and pins
    /// start empty.
    pub async fn recover_working_memory(&self, session_id: &str) -> Result<WorkingMemory> {
        let history = self.archive.get_all(&storage_key(session_id)).await?;
        if history.is_empty() {
            warn!(session_id, "No archived exchanges to recover from");
            return Ok(WorkingMemory::new(session_id));
        }

        let count = history.len();
        let _guard = self.locks.acquire(session_id).await;
        let recovered = self
            .store
            .recover(session_id, history, self.config.head_size, self.config.tail_size)
            .await?;
        info!(session_id, exchanges = count, "Recovered working memory from archive");
        Ok(recovered)
    }

    /// Remove everything stored for a session.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.archive.clear(&storage_key(session_id)).await?;
        {
            let _guard = self.locks.acquire(session_id).await;
            self.store.clear(session_id).await?;
        }
        self.locks.forget(session_id);
        self.sessions.write().await.remove(session_id);
        info!(session_id, "Session cleared");
        Ok(())
    }

    /// Stop the compression workers. Queued tasks stay queued.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        self.sessions.write().await.clear();
        info!("Session memory shut down");
    }
}
