//! End-to-end tests for recall.
//!
//! These wire real backends, the compression pipeline and the queue workers
//! the way the CLI does, with a scripted provider standing in for the LLM.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use recall_config::{RecallConfig, StrategyKind};
use recall_core::{Exchange, Message, PinStatus};
use recall_providers::ScriptedProvider;
use recall_session::{Backends, SessionMemory};

// ── Helpers ──────────────────────────────────────────────────────────────

fn config(backend: &str, path: Option<std::path::PathBuf>) -> RecallConfig {
    let mut config = RecallConfig::default();
    config.storage.backend = backend.into();
    config.storage.path = path;
    // Shutdown waits for an in-flight pop; keep polls short.
    config.queue.poll_timeout_secs = 1;
    config
}

async fn open(config: &RecallConfig, provider: Arc<ScriptedProvider>) -> SessionMemory {
    let backends = Backends::open(&config.storage, &config.memory).await.unwrap();
    SessionMemory::from_backends(backends, provider, config)
}

async fn commit(memory: &SessionMemory, session: &str, user: &str, assistant: &str) -> Exchange {
    let ctx = memory.get_session_context(session).await;
    let mut ctx = ctx.lock().await;
    ctx.append_message(Message::user(user));
    ctx.append_message(Message::assistant(assistant));
    let exchange = ctx.current_exchange().clone();
    memory.commit(&mut ctx).await.unwrap();
    exchange
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}

fn texts(messages: &[Message]) -> Vec<String> {
    messages.iter().map(Message::text_content).collect()
}

// ── Pins ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pins_are_judged_negated_and_aggregated_in_order() {
    let mut config = config("memory", None);
    config.memory.max_pin_count = 2;
    config.compression.strategies = vec![StrategyKind::PinJudgment, StrategyKind::PinAggregation];

    let provider = Arc::new(ScriptedProvider::new([
        r#"{"shouldPin": true, "pinContent": "The user lives in Paris", "confidence": 0.9}"#,
        r#"{"shouldPin": false, "reason": "small talk"}"#,
        r#"Sure! {"shouldPin": true, "pinContent": "The user has a cat"}"#,
    ]));
    let memory = open(&config, provider.clone()).await;

    commit(&memory, "s1", "I live in Paris", "Noted").await;
    commit(&memory, "s1", "Nice weather", "Indeed").await;
    commit(&memory, "s1", "I have a cat", "Cute").await;

    let m = &memory;
    eventually(move || async move { m.get_pinned_facts("s1").await.unwrap().len() == 2 }).await;
    let paris = memory.get_pinned_facts("s1").await.unwrap()[0].id.clone();

    // Moving invalidates Paris; the third pin pushes the count over two.
    provider.push_reply(format!(
        r#"{{"shouldPin": true, "pinContent": "The user lives in Rome", "negatesPinId": "{paris}"}}"#
    ));
    commit(&memory, "s1", "I moved to Rome", "Exciting").await;
    let stale = paris.as_str();
    eventually(move || async move {
        m.get_working_memory("s1")
            .await
            .unwrap()
            .pins()
            .iter()
            .any(|p| p.id == stale && p.status == PinStatus::Invalidated)
    })
    .await;

    provider.push_reply(r#"{"shouldPin": true, "pinContent": "The user works remotely"}"#);
    provider.push_reply("The user lives in Rome, has a cat and works remotely.");
    commit(&memory, "s1", "I work from home", "Nice").await;

    eventually(move || async move { m.get_working_memory("s1").await.unwrap().pins().len() == 1 })
        .await;
    let system = memory.build_system_prompt("s1").await.unwrap();
    assert!(system.contains("- The user lives in Rome, has a cat and works remotely.\n"));
    assert_eq!(provider.call_count(), 6);

    memory.shutdown().await;
}

// ── Compression ──────────────────────────────────────────────────────────

#[tokio::test]
async fn evicted_exchanges_flow_into_a_history_summary() {
    let mut config = config("memory", None);
    config.memory.window_max_size = 4;
    config.compression.strategies = vec![
        StrategyKind::CurrentRoundSummarization,
        StrategyKind::HistorySummarization,
    ];

    let provider = Arc::new(ScriptedProvider::new(["Three rounds about fruit."]));
    let memory = open(&config, provider.clone()).await;

    let mut committed = Vec::new();
    for fruit in ["apple", "banana", "cherry", "date", "elderberry", "fig"] {
        committed.push(commit(&memory, "s1", fruit, &format!("{fruit} is tasty")).await);
    }

    // Six commits: head=[1], tail=[5,6], exchanges 2..4 evicted. The third
    // eviction overflows the four-message window.
    let (m, p) = (&memory, provider.as_ref());
    eventually(move || async move { p.call_count() == 1 }).await;
    eventually(move || async move {
        m.get_working_memory("s1").await.unwrap().rolling_window().len() == 1
    })
    .await;

    let wm = memory.get_working_memory("s1").await.unwrap();
    assert_eq!(texts(wm.rolling_window()), vec!["[History summary] Three rounds about fruit."]);
    assert_eq!(wm.head().iter().collect::<Vec<_>>(), vec![&committed[0]]);
    assert_eq!(wm.tail().iter().collect::<Vec<_>>(), vec![&committed[4], &committed[5]]);

    let ctx = memory.get_session_context("s1").await;
    let assembled = memory.get_memory_messages(&mut *ctx.lock().await).await.unwrap();
    assert_eq!(
        texts(&assembled),
        vec![
            "apple",
            "apple is tasty",
            "[History summary] Three rounds about fruit.",
            "elderberry",
            "elderberry is tasty",
            "fig",
            "fig is tasty",
        ]
    );

    // The archive still has every exchange.
    assert_eq!(memory.get_original_messages("s1").await.unwrap().len(), 12);
    memory.shutdown().await;
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_session_survives_restart_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("sqlite", Some(dir.path().join("recall.db")));
    config.compression.strategies.clear();

    let provider = Arc::new(ScriptedProvider::echo());
    let memory = open(&config, provider.clone()).await;
    let mut committed = Vec::new();
    for i in 1..=4 {
        committed.push(commit(&memory, "s1", &format!("q{i}"), &format!("a{i}")).await);
    }
    let m = &memory;
    eventually(move || async move {
        m.get_working_memory("s1").await.unwrap().rolling_window().len() == 2
    })
    .await;
    memory.shutdown().await;
    drop(memory);

    let reopened = open(&config, provider).await;
    let wm = reopened.get_working_memory("s1").await.unwrap();
    assert_eq!(texts(wm.rolling_window()), vec!["q2", "a2"]);
    assert_eq!(wm.tail().iter().collect::<Vec<_>>(), vec![&committed[2], &committed[3]]);

    let recovered = reopened.recover_working_memory("s1").await.unwrap();
    assert_eq!(recovered.head().iter().collect::<Vec<_>>(), vec![&committed[0]]);
    assert_eq!(
        recovered.tail().iter().collect::<Vec<_>>(),
        vec![&committed[2], &committed[3]]
    );
    assert!(recovered.rolling_window().is_empty());
    reopened.shutdown().await;
}

#[tokio::test]
async fn queued_tasks_outlive_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config("sqlite", Some(dir.path().join("recall.db")));
    config.memory.tail_size = 1;
    config.compression.strategies.clear();

    let provider = Arc::new(ScriptedProvider::echo());
    let first = open(&config, provider.clone()).await;
    commit(&first, "s1", "q1", "a1").await;
    commit(&first, "s1", "q2", "a2").await;
    first.shutdown().await;

    // No worker runs after shutdown; the eviction of q2 waits in the queue.
    commit(&first, "s1", "q3", "a3").await;
    assert!(first.get_working_memory("s1").await.unwrap().rolling_window().is_empty());

    let second = open(&config, provider).await;
    commit(&second, "s1", "q4", "a4").await;
    let m = &second;
    eventually(move || async move {
        m.get_working_memory("s1").await.unwrap().rolling_window().len() == 4
    })
    .await;

    let wm = second.get_working_memory("s1").await.unwrap();
    assert_eq!(texts(wm.rolling_window()), vec!["q2", "a2", "q3", "a3"]);
    second.shutdown().await;
}
