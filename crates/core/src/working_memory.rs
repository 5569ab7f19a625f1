//! Working memory: the bounded, reconstructable context of one conversation.
//!
//! Four partitions, each with its own retention rule:
//!
//! | Partition | Holds | Rule |
//! |-----------|-------|------|
//! | Head | oldest exchanges | append until full, then frozen |
//! | Rolling window | messages demoted from the tail | the only compressible partition |
//! | Tail | newest exchanges | bounded FIFO, overflow is evicted |
//! | Pins | extracted facts | invalidated softly, replaced only by aggregation |
//!
//! Every operation here is a synchronous in-memory mutation. Persisting the
//! result is the caller's job.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exchange::Exchange;
use crate::message::Message;
use crate::pin::Pin;

// ── Data Structures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    conversation_id: String,

    #[serde(default)]
    head: VecDeque<Exchange>,

    #[serde(default)]
    tail: VecDeque<Exchange>,

    #[serde(default)]
    rolling_window: Vec<Message>,

    #[serde(default)]
    pins: Vec<Pin>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// ── Implementation ────────────────────────────────────────────────────────

impl WorkingMemory {
    /// Create an empty working memory for a conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            head: VecDeque::new(),
            tail: VecDeque::new(),
            rolling_window: Vec::new(),
            pins: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Adopt a conversation id if none was set (records created before ids
    /// were stored carry an empty one).
    pub fn ensure_conversation_id(&mut self, conversation_id: &str) {
        if self.conversation_id.is_empty() {
            self.conversation_id = conversation_id.to_string();
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ── Head ──

    /// Append to the head while it holds fewer than `max_size` exchanges.
    /// Returns `false` (and changes nothing) once the head is full.
    pub fn set_head(&mut self, exchange: Exchange, max_size: usize) -> bool {
        if self.head.len() >= max_size {
            return false;
        }
        self.head.push_back(exchange);
        self.touch();
        true
    }

    pub fn head(&self) -> &VecDeque<Exchange> {
        &self.head
    }

    // ── Tail ──

    /// Append to the tail. When that pushes it past `max_size`, the oldest
    /// tail entry is removed and returned for demotion.
    pub fn add_to_tail(&mut self, exchange: Exchange, max_size: usize) -> Option<Exchange> {
        self.tail.push_back(exchange);
        self.touch();
        if self.tail.len() > max_size {
            self.tail.pop_front()
        } else {
            None
        }
    }

    pub fn tail(&self) -> &VecDeque<Exchange> {
        &self.tail
    }

    /// Place a newly committed exchange: into the head while it has room,
    /// otherwise into the tail. Returns whatever the tail evicted.
    pub fn admit(
        &mut self,
        exchange: Exchange,
        head_size: usize,
        tail_size: usize,
    ) -> Option<Exchange> {
        if self.head.len() < head_size {
            self.set_head(exchange, head_size);
            None
        } else {
            self.add_to_tail(exchange, tail_size)
        }
    }

    /// Rebuild head and tail from an ordered exchange history by replaying
    /// [`WorkingMemory::admit`]. Evicted entries are dropped.
    pub fn from_history<I>(
        conversation_id: impl Into<String>,
        history: I,
        head_size: usize,
        tail_size: usize,
    ) -> Self
    where
        I: IntoIterator<Item = Exchange>,
    {
        let mut wm = Self::new(conversation_id);
        for exchange in history {
            wm.admit(exchange, head_size, tail_size);
        }
        wm
    }

    // ── Rolling window ──

    pub fn add_to_rolling_window(&mut self, message: Message) {
        self.rolling_window.push(message);
        self.touch();
    }

    /// Expand an exchange into its flat message list (user, intermediates,
    /// assistant) and append it.
    pub fn add_exchange_to_rolling_window(&mut self, exchange: &Exchange) {
        self.rolling_window.extend(exchange.messages().cloned());
        self.touch();
    }

    pub fn clear_rolling_window(&mut self) {
        self.rolling_window.clear();
        self.touch();
    }

    /// Replace the whole window in one step.
    pub fn set_rolling_window(&mut self, messages: Vec<Message>) {
        self.rolling_window = messages;
        self.touch();
    }

    pub fn rolling_window(&self) -> &[Message] {
        &self.rolling_window
    }

    // ── Pins ──

    pub fn add_pin(&mut self, pin: Pin) {
        self.pins.push(pin);
        self.touch();
    }

    /// Mark a pin invalidated. Returns `false` when no pin has that id.
    pub fn invalidate_pin(&mut self, pin_id: &str) -> bool {
        match self.pins.iter_mut().find(|p| p.id == pin_id) {
            Some(pin) => {
                pin.invalidate();
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Hard-delete a single pin. Returns `false` when no pin has that id.
    pub fn remove_pin(&mut self, pin_id: &str) -> bool {
        let before = self.pins.len();
        self.pins.retain(|p| p.id != pin_id);
        let removed = self.pins.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Drop every pin, active or invalidated, and keep only `pin`.
    pub fn replace_pins(&mut self, pin: Pin) {
        self.pins.clear();
        self.pins.push(pin);
        self.touch();
    }

    pub fn active_pins(&self) -> Vec<&Pin> {
        self.pins.iter().filter(|p| p.is_active()).collect()
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    // ── Assembly ──

    /// Head messages, then the rolling window, then tail messages.
    pub fn assemble_messages(&self) -> Vec<Message> {
        let head = self.head.iter().flat_map(Exchange::messages);
        let tail = self.tail.iter().flat_map(Exchange::messages);
        head.chain(self.rolling_window.iter())
            .chain(tail)
            .cloned()
            .collect()
    }

    /// Number of exchanges kept verbatim.
    pub fn total_rounds(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
            && self.tail.is_empty()
            && self.rolling_window.is_empty()
            && self.pins.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(n: usize) -> Exchange {
        Exchange::of(
            Message::user(format!("q{n}")),
            Message::assistant(format!("a{n}")),
        )
    }

    fn texts(messages: &[Message]) -> Vec<String> {
        messages.iter().map(Message::text_content).collect()
    }

    #[test]
    fn new_working_memory_is_empty() {
        let wm = WorkingMemory::new("c1");
        assert!(wm.is_empty());
        assert_eq!(wm.total_rounds(), 0);
        assert_eq!(wm.conversation_id(), "c1");
    }

    #[test]
    fn head_ignores_appends_once_full() {
        let mut wm = WorkingMemory::new("c1");
        let first = exchange(1);
        assert!(wm.set_head(first.clone(), 1));
        assert!(!wm.set_head(exchange(2), 1));
        assert_eq!(wm.head().len(), 1);
        assert_eq!(wm.head()[0], first);
    }

    #[test]
    fn tail_evicts_oldest_past_capacity() {
        let mut wm = WorkingMemory::new("c1");
        let e2 = exchange(2);
        let e3 = exchange(3);
        assert!(wm.add_to_tail(e2.clone(), 2).is_none());
        assert!(wm.add_to_tail(e3.clone(), 2).is_none());
        let evicted = wm.add_to_tail(exchange(4), 2);
        assert_eq!(evicted, Some(e2));
        assert_eq!(wm.tail().len(), 2);
        assert_eq!(wm.tail()[0], e3);
    }

    #[test]
    fn five_commits_follow_head_and_tail_rules() {
        let mut wm = WorkingMemory::new("c1");
        let commits: Vec<Exchange> = (1..=5).map(exchange).collect();
        let mut evicted = Vec::new();

        for ex in &commits {
            if wm.total_rounds() == 0 {
                wm.set_head(ex.clone(), 1);
            } else if let Some(out) = wm.add_to_tail(ex.clone(), 2) {
                evicted.push(out);
            }
        }

        assert_eq!(wm.head().iter().collect::<Vec<_>>(), vec![&commits[0]]);
        assert_eq!(
            wm.tail().iter().collect::<Vec<_>>(),
            vec![&commits[3], &commits[4]]
        );
        assert_eq!(evicted, vec![commits[1].clone(), commits[2].clone()]);
    }

    #[test]
    fn admit_fills_head_before_tail() {
        let mut wm = WorkingMemory::new("c1");
        let third = exchange(3);
        assert!(wm.admit(exchange(1), 2, 1).is_none());
        assert!(wm.admit(exchange(2), 2, 1).is_none());
        assert!(wm.admit(third.clone(), 2, 1).is_none());
        assert_eq!(wm.admit(exchange(4), 2, 1), Some(third));
        assert_eq!(wm.head().len(), 2);
        assert_eq!(wm.tail().len(), 1);
    }

    #[test]
    fn from_history_keeps_first_and_last() {
        let history: Vec<Exchange> = (1..=6).map(exchange).collect();
        let wm = WorkingMemory::from_history("c1", history.clone(), 1, 2);
        assert_eq!(wm.head()[0], history[0]);
        assert_eq!(
            wm.tail().iter().cloned().collect::<Vec<_>>(),
            vec![history[4].clone(), history[5].clone()]
        );
        assert!(wm.rolling_window().is_empty());
    }

    #[test]
    fn from_history_with_single_exchange_only_fills_head() {
        let wm = WorkingMemory::from_history("c1", vec![exchange(1)], 1, 2);
        assert_eq!(wm.head().len(), 1);
        assert!(wm.tail().is_empty());
    }

    #[test]
    fn assemble_is_head_window_tail_regardless_of_mutation_order() {
        let mut wm = WorkingMemory::new("c1");
        wm.add_to_tail(exchange(3), 2);
        wm.add_to_rolling_window(Message::assistant("summary"));
        wm.set_head(exchange(1), 1);

        assert_eq!(
            texts(&wm.assemble_messages()),
            vec!["q1", "a1", "summary", "q3", "a3"]
        );
    }

    #[test]
    fn exchange_expands_into_window_in_order() {
        let mut wm = WorkingMemory::new("c1");
        let ex = exchange(1).with_intermediate(Message::tool("tool-out"));
        wm.add_exchange_to_rolling_window(&ex);
        assert_eq!(texts(wm.rolling_window()), vec!["q1", "tool-out", "a1"]);

        wm.clear_rolling_window();
        assert!(wm.rolling_window().is_empty());
    }

    #[test]
    fn invalidate_pin_is_noop_for_unknown_id() {
        let mut wm = WorkingMemory::new("c1");
        wm.add_pin(Pin::new("c1", "fact", 1.0));
        assert!(!wm.invalidate_pin("missing"));
        assert_eq!(wm.active_pins().len(), 1);
    }

    #[test]
    fn invalidated_pins_are_filtered_but_kept() {
        let mut wm = WorkingMemory::new("c1");
        let pin = Pin::new("c1", "fact", 1.0);
        let id = pin.id.clone();
        wm.add_pin(pin);
        assert!(wm.invalidate_pin(&id));
        assert!(wm.active_pins().is_empty());
        assert_eq!(wm.pins().len(), 1);
        assert!(!wm.is_empty());
    }

    #[test]
    fn replace_pins_discards_invalidated_too() {
        let mut wm = WorkingMemory::new("c1");
        let stale = Pin::new("c1", "old", 1.0);
        let stale_id = stale.id.clone();
        wm.add_pin(stale);
        wm.invalidate_pin(&stale_id);
        wm.add_pin(Pin::new("c1", "current", 1.0));

        wm.replace_pins(Pin::new("c1", "merged", 1.0));
        assert_eq!(wm.pins().len(), 1);
        assert_eq!(wm.pins()[0].content, "merged");
    }

    #[test]
    fn serialization_roundtrip_keeps_partitions() {
        let mut wm = WorkingMemory::new("c1");
        wm.set_head(exchange(1), 1);
        wm.add_to_tail(exchange(2), 2);
        wm.add_to_rolling_window(Message::assistant("s"));
        wm.add_pin(Pin::new("c1", "fact", 0.5));

        let json = serde_json::to_string(&wm).unwrap();
        let back: WorkingMemory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_rounds(), 2);
        assert_eq!(back.rolling_window().len(), 1);
        assert_eq!(back.pins().len(), 1);
        assert_eq!(
            texts(&back.assemble_messages()),
            texts(&wm.assemble_messages())
        );
    }
}
