//! # stream-regex - Regex automation triggers for streamed chat responses
//!
//! While a chat host streams a response token by token, stream-regex watches
//! the message being written and evaluates a user-managed list of regexes
//! against every new text snapshot. Each write that matches at least one rule
//! publishes the automation ids of the matching rules, in rule order.
//!
//! ## Core Concepts
//!
//! - **Rule**: an id, a `/matcher/flags` pattern and an automation id
//! - **RuleSet**: the ordered, persisted rule list with add/update/delete
//! - **StreamWatcher**: polls the generation flag and keeps a write
//!   interceptor installed on the live streaming entry
//! - **AutomationEvent**: the ordered matches of one triggering write
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stream_regex::{ChatBuffer, EngineConfig, GenerationState, InMemorySettingsStore, StreamRegexEngine};
//!
//! let engine = StreamRegexEngine::new(EngineConfig::default(), Arc::new(InMemorySettingsStore::new()))?;
//! engine.execute_line(r"/stream-regex-add id=nl regex=/\n/ automation=STOP")?;
//!
//! let flag = Arc::new(GenerationState::new());
//! let chat = Arc::new(ChatBuffer::new());
//! let events = engine.subscribe();
//! let watcher = engine.watch(flag.clone(), chat.clone())?;
//!
//! // host: flag.start(); chat.push(""); chat.set_text(0, "Hello\n"); ...
//! let event = events.recv()?;
//! watcher.stop()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Rules and their persistence
pub mod config;
pub mod error;
pub mod rule;
pub mod rule_set;
pub mod service;
pub mod storage;

// Command surface and facade
pub mod commands;
pub mod engine;

// Stream interception
pub mod watch;

pub use commands::{Command, CommandSpec, COMMANDS};
pub use config::{BusConfig, EngineConfig, Settings, WatcherConfig};
pub use engine::StreamRegexEngine;
pub use error::{ExecutionError, StreamRegexError, StreamRegexResult, ValidationError};
pub use rule::{AutomationId, PatternSpec, Rule, RuleId, RulePattern};
pub use rule_set::RuleSet;
pub use service::RuleService;
pub use storage::{
    DebouncedSaver, InMemorySettingsStore, JsonFileSettingsStore, SettingsStore, StorageError,
};
pub use watch::{
    AutomationEvent, ChatBuffer, ChatMessage, GenerationFlag, GenerationState, Match,
    MessageBuffer, MessageEntry, NotificationStream, StreamWatcher, Transition, WatcherHandle,
};
