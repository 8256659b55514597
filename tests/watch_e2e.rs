use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stream_regex::watch::buffer::same_entry;
use stream_regex::watch::{EntryRef, MessageBuffer};
use stream_regex::{
    ChatBuffer, ChatMessage, EngineConfig, GenerationFlag, GenerationState,
    InMemorySettingsStore, NotificationStream, StreamRegexEngine, StreamWatcher, Transition,
    WatcherConfig,
};

struct Harness {
    engine: StreamRegexEngine,
    flag: Arc<GenerationState>,
    chat: Arc<ChatBuffer>,
    events: NotificationStream,
}

impl Harness {
    fn new(commands: &[&str]) -> Self {
        let engine =
            StreamRegexEngine::new(EngineConfig::default(), Arc::new(InMemorySettingsStore::new()))
                .unwrap();
        for line in commands {
            engine.execute_line(line).unwrap();
        }
        let events = engine.subscribe();
        Self {
            engine,
            flag: Arc::new(GenerationState::new()),
            chat: Arc::new(ChatBuffer::new()),
            events,
        }
    }

    fn watcher(&self) -> StreamWatcher {
        self.engine.watcher(self.flag.clone(), self.chat.clone())
    }

    fn next_ids(&self) -> Option<Vec<String>> {
        self.events.try_recv().map(|event| {
            event
                .matches
                .iter()
                .map(|m| m.automation_id.to_string())
                .collect()
        })
    }
}

#[test]
fn newline_rule_fires_on_each_matching_write() {
    let h = Harness::new(&[r"/stream-regex-add id=nl regex=/\n/ automation=STOP"]);
    let mut watcher = h.watcher();
    h.chat.push("");

    h.flag.start();
    assert_eq!(watcher.poll_once(), Transition::Started { index: Some(0) });
    assert!(watcher.is_watching());

    h.chat.set_text(0, "Hello");
    assert_eq!(h.next_ids(), None);

    h.chat.set_text(0, "Hello\n");
    assert_eq!(h.next_ids(), Some(vec!["STOP".to_string()]));

    h.chat.set_text(0, "Hello\nworld");
    assert_eq!(h.next_ids(), Some(vec!["STOP".to_string()]));

    h.chat.set_text(0, "world");
    assert_eq!(h.next_ids(), None);
    assert_eq!(h.chat.text(0).as_deref(), Some("world"));
}

#[test]
fn matches_follow_rule_order_without_dedup() {
    let h = Harness::new(&[
        "add id=a regex=/l/ automation=A",
        r"add id=b regex=/\n/ automation=B",
        "add id=c regex=/O/i automation=A",
        "add id=d regex=/zzz/ automation=D",
    ]);
    let mut watcher = h.watcher();
    h.chat.push("");
    h.flag.start();
    watcher.poll_once();

    h.chat.set_text(0, "Hello\n");
    assert_eq!(
        h.next_ids(),
        Some(vec!["A".to_string(), "B".to_string(), "A".to_string()])
    );
}

#[test]
fn stop_restores_original_entry_and_ends_evaluation() {
    let h = Harness::new(&[r"add id=nl regex=/\n/ automation=STOP"]);
    let mut watcher = h.watcher();
    h.chat.push("");
    let original = h.chat.get(0).unwrap();

    h.flag.start();
    watcher.poll_once();
    assert!(!same_entry(&h.chat.get(0).unwrap(), &original));

    h.chat.set_text(0, "done\n");
    assert!(h.next_ids().is_some());

    h.flag.stop();
    assert_eq!(watcher.poll_once(), Transition::Stopped { restored: Some(0) });
    assert!(!watcher.is_watching());
    assert!(same_entry(&h.chat.get(0).unwrap(), &original));
    assert_eq!(h.chat.text(0).as_deref(), Some("done\n"));

    h.chat.set_text(0, "edited\n");
    assert_eq!(h.next_ids(), None);
    assert_eq!(watcher.poll_once(), Transition::Unchanged);
}

#[test]
fn growth_while_generating_retargets_to_new_last_entry() {
    let h = Harness::new(&[r"add id=nl regex=/\n/ automation=STOP"]);
    let mut watcher = h.watcher();
    h.chat.push("");
    let first = h.chat.get(0).unwrap();

    h.flag.start();
    watcher.poll_once();

    h.chat.push("");
    assert_eq!(
        watcher.poll_once(),
        Transition::Retargeted {
            from: Some(0),
            to: Some(1)
        }
    );
    assert_eq!(watcher.watched_index(), Some(1));
    assert!(same_entry(&h.chat.get(0).unwrap(), &first));

    h.chat.set_text(0, "old\n");
    assert_eq!(h.next_ids(), None);

    h.chat.set_text(1, "new\n");
    assert_eq!(h.next_ids(), Some(vec!["STOP".to_string()]));
}

#[test]
fn generation_over_empty_buffer_waits_for_first_entry() {
    let h = Harness::new(&["add id=x regex=/x/ automation=X"]);
    let mut watcher = h.watcher();

    h.flag.start();
    assert_eq!(watcher.poll_once(), Transition::Started { index: None });
    assert!(!watcher.is_watching());

    h.chat.push("");
    assert_eq!(
        watcher.poll_once(),
        Transition::Retargeted {
            from: None,
            to: Some(0)
        }
    );
    h.chat.set_text(0, "x");
    assert_eq!(h.next_ids(), Some(vec!["X".to_string()]));
}

#[test]
fn host_replacing_the_entry_makes_restore_a_no_op() {
    let h = Harness::new(&[r"add id=nl regex=/\n/ automation=STOP"]);
    let mut watcher = h.watcher();
    h.chat.push("");

    h.flag.start();
    watcher.poll_once();

    let fresh: EntryRef = Arc::new(ChatMessage::new("regenerated"));
    assert!(h.chat.replace(0, fresh.clone()));

    h.flag.stop();
    assert_eq!(watcher.poll_once(), Transition::Stopped { restored: None });
    assert!(same_entry(&h.chat.get(0).unwrap(), &fresh));
    assert_eq!(h.chat.text(0).as_deref(), Some("regenerated"));
}

#[test]
fn restore_finds_wrapper_after_earlier_entry_was_removed() {
    let h = Harness::new(&[]);
    let mut watcher = h.watcher();
    h.chat.push("dropped");
    h.chat.push("");
    let original = h.chat.get(1).unwrap();

    h.flag.start();
    watcher.poll_once();

    // Host deletes an earlier message; the wrapper shifts to slot 0.
    assert!(h.chat.remove(0).is_some());
    h.chat.push("next");

    h.flag.stop();
    assert_eq!(watcher.poll_once(), Transition::Stopped { restored: Some(0) });
    assert!(same_entry(&h.chat.get(0).unwrap(), &original));
}

#[test]
fn rule_added_mid_stream_applies_to_next_write() {
    let h = Harness::new(&[]);
    let mut watcher = h.watcher();
    h.chat.push("");
    h.flag.start();
    watcher.poll_once();

    h.chat.set_text(0, "abc");
    assert_eq!(h.next_ids(), None);

    h.engine
        .execute_line("add id=b regex=/b/ automation=SAW_B")
        .unwrap();
    h.chat.set_text(0, "abcd");
    assert_eq!(h.next_ids(), Some(vec!["SAW_B".to_string()]));
}

struct FlakyFlag {
    inner: Arc<GenerationState>,
    panic_next: AtomicBool,
}

impl GenerationFlag for FlakyFlag {
    fn is_generating(&self) -> bool {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("host flag unavailable");
        }
        self.inner.is_generating()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn spawned_watcher_survives_poll_panic_and_restores_on_stop() {
    let cfg = EngineConfig {
        watcher: WatcherConfig {
            poll_interval: Duration::from_millis(5),
        },
        ..EngineConfig::default()
    };
    let engine = StreamRegexEngine::new(cfg, Arc::new(InMemorySettingsStore::new())).unwrap();
    engine
        .execute_line(r"add id=nl regex=/\n/ automation=STOP")
        .unwrap();
    let events = engine.subscribe();

    let state = Arc::new(GenerationState::new());
    let flag = Arc::new(FlakyFlag {
        inner: state.clone(),
        panic_next: AtomicBool::new(true),
    });
    let chat = Arc::new(ChatBuffer::new());
    chat.push("");
    let original = chat.get(0).unwrap();

    let handle = engine.watch(flag.clone(), chat.clone()).unwrap();
    assert_eq!(handle.poll_interval(), Duration::from_millis(5));

    assert!(wait_until(|| !flag.panic_next.load(Ordering::SeqCst)));
    state.start();
    assert!(wait_until(|| !same_entry(&chat.get(0).unwrap(), &original)));
    assert!(!handle.is_finished());

    chat.set_text(0, "line\n");
    let event = events.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.matches[0].automation_id.as_str(), "STOP");

    handle.stop().unwrap();
    assert!(same_entry(&chat.get(0).unwrap(), &original));
    assert_eq!(chat.text(0).as_deref(), Some("line\n"));
}

#[test]
fn dropping_the_handle_stops_and_restores() {
    let cfg = EngineConfig {
        watcher: WatcherConfig {
            poll_interval: Duration::from_millis(5),
        },
        ..EngineConfig::default()
    };
    let engine = StreamRegexEngine::new(cfg, Arc::new(InMemorySettingsStore::new())).unwrap();
    engine
        .execute_line(r"add id=nl regex=/\n/ automation=STOP")
        .unwrap();
    let events = engine.subscribe();

    let flag = Arc::new(GenerationState::new());
    let chat = Arc::new(ChatBuffer::new());
    chat.push("");
    let original = chat.get(0).unwrap();

    let handle = engine.watch(flag.clone(), chat.clone()).unwrap();
    flag.start();
    assert!(wait_until(|| !same_entry(&chat.get(0).unwrap(), &original)));

    drop(handle);
    assert!(same_entry(&chat.get(0).unwrap(), &original));

    chat.set_text(0, "after\n");
    assert!(events.try_recv().is_none());
    assert_eq!(chat.text(0).as_deref(), Some("after\n"));
}

/// Buffer whose swaps start panicking on request, as a broken host would.
struct BrittleBuffer {
    inner: ChatBuffer,
    fail_swaps: AtomicBool,
}

impl MessageBuffer for BrittleBuffer {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Option<EntryRef> {
        self.inner.get(index)
    }

    fn compare_and_swap(&self, index: usize, current: &EntryRef, replacement: EntryRef) -> bool {
        if self.fail_swaps.load(Ordering::SeqCst) {
            panic!("host buffer rejected the swap");
        }
        self.inner.compare_and_swap(index, current, replacement)
    }
}

#[test]
fn panicking_restore_during_stop_is_contained() {
    let cfg = EngineConfig {
        watcher: WatcherConfig {
            poll_interval: Duration::from_millis(5),
        },
        ..EngineConfig::default()
    };
    let engine = StreamRegexEngine::new(cfg, Arc::new(InMemorySettingsStore::new())).unwrap();
    let flag = Arc::new(GenerationState::new());
    let chat = Arc::new(BrittleBuffer {
        inner: ChatBuffer::new(),
        fail_swaps: AtomicBool::new(false),
    });
    chat.inner.push("");
    let original = chat.get(0).unwrap();

    let handle = engine.watch(flag.clone(), chat.clone()).unwrap();
    flag.start();
    assert!(wait_until(|| !same_entry(&chat.get(0).unwrap(), &original)));

    chat.fail_swaps.store(true, Ordering::SeqCst);
    assert!(handle.stop().is_ok());
}
