use huddle_client::CallManager;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every call event of one manager, flattened to strings in arrival order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn attach(manager: &CallManager) -> Self {
        let log = Self::default();

        let l = log.clone();
        manager.on_participant_joined(move |user| l.push(format!("joined:{user}")));
        let l = log.clone();
        manager.on_participant_left(move |user| l.push(format!("left:{user}")));
        let l = log.clone();
        manager.on_stream_added(move |added| {
            l.push(format!("stream:{}:{}", added.user_id, added.stream.id))
        });
        let l = log.clone();
        manager.on_stream_removed(move |user| l.push(format!("removed:{user}")));
        let l = log.clone();
        manager.on_call_ended(move |ended| l.push(format!("ended:{:?}", ended.reason)));
        let l = log.clone();
        manager.on_screen_sharing_changed(move |sharing| l.push(format!("screen:{sharing}")));

        log
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Wait up to five seconds for an event starting with `prefix`.
    pub async fn wait_for(&self, prefix: &str) -> bool {
        wait_until(|| self.count(prefix) > 0).await
    }
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
