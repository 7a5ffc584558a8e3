#![allow(dead_code)]

pub use warden_test_utils::builders;
pub use warden_test_utils::recording_terminator;
pub use warden_test_utils::scripts;
pub use warden_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use warden::process::ProcessEvent;

/// Drain events until `pred` matches, returning everything seen so far.
///
/// Panics after five seconds without a match.
pub async fn collect_until<F>(rx: &mut broadcast::Receiver<ProcessEvent>, mut pred: F) -> Vec<ProcessEvent>
where
    F: FnMut(&ProcessEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for process event")
            .expect("event channel closed");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}
