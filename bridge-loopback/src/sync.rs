//! Collecting sync-event sink.

use bridge_traits::{Result, SyncEventSink};
use parking_lot::Mutex;

/// Keeps every published sync-event line in order.
#[derive(Debug, Default)]
pub struct CollectingSyncSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSyncSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines starting with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

impl SyncEventSink for CollectingSyncSink {
    fn publish(&self, line: &str) -> Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_order() {
        let sink = CollectingSyncSink::new();
        sink.publish("AUDIO_START:0x0").unwrap();
        sink.publish("AUDIO_PAUSE").unwrap();
        sink.publish("AUDIO_START:0x10").unwrap();

        assert_eq!(sink.lines().len(), 3);
        assert_eq!(sink.count_prefix("AUDIO_START"), 2);
    }
}
