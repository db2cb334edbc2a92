//! 定长事件环形缓冲区

use std::collections::VecDeque;

use super::LogEvent;

/// 只保留最近 `capacity` 个事件，满时丢弃最旧的
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<LogEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut buffer = EventBuffer::new(3);
        for i in 0..5 {
            buffer.push(LogEvent::message(format!("line {}", i)));
        }

        let texts: Vec<String> = buffer.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(buffer.len(), buffer.capacity());
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut buffer = EventBuffer::new(0);
        buffer.push(LogEvent::message("a"));
        buffer.push(LogEvent::message("b"));
        assert_eq!(buffer.snapshot()[0].text, "b");
    }
}
