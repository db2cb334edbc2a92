//! Event Stream - 自愈的运行日志通道
//!
//! 状态机: connecting → connected → (disconnected → reconnecting → connecting)*
//! 只有显式 stop 才会停在 disconnected。连接断开期间服务端产生的事件会丢失。

use futures_util::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::EventTransportPort;

use super::{ConnectionStatus, EventBuffer, LogEvent};

/// EventStream 配置
#[derive(Debug, Clone)]
pub struct EventStreamConfig {
    /// 本地保留的最大事件数
    pub buffer_capacity: usize,
    /// 首次重连延迟
    pub initial_delay: Duration,
    /// 重连延迟上限
    pub max_delay: Duration,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

/// 第 `attempt` 次重连前的等待时间: min(initial * 2^attempt, max)
pub fn reconnect_delay(attempt: u32, config: &EventStreamConfig) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    config
        .initial_delay
        .checked_mul(factor)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// 连接循环与调用方共享的状态
struct Shared {
    buffer: Mutex<EventBuffer>,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: broadcast::Sender<LogEvent>,
    attempt: AtomicU32,
    /// 连接循环当前等待中的会话或退避；只有存在时手动重连才生效
    interruptible: Mutex<Option<CancellationToken>>,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, EventBuffer> {
        // 缓冲区只做 push/clone，毒化后数据仍然可用
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LogEvent) {
        self.buffer().push(event.clone());
        // 没有订阅者时发送失败是正常的
        let _ = self.events_tx.send(event);
    }

    /// 登记一段可被手动重连打断的等待
    fn begin_interruptible(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        *self.interruptible_slot() = Some(token.clone());
        token
    }

    fn end_interruptible(&self) {
        self.interruptible_slot().take();
    }

    /// 打断当前等待；循环未在等待时返回 false
    fn interrupt(&self) -> bool {
        match self.interruptible_slot().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn interruptible_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.interruptible.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Event stream status changed");
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 会话结束原因
enum SessionEnd {
    Closed,
    Manual,
    Stopped,
}

/// 运行日志事件流
pub struct EventStream {
    transport: Arc<dyn EventTransportPort>,
    config: EventStreamConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl EventStream {
    pub fn new(transport: Arc<dyn EventTransportPort>, config: EventStreamConfig) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(config.buffer_capacity.max(1));

        let shared = Arc::new(Shared {
            buffer: Mutex::new(EventBuffer::new(config.buffer_capacity)),
            status_tx,
            events_tx,
            attempt: AtomicU32::new(0),
            interruptible: Mutex::new(None),
        });

        Self {
            transport,
            config,
            shared,
            running: Mutex::new(None),
        }
    }

    /// 启动连接循环；已在运行时无操作
    pub fn connect(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            tracing::debug!("Event stream already running");
            return;
        }

        let cancel = CancellationToken::new();
        self.shared.attempt.store(0, Ordering::SeqCst);
        self.shared.set_status(ConnectionStatus::Connecting);

        let handle = tokio::spawn(run_loop(
            self.transport.clone(),
            self.config.clone(),
            self.shared.clone(),
            cancel.clone(),
        ));

        *running = Some(Running { cancel, handle });
        tracing::info!("Event stream started");
    }

    /// 立即重连，并把重连计数归零
    ///
    /// 只打断已建立的会话或等待中的退避；未运行或正在建立连接时只归零计数
    pub fn reconnect(&self) {
        self.shared.attempt.store(0, Ordering::SeqCst);
        let interrupted = self.shared.interrupt();
        tracing::info!(interrupted, "Manual event stream reconnect requested");
    }

    /// 停止：取消等待中的重连、关闭连接；之后不再产生事件
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                tracing::warn!(error = %e, "Event stream loop ended abnormally");
            }
            tracing::info!("Event stream stopped");
        }
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// 当前缓冲区内容（从旧到新）
    pub fn events(&self) -> Vec<LogEvent> {
        self.shared.buffer().snapshot()
    }

    /// 订阅实时事件；处理过慢的订阅者会丢失事件
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.shared.events_tx.subscribe()
    }

    /// 当前重连计数
    pub fn attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(running) = self
            .running
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(
    transport: Arc<dyn EventTransportPort>,
    config: EventStreamConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        shared.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            connected = transport.connect() => connected,
        };

        match connected {
            Ok(mut frames) => {
                let session = shared.begin_interruptible(&cancel);
                shared.set_status(ConnectionStatus::Connected);
                shared.attempt.store(0, Ordering::SeqCst);
                shared.emit(LogEvent::connected());
                tracing::info!("Event stream connected");

                let end = loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break SessionEnd::Stopped,
                        _ = session.cancelled() => break SessionEnd::Manual,
                        frame = frames.next() => match frame {
                            Some(Ok(text)) => {
                                for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
                                    shared.emit(LogEvent::message(line));
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Event stream transport error");
                                shared.emit(LogEvent::error(&e));
                            }
                            None => break SessionEnd::Closed,
                        },
                    }
                };
                shared.end_interruptible();
                drop(frames);

                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::Manual => {
                        shared.set_status(ConnectionStatus::Disconnected);
                        continue;
                    }
                    SessionEnd::Closed => {
                        tracing::warn!("Event stream connection closed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Event stream connect failed");
                shared.emit(LogEvent::error(&e));
            }
        }

        shared.set_status(ConnectionStatus::Disconnected);
        shared.set_status(ConnectionStatus::Reconnecting);

        let attempt = shared.attempt.fetch_add(1, Ordering::SeqCst);
        let delay = reconnect_delay(attempt, &config);
        let backoff = shared.begin_interruptible(&cancel);
        shared.emit(LogEvent::reconnecting(delay));
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Event stream reconnect scheduled"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = backoff.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        shared.end_interruptible();
    }

    shared.set_status(ConnectionStatus::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{EventFrames, EventTransportError};
    use crate::infrastructure::events::LogEventKind;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    enum Session {
        Refuse(&'static str),
        Frames {
            frames: Vec<Result<&'static str, &'static str>>,
            stay_open: bool,
        },
    }

    /// 按脚本返回连接；脚本用完后保持一个永不结束的空连接
    struct ScriptedTransport {
        sessions: Mutex<VecDeque<Session>>,
        connects: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(sessions: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions.into()),
                connects: AtomicUsize::new(0),
            })
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventTransportPort for ScriptedTransport {
        async fn connect(&self) -> Result<EventFrames, EventTransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let session = self.sessions.lock().unwrap().pop_front();

            match session {
                None => Ok(stream::pending().boxed()),
                Some(Session::Refuse(message)) => {
                    Err(EventTransportError::ConnectFailed(message.to_string()))
                }
                Some(Session::Frames { frames, stay_open }) => {
                    let items = stream::iter(frames.into_iter().map(|f| {
                        f.map(str::to_string)
                            .map_err(|e| EventTransportError::ReceiveError(e.to_string()))
                    }));
                    if stay_open {
                        Ok(items.chain(stream::pending()).boxed())
                    } else {
                        Ok(items.boxed())
                    }
                }
            }
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<LogEvent>) -> LogEvent {
        rx.recv().await.expect("event stream closed")
    }

    fn messages(events: &[LogEvent]) -> Vec<String> {
        events
            .iter()
            .filter(|e| e.is_message())
            .map(|e| e.text.clone())
            .collect()
    }

    #[test]
    fn test_backoff_sequence() {
        let config = EventStreamConfig::default();
        let delays: Vec<u128> = (0..=7)
            .map(|attempt| reconnect_delay(attempt, &config).as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(reconnect_delay(64, &config), Duration::from_millis(30000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_and_keeps_buffer() {
        let transport = ScriptedTransport::new(vec![
            Session::Frames {
                frames: vec![Ok("e1"), Ok("e2"), Ok("e3"), Ok("e4"), Ok("e5")],
                stay_open: false,
            },
            Session::Frames {
                frames: vec![Ok("e6"), Ok("e7")],
                stay_open: true,
            },
        ]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        let mut rx = events.subscribe();
        events.connect();

        let mut received = Vec::new();
        for _ in 0..10 {
            received.push(next_event(&mut rx).await);
        }

        let kinds: Vec<LogEventKind> = received.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(kinds[0], LogEventKind::Connected);
        assert_eq!(kinds[6], LogEventKind::Reconnecting { delay_ms: 1000 });
        assert_eq!(received[6].text, "reconnecting in 1s");
        assert_eq!(kinds[7], LogEventKind::Connected);

        assert_eq!(
            messages(&events.events()),
            vec!["e1", "e2", "e3", "e4", "e5", "e6", "e7"]
        );
        assert_eq!(events.status(), ConnectionStatus::Connected);
        assert_eq!(events.attempt(), 0);
        assert_eq!(transport.connects(), 2);

        events.stop().await;
        assert_eq!(events.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_until_connected() {
        let transport = ScriptedTransport::new(vec![
            Session::Refuse("refused"),
            Session::Refuse("refused"),
            Session::Refuse("refused"),
        ]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        let mut rx = events.subscribe();
        events.connect();

        let mut delays = Vec::new();
        loop {
            let event = next_event(&mut rx).await;
            match event.kind {
                LogEventKind::Reconnecting { delay_ms } => delays.push(delay_ms),
                LogEventKind::Error => assert_eq!(event.text, "connection error: Connect failed: refused"),
                LogEventKind::Connected => break,
                LogEventKind::Message => panic!("unexpected message"),
            }
        }

        assert_eq!(delays, vec![1000, 2000, 4000]);
        assert_eq!(events.attempt(), 0);
        assert_eq!(transport.connects(), 4);
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_does_not_end_session() {
        let transport = ScriptedTransport::new(vec![Session::Frames {
            frames: vec![Ok("before"), Err("bad frame"), Ok("after")],
            stay_open: true,
        }]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        let mut rx = events.subscribe();
        events.connect();

        let received: Vec<LogEvent> = {
            let mut v = Vec::new();
            for _ in 0..4 {
                v.push(next_event(&mut rx).await);
            }
            v
        };

        assert_eq!(received[2].kind, LogEventKind::Error);
        assert_eq!(received[3].text, "after");
        assert_eq!(events.status(), ConnectionStatus::Connected);
        assert_eq!(transport.connects(), 1);
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_splits_newline_delimited_frames() {
        let transport = ScriptedTransport::new(vec![Session::Frames {
            frames: vec![Ok("a\nb\n\nc\r\n")],
            stay_open: true,
        }]);
        let events = EventStream::new(transport, EventStreamConfig::default());
        events.connect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(messages(&events.events()), vec!["a", "b", "c"]);
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_is_bounded() {
        let frames: Vec<Result<&'static str, &'static str>> = vec![Ok("x"); 20];
        let transport = ScriptedTransport::new(vec![Session::Frames {
            frames,
            stay_open: true,
        }]);
        let config = EventStreamConfig {
            buffer_capacity: 5,
            ..Default::default()
        };
        let events = EventStream::new(transport, config);
        events.connect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let buffered = events.events();
        assert_eq!(buffered.len(), 5);
        assert!(buffered.iter().all(|e| e.is_message()));
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![Session::Refuse("down")]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        let mut rx = events.subscribe();
        events.connect();

        loop {
            if let LogEventKind::Reconnecting { .. } = next_event(&mut rx).await.kind {
                break;
            }
        }
        assert_eq!(events.status(), ConnectionStatus::Reconnecting);

        events.stop().await;
        assert_eq!(events.status(), ConnectionStatus::Disconnected);
        assert!(!events.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connects(), 1);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_before_connect_keeps_first_session() {
        let transport = ScriptedTransport::new(vec![Session::Frames {
            frames: vec![Ok("hello")],
            stay_open: true,
        }]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());

        events.reconnect();
        events.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.connects(), 1);
        assert_eq!(messages(&events.events()), vec!["hello"]);
        assert_eq!(events.status(), ConnectionStatus::Connected);

        events.stop().await;
        events.reconnect();
        events.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.connects(), 2);
        assert_eq!(events.status(), ConnectionStatus::Connected);
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_ends_live_session() {
        let transport = ScriptedTransport::new(vec![Session::Frames {
            frames: vec![Ok("first")],
            stay_open: true,
        }]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        events.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.connects(), 1);

        events.reconnect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.connects(), 2);
        assert_eq!(events.status(), ConnectionStatus::Connected);
        assert_eq!(messages(&events.events()), vec!["first"]);
        events.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_resets_attempt() {
        let transport = ScriptedTransport::new(vec![
            Session::Refuse("down"),
            Session::Refuse("down"),
            Session::Refuse("down"),
        ]);
        let events = EventStream::new(transport.clone(), EventStreamConfig::default());
        let mut rx = events.subscribe();
        events.connect();

        let mut delays = Vec::new();
        while delays.len() < 2 {
            if let LogEventKind::Reconnecting { delay_ms } = next_event(&mut rx).await.kind {
                delays.push(delay_ms);
            }
        }
        assert_eq!(delays, vec![1000, 2000]);

        let before = tokio::time::Instant::now();
        events.reconnect();

        loop {
            if let LogEventKind::Reconnecting { delay_ms } = next_event(&mut rx).await.kind {
                delays.push(delay_ms);
                break;
            }
        }
        assert_eq!(delays[2], 1000);
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(transport.connects(), 3);
        events.stop().await;
    }
}
