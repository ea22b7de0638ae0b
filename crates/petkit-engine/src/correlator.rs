//! Request/response correlation.
//!
//! Responses carry no request id, only the command code they answer, so the
//! correlator keeps at most one wait slot per expected response code. A
//! notification resolves the slot for its code; anything else is treated as
//! an unsolicited push and folded into a snapshot the next fetch picks up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use petkit_metrics::{metric_defs, DeviceLabels};
use petkit_protocol::{build_frame, decode_response, parse_frame, Request, Telemetry, FRAME_TYPE_DEFAULT};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::RetryPolicy;
use crate::error::{CorrelationError, CorrelationResult, TransportError};
use crate::transport::{EventCallback, Link, TransportEvent};

type Reply = CorrelationResult<Vec<u8>>;

/// One request and the response it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub command: u8,
    pub frame_type: u8,
    pub payload: Vec<u8>,
    /// Response code that completes the exchange.
    pub expected_response: u8,
    pub timeout: Duration,
}

impl Exchange {
    pub fn new(command: u8, payload: Vec<u8>, expected_response: u8, timeout: Duration) -> Self {
        Exchange {
            command,
            frame_type: FRAME_TYPE_DEFAULT,
            payload,
            expected_response,
            timeout,
        }
    }

    /// Exchange for a protocol request. Requests the device never answers
    /// are keyed on their own code and will time out.
    pub fn for_request(request: &Request, timeout: Duration) -> Self {
        Exchange::new(
            request.code(),
            request.encode_payload(),
            request.response_code().unwrap_or_else(|| request.code()),
            timeout,
        )
    }
}

struct Slot {
    id: u64,
    sender: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct PendingTable {
    next_id: u64,
    slots: HashMap<u8, Slot>,
}

struct Shared {
    name: String,
    labels: DeviceLabels,
    /// Held across a write so sequence numbers go out in order.
    sequence: tokio::sync::Mutex<u8>,
    pending: Mutex<PendingTable>,
    unsolicited: Mutex<Telemetry>,
    closed: AtomicBool,
}

/// Removes its slot on drop unless the slot was already replaced or consumed.
struct SlotGuard<'a> {
    pending: &'a Mutex<PendingTable>,
    code: u8,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.pending.lock();
        if table.slots.get(&self.code).is_some_and(|s| s.id == self.id) {
            table.slots.remove(&self.code);
        }
    }
}

/// Per-connection correlator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Correlator {
    shared: Arc<Shared>,
}

impl Correlator {
    pub fn new(name: impl Into<String>, labels: DeviceLabels) -> Self {
        Correlator {
            shared: Arc::new(Shared {
                name: name.into(),
                labels,
                sequence: tokio::sync::Mutex::new(0),
                pending: Mutex::new(PendingTable::default()),
                unsolicited: Mutex::new(Telemetry::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Sequence number the next frame will carry.
    pub async fn sequence(&self) -> u8 {
        *self.shared.sequence.lock().await
    }

    pub fn labels(&self) -> &DeviceLabels {
        &self.shared.labels
    }

    /// True once the link has been reported lost.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of outstanding wait slots.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().slots.len()
    }

    /// True if a wait slot exists for this response code.
    pub fn is_pending(&self, response_code: u8) -> bool {
        self.shared.pending.lock().slots.contains_key(&response_code)
    }

    /// Take everything pushed by the device since the last call.
    pub fn take_unsolicited(&self) -> Telemetry {
        std::mem::take(&mut *self.shared.unsolicited.lock())
    }

    /// Callback to hand to [`Transport::subscribe_notifications`](crate::Transport::subscribe_notifications).
    pub fn event_callback(&self) -> EventCallback {
        let correlator = self.clone();
        Arc::new(move |event| correlator.on_event(event))
    }

    pub fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Notification(data) => self.on_notification(&data),
            TransportEvent::Disconnected => self.on_disconnect(),
        }
    }

    /// Route one notification to its waiter, or to the unsolicited snapshot.
    pub fn on_notification(&self, data: &[u8]) {
        let name = &self.shared.name;
        let frame = match parse_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("{}: dropping notification {}: {}", name, hex::encode(data), e);
                metrics::counter!(
                    metric_defs::FRAMES_DROPPED.name,
                    &self.shared.labels.with(&[("reason", e.reason().to_string())])
                )
                .increment(1);
                return;
            }
        };

        trace!(
            "{}: <- cmd {} seq {} payload {}",
            name,
            frame.command,
            frame.sequence,
            hex::encode(&frame.payload)
        );
        metrics::counter!(
            metric_defs::FRAMES_RECEIVED.name,
            &self.shared.labels.with_command(frame.command)
        )
        .increment(1);

        let slot = self.shared.pending.lock().slots.remove(&frame.command);
        let payload = match slot {
            Some(slot) => match slot.sender.send(Ok(frame.payload)) {
                Ok(()) => return,
                // Waiter already gone
                Err(Ok(payload)) => payload,
                Err(Err(_)) => return,
            },
            None => frame.payload,
        };
        self.handle_unsolicited(frame.command, &payload);
    }

    fn handle_unsolicited(&self, command: u8, payload: &[u8]) {
        metrics::counter!(
            metric_defs::FRAMES_UNSOLICITED.name,
            &self.shared.labels.with_command(command)
        )
        .increment(1);

        match decode_response(command, payload) {
            Some(update) if !update.is_empty() => {
                debug!(
                    "{}: unsolicited response {} carried {} fields",
                    self.shared.name,
                    command,
                    update.field_count()
                );
                self.shared.unsolicited.lock().merge(update);
            }
            _ => trace!(
                "{}: ignoring unsolicited response {} ({} bytes)",
                self.shared.name,
                command,
                payload.len()
            ),
        }
    }

    /// Mark the link lost and fail every outstanding wait.
    pub fn on_disconnect(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Slot> = self
            .shared
            .pending
            .lock()
            .slots
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        warn!(
            "{}: link lost with {} requests outstanding",
            self.shared.name,
            drained.len()
        );
        for slot in drained {
            let _ = slot.sender.send(Err(CorrelationError::Disconnected));
            metrics::counter!(
                metric_defs::COMMAND_DISCONNECTED.name,
                &self.shared.labels.to_labels()
            )
            .increment(1);
        }
    }

    fn register(&self, code: u8) -> CorrelationResult<(SlotGuard<'_>, oneshot::Receiver<Reply>)> {
        let mut table = self.shared.pending.lock();
        if self.is_closed() {
            return Err(TransportError::NotConnected.into());
        }
        if let Some(existing) = table.slots.get(&code) {
            if !existing.sender.is_closed() {
                return Err(CorrelationError::AlreadyPending(code));
            }
        }

        let id = table.next_id;
        table.next_id += 1;
        let (sender, receiver) = oneshot::channel();
        table.slots.insert(code, Slot { id, sender });

        let guard = SlotGuard {
            pending: &self.shared.pending,
            code,
            id,
        };
        Ok((guard, receiver))
    }

    async fn write_frame(
        &self,
        link: &Link,
        command: u8,
        frame_type: u8,
        payload: &[u8],
    ) -> CorrelationResult<u8> {
        let mut sequence = self.shared.sequence.lock().await;
        if self.is_closed() {
            return Err(TransportError::NotConnected.into());
        }

        let current = *sequence;
        let bytes = build_frame(current, command, frame_type, payload);
        trace!(
            "{}: -> cmd {} seq {} {}",
            self.shared.name,
            command,
            current,
            hex::encode(&bytes)
        );
        link.write(&bytes).await?;
        *sequence = current.wrapping_add(1);

        metrics::counter!(
            metric_defs::FRAMES_SENT.name,
            &self.shared.labels.with_command(command)
        )
        .increment(1);
        Ok(current)
    }

    /// Write a frame that expects no response.
    pub async fn send(
        &self,
        link: &Link,
        command: u8,
        frame_type: u8,
        payload: &[u8],
    ) -> CorrelationResult<()> {
        self.write_frame(link, command, frame_type, payload)
            .await
            .map(|_| ())
    }

    /// Write a frame and wait for the matching response.
    ///
    /// The wait slot is gone by the time this returns, on every path.
    pub async fn send_and_await(&self, link: &Link, exchange: &Exchange) -> CorrelationResult<Vec<u8>> {
        let (guard, receiver) = self.register(exchange.expected_response)?;
        let started = Instant::now();
        self.write_frame(link, exchange.command, exchange.frame_type, &exchange.payload)
            .await?;

        let outcome = tokio::time::timeout(exchange.timeout, receiver).await;
        drop(guard);

        match outcome {
            Ok(Ok(reply)) => {
                if reply.is_ok() {
                    metrics::histogram!(
                        metric_defs::COMMAND_ROUND_TRIP.name,
                        &self.shared.labels.with_command(exchange.command)
                    )
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                }
                reply
            }
            Ok(Err(_)) => Err(CorrelationError::Disconnected),
            Err(_) => {
                debug!(
                    "{}: no response {} to command {} within {:?}",
                    self.shared.name, exchange.expected_response, exchange.command, exchange.timeout
                );
                metrics::counter!(
                    metric_defs::COMMAND_TIMEOUTS.name,
                    &self.shared.labels.with_command(exchange.command)
                )
                .increment(1);
                Err(CorrelationError::Timeout {
                    command: exchange.command,
                    expected: exchange.expected_response,
                    timeout: exchange.timeout,
                })
            }
        }
    }

    /// [`send_and_await`](Self::send_and_await), repeated on timeouts and
    /// failed writes. A lost link is returned immediately.
    pub async fn send_with_retry(
        &self,
        link: &Link,
        exchange: &Exchange,
        policy: RetryPolicy,
    ) -> CorrelationResult<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match self.send_and_await(link, exchange).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_retryable() && attempt < policy.attempts() => {
                    warn!(
                        "{}: command {} attempt {}/{} failed: {}",
                        self.shared.name,
                        exchange.command,
                        attempt,
                        policy.attempts(),
                        e
                    );
                    metrics::counter!(
                        metric_defs::COMMAND_RETRIES.name,
                        &self.shared.labels.with_command(exchange.command)
                    )
                    .increment(1);
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("name", &self.shared.name)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
