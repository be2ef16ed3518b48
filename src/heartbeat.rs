//! Periodic keep-alives for the control and voice gateways.

use crate::ws::WsSender;
use serde::Serialize;
use std::time::Duration;
use tokio::{
    select,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

/// Shaves a safety margin off a server-provided heartbeat interval.
///
/// A delivered interval `i` (in milliseconds) beats every `i - i / divisor` milliseconds,
/// using integer arithmetic. A divisor of zero applies no margin.
#[must_use]
pub fn effective_interval(interval_ms: u64, divisor: u64) -> Duration {
    let margin = interval_ms.checked_div(divisor).unwrap_or(0);
    Duration::from_millis(interval_ms - margin)
}

/// Handle to a running heartbeat task bound to one socket writer.
///
/// Dropping the handle does not stop the task: call [`Heartbeat::stop`] or cancel the
/// token it was started with.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawns a task which writes `builder(seq)` every effective interval.
    ///
    /// `seq` starts at 0 and increments by one per beat. The first beat is sent one
    /// period after starting. A failed write ends the task without retrying.
    pub(crate) fn start<F, C>(
        sender: WsSender,
        interval_ms: u64,
        divisor: u64,
        builder: F,
        cancel: CancellationToken,
    ) -> Self
    where
        F: FnMut(u64) -> C + Send + 'static,
        C: Serialize + Send + Sync + 'static,
    {
        let period = effective_interval(interval_ms, divisor);
        let handle = tokio::spawn(run(sender, period, builder, cancel.clone()));

        Self { cancel, handle }
    }

    /// Cancels the heartbeat. Any beat in flight is allowed to finish its write.
    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the heartbeat task to exit.
    pub(crate) async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!("Heartbeat task panicked: {e}");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[instrument(skip(sender, builder, cancel))]
async fn run<F, C>(sender: WsSender, period: Duration, mut builder: F, cancel: CancellationToken)
where
    F: FnMut(u64) -> C,
    C: Serialize,
{
    let mut next_beat = Instant::now() + period;
    let mut seq = 0;

    loop {
        select! {
            () = cancel.cancelled() => {
                trace!("Heartbeat cancelled.");
                break;
            },
            () = sleep_until(next_beat) => {
                if let Err(e) = sender.send_json(&builder(seq)).await {
                    warn!("Heartbeat failed, stopping: {e}");
                    break;
                }

                trace!("Sent heartbeat {seq}.");
                seq += 1;
                next_beat = Instant::now() + period;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{GatewayCommand, VoiceCommand},
        ws::test_utils::pair,
    };
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn margins_match_gateway_divisors() {
        assert_eq!(effective_interval(41250, 20), Duration::from_millis(39188));
        assert_eq!(effective_interval(41250, 10), Duration::from_millis(37125));
        assert_eq!(effective_interval(100, 0), Duration::from_millis(100));
    }

    async fn next_json(server: &mut crate::ws::test_utils::ServerStream) -> Value {
        loop {
            match server.next().await.unwrap().unwrap() {
                Message::Text(t) => return serde_json::from_str(&t).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn voice_beats_count_up_from_zero() {
        let (client, mut server) = pair().await;
        let (_rx, tx) = client.split();

        let hb = Heartbeat::start(tx, 20, 10, VoiceCommand::Heartbeat, CancellationToken::new());

        assert_eq!(next_json(&mut server).await, json!({"op": 3, "d": 0}));
        assert_eq!(next_json(&mut server).await, json!({"op": 3, "d": 1}));

        hb.stop();
    }

    #[tokio::test]
    async fn control_beats_carry_null() {
        let (client, mut server) = pair().await;
        let (_rx, tx) = client.split();

        let hb = Heartbeat::start(
            tx,
            20,
            20,
            |_| GatewayCommand::Heartbeat(None),
            CancellationToken::new(),
        );

        assert_eq!(next_json(&mut server).await, json!({"op": 1, "d": null}));

        hb.stop();
    }

    #[tokio::test]
    async fn cancellation_ends_the_task() {
        let (client, _server) = pair().await;
        let (_rx, tx) = client.split();
        let token = CancellationToken::new();

        let hb = Heartbeat::start(tx, 60_000, 10, VoiceCommand::Heartbeat, token.clone());
        token.cancel();

        for _ in 0..50 {
            if hb.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("heartbeat task outlived its cancellation");
    }
}
