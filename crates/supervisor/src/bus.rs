//! Command sources for the supervisor.

use crate::command::StreamCommand;
use crate::error::CommandError;
use async_trait::async_trait;
use redis::Commands;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// Where the supervisor's START/STOP commands come from.
#[async_trait]
pub trait CommandSource: Send {
    /// Next command. `None` once the source is exhausted.
    ///
    /// Must be cancel-safe: the supervisor drops this future when shutdown
    /// wins the race, and a command taken off the source by then must not be
    /// lost.
    async fn next(&mut self) -> Option<Result<StreamCommand, CommandError>>;

    /// Hand back anything taken off the source but not yet returned by
    /// [`next`](CommandSource::next). Called once, when the consumer stops.
    async fn release(&mut self) -> Result<(), CommandError> {
        Ok(())
    }
}

/// In-process command channel.
pub struct ChannelCommandBus {
    receiver: mpsc::Receiver<StreamCommand>,
}

impl ChannelCommandBus {
    pub fn new(capacity: usize) -> (mpsc::Sender<StreamCommand>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

#[async_trait]
impl CommandSource for ChannelCommandBus {
    async fn next(&mut self) -> Option<Result<StreamCommand, CommandError>> {
        self.receiver.recv().await.map(Ok)
    }
}

/// A blocking-pool task whose result survives the future waiting on it.
///
/// If the future returned by [`wait`](InFlight::wait) is dropped, the task
/// stays here; the next `wait` or [`settle`](InFlight::settle) collects its
/// result instead of starting a new one.
struct InFlight<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> InFlight<T> {
    fn new() -> Self {
        Self { handle: None }
    }

    async fn wait(&mut self, start: impl FnOnce() -> JoinHandle<T>) -> Result<T, JoinError> {
        let handle = self.handle.get_or_insert_with(start);
        let joined = handle.await;
        self.handle = None;
        joined
    }

    /// Result of a task left running by a dropped `wait`, if any.
    async fn settle(&mut self) -> Option<Result<T, JoinError>> {
        let handle = self.handle.take()?;
        Some(handle.await)
    }
}

/// A `BLPOP` result, plus the connection to reuse when it is still healthy.
type Popped = (Option<redis::Connection>, Result<Option<String>, CommandError>);

fn blpop(
    client: &redis::Client,
    conn: Option<redis::Connection>,
    queue: &str,
    timeout_secs: u64,
) -> Popped {
    let mut conn = match conn {
        Some(conn) => conn,
        None => match client.get_connection() {
            Ok(conn) => conn,
            Err(e) => return (None, Err(e.into())),
        },
    };
    let popped: Result<Option<(String, String)>, _> = redis::cmd("BLPOP")
        .arg(queue)
        .arg(timeout_secs)
        .query(&mut conn);
    match popped {
        Ok(popped) => (Some(conn), Ok(popped.map(|(_, payload)| payload))),
        Err(e) => (None, Err(e.into())),
    }
}

/// Commands queued on a Redis list as JSON.
///
/// Consumers pop with `BLPOP`; publishers append with `RPUSH`. The blocking
/// pop runs on the blocking pool and wakes every `poll_timeout`. One
/// connection is kept across polls and dropped after any error.
///
/// A pop still in flight when the consumer stops is collected by
/// [`release`](CommandSource::release) and its payload pushed back to the
/// head of the list, so every command is delivered at least once.
pub struct RedisCommandQueue {
    client: redis::Client,
    queue: String,
    poll_timeout: Duration,
    conn: Option<redis::Connection>,
    in_flight: InFlight<Popped>,
}

impl RedisCommandQueue {
    pub fn new(redis_url: &str, queue: impl Into<String>) -> Result<Self, CommandError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            queue: queue.into(),
            poll_timeout: Duration::from_secs(5),
            conn: None,
            in_flight: InFlight::new(),
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn publish(&self, command: &StreamCommand) -> Result<(), CommandError> {
        let client = self.client.clone();
        let queue = self.queue.clone();
        let payload = command.to_json();
        tokio::task::spawn_blocking(move || -> Result<(), CommandError> {
            let mut conn = client.get_connection()?;
            let _: i64 = conn.rpush(&queue, &payload)?;
            Ok(())
        })
        .await
        .map_err(|e| CommandError::Join(e.to_string()))?
    }

    /// One `BLPOP` round, or the result of the round a dropped `next` left
    /// running. `None` on timeout.
    async fn pop(&mut self) -> Result<Option<String>, CommandError> {
        let client = self.client.clone();
        let queue = self.queue.clone();
        let timeout_secs = self.poll_timeout.as_secs().max(1);
        let conn = self.conn.take();
        let (conn, popped) = self
            .in_flight
            .wait(move || {
                tokio::task::spawn_blocking(move || blpop(&client, conn, &queue, timeout_secs))
            })
            .await
            .map_err(|e| CommandError::Join(e.to_string()))?;
        self.conn = conn;
        popped
    }

    /// Put an unhandled payload back at the head of the list.
    async fn requeue(&mut self, payload: String) -> Result<(), CommandError> {
        let client = self.client.clone();
        let queue = self.queue.clone();
        let conn = self.conn.take();
        let returned = payload.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<redis::Connection, CommandError> {
            let mut conn = match conn {
                Some(conn) => conn,
                None => client.get_connection()?,
            };
            let _: i64 = conn.lpush(&queue, &returned)?;
            Ok(conn)
        })
        .await
        .map_err(|e| CommandError::Join(e.to_string()))??;
        self.conn = Some(conn);
        warn!(queue = %self.queue, payload = %payload, "unhandled command returned to queue");
        Ok(())
    }
}

#[async_trait]
impl CommandSource for RedisCommandQueue {
    async fn next(&mut self) -> Option<Result<StreamCommand, CommandError>> {
        loop {
            match self.pop().await {
                Ok(Some(payload)) => {
                    debug!(queue = %self.queue, payload = %payload, "command received");
                    return Some(StreamCommand::from_json(&payload));
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn release(&mut self) -> Result<(), CommandError> {
        let Some(joined) = self.in_flight.settle().await else {
            return Ok(());
        };
        let (conn, popped) = joined.map_err(|e| CommandError::Join(e.to_string()))?;
        self.conn = conn;
        match popped? {
            Some(payload) => self.requeue(payload).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ConnectionId;

    #[tokio::test]
    async fn test_channel_bus_delivers_in_order_then_ends() {
        let (sender, mut bus) = ChannelCommandBus::new(4);
        sender.send(StreamCommand::start(ConnectionId(1))).await.unwrap();
        sender.send(StreamCommand::stop(ConnectionId(1))).await.unwrap();
        drop(sender);

        assert_eq!(bus.next().await.unwrap().unwrap(), StreamCommand::start(ConnectionId(1)));
        assert_eq!(bus.next().await.unwrap().unwrap(), StreamCommand::stop(ConnectionId(1)));
        assert!(bus.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_wait_keeps_task_result() {
        let mut in_flight = InFlight::new();
        let slow = || {
            tokio::task::spawn_blocking(|| {
                std::thread::sleep(Duration::from_millis(50));
                "START 1".to_string()
            })
        };

        let dropped = tokio::time::timeout(Duration::from_millis(5), in_flight.wait(slow)).await;
        assert!(dropped.is_err());

        let payload = in_flight.wait(|| unreachable!("task still in flight")).await.unwrap();
        assert_eq!(payload, "START 1");
        assert!(in_flight.settle().await.is_none());
    }

    #[tokio::test]
    async fn test_settle_collects_abandoned_task() {
        let mut in_flight = InFlight::new();
        let task = || {
            tokio::task::spawn_blocking(|| {
                std::thread::sleep(Duration::from_millis(50));
                Some("STOP 2".to_string())
            })
        };
        let dropped = tokio::time::timeout(Duration::from_millis(5), in_flight.wait(task)).await;
        assert!(dropped.is_err());

        let settled = in_flight.settle().await;
        assert!(matches!(settled, Some(Ok(Some(ref p))) if p == "STOP 2"));
        assert!(in_flight.settle().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_bus_release_is_a_no_op() {
        let (_sender, mut bus) = ChannelCommandBus::new(1);
        assert!(bus.release().await.is_ok());
    }

    #[test]
    fn test_redis_queue_rejects_bad_url() {
        assert!(matches!(
            RedisCommandQueue::new("not a url", "user_ds_cmd"),
            Err(CommandError::Redis(_))
        ));
    }
}
