//! Streaming destinations for set-returning routines.
//!
//! Rows are handed to the consumer through a rendezvous: [`SetofSender::send`]
//! returns only once the consumer has taken the element, so the producer is
//! never more than one row ahead of the consumer and elements arrive in row
//! order.
//!
//! A consumer that keeps its receiver alive but stops reading blocks the
//! producer for good. Cancel the channel's token, or drop the receiver, to
//! release it; the producer then fails with `PgProcError::Cancelled`.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use pgproc_core::{FromValue, PgProcError, Result, Row, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::binder::BindingPlan;
use crate::record::Record;

/// A sink receiving one scalar per row
#[async_trait]
pub trait ScalarSink: Send {
    async fn push(&mut self, value: &Value) -> Result<()>;
}

/// A sink receiving one record per row
#[async_trait]
pub trait RecordSink: Send {
    fn members(&self) -> &'static [&'static str];
    fn record_name(&self) -> &'static str;

    /// Build a fresh record from `row` and deliver it
    async fn push(&mut self, row: &Row, plan: &BindingPlan) -> Result<()>;
}

struct Handoff<T> {
    item: T,
    accepted: oneshot::Sender<()>,
}

/// Producer half of a setof channel
pub struct SetofSender<T> {
    tx: mpsc::Sender<Handoff<T>>,
    cancel: CancellationToken,
}

/// Consumer half of a setof channel
pub struct SetofReceiver<T> {
    rx: mpsc::Receiver<Handoff<T>>,
}

/// Create a rendezvous channel with its own cancellation token
pub fn setof_channel<T>() -> (SetofSender<T>, SetofReceiver<T>) {
    setof_channel_with_cancel(CancellationToken::new())
}

/// Create a rendezvous channel whose producer stops when `cancel` fires
pub fn setof_channel_with_cancel<T>(
    cancel: CancellationToken,
) -> (SetofSender<T>, SetofReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (SetofSender { tx, cancel }, SetofReceiver { rx })
}

impl<T: Send> SetofSender<T> {
    /// Hand `item` to the consumer and wait until it has been taken
    pub async fn send(&self, item: T) -> Result<()> {
        let (accepted, taken) = oneshot::channel();

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PgProcError::Cancelled),
            sent = self.tx.send(Handoff { item, accepted }) => {
                sent.map_err(|_| PgProcError::Cancelled)?;
            }
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PgProcError::Cancelled),
            ack = taken => ack.map_err(|_| PgProcError::Cancelled),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl<T> SetofReceiver<T> {
    /// Take the next element, releasing the producer. `None` once the
    /// producer is gone and nothing is pending.
    pub async fn recv(&mut self) -> Option<T> {
        let Handoff { item, accepted } = self.rx.recv().await?;
        // The producer may have been cancelled while waiting.
        let _ = accepted.send(());
        Some(item)
    }
}

#[async_trait]
impl<T: FromValue + Send + 'static> ScalarSink for SetofSender<T> {
    async fn push(&mut self, value: &Value) -> Result<()> {
        let item = T::from_value(value)?;
        self.send(item).await
    }
}

#[async_trait]
impl<R: Record> RecordSink for SetofSender<R> {
    fn members(&self) -> &'static [&'static str] {
        R::MEMBERS
    }

    fn record_name(&self) -> &'static str {
        R::record_name()
    }

    async fn push(&mut self, row: &Row, plan: &BindingPlan) -> Result<()> {
        let record = plan.build::<R>(row)?;
        self.send(record).await
    }
}

#[async_trait]
impl<T: FromValue + Send> ScalarSink for Vec<T> {
    async fn push(&mut self, value: &Value) -> Result<()> {
        Vec::push(self, T::from_value(value)?);
        Ok(())
    }
}

#[async_trait]
impl<R: Record> RecordSink for Vec<R> {
    fn members(&self) -> &'static [&'static str] {
        R::MEMBERS
    }

    fn record_name(&self) -> &'static str {
        R::record_name()
    }

    async fn push(&mut self, row: &Row, plan: &BindingPlan) -> Result<()> {
        let record = plan.build::<R>(row)?;
        Vec::push(self, record);
        Ok(())
    }
}

/// A set-returning call running in the background.
///
/// Elements arrive through [`next`](Self::next) in row order. The call's own
/// outcome (not found, a server exception, a bind error) is only known once
/// the set is drained: use [`finish`](Self::finish) or
/// [`collect`](Self::collect), or read the trailing error from
/// [`into_stream`](Self::into_stream).
pub struct SetofCall<T> {
    receiver: SetofReceiver<T>,
    task: Option<JoinHandle<Result<()>>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> SetofCall<T> {
    pub(crate) fn new(
        receiver: SetofReceiver<T>,
        task: JoinHandle<Result<()>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            task: Some(task),
            cancel,
        }
    }

    /// Next element, or `None` when the call has ended
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Stop the producer. Elements already handed over stay valid.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn join(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(PgProcError::Cancelled),
            Err(e) => Err(PgProcError::Driver(format!("setof producer failed: {}", e))),
        }
    }

    /// Discard remaining elements and return the call's result
    pub async fn finish(mut self) -> Result<()> {
        while self.receiver.recv().await.is_some() {}
        self.join().await
    }

    /// Gather every element, failing if the call failed
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.receiver.recv().await {
            items.push(item);
        }
        self.join().await?;
        Ok(items)
    }

    /// Elements as a stream; a failed call ends it with one `Err`
    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        stream::unfold(Some(self), |state| async move {
            let mut call = state?;
            match call.receiver.recv().await {
                Some(item) => Some((Ok(item), Some(call))),
                None => match call.join().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        })
        .boxed()
    }
}
