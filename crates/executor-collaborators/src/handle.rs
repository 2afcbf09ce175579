//! Cancellable async-query handles (spec §5 "Scheduling model", "Cancellation").
//!
//! Every outgoing call to a collaborator returns immediately; its reply is
//! delivered later as a loop event. We model that with a `tokio::sync::
//! oneshot` pair plus an explicit cancel signal, the same shape the teacher
//! uses for its in-flight proposal task (`apollo_batcher::utils::ProposalTask`
//! carries an `abort_signal_sender` alongside its join handle).

use tokio::sync::oneshot;

/// A single outstanding query against a collaborator. Dropping or calling
/// [`QueryHandle::cancel`] deterministically discards a not-yet-delivered
/// reply (spec §5 "Cancellation").
pub struct QueryHandle<T> {
    reply_rx: oneshot::Receiver<T>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// The collaborator-side counterpart: holds the sender half and the cancel
/// receiver, so the collaborator (or, in tests, the mock) can observe
/// cancellation before it replies.
pub struct QueryResponder<T> {
    reply_tx: oneshot::Sender<T>,
    cancel_rx: oneshot::Receiver<()>,
}

/// Creates a linked `(QueryHandle, QueryResponder)` pair for one in-flight
/// query.
pub fn query_pair<T>() -> (QueryHandle<T>, QueryResponder<T>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (QueryHandle { reply_rx, cancel_tx: Some(cancel_tx) }, QueryResponder { reply_tx, cancel_rx })
}

impl<T> QueryHandle<T> {
    /// Cancels the query. A reply sent after this point is silently
    /// discarded by the responder side, never delivered to `await_reply`.
    pub fn cancel(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }

    /// Awaits the reply. Returns `None` if the query was cancelled or the
    /// collaborator dropped its responder without replying.
    pub async fn await_reply(self) -> Option<T> {
        self.reply_rx.await.ok()
    }
}

impl<T> QueryResponder<T> {
    /// Sends the reply unless the handle side has already cancelled.
    pub fn reply(mut self, value: T) {
        if self.cancel_rx.try_recv().is_ok() {
            return;
        }
        let _ = self.reply_tx.send(value);
    }
}

#[cfg(test)]
mod handle_test {
    use super::*;

    #[tokio::test]
    async fn reply_is_delivered_when_not_cancelled() {
        let (handle, responder) = query_pair::<u32>();
        responder.reply(42);
        assert_eq!(handle.await_reply().await, Some(42));
    }

    #[tokio::test]
    async fn cancel_suppresses_a_reply_sent_afterwards() {
        let (mut handle, responder) = query_pair::<u32>();
        handle.cancel();
        responder.reply(42);
        assert_eq!(handle.await_reply().await, None);
    }

    #[tokio::test]
    async fn dropping_the_responder_without_replying_yields_none() {
        let (handle, responder) = query_pair::<u32>();
        drop(responder);
        assert_eq!(handle.await_reply().await, None);
    }
}
