//! Client sessions: causal consistency and multi-document transactions.

use crate::client::{Client, ClientInner};
use crate::error::{check_reply, MongoError, Result};
use crate::options::{ReadPreference, SessionOptions, TransactionOptions};
use crate::transport::ServerSession;
use bson::{doc, Document, Timestamp};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Commands that accept a read concern and therefore `afterClusterTime`.
const READ_COMMANDS: [&str; 4] = ["find", "aggregate", "count", "distinct"];

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transaction in progress.
    Idle,
    /// Between `start_transaction` and commit/abort.
    InTransaction,
    /// `end_session` was called.
    Ended,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    txn_number: i64,
    txn_started_on_server: bool,
    txn_options: TransactionOptions,
    operation_time: Option<Timestamp>,
    cluster_time: Option<Document>,
    snapshot_time: Option<Timestamp>,
}

struct SessionInner {
    server: Arc<ServerSession>,
    implicit: bool,
    client: Arc<ClientInner>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.phase != SessionPhase::InTransaction
            || !state.txn_started_on_server
            || self.client.is_closed()
        {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let server = self.server.clone();
        let command = doc! {
            "abortTransaction": 1,
            "lsid": server.id().clone(),
            "txnNumber": state.txn_number,
            "autocommit": false,
        };
        debug!(txn_number = state.txn_number, "aborting transaction of dropped session");
        handle.spawn(async move {
            if let Err(e) = client.dispatch("admin", command, None, Some(&*server)).await {
                debug!(error = %e, "abortTransaction of dropped session failed");
            }
        });
    }
}

/// A client session for causal consistency and transactions.
///
/// Cheap to clone; clones share one logical session. Commands issued under
/// one session reach the server one at a time, in issue order.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", self.id())
            .field("implicit", &self.inner.implicit)
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    pub(crate) async fn new(client: Arc<ClientInner>, options: SessionOptions) -> Result<Self> {
        if options.snapshot == Some(true) && options.causal_consistency == Some(true) {
            return Err(MongoError::invalid_argument(
                "causal consistency and snapshot reads are mutually exclusive",
            ));
        }
        Self::start(client, options, false).await
    }

    /// A session for one cursor's commands, started on the caller's behalf.
    pub(crate) async fn implicit(client: Arc<ClientInner>) -> Result<Self> {
        let options = SessionOptions {
            causal_consistency: Some(false),
            ..Default::default()
        };
        Self::start(client, options, true).await
    }

    async fn start(client: Arc<ClientInner>, options: SessionOptions, implicit: bool) -> Result<Self> {
        let server = Arc::new(client.transport.start_session().await?);
        debug!(session = ?server.id(), implicit, "session started");

        Ok(Self {
            inner: Arc::new(SessionInner {
                server,
                implicit,
                client,
                options,
                state: Mutex::new(SessionState {
                    phase: SessionPhase::Idle,
                    txn_number: 0,
                    txn_started_on_server: false,
                    txn_options: TransactionOptions::default(),
                    operation_time: None,
                    cluster_time: None,
                    snapshot_time: None,
                }),
            }),
        })
    }

    /// The logical session id (`{id: UUID}`).
    pub fn id(&self) -> &Document {
        self.inner.server.id()
    }

    /// Whether the session was started implicitly for a cursor.
    pub fn is_implicit(&self) -> bool {
        self.inner.implicit
    }

    pub(crate) fn server(&self) -> &Arc<ServerSession> {
        &self.inner.server
    }

    /// The client that created this session.
    pub fn client(&self) -> Client {
        Client {
            inner: self.inner.client.clone(),
        }
    }

    /// Options the session was started with.
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase
    }

    /// Whether a transaction is in progress.
    pub async fn in_transaction(&self) -> bool {
        self.phase().await == SessionPhase::InTransaction
    }

    /// Number of the current or last transaction.
    pub async fn txn_number(&self) -> i64 {
        self.inner.state.lock().await.txn_number
    }

    /// Latest `operationTime` observed on this session.
    pub async fn operation_time(&self) -> Option<Timestamp> {
        self.inner.state.lock().await.operation_time
    }

    /// Latest `$clusterTime` observed on this session.
    pub async fn cluster_time(&self) -> Option<Document> {
        self.inner.state.lock().await.cluster_time.clone()
    }

    /// Move the causal-consistency token forward, e.g. to chain another
    /// session's writes. Older timestamps are ignored.
    pub async fn advance_operation_time(&self, ts: Timestamp) {
        let mut state = self.inner.state.lock().await;
        if state.operation_time.map_or(true, |current| newer(ts, current)) {
            state.operation_time = Some(ts);
        }
    }

    fn causally_consistent(&self) -> bool {
        self.inner.options.snapshot != Some(true)
            && self.inner.options.causal_consistency.unwrap_or(true)
    }

    /// Start a transaction.
    pub async fn start_transaction(
        &self,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        match state.phase {
            SessionPhase::InTransaction => {
                return Err(MongoError::transaction("transaction already in progress"))
            }
            SessionPhase::Ended => {
                return Err(MongoError::transaction("cannot start a transaction on an ended session"))
            }
            SessionPhase::Idle => {}
        }
        if self.inner.options.snapshot == Some(true) {
            return Err(MongoError::transaction(
                "transactions are not supported on snapshot sessions",
            ));
        }

        let options = options
            .into()
            .unwrap_or_default()
            .merged_with(self.inner.options.default_transaction_options.as_ref());
        if let Some(ref wc) = options.write_concern {
            if !wc.is_acknowledged() {
                return Err(MongoError::invalid_argument(
                    "transactions require an acknowledged write concern",
                ));
            }
        }

        state.txn_number += 1;
        state.txn_started_on_server = false;
        state.txn_options = options;
        state.phase = SessionPhase::InTransaction;
        debug!(txn_number = state.txn_number, "transaction started");
        Ok(())
    }

    /// Commit the current transaction.
    ///
    /// The session returns to idle whether or not the server accepts the
    /// commit. Error labels such as `UnknownTransactionCommitResult` are kept
    /// on the returned error.
    pub async fn commit_transaction(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.phase != SessionPhase::InTransaction {
            return Err(MongoError::transaction("no transaction in progress"));
        }
        state.phase = SessionPhase::Idle;
        if !state.txn_started_on_server {
            return Ok(());
        }

        let mut command = self.end_transaction_command("commitTransaction", &state);
        if let Some(ms) = state.txn_options.max_commit_time_ms {
            command.insert("maxTimeMS", ms as i64);
        }

        self.inner.client.ensure_open()?;
        let reply = self
            .inner
            .client
            .dispatch("admin", command, None, Some(&*self.inner.server))
            .await?;
        absorb(&mut state, &reply);
        check_reply(reply)?;
        debug!(txn_number = state.txn_number, "transaction committed");
        Ok(())
    }

    /// Abort the current transaction.
    ///
    /// Server errors are logged and swallowed: the transaction is void either
    /// way.
    pub async fn abort_transaction(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.phase != SessionPhase::InTransaction {
            return Err(MongoError::transaction("no transaction in progress"));
        }
        self.abort_locked(&mut state).await;
        Ok(())
    }

    async fn abort_locked(&self, state: &mut SessionState) {
        state.phase = SessionPhase::Idle;
        if !state.txn_started_on_server || self.inner.client.is_closed() {
            return;
        }

        let command = self.end_transaction_command("abortTransaction", state);
        let outcome = match self
            .inner
            .client
            .dispatch("admin", command, None, Some(&*self.inner.server))
            .await
        {
            Ok(reply) => {
                absorb(state, &reply);
                check_reply(reply).map(|_| ())
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => debug!(txn_number = state.txn_number, "transaction aborted"),
            Err(e) => warn!(
                txn_number = state.txn_number,
                error = %e,
                "abortTransaction failed; ignoring"
            ),
        }
    }

    fn end_transaction_command(&self, name: &str, state: &SessionState) -> Document {
        let mut command = Document::new();
        command.insert(name, 1);
        command.insert("lsid", self.id().clone());
        command.insert("txnNumber", state.txn_number);
        command.insert("autocommit", false);
        if let Some(ref wc) = state.txn_options.write_concern {
            command.insert("writeConcern", wc.to_document());
        }
        command
    }

    /// Run `body` inside a transaction.
    ///
    /// Commits when `body` returns `Ok`; aborts and returns the error when it
    /// returns `Err`. No retry is attempted.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::FutureExt;
    ///
    /// session
    ///     .with_transaction(accounts.clone(), None, |session, accounts| {
    ///         async move {
    ///             accounts
    ///                 .update_one_with_session(doc! { "_id": 1 }, doc! { "$inc": { "balance": -10 } }, None, session)
    ///                 .await?;
    ///             accounts
    ///                 .update_one_with_session(doc! { "_id": 2 }, doc! { "$inc": { "balance": 10 } }, None, session)
    ///                 .await?;
    ///             Ok(())
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_transaction<C, R, F>(
        &self,
        mut context: C,
        options: impl Into<Option<TransactionOptions>>,
        body: F,
    ) -> Result<R>
    where
        F: for<'s> FnOnce(&'s ClientSession, &'s mut C) -> BoxFuture<'s, Result<R>>,
    {
        self.start_transaction(options).await?;
        match body(self, &mut context).await {
            Ok(value) => {
                self.commit_transaction().await?;
                Ok(value)
            }
            Err(err) => {
                if self.in_transaction().await {
                    self.abort_transaction().await?;
                }
                Err(err)
            }
        }
    }

    /// End the session. An open transaction is aborted first.
    pub async fn end_session(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        match state.phase {
            SessionPhase::Ended => return Ok(()),
            SessionPhase::InTransaction => self.abort_locked(&mut state).await,
            SessionPhase::Idle => {}
        }
        state.phase = SessionPhase::Ended;

        if self.inner.client.is_closed() || self.inner.server.is_pooled() {
            return Ok(());
        }
        let command = doc! { "endSessions": [self.id().clone()] };
        if let Err(e) = self.inner.client.dispatch("admin", command, None, None).await {
            debug!(error = %e, "endSessions failed; the server will expire the session");
        }
        Ok(())
    }

    /// Decorate, dispatch and validate a command issued under this session.
    pub(crate) async fn run(
        &self,
        client: &Arc<ClientInner>,
        database: &str,
        mut command: Document,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        if !Arc::ptr_eq(&self.inner.client, client) {
            return Err(MongoError::invalid_argument(
                "session was started by a different client",
            ));
        }

        let mut state = self.inner.state.lock().await;
        if state.phase == SessionPhase::Ended {
            return Err(MongoError::invalid_argument("session has ended"));
        }

        let name = command.keys().next().cloned().unwrap_or_default();
        command.insert("lsid", self.id().clone());

        let routed = if state.phase == SessionPhase::InTransaction {
            command.remove("readConcern");
            command.remove("writeConcern");
            command.insert("txnNumber", state.txn_number);
            if !state.txn_started_on_server {
                command.insert("startTransaction", true);
                let mut read_concern = state
                    .txn_options
                    .read_concern
                    .as_ref()
                    .map(|rc| rc.to_document())
                    .unwrap_or_default();
                if self.causally_consistent() {
                    if let Some(ts) = state.operation_time {
                        read_concern.insert("afterClusterTime", ts);
                    }
                }
                if !read_concern.is_empty() {
                    command.insert("readConcern", read_concern);
                }
                state.txn_started_on_server = true;
            }
            command.insert("autocommit", false);
            state.txn_options.read_preference.clone()
        } else {
            if READ_COMMANDS.contains(&name.as_str()) {
                self.decorate_read(&mut command, &state);
            }
            read_preference.cloned()
        };

        let reply = client
            .dispatch(database, command, routed.as_ref(), Some(&*self.inner.server))
            .await?;
        absorb(&mut state, &reply);
        check_reply(reply)
    }

    fn decorate_read(&self, command: &mut Document, state: &SessionState) {
        if self.inner.options.snapshot == Some(true) {
            let mut read_concern = doc! { "level": "snapshot" };
            if let Some(ts) = state.snapshot_time {
                read_concern.insert("atClusterTime", ts);
            }
            command.insert("readConcern", read_concern);
            return;
        }
        if !self.causally_consistent() {
            return;
        }
        if let Some(ts) = state.operation_time {
            let mut read_concern = command
                .get_document("readConcern")
                .cloned()
                .unwrap_or_default();
            read_concern.insert("afterClusterTime", ts);
            command.insert("readConcern", read_concern);
        }
    }
}

/// Record causal-consistency tokens carried by a reply.
fn absorb(state: &mut SessionState, reply: &Document) {
    if let Ok(ts) = reply.get_timestamp("operationTime") {
        if state.operation_time.map_or(true, |current| newer(ts, current)) {
            state.operation_time = Some(ts);
        }
    }
    if let Ok(cluster_time) = reply.get_document("$clusterTime") {
        state.cluster_time = Some(cluster_time.clone());
    }
    if state.snapshot_time.is_none() {
        state.snapshot_time = reply
            .get_document("cursor")
            .ok()
            .and_then(|cursor| cursor.get_timestamp("atClusterTime").ok())
            .or_else(|| reply.get_timestamp("atClusterTime").ok());
    }
}

fn newer(a: Timestamp, b: Timestamp) -> bool {
    (a.time, a.increment) > (b.time, b.increment)
}
