//! Command transport.
//!
//! Everything above this module builds complete command documents. A
//! transport only has to deliver one to a database and hand back the reply;
//! pooling, authentication, TLS and server selection live behind it.

use crate::config::ConnectionString;
use crate::error::{MongoError, Result};
use crate::options::{ReadPreference, ReadPreferenceMode};
use async_trait::async_trait;
use bson::{doc, spec::BinarySubtype, Binary, Document};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Commands the server runs outside any session even when they carry an
/// `lsid`.
const SESSIONLESS_COMMANDS: [&str; 2] = ["killcursors", "parallelcollectionscan"];

/// A server session issued by a transport.
///
/// Every command sent under it carries [`ServerSession::id`] as its `lsid`.
/// A pooled session is also checked out of the transport's own pool and
/// returns there when dropped.
#[derive(Debug)]
pub struct ServerSession {
    id: Document,
    pooled: Option<tokio::sync::Mutex<mongodb::ClientSession>>,
}

impl ServerSession {
    /// A session known only by a fresh random id.
    pub fn detached() -> Self {
        let uuid = uuid::Uuid::new_v4();
        Self {
            id: doc! {
                "id": Binary {
                    subtype: BinarySubtype::Uuid,
                    bytes: uuid.as_bytes().to_vec(),
                }
            },
            pooled: None,
        }
    }

    fn pooled(session: mongodb::ClientSession) -> Self {
        Self {
            id: session.id().clone(),
            pooled: Some(tokio::sync::Mutex::new(session)),
        }
    }

    /// The logical session id (`{id: UUID}`).
    pub fn id(&self) -> &Document {
        &self.id
    }

    /// Whether the transport owns the session's lifetime. Pooled sessions
    /// are never ended with `endSessions`.
    pub fn is_pooled(&self) -> bool {
        self.pooled.is_some()
    }
}

/// Delivers command documents to a deployment.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Run `command` against `database` and return the raw reply.
    ///
    /// `session` is the server session whose id the command carries as
    /// `lsid`, if any. Replies with `ok: 0` may be returned as documents or
    /// as errors; callers validate them either way.
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        read_preference: Option<&ReadPreference>,
        session: Option<&ServerSession>,
    ) -> Result<Document>;

    /// Issue a server session.
    async fn start_session(&self) -> Result<ServerSession> {
        Ok(ServerSession::detached())
    }

    /// Release pooled resources.
    async fn shutdown(&self, immediate: bool) -> Result<()>;
}

// ============================================================================
// Driver-backed transport
// ============================================================================

/// Transport backed by the official driver's connection pool.
#[derive(Debug, Clone)]
pub struct DriverTransport {
    client: mongodb::Client,
}

impl DriverTransport {
    /// Build a pool for `conn`, applying overrides from `options`.
    pub async fn connect(
        conn: &ConnectionString,
        options: &crate::client::ClientOptions,
    ) -> Result<Self> {
        let mut driver_options = mongodb::options::ClientOptions::parse(conn.as_str())
            .await
            .map_err(|e| MongoError::configuration(e.to_string()))?;

        if let Some(ref name) = options.app_name {
            driver_options.app_name = Some(name.clone());
        }
        if let Some(size) = options.max_pool_size {
            driver_options.max_pool_size = Some(size);
        }
        if let Some(size) = options.min_pool_size {
            driver_options.min_pool_size = Some(size);
        }
        if let Some(ms) = options.connect_timeout_ms {
            driver_options.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = options.server_selection_timeout_ms {
            driver_options.server_selection_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(direct) = options.direct_connection {
            driver_options.direct_connection = Some(direct);
        }

        let client = mongodb::Client::with_options(driver_options)
            .map_err(|e| MongoError::configuration(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an already configured driver client.
    pub fn from_client(client: mongodb::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for DriverTransport {
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        read_preference: Option<&ReadPreference>,
        session: Option<&ServerSession>,
    ) -> Result<Document> {
        let criteria = read_preference
            .map(|rp| mongodb::options::SelectionCriteria::ReadPreference(to_driver(rp)));
        let db = self.client.database(database);

        match driver_command(command, session)? {
            DriverCommand::Plain(command) => Ok(db.run_command(command, criteria).await?),
            DriverCommand::WithSession(command, pooled) => {
                let mut pooled = pooled.lock().await;
                Ok(db
                    .run_command_with_session(command, criteria, &mut pooled)
                    .await?)
            }
        }
    }

    async fn start_session(&self) -> Result<ServerSession> {
        let options = mongodb::options::SessionOptions::builder()
            .causal_consistency(false)
            .build();
        let session = self.client.start_session(options).await?;
        Ok(ServerSession::pooled(session))
    }

    async fn shutdown(&self, immediate: bool) -> Result<()> {
        let client = self.client.clone();
        if immediate {
            client.shutdown_immediate().await;
        } else {
            client.shutdown().await;
        }
        Ok(())
    }
}

/// How a command reaches the driver.
enum DriverCommand<'a> {
    /// Sent as is. The driver attaches no session of its own.
    Plain(Document),
    /// Sent with the pooled session, which supplies the `lsid`.
    WithSession(Document, &'a tokio::sync::Mutex<mongodb::ClientSession>),
}

/// Hand the session id over to the driver instead of the command body, so
/// the command reaches the server with exactly one `lsid`.
fn driver_command(command: Document, session: Option<&ServerSession>) -> Result<DriverCommand<'_>> {
    let name = command
        .keys()
        .next()
        .map(|name| name.to_ascii_lowercase())
        .unwrap_or_default();
    if SESSIONLESS_COMMANDS.contains(&name.as_str()) {
        return Ok(DriverCommand::Plain(command));
    }

    let Some(session) = session else {
        if command.contains_key("lsid") {
            return Err(MongoError::internal(format!(
                "{} carries an lsid without a session",
                name
            )));
        }
        return Ok(DriverCommand::Plain(command));
    };
    let Some(ref pooled) = session.pooled else {
        return Err(MongoError::invalid_argument(
            "session was not issued by this transport",
        ));
    };

    let mut command = command;
    match command.remove("lsid") {
        Some(bson::Bson::Document(ref lsid)) if lsid == session.id() => {}
        None => {}
        Some(_) => {
            return Err(MongoError::internal(format!(
                "{} carries an lsid of another session",
                name
            )))
        }
    }
    Ok(DriverCommand::WithSession(command, pooled))
}

fn to_driver(rp: &ReadPreference) -> mongodb::options::ReadPreference {
    use mongodb::options::{ReadPreference as Driver, ReadPreferenceOptions};

    let mut options = ReadPreferenceOptions::default();
    options.max_staleness = rp.max_staleness_secs.map(Duration::from_secs);
    options.tag_sets = rp.tag_sets.as_ref().map(|sets| {
        sets.iter()
            .map(|set| {
                set.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .collect()
    });

    match rp.mode {
        ReadPreferenceMode::Primary => Driver::Primary,
        ReadPreferenceMode::PrimaryPreferred => Driver::PrimaryPreferred { options },
        ReadPreferenceMode::Secondary => Driver::Secondary { options },
        ReadPreferenceMode::SecondaryPreferred => Driver::SecondaryPreferred { options },
        ReadPreferenceMode::Nearest => Driver::Nearest { options },
    }
}

// ============================================================================
// Scripted transport
// ============================================================================

/// A command observed by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    /// Target database.
    pub database: String,
    /// The full command document.
    pub command: Document,
    /// Routing requested for it.
    pub read_preference: Option<ReadPreference>,
    /// Id of the server session it was sent under.
    pub session: Option<Document>,
}

impl RecordedCommand {
    /// The command name (first key).
    pub fn name(&self) -> &str {
        self.command.keys().next().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<Document>>,
    commands: Vec<RecordedCommand>,
    shut_down: Option<bool>,
}

/// In-memory transport that answers from a queue of prepared replies and
/// records every command it receives.
///
/// When the queue is empty it answers `{ok: 1}`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply document.
    pub fn push_reply(&self, reply: Document) -> &Self {
        self.script().replies.push_back(Ok(reply));
        self
    }

    /// Queue a transport-level failure.
    pub fn push_error(&self, error: MongoError) -> &Self {
        self.script().replies.push_back(Err(error));
        self
    }

    /// Queue a cursor reply: `{cursor: {id, ns, firstBatch|nextBatch}, ok: 1}`.
    pub fn push_cursor(&self, id: i64, ns: &str, batch: Vec<Document>, first: bool) -> &Self {
        let mut cursor = doc! { "id": id, "ns": ns };
        cursor.insert(if first { "firstBatch" } else { "nextBatch" }, batch);
        self.push_reply(doc! { "cursor": cursor, "ok": 1 })
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.script().commands.clone()
    }

    /// Names of every command received so far.
    pub fn command_names(&self) -> Vec<String> {
        self.script()
            .commands
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// The most recent command.
    pub fn last_command(&self) -> Option<RecordedCommand> {
        self.script().commands.last().cloned()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.script().commands.clear();
    }

    /// Replies still queued.
    pub fn pending_replies(&self) -> usize {
        self.script().replies.len()
    }

    /// `Some(immediate)` once shut down.
    pub fn shutdown_mode(&self) -> Option<bool> {
        self.script().shut_down
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn run_command(
        &self,
        database: &str,
        command: Document,
        read_preference: Option<&ReadPreference>,
        session: Option<&ServerSession>,
    ) -> Result<Document> {
        let mut script = self.script();
        let recorded = RecordedCommand {
            database: database.to_string(),
            command,
            read_preference: read_preference.cloned(),
            session: session.map(|s| s.id().clone()),
        };
        debug!(db = %database, command = %recorded.name(), "scripted command");
        script.commands.push(recorded);
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(doc! { "ok": 1 }))
    }

    async fn shutdown(&self, immediate: bool) -> Result<()> {
        self.script().shut_down = Some(immediate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push_reply(doc! { "ok": 1, "n": 1 })
            .push_error(MongoError::connection("reset"));

        let first = transport
            .run_command("db", doc! { "insert": "c" }, None, None)
            .await
            .unwrap();
        assert_eq!(first.get_i32("n").unwrap(), 1);

        let second = transport.run_command("db", doc! { "ping": 1 }, None, None).await;
        assert!(second.unwrap_err().is_connection_error());

        let third = transport.run_command("db", doc! { "ping": 1 }, None, None).await.unwrap();
        assert_eq!(third, doc! { "ok": 1 });

        assert_eq!(transport.command_names(), vec!["insert", "ping", "ping"]);
    }

    #[tokio::test]
    async fn test_scripted_records_read_preference() {
        let transport = ScriptedTransport::new();
        let rp = ReadPreference::nearest();
        transport
            .run_command("db", doc! { "find": "c" }, Some(&rp), None)
            .await
            .unwrap();
        assert_eq!(transport.last_command().unwrap().read_preference, Some(rp));
    }

    #[tokio::test]
    async fn test_scripted_shutdown() {
        let transport = ScriptedTransport::new();
        assert_eq!(transport.shutdown_mode(), None);
        transport.shutdown(true).await.unwrap();
        assert_eq!(transport.shutdown_mode(), Some(true));
    }

    async fn offline_driver() -> DriverTransport {
        let client = mongodb::Client::with_uri_str("mongodb://127.0.0.1:1/?directConnection=true")
            .await
            .unwrap();
        DriverTransport::from_client(client)
    }

    #[tokio::test]
    async fn test_driver_session_supplies_the_only_lsid() {
        let transport = offline_driver().await;
        let session = transport.start_session().await.unwrap();
        assert!(session.is_pooled());
        assert!(matches!(session.id().get("id"), Some(bson::Bson::Binary(_))));

        let command = doc! {
            "insert": "c",
            "documents": [{ "_id": 1 }],
            "lsid": session.id().clone(),
            "txnNumber": 1_i64,
            "startTransaction": true,
            "autocommit": false,
        };
        match driver_command(command, Some(&session)).unwrap() {
            DriverCommand::WithSession(body, _) => {
                assert!(body.get("lsid").is_none());
                assert_eq!(body.get_i64("txnNumber").unwrap(), 1);
                assert!(body.get_bool("startTransaction").unwrap());
                assert!(!body.get_bool("autocommit").unwrap());
            }
            DriverCommand::Plain(body) => panic!("sent without the session: {body:?}"),
        }

        let other = ServerSession::detached();
        let foreign = doc! { "find": "c", "lsid": other.id().clone() };
        assert!(driver_command(foreign, Some(&session)).is_err());
    }

    #[tokio::test]
    async fn test_driver_kill_cursors_keeps_lsid() {
        let transport = offline_driver().await;
        let session = transport.start_session().await.unwrap();
        let command = doc! { "killCursors": "c", "cursors": [5_i64], "lsid": session.id().clone() };
        match driver_command(command, Some(&session)).unwrap() {
            DriverCommand::Plain(body) => {
                assert_eq!(body.get_document("lsid").unwrap(), session.id());
            }
            DriverCommand::WithSession(..) => panic!("killCursors cannot run under a driver session"),
        }
    }

    #[tokio::test]
    async fn test_driver_rejects_stray_lsid_and_detached_sessions() {
        let detached = ServerSession::detached();
        assert!(!detached.is_pooled());

        let stray = doc! { "find": "c", "lsid": detached.id().clone() };
        assert_eq!(
            driver_command(stray, None).err().map(|e| e.kind()),
            Some(crate::error::ErrorKind::Internal)
        );

        let command = doc! { "find": "c", "lsid": detached.id().clone() };
        assert_eq!(
            driver_command(command, Some(&detached)).err().map(|e| e.kind()),
            Some(crate::error::ErrorKind::InvalidArgument)
        );

        assert!(matches!(
            driver_command(doc! { "ping": 1 }, None).unwrap(),
            DriverCommand::Plain(_)
        ));
    }

    #[tokio::test]
    async fn test_scripted_records_session() {
        let transport = ScriptedTransport::new();
        let session = transport.start_session().await.unwrap();
        transport
            .run_command("db", doc! { "ping": 1 }, None, Some(&session))
            .await
            .unwrap();
        assert_eq!(transport.last_command().unwrap().session.as_ref(), Some(session.id()));
    }

    #[test]
    fn test_driver_read_preference_mapping() {
        let rp = ReadPreference {
            mode: ReadPreferenceMode::Secondary,
            tag_sets: Some(vec![doc! { "dc": "east" }]),
            max_staleness_secs: Some(120),
        };
        match to_driver(&rp) {
            mongodb::options::ReadPreference::Secondary { options } => {
                assert_eq!(options.max_staleness, Some(Duration::from_secs(120)));
                let tags = options.tag_sets.unwrap();
                assert_eq!(tags[0].get("dc").map(String::as_str), Some("east"));
            }
            other => panic!("unexpected read preference: {other:?}"),
        }
    }
}
