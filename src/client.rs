//! Client: connection lifecycle, session factory and command dispatch.

use crate::codec::{Codec, CodecOptions};
use crate::config::ConnectionString;
use crate::db::Database;
use crate::error::{check_reply, MongoError, Result};
use crate::options::{DatabaseOptions, ReadConcern, ReadPreference, SessionOptions, WriteConcern};
use crate::session::ClientSession;
use crate::transport::{DriverTransport, ServerSession, Transport};
use bson::{doc, Bson, Document};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for connecting to MongoDB.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Server selection timeout in milliseconds.
    pub server_selection_timeout_ms: Option<u64>,
    /// Maximum number of connections in the pool.
    pub max_pool_size: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_pool_size: Option<u32>,
    /// Application name for server logs.
    pub app_name: Option<String>,
    /// Whether to use TLS.
    pub tls: Option<bool>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Database returned by [`Client::default_database`].
    pub default_database: Option<String>,
    /// Read concern inherited by databases and collections.
    pub read_concern: Option<ReadConcern>,
    /// Write concern inherited by databases and collections.
    pub write_concern: Option<WriteConcern>,
    /// Read preference inherited by databases and collections.
    pub read_preference: Option<ReadPreference>,
    /// Codec configuration inherited by databases and collections.
    pub codec_options: CodecOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Some(30_000),
            server_selection_timeout_ms: Some(30_000),
            max_pool_size: Some(100),
            min_pool_size: Some(0),
            app_name: None,
            tls: None,
            direct_connection: None,
            default_database: None,
            read_concern: None,
            write_concern: None,
            read_preference: None,
            codec_options: CodecOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Create a new ClientOptions with defaults.
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Parse options from a connection string.
    pub fn parse(uri: &str) -> Result<Self> {
        Ok(Self::from_connection_string(&ConnectionString::parse(uri)?))
    }

    /// Options carried by an already parsed connection string, defaults elsewhere.
    pub fn from_connection_string(conn: &ConnectionString) -> Self {
        let defaults = ClientOptions::default();
        Self {
            connect_timeout_ms: conn.connect_timeout_ms.or(defaults.connect_timeout_ms),
            server_selection_timeout_ms: conn
                .server_selection_timeout_ms
                .or(defaults.server_selection_timeout_ms),
            max_pool_size: conn.max_pool_size.or(defaults.max_pool_size),
            min_pool_size: conn.min_pool_size.or(defaults.min_pool_size),
            app_name: conn.app_name.clone(),
            tls: conn.tls,
            direct_connection: conn.direct_connection,
            default_database: conn.default_database.clone(),
            read_concern: conn.read_concern.clone(),
            write_concern: conn.write_concern.clone(),
            read_preference: conn.read_preference.clone(),
            codec_options: defaults.codec_options,
        }
    }

    /// Fill fields left unset here from `conn`.
    fn fill_from(mut self, conn: &ConnectionString) -> Self {
        self.app_name = self.app_name.or_else(|| conn.app_name.clone());
        self.tls = self.tls.or(conn.tls);
        self.direct_connection = self.direct_connection.or(conn.direct_connection);
        self.default_database = self
            .default_database
            .or_else(|| conn.default_database.clone());
        self.read_concern = self.read_concern.or_else(|| conn.read_concern.clone());
        self.write_concern = self.write_concern.or_else(|| conn.write_concern.clone());
        self.read_preference = self
            .read_preference
            .or_else(|| conn.read_preference.clone());
        self
    }
}

/// Builder for ClientOptions.
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the connection timeout.
    pub fn connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.options.connect_timeout_ms = Some(timeout);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout_ms(mut self, timeout: u64) -> Self {
        self.options.server_selection_timeout_ms = Some(timeout);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.options.max_pool_size = Some(size);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.options.min_pool_size = Some(size);
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.options.app_name = Some(name.into());
        self
    }

    /// Enable or disable TLS.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.options.tls = Some(enabled);
        self
    }

    /// Enable or disable direct connection.
    pub fn direct_connection(mut self, direct: bool) -> Self {
        self.options.direct_connection = Some(direct);
        self
    }

    /// Set the default database.
    pub fn default_database(mut self, name: impl Into<String>) -> Self {
        self.options.default_database = Some(name.into());
        self
    }

    /// Set the inherited read concern.
    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.options.read_concern = Some(read_concern);
        self
    }

    /// Set the inherited write concern.
    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    /// Set the inherited read preference.
    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.options.read_preference = Some(read_preference);
        self
    }

    /// Set the codec options.
    pub fn codec_options(mut self, codec_options: CodecOptions) -> Self {
        self.options.codec_options = codec_options;
        self
    }

    /// Build the options.
    pub fn build(self) -> ClientOptions {
        self.options
    }
}

/// State shared by every handle derived from one client.
pub(crate) struct ClientInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) options: ClientOptions,
    pub(crate) codec: Codec,
    closed: AtomicBool,
}

impl fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientInner")
            .field("transport", &self.transport)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MongoError::connection("client is closed"));
        }
        Ok(())
    }

    /// Send a fully decorated command and return the raw reply.
    ///
    /// A command carrying an `lsid` must be sent with the server session it
    /// names.
    pub(crate) async fn dispatch(
        &self,
        database: &str,
        command: Document,
        read_preference: Option<&ReadPreference>,
        session: Option<&ServerSession>,
    ) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        debug!(db = %database, command = %name, "dispatching command");
        self.transport
            .run_command(database, command, read_preference, session)
            .await
            .map_err(|e| {
                debug!(db = %database, command = %name, error = %e, "command failed");
                e
            })
    }

    /// Run a command, optionally under a session, and validate the reply.
    pub(crate) async fn execute(
        self: &Arc<Self>,
        database: &str,
        command: Document,
        session: Option<&ClientSession>,
        read_preference: Option<&ReadPreference>,
    ) -> Result<Document> {
        self.ensure_open()?;
        match session {
            Some(session) => session.run(self, database, command, read_preference).await,
            None => check_reply(self.dispatch(database, command, read_preference, None).await?),
        }
    }

    /// The session a cursor-opening command runs under: the caller's, or a
    /// fresh implicit one the cursor keeps for its `getMore`s.
    pub(crate) async fn cursor_session(
        self: &Arc<Self>,
        session: Option<&ClientSession>,
    ) -> Result<ClientSession> {
        match session {
            Some(session) => Ok(session.clone()),
            None => {
                self.ensure_open()?;
                ClientSession::implicit(self.clone()).await
            }
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!(
                transport = ?self.transport,
                "client dropped without close(); pooled connections are released only when the transport is dropped"
            );
        }
    }
}

/// A MongoDB client.
///
/// Cheap to clone; every clone, database, collection, session and cursor
/// shares one connection pool.
///
/// # Example
///
/// ```ignore
/// use mongo_async::Client;
///
/// #[tokio::main]
/// async fn main() -> mongo_async::Result<()> {
///     let client = Client::connect("mongodb://localhost/mydb").await?;
///     let db = client.default_database()?;
///     let users = db.collection::<User>("users");
///
///     // Perform operations...
///
///     client.close(false).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("default_database", &self.inner.options.default_database)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl Client {
    /// Connect to a deployment and verify it answers.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = Client::connect("mongodb://localhost:27017/test_db?replicaSet=rs1").await?;
    /// ```
    pub async fn connect(uri: &str) -> Result<Self> {
        let conn = ConnectionString::parse(uri)?;
        let options = ClientOptions::from_connection_string(&conn);
        Self::connect_parsed(conn, options).await
    }

    /// Connect with explicit options. Fields left unset fall back to the
    /// connection string.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let options = ClientOptions::builder()
    ///     .server_selection_timeout_ms(2_000)
    ///     .app_name("my-app")
    ///     .build();
    /// let client = Client::connect_with_options("mongodb://localhost", options).await?;
    /// ```
    pub async fn connect_with_options(uri: &str, options: ClientOptions) -> Result<Self> {
        let conn = ConnectionString::parse(uri)?;
        let options = options.fill_from(&conn);
        Self::connect_parsed(conn, options).await
    }

    async fn connect_parsed(conn: ConnectionString, options: ClientOptions) -> Result<Self> {
        let transport = DriverTransport::connect(&conn, &options).await?;
        let client = Self::with_transport(Arc::new(transport), options);

        if let Err(err) = client.ping().await {
            let _ = client.close(true).await;
            return Err(match err {
                MongoError::Connection(message) => MongoError::ServerSelection(message),
                other => other,
            });
        }

        let hosts: Vec<String> = conn.hosts.iter().map(ToString::to_string).collect();
        info!(
            hosts = %hosts.join(","),
            database = ?client.inner.options.default_database,
            "MongoDB client connected"
        );
        Ok(client)
    }

    /// Build a client over any transport. No round trip is made.
    pub fn with_transport(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let codec = Codec::new(options.codec_options.clone());
        Self {
            inner: Arc::new(ClientInner {
                transport,
                options,
                codec,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Get a database handle.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = client.database("mydb");
    /// ```
    pub fn database(&self, name: &str) -> Database {
        Database::new(self.inner.clone(), name.to_string(), DatabaseOptions::default())
    }

    /// Get a database handle with overrides. `None` selects the default
    /// database from the connection string.
    pub fn get_database(&self, name: Option<&str>, options: DatabaseOptions) -> Result<Database> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_database_name().map(str::to_string).ok_or_else(|| {
                MongoError::invalid_argument(
                    "no database name given and the connection string has no default database",
                )
            })?,
        };
        if name.is_empty() {
            return Err(MongoError::invalid_argument("database name must not be empty"));
        }
        Ok(Database::new(self.inner.clone(), name, options))
    }

    /// Get the default database from the connection URI.
    pub fn default_database(&self) -> Result<Database> {
        self.get_database(None, DatabaseOptions::default())
    }

    /// Name of the default database, if any.
    pub fn default_database_name(&self) -> Option<&str> {
        self.inner.options.default_database.as_deref()
    }

    /// Get the client options.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Codec shared by handles that do not override it.
    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    /// Whether [`Client::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// List all database names.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for name in client.list_database_names().await? {
    ///     println!("Database: {}", name);
    /// }
    /// ```
    pub async fn list_database_names(&self) -> Result<Vec<String>> {
        let reply = self
            .inner
            .execute(
                "admin",
                doc! { "listDatabases": 1, "nameOnly": true },
                None,
                None,
            )
            .await?;

        Ok(reply
            .get_array("databases")
            .map(|dbs| {
                dbs.iter()
                    .filter_map(Bson::as_document)
                    .filter_map(|db| db.get_str("name").ok())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Ping the server to check connectivity.
    ///
    /// # Example
    ///
    /// ```ignore
    /// if client.ping().await.is_ok() {
    ///     println!("Connected to MongoDB");
    /// }
    /// ```
    pub async fn ping(&self) -> Result<()> {
        self.inner
            .execute("admin", doc! { "ping": 1 }, None, None)
            .await?;
        Ok(())
    }

    /// Start a client session.
    ///
    /// Sessions enable causal consistency and transactions.
    pub async fn start_session(
        &self,
        options: impl Into<Option<SessionOptions>>,
    ) -> Result<ClientSession> {
        self.inner.ensure_open()?;
        ClientSession::new(self.inner.clone(), options.into().unwrap_or_default()).await
    }

    /// Close the client.
    ///
    /// Further operations on any handle derived from it fail with a
    /// connection error. `immediate` interrupts in-flight operations instead
    /// of waiting for them.
    ///
    /// # Example
    ///
    /// ```ignore
    /// client.close(false).await?;
    /// ```
    pub async fn close(&self, immediate: bool) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(immediate, "closing MongoDB client");
        self.inner.transport.shutdown(immediate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::options::ReadPreferenceMode;
    use crate::transport::ScriptedTransport;

    fn scripted(options: ClientOptions) -> (Client, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        (Client::with_transport(transport.clone(), options), transport)
    }

    #[test]
    fn test_client_options_default() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout_ms, Some(30_000));
        assert_eq!(options.server_selection_timeout_ms, Some(30_000));
        assert_eq!(options.max_pool_size, Some(100));
        assert_eq!(options.min_pool_size, Some(0));
        assert!(options.app_name.is_none());
        assert!(options.tls.is_none());
        assert!(options.direct_connection.is_none());
        assert!(options.codec_options.tz_aware);
    }

    #[test]
    fn test_client_options_builder() {
        let options = ClientOptions::builder()
            .connect_timeout_ms(10_000)
            .server_selection_timeout_ms(5_000)
            .max_pool_size(50)
            .min_pool_size(5)
            .app_name("test-app")
            .tls(true)
            .direct_connection(false)
            .default_database("app")
            .build();

        assert_eq!(options.connect_timeout_ms, Some(10_000));
        assert_eq!(options.server_selection_timeout_ms, Some(5_000));
        assert_eq!(options.max_pool_size, Some(50));
        assert_eq!(options.min_pool_size, Some(5));
        assert_eq!(options.app_name, Some("test-app".to_string()));
        assert_eq!(options.tls, Some(true));
        assert_eq!(options.direct_connection, Some(false));
        assert_eq!(options.default_database.as_deref(), Some("app"));
    }

    #[test]
    fn test_client_options_parse() {
        let uri = "mongodb://localhost:27017/mydb?connectTimeoutMS=5000&maxPoolSize=50&appName=myapp&tls=true&directConnection=true&readPreference=nearest";
        let options = ClientOptions::parse(uri).unwrap();

        assert_eq!(options.connect_timeout_ms, Some(5000));
        assert_eq!(options.max_pool_size, Some(50));
        assert_eq!(options.app_name, Some("myapp".to_string()));
        assert_eq!(options.tls, Some(true));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.default_database.as_deref(), Some("mydb"));
        assert_eq!(
            options.read_preference.map(|rp| rp.mode),
            Some(ReadPreferenceMode::Nearest)
        );
    }

    #[test]
    fn test_client_options_parse_no_params() {
        let options = ClientOptions::parse("mongodb://localhost:27017/mydb").unwrap();
        assert_eq!(options.connect_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_client_options_parse_rejects_garbage() {
        let err = ClientOptions::parse("localhost:27017").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_explicit_options_win_over_uri() {
        let conn = ConnectionString::parse("mongodb://h/uri_db?appName=from-uri").unwrap();
        let options = ClientOptions::builder()
            .app_name("explicit")
            .build()
            .fill_from(&conn);
        assert_eq!(options.app_name.as_deref(), Some("explicit"));
        assert_eq!(options.default_database.as_deref(), Some("uri_db"));
    }

    #[tokio::test]
    async fn test_default_database_missing() {
        let (client, _) = scripted(ClientOptions::default());
        let err = client.default_database().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_database_named_and_default() {
        let (client, _) = scripted(ClientOptions::builder().default_database("app").build());
        assert_eq!(client.default_database().unwrap().name(), "app");
        let other = client
            .get_database(Some("other"), DatabaseOptions::default())
            .unwrap();
        assert_eq!(other.name(), "other");
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_and_list_databases() {
        let (client, transport) = scripted(ClientOptions::default());
        transport.push_reply(doc! { "ok": 1 });
        transport.push_reply(doc! {
            "databases": [{ "name": "admin" }, { "name": "app" }],
            "ok": 1,
        });

        client.ping().await.unwrap();
        let names = client.list_database_names().await.unwrap();
        assert_eq!(names, vec!["admin", "app"]);

        let commands = transport.commands();
        assert_eq!(commands[0].database, "admin");
        assert_eq!(commands[0].command, doc! { "ping": 1 });
        assert_eq!(commands[1].name(), "listDatabases");
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_rejects_further_operations() {
        let (client, transport) = scripted(ClientOptions::default());
        client.close(true).await.unwrap();
        assert!(client.is_closed());
        assert_eq!(transport.shutdown_mode(), Some(true));

        let err = client.ping().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(client.start_session(None).await.is_err());

        // second close is a no-op
        client.close(false).await.unwrap();
        assert_eq!(transport.shutdown_mode(), Some(true));
        assert!(transport.commands().is_empty());
    }
}
