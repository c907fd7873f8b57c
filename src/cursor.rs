//! Cursor implementation for iterating over query results.

use crate::client::ClientInner;
use crate::codec::Codec;
use crate::error::{bson_to_i64, MongoError, Result, CURSOR_NOT_FOUND};
use crate::options::ReadPreference;
use crate::session::ClientSession;
use bson::{doc, Bson, Document};
use futures::future::{poll_fn, BoxFuture};
use futures::{ready, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// `getMore` batch size used when the query did not ask for one.
pub const DEFAULT_GET_MORE_BATCH_SIZE: u32 = 128;

/// Everything needed to continue a server cursor besides its buffer.
#[derive(Debug, Clone, Default)]
pub(crate) struct CursorOptions {
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_await_time_ms: Option<u64>,
    pub(crate) tailable: bool,
    pub(crate) read_preference: Option<ReadPreference>,
    pub(crate) comment: Option<Bson>,
}

/// One batch of a cursor reply.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) id: i64,
    pub(crate) ns: Option<String>,
    pub(crate) documents: VecDeque<Document>,
}

impl Batch {
    /// Read `cursor.{id, ns, firstBatch|nextBatch}` from a reply.
    pub(crate) fn from_reply(reply: &Document) -> Result<Self> {
        let cursor = reply
            .get_document("cursor")
            .map_err(|_| MongoError::internal("reply has no cursor document"))?;
        let id = cursor
            .get("id")
            .and_then(bson_to_i64)
            .ok_or_else(|| MongoError::internal("cursor reply has no id"))?;
        let batch = cursor
            .get_array("firstBatch")
            .or_else(|_| cursor.get_array("nextBatch"))
            .map_err(|_| MongoError::internal("cursor reply has no batch"))?;

        let documents = batch
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc.clone()),
                other => Err(MongoError::internal(format!(
                    "cursor batch holds a non-document {:?}",
                    other.element_type()
                ))),
            })
            .collect::<Result<VecDeque<_>>>()?;

        Ok(Self {
            id,
            ns: cursor.get_str("ns").ok().map(str::to_string),
            documents,
        })
    }
}

/// A cursor for iterating over query results.
///
/// Cursors implement `Stream` and can be used with async iteration. A cursor
/// is advanced through `&mut self`, so only one task drives it at a time.
/// Batches are fetched lazily with `getMore`; once the server reports the
/// cursor exhausted, iteration ends with `None`.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut cursor = collection.find(doc! { "status": "active" }, None).await?;
/// while let Some(doc) = cursor.next().await {
///     println!("{:?}", doc?);
/// }
/// ```
pub struct Cursor<T> {
    client: Arc<ClientInner>,
    session: Option<ClientSession>,
    database: String,
    collection: String,
    id: i64,
    buffer: VecDeque<Document>,
    current: Option<Document>,
    options: CursorOptions,
    codec: Codec,
    pending: Option<BoxFuture<'static, Result<Batch>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace())
            .field("id", &self.id)
            .field("buffered", &self.buffer.len())
            .field("tailable", &self.options.tailable)
            .finish()
    }
}

impl<T> Cursor<T> {
    /// Build a cursor from the reply of a cursor-producing command.
    pub(crate) fn from_reply(
        client: Arc<ClientInner>,
        session: Option<ClientSession>,
        database: &str,
        collection: &str,
        reply: &Document,
        options: CursorOptions,
        codec: Codec,
    ) -> Result<Self> {
        let batch = Batch::from_reply(reply)?;
        let (database, collection) = match batch.ns.as_deref().and_then(|ns| ns.split_once('.')) {
            Some((db, coll)) => (db.to_string(), coll.to_string()),
            None => (database.to_string(), collection.to_string()),
        };

        Ok(Self {
            client,
            session,
            database,
            collection,
            id: batch.id,
            buffer: batch.documents,
            current: None,
            options,
            codec,
            pending: None,
            _marker: PhantomData,
        })
    }

    /// The server cursor id; `0` once the server has no more results.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Get the full namespace (db.collection).
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    /// Documents received but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the cursor is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.id == 0 && self.buffer.is_empty()
    }

    /// Whether this is a tailable cursor.
    pub fn is_tailable(&self) -> bool {
        self.options.tailable
    }

    fn get_more(&self) -> BoxFuture<'static, Result<Batch>> {
        let client = self.client.clone();
        let session = self.session.clone();
        let database = self.database.clone();
        let read_preference = self.options.read_preference.clone();

        let mut command = doc! {
            "getMore": self.id,
            "collection": self.collection.clone(),
            "batchSize": self.options.batch_size.unwrap_or(DEFAULT_GET_MORE_BATCH_SIZE) as i64,
        };
        if self.options.tailable {
            if let Some(ms) = self.options.max_await_time_ms {
                command.insert("maxTimeMS", ms as i64);
            }
        }
        if let Some(ref comment) = self.options.comment {
            command.insert("comment", comment.clone());
        }

        Box::pin(async move {
            let reply = client
                .execute(&database, command, session.as_ref(), read_preference.as_ref())
                .await?;
            Batch::from_reply(&reply)
        })
    }

    fn poll_next_document(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Document>>> {
        loop {
            if let Some(pending) = self.pending.as_mut() {
                let result = ready!(pending.as_mut().poll(cx));
                self.pending = None;
                match result {
                    Ok(batch) => {
                        let empty = batch.documents.is_empty();
                        self.id = batch.id;
                        self.buffer.extend(batch.documents);
                        if empty {
                            if self.options.tailable && self.id != 0 {
                                return Poll::Ready(None);
                            }
                            self.abandon();
                        }
                    }
                    Err(e) => {
                        if e.code() == Some(CURSOR_NOT_FOUND) {
                            self.id = 0;
                        } else {
                            self.abandon();
                        }
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if let Some(doc) = self.buffer.pop_front() {
                return Poll::Ready(Some(Ok(doc)));
            }
            if self.id == 0 {
                return Poll::Ready(None);
            }
            self.pending = Some(self.get_more());
        }
    }

    /// Next raw document, fetching a batch when the buffer is empty.
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        poll_fn(|cx| self.poll_next_document(cx)).await.transpose()
    }

    /// Next document rendered as relaxed extended JSON. Datetimes follow the
    /// codec's timezone policy.
    pub async fn next_json(&mut self) -> Result<Option<JsonValue>> {
        Ok(self
            .next_document()
            .await?
            .map(|doc| self.codec.to_json(&self.codec.incoming(doc))))
    }

    /// Advance to the next document, making it available through
    /// [`Cursor::current`].
    ///
    /// Returns `false` once the cursor is exhausted.
    pub async fn advance(&mut self) -> Result<bool> {
        self.current = self.next_document().await?;
        Ok(self.current.is_some())
    }

    /// Close the cursor, releasing the server-side resources.
    pub async fn close(&mut self) -> Result<()> {
        self.pending = None;
        self.buffer.clear();
        self.current = None;
        if self.id == 0 {
            return Ok(());
        }

        let id = std::mem::replace(&mut self.id, 0);
        let command = doc! { "killCursors": self.collection.clone(), "cursors": [id] };
        self.client
            .execute(&self.database, command, self.session.as_ref(), None)
            .await?;
        Ok(())
    }

    /// Mark the cursor dead, killing the server cursor in the background.
    fn abandon(&mut self) {
        let id = std::mem::replace(&mut self.id, 0);
        if id == 0 || self.client.is_closed() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let client = self.client.clone();
        let database = self.database.clone();
        let mut command = doc! { "killCursors": self.collection.clone(), "cursors": [id] };
        let server = self.session.as_ref().map(|session| session.server().clone());
        if let Some(ref server) = server {
            command.insert("lsid", server.id().clone());
        }
        debug!(cursor_id = id, ns = %self.namespace(), "killing abandoned cursor");
        handle.spawn(async move {
            if let Err(e) = client.dispatch(&database, command, None, server.as_deref()).await {
                debug!(cursor_id = id, error = %e, "killCursors failed");
            }
        });
    }
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Get the current document after [`Cursor::advance`].
    pub fn current(&self) -> Result<T> {
        match self.current {
            Some(ref doc) => self.codec.from_document(doc.clone()),
            None => Err(MongoError::CursorExhausted),
        }
    }

    /// Get the next document.
    ///
    /// Returns `None` when the cursor is exhausted. On a tailable cursor,
    /// `None` means nothing new yet; calling again polls the server again.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        self.next().await.transpose()
    }

    /// Up to `n` documents; fewer only when the cursor runs out.
    pub async fn next_batch(&mut self, n: usize) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(n.min(self.buffer.len().max(1)));
        while out.len() < n {
            match self.try_next().await? {
                Some(item) => out.push(item),
                None => break,
            }
        }
        Ok(out)
    }

    /// Collect every remaining document.
    ///
    /// Length-limited collection is not supported: `Some(_)` fails before any
    /// round trip. Use [`Cursor::next_batch`] instead.
    pub async fn to_list(&mut self, length: Option<usize>) -> Result<Vec<T>> {
        if let Some(length) = length {
            return Err(MongoError::invalid_argument(format!(
                "to_list(Some({})) is not supported; use next_batch",
                length
            )));
        }
        let mut out = Vec::with_capacity(self.buffer.len());
        while let Some(item) = self.try_next().await? {
            out.push(item);
        }
        Ok(out)
    }

    /// Collect all remaining documents into a vector.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let cursor = collection.find(None, None).await?;
    /// let docs: Vec<User> = cursor.collect().await?;
    /// ```
    pub async fn collect(mut self) -> Result<Vec<T>> {
        self.to_list(None).await
    }
}

impl<T: DeserializeOwned> Stream for Cursor<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.poll_next_document(cx)) {
            Some(Ok(doc)) => Poll::Ready(Some(this.codec.from_document(doc))),
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => Poll::Ready(None),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = if self.id == 0 {
            Some(self.buffer.len())
        } else {
            None
        };
        (self.buffer.len(), upper)
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        self.abandon();
    }
}
