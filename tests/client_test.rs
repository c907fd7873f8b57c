//! End-to-end tests for mongo-async.
//!
//! These tests drive the public API against a [`ScriptedTransport`], which
//! answers from prepared replies and records every command the client sends.

use bson::{doc, oid::ObjectId, Bson, Document};
use futures::FutureExt;
use mongo_async::{
    client::{Client, ClientOptions},
    collection::Collection,
    error::{ErrorKind, MongoError},
    options::{
        CursorType, FindOptions, InsertManyOptions, ReadConcern, ReadPreference, ReplaceOptions,
        SessionOptions, UpdateOptions, WriteConcern,
    },
    IndexOptions, ScriptedTransport,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Test Document Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    _id: Option<ObjectId>,
    name: String,
    email: String,
    #[serde(default)]
    age: i32,
    #[serde(default)]
    active: bool,
}

impl User {
    fn new(name: &str, email: &str) -> Self {
        Self {
            _id: None,
            name: name.to_string(),
            email: email.to_string(),
            age: 0,
            active: true,
        }
    }

    fn with_id(mut self, id: ObjectId) -> Self {
        self._id = Some(id);
        self
    }

    fn with_age(mut self, age: i32) -> Self {
        self.age = age;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    _id: Option<ObjectId>,
    user_id: ObjectId,
    product: String,
    quantity: i32,
    price: f64,
    status: String,
}

impl Order {
    fn new(user_id: ObjectId, product: &str, quantity: i32, price: f64) -> Self {
        Self {
            _id: None,
            user_id,
            product: product.to_string(),
            quantity,
            price,
            status: "pending".to_string(),
        }
    }
}

fn scripted() -> (Client, Arc<ScriptedTransport>) {
    scripted_with(ClientOptions::default())
}

fn scripted_with(options: ClientOptions) -> (Client, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new());
    (Client::with_transport(transport.clone(), options), transport)
}

fn users(client: &Client) -> Collection<User> {
    client.database("app").collection::<User>("users")
}

fn user_doc(name: &str, age: i32) -> Document {
    doc! {
        "_id": ObjectId::new(),
        "name": name,
        "email": format!("{}@test.com", name.to_lowercase()),
        "age": age,
        "active": true,
    }
}

// ============================================================================
// Client Tests
// ============================================================================

mod client_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_options_default_values() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout_ms, Some(30_000));
        assert_eq!(options.server_selection_timeout_ms, Some(30_000));
        assert_eq!(options.max_pool_size, Some(100));
        assert_eq!(options.min_pool_size, Some(0));
        assert!(options.app_name.is_none());
        assert!(options.tls.is_none());
        assert!(options.direct_connection.is_none());
        assert!(options.default_database.is_none());
    }

    #[test]
    fn test_client_options_builder_all_options() {
        let options = ClientOptions::builder()
            .connect_timeout_ms(5_000)
            .server_selection_timeout_ms(10_000)
            .max_pool_size(25)
            .min_pool_size(5)
            .app_name("test-app")
            .tls(true)
            .direct_connection(true)
            .default_database("app")
            .write_concern(WriteConcern::majority())
            .build();

        assert_eq!(options.connect_timeout_ms, Some(5_000));
        assert_eq!(options.server_selection_timeout_ms, Some(10_000));
        assert_eq!(options.max_pool_size, Some(25));
        assert_eq!(options.min_pool_size, Some(5));
        assert_eq!(options.app_name, Some("test-app".to_string()));
        assert_eq!(options.tls, Some(true));
        assert_eq!(options.direct_connection, Some(true));
        assert_eq!(options.default_database.as_deref(), Some("app"));
        assert_eq!(options.write_concern, Some(WriteConcern::majority()));
    }

    #[test]
    fn test_client_options_parse() {
        let options = ClientOptions::parse(
            "mongodb://localhost:27017/inventory?appName=shop&maxPoolSize=5&readConcernLevel=majority",
        )
        .unwrap();
        assert_eq!(options.default_database.as_deref(), Some("inventory"));
        assert_eq!(options.app_name.as_deref(), Some("shop"));
        assert_eq!(options.max_pool_size, Some(5));
        assert_eq!(options.read_concern, Some(ReadConcern::majority()));
        assert_eq!(options.connect_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_client_options_parse_rejects_bad_scheme() {
        let err = ClientOptions::parse("postgres://localhost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_default_database() {
        let (client, _) = scripted_with(ClientOptions::builder().default_database("app").build());
        assert_eq!(client.default_database().unwrap().name(), "app");
        client.close(false).await.unwrap();

        let (client, _) = scripted();
        let err = client.default_database().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_and_list_database_names() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "ok": 1 });
        transport.push_reply(doc! {
            "databases": [{ "name": "admin" }, { "name": "app" }],
            "ok": 1,
        });

        client.ping().await.unwrap();
        let names = client.list_database_names().await.unwrap();
        assert_eq!(names, vec!["admin".to_string(), "app".to_string()]);

        let commands = transport.commands();
        assert_eq!(commands[0].database, "admin");
        assert_eq!(commands[0].name(), "ping");
        assert_eq!(commands[1].name(), "listDatabases");
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_operations() {
        let (client, transport) = scripted();
        let users = users(&client);

        client.close(true).await.unwrap();
        client.close(false).await.unwrap();
        assert!(client.is_closed());
        assert_eq!(transport.shutdown_mode(), Some(true));

        let err = users.insert_one(User::new("Late", "late@test.com"), None).await.unwrap_err();
        assert!(err.is_connection_error());
        let err = client.start_session(None).await.unwrap_err();
        assert!(err.is_connection_error());
    }
}

// ============================================================================
// Collection Tests
// ============================================================================

mod collection_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_insert_one_generates_id() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "n": 1, "ok": 1 });

        let result = users(&client)
            .insert_one(User::new("John", "john@test.com"), None)
            .await
            .unwrap();

        let sent = transport.last_command().unwrap().command;
        let documents = sent.get_array("documents").unwrap();
        let inserted = documents[0].as_document().unwrap();
        assert_eq!(inserted.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(inserted.get("_id"), Some(&result.inserted_id));
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_one_keeps_existing_id() {
        let (client, transport) = scripted();
        let id = ObjectId::new();

        let result = users(&client)
            .insert_one(User::new("John", "john@test.com").with_id(id), None)
            .await
            .unwrap();
        assert_eq!(result.inserted_id, Bson::ObjectId(id));
        assert_eq!(transport.command_names(), vec!["insert"]);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_many_returns_distinct_ids() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "n": 3, "ok": 1 });

        let result = users(&client)
            .insert_many(
                vec![
                    User::new("A", "a@test.com"),
                    User::new("B", "b@test.com"),
                    User::new("C", "c@test.com"),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.inserted_ids.len(), 3);
        assert_ne!(result.inserted_ids[0], result.inserted_ids[1]);
        assert_ne!(result.inserted_ids[1], result.inserted_ids[2]);
        assert_ne!(result.inserted_ids[0], result.inserted_ids[2]);

        let sent = transport.last_command().unwrap().command;
        assert_eq!(sent.get_bool("ordered").unwrap(), true);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_many_unordered_reports_every_failure() {
        let (client, transport) = scripted();
        transport.push_reply(doc! {
            "n": 1,
            "writeErrors": [
                { "index": 0, "code": 11000, "errmsg": "E11000 duplicate key" },
                { "index": 2, "code": 121, "errmsg": "Document failed validation" },
            ],
            "ok": 1,
        });

        let options = InsertManyOptions {
            ordered: Some(false),
            ..Default::default()
        };
        let err = users(&client)
            .insert_many(
                vec![
                    User::new("A", "a@test.com"),
                    User::new("B", "b@test.com"),
                    User::new("C", "c@test.com"),
                ],
                options,
            )
            .await
            .unwrap_err();

        match err {
            MongoError::BulkWrite {
                ref failures,
                applied,
                ..
            } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[1].index, 2);
                assert_eq!(applied, 1);
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_duplicate_key());
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_key_on_insert() {
        let (client, transport) = scripted();
        transport.push_reply(doc! {
            "n": 0,
            "writeErrors": [{
                "index": 0,
                "code": 11000,
                "errmsg": "E11000 duplicate key error collection: app.users index: email_1",
                "keyValue": { "email": "john@test.com" },
            }],
            "ok": 1,
        });

        let err = users(&client)
            .insert_one(User::new("John", "john@test.com"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.code(), Some(11000));
        match err {
            MongoError::DuplicateKey(failure) => {
                assert_eq!(failure.details, Some(doc! { "email": "john@test.com" }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_with_plain_document_never_dispatches() {
        let (client, transport) = scripted();

        let err = users(&client)
            .update_one(doc! { "name": "John" }, doc! { "name": "Jane" }, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = users(&client)
            .update_many(doc! {}, Document::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(transport.commands().is_empty());
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_one_builds_statement() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "n": 1, "nModified": 1, "ok": 1 });

        let options = UpdateOptions::builder()
            .array_filters(vec![doc! { "elem.grade": { "$gte": 85 } }])
            .build();
        let result = users(&client)
            .update_one(
                doc! { "email": "john@test.com" },
                doc! { "$set": { "name": "Jane" } },
                options,
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);
        assert!(result.upserted_id.is_none());

        let sent = transport.last_command().unwrap().command;
        let statement = sent.get_array("updates").unwrap()[0]
            .as_document()
            .unwrap()
            .clone();
        assert_eq!(statement.get_document("q").unwrap(), &doc! { "email": "john@test.com" });
        assert_eq!(statement.get_bool("multi").unwrap(), false);
        assert!(statement.get_array("arrayFilters").is_ok());
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_one_upsert_reports_new_id() {
        let (client, transport) = scripted();
        let new_id = ObjectId::new();
        transport.push_reply(doc! {
            "n": 1,
            "nModified": 0,
            "upserted": [{ "index": 0, "_id": new_id }],
            "ok": 1,
        });

        let options = ReplaceOptions {
            upsert: Some(true),
            ..Default::default()
        };
        let result = users(&client)
            .replace_one(
                doc! { "email": "nobody@test.com" },
                User::new("Nobody", "nobody@test.com"),
                options,
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 0);
        assert_eq!(result.modified_count, 0);
        assert_eq!(result.upserted_id, Some(Bson::ObjectId(new_id)));

        let sent = transport.last_command().unwrap().command;
        let statement = sent.get_array("updates").unwrap()[0].as_document().unwrap().clone();
        assert_eq!(statement.get_bool("upsert").unwrap(), true);
        assert_eq!(statement.get_document("u").unwrap().get_str("name").unwrap(), "Nobody");
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "n": 1, "ok": 1 });
        transport.push_reply(doc! { "n": 4, "ok": 1 });

        let users = users(&client);
        let one = users.delete_one(doc! { "name": "A" }, None).await.unwrap();
        let many = users.delete_many(doc! { "active": false }, None).await.unwrap();
        assert_eq!(one.deleted_count, 1);
        assert_eq!(many.deleted_count, 4);

        let limits: Vec<i32> = transport
            .commands()
            .iter()
            .map(|c| {
                c.command.get_array("deletes").unwrap()[0]
                    .as_document()
                    .unwrap()
                    .get_i32("limit")
                    .unwrap()
            })
            .collect();
        assert_eq!(limits, vec![1, 0]);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_many_sorted() {
        let (client, transport) = scripted();
        transport.push_cursor(
            0,
            "app.users",
            vec![user_doc("Carol", 41), user_doc("Bob", 35), user_doc("Alice", 28)],
            true,
        );

        let options = FindOptions::builder().sort(doc! { "age": -1 }).limit(10).build();
        let found = users(&client)
            .find_many(doc! { "active": true }, options)
            .await
            .unwrap();
        let ages: Vec<i32> = found.iter().map(|u| u.age).collect();
        assert_eq!(ages, vec![41, 35, 28]);

        let sent = transport.last_command().unwrap().command;
        assert_eq!(sent.get_str("find").unwrap(), "users");
        assert_eq!(sent.get_document("sort").unwrap(), &doc! { "age": -1 });
        assert_eq!(sent.get_i64("limit").unwrap(), 10);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_one_by_id() {
        let (client, transport) = scripted();
        let id = ObjectId::new();
        let mut found = user_doc("Alice", 28);
        found.insert("_id", id);
        transport.push_cursor(0, "app.users", vec![found], true);
        transport.push_cursor(0, "app.users", vec![], true);

        let users = users(&client);
        let user = users.find_one_by_id(id, None).await.unwrap().unwrap();
        assert_eq!(user._id, Some(id));
        assert!(users.find_one_by_id(ObjectId::new(), None).await.unwrap().is_none());

        let sent = transport.commands()[0].command.clone();
        assert_eq!(sent.get_document("filter").unwrap(), &doc! { "_id": id });
        assert_eq!(sent.get_bool("singleBatch").unwrap(), true);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_documents_and_distinct() {
        let (client, transport) = scripted();
        transport.push_cursor(0, "app.users", vec![doc! { "_id": 1, "n": 7 }], true);
        transport.push_reply(doc! { "values": ["a@test.com", "b@test.com"], "ok": 1 });

        let users = users(&client);
        assert_eq!(users.count_documents(doc! { "active": true }, None).await.unwrap(), 7);
        let emails = users.distinct("email", None, None).await.unwrap();
        assert_eq!(emails.len(), 2);

        assert_eq!(transport.command_names(), vec!["aggregate", "distinct"]);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_preference_and_write_concern_inheritance() {
        let options = ClientOptions::builder()
            .read_preference(ReadPreference::secondary_preferred())
            .write_concern(WriteConcern::majority())
            .build();
        let (client, transport) = scripted_with(options);
        transport.push_cursor(0, "app.users", vec![], true);

        let users = users(&client);
        users.find_many(None, None).await.unwrap();
        users.insert_one(User::new("A", "a@test.com"), None).await.unwrap();

        let commands = transport.commands();
        assert_eq!(
            commands[0].read_preference,
            Some(ReadPreference::secondary_preferred())
        );
        assert_eq!(
            commands[1].command.get_document("writeConcern").unwrap(),
            &WriteConcern::majority().to_document()
        );
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_unique_index_then_duplicate() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "createdCollectionAutomatically": true, "ok": 1 });
        transport.push_reply(doc! { "n": 1, "ok": 1 });
        transport.push_reply(doc! {
            "ok": 0,
            "code": 11000,
            "codeName": "DuplicateKey",
            "errmsg": "E11000 duplicate key error",
        });

        let users = users(&client);
        let index_options = IndexOptions {
            unique: Some(true),
            ..Default::default()
        };
        let created = users.create_index("email", index_options, None).await.unwrap();
        assert_eq!(created.index_name, "email_1");

        users.insert_one(User::new("A", "dup@test.com"), None).await.unwrap();
        let err = users
            .insert_one(User::new("B", "dup@test.com"), None)
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        client.close(false).await.unwrap();
    }
}

// ============================================================================
// Cursor Tests
// ============================================================================

mod cursor_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_cursor_drains_across_get_more() {
        let (client, transport) = scripted();
        transport.push_cursor(
            42,
            "app.users",
            vec![user_doc("A", 1), user_doc("B", 2)],
            true,
        );
        transport.push_cursor(42, "app.users", vec![user_doc("C", 3), user_doc("D", 4)], false);
        transport.push_cursor(0, "app.users", vec![user_doc("E", 5)], false);

        let options = FindOptions::builder().batch_size(2).build();
        let cursor = users(&client).find(None, options).await.unwrap();
        let drained = cursor.collect().await.unwrap();
        assert_eq!(drained.len(), 5);
        assert_eq!(drained[4].name, "E");

        assert_eq!(transport.command_names(), vec!["find", "getMore", "getMore"]);
        let get_more = transport.commands()[1].command.clone();
        assert_eq!(get_more.get_i64("getMore").unwrap(), 42);
        assert_eq!(get_more.get_str("collection").unwrap(), "users");
        assert_eq!(get_more.get_i64("batchSize").unwrap(), 2);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_next_batch_and_to_list() {
        let (client, transport) = scripted();
        transport.push_cursor(
            0,
            "app.users",
            (1..=5).map(|i| user_doc(&format!("U{i}"), i)).collect(),
            true,
        );

        let mut cursor = users(&client).find(None, None).await.unwrap();
        let first = cursor.next_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = cursor.to_list(None).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert!(cursor.try_next().await.unwrap().is_none());
        assert!(cursor.is_exhausted());
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_advance_and_current() {
        let (client, transport) = scripted();
        transport.push_cursor(0, "app.users", vec![user_doc("Alice", 28)], true);

        let mut cursor = users(&client).find(None, None).await.unwrap();
        assert!(cursor.current().is_err());
        assert!(cursor.advance().await.unwrap());
        assert_eq!(cursor.current().unwrap().name, "Alice");
        assert!(!cursor.advance().await.unwrap());
        assert_eq!(cursor.current().unwrap_err().kind(), ErrorKind::CursorExhausted);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_tailable_cursor_stays_open_on_empty_batch() {
        let (client, transport) = scripted();
        transport.push_cursor(9, "app.log", vec![doc! { "msg": "first" }], true);
        transport.push_cursor(9, "app.log", vec![], false);
        transport.push_cursor(9, "app.log", vec![doc! { "msg": "second" }], false);

        let log = client.database("app").collection::<Document>("log");
        let options = FindOptions::builder().cursor_type(CursorType::Tailable).build();
        let mut cursor = log.find(None, options).await.unwrap();

        assert!(cursor.is_tailable());
        assert_eq!(cursor.try_next().await.unwrap().unwrap().get_str("msg").unwrap(), "first");
        assert!(cursor.try_next().await.unwrap().is_none());
        assert!(!cursor.is_exhausted());
        assert_eq!(cursor.try_next().await.unwrap().unwrap().get_str("msg").unwrap(), "second");

        cursor.close().await.unwrap();
        assert_eq!(
            transport.command_names(),
            vec!["find", "getMore", "getMore", "killCursors"]
        );

        // one implicit session spans the cursor's whole life
        let commands = transport.commands();
        let lsid = commands[0].command.get_document("lsid").unwrap().clone();
        for recorded in &commands {
            assert_eq!(recorded.command.get_document("lsid").unwrap(), &lsid);
            assert_eq!(recorded.session.as_ref(), Some(&lsid));
        }
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_cursor_with_orders() {
        let (client, transport) = scripted();
        let user_id = ObjectId::new();
        transport.push_cursor(
            0,
            "app.orders",
            vec![
                bson::to_document(&Order::new(user_id, "Laptop", 1, 999.99)).unwrap(),
                bson::to_document(&Order::new(user_id, "Mouse", 2, 29.99)).unwrap(),
            ],
            true,
        );

        let orders = client
            .database("app")
            .collection::<Order>("orders")
            .find_many(doc! { "user_id": user_id }, None)
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].product, "Laptop");
        assert_eq!(orders[1].quantity, 2);
        assert_eq!(orders[1].status, "pending");
        client.close(false).await.unwrap();
    }
}

// ============================================================================
// Database Tests
// ============================================================================

mod database_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_command_targets_database() {
        let (client, transport) = scripted();
        transport.push_reply(doc! { "buildInfo": 1, "version": "7.0.0", "ok": 1 });

        let reply = client
            .database("app")
            .run_command(doc! { "buildInfo": 1 }, None)
            .await
            .unwrap();
        assert_eq!(reply.get_str("version").unwrap(), "7.0.0");
        assert_eq!(transport.last_command().unwrap().database, "app");
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_command_server_error() {
        let (client, transport) = scripted();
        transport.push_reply(doc! {
            "ok": 0,
            "code": 59,
            "codeName": "CommandNotFound",
            "errmsg": "no such command: 'bogus'",
        });

        let err = client
            .database("app")
            .run_command(doc! { "bogus": 1 }, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailure);
        assert_eq!(err.code(), Some(59));
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_collection_names() {
        let (client, transport) = scripted();
        transport.push_cursor(
            0,
            "app.$cmd.listCollections",
            vec![
                doc! { "name": "users", "type": "collection" },
                doc! { "name": "orders", "type": "collection" },
            ],
            true,
        );

        let names = client
            .database("app")
            .list_collection_names(None)
            .await
            .unwrap();
        assert_eq!(names, vec!["users".to_string(), "orders".to_string()]);
        let sent = transport.last_command().unwrap().command;
        assert_eq!(sent.get_bool("nameOnly").unwrap(), true);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_missing_collection_is_not_an_error() {
        let (client, transport) = scripted();
        transport.push_reply(doc! {
            "ok": 0,
            "code": 26,
            "codeName": "NamespaceNotFound",
            "errmsg": "ns not found",
        });

        users(&client).drop(None).await.unwrap();
        assert_eq!(transport.command_names(), vec!["drop"]);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_gridfs_missing_file() {
        let (client, transport) = scripted();
        transport.push_cursor(0, "app.fs.files", vec![], true);

        let bucket = client.database("app").gridfs_bucket(None);
        let err = bucket.get_by_id(ObjectId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoFile);
        client.close(false).await.unwrap();
    }
}

// ============================================================================
// Session Tests
// ============================================================================

mod session_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_transaction_decorates_commands() {
        let (client, transport) = scripted();
        let users = users(&client);
        let session = client.start_session(None).await.unwrap();

        session.start_transaction(None).await.unwrap();
        users
            .insert_one_with_session(User::new("A", "a@test.com"), None, &session)
            .await
            .unwrap();
        users
            .insert_one_with_session(User::new("B", "b@test.com"), None, &session)
            .await
            .unwrap();
        session.commit_transaction().await.unwrap();

        let commands = transport.commands();
        assert_eq!(
            transport.command_names(),
            vec!["insert", "insert", "commitTransaction"]
        );

        let first = &commands[0].command;
        assert_eq!(first.get_document("lsid").unwrap(), session.id());
        assert_eq!(first.get_i64("txnNumber").unwrap(), 1);
        assert_eq!(first.get_bool("startTransaction").unwrap(), true);
        assert_eq!(first.get_bool("autocommit").unwrap(), false);

        let second = &commands[1].command;
        assert!(!second.contains_key("startTransaction"));
        assert_eq!(second.get_i64("txnNumber").unwrap(), 1);

        let commit = &commands[2];
        assert_eq!(commit.database, "admin");
        assert_eq!(commit.command.get_i64("txnNumber").unwrap(), 1);
        assert!(!session.in_transaction().await);

        session.end_session().await.unwrap();
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_with_transaction_aborts_on_error() {
        let (client, transport) = scripted();
        let session = client.start_session(None).await.unwrap();

        let err = session
            .with_transaction(users(&client), None, |s, users| {
                async move {
                    users
                        .insert_one_with_session(User::new("A", "a@test.com"), None, s)
                        .await?;
                    Err::<(), _>(MongoError::invalid_argument("rollback"))
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(transport.command_names(), vec!["insert", "abortTransaction"]);
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_causal_read_after_write() {
        let (client, transport) = scripted();
        let ts = bson::Timestamp {
            time: 1_700_000_000,
            increment: 3,
        };
        transport.push_reply(doc! { "n": 1, "operationTime": ts, "ok": 1 });
        transport.push_cursor(0, "app.users", vec![], true);

        let users = users(&client);
        let session = client
            .start_session(SessionOptions {
                causal_consistency: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        users
            .insert_one_with_session(User::new("A", "a@test.com").with_age(3), None, &session)
            .await
            .unwrap();
        users
            .find_many_with_session(None, None, &session)
            .await
            .unwrap();

        let find = transport.last_command().unwrap().command;
        let read_concern = find.get_document("readConcern").unwrap();
        assert_eq!(read_concern.get_timestamp("afterClusterTime").unwrap(), ts);
        session.end_session().await.unwrap();
        client.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let (client, _) = scripted();
        let session = client.start_session(None).await.unwrap();
        let err = session.commit_transaction().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transaction);
        client.close(false).await.unwrap();
    }
}

// ============================================================================
// Error Tests
// ============================================================================

mod error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_connection() {
        let err = MongoError::connection("Connection refused");
        assert!(err.is_connection_error());
        assert!(!err.is_duplicate_key());
        assert!(!err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("Connection refused"));
    }

    #[test]
    fn test_error_command() {
        let err = MongoError::command(59, "Unknown command");
        assert_eq!(err.code(), Some(59));
        assert_eq!(err.kind(), ErrorKind::OperationFailure);
    }

    #[test]
    fn test_error_timeout_by_code() {
        let err = MongoError::command(50, "operation exceeded time limit");
        assert!(err.is_timeout());
        assert!(!MongoError::command(51, "other").is_timeout());
    }

    #[test]
    fn test_error_namespace_not_found() {
        assert!(MongoError::command(26, "ns not found").is_namespace_not_found());
    }

    #[test]
    fn test_error_cursor_exhausted() {
        let err = MongoError::CursorExhausted;
        assert_eq!(err.kind(), ErrorKind::CursorExhausted);
        assert!(err.code().is_none());
    }

    #[test]
    fn test_error_serialization() {
        let err = MongoError::Serialization("Failed to serialize".to_string());
        assert_eq!(err.kind(), ErrorKind::Serialization);
        let err = MongoError::Deserialization("Failed to deserialize".to_string());
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_error_message() {
        let err = MongoError::connection("Test error message");
        assert_eq!(err.message(), "connection error: Test error message");
    }

    #[test]
    fn test_error_invalid_argument() {
        let err = MongoError::invalid_argument("Field cannot be empty");
        assert!(err.to_string().contains("Field cannot be empty"));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_error_labels_default_empty() {
        let err = MongoError::command(112, "WriteConflict");
        assert!(err.labels().is_empty());
        assert!(!err.has_label("TransientTransactionError"));
    }
}

// ============================================================================
// Serialization Tests
// ============================================================================

mod serialization_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_to_document() {
        let user = User::new("John", "john@example.com").with_age(30);
        let document = bson::to_document(&user).unwrap();
        assert_eq!(document.get_str("name").unwrap(), "John");
        assert_eq!(document.get_i32("age").unwrap(), 30);
        assert!(!document.contains_key("_id"));
    }

    #[test]
    fn test_user_from_document_defaults() {
        let user: User =
            bson::from_document(doc! { "name": "Minimal", "email": "min@test.com" }).unwrap();
        assert_eq!(user.age, 0);
        assert!(!user.active);
    }

    #[test]
    fn test_user_with_object_id() {
        let oid = ObjectId::new();
        let user = User::new("Test", "test@test.com").with_id(oid);
        let document = bson::to_document(&user).unwrap();
        assert_eq!(document.get_object_id("_id").unwrap(), oid);
    }

    #[test]
    fn test_order_serialization() {
        let order = Order::new(ObjectId::new(), "Widget", 5, 19.99);
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"product\":\"Widget\""));
        assert!(json.contains("\"quantity\":5"));
    }
}

// ============================================================================
// Prelude Tests
// ============================================================================

mod prelude_tests {
    use mongo_async::prelude::*;

    #[test]
    fn test_prelude_doc_macro() {
        let document: Document = doc! { "test": "value" };
        assert_eq!(document.get_str("test").unwrap(), "value");
    }

    #[test]
    fn test_prelude_error_type() {
        let err: Result<()> = Err(MongoError::CursorExhausted);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::CursorExhausted);
    }

    #[test]
    fn test_prelude_options() {
        let _ = FindOptions::default();
        let _ = UpdateOptions::default();
    }
}

// ============================================================================
// Library Function Tests
// ============================================================================

mod lib_tests {
    #[test]
    fn test_version() {
        assert_eq!(mongo_async::version(), env!("CARGO_PKG_VERSION"));
    }
}
