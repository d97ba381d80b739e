//! SeaORM implementation of DocumentStore
//!
//! Documents live as JSON bodies in a single `documents` table. Field
//! predicates and ordering are evaluated after decoding, so query cost is
//! linear in the size of the user's collection.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{
    BatchOp, Document, DocumentStore, DomainError, FieldFilter, OrderBy, StoreCollection,
    WriteBatch, apply_increment, apply_patch,
};
use crate::models::document::{ActiveModel, Column, Entity as DocumentEntity, Model};

/// SeaORM-based implementation of DocumentStore
pub struct SeaOrmDocumentStore {
    db: DatabaseConnection,
}

impl SeaOrmDocumentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn primary_key(user_id: &str, collection: StoreCollection, id: &str) -> (String, String, String) {
    (
        user_id.to_string(),
        collection.as_str().to_string(),
        id.to_string(),
    )
}

fn parse_body(model: &Model) -> Result<Map<String, Value>, DomainError> {
    Ok(serde_json::from_str(&model.body)?)
}

fn to_document(model: &Model) -> Result<Document, DomainError> {
    Ok(Document::new(model.doc_id.clone(), parse_body(model)?))
}

async fn load<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    collection: StoreCollection,
    id: &str,
) -> Result<Option<Model>, DomainError> {
    Ok(DocumentEntity::find_by_id(primary_key(user_id, collection, id))
        .one(conn)
        .await?)
}

async fn load_scope<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    collection: StoreCollection,
) -> Result<Vec<Document>, DomainError> {
    let rows = DocumentEntity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Collection.eq(collection.as_str()))
        .order_by_asc(Column::CreatedAt)
        .all(conn)
        .await?;

    rows.iter().map(to_document).collect()
}

async fn save_body<C: ConnectionTrait>(
    conn: &C,
    model: Model,
    data: Map<String, Value>,
) -> Result<(), DomainError> {
    let mut active: ActiveModel = model.into();
    active.body = Set(serde_json::to_string(&data)?);
    active.updated_at = Set(now_stamp());
    active.update(conn).await?;
    Ok(())
}

async fn update_in<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    collection: StoreCollection,
    id: &str,
    patch: Map<String, Value>,
) -> Result<(), DomainError> {
    let model = load(conn, user_id, collection, id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let mut data = parse_body(&model)?;
    apply_patch(&mut data, patch);
    save_body(conn, model, data).await
}

async fn increment_in<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    collection: StoreCollection,
    id: &str,
    field: &str,
    delta: i64,
) -> Result<(), DomainError> {
    let model = load(conn, user_id, collection, id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let mut data = parse_body(&model)?;
    apply_increment(&mut data, field, delta);
    save_body(conn, model, data).await
}

async fn delete_in<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    collection: StoreCollection,
    id: &str,
) -> Result<(), DomainError> {
    DocumentEntity::delete_by_id(primary_key(user_id, collection, id))
        .exec(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SeaOrmDocumentStore {
    async fn get(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
    ) -> Result<Option<Document>, DomainError> {
        match load(&self.db, user_id, collection, id).await? {
            Some(model) => Ok(Some(to_document(&model)?)),
            None => Ok(None),
        }
    }

    async fn find(
        &self,
        user_id: &str,
        collection: StoreCollection,
        filter: FieldFilter,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, DomainError> {
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        let docs = load_scope(&self.db, user_id, collection)
            .await?
            .into_iter()
            .filter(|doc| filter.matches(&doc.data))
            .take(limit)
            .collect();
        Ok(docs)
    }

    async fn list(
        &self,
        user_id: &str,
        collection: StoreCollection,
        order: Option<OrderBy>,
        limit: Option<u64>,
    ) -> Result<Vec<Document>, DomainError> {
        let mut docs = load_scope(&self.db, user_id, collection).await?;
        if let Some(order) = order {
            docs.sort_by(|a, b| order.compare(&a.data, &b.data));
        }
        if let Some(limit) = limit {
            docs.truncate(limit as usize);
        }
        Ok(docs)
    }

    async fn add(
        &self,
        user_id: &str,
        collection: StoreCollection,
        data: Map<String, Value>,
    ) -> Result<Document, DomainError> {
        let id = Uuid::new_v4().to_string();
        let now = now_stamp();

        let row = ActiveModel {
            user_id: Set(user_id.to_string()),
            collection: Set(collection.as_str().to_string()),
            doc_id: Set(id.clone()),
            body: Set(serde_json::to_string(&data)?),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };
        row.insert(&self.db).await?;

        tracing::debug!("Added {} document {}", collection, id);
        Ok(Document::new(id, data))
    }

    async fn update(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), DomainError> {
        let txn = self.db.begin().await?;
        update_in(&txn, user_id, collection, id, patch).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn delete(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
    ) -> Result<(), DomainError> {
        delete_in(&self.db, user_id, collection, id).await
    }

    async fn increment(
        &self,
        user_id: &str,
        collection: StoreCollection,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), DomainError> {
        let txn = self.db.begin().await?;
        increment_in(&txn, user_id, collection, id, field, delta).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn commit(&self, user_id: &str, batch: WriteBatch) -> Result<(), DomainError> {
        let size = batch.len();
        let txn = self.db.begin().await?;

        // Dropping the transaction on an early return rolls everything back
        for op in batch.into_ops() {
            match op {
                BatchOp::Update {
                    collection,
                    id,
                    patch,
                } => update_in(&txn, user_id, collection, &id, patch).await?,
                BatchOp::Increment {
                    collection,
                    id,
                    field,
                    delta,
                } => increment_in(&txn, user_id, collection, &id, &field, delta).await?,
                BatchOp::Delete { collection, id } => {
                    delete_in(&txn, user_id, collection, &id).await?
                }
            }
        }

        txn.commit().await?;
        tracing::debug!("Committed batch of {} operations", size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::init_db;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn store() -> SeaOrmDocumentStore {
        let db = init_db("sqlite::memory:").await.expect("Failed to init db");
        SeaOrmDocumentStore::new(db)
    }

    #[tokio::test]
    async fn documents_are_scoped_per_user() {
        let store = store().await;
        let doc = store
            .add("alice", StoreCollection::Genres, obj(json!({ "name": "Poetry" })))
            .await
            .unwrap();

        assert!(
            store
                .get("alice", StoreCollection::Genres, &doc.id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get("bob", StoreCollection::Genres, &doc.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get("alice", StoreCollection::Series, &doc.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_committed() {
        let store = store().await;
        let doc = store
            .add("alice", StoreCollection::Genres, obj(json!({ "bookCount": 1 })))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.increment(StoreCollection::Genres, &doc.id, "bookCount", 5);
        batch.update(StoreCollection::Genres, "missing", obj(json!({ "name": "x" })));

        let result = store.commit("alice", batch).await;
        assert!(matches!(result, Err(DomainError::NotFound)));

        let after = store
            .get("alice", StoreCollection::Genres, &doc.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.data["bookCount"], json!(1));
    }

    #[tokio::test]
    async fn list_orders_and_limits() {
        let store = store().await;
        for (title, created) in [("a", "2024-01-01"), ("b", "2024-03-01"), ("c", "2024-02-01")] {
            store
                .add(
                    "alice",
                    StoreCollection::Books,
                    obj(json!({ "title": title, "createdAt": format!("{created}T00:00:00Z") })),
                )
                .await
                .unwrap();
        }

        let docs = store
            .list("alice", StoreCollection::Books, Some(OrderBy::desc("createdAt")), Some(2))
            .await
            .unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d.data["title"].clone()).collect();
        assert_eq!(titles, vec![json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn find_matches_array_membership() {
        let store = store().await;
        store
            .add("alice", StoreCollection::Books, obj(json!({ "genres": ["g1", "g2"] })))
            .await
            .unwrap();
        store
            .add("alice", StoreCollection::Books, obj(json!({ "genres": ["g2"] })))
            .await
            .unwrap();

        let g1 = store
            .find("alice", StoreCollection::Books, FieldFilter::contains("genres", "g1"), None)
            .await
            .unwrap();
        let g2 = store
            .find("alice", StoreCollection::Books, FieldFilter::contains("genres", "g2"), Some(1))
            .await
            .unwrap();
        assert_eq!(g1.len(), 1);
        assert_eq!(g2.len(), 1);
    }
}
