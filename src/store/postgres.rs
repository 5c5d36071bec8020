use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{record_id, Condition, DocumentStore, Filter, Query, Record};

/// Postgres-backed store: every collection lives in one JSONB table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
        Ok(Self { pool })
    }
}

// Field names come from code, never from requests.
fn json_path(field: &str) -> String {
    debug_assert!(field.chars().all(|c| c.is_ascii_alphanumeric()));
    format!("data -> '{field}'")
}

fn text_path(field: &str) -> String {
    debug_assert!(field.chars().all(|c| c.is_ascii_alphanumeric()));
    format!("(data ->> '{field}')::timestamptz")
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    qb.push(" WHERE collection = ").push_bind(collection.to_string());
    for condition in &filter.0 {
        match condition {
            Condition::Eq(field, value) => {
                qb.push(format!(" AND COALESCE({}, 'null'::jsonb) = ", json_path(field)))
                    .push_bind(Json(value.clone()));
            }
            Condition::Between { field, from, to } => {
                if let Some(from) = from {
                    qb.push(format!(" AND {} >= ", text_path(field)))
                        .push_bind(*from);
                }
                if let Some(to) = to {
                    qb.push(format!(" AND {} <= ", text_path(field)))
                        .push_bind(*to);
                }
            }
        }
    }
}

fn into_record(value: Value) -> anyhow::Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("stored document is not an object: {other}"),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, collection: &str, record: Record) -> anyhow::Result<Record> {
        let id = record_id(&record)?;
        let (data,): (Json<Value>,) = sqlx::query_as(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            RETURNING data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(record)))
        .fetch_one(&self.pool)
        .await
        .context("insert document")?;
        into_record(data.0)
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<Option<Record>> {
        let row: Option<(Json<Value>,)> = sqlx::query_as(
            r#"
            SELECT data
              FROM documents
             WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find document")?;
        row.map(|(data,)| into_record(data.0)).transpose()
    }

    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<Record>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT data FROM documents");
        push_where(&mut qb, collection, &query.filter);
        let sort = query.sort.unwrap_or(super::Sort::newest("createdAt"));
        let dir = if sort.descending { "DESC" } else { "ASC" };
        qb.push(format!(" ORDER BY {} {dir}, id {dir}", text_path(sort.field)));
        if let Some(page) = query.page {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
                .push(" OFFSET ")
                .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        }
        let rows: Vec<(Json<Value>,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("find documents")?;
        rows.into_iter().map(|(data,)| into_record(data.0)).collect()
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: Uuid,
        mut patch: Record,
    ) -> anyhow::Result<Option<Record>> {
        patch.remove("id");
        let row: Option<(Json<Value>,)> = sqlx::query_as(
            r#"
            UPDATE documents
               SET data = data || $3
             WHERE collection = $1 AND id = $2
            RETURNING data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(patch)))
        .fetch_optional(&self.pool)
        .await
        .context("update document")?;
        row.map(|(data,)| into_record(data.0)).transpose()
    }

    async fn delete_by_id(&self, collection: &str, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete document")?;
        Ok(res.rows_affected() > 0)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_where(&mut qb, collection, filter);
        let (n,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .context("count documents")?;
        Ok(n.max(0) as u64)
    }
}
