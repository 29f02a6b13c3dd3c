//! Postgres + pgvector backend: one table per collection.

use anyhow::{anyhow, Context, Result};
use crc32fast::Hasher as Crc32;
use pgvector::Vector;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::{Client, NoTls, Row};

use super::{Collection, CollectionName, MetadataFilter, SearchHit, VectorEntry};
use crate::bundle::Metadata;

/// Postgres silently truncates identifiers longer than this many bytes (NAMEDATALEN - 1).
const MAX_IDENT_BYTES: usize = 63;

/// Connection to a pgvector-enabled database.
///
/// Calls block on a private current-thread runtime, so the store can be driven from
/// synchronous code.
pub struct PgVectorStore {
    runtime: Runtime,
    client: Client,
    schema: String,
}

impl PgVectorStore {
    /// Connects and ensures the `vector` extension exists.
    pub fn connect(database_url: &str, schema: &str) -> Result<Self> {
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(database_url, NoTls))
            .context("failed to connect to Postgres")?;
        runtime.spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });
        runtime
            .block_on(client.execute("CREATE EXTENSION IF NOT EXISTS vector", &[]))
            .context("failed to ensure pgvector extension")?;
        Ok(Self {
            runtime,
            client,
            schema: schema.to_string(),
        })
    }

    fn qualified(&self, name: &CollectionName) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&table_ident(name)))
    }
}

impl super::VectorStore for PgVectorStore {
    fn open_or_create(&mut self, name: &CollectionName) -> Result<Box<dyn Collection + '_>> {
        let table = self.qualified(name);
        self.runtime
            .block_on(self.client.execute(&create_table_sql(&table), &[]))
            .with_context(|| format!("failed to create collection table {table}"))?;
        Ok(Box::new(PgCollection {
            store: self,
            table,
        }))
    }

    fn location(&self, name: &CollectionName) -> String {
        format!("postgres table {}", self.qualified(name))
    }
}

struct PgCollection<'a> {
    store: &'a mut PgVectorStore,
    table: String,
}

impl PgCollection<'_> {
    fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let store = &*self.store;
        store
            .runtime
            .block_on(store.client.query(sql, params))
            .with_context(|| format!("query against {} failed", self.table))
    }
}

impl Collection for PgCollection<'_> {
    fn count(&self) -> Result<usize> {
        let rows = self.query(&format!("SELECT COUNT(*) AS n FROM {}", self.table), &[])?;
        let count: i64 = rows
            .first()
            .map(|row| row.get("n"))
            .ok_or_else(|| anyhow!("COUNT returned no rows"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn ids(&self) -> Result<Vec<String>> {
        let rows = self.query(&format!("SELECT id FROM {} ORDER BY id", self.table), &[])?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    fn get(&self, id: &str) -> Result<Option<VectorEntry>> {
        let sql = format!(
            "SELECT id, document, metadata, embedding FROM {} WHERE id = $1",
            self.table
        );
        let rows = self.query(&sql, &[&id])?;
        Ok(rows.first().map(|row| {
            let Json(metadata): Json<Metadata> = row.get("metadata");
            let embedding: Vector = row.get("embedding");
            VectorEntry {
                id: row.get("id"),
                document: row.get("document"),
                metadata,
                embedding: embedding.to_vec(),
            }
        }))
    }

    fn upsert(&mut self, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let sql = upsert_sql(&self.table);
        let table = &self.table;
        let PgVectorStore { runtime, client, .. } = &mut *self.store;
        runtime.block_on(async {
            let transaction = client.transaction().await?;
            let statement = transaction.prepare(&sql).await?;
            for entry in entries {
                let vector = Vector::from(entry.embedding.clone());
                let metadata = Json(&entry.metadata);
                transaction
                    .execute(&statement, &[&entry.id, &entry.document, &metadata, &vector])
                    .await
                    .with_context(|| format!("failed to upsert {} into {table}", entry.id))?;
            }
            transaction.commit().await?;
            Ok::<(), anyhow::Error>(())
        })
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
        let ids = ids.to_vec();
        let store = &*self.store;
        let removed = store
            .runtime
            .block_on(store.client.execute(&sql, &[&ids]))
            .with_context(|| format!("failed to delete from {}", self.table))?;
        Ok(removed as usize)
    }

    fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = Vector::from(query.to_vec());
        let filter = Json(filter);
        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let rows = self.query(&search_sql(&self.table), &[&vector, &filter, &limit])?;
        Ok(rows
            .iter()
            .map(|row| {
                let Json(metadata): Json<Metadata> = row.get("metadata");
                let distance: f64 = row.get("distance");
                SearchHit {
                    id: row.get("id"),
                    document: row.get("document"),
                    metadata,
                    score: (1.0 - distance) as f32,
                }
            })
            .collect())
    }
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL,
            metadata JSONB NOT NULL,
            embedding VECTOR NOT NULL
        )"
    )
}

fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (id, document, metadata, embedding) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (id) DO UPDATE SET \
            document = EXCLUDED.document, \
            metadata = EXCLUDED.metadata, \
            embedding = EXCLUDED.embedding"
    )
}

fn search_sql(table: &str) -> String {
    format!(
        "SELECT id, document, metadata, embedding <=> $1 AS distance \
         FROM {table} WHERE metadata @> $2 \
         ORDER BY embedding <=> $1 ASC, id ASC LIMIT $3"
    )
}

/// Table name for a collection. Names over the identifier limit keep a prefix and gain a
/// checksum of the full name, so distinct collections never share a table.
fn table_ident(name: &CollectionName) -> String {
    let name = name.as_str();
    if name.len() <= MAX_IDENT_BYTES {
        return name.to_string();
    }
    let mut hasher = Crc32::new();
    hasher.update(name.as_bytes());
    let suffix = format!("_{:08x}", hasher.finalize());
    let mut cut = MAX_IDENT_BYTES - suffix.len();
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{suffix}", &name[..cut])
}

/// Quotes Postgres identifiers, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("module_341_x"), "\"module_341_x\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn short_collection_names_are_used_verbatim() {
        let name = CollectionName::for_module("341", "Urinary Catheterization").unwrap();
        assert_eq!(table_ident(&name), "module_341_urinary_catheterization");
    }

    #[test]
    fn long_names_sharing_a_prefix_map_to_distinct_tables() {
        let one = CollectionName::for_module(
            "341",
            "Urinary Catheterization And Bladder Irrigation Procedures Part One",
        )
        .unwrap();
        let two = CollectionName::for_module(
            "341",
            "Urinary Catheterization And Bladder Irrigation Procedures Part Two",
        )
        .unwrap();
        assert_eq!(one.as_str()[..63], two.as_str()[..63]);

        let (table_one, table_two) = (table_ident(&one), table_ident(&two));
        assert!(table_one.len() <= MAX_IDENT_BYTES, "{table_one}");
        assert!(table_two.len() <= MAX_IDENT_BYTES, "{table_two}");
        assert_ne!(table_one, table_two);
        assert_eq!(table_one, table_ident(&one));
        assert!(table_one.starts_with("module_341_urinary_catheterization_and_bladder"));
    }

    #[test]
    fn shortening_respects_character_boundaries() {
        let name = CollectionName::for_module("1", &"é".repeat(40)).unwrap();
        let table = table_ident(&name);
        assert!(table.len() <= MAX_IDENT_BYTES);
        assert!(table.starts_with("module_1_é"));
    }

    #[test]
    fn upsert_replaces_every_column_on_conflict() {
        let sql = upsert_sql("\"public\".\"module_1_m\"");
        assert!(sql.starts_with("INSERT INTO \"public\".\"module_1_m\""));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET"));
        for column in ["document", "metadata", "embedding"] {
            assert!(sql.contains(&format!("{column} = EXCLUDED.{column}")), "{column}");
        }
    }

    #[test]
    fn search_filters_with_jsonb_containment() {
        let sql = search_sql("t");
        assert!(sql.contains("WHERE metadata @> $2"));
        assert!(sql.contains("ORDER BY embedding <=> $1 ASC"));
    }
}
