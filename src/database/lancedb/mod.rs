//! Embedded LanceDB backend for local development and tests.
//!
//! All namespaces share one table; every row carries its namespace and
//! searches are filtered on it.


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use serde_json::Map;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::database::vector::{EmbeddingRecord, SearchHit, VectorStore};
use crate::{Result, StemError};

const TABLE_NAME: &str = "embeddings";

pub struct LanceStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    table: OnceCell<Table>,
}

impl LanceStore {
    /// Open (or create) the database directory at `path`.
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", path);

        std::fs::create_dir_all(path).map_err(|e| {
            StemError::VectorStore(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            dimension,
            table: OnceCell::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("namespace", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("bot_id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunker", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to list tables: {}", e)))?;
        Ok(names.contains(&self.table_name))
    }

    async fn open_existing(&self) -> Result<Table> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to get table schema: {}", e)))?;

        let existing = schema.fields().iter().find_map(|field| {
            match (field.name().as_str(), field.data_type()) {
                ("vector", DataType::FixedSizeList(_, size)) => Some(*size as usize),
                _ => None,
            }
        });

        match existing {
            Some(size) if size == self.dimension => Ok(table),
            Some(size) => Err(StemError::VectorStore(format!(
                "Index {} stores {}-dimensional vectors but the embedding model produces {}",
                self.table_name, size, self.dimension
            ))),
            None => Err(StemError::VectorStore(format!(
                "Index {} has no vector column",
                self.table_name
            ))),
        }
    }

    /// Table handle for writes, creating the table on first use.
    async fn writable_table(&self) -> Result<&Table> {
        self.table
            .get_or_try_init(|| async {
                if self.table_exists().await? {
                    return self.open_existing().await;
                }

                info!(
                    "Creating {} table with {} dimensions",
                    self.table_name, self.dimension
                );
                self.connection
                    .create_empty_table(&self.table_name, self.schema())
                    .execute()
                    .await
                    .map_err(|e| StemError::VectorStore(format!("Failed to create table: {}", e)))
            })
            .await
    }

    /// Table handle for reads; a missing table is reported as a missing index.
    async fn readable_table(&self) -> Result<Table> {
        if let Some(table) = self.table.get() {
            return Ok(table.clone());
        }

        if !self.table_exists().await? {
            return Err(StemError::VectorStore(format!(
                "Index {} not found",
                self.table_name
            )));
        }

        self.open_existing().await
    }

    fn record_batch(&self, namespace: &str, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            if record.vector.len() != self.dimension {
                return Err(StemError::VectorStore(format!(
                    "Vector {} has dimension {}, expected {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| StemError::VectorStore(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            string_array(records, |r| r.id.as_str()),
            Arc::new(vector_array),
            Arc::new(StringArray::from(vec![namespace; len])),
            string_array(records, |r| r.metadata.text.as_str()),
            string_array(records, |r| r.metadata.file_path.as_str()),
            Arc::new(UInt32Array::from(
                records
                    .iter()
                    .map(|r| r.metadata.chunk_index)
                    .collect::<Vec<_>>(),
            )),
            string_array(records, |r| r.metadata.bot_id.as_str()),
            string_array(records, |r| r.metadata.source.as_str()),
            string_array(records, |r| r.metadata.chunker.as_str()),
            string_array(records, |r| r.metadata.created_at.as_str()),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| StemError::VectorStore(format!("Failed to create record batch: {}", e)))
    }

    /// Number of rows stored in `namespace`.
    #[inline]
    pub async fn count(&self, namespace: &str) -> Result<usize> {
        if self.table.get().is_none() && !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.readable_table().await?;
        table
            .count_rows(Some(namespace_filter(namespace)))
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to count rows: {}", e)))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    fn name(&self) -> &str {
        "lancedb"
    }

    async fn upsert(&self, namespace: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(0);
        }

        let batch = self.record_batch(namespace, &records)?;
        let table = self.writable_table().await?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to insert embeddings: {}", e)))?;

        info!("Stored {} embeddings in {}", records.len(), namespace);
        Ok(records.len())
    }

    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if vector.len() != self.dimension {
            return Err(StemError::VectorStore(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        let table = self.readable_table().await?;
        let mut results = table
            .vector_search(vector)
            .map_err(|e| StemError::VectorStore(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(namespace_filter(namespace))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        debug!("Found {} hits in {}", hits.len(), namespace);
        Ok(hits)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        if self.table.get().is_none() && !self.table_exists().await? {
            return Ok(());
        }

        let table = self.readable_table().await?;
        table
            .delete(&namespace_filter(namespace))
            .await
            .map_err(|e| StemError::VectorStore(format!("Failed to delete namespace: {}", e)))?;

        info!("Deleted embeddings in {}", namespace);
        Ok(())
    }
}

/// SQL predicate selecting one namespace, with quotes escaped.
#[inline]
pub fn namespace_filter(namespace: &str) -> String {
    format!("namespace = '{}'", namespace.replace('\'', "''"))
}

fn string_array(records: &[EmbeddingRecord], field: fn(&EmbeddingRecord) -> &str) -> Arc<dyn Array> {
    Arc::new(StringArray::from(
        records.iter().map(field).collect::<Vec<_>>(),
    ))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StemError::VectorStore(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StemError::VectorStore(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let file_paths = string_column(batch, "file_path")?;
    let bot_ids = string_column(batch, "bot_id")?;
    let sources = string_column(batch, "source")?;
    let chunkers = string_column(batch, "chunker")?;
    let created_ats = string_column(batch, "created_at")?;
    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| StemError::VectorStore("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| StemError::VectorStore("Invalid chunk_index column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut metadata = Map::new();
        metadata.insert("filePath".to_string(), file_paths.value(row).into());
        metadata.insert("chunkIndex".to_string(), chunk_indices.value(row).into());
        metadata.insert("botId".to_string(), bot_ids.value(row).into());
        metadata.insert("source".to_string(), sources.value(row).into());
        metadata.insert("chunker".to_string(), chunkers.value(row).into());
        metadata.insert("createdAt".to_string(), created_ats.value(row).into());

        // Cosine distance; similarity is its complement
        let score = distances
            .filter(|d| !d.is_null(row))
            .map(|d| 1.0 - f64::from(d.value(row)));

        hits.push(SearchHit {
            id: ids.value(row).to_string(),
            text: texts.value(row).to_string(),
            metadata,
            score,
        });
    }

    Ok(hits)
}

impl std::fmt::Debug for LanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceStore")
            .field("table_name", &self.table_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}
