//! Tantivy-backed sparse keyword arm.
//!
//! Schema: `id` is STRING (indexed, not tokenized) so `delete_term` works for
//! upsert-by-id; `text` is tokenized and stored; document metadata travels as
//! a stored JSON blob so the hybrid retriever can post-filter by exact match.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{self, Schema, Value as TantivyValue, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use super::{IndexDocument, KeywordIndex};
use crate::types::RetrievedNode;

pub struct TantivyKeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
    id_field: schema::Field,
    text_field: schema::Field,
    metadata_field: schema::Field,
}

impl TantivyKeywordIndex {
    fn build_schema() -> (Schema, schema::Field, schema::Field, schema::Field) {
        let mut sb = Schema::builder();
        let id_field = sb.add_text_field("id", STRING | STORED);
        let text_field = sb.add_text_field("text", TEXT | STORED);
        let metadata_field = sb.add_text_field("metadata_json", STORED);
        (sb.build(), id_field, text_field, metadata_field)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let index_path = path.join("keyword_index");
        std::fs::create_dir_all(&index_path).ok();

        let (schema, id_field, text_field, metadata_field) = Self::build_schema();

        let dir = tantivy::directory::MmapDirectory::open(&index_path)?;
        let index = if Index::exists(&dir)? {
            Index::open_in_dir(&index_path)?
        } else {
            Index::create_in_dir(&index_path, schema)?
        };

        Self::from_index(index, id_field, text_field, metadata_field)
    }

    /// RAM-backed index, used in tests and for the uploaded-case corpus when
    /// nothing needs to survive a restart.
    pub fn in_memory() -> Result<Self> {
        let (schema, id_field, text_field, metadata_field) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, id_field, text_field, metadata_field)
    }

    fn from_index(
        index: Index,
        id_field: schema::Field,
        text_field: schema::Field,
        metadata_field: schema::Field,
    ) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create Tantivy reader")?;

        let writer = index
            .writer(50_000_000)
            .context("Failed to create Tantivy writer")?;

        Ok(Self {
            index,
            reader,
            writer: parking_lot::Mutex::new(writer),
            id_field,
            text_field,
            metadata_field,
        })
    }

    fn search_sync(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedNode>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);

        // Free-text questions often contain characters the query grammar
        // rejects; fall back to a quoted phrase query.
        let parsed_query = match query_parser.parse_query(query) {
            Ok(q) => q,
            Err(_) => {
                let escaped = query.replace('"', "");
                query_parser.parse_query(&format!("\"{}\"", escaped))?
            }
        };

        let top_docs = searcher.search(&parsed_query, &TopDocs::with_limit(top_k))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let Ok(document) = searcher.doc::<TantivyDocument>(address) else {
                continue;
            };
            let id = document
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                continue;
            }
            let text = document
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata: HashMap<String, String> = document
                .get_first(self.metadata_field)
                .and_then(|v| v.as_str())
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();

            results.push(RetrievedNode {
                id,
                text,
                metadata,
                score,
            });
        }

        Ok(results)
    }

    fn upsert_sync(&self, documents: &[IndexDocument]) -> Result<()> {
        {
            let writer = self.writer.lock();
            for document in documents {
                let term = tantivy::Term::from_field_text(self.id_field, &document.id);
                writer.delete_term(term);
                let metadata_json = serde_json::to_string(&document.metadata)
                    .unwrap_or_else(|_| "{}".to_string());
                writer.add_document(doc!(
                    self.id_field => document.id.as_str(),
                    self.text_field => document.text.as_str(),
                    self.metadata_field => metadata_json.as_str(),
                ))?;
            }
        }
        self.commit()
    }

    fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.commit().context("Tantivy commit failed")?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.delete_all_documents()?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

#[async_trait]
impl KeywordIndex for TantivyKeywordIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedNode>> {
        self.search_sync(query, top_k)
    }

    async fn upsert(&self, documents: Vec<IndexDocument>) -> Result<()> {
        self.upsert_sync(&documents)
    }

    fn doc_count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }
}
