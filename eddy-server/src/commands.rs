//! Newline-delimited JSON front end for the index.
//!
//! Stands in for the request layer: one JSON object per input line, one JSON
//! reply per output line. Payload field names follow the HTTP service this
//! index was extracted from (`features_vectors`, `image_ids`, `n_results`).

use eddy_core::{IndexError, IndexLifecycle, SharedIndex};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

fn default_n_results() -> i64 {
    10
}

#[derive(Deserialize, Debug)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Insert {
        #[serde(default)]
        features_vectors: Vec<Vec<f32>>,
        #[serde(default)]
        image_ids: Option<Vec<u64>>,
    },
    Update {
        #[serde(default)]
        features_vectors: Vec<Vec<f32>>,
        #[serde(default)]
        image_ids: Option<Vec<u64>>,
    },
    Search {
        #[serde(default)]
        features_vectors: Vec<Vec<f32>>,
        #[serde(default = "default_n_results")]
        n_results: i64,
    },
    Count,
    Snapshot,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum Body {
    Indices { indices: Vec<u64> },
    Neighbours { indices: Vec<Vec<u64>>, distances: Vec<Vec<f32>> },
    Count { count: usize },
    Snapshot { path: String },
    Error { kind: String, message: String },
}

#[derive(Serialize, Debug)]
pub struct Reply {
    pub ok: bool,
    #[serde(flatten)]
    pub body: Body,
}

impl Reply {
    fn ok(body: Body) -> Self {
        Self { ok: true, body }
    }

    fn error(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            body: Body::Error { kind: kind.to_string(), message: message.into() },
        }
    }
}

impl From<IndexError> for Reply {
    fn from(e: IndexError) -> Self {
        Reply::error(e.kind(), e.to_string())
    }
}

pub struct Handler {
    lifecycle: Arc<IndexLifecycle>,
    index: Arc<SharedIndex>,
}

impl Handler {
    pub fn new(lifecycle: Arc<IndexLifecycle>) -> Self {
        Self { index: lifecycle.index(), lifecycle }
    }

    /// Parses and executes one request line.
    pub fn handle_line(&self, line: &str) -> Reply {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                info!("Rejected malformed request: {}", e);
                Reply::error("BadRequest", e.to_string())
            }
        }
    }

    pub fn handle(&self, request: Request) -> Reply {
        match request {
            Request::Insert { features_vectors, .. }
            | Request::Update { features_vectors, .. }
            | Request::Search { features_vectors, .. }
                if features_vectors.is_empty() =>
            {
                info!("Request without vector");
                Reply::error("NoVectorSpecified", "No features vectors specified")
            }
            Request::Insert { features_vectors, image_ids } => {
                match self.index.insert(&features_vectors, image_ids.as_deref(), false) {
                    Ok(indices) => {
                        info!("Inserted {} vectors, index length: {}", indices.len(), self.index.count());
                        Reply::ok(Body::Indices { indices })
                    }
                    Err(e) => {
                        info!("Insertion rejected: {}", e);
                        e.into()
                    }
                }
            }
            Request::Update { features_vectors, image_ids } => {
                match self.index.update(&features_vectors, image_ids.as_deref()) {
                    Ok(indices) => {
                        info!("Updated {} vectors, index length: {}", indices.len(), self.index.count());
                        Reply::ok(Body::Indices { indices })
                    }
                    Err(e) => {
                        info!("Update rejected: {}", e);
                        e.into()
                    }
                }
            }
            Request::Search { features_vectors, n_results } => self.search(&features_vectors, n_results),
            Request::Count => Reply::ok(Body::Count { count: self.index.count() }),
            Request::Snapshot => match self.lifecycle.snapshot() {
                Ok(path) => Reply::ok(Body::Snapshot { path: path.display().to_string() }),
                Err(e) => {
                    error!("Snapshot failed: {}", e);
                    e.into()
                }
            },
        }
    }

    fn search(&self, queries: &[Vec<f32>], n_results: i64) -> Reply {
        let k = match usize::try_from(n_results) {
            Ok(k) => k,
            Err(_) => {
                return IndexError::InvalidArgument(format!("n_results must be positive, got {}", n_results)).into()
            }
        };

        let start = Instant::now();
        let results = match self.index.search(queries, k) {
            Ok(results) => results,
            Err(e) => {
                info!("Search rejected: {}", e);
                return e.into();
            }
        };
        info!("Time for search: {:?}. Number of queries: {}", start.elapsed(), queries.len());

        let (indices, distances): (Vec<_>, Vec<_>) = results.into_iter().map(|r| (r.ids, r.distances)).unzip();
        Reply::ok(Body::Neighbours { indices, distances })
    }
}

/// Answers every request line from `input` on `output` until end of input.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W, handler: &Handler) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handler.handle_line(&line);
        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }
    Ok(())
}
