#![allow(dead_code)]

use codeatlas::cache::{AnalyzerError, SourceAnalyzer};
use codeatlas::vector::{EmbeddingGenerator, VectorDimension, VectorError};
use codeatlas::{Edge, FileFacts, GraphStore, Node, NodeId, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const TEST_DIMENSION: usize = 16;

pub struct TestProject {
    pub dir: TempDir,
    pub cache_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            cache_dir: TempDir::new().expect("Failed to create cache dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn remove_file(&self, path: &str) {
        fs::remove_file(self.dir.path().join(path)).expect("Failed to remove file");
    }

    pub fn file(&self, path: &str) -> PathBuf {
        self.dir.path().join(path)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Settings with an isolated cache directory and `.ex` sources only.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.cache.directory = Some(self.cache_dir.path().to_path_buf());
        settings.indexing.extensions = vec!["ex".to_string()];
        settings.indexing.parallel_threads = 2;
        settings.semantic.batch_size = 4;
        settings
    }
}

/// Deterministic bag-of-tokens embedder.
///
/// Every token is hashed into one of `TEST_DIMENSION` buckets and the result
/// is L2-normalized, so texts sharing words are similar. Counts how many
/// texts it has embedded.
pub struct TestEmbedder {
    dimension: VectorDimension,
    embedded: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl TestEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: VectorDimension::new(TEST_DIMENSION).unwrap(),
            embedded: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    /// Texts embedded since the last call, in arrival order.
    pub fn take_seen(&self) -> Vec<String> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        embed_tokens(text)
    }
}

pub fn embed_tokens(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; TEST_DIMENSION];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let bucket = token
            .to_lowercase()
            .bytes()
            .fold(2166136261u32, |hash, b| (hash ^ b as u32).wrapping_mul(16777619));
        vector[bucket as usize % TEST_DIMENSION] += 1.0;
    }
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

impl EmbeddingGenerator for TestEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));
        Ok(texts.iter().map(|text| embed_tokens(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "test-embedder"
    }
}

/// Toy analyzer for `.ex` files with one fact per line:
///
/// ```text
/// module Billing
/// import Payments
/// def charge/2 Charges a card
/// call charge/2 -> Payments.submit/1
/// ```
pub struct LineAnalyzer;

impl SourceAnalyzer for LineAnalyzer {
    fn analyze(&self, _path: &Path, content: &str) -> Result<FileFacts, AnalyzerError> {
        let mut facts = FileFacts::default();
        let mut module: Option<String> = None;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));

            if keyword == "module" {
                let name = rest.trim().to_string();
                facts
                    .nodes
                    .push(Node::module(name.clone()).with_line(number as u32 + 1));
                module = Some(name);
                continue;
            }

            let current = module
                .clone()
                .ok_or_else(|| format!("line {}: '{keyword}' before module", number + 1))?;

            match keyword {
                "import" => facts.edges.push(Edge::imports(
                    NodeId::module(current),
                    NodeId::module(rest.trim()),
                )),
                "def" => {
                    let (signature, doc) = rest.split_once(' ').unwrap_or((rest, ""));
                    let (name, arity) = parse_signature(signature)?;
                    let id = NodeId::function(current.clone(), name, arity);
                    let mut node = Node::new(id.clone()).with_line(number as u32 + 1);
                    if !doc.trim().is_empty() {
                        node = node.with_text(doc.trim());
                    }
                    facts.nodes.push(node);
                    facts.edges.push(Edge::defines(NodeId::module(current), id));
                }
                "call" => {
                    let (caller, callee) = rest
                        .split_once("->")
                        .ok_or_else(|| format!("line {}: call needs '->'", number + 1))?;
                    let (name, arity) = parse_signature(caller.trim())?;
                    let callee: NodeId = callee.trim().parse()?;
                    facts
                        .edges
                        .push(Edge::calls(NodeId::function(current, name, arity), callee));
                }
                other => return Err(format!("line {}: unknown keyword '{other}'", number + 1).into()),
            }
        }
        Ok(facts)
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("ex")
    }
}

fn parse_signature(signature: &str) -> Result<(String, u8), AnalyzerError> {
    let (name, arity) = signature
        .split_once('/')
        .ok_or_else(|| format!("'{signature}' is not name/arity"))?;
    Ok((name.to_string(), arity.parse()?))
}

/// Store holding the given modules and `calls` edges between them.
pub fn module_graph(edges: &[(&str, &str)]) -> GraphStore {
    let store = GraphStore::new();
    for (from, to) in edges {
        store.upsert_node(Node::module(*from));
        store.upsert_node(Node::module(*to));
        store.upsert_edge(Edge::calls(NodeId::module(*from), NodeId::module(*to)));
    }
    store
}

pub fn m(name: &str) -> NodeId {
    NodeId::module(name)
}

pub mod sample_code {
    pub const BILLING: &str = "module Billing
import Payments
def charge/2 Charges a card and records the payment
def refund/1 Refunds a previous charge
call charge/2 -> Payments.submit/1
call refund/1 -> Payments.submit/1
";

    pub const PAYMENTS: &str = "module Payments
def submit/1 Submits a payment to the gateway
call submit/1 -> Gateway.post/2
";

    pub const GATEWAY: &str = "module Gateway
def post/2 Posts a request over HTTPS
";

    pub const BILLING_EDITED: &str = "module Billing
import Payments
def charge/3 Charges a card with an idempotency key
call charge/3 -> Payments.submit/1
";
}
