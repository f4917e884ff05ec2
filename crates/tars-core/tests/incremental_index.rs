//! Incremental indexing behaviour over a real directory and store.

use std::cell::Cell;
use std::fs;

use pretty_assertions::assert_eq;
use tars_core::fingerprint::fingerprint_bytes;
use tars_core::index::IndexStats;
use tars_core::{
    layout, Config, Embed, Embedded, FallbackPolicy, FlatStore, IndexManifest, Indexer, Retriever,
    VectorStore,
};
use tempfile::TempDir;

const DIM: usize = 32;

/// Bag-of-words embedding; texts containing "FAIL" fall back while
/// `failing` is set.
struct WordEmbedder {
    calls: Cell<usize>,
    failing: Cell<bool>,
}

impl WordEmbedder {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
            failing: Cell::new(false),
        }
    }
}

impl Embed for WordEmbedder {
    fn model(&self) -> &str {
        "words"
    }

    fn embed(&self, text: &str) -> Embedded {
        self.calls.set(self.calls.get() + 1);
        if self.failing.get() && text.contains("FAIL") {
            return Embedded::Fallback(vec![0.0; DIM]);
        }

        let mut vector = vec![0.0; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let slot = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % DIM;
            vector[slot] += 1.0;
        }
        Embedded::Vector(vector)
    }
}

struct Fixture {
    db: TempDir,
    data: TempDir,
    config: Config,
    embedder: WordEmbedder,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        Self {
            db: tempfile::tempdir().unwrap(),
            data: tempfile::tempdir().unwrap(),
            config,
            embedder: WordEmbedder::new(),
        }
    }

    fn write(&self, name: &str, content: impl AsRef<[u8]>) {
        fs::write(self.data.path().join(name), content).unwrap();
    }

    fn run(&self) -> IndexStats {
        let mut store = self.store();
        let mut indexer =
            Indexer::new(self.db.path(), &self.config, &self.embedder, &mut store).unwrap();
        indexer.run(self.data.path()).unwrap()
    }

    fn store(&self) -> FlatStore {
        FlatStore::open(self.db.path()).unwrap()
    }

    fn manifest(&self) -> IndexManifest {
        IndexManifest::load(self.db.path()).unwrap()
    }

    fn manifest_bytes(&self) -> Vec<u8> {
        fs::read(layout::manifest_path(self.db.path())).unwrap()
    }

    fn retrieve(&self, query: &str, k: usize) -> String {
        let store = self.store();
        Retriever::new(&self.config, &self.embedder, &store).retrieve(query, k)
    }
}

fn filenames(store: &FlatStore) -> Vec<String> {
    store.filenames().unwrap()
}

#[test]
fn scenario_cat_then_dog() {
    let fx = Fixture::new();
    fx.write("a.txt", "The cat sat.");

    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.chunks_created, 1);
    assert_eq!(
        fx.manifest().get("a.txt"),
        Some(fingerprint_bytes(b"The cat sat.").as_str())
    );
    assert_eq!(fx.store().count().unwrap(), 1);

    // Unchanged directory: nothing new, manifest byte-identical
    let before = fx.manifest_bytes();
    let stats = fx.run();
    assert_eq!(stats.files_unchanged, 1);
    assert_eq!(stats.files_indexed, 0);
    assert_eq!(fx.store().count().unwrap(), 1);
    assert_eq!(fx.manifest_bytes(), before);

    fx.write("a.txt", "The dog ran.");
    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(
        fx.manifest().get("a.txt"),
        Some(fingerprint_bytes(b"The dog ran.").as_str())
    );
    assert_eq!(fx.store().count().unwrap(), 1);
    assert_eq!(fx.retrieve("dog ran", 2), "The dog ran.");
}

#[test]
fn unchanged_run_does_not_embed() {
    let fx = Fixture::new();
    fx.write("a.txt", "alpha beta gamma ".repeat(40));
    fx.write("b.txt", "delta epsilon");

    fx.run();
    let calls = fx.embedder.calls.get();
    let count = fx.store().count().unwrap();
    assert!(count > 2);

    let stats = fx.run();
    assert_eq!(stats.files_unchanged, 2);
    assert_eq!(fx.embedder.calls.get(), calls);
    assert_eq!(fx.store().count().unwrap(), count);
}

#[test]
fn shrinking_file_drops_old_chunks() {
    let fx = Fixture::new();
    fx.write("long.txt", "word ".repeat(200));
    fx.run();
    assert_eq!(fx.store().count().unwrap(), 4);

    fx.write("long.txt", "short now");
    fx.run();

    assert_eq!(fx.store().count().unwrap(), 1);
    assert_eq!(fx.retrieve("short", 5), "short now");
}

#[test]
fn only_flat_txt_files_are_indexed() {
    let fx = Fixture::new();
    fx.write("a.txt", "kept");
    fx.write("notes.md", "ignored markdown");
    fs::create_dir(fx.data.path().join("nested")).unwrap();
    fs::write(fx.data.path().join("nested").join("deep.txt"), "ignored nested").unwrap();

    let stats = fx.run();
    assert_eq!(stats.files_scanned, 1);
    assert_eq!(filenames(&fx.store()), vec!["a.txt".to_string()]);
}

#[test]
fn invalid_utf8_is_skipped_and_retried() {
    let fx = Fixture::new();
    fx.write("good.txt", "fine text");
    fx.write("bad.txt", [0xffu8, 0xfe, 0xfd]);

    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_skipped, 1);
    assert!(fx.manifest().get("bad.txt").is_none());

    fx.write("bad.txt", "repaired");
    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_unchanged, 1);
    assert!(fx.manifest().get("bad.txt").is_some());
}

#[test]
fn fallback_file_is_retried_next_run() {
    let fx = Fixture::new();
    fx.write("a.txt", "healthy content");
    fx.write("b.txt", "this will FAIL to embed");
    fx.embedder.failing.set(true);

    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_skipped, 1);
    assert!(fx.manifest().get("b.txt").is_none());
    assert_eq!(filenames(&fx.store()), vec!["a.txt".to_string()]);

    fx.embedder.failing.set(false);
    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_unchanged, 1);
    assert_eq!(
        filenames(&fx.store()),
        vec!["a.txt".to_string(), "b.txt".to_string()]
    );
}

#[test]
fn fallback_store_policy_keeps_tagged_vectors() {
    let fx = Fixture::with_config(Config {
        fallback_policy: FallbackPolicy::Store,
        ..Config::default()
    });
    fx.write("b.txt", "this will FAIL to embed");
    fx.embedder.failing.set(true);

    let stats = fx.run();
    assert_eq!(stats.files_indexed, 1);
    assert!(fx.manifest().get("b.txt").is_some());

    let store = fx.store();
    let hits = store.similarity_search(&vec![1.0; DIM], 1).unwrap();
    assert!(hits[0].payload.fallback);
}

#[test]
fn deleted_files_are_pruned() {
    let fx = Fixture::new();
    fx.write("a.txt", "first file");
    fx.write("b.txt", "second file");
    fx.run();

    fs::remove_file(fx.data.path().join("a.txt")).unwrap();
    let stats = fx.run();

    assert_eq!(stats.files_pruned, 1);
    assert!(fx.manifest().get("a.txt").is_none());
    assert_eq!(filenames(&fx.store()), vec!["b.txt".to_string()]);
}

#[test]
fn pruning_can_be_disabled() {
    let fx = Fixture::with_config(Config {
        prune_deleted: false,
        ..Config::default()
    });
    fx.write("a.txt", "first file");
    fx.run();

    fs::remove_file(fx.data.path().join("a.txt")).unwrap();
    let stats = fx.run();

    assert_eq!(stats.files_pruned, 0);
    assert!(fx.manifest().get("a.txt").is_some());
    assert_eq!(fx.store().count().unwrap(), 1);
}

#[test]
fn manifest_entries_have_chunks_unless_empty() {
    let fx = Fixture::new();
    fx.write("a.txt", "one");
    fx.write("b.txt", "two");
    fx.write("c.txt", [0xffu8]);
    fx.write("empty.txt", "");
    let stats = fx.run();

    // An empty file is indexed with an empty chunk set
    assert_eq!(stats.files_indexed, 3);
    assert_eq!(
        fx.manifest().get("empty.txt"),
        Some(fingerprint_bytes(b"").as_str())
    );

    let stored = filenames(&fx.store());
    assert!(!stored.iter().any(|s| s == "empty.txt"));
    for name in fx.manifest().filenames().filter(|n| *n != "empty.txt") {
        assert!(stored.iter().any(|s| s == name), "{name} has no chunks");
    }

    let stats = fx.run();
    assert_eq!(stats.files_unchanged, 3);
}

#[test]
fn missing_source_directory_is_an_error() {
    let fx = Fixture::new();
    let mut store = fx.store();
    let mut indexer = Indexer::new(fx.db.path(), &fx.config, &fx.embedder, &mut store).unwrap();

    assert!(indexer.run(&fx.data.path().join("absent")).is_err());
    assert!(!layout::manifest_path(fx.db.path()).exists());
}
