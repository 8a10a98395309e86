//! Tests for the chain cache and the default factory.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use universe_chain::{
    ChainConfig, ChainError, ChainFactory, ChainManager, Credentials, DefaultChainFactory,
    IndexSettings, QaChain, Result,
};
use universe_model::{BackendProvider, MockGenerator};
use universe_rag::{HashingEmbeddingProvider, IndexDescriptor, RagError, Retriever, VectorIndex};

/// Counts constructions and optionally fails the first few.
struct SlowFactory {
    created: AtomicUsize,
    attempts: AtomicUsize,
    fail_first: usize,
}

impl SlowFactory {
    fn new(fail_first: usize) -> Arc<Self> {
        Arc::new(Self { created: AtomicUsize::new(0), attempts: AtomicUsize::new(0), fail_first })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainFactory for SlowFactory {
    async fn create(&self, config: &ChainConfig) -> Result<QaChain> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if attempt < self.fail_first {
            return Err(RagError::EmbeddingUnavailable {
                provider: "test".into(),
                message: "model download failed".into(),
            }
            .into());
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let provider = Arc::new(HashingEmbeddingProvider::new(8));
        let index = VectorIndex::new(IndexDescriptor::for_provider(provider.as_ref()));
        QaChain::builder()
            .config(config.clone())
            .retriever(Retriever::new(index, provider)?)
            .generator(Arc::new(MockGenerator::echo()))
            .build()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_constructs_once() {
    let factory = SlowFactory::new(0);
    let manager = Arc::new(ChainManager::new(factory.clone()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_chain(&ChainConfig::default()).await })
        })
        .collect();

    let mut chains = Vec::new();
    for handle in handles {
        chains.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(factory.created(), 1);
    assert!(chains.iter().all(|c| Arc::ptr_eq(c, &chains[0])));
    assert_eq!(manager.len().await, 1);
}

#[tokio::test]
async fn distinct_keys_get_distinct_chains() {
    let factory = SlowFactory::new(0);
    let manager = ChainManager::new(factory.clone());

    let zhipu = ChainConfig::default();
    let openai = ChainConfig::builder().backend_provider(BackendProvider::OpenAI).build().unwrap();
    let other_model = ChainConfig::builder().model_name("glm-4").build().unwrap();

    let (a, b, c) = tokio::join!(
        manager.get_chain(&zhipu),
        manager.get_chain(&openai),
        manager.get_chain(&other_model)
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(b.config().model_name, "gpt-3.5-turbo");
    assert_eq!(factory.created(), 3);
    assert_eq!(manager.len().await, 3);
}

#[tokio::test]
async fn failed_construction_is_retried() {
    let factory = SlowFactory::new(1);
    let manager = ChainManager::new(factory.clone());
    let config = ChainConfig::default();

    let err = manager.get_chain(&config).await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(manager.is_empty().await);

    manager.get_chain(&config).await.unwrap();
    assert_eq!(factory.created(), 1);
    assert_eq!(manager.len().await, 1);
}

#[tokio::test]
async fn clear_forces_reconstruction() {
    let factory = SlowFactory::new(0);
    let manager = ChainManager::new(factory.clone());
    let config = ChainConfig::default();

    let first = manager.get_chain(&config).await.unwrap();
    manager.clear().await;
    assert!(manager.is_empty().await);

    let second = manager.get_chain(&config).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created(), 2);
}

fn write_corpus(dir: &std::path::Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("members.md"),
        "(G)I-DLE members: Miyeon, Minnie, Soyeon, Yuqi and Shuhua.",
    )
    .unwrap();
    std::fs::write(dir.join("debut.txt"), "(G)I-DLE debuted in 2018 with Latata.").unwrap();
}

#[tokio::test]
async fn default_factory_builds_then_reuses_the_index() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("knowledge_db");
    write_corpus(&corpus);
    let settings = IndexSettings::new(temp.path().join("vector_db/index.json"), &corpus);

    let factory = DefaultChainFactory::new(settings.clone(), Credentials::default())
        .with_generator(Arc::new(MockGenerator::scripted(["Latata"])));
    let manager = ChainManager::new(Arc::new(factory.clone()));

    let chain = manager.get_chain(&ChainConfig::default()).await.unwrap();
    assert!(settings.index_path.exists());
    let info = chain.info().await;
    assert_eq!(info.index_size, 2);
    assert_eq!(info.index_path.as_deref(), Some(settings.index_path.as_path()));

    let result = chain.answer("Which song did (G)I-DLE debut with?", &[]).await.unwrap();
    assert_eq!(result.answer, "Latata");
    assert!(result.sources[0].ends_with("debut.txt"));

    // A second factory finds the persisted index even without a corpus.
    let without_corpus = IndexSettings { corpus_dir: None, ..settings };
    let reloaded = DefaultChainFactory::new(without_corpus, Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()))
        .create(&ChainConfig::default())
        .await
        .unwrap();
    assert_eq!(reloaded.info().await.index_size, 2);
}

#[tokio::test]
async fn empty_corpus_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("knowledge_db");
    std::fs::create_dir(&corpus).unwrap();
    std::fs::write(corpus.join("notes.txt"), "").unwrap();

    let settings = IndexSettings::new(temp.path().join("index.json"), &corpus);
    let factory = DefaultChainFactory::new(settings, Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()));
    let manager = ChainManager::new(Arc::new(factory));

    let err = manager.get_chain(&ChainConfig::default()).await.unwrap_err();
    assert!(matches!(err, ChainError::Rag(RagError::EmptyCorpus)));
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn missing_index_without_corpus_is_not_found() {
    let temp = tempfile::tempdir().unwrap();
    let settings = IndexSettings {
        corpus_dir: None,
        ..IndexSettings::new(temp.path().join("index.json"), temp.path())
    };
    let factory = DefaultChainFactory::new(settings, Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()));

    let err = factory.create(&ChainConfig::default()).await.err().unwrap();
    assert!(matches!(err, ChainError::Rag(RagError::IndexNotFound { .. })));
}

#[tokio::test]
async fn index_built_by_another_provider_is_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("knowledge_db");
    write_corpus(&corpus);
    let settings = IndexSettings::new(temp.path().join("index.json"), &corpus);

    DefaultChainFactory::new(settings.clone(), Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()))
        .create(&ChainConfig::default())
        .await
        .unwrap();

    let narrower = IndexSettings { hashing_dimensions: 64, ..settings };
    let err = DefaultChainFactory::new(narrower, Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()))
        .create(&ChainConfig::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChainError::Rag(RagError::CorruptIndex { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_keys_share_one_index_built_once() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("knowledge_db");
    std::fs::create_dir(&corpus).unwrap();
    for i in 0..100 {
        std::fs::write(
            corpus.join(format!("song_{i:03}.txt")),
            format!("Track {i} appears on a (G)I-DLE album released after Latata."),
        )
        .unwrap();
    }
    let settings = IndexSettings::new(temp.path().join("vector_db/index.json"), &corpus);
    let factory = DefaultChainFactory::new(settings.clone(), Credentials::default())
        .with_generator(Arc::new(MockGenerator::echo()));
    let manager = Arc::new(ChainManager::new(Arc::new(factory)));

    let handles: Vec<_> = ["glm-4-flash", "glm-4", "glm-4-air", "glm-4-plus"]
        .into_iter()
        .map(|model| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let config = ChainConfig::builder().model_name(model).build().unwrap();
                manager.get_chain(&config).await
            })
        })
        .collect();

    let mut chains = Vec::new();
    for handle in handles {
        chains.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(manager.len().await, 4);
    let first = chains[0].retriever().index();
    for chain in &chains {
        assert!(Arc::ptr_eq(&chain.retriever().index(), &first));
        assert_eq!(chain.info().await.index_size, 100);
    }
    let files: Vec<_> = std::fs::read_dir(settings.index_path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("index.json")]);
}
