//! End-to-end tests for the QA chain over an on-disk corpus.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use universe_chain::{
    ChainConfig, ChainError, IndexSettings, PromptTemplate, QaChain, QueryResult, build_index,
    load_index,
};
use universe_model::{AnswerGenerator, Fragment, MockGenerator};
use universe_rag::{
    ConversationTurn, Document, EmbeddingProvider, HashingEmbeddingProvider, RagError, Retriever,
    load_corpus,
};
use universe_telemetry::{CapturedEvents, Level, capture_thread};

const DEBUT_URL: &str = "https://kprofiles.com/gidle-debut";

fn write_corpus(dir: &Path) {
    let records = serde_json::json!([
        {
            "title": "(G)I-DLE debut",
            "content": "(G)I-DLE debuted on May 2, 2018 with the single Latata.",
            "url": DEBUT_URL,
            "timestamp": "2024-01-01T00:00:00",
            "language": "en"
        },
        {
            "title": "Tomboy",
            "content": "Tomboy is the lead single of the album I NEVER DIE, released in March 2022.",
            "url": "https://kprofiles.com/tomboy",
            "timestamp": "2024-01-01T00:00:00"
        }
    ]);
    std::fs::write(dir.join("gidle.json"), records.to_string()).unwrap();
    std::fs::write(dir.join("neverland.txt"), "Neverland is the name of the official fandom.")
        .unwrap();
}

struct Fixture {
    _temp: tempfile::TempDir,
    settings: IndexSettings,
    provider: Arc<dyn EmbeddingProvider>,
}

async fn indexed_corpus() -> (Fixture, Retriever) {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("knowledge_db");
    std::fs::create_dir(&corpus).unwrap();
    write_corpus(&corpus);

    let settings = IndexSettings::new(temp.path().join("vector_db/index.json"), &corpus);
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());
    let documents = load_corpus(&corpus).unwrap();
    let index = build_index(&documents, &settings, Arc::clone(&provider)).await.unwrap();
    let retriever = Retriever::new(index, Arc::clone(&provider)).unwrap();
    (Fixture { _temp: temp, settings, provider }, retriever)
}

fn chain(retriever: Retriever, generator: Arc<dyn AnswerGenerator>, top_k: usize) -> QaChain {
    QaChain::builder()
        .config(ChainConfig { top_k, ..ChainConfig::default() })
        .retriever(retriever)
        .generator(generator)
        .build()
        .unwrap()
}

#[tokio::test]
async fn debut_question_is_answered_from_the_debut_record() {
    let (_fixture, retriever) = indexed_corpus().await;
    let generator = Arc::new(MockGenerator::echo());
    let chain = chain(retriever, generator.clone(), 1);

    let result = chain.answer("When did (G)I-DLE debut?", &[]).await.unwrap();

    assert_eq!(result.sources, vec![DEBUT_URL]);
    assert!(result.context.contains("May 2, 2018"));
    assert!(result.answer.contains("Context: Title: (G)I-DLE debut"));
    assert!(result.answer.contains("Question: When did (G)I-DLE debut?"));

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].config.temperature, 0.1);
    assert_eq!(requests[0].config.max_output_tokens, 2048);
}

#[tokio::test]
async fn single_document_corpus_answers_with_its_only_chunk() {
    let temp = tempfile::tempdir().unwrap();
    let settings = IndexSettings {
        chunk_size: 200,
        chunk_overlap: 20,
        ..IndexSettings::new(temp.path().join("index.json"), temp.path())
    };
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());
    let text = "(G)I-DLE debuted in 2018 with Latata.";
    let document = Document::new("debut", text).with_source("debut.txt");

    let index = build_index(&[document], &settings, Arc::clone(&provider)).await.unwrap();
    assert_eq!(index.len(), 1);

    let chain = chain(
        Retriever::new(index, provider).unwrap(),
        Arc::new(MockGenerator::echo()),
        4,
    );
    let result = chain.answer("When did the group debut?", &[]).await.unwrap();

    assert_eq!(result.sources, vec!["debut.txt"]);
    assert_eq!(result.context, text);
    assert!(result.answer.contains("2018"));
}

#[tokio::test]
async fn sources_follow_rank_order_for_every_chunk() {
    let (_fixture, retriever) = indexed_corpus().await;
    let chain = chain(retriever, Arc::new(MockGenerator::scripted(["ok"])), 10);

    let result = chain.answer("Tomboy album I NEVER DIE", &[]).await.unwrap();

    assert_eq!(result.sources.len(), 3);
    assert_eq!(result.sources[0], "https://kprofiles.com/tomboy");
    assert!(result.sources.iter().any(|s| s.ends_with("neverland.txt")));
    assert_eq!(result.context.split("\n\n").filter(|p| p.starts_with("Title:")).count(), 2);
}

#[tokio::test]
async fn history_is_folded_into_the_prompt() {
    let (_fixture, retriever) = indexed_corpus().await;
    let generator = Arc::new(MockGenerator::scripted(["It was Latata."]));
    let chain = chain(retriever, generator.clone(), 2);
    let history = [ConversationTurn::new("Who are (G)I-DLE?", "A K-pop girl group.")];

    let result = chain.answer("What was their debut single?", &history).await.unwrap();

    assert_eq!(result.answer, "It was Latata.");
    let prompt = &generator.requests()[0].prompt;
    assert!(prompt.contains("Turn 1:\nUser: Who are (G)I-DLE?\nAssistant: A K-pop girl group."));
    assert!(prompt.contains("Current question: What was their debut single?"));
}

#[tokio::test]
async fn blank_question_skips_retrieval_and_generation() {
    let (_fixture, retriever) = indexed_corpus().await;
    let generator = Arc::new(MockGenerator::echo());
    let chain = chain(retriever, generator.clone(), 4);

    assert_eq!(chain.answer("   ", &[]).await.unwrap(), QueryResult::default());
    let stream = chain.answer_stream("", &[]).await.unwrap();
    assert_eq!(stream.into_result().await, QueryResult::default());
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn generation_failure_degrades_and_warns() {
    let (_fixture, retriever) = indexed_corpus().await;
    let generator = Arc::new(MockGenerator::failing_after(["par"], "quota exceeded"));
    let chain = chain(retriever, generator, 4);

    let events = CapturedEvents::new();
    let _guard = capture_thread(events.clone());
    let result = chain.answer("When did (G)I-DLE debut?", &[]).await.unwrap();

    assert!(result.is_degraded());
    assert!(result.answer.contains("quota exceeded"));
    assert!(result.sources.is_empty());
    assert_eq!(result.context, "");
    assert!(!events.at_level(Level::WARN).is_empty());
}

#[tokio::test]
async fn streamed_answer_matches_the_collected_answer() {
    let (_fixture, retriever) = indexed_corpus().await;
    let chain = chain(retriever, Arc::new(MockGenerator::echo()), 2);
    let question = "Who is the fandom?";

    let collected = chain.answer(question, &[]).await.unwrap();
    let stream = chain.answer_stream(question, &[]).await.unwrap();
    assert_eq!(stream.context, collected.context);
    assert_eq!(stream.sources, collected.sources);

    let fragments: Vec<Fragment> = stream.fragments.collect().await;
    assert!(fragments.len() > 1);
    let text: String = fragments
        .into_iter()
        .map(|f| match f {
            Fragment::Text(t) => t,
            Fragment::Error(e) => panic!("unexpected error fragment: {e}"),
        })
        .collect();
    assert_eq!(text, collected.answer);
}

#[tokio::test]
async fn streamed_failure_ends_with_an_error_fragment() {
    let (_fixture, retriever) = indexed_corpus().await;
    let chain = chain(retriever, Arc::new(MockGenerator::failing("backend down")), 2);

    let stream = chain.answer_stream("When did (G)I-DLE debut?", &[]).await.unwrap();
    assert!(!stream.sources.is_empty());
    let result = stream.into_result().await;
    assert!(result.is_degraded());
    assert!(result.answer.ends_with("backend down"));
}

#[tokio::test]
async fn reloaded_index_answers_identically() {
    let (fixture, retriever) = indexed_corpus().await;
    let built = chain(retriever, Arc::new(MockGenerator::echo()), 2);

    let index = load_index(&fixture.settings.index_path, fixture.provider.as_ref()).unwrap();
    let retriever = Retriever::new(index, Arc::clone(&fixture.provider)).unwrap();
    let reloaded = chain(retriever, Arc::new(MockGenerator::echo()), 2);

    let question = "When did (G)I-DLE debut?";
    assert_eq!(
        built.answer(question, &[]).await.unwrap(),
        reloaded.answer(question, &[]).await.unwrap()
    );
}

#[tokio::test]
async fn index_from_another_provider_is_corrupt() {
    let (fixture, _retriever) = indexed_corpus().await;
    let other = HashingEmbeddingProvider::new(32);

    let err = load_index(&fixture.settings.index_path, &other).unwrap_err();
    assert!(matches!(err, ChainError::Rag(RagError::CorruptIndex { .. })));
}

#[tokio::test]
async fn setters_validate_and_show_in_info() {
    let (fixture, retriever) = indexed_corpus().await;
    let chain = QaChain::builder()
        .retriever(retriever)
        .generator(Arc::new(MockGenerator::echo()))
        .prompt(PromptTemplate::new("{context}\n---\n{question}").unwrap())
        .index_path(&fixture.settings.index_path)
        .build()
        .unwrap();

    chain.set_top_k(1).unwrap();
    chain.set_temperature(0.7).unwrap();
    assert!(matches!(chain.set_top_k(0), Err(ChainError::Rag(RagError::InvalidK(0)))));
    assert!(matches!(chain.set_temperature(-1.0), Err(ChainError::Config(_))));

    let info = chain.info().await;
    assert_eq!(info.top_k, 1);
    assert_eq!(info.temperature, 0.7);
    assert_eq!(info.model_name, "glm-4-flash");
    assert_eq!(info.index_size, 3);
    assert_eq!(info.index_path.as_deref(), Some(fixture.settings.index_path.as_path()));

    let result = chain.answer("Latata", &[]).await.unwrap();
    assert_eq!(result.sources.len(), 1);
    assert!(result.answer.ends_with("\n---\nLatata"));
}

mod flaky_embeddings {
    use super::*;
    use async_trait::async_trait;
    use universe_rag::{Chunk, DocumentMetadata, IndexDescriptor, VectorIndex};

    struct Unreachable;

    #[async_trait]
    impl EmbeddingProvider for Unreachable {
        async fn embed(&self, _text: &str) -> universe_rag::Result<Vec<f32>> {
            Err(RagError::EmbeddingUnavailable {
                provider: "unreachable".into(),
                message: "connection refused".into(),
            })
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    fn retriever() -> Retriever {
        let provider = Unreachable;
        let mut index = VectorIndex::new(IndexDescriptor::for_provider(&provider));
        index
            .build(vec![Chunk {
                id: "debut#0".into(),
                document_id: "debut".into(),
                sequence_index: 0,
                text: "Latata".into(),
                embedding: vec![1.0, 0.0],
                metadata: DocumentMetadata::default(),
            }])
            .unwrap();
        Retriever::new(index, Arc::new(provider)).unwrap()
    }

    #[tokio::test]
    async fn embedding_failure_degrades_without_generating() {
        let generator = Arc::new(MockGenerator::echo());
        let chain = chain(retriever(), generator.clone(), 4);

        let result = chain.answer("Latata?", &[]).await.unwrap();
        assert!(result.is_degraded());
        assert!(result.answer.contains("connection refused"));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_streams_a_single_error() {
        let chain = chain(retriever(), Arc::new(MockGenerator::echo()), 4);

        let stream = chain.answer_stream("Latata?", &[]).await.unwrap();
        assert!(stream.sources.is_empty());
        assert_eq!(stream.context, "");
        let fragments: Vec<Fragment> = stream.fragments.collect().await;
        assert!(matches!(fragments.as_slice(), [Fragment::Error(_)]));
    }
}
