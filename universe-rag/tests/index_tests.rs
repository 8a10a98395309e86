//! Property tests for chunking and vector index search ordering.

use std::collections::HashSet;

use proptest::prelude::*;
use universe_rag::{
    Chunk, Document, DocumentMetadata, IndexDescriptor, IndexState, RagError, VectorIndex, split,
};

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a list of chunks with unique ids and normalized embeddings.
fn arb_chunks(dim: usize) -> impl Strategy<Value = Vec<Chunk>> {
    proptest::collection::vec(("[a-z ]{5,30}", arb_normalized_embedding(dim)), 1..20).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, embedding))| Chunk {
                    id: format!("doc_{i}"),
                    document_id: "doc".to_string(),
                    sequence_index: i,
                    text,
                    embedding,
                    metadata: DocumentMetadata::default(),
                })
                .collect()
        },
    )
}

fn descriptor() -> IndexDescriptor {
    IndexDescriptor::new(DIM, "test:16")
}

mod prop_index_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_descend_and_are_bounded_by_k(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let count = chunks.len();
            let mut index = VectorIndex::new(descriptor());
            index.build(chunks).unwrap();
            let results = index.query(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(count));
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for r in &results {
                prop_assert!(r.score >= -1.0 - 1e-5 && r.score <= 1.0 + 1e-5);
            }
        }

        #[test]
        fn oversized_k_returns_every_entry_once(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
        ) {
            let count = chunks.len();
            let mut index = VectorIndex::new(descriptor());
            index.build(chunks).unwrap();
            let results = index.query(&query, count + 10).unwrap();

            prop_assert_eq!(results.len(), count);
            let ids: HashSet<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            prop_assert_eq!(ids.len(), count);
        }

        #[test]
        fn equal_scores_keep_insertion_order(n in 2usize..12) {
            let shared = vec![1.0f32; DIM];
            let chunks: Vec<Chunk> = (0..n)
                .map(|i| Chunk {
                    id: format!("c{i}"),
                    document_id: "d".into(),
                    sequence_index: i,
                    text: String::new(),
                    embedding: shared.clone(),
                    metadata: DocumentMetadata::default(),
                })
                .collect();
            let mut index = VectorIndex::new(descriptor());
            index.build(chunks).unwrap();

            let ids: Vec<String> =
                index.query(&shared, n).unwrap().into_iter().map(|r| r.chunk.id).collect();
            let expected: Vec<String> = (0..n).map(|i| format!("c{i}")).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn split_is_deterministic_and_bounded(
            content in "\\PC{0,400}",
            size in 1usize..64,
            overlap_seed in 0usize..64,
        ) {
            let overlap = overlap_seed % size;
            let doc = Document::new("doc", content.clone());
            let first = split(&doc, size, overlap).unwrap();
            let second = split(&doc, size, overlap).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert!(first.iter().all(|c| c.text.chars().count() <= size));
            prop_assert_eq!(first.is_empty(), content.is_empty());
            for (i, chunk) in first.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
            }
        }

        #[test]
        fn split_covers_the_whole_text(content in "[a-z가-힣]{1,200}", size in 2usize..40) {
            let overlap = size / 3;
            let doc = Document::new("doc", content.clone());
            let chunks = split(&doc, size, overlap).unwrap();

            // Dropping each window's overlap prefix reconstructs the source.
            let mut rebuilt: String = chunks[0].text.clone();
            for chunk in &chunks[1..] {
                rebuilt.extend(chunk.text.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, content);
        }

        #[test]
        fn overlap_not_smaller_than_size_is_rejected(size in 0usize..32, extra in 0usize..8) {
            let doc = Document::new("doc", "some text");
            let result = split(&doc, size, size + extra);
            prop_assert!(matches!(result, Err(RagError::ConfigError(_))));
        }
    }
}

#[test]
fn empty_build_leaves_index_empty() {
    let mut index = VectorIndex::new(descriptor());
    assert!(matches!(index.build(Vec::new()), Err(RagError::EmptyCorpus)));
    assert_eq!(index.state(), IndexState::Empty);
    assert!(index.is_empty());
}

#[test]
fn persisted_index_answers_like_the_original() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("vector_db").join("index.json");

    let chunks: Vec<Chunk> = (0..5)
        .map(|i| {
            let mut embedding = vec![0.0f32; DIM];
            embedding[i] = 1.0;
            embedding[(i + 1) % DIM] = 0.5;
            Chunk {
                id: format!("doc_{i}"),
                document_id: "doc".into(),
                sequence_index: i,
                text: format!("chunk {i}"),
                embedding,
                metadata: DocumentMetadata { source: format!("src{i}"), ..Default::default() },
            }
        })
        .collect();

    let mut built = VectorIndex::new(descriptor());
    built.build(chunks).unwrap();
    built.persist(&path).unwrap();

    let loaded = VectorIndex::open(&path, descriptor()).unwrap();
    let mut query = vec![0.0f32; DIM];
    query[2] = 1.0;
    assert_eq!(built.query(&query, 3).unwrap(), loaded.query(&query, 3).unwrap());
}

#[test]
fn mismatched_dimensionality_on_load_is_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("index.json");

    let mut built = VectorIndex::new(descriptor());
    built
        .build(vec![Chunk {
            id: "doc_0".into(),
            document_id: "doc".into(),
            sequence_index: 0,
            text: "t".into(),
            embedding: vec![1.0; DIM],
            metadata: DocumentMetadata::default(),
        }])
        .unwrap();
    built.persist(&path).unwrap();

    let result = VectorIndex::open(&path, IndexDescriptor::new(DIM * 2, "test:16"));
    assert!(matches!(result, Err(RagError::CorruptIndex { .. })));
}
