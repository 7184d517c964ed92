//! End-to-end tests: ingest fragments, persist, retrieve.

use rand::SeedableRng;
use rand::seq::SliceRandom;

use tiny_graph_rag::builder::GraphBuilder;
use tiny_graph_rag::collaborator::QueryTokenSeeds;
use tiny_graph_rag::config::{RagConfig, ResolutionConfig};
use tiny_graph_rag::engine::GraphRag;
use tiny_graph_rag::error::IngestWarning;
use tiny_graph_rag::extraction::{
    EntityCandidate, ExtractionFile, FragmentExtraction, RelationshipCandidate,
};
use tiny_graph_rag::graph::{KnowledgeGraph, storage};
use tiny_graph_rag::retrieve::ContextStatus;

fn friends() -> FragmentExtraction {
    FragmentExtraction::new(
        vec![
            EntityCandidate::new("철수").with_type("PERSON"),
            EntityCandidate::new("영희").with_type("PERSON"),
        ],
        vec![RelationshipCandidate::new("철수", "영희", "friend")],
    )
}

fn lives_in() -> FragmentExtraction {
    FragmentExtraction::new(
        vec![
            EntityCandidate::new("영희").with_type("PERSON"),
            EntityCandidate::new("서울").with_type("PLACE"),
        ],
        vec![RelationshipCandidate::new("영희", "서울", "lives_in")],
    )
}

/// A longer story with aliases, fuzzy name variants and repeated edges.
fn story() -> Vec<FragmentExtraction> {
    vec![
        FragmentExtraction::new(
            vec![
                EntityCandidate::new("김첨지").with_type("PERSON").with_alias("인력거꾼"),
                EntityCandidate::new("아내").with_type("PERSON"),
            ],
            vec![RelationshipCandidate::new("김첨지", "아내", "CARES_FOR")],
        ),
        FragmentExtraction::new(
            vec![
                EntityCandidate::new("김첨지씨").with_type("PERSON"),
                EntityCandidate::new("동소문").with_type("PLACE"),
            ],
            vec![RelationshipCandidate::new("김첨지씨", "동소문", "WORKS_AT")],
        ),
        FragmentExtraction::new(
            vec![
                EntityCandidate::new("인력거꾼").with_type("PERSON"),
                EntityCandidate::new("치삼이").with_type("PERSON"),
            ],
            vec![
                RelationshipCandidate::new("인력거꾼", "치삼이", "DRINKS_WITH"),
                RelationshipCandidate::new("치삼이", "개똥이", "KNOWS"),
            ],
        ),
        FragmentExtraction::new(
            vec![EntityCandidate::new("아내").with_description("병든 아내")],
            vec![RelationshipCandidate::new("김첨지", "아내", "CARES_FOR")],
        ),
        FragmentExtraction::new(
            vec![EntityCandidate::new("개똥이").with_type("PERSON")],
            vec![RelationshipCandidate::new("개똥이", "아내", "CHILD_OF")],
        ),
    ]
}

fn build_in_order(
    fragments: &[FragmentExtraction],
    order: &[usize],
) -> (KnowledgeGraph, Vec<IngestWarning>) {
    let mut builder = GraphBuilder::new(ResolutionConfig::default());
    for &i in order {
        builder.ingest_extraction(i, fragments[i].clone());
    }
    let (graph, summary) = builder.finish();
    (graph, summary.warnings)
}

#[test]
fn either_order_produces_same_graph() {
    let fragments = vec![friends(), lives_in()];
    let (forward, _) = build_in_order(&fragments, &[0, 1]);
    let (backward, _) = build_in_order(&fragments, &[1, 0]);

    assert_eq!(
        storage::serialize(&forward).unwrap(),
        storage::serialize(&backward).unwrap()
    );
    let ids: Vec<&str> = forward.entities().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["철수", "영희", "서울"]);
    assert!(forward.relationship("철수-[friend]->영희").is_some());
    assert!(forward.relationship("영희-[lives_in]->서울").is_some());
    assert_eq!(forward.entity("영희").unwrap().mention_count, 2);
}

#[test]
fn shuffled_completion_order_is_byte_identical() {
    let fragments = story();
    let order: Vec<usize> = (0..fragments.len()).collect();
    let (reference, _) = build_in_order(&fragments, &order);
    let expected = storage::serialize(&reference).unwrap();

    for seed in 0..16 {
        let mut shuffled = order.clone();
        shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
        let (graph, _) = build_in_order(&fragments, &shuffled);
        assert_eq!(storage::serialize(&graph).unwrap(), expected, "order {shuffled:?}");
    }
}

#[test]
fn story_resolves_aliases_and_variants() {
    let fragments = story();
    let order: Vec<usize> = (0..fragments.len()).collect();
    let (graph, warnings) = build_in_order(&fragments, &order);

    let kim = graph.entity("김첨지").unwrap();
    // The fuller variant replaced the canonical name; the id is stable.
    assert_eq!(kim.canonical_name, "김첨지씨");
    assert!(kim.aliases.iter().any(|a| a == "인력거꾼"));
    assert_eq!(kim.mention_count, 3);
    assert_eq!(graph.get_entity_by_name("인력거꾼").unwrap().id, "김첨지");

    // The repeated CARES_FOR observation was merged.
    assert_eq!(graph.relationship("김첨지-[cares_for]->아내").unwrap().weight, 2.0);
    assert_eq!(graph.entity("아내").unwrap().description, "병든 아내");

    // 개똥이 was unknown when fragment 2 mentioned it.
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        &warnings[0],
        IngestWarning::DanglingReference { fragment_index: 2, missing, .. } if missing == "개똥이"
    ));
    assert!(graph.relationship("개똥이-[child_of]->아내").is_some());
    graph.validate().unwrap();
}

#[test]
fn dangling_candidate_is_dropped_and_graph_stays_valid() {
    let mut builder = GraphBuilder::new(ResolutionConfig::default());
    builder.ingest_extraction(0, friends());
    builder.ingest(
        1,
        vec![],
        vec![RelationshipCandidate::new("철수", "민수", "friend")],
    );
    let (graph, summary) = builder.finish();

    assert_eq!(graph.relationship_count(), 1);
    assert_eq!(summary.warnings.len(), 1);
    for rel in graph.relationships() {
        assert!(graph.contains_entity(&rel.source_id));
        assert!(graph.contains_entity(&rel.target_id));
    }
}

#[test]
fn query_ranks_neighbor_above_unrelated() {
    let fragments = vec![
        friends(),
        lives_in(),
        FragmentExtraction::new(
            vec![
                EntityCandidate::new("민수").with_type("PERSON"),
                EntityCandidate::new("부산").with_type("PLACE"),
            ],
            vec![RelationshipCandidate::new("민수", "부산", "lives_in")],
        ),
    ];
    let (graph, _) = build_in_order(&fragments, &[2, 0, 1]);
    let rag = GraphRag::with_graph(RagConfig::default(), graph).unwrap();

    let context = rag.retriever().retrieve_from_seeds(
        "영희는 어디 살아?",
        &["영희".to_string()],
        1,
        5,
    );
    assert_eq!(context.status, ContextStatus::Found);
    let rank = |id: &str| context.entity_ids().iter().position(|e| *e == id);
    let seoul = rank("서울").expect("서울 retrieved");
    assert!(rank("부산").is_none_or(|busan| seoul < busan));
    assert!(rank("민수").is_none());
    for entity in &context.entities {
        assert!(entity.distance <= 1);
    }
}

#[test]
fn concurrent_retrievals_share_one_snapshot() {
    let fragments = vec![friends(), lives_in()];
    let (graph, _) = build_in_order(&fragments, &[0, 1]);
    let rag = GraphRag::with_graph(RagConfig::default(), graph).unwrap();
    let expected = rag.retrieve("영희는 어디 살아?", &QueryTokenSeeds);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| rag.retrieve("영희는 어디 살아?", &QueryTokenSeeds)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn extraction_file_ingest_end_to_end() {
    let file = ExtractionFile::from_json(
        r#"[
            {"index": 0, "text": "철수는 영희의 친구다.",
             "entities": [{"name": "철수", "type": "PERSON"}, {"name": "영희", "type": "PERSON"}],
             "relationships": [{"source": "철수", "target": "영희", "type": "friend"}]},
            {"index": 1, "text": "영희는 서울에 산다.",
             "entities": [{"name": "영희", "type": "PERSON"}, {"name": "서울", "type": "place"}],
             "relationships": [{"source": "영희", "target": "서울", "type": "lives in"}]},
            {"index": 2, "text": "???", "entities": "not an array"}
        ]"#,
    )
    .unwrap();

    let mut rag = GraphRag::new(RagConfig::default()).unwrap();
    let summary = rag.ingest(file.fragments(), &file).unwrap();

    assert_eq!(summary.fragments_applied, 2);
    assert_eq!(summary.fragments_skipped, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(matches!(
        &summary.warnings[0],
        IngestWarning::ParseFailure { fragment_index: 2, message } if message.contains("entities")
    ));
    assert_eq!(rag.graph().entity_count(), 3);
    assert!(rag.graph().relationship("영희-[lives_in]->서울").is_some());
    assert_eq!(
        rag.graph().entity("서울").unwrap().entity_type.as_deref(),
        Some("PLACE")
    );
}

#[test]
fn unusable_extraction_output_is_reported() {
    let file = ExtractionFile::from_json(
        r#"[
            {"index": 0, "entities": "garbage", "relationships": 42},
            {"index": 1, "entities": ["영희", {"name": "서울", "type": "PLACE"}]}
        ]"#,
    )
    .unwrap();

    let mut rag = GraphRag::new(RagConfig::default()).unwrap();
    let summary = rag.ingest(file.fragments(), &file).unwrap();

    assert_eq!(summary.fragments_applied, 1);
    assert_eq!(summary.fragments_skipped, 1);
    let indexes: Vec<usize> = summary.warnings.iter().map(|w| w.fragment_index()).collect();
    assert_eq!(indexes, vec![0, 1]);
    assert!(matches!(&summary.warnings[0], IngestWarning::ParseFailure { .. }));
    assert!(matches!(&summary.warnings[1], IngestWarning::RejectedCandidate { .. }));
    assert_eq!(rag.graph().entity_count(), 1);
}
