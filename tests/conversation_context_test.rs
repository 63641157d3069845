//! Integration tests for the conversation context engine
//!
//! These drive the public `ContextManager` surface with the word-count
//! tokenizer so token totals are deterministic.

use conversation_context::{
    context::{
        FallbackEstimator, MessageRole, NoSimilarity, SimilarityScorer, TokenEstimator,
    },
    AdapterError, AttachmentContext, Config, ContextManager, SelectionPolicy,
};
use std::sync::Arc;

fn manager_with(config: Config) -> ContextManager {
    ContextManager::with_adapters(
        config,
        Arc::new(FallbackEstimator::word_based()),
        Arc::new(NoSimilarity),
    )
    .expect("valid config")
}

fn manager() -> ContextManager {
    manager_with(Config::default())
}

fn record_plain_turns(mgr: &ContextManager, count: usize) {
    for i in 0..count {
        mgr.record_turn(&format!("Question {}", i), &format!("Answer {}", i), vec![]);
    }
}

#[tokio::test]
async fn test_twenty_five_plain_turns_leave_one_summary() {
    let mgr = manager();
    record_plain_turns(&mgr, 25);
    mgr.settle().await;

    let stats = mgr.get_stats();
    assert_eq!(stats.summaries_created, 1);
    assert_eq!(stats.total_turns, 15);
    assert_eq!(mgr.turns().len(), 15);
    assert!(mgr.turns().iter().all(|t| t.importance_score == 1.0));

    // The oldest ten were compressed
    assert_eq!(mgr.turns()[0].user_message.content, "Question 10");
    assert_eq!(mgr.summaries()[0].turns_covered, 10);
}

#[tokio::test]
async fn test_summarization_is_idempotent() {
    let mgr = manager();
    record_plain_turns(&mgr, 25);
    mgr.settle().await;

    let before = mgr.get_stats();
    assert!(mgr.maybe_summarize().await.is_none());
    assert!(mgr.maybe_summarize().await.is_none());
    assert_eq!(mgr.get_stats(), before);
}

#[tokio::test]
async fn test_summary_saves_tokens() {
    let mgr = manager();
    for i in 0..20 {
        mgr.record_turn(
            &format!("Question {} asks how the connection pool should be sized.", i),
            &format!("Answer {} says the pool should scale with the number of workers.", i),
            vec![],
        );
    }
    mgr.settle().await;

    let summaries = mgr.summaries();
    assert_eq!(summaries.len(), 1);
    assert!(!summaries[0].summary_text.is_empty());
    assert!(summaries[0].tokens_saved > 0);
    assert_eq!(
        mgr.get_stats().tokens_saved_by_summaries,
        summaries[0].tokens_saved
    );
}

#[test]
fn test_empty_store_window() {
    let mgr = manager();
    let window = mgr.build_window("fix the login bug", &[], 1000);

    assert!(window.messages.is_empty());
    assert!(window.summary.is_none());
    assert!(window.key_points.is_empty());
    // 4 words * 1.3 -> 6 query tokens plus the 500 token reserve
    assert_eq!(window.total_tokens, 506);
}

#[test]
fn test_long_code_reply_importance() {
    let mgr = manager();
    let mut reply = String::from("Here it is:\n```python\nprint('hi')\n```\n");
    while reply.chars().count() <= 1000 {
        reply.push_str("More explanation follows. ");
    }
    assert!(reply.chars().count() > 1000);

    mgr.record_turn("Give me a snippet", &reply, vec![]);
    let turn = &mgr.turns()[0];
    assert!((turn.importance_score - 2.1).abs() < 1e-9);
    assert_eq!(mgr.get_stats().turns_with_code, 1);
}

#[test]
fn test_importance_stays_in_range() {
    let mgr = manager();
    let user = "how why what when how why what when fix error debug issue problem ".repeat(10);
    let reply = format!("```rust\nfn main() {{}}\n```{}", " detail".repeat(300));
    mgr.record_turn(&user, &reply, vec!["design.pdf".to_string()]);
    mgr.record_turn("ok", "ok", vec![]);

    for turn in mgr.turns() {
        assert!(turn.importance_score >= 1.0);
        assert!(turn.importance_score <= 3.0);
    }
    assert_eq!(mgr.turns()[0].importance_score, 3.0);
}

#[test]
fn test_window_never_exceeds_budget_plus_reserve() {
    let mgr = manager();
    record_plain_turns(&mgr, 15);
    mgr.record_turn(
        "Explain the design",
        &"A long architectural answer with many words. ".repeat(40),
        vec![],
    );
    let attachments = vec![AttachmentContext::new("notes.md", "meeting notes about the cache rollout")];

    for budget in [0, 1, 10, 100, 499, 500, 501, 520, 600, 1000, 2000, 8000] {
        let window = mgr.build_window("What did we decide about the cache?", &attachments, budget);
        assert!(
            window.total_tokens <= budget + 500,
            "budget {} produced {} tokens",
            budget,
            window.total_tokens
        );
    }
}

#[test]
fn test_window_messages_are_chronological() {
    let mgr = manager();
    record_plain_turns(&mgr, 12);
    mgr.record_turn("Question about caching", "Caching answer", vec![]);

    let window = mgr.build_window("caching", &[], 560);
    assert!(!window.selected_turn_ids.is_empty());

    let turns = mgr.turns();
    let timestamps: Vec<_> = window
        .selected_turn_ids
        .iter()
        .filter_map(|id| turns.iter().find(|t| &t.id == id))
        .map(|t| (t.timestamp, t.seq))
        .collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

    // Messages alternate user then assistant
    for pair in window.messages.chunks(2) {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[1].role, MessageRole::Assistant);
    }
}

#[test]
fn test_greedy_stop_excludes_smaller_candidates() {
    let build = |policy: SelectionPolicy| {
        let mut config = Config::default();
        config.window.policy = policy;
        let mgr = manager_with(config);

        mgr.record_turn("Short question", "Short reply here", vec![]);
        let big_reply = format!("```x```{}", " word".repeat(470));
        mgr.record_turn("Give me code", &big_reply, vec![]);
        mgr
    };

    // An empty query costs nothing, leaving 500 tokens after the reserve
    let greedy = build(SelectionPolicy::GreedyStop);
    let big = greedy.turns()[1].clone();
    assert!(big.tokens_used > 500);
    assert!(big.importance_score > 2.0);

    let window = greedy.build_window("", &[], 1000);
    assert_eq!(window.available_tokens, 500);
    assert!(window.messages.is_empty());

    let best_fit = build(SelectionPolicy::BestFit);
    let window = best_fit.build_window("", &[], 1000);
    assert_eq!(window.messages.len(), 2);
    assert_eq!(window.messages[0].content, "Short question");
}

#[test]
fn test_keyword_overlap_promotes_older_turn() {
    let mgr = manager();
    mgr.record_turn("cache question", "cache answer", vec![]);
    mgr.record_turn("weather", "sunny", vec![]);

    let cache_turn_tokens = mgr.turns()[0].tokens_used;
    let query = "cache";
    let query_tokens = FallbackEstimator::word_based().estimate(query);

    let window = mgr.build_window(query, &[], 500 + query_tokens + cache_turn_tokens);
    assert_eq!(window.messages.len(), 2);
    assert_eq!(window.messages[0].content, "cache question");
}

#[tokio::test]
async fn test_relevant_summary_is_attached() {
    let mut config = Config::default();
    config.summarization.threshold = 4;
    let mgr = manager_with(config);

    mgr.record_turn(
        "Tell me about PostgreSQL indexing",
        "Use a btree index on the lookup column for the solution.",
        vec![],
    );
    mgr.record_turn("And vacuum?", "Autovacuum handles most tables fine.", vec![]);
    mgr.record_turn("Thanks", "You are welcome.", vec![]);
    mgr.record_turn("Bye", "Goodbye.", vec![]);
    mgr.settle().await;

    let summaries = mgr.summaries();
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].key_topics.contains(&"postgresql".to_string()));
    assert_eq!(summaries[0].decisions_made.len(), 1);

    let window = mgr.build_window_default("How does PostgreSQL pick an index?", &[]);
    assert_eq!(window.summary.as_deref(), Some(summaries[0].summary_text.as_str()));

    let unrelated = mgr.build_window_default("zzz", &[]);
    assert!(unrelated.summary.is_none());
}

#[test]
fn test_stats_track_resident_turns() {
    let mgr = manager();
    mgr.record_turn("Show code", "Use `ls -la` to list.", vec![]);
    mgr.record_turn("See the doc", "Read it.", vec!["doc-1".to_string()]);
    mgr.record_turn("Plain", "Plain.", vec![]);

    let stats = mgr.get_stats();
    assert_eq!(stats.total_turns, 3);
    assert_eq!(stats.turns_with_code, 1);
    assert_eq!(stats.turns_with_attachments, 1);
    assert_eq!(stats.summaries_created, 0);
    assert_eq!(
        stats.total_tokens,
        mgr.turns().iter().map(|t| t.tokens_used).sum::<usize>()
    );

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["total_turns"], 3);
}

/// Similarity adapter that always fails
struct BrokenSimilarity;

impl SimilarityScorer for BrokenSimilarity {
    fn similarity(&self, _a: &str, _b: &str) -> Result<f32, AdapterError> {
        Err(AdapterError::Unavailable("embedding service down".to_string()))
    }
}

#[test]
fn test_failing_similarity_degrades_silently() {
    let mgr = ContextManager::with_adapters(
        Config::default(),
        Arc::new(FallbackEstimator::word_based()),
        Arc::new(BrokenSimilarity),
    )
    .unwrap();
    record_plain_turns(&mgr, 3);

    let window = mgr.build_window_default("Question 1", &[]);
    assert_eq!(window.messages.len(), 6);
}

#[test]
fn test_prompt_assembly_with_attachments() {
    let mgr = manager();
    mgr.record_turn("What is the main result", "The main result is a 2x speedup.", vec![]);

    let attachments = vec![AttachmentContext::new("bench.csv", "benchmark numbers")];
    let messages = mgr.build_prompt("Can we do better?", &attachments);

    assert_eq!(messages[0].role, MessageRole::System);
    assert!(messages[0].content.contains("Key Points from Previous Discussion:"));
    assert!(messages[0].content.contains("- bench.csv: benchmark numbers..."));
    assert_eq!(messages.last().unwrap().content, "Can we do better?");
}
