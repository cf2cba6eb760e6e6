// tests/generator_states.rs
mod support;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use scrapegen::config::vocabulary::{Category, Vocabulary};
use scrapegen::error::{FetchError, LlmError};
use scrapegen::generate::prompts::ARTICLE_CHECK_PROMPT;
use scrapegen::generate::{ContentGenerator, GeneratorSettings, Outcome, Rejection, RejectionKind};
use scrapegen::ingest::normalize_link;
use scrapegen::ingest::types::LinkRecord;
use scrapegen::llm::{DynLlm, RateLimitedLlm};
use scrapegen::retry::RetryPolicy;
use support::*;

fn record(link: &str) -> LinkRecord {
    LinkRecord {
        link: link.into(),
        normalized_link: normalize_link(link),
        time: Utc::now(),
        source_link: None,
        source_name: "test".into(),
    }
}

fn generator(fetcher: Arc<FakeFetcher>, llm: Arc<FakeLlm>, llm_retry: RetryPolicy) -> ContentGenerator {
    let dyn_llm: DynLlm = llm;
    ContentGenerator::new(
        fetcher,
        RateLimitedLlm::new(dyn_llm, llm_retry).with_rate_limit(Duration::ZERO, Duration::ZERO, 3),
        GeneratorSettings {
            check_model: "small".into(),
            generate_model: "large".into(),
            system_prompt: "Write a post.".into(),
            fetch_retry: RetryPolicy::immediate(3),
            vocabulary: Vocabulary::new(["AI", "MedTech"]),
        },
    )
}

fn rejection(outcome: Outcome) -> Rejection {
    match outcome {
        Outcome::Rejected(r) => r,
        Outcome::Accepted(d) => panic!("expected rejection, got {d:?}"),
    }
}

#[tokio::test]
async fn accepted_draft_is_clean_and_in_vocabulary() {
    let llm = Arc::new(FakeLlm::default());
    let g = generator(Arc::new(FakeFetcher::default()), llm.clone(), RetryPolicy::none());

    let attempt = g.generate(&record("https://a.test/1")).await;
    let draft = match attempt.outcome {
        Outcome::Accepted(d) => d,
        Outcome::Rejected(r) => panic!("rejected: {r}"),
    };
    assert_eq!(draft.post_text, "Headline\nBIG news from the ward.");
    assert_eq!(draft.hashtags, vec!["AI", "MedTech"]);
    assert_eq!(draft.category, Category::ClinicalPractice);
    assert_eq!(draft.model_name, "large");
    assert_eq!(draft.prompt_used, "Write a post.");
    assert_eq!(attempt.usage.input_tokens, 200);

    let reqs = llm.requests.lock().unwrap();
    assert_eq!(reqs[0].model, "small");
    assert_eq!(reqs[0].system_prompt, ARTICLE_CHECK_PROMPT);
    assert_eq!(reqs[1].model, "large");
    let schema = &reqs[1].response_schema.as_ref().unwrap().schema;
    assert_eq!(schema["properties"]["hashtags"]["items"]["enum"], serde_json::json!(["AI", "MedTech"]));
}

#[tokio::test]
async fn none_reply_stops_before_generation() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.page("https://a.test/x", NOT_ARTICLE);
    let llm = Arc::new(FakeLlm::default());
    let g = generator(fetcher, llm.clone(), RetryPolicy::none());

    let r = rejection(g.generate(&record("https://a.test/x")).await.outcome);
    assert!(matches!(r, Rejection::NotArticle));
    assert_eq!(r.kind(), RejectionKind::SourceQuality);
    assert_eq!(llm.generations(), 0);
}

#[tokio::test]
async fn blank_page_or_blank_extraction_is_empty_content() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.page("https://a.test/blank", "  \n ");
    fetcher.page("https://a.test/noise", EMPTY_ARTICLE);
    let llm = Arc::new(FakeLlm::default());
    let g = generator(fetcher, llm.clone(), RetryPolicy::none());

    let r = rejection(g.generate(&record("https://a.test/blank")).await.outcome);
    assert!(matches!(r, Rejection::EmptyContent));
    assert_eq!(llm.calls(), 0, "blank page never reaches the LLM");

    let r = rejection(g.generate(&record("https://a.test/noise")).await.outcome);
    assert!(matches!(r, Rejection::EmptyContent));
}

#[tokio::test]
async fn off_vocabulary_output_is_a_generation_failure() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.page("https://a.test/x", SCHEMA_BREAK);
    let g = generator(fetcher, Arc::new(FakeLlm::default()), RetryPolicy::none());

    let r = rejection(g.generate(&record("https://a.test/x")).await.outcome);
    assert_eq!(r.kind(), RejectionKind::GenerationQuality);
    assert!(r.to_string().contains("Crypto"), "{r}");
}

#[tokio::test]
async fn client_error_on_fetch_is_transient_and_not_retried() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.fail_with("https://a.test/x", &[403, 403, 403]);
    let g = generator(fetcher.clone(), Arc::new(FakeLlm::default()), RetryPolicy::none());

    let r = rejection(g.generate(&record("https://a.test/x")).await.outcome);
    assert!(matches!(r, Rejection::Fetch(FetchError::Http { status: 403, .. })));
    assert_eq!(r.kind(), RejectionKind::Transient);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn fetch_gives_up_after_budget() {
    let fetcher = Arc::new(FakeFetcher::default());
    fetcher.fail_with("https://a.test/x", &[500, 500, 500, 500]);
    let g = generator(fetcher.clone(), Arc::new(FakeLlm::default()), RetryPolicy::none());

    let r = rejection(g.generate(&record("https://a.test/x")).await.outcome);
    assert!(matches!(r, Rejection::Fetch(_)));
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn rate_limits_wait_instead_of_failing_the_link() {
    let llm = Arc::new(FakeLlm::default());
    llm.push_error(LlmError::RateLimited {
        retry_after: Some(Duration::from_millis(1)),
    });
    llm.push_error(LlmError::RateLimited { retry_after: None });
    let g = generator(Arc::new(FakeFetcher::default()), llm.clone(), RetryPolicy::none());

    let attempt = g.generate(&record("https://a.test/x")).await;
    assert!(matches!(attempt.outcome, Outcome::Accepted(_)));
    assert_eq!(llm.article_checks(), 3, "same call repeated after each wait");
}

#[tokio::test]
async fn server_errors_use_llm_retry_policy() {
    let llm = Arc::new(FakeLlm::default());
    llm.push_error(LlmError::Http {
        status: 502,
        body: String::new(),
    });
    let g = generator(Arc::new(FakeFetcher::default()), llm.clone(), RetryPolicy::immediate(2));
    assert!(matches!(g.generate(&record("https://a.test/x")).await.outcome, Outcome::Accepted(_)));

    let llm = Arc::new(FakeLlm::default());
    llm.push_error(LlmError::Http {
        status: 400,
        body: "bad request".into(),
    });
    let g = generator(Arc::new(FakeFetcher::default()), llm.clone(), RetryPolicy::immediate(2));
    let r = rejection(g.generate(&record("https://a.test/x")).await.outcome);
    assert!(matches!(r, Rejection::ArticleCheck(LlmError::Http { status: 400, .. })));
    assert_eq!(r.stage(), "article_check");
    assert_eq!(llm.calls(), 1);
}
