// src/pipeline.rs
//! Orchestrator: one bounded run per invocation.
//!
//! read sources -> ledger filter -> cooldown filter -> per link
//! (generate, image) until the batch or link cap is hit -> publish ->
//! ledger append. The ledger is only written after the publisher
//! confirmed every post of the batch.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::failure_memory::FailureMemory;
use crate::generate::fetch::{PageFetcher, ReaderProxyFetcher};
use crate::generate::{ContentGenerator, GeneratedPost, GeneratorSettings, Outcome, Rejection, RejectionKind};
use crate::image::{normalize_image_url, sourcer_from_config, ImageSourcer};
use crate::ingest::providers;
use crate::ingest::read_sources;
use crate::ingest::types::{LinkRecord, SourceReader};
use crate::ledger::{JsonlLedgerStore, Ledger, LedgerStore};
use crate::llm::openai::OpenAiClient;
use crate::llm::{DynLlm, RateLimitedLlm, TokenUsage};
use crate::publish::http::HttpPublisher;
use crate::publish::{BatchPublisher, PublishTransport};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_candidates_total", "Links read from sources after in-batch dedup.");
        describe_counter!("pipeline_skipped_ledger_total", "Candidates already present in the ledger.");
        describe_counter!(
            "pipeline_skipped_cooldown_total",
            "Candidates skipped because a recent content failure is still cooling down."
        );
        describe_counter!("pipeline_rejected_total", "Links rejected, labelled by stage.");
        describe_counter!("pipeline_published_total", "Posts confirmed by the publisher and ledgered.");
        describe_counter!("pipeline_batch_failures_total", "Batches whose publish or ledger write failed.");
        describe_counter!("llm_rate_limited_total", "LLM calls that hit a rate limit and waited.");
        describe_counter!("llm_tokens_total", "LLM tokens spent, labelled input/output.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last completed run.");
    });
}

/// External collaborators, built once and handed to the orchestrator.
pub struct Clients {
    pub sources: Vec<Box<dyn SourceReader>>,
    pub ledger: Arc<dyn LedgerStore>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub llm: DynLlm,
    pub images: Arc<dyn ImageSourcer>,
    pub publisher: Arc<dyn PublishTransport>,
}

impl Clients {
    /// Production wiring from a resolved config.
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let llm: DynLlm = Arc::new(OpenAiClient::new(
            &cfg.llm.api_key,
            &cfg.llm.base_url,
            cfg.llm.timeout_secs,
        ));
        let images = sourcer_from_config(
            &cfg.image,
            rate_limited_llm(cfg, llm.clone()),
            &cfg.llm.check_model,
            cfg.retry.image,
        );
        Self {
            sources: cfg.sources.iter().map(providers::from_config).collect(),
            ledger: Arc::new(JsonlLedgerStore::new(&cfg.ledger.path)),
            fetcher: Arc::new(ReaderProxyFetcher::new(&cfg.fetch.reader_prefix, cfg.fetch.timeout_secs)),
            llm,
            images,
            publisher: Arc::new(HttpPublisher::new(
                &cfg.publish.endpoint,
                &cfg.publish.api_token,
                cfg.publish.timeout_secs,
            )),
        }
    }
}

/// Wrap `llm` with the configured rate-limit waits and `retry.llm` policy.
pub fn rate_limited_llm(cfg: &PipelineConfig, llm: DynLlm) -> RateLimitedLlm {
    RateLimitedLlm::new(llm, cfg.retry.llm).with_rate_limit(
        Duration::from_secs(cfg.llm.rate_limit_fallback_secs),
        Duration::from_secs(cfg.llm.max_rate_limit_wait_secs),
        cfg.llm.max_rate_limit_waits,
    )
}

/// Counts for one run, logged at the end and returned to the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub candidates: usize,
    pub skipped_ledger: usize,
    pub skipped_cooldown: usize,
    pub attempted: usize,
    /// Eligible links left for a later run by the caps.
    pub deferred: usize,
    pub rejected_source: usize,
    pub rejected_generation: usize,
    pub rejected_transient: usize,
    pub published: usize,
    pub usage: TokenUsage,
    pub estimated_cost_usd: f64,
}

pub struct Pipeline {
    config: PipelineConfig,
    sources: Vec<Box<dyn SourceReader>>,
    ledger: Arc<dyn LedgerStore>,
    generator: ContentGenerator,
    images: Arc<dyn ImageSourcer>,
    publisher: BatchPublisher,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, clients: Clients) -> Self {
        let generator = ContentGenerator::new(
            clients.fetcher,
            rate_limited_llm(&config, clients.llm),
            GeneratorSettings::from_config(&config),
        );
        let publisher = BatchPublisher::new(
            clients.publisher,
            config.publish.professional_domains.clone(),
            config.retry.publish,
        )
        .with_cap(config.limits.batch_size);
        Self {
            sources: clients.sources,
            ledger: clients.ledger,
            images: clients.images,
            generator,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// One invocation. `now` drives cooldown checks and failure timestamps.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        ensure_metrics_described();
        let mut report = RunReport::default();

        let records = read_sources(&self.sources).await;
        report.candidates = records.len();
        counter!("pipeline_candidates_total").increment(records.len() as u64);

        let mut ledger = Ledger::load(self.ledger.as_ref())
            .await
            .map_err(PipelineError::Ledger)?;
        let fresh = ledger.filter_already_processed(records);
        report.skipped_ledger = report.candidates - fresh.len();
        counter!("pipeline_skipped_ledger_total").increment(report.skipped_ledger as u64);

        let mut memory = FailureMemory::load(
            &self.config.failure_memory.path,
            self.config.failure_memory.cooldown_secs,
        );
        let (cooling, eligible): (Vec<LinkRecord>, Vec<LinkRecord>) = fresh
            .into_iter()
            .partition(|r| memory.is_cooling_down(&r.link, now));
        report.skipped_cooldown = cooling.len();
        counter!("pipeline_skipped_cooldown_total").increment(cooling.len() as u64);
        for r in &cooling {
            tracing::debug!(target: "pipeline", link = %r.link, "cooling down after recent failure, skipped");
        }
        tracing::info!(
            target: "pipeline",
            candidates = report.candidates,
            in_ledger = report.skipped_ledger,
            cooling_down = report.skipped_cooldown,
            eligible = eligible.len(),
            "candidates filtered"
        );

        let batch_cap = self.publisher.cap();
        let link_cap = self.config.limits.max_links_per_run;
        let mut taken: HashSet<String> = ledger.image_urls().clone();
        let mut batch: Vec<GeneratedPost> = Vec::new();
        let eligible_count = eligible.len();

        for record in &eligible {
            if batch.len() >= batch_cap || report.attempted >= link_cap {
                break;
            }
            report.attempted += 1;

            let attempt = self.generator.generate(record).await;
            report.usage += attempt.usage;
            let draft = match attempt.outcome {
                Outcome::Accepted(d) => d,
                Outcome::Rejected(r) => {
                    self.reject(record, &r, &mut memory, now, &mut report);
                    continue;
                }
            };

            let image = self.images.source_image(&draft.post_text, &taken).await;
            report.usage += image.usage;
            match image.result {
                Ok(img) => {
                    taken.insert(normalize_image_url(&img.url));
                    tracing::info!(
                        target: "pipeline",
                        link = %record.link,
                        category = %draft.category,
                        strategy = self.images.strategy(),
                        "post accepted into batch"
                    );
                    batch.push(GeneratedPost::assemble(record, draft, img.url, Utc::now()));
                }
                Err(e) => self.reject(record, &Rejection::Image(e), &mut memory, now, &mut report),
            }
        }
        report.deferred = eligible_count - report.attempted;
        report.estimated_cost_usd = report.usage.cost(
            self.config.llm.input_price_per_million,
            self.config.llm.output_price_per_million,
        );

        if batch.is_empty() {
            tracing::info!(target: "pipeline", attempted = report.attempted, "nothing to publish");
            self.finish(&report);
            return Ok(report);
        }

        let submitted = batch.len();
        let entries = match self.publisher.publish(batch).await {
            Ok(entries) => entries,
            Err(e) => {
                counter!("pipeline_batch_failures_total").increment(1);
                tracing::error!(
                    target: "pipeline",
                    stage = "publish",
                    submitted,
                    error = %e,
                    "batch publish failed, ledger left untouched"
                );
                return Err(PipelineError::Publish(e));
            }
        };

        if let Err(source) = ledger.append(self.ledger.as_ref(), &entries).await {
            counter!("pipeline_batch_failures_total").increment(1);
            tracing::error!(
                target: "pipeline",
                stage = "ledger",
                published = entries.len(),
                error = %source,
                "publisher accepted the batch but the ledger append failed"
            );
            return Err(PipelineError::LedgerWrite {
                published: entries.len(),
                source,
            });
        }

        report.published = entries.len();
        counter!("pipeline_published_total").increment(entries.len() as u64);
        self.finish(&report);
        Ok(report)
    }

    fn reject(
        &self,
        record: &LinkRecord,
        rejection: &Rejection,
        memory: &mut FailureMemory,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        counter!("pipeline_rejected_total", "stage" => rejection.stage()).increment(1);
        tracing::warn!(
            target: "pipeline",
            link = %record.link,
            source = %record.source_name,
            stage = rejection.stage(),
            error = %rejection,
            "link rejected"
        );
        match rejection.kind() {
            RejectionKind::SourceQuality => {
                report.rejected_source += 1;
                if let Err(e) = memory.record_failure(&record.link, now) {
                    tracing::warn!(target: "pipeline", link = %record.link, error = %e, "could not persist failure memory");
                }
            }
            RejectionKind::GenerationQuality => report.rejected_generation += 1,
            RejectionKind::Transient => report.rejected_transient += 1,
        }
    }

    fn finish(&self, report: &RunReport) {
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            attempted = report.attempted,
            deferred = report.deferred,
            published = report.published,
            rejected_source = report.rejected_source,
            rejected_generation = report.rejected_generation,
            rejected_transient = report.rejected_transient,
            input_tokens = report.usage.input_tokens,
            output_tokens = report.usage.output_tokens,
            total_tokens = report.usage.total(),
            estimated_cost_usd = report.estimated_cost_usd,
            "run finished"
        );
    }
}
