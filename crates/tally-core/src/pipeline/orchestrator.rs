//! Per-question orchestration: route, retrieve, plan, query, synthesize.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tally_abstraction::LanguageModel;
use tally_models::ModelFactory;
use tally_training::{read_exemplar_set, ExemplarSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::record::AnswerRecord;
use crate::config::TallyConfig;
use crate::error::{PipelineError, Result};
use crate::execution::Executor;
use crate::generation::{GenerationContext, QueryGenerator};
use crate::planning::Planner;
use crate::question::Question;
use crate::repair::RepairLoop;
use crate::retrieval::{load_corpus, RetrievalResult, Retriever};
use crate::routing::Router;
use crate::storage::{RelationalStore, SchemaMetadata, SqliteStore};
use crate::synthesis::{Answer, SynthesisInput, Synthesizer};

/// Run-wide knobs the pipeline reads on every question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub max_attempts: u32,
    pub query_timeout: Duration,
    pub as_of: NaiveDate,
}

impl PipelineSettings {
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            top_k: config.top_k,
            max_attempts: config.max_attempts,
            query_timeout: config.query_timeout(),
            as_of: config.as_of_or_today(),
        }
    }
}

/// The question-answering pipeline.
///
/// Every collaborator is built once and shared read-only, so one `Pipeline`
/// can serve many questions concurrently.
pub struct Pipeline {
    router: Router,
    retriever: Arc<Retriever>,
    planner: Planner,
    generator: QueryGenerator,
    executor: Executor,
    synthesizer: Synthesizer,
    schema: Arc<SchemaMetadata>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        schema: Arc<SchemaMetadata>,
        retriever: Arc<Retriever>,
        store: Arc<dyn RelationalStore>,
        exemplars: Arc<ExemplarSet>,
        model: Option<Arc<dyn LanguageModel>>,
        settings: PipelineSettings,
    ) -> Self {
        let mut planner = Planner::new(Arc::clone(&schema), settings.as_of);
        let mut generator = QueryGenerator::new(exemplars);
        if let Some(model) = model {
            planner = planner.with_model(Arc::clone(&model));
            generator = generator.with_model(model);
        }

        Self {
            router: Router::new(),
            retriever,
            planner,
            generator,
            executor: Executor::new(store, settings.query_timeout),
            synthesizer: Synthesizer::new(Arc::clone(&schema)),
            schema,
            settings,
        }
    }

    /// Loads the corpus, opens the database, reads the schema and exemplar
    /// set, and creates the model named in `config`.
    ///
    /// # Errors
    /// Any startup failure: a missing corpus directory, an unreadable
    /// database, an invalid exemplar file or an unknown model provider.
    pub fn from_config(config: &TallyConfig) -> Result<Self> {
        let settings = PipelineSettings::from_config(config);

        let documents = load_corpus(&config.docs_path)?;
        let retriever = Arc::new(Retriever::from_documents(documents));

        let store: Arc<dyn RelationalStore> = Arc::new(SqliteStore::open(&config.database_path)?);

        let mut exemplars = match &config.exemplars_path {
            Some(path) => read_exemplar_set(path)?,
            None => ExemplarSet::baseline(),
        };
        if let Some(temperature) = config.temperature {
            exemplars.params.temperature = temperature;
        }
        info!(version = %exemplars.version, exemplars = exemplars.exemplars.len(), "Loaded exemplar set");

        let schema = Arc::new(SchemaMetadata::introspect(store.as_ref(), &exemplars.params, settings.query_timeout)?);
        let model = ModelFactory::create(config.model.clone())?;

        Ok(Self::new(schema, retriever, store, Arc::new(exemplars), Some(model), settings))
    }

    pub fn schema(&self) -> &SchemaMetadata {
        &self.schema
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn generator(&self) -> &QueryGenerator {
        &self.generator
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Answers one question.
    ///
    /// Degraded evidence still yields an answer. Only an unreachable store,
    /// cancellation or an unplannable question end in an error.
    pub async fn answer(&self, question: &Question, cancel: &CancellationToken) -> std::result::Result<Answer, PipelineError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let route = self.router.classify(question);
        debug!(question_id = question.id(), mode = %route.mode, rationale = %route.rationale, "Routed question");

        let retrieval: Option<RetrievalResult> =
            route.mode.needs_documents().then(|| self.retriever.search(question.text(), self.settings.top_k));
        if let Some(result) = &retrieval {
            debug!(question_id = question.id(), passages = result.len(), top_score = result.top_score(), "Retrieved passages");
        }

        let mut plan = None;
        let mut repair = None;
        if route.mode.needs_query() {
            let query_plan = self.planner.plan(question, &route, retrieval.as_ref()).await?;
            let constraints = retrieval
                .as_ref()
                .map(|r| r.passages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();

            let ctx = GenerationContext {
                question,
                plan: &query_plan,
                schema: &self.schema,
                constraints: &constraints,
            };
            let state = RepairLoop::new(&self.generator, &self.executor, self.settings.max_attempts)
                .run(ctx, cancel)
                .await?;
            plan = Some(query_plan);
            repair = Some(state);
        }

        let answer = self.synthesizer.synthesize(SynthesisInput {
            question,
            route: &route,
            retrieval: retrieval.as_ref(),
            plan: plan.as_ref(),
            repair: repair.as_ref(),
        });

        info!(
            question_id = question.id(),
            mode = %answer.mode,
            confidence = answer.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered question"
        );
        Ok(answer)
    }

    /// Answers one question as an output record. Never fails: a fatal error
    /// becomes a record carrying `error`.
    pub async fn answer_record(&self, question: &Question, cancel: &CancellationToken) -> AnswerRecord {
        match self.answer(question, cancel).await {
            Ok(answer) => AnswerRecord::from_answer(answer),
            Err(e) => {
                warn!(question_id = question.id(), error = %e, "Question failed");
                AnswerRecord::failed(question, &e)
            }
        }
    }
}
