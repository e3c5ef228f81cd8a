use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    backend::{LegalDataSource, LlmBackend},
    conversation::Conversation,
    pacing::{PacePoint, Pacer},
    prompts,
    refine::refine,
    types::{ContentType, PipelineEvent, Stage, TurnReport},
};

/// A turn that stopped early. Nothing from it reaches the conversation.
#[derive(Debug)]
pub struct TurnError {
    pub stage: Stage,
    pub source: anyhow::Error,
}

impl TurnError {
    fn new(stage: Stage, source: anyhow::Error) -> Self {
        Self { stage, source }
    }
}

impl std::fmt::Display for TurnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {:#}", self.stage, self.source)
    }
}

impl std::error::Error for TurnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Four-stage retrieval pipeline: keywords → search → filter → report.
pub struct Pipeline {
    pub llm: Arc<dyn LlmBackend>,
    pub source: Arc<dyn LegalDataSource>,
    pub pacer: Arc<dyn Pacer>,
    pub event_tx: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        source: Arc<dyn LegalDataSource>,
        pacer: Arc<dyn Pacer>,
    ) -> (Self, broadcast::Receiver<PipelineEvent>) {
        let (tx, rx) = broadcast::channel(256);
        let p = Self {
            llm,
            source,
            pacer,
            event_tx: tx,
        };
        (p, rx)
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    fn emit_stage(&self, session: &str, stage: Stage, message: impl Into<String>) {
        self.emit(PipelineEvent::Stage {
            session: session.to_string(),
            stage,
            message: message.into(),
        });
    }

    /// Run one user turn and, on success, append the prompt and the report
    /// to `conversation`. On failure the conversation is left untouched.
    pub async fn run_turn(
        &self,
        session: &str,
        conversation: &mut Conversation,
        user_text: &str,
    ) -> Result<TurnReport, TurnError> {
        let before = conversation.len();
        info!(session = %session, history = before, llm = self.llm.name(), "turn started");

        match self.run_stages(session, user_text).await {
            Ok(report) => {
                conversation.push_user(user_text);
                conversation.push_assistant(report.report.clone());
                info!(
                    session = %session,
                    keywords = report.keywords.len(),
                    retrievals_found = report.retrievals_found,
                    report_len = report.report.len(),
                    "turn completed"
                );
                self.emit(PipelineEvent::Completed {
                    session: session.to_string(),
                });
                Ok(report)
            },
            Err(e) => {
                error!(session = %session, stage = %e.stage, "turn failed: {:#}", e.source);
                self.emit(PipelineEvent::Failed {
                    session: session.to_string(),
                    stage: e.stage,
                    error: format!("{:#}", e.source),
                });
                Err(e)
            },
        }
    }

    async fn run_stages(&self, session: &str, user_text: &str) -> Result<TurnReport, TurnError> {
        self.emit_stage(session, Stage::KeywordExtraction, "핵심 법적 키워드 추출 중");
        let keywords = self.extract_keywords(user_text).await?;
        info!(session = %session, ?keywords, "keywords extracted");

        self.emit_stage(session, Stage::Retrieval, "법률 데이터 수집 중");
        let (context, retrievals_found) = self.retrieve(session, &keywords).await;

        self.emit_stage(session, Stage::Filtering, "관련성 낮은 데이터 필터링 중");
        let filtered_context = self.filter(user_text, &context).await?;
        if prompts::is_insufficient(&filtered_context) {
            warn!(session = %session, "filter stage found no relevant material");
        }

        self.emit_stage(session, Stage::Synthesis, "최종 분석 보고서 작성 중");
        self.pacer.pause(PacePoint::BeforeSynthesis).await;
        let report = self.synthesize(user_text, &filtered_context).await?;

        Ok(TurnReport {
            keywords,
            retrievals_found,
            filtered_context,
            report,
        })
    }

    async fn extract_keywords(&self, user_text: &str) -> Result<Vec<String>, TurnError> {
        let completion = self
            .llm
            .generate(&prompts::keyword_prompt(user_text))
            .await
            .map_err(|e| TurnError::new(Stage::KeywordExtraction, e))?;
        let keywords = prompts::parse_keywords(&completion);
        if keywords.len() != 2 {
            warn!(count = keywords.len(), raw = %completion, "expected 2 keywords");
        }
        Ok(keywords)
    }

    /// Search each keyword in order and concatenate the refined excerpts.
    ///
    /// Returns the context buffer and how many searches returned a payload.
    async fn retrieve(&self, session: &str, keywords: &[String]) -> (String, usize) {
        let mut context = String::new();
        let mut found = 0;

        for (idx, keyword) in keywords.iter().enumerate() {
            if idx > 0 {
                self.pacer.pause(PacePoint::BetweenRetrievals).await;
            }
            let content_type = ContentType::for_keyword_index(idx);
            info!(session = %session, keyword = %keyword, target = %content_type, "searching");

            let raw = self.source.search(keyword, content_type).await;
            self.emit(PipelineEvent::Retrieval {
                session: session.to_string(),
                keyword: keyword.clone(),
                content_type,
                found: raw.is_some(),
            });

            if let Some(raw) = raw {
                found += 1;
                context.push_str(&refine(&raw, content_type));
            }
        }

        (context, found)
    }

    async fn filter(&self, user_text: &str, context: &str) -> Result<String, TurnError> {
        self.llm
            .generate(&prompts::filter_prompt(user_text, context))
            .await
            .map_err(|e| TurnError::new(Stage::Filtering, e))
    }

    async fn synthesize(&self, user_text: &str, filtered: &str) -> Result<String, TurnError> {
        self.llm
            .generate(&prompts::synthesis_prompt(user_text, filtered))
            .await
            .map_err(|e| TurnError::new(Stage::Synthesis, e))
    }
}
