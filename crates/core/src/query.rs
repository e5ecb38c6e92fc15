use crate::llm::LanguageModel;
use crate::models::{QueryAnswer, QueryRequest, ScoredChunk, SourceRef};
use crate::state::IndexState;
use crate::QueryError;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 4;

pub const DEFAULT_INSTRUCTIONS: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use five sentences maximum and keep the answer concise.";

const QUESTION: &str = "{question}";
const CONTEXT: &str = "{context}";
const STANDARD_SUFFIX: &str = "\nQuestion: {question}\nContext: {context}\nAnswer:";

/// Prompt text with `{question}` and `{context}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Uses `text` as is when it already places the question or the context;
    /// plain instructions get the standard question/context/answer suffix.
    pub fn from_instructions(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.contains(QUESTION) && !text.contains(CONTEXT) {
            text.push_str(STANDARD_SUFFIX);
        }
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitutes both placeholders in one pass, so placeholder-looking text
    /// inside the question or the context is left alone.
    pub fn render(&self, question: &str, context: &str) -> String {
        let mut rendered = String::with_capacity(self.text.len() + question.len() + context.len());
        let mut rest = self.text.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(QUESTION) {
                rendered.push_str(question);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(CONTEXT) {
                rendered.push_str(context);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::from_instructions(DEFAULT_INSTRUCTIONS)
    }
}

/// Answers questions from the live index, falling back to the bare question
/// when there is no index or nothing relevant in it.
#[derive(Clone)]
pub struct QueryEngine {
    state: Arc<IndexState>,
    llm: Arc<dyn LanguageModel>,
    default_template: PromptTemplate,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(state: Arc<IndexState>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            state,
            llm,
            default_template: PromptTemplate::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_template(mut self, template: PromptTemplate) -> Self {
        self.default_template = template;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn default_template(&self) -> &PromptTemplate {
        &self.default_template
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    pub async fn answer(&self, request: QueryRequest) -> Result<QueryAnswer, QueryError> {
        if request.prompt.trim().is_empty() {
            return Err(QueryError::InvalidRequest("prompt must not be empty".to_string()));
        }

        let query = request.effective_query();
        let session_context = request.session_context().to_string();

        let hits = self.retrieve(&query).await?;
        if hits.is_empty() {
            info!(model = self.llm.model(), "answering without retrieved context");
            let response = self.llm.generate(&query).await?;
            return Ok(QueryAnswer {
                response,
                session_context,
                grounded: false,
                sources: Vec::new(),
            });
        }

        let context = hits
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let requested = request
            .prompt_template
            .as_deref()
            .filter(|text| !text.trim().is_empty());
        let template = match requested {
            Some(text) => PromptTemplate::from_instructions(text),
            None => self.default_template.clone(),
        };
        let prompt = template.render(&query, &context);

        info!(model = self.llm.model(), chunks = hits.len(), "answering with retrieved context");
        let response = self.llm.generate(&prompt).await?;
        Ok(QueryAnswer {
            response,
            session_context,
            grounded: true,
            sources: hits.iter().map(|hit| SourceRef::from(&hit.chunk)).collect(),
        })
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, QueryError> {
        let Some(index) = self.state.live() else {
            debug!("no live index");
            return Ok(Vec::new());
        };
        Ok(index.search(query, self.top_k).await?)
    }
}
