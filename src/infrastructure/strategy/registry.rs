//! Strategy registry - builds the workflow graph for each strategy
//!
//! Every graph ends in an answer node. Retrieval-based strategies route to the
//! fallback node when retrieval leaves the context empty; the fallback is
//! `UseGeneralKnowledge` or the fixed no-information answer depending on
//! [`StrategyConfig::use_fallback`]. Generation nodes are terminal: their
//! failures end the run with `GenerationFailed`.

use tracing::debug;

use crate::domain::strategy::{StrategyConfig, StrategyName};
use crate::domain::workflow::{WorkflowError, WorkflowGraph, WorkflowGraphBuilder, WorkflowState, END};
use crate::infrastructure::workflow::steps::{
    AgentStep, AgentStyle, AssessRelevanceStep, ClassifyDomainStep, CorrectiveGenerateStep,
    ExtractKeyTermsStep, FollowUpStep, FuseRankingsStep, GenerateStep, GeneralKnowledgeStep,
    LinkPassagesStep, NoInformationStep, PromptStyle, QueryVariantsStep, RealmGenerateStep,
    RealmRefineStep, RealmRetrieveStep, RefeedStep, ReformulateStep, RerankStep,
    RetrieveStep, RetrieveVariantsStep, SearchModeStep, GENERAL_KNOWLEDGE_CONFIDENCE,
};

/// Node names shared by the strategy graphs
pub mod node {
    pub const RETRIEVE: &str = "retrieve";
    pub const GENERATE: &str = "generate";
    pub const FALLBACK: &str = "fallback";
    pub const LINK: &str = "link_passages";
    pub const SEARCH_MODE: &str = "determine_search_mode";
    pub const ASSESS: &str = "assess_relevance";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const REFORMULATE: &str = "reformulate_query";
    pub const CORRECTIVE_GENERATE: &str = "corrective_generate";
    pub const QUERY_VARIANTS: &str = "generate_query_variants";
    pub const RETRIEVE_VARIANTS: &str = "retrieve_variants";
    pub const FUSE: &str = "fuse_rankings";
    pub const RERANK: &str = "rerank";
    pub const REFEED: &str = "refeed";
    pub const CLASSIFY_DOMAIN: &str = "classify_domain";
    pub const EXTRACT_KEY_TERMS: &str = "extract_key_terms";
    pub const REALM_RETRIEVE: &str = "realm_retrieve";
    pub const REALM_GENERATE: &str = "realm_generate";
    pub const REALM_REFINE: &str = "realm_refine";
    pub const AGENT: &str = "agent";
}

use node::*;

/// Builds workflow graphs by strategy name
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyRegistry;

impl StrategyRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Build the graph for a strategy under the given configuration
    pub fn build(
        &self,
        strategy: StrategyName,
        config: &StrategyConfig,
    ) -> Result<WorkflowGraph, WorkflowError> {
        debug!("Building workflow graph for strategy '{}'", strategy);

        let top_k = config.top_k_for(strategy);
        let builder = WorkflowGraphBuilder::new(strategy.as_str());

        let builder = match strategy {
            StrategyName::Standard => standard(builder, config, top_k),
            StrategyName::Graph => graph(builder, config, top_k),
            StrategyName::Adaptive => adaptive(builder, config, top_k),
            StrategyName::Iterative => iterative(builder, config, top_k),
            StrategyName::SelfReflective => self_reflective(builder, config, top_k),
            StrategyName::Corrective => corrective(builder, config, top_k),
            StrategyName::Fusion => fusion(builder, config, top_k),
            StrategyName::Raptor => raptor(builder, config, top_k),
            StrategyName::Refeed => refeed(builder, config, top_k),
            StrategyName::Realm => realm(builder, config, top_k),
            StrategyName::Agentic => agent(builder, config, top_k, AgentStyle::Agentic),
            StrategyName::Speculative => agent(builder, config, top_k, AgentStyle::Speculative),
        };

        builder.build()
    }
}

/// Add the fallback node matching the configured policy
fn with_fallback(builder: WorkflowGraphBuilder, config: &StrategyConfig) -> WorkflowGraphBuilder {
    let builder = if config.use_fallback {
        builder.add_terminal_node(FALLBACK, GeneralKnowledgeStep::new(config.max_length))
    } else {
        builder.add_node(FALLBACK, NoInformationStep)
    };
    builder.add_edge(FALLBACK, END)
}

/// Route `from` to `answer` unless the context is empty
fn route_on_context(builder: WorkflowGraphBuilder, from: &str, answer: &'static str) -> WorkflowGraphBuilder {
    builder.add_conditional_edges(from, &[answer, FALLBACK], move |state: &WorkflowState| {
        if state.context.is_empty() {
            FALLBACK.to_string()
        } else {
            answer.to_string()
        }
    })
}

/// Retrieve, then answer with `style` or fall back
fn retrieve_then_answer(
    builder: WorkflowGraphBuilder,
    config: &StrategyConfig,
    top_k: usize,
    style: PromptStyle,
) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_terminal_node(GENERATE, GenerateStep::new(style, config.max_length))
        .add_edge(GENERATE, END);
    route_on_context(with_fallback(builder, config), RETRIEVE, GENERATE)
}

fn standard(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    retrieve_then_answer(builder, config, top_k, PromptStyle::Default).set_entry(RETRIEVE)
}

fn graph(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_node(LINK, LinkPassagesStep::new(config.link_threshold))
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Default, config.max_length))
        .add_edge(RETRIEVE, LINK)
        .add_edge(GENERATE, END)
        .set_entry(RETRIEVE);
    route_on_context(with_fallback(builder, config), LINK, GENERATE)
}

fn adaptive(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let fallback = if config.use_fallback {
        builder.add_terminal_node(
            FALLBACK,
            GeneralKnowledgeStep::new(config.max_length).with_confidence(GENERAL_KNOWLEDGE_CONFIDENCE),
        )
    } else {
        builder.add_node(FALLBACK, NoInformationStep)
    };

    fallback
        .add_node(SEARCH_MODE, SearchModeStep)
        .add_node(RETRIEVE, RetrieveStep::new(top_k).with_mode_from_state())
        .add_node(ASSESS, AssessRelevanceStep::judgment())
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Adaptive, config.max_length))
        .add_edge(SEARCH_MODE, RETRIEVE)
        .add_edge(RETRIEVE, ASSESS)
        .add_conditional_edges(ASSESS, &[GENERATE, FALLBACK], |state: &WorkflowState| {
            let relevant = state.relevance.is_some_and(|v| v.is_relevant);
            if relevant && !state.context.is_empty() {
                GENERATE.to_string()
            } else {
                FALLBACK.to_string()
            }
        })
        .add_edge(GENERATE, END)
        .add_edge(FALLBACK, END)
        .set_entry(SEARCH_MODE)
}

fn iterative(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(RETRIEVE, RetrieveStep::new(top_k).accumulating())
        .add_terminal_node(
            GENERATE,
            GenerateStep::new(PromptStyle::Default, config.max_length).into_draft(),
        )
        .add_node(FOLLOW_UP, FollowUpStep::new(config.max_length))
        .add_edge(GENERATE, FOLLOW_UP)
        .add_conditional_edges(FOLLOW_UP, &[RETRIEVE, END], |state: &WorkflowState| {
            if state.iteration.is_terminated() {
                END.to_string()
            } else {
                RETRIEVE.to_string()
            }
        })
        .set_entry(RETRIEVE);
    route_on_context(with_fallback(builder, config), RETRIEVE, GENERATE)
}

/// Where a self-reflective run goes once it stops looping
fn best_available(state: &WorkflowState) -> String {
    if state.graded.is_empty() {
        FALLBACK.to_string()
    } else {
        GENERATE.to_string()
    }
}

fn self_reflective(
    builder: WorkflowGraphBuilder,
    config: &StrategyConfig,
    top_k: usize,
) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_node(
            ASSESS,
            AssessRelevanceStep::term_overlap(config.relevance_threshold).controlling_loop(),
        )
        .add_node(REFORMULATE, ReformulateStep)
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Graded, config.max_length))
        .add_edge(RETRIEVE, ASSESS)
        .add_conditional_edges(
            ASSESS,
            &[GENERATE, REFORMULATE, FALLBACK],
            |state: &WorkflowState| {
                if state.relevance.is_some_and(|v| v.is_relevant) && !state.graded.is_empty() {
                    GENERATE.to_string()
                } else if state.iteration.can_continue() {
                    REFORMULATE.to_string()
                } else {
                    best_available(state)
                }
            },
        )
        .add_conditional_edges(
            REFORMULATE,
            &[RETRIEVE, GENERATE, FALLBACK],
            |state: &WorkflowState| {
                if state.iteration.is_terminated() {
                    best_available(state)
                } else {
                    RETRIEVE.to_string()
                }
            },
        )
        .add_edge(GENERATE, END)
        .set_entry(RETRIEVE);
    with_fallback(builder, config)
}

fn corrective(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_terminal_node(
            CORRECTIVE_GENERATE,
            CorrectiveGenerateStep::new(
                config.confidence_threshold,
                config.max_correction_attempts,
                config.max_length,
            ),
        )
        .add_edge(CORRECTIVE_GENERATE, END)
        .set_entry(RETRIEVE);
    route_on_context(with_fallback(builder, config), RETRIEVE, CORRECTIVE_GENERATE)
}

fn fusion(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(QUERY_VARIANTS, QueryVariantsStep::new(config.num_query_variants))
        .add_node(RETRIEVE_VARIANTS, RetrieveVariantsStep::new(top_k))
        .add_node(FUSE, FuseRankingsStep::new(config.fusion_k, config.fusion_results))
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Ranked, config.max_length))
        .add_edge(QUERY_VARIANTS, RETRIEVE_VARIANTS)
        .add_edge(RETRIEVE_VARIANTS, FUSE)
        .add_edge(GENERATE, END)
        .set_entry(QUERY_VARIANTS);
    route_on_context(with_fallback(builder, config), FUSE, GENERATE)
}

/// Add the rerank node, terminal only under strict enhancements
fn with_rerank(builder: WorkflowGraphBuilder, step: RerankStep, strict: bool) -> WorkflowGraphBuilder {
    if strict {
        builder.add_terminal_node(RERANK, step)
    } else {
        builder.add_node(RERANK, step)
    }
}

fn raptor(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let strict = config.strict_enhancements;
    let rerank = RerankStep::new()
        .with_limit(config.rerank_top_n)
        .strict(strict);
    let builder = with_rerank(builder, rerank, strict)
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Ranked, config.max_length))
        .add_edge(RETRIEVE, RERANK)
        .add_edge(GENERATE, END)
        .set_entry(RETRIEVE);
    route_on_context(with_fallback(builder, config), RERANK, GENERATE)
}

fn refeed(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let strict = config.strict_enhancements;
    let builder = with_rerank(builder, RerankStep::new().strict(strict), strict)
        .add_node(RETRIEVE, RetrieveStep::new(top_k))
        .add_node(
            REFEED,
            RefeedStep::new(top_k, config.max_refeed_docs, config.refeed_enrichment_factor)
                .with_seed(config.enrichment_seed)
                .strict(strict),
        )
        .add_terminal_node(GENERATE, GenerateStep::new(PromptStyle::Ranked, config.max_length))
        .add_edge(RETRIEVE, RERANK)
        .add_conditional_edges(REFEED, &[REFEED, GENERATE], |state: &WorkflowState| {
            if state.iteration.can_continue() {
                REFEED.to_string()
            } else {
                GENERATE.to_string()
            }
        })
        .add_edge(GENERATE, END)
        .set_entry(RETRIEVE);
    route_on_context(with_fallback(builder, config), RERANK, REFEED)
}

fn realm(builder: WorkflowGraphBuilder, config: &StrategyConfig, top_k: usize) -> WorkflowGraphBuilder {
    let builder = builder
        .add_node(CLASSIFY_DOMAIN, ClassifyDomainStep)
        .add_node(EXTRACT_KEY_TERMS, ExtractKeyTermsStep)
        .add_node(REALM_RETRIEVE, RealmRetrieveStep::new(top_k, config.max_context_docs))
        .add_terminal_node(REALM_GENERATE, RealmGenerateStep::new(config.max_length))
        .add_node(REALM_REFINE, RealmRefineStep::new(top_k, config.max_length))
        .add_edge(CLASSIFY_DOMAIN, EXTRACT_KEY_TERMS)
        .add_edge(EXTRACT_KEY_TERMS, REALM_RETRIEVE)
        .add_edge(REALM_GENERATE, REALM_REFINE)
        .add_conditional_edges(REALM_REFINE, &[REALM_GENERATE, END], |state: &WorkflowState| {
            if state.iteration.is_terminated() {
                END.to_string()
            } else {
                REALM_GENERATE.to_string()
            }
        })
        .set_entry(CLASSIFY_DOMAIN);
    route_on_context(with_fallback(builder, config), REALM_RETRIEVE, REALM_GENERATE)
}

fn agent(
    builder: WorkflowGraphBuilder,
    config: &StrategyConfig,
    top_k: usize,
    style: AgentStyle,
) -> WorkflowGraphBuilder {
    retrieve_then_answer(builder, config, top_k, PromptStyle::Default)
        .add_node(AGENT, AgentStep::new(style, top_k, config.max_length))
        .add_conditional_edges(AGENT, &[END, RETRIEVE], |state: &WorkflowState| {
            if state.agent_succeeded == Some(true) {
                END.to_string()
            } else {
                RETRIEVE.to_string()
            }
        })
        .set_entry(AGENT)
}
