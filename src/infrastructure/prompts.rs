//! Prompt templates
//!
//! Templates use `${name}` placeholders filled by [`render`].

pub const DEFAULT_ANSWER: &str = "Context: ${context}\n\nQuestion: ${query}\n\nAnswer:";

pub const RELEVANCE_JUDGMENT: &str = "Determine whether the context below contains enough \
information to answer the question.

Question: ${query}

Context:
${context}

Reply with a single word: yes or no.";

pub const GENERAL_KNOWLEDGE: &str = "The document search found nothing useful for this \
question. Answer it from your general knowledge and say so if you are unsure.

Question: ${query}

Answer:";

/// Prepended to answers produced without documents
pub const GENERAL_KNOWLEDGE_PREFIX: &str = "Based on general knowledge: ";

pub const SEARCH_MODE: &str = "Choose the best search mode for the question below.
- semantic: conceptual or descriptive questions
- keyword: exact names, codes or rare terms
- hybrid: a mix of both

Question: ${query}

Reply with one word: semantic, keyword or hybrid.";

pub const ADAPTIVE_ANSWER: &str = "Answer the question using the context. End the answer \
with a confidence marker of the form [Confidence: X.X] between 0.0 and 1.0.

Context:
${context}

Question: ${query}

Answer:";

pub const FOLLOW_UP: &str = "Question: ${query}

Current answer:
${answer}

Context so far:
${context}

If the answer fully addresses the question, reply with COMPLETE. Otherwise reply with one \
search query that would find the missing information.";

pub const REFORMULATE: &str = "The search for the question below did not return relevant \
passages.

Original question: ${original}
Last search query: ${current}

Passages found:
${context}

Write one improved search query that is more likely to find relevant passages. If the \
answer is clearly not in this document collection, reply with NO_REWRITE.";

pub const REFEED_REFORMULATE: &str = "Write a more specific search query that would surface \
information the passages below do not cover yet.

Question: ${original}

Passages:
${context}

Reply with the query only, or NO_REWRITE if nothing more is needed.";

pub const GRADED_ANSWER: &str = "Answer the question using the passages below. Each passage \
carries a relevance grade; rely on the highest graded ones.

${context}

Question: ${query}

Answer:";

pub const CORRECTION: &str = "The previous answer to this question may be inaccurate or \
unsupported by the sources.

Question: ${query}

Previous answer:
${answer}

Sources:
${context}

Write a corrected answer that is fully supported by the sources.

Corrected answer:";

pub const VERIFY_FACTS: &str = "Rate how well the answer is supported by the sources, from \
0.0 (unsupported) to 1.0 (fully supported).

Question: ${query}

Answer: ${answer}

Sources:
${context}

Reply with the number only.";

pub const QUERY_VARIANTS: &str = "Write ${count} alternative phrasings of the search query \
below, one per line, without numbering or commentary.

Query: ${query}";

pub const RANKED_ANSWER: &str = "Use the ranked passages below, most relevant first, to \
answer the question thoroughly.

${context}

Question: ${query}

Answer:";

pub const RERANK_SCORE: &str = "Rate how relevant the passage is to the query on a scale \
from 0.0 to 1.0.

Query: ${query}

Passage: ${passage}

Reply with the number only.";

pub const REALM_ANSWER: &str = "Question: ${question}

Context information:
${context}

Based only on the provided context, answer the question directly and thoroughly.";

pub const REALM_REFINE: &str = "Question: ${query}

Current answer:
${answer}

Is the answer complete? Reply COMPLETE if it is. Otherwise reply with what we should look \
for, as a short search query.";

pub const AGENT_INSTRUCTION: &str = "Answer the question. Use the ${tool} tool to search the \
documents whenever you need facts and base the answer on what you find.

Question: ${query}";

pub const SPECULATIVE_INSTRUCTION: &str = "Draft a short answer to the question, then use \
the ${tool} tool to check the draft against the documents and correct it. Return only the \
final answer.

Question: ${query}";

/// Fill `${name}` placeholders
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("${{{}}}", name), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_answer() {
        let prompt = render(
            DEFAULT_ANSWER,
            &[("context", "a\nb"), ("query", "what?")],
        );
        assert_eq!(prompt, "Context: a\nb\n\nQuestion: what?\n\nAnswer:");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        assert_eq!(render("${x} ${y}", &[("x", "1")]), "1 ${y}");
    }
}
