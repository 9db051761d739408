/// Answer synthesis over retrieved chunks.
///
/// Chunks are packed greedily into prompts no larger than the context
/// window. `tree_summarize` answers each pack and then summarizes the
/// partial answers until one remains; `compact` answers the first pack and
/// refines that answer with each following pack.
use crate::config::ResponseMode;
use crate::llm::{CompletionRequest, LanguageModel, LlmError};

/// Answer returned when retrieval produced nothing.
pub const EMPTY_RESPONSE: &str = "Empty Response";

const PACK_SEPARATOR: &str = "\n\n";

fn qa_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {query}\n\
         Answer: "
    )
}

fn summary_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information from multiple sources is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the information from multiple sources and not prior knowledge, answer the query.\n\
         Query: {query}\n\
         Answer: "
    )
}

fn refine_prompt(query: &str, existing_answer: &str, context: &str) -> String {
    format!(
        "The original query is as follows: {query}\n\
         We have provided an existing answer: {existing_answer}\n\
         We have the opportunity to refine the existing answer (only if needed) with some more context below.\n\
         ------------\n\
         {context}\n\
         ------------\n\
         Given the new context, refine the original answer to better answer the query. \
         If the context isn't useful, return the original answer.\n\
         Refined Answer: "
    )
}

/// Greedily join `texts` into packs of at most `budget` characters.
///
/// A single text longer than `budget` becomes its own pack.
pub fn pack_texts(texts: &[String], budget: usize) -> Vec<String> {
    let mut packs = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for text in texts {
        let len = text.chars().count();
        let joined = if current.is_empty() {
            len
        } else {
            current_len + PACK_SEPARATOR.len() + len
        };

        if !current.is_empty() && joined > budget {
            packs.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str(PACK_SEPARATOR);
            current_len += PACK_SEPARATOR.len();
        }
        current.push_str(text);
        current_len += len;
    }
    if !current.is_empty() {
        packs.push(current);
    }
    packs
}

async fn ask(llm: &dyn LanguageModel, prompt: String) -> Result<String, LlmError> {
    llm.complete(CompletionRequest::prompt(prompt)).await
}

/// Produce one answer for `query` from `texts`.
///
/// No texts means no LLM call and [`EMPTY_RESPONSE`].
pub async fn synthesize(
    llm: &dyn LanguageModel,
    mode: ResponseMode,
    query: &str,
    texts: &[String],
    budget: usize,
) -> Result<String, LlmError> {
    if texts.iter().all(|t| t.trim().is_empty()) {
        return Ok(EMPTY_RESPONSE.to_string());
    }
    match mode {
        ResponseMode::TreeSummarize => tree_summarize(llm, query, texts, budget).await,
        ResponseMode::Compact => compact_and_refine(llm, query, texts, budget).await,
    }
}

async fn tree_summarize(
    llm: &dyn LanguageModel,
    query: &str,
    texts: &[String],
    budget: usize,
) -> Result<String, LlmError> {
    let mut level: Vec<String> = texts.to_vec();
    let mut first_level = true;
    loop {
        let mut packs = pack_texts(&level, budget);
        if packs.len() == 1 {
            return ask(llm, summary_prompt(&packs[0], query)).await;
        }
        // Oversized answers would never merge; pair them up so each level shrinks
        if !first_level && packs.len() >= level.len() {
            packs = level.chunks(2).map(|pair| pair.join(PACK_SEPARATOR)).collect();
        }

        let mut answers = Vec::with_capacity(packs.len());
        for pack in &packs {
            answers.push(ask(llm, qa_prompt(pack, query)).await?);
        }
        level = answers;
        first_level = false;
    }
}

async fn compact_and_refine(
    llm: &dyn LanguageModel,
    query: &str,
    texts: &[String],
    budget: usize,
) -> Result<String, LlmError> {
    let packs = pack_texts(texts, budget);
    let Some((first, rest)) = packs.split_first() else {
        return Ok(EMPTY_RESPONSE.to_string());
    };

    let mut answer = ask(llm, qa_prompt(first, query)).await?;
    for pack in rest {
        answer = ask(llm, refine_prompt(query, &answer, pack)).await?;
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pack_texts_respects_budget() {
        let packs = pack_texts(&texts(&["aaaa", "bbbb", "cccc"]), 10);
        assert_eq!(packs, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);

        let single = pack_texts(&texts(&["aaaa", "bbbb"]), 100);
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_pack_texts_oversized_item_stands_alone() {
        let packs = pack_texts(&texts(&["a", &"x".repeat(50), "b"]), 10);
        assert_eq!(packs.len(), 3);
        assert_eq!(packs[1].len(), 50);
    }

    #[tokio::test]
    async fn test_empty_context_skips_llm() {
        let llm = ScriptedLlm::always("never");
        for mode in [ResponseMode::TreeSummarize, ResponseMode::Compact] {
            let answer = synthesize(&llm, mode, "q", &[], 100).await.unwrap();
            assert_eq!(answer, EMPTY_RESPONSE);
        }
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tree_summarize_single_pack() {
        let llm = ScriptedLlm::always("final");
        let answer = synthesize(
            &llm,
            ResponseMode::TreeSummarize,
            "what?",
            &texts(&["one", "two"]),
            100,
        )
        .await
        .unwrap();
        assert_eq!(answer, "final");
        assert_eq!(llm.call_count(), 1);
        let prompt = &llm.calls()[0].messages[0].content;
        assert!(prompt.contains("one\n\ntwo"));
        assert!(prompt.contains("multiple sources"));
    }

    #[tokio::test]
    async fn test_tree_summarize_recurses_over_partial_answers() {
        let llm = ScriptedLlm::sequence(vec![
            Ok("p1".into()),
            Ok("p2".into()),
            Ok("combined".into()),
        ]);
        let chunk = "x".repeat(80);
        let answer = synthesize(
            &llm,
            ResponseMode::TreeSummarize,
            "q",
            &[chunk.clone(), chunk],
            100,
        )
        .await
        .unwrap();

        assert_eq!(answer, "combined");
        assert_eq!(llm.call_count(), 3);
        assert!(llm.calls()[2].messages[0].content.contains("p1\n\np2"));
    }

    #[tokio::test]
    async fn test_tree_summarize_terminates_on_oversized_answers() {
        let long = "y".repeat(60);
        let llm = ScriptedLlm::always(long.clone());
        let answer = synthesize(
            &llm,
            ResponseMode::TreeSummarize,
            "q",
            &[long.clone(), long.clone(), long.clone(), long],
            50,
        )
        .await
        .unwrap();
        assert_eq!(answer.len(), 60);
        // 4 chunk answers, then 2 and 1 paired answers, then the final summary
        assert_eq!(llm.call_count(), 8);
    }

    #[tokio::test]
    async fn test_compact_refines_across_packs() {
        let llm = ScriptedLlm::sequence(vec![Ok("draft".into()), Ok("refined".into())]);
        let chunk = "z".repeat(80);
        let answer = synthesize(&llm, ResponseMode::Compact, "q", &[chunk.clone(), chunk], 100)
            .await
            .unwrap();

        assert_eq!(answer, "refined");
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].messages[0].content.contains("existing answer: draft"));
    }

    #[tokio::test]
    async fn test_compact_propagates_llm_error() {
        let llm = ScriptedLlm::sequence(vec![Err("down".into())]);
        let err = synthesize(&llm, ResponseMode::Compact, "q", &texts(&["ctx"]), 100)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("down"));
    }
}
