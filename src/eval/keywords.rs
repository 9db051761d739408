/// Keyword extraction: ask an LLM for the key terms of every expected
/// answer and store them in the dataset's `keywords` column.
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::dataset::{ANSWER_COLUMN, Dataset, KEYWORDS_COLUMN};
use crate::engine::response::truncate_chars;
use crate::llm::{CompletionRequest, LanguageModel, LlmError};

const EXTRACTION_MAX_TOKENS: u32 = 100;
const SAMPLE_COUNT: usize = 5;

fn extraction_prompt(answer: &str) -> String {
    format!(
        "Extract the 2-5 most important keywords or key phrases from this answer.\n\
         These should be the core concepts that any correct answer must mention.\n\
         Return as comma-separated values, lowercase only.\n\
         \n\
         Answer: {answer}\n\
         \n\
         Keywords:"
    )
}

/// Keywords for one answer, as returned by the model (trimmed).
pub async fn extract_keywords(llm: &dyn LanguageModel, answer: &str) -> Result<String, LlmError> {
    let request = CompletionRequest::prompt(extraction_prompt(answer))
        .with_temperature(0.0)
        .with_max_tokens(EXTRACTION_MAX_TOKENS);
    let reply = llm.complete(request).await?;
    Ok(reply.trim().to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub records: usize,
    pub extracted: usize,
    pub failed: usize,
}

/// Fill the `keywords` column of the CSV at `path` in place.
///
/// A failed extraction is logged and stored as an empty string; the batch
/// always runs to the end.
pub async fn run(llm: &dyn LanguageModel, path: &Path) -> Result<ExtractionReport> {
    let mut dataset = Dataset::read(path)?;
    println!("Loaded {} evaluation questions", dataset.len());
    info!(model = llm.model_name(), "Extracting keywords");

    let answers = dataset
        .column_values(ANSWER_COLUMN)
        .with_context(|| format!("{} has no answers to extract from", path.display()))?;

    let pb = ProgressBar::new(answers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Extracting keywords {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("Invalid progress template")?,
    );

    let mut report = ExtractionReport {
        records: answers.len(),
        ..ExtractionReport::default()
    };
    let mut keywords = Vec::with_capacity(answers.len());
    for (i, answer) in answers.iter().enumerate() {
        match extract_keywords(llm, answer).await {
            Ok(k) => {
                report.extracted += 1;
                keywords.push(k);
            }
            Err(e) => {
                warn!("Error extracting keywords for row {}: {e}", i + 1);
                report.failed += 1;
                keywords.push(String::new());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    dataset.set_column(KEYWORDS_COLUMN, &keywords);
    dataset.write(path)?;
    println!(
        "Updated {} with {KEYWORDS_COLUMN} column ({} extracted, {} failed)",
        path.display(),
        report.extracted,
        report.failed
    );

    println!("\nSample keyword extractions:");
    for (answer, k) in answers.iter().zip(&keywords).take(SAMPLE_COUNT) {
        println!("\nAnswer: {}...", truncate_chars(answer, 100));
        println!("Keywords: {k}");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedLlm;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_keywords_request_shape() {
        let llm = ScriptedLlm::always("  revenue, growth \n");
        let k = extract_keywords(&llm, "Revenue grew 12%.").await.unwrap();
        assert_eq!(k, "revenue, growth");

        let call = &llm.calls()[0];
        assert_eq!(call.temperature, Some(0.0));
        assert_eq!(call.max_tokens, Some(100));
        assert!(call.messages[0].content.contains("Answer: Revenue grew 12%."));
    }

    #[tokio::test]
    async fn test_run_continues_past_failures_and_preserves_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("eval.csv");
        std::fs::write(
            &path,
            "query_id,query,pdf_filename,answer,keywords,notes\n\
             1,q1,a.pdf,Alpha answer,old,n1\n\
             2,q2,b.pdf,Beta answer,old,n2\n\
             3,q3,c.pdf,Gamma answer,old,n3\n",
        )
        .unwrap();

        let llm = ScriptedLlm::sequence(vec![
            Ok("alpha".into()),
            Err("rate limited".into()),
            Ok("gamma".into()),
        ]);
        let report = run(&llm, &path).await.unwrap();
        assert_eq!(
            report,
            ExtractionReport {
                records: 3,
                extracted: 2,
                failed: 1
            }
        );

        let dataset = Dataset::read(&path).unwrap();
        assert_eq!(dataset.column(KEYWORDS_COLUMN), Some(4));
        assert_eq!(
            dataset.column_values(KEYWORDS_COLUMN).unwrap(),
            vec!["alpha", "", "gamma"]
        );
        assert_eq!(dataset.column_values("notes").unwrap(), vec!["n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_run_without_answer_column_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("eval.csv");
        std::fs::write(&path, "query_id,query\n1,q\n").unwrap();

        let llm = ScriptedLlm::always("unused");
        assert!(run(&llm, &path).await.is_err());
        assert_eq!(llm.call_count(), 0);
    }
}
