/// Evaluation harness: query a running service for every dataset record,
/// score the answers, write per-record results, and print a summary.
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{info, warn};

use super::dataset::{Dataset, EvalRecord, KEYWORDS_COLUMN};
use super::scoring::{CORRECTNESS_THRESHOLD, check_retrieval_hit, is_correct, keyword_match_score};
use crate::config::EvalConfig;
use crate::engine::response::{Source, truncate_chars};

const ANSWER_PREVIEW_CHARS: usize = 500;
const INCORRECT_SAMPLES: usize = 5;

/// How a record's query went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Well-formed response.
    Success,
    /// HTTP 200 but `answer` or `sources` missing; defaults were used.
    Degraded,
    /// Unreachable, error status, or undecodable body.
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Success => "success",
            RecordStatus::Degraded => "degraded",
            RecordStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Answer and sources as seen by the harness, defaults filled in.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<Source>,
    pub status: RecordStatus,
}

impl QueryOutcome {
    fn failed() -> Self {
        Self {
            answer: String::new(),
            sources: Vec::new(),
            status: RecordStatus::Failed,
        }
    }

    /// Interpret a 200 response body.
    pub fn from_body(body: &str) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
            return Self::failed();
        };

        let answer = map.get("answer").and_then(Value::as_str).map(str::to_string);
        let sources = match map.get("sources") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<Vec<Source>>(raw.clone()) {
                Ok(sources) => Some(sources),
                Err(_) => return Self::failed(),
            },
        };

        let status = if answer.is_some() && sources.is_some() {
            RecordStatus::Success
        } else {
            RecordStatus::Degraded
        };
        Self {
            answer: answer.unwrap_or_default(),
            sources: sources.unwrap_or_default(),
            status,
        }
    }
}

/// Client for the service's `query_with_context` endpoint.
pub struct RagClient {
    client: reqwest::Client,
    api_url: String,
}

impl RagClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
        })
    }

    /// Query the service. Failures are logged and reported as a
    /// [`RecordStatus::Failed`] outcome rather than an error.
    pub async fn query(&self, query: &str) -> QueryOutcome {
        let res = match self
            .client
            .get(&self.api_url)
            .query(&[("query", query)])
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                warn!("Error querying RAG service: {e}");
                return QueryOutcome::failed();
            }
        };

        let status = res.status();
        if !status.is_success() {
            warn!("RAG service returned {status} for query {query:?}");
            return QueryOutcome::failed();
        }

        match res.text().await {
            Ok(body) => {
                let outcome = QueryOutcome::from_body(&body);
                if outcome.status == RecordStatus::Failed {
                    warn!("Undecodable response body for query {query:?}");
                }
                outcome
            }
            Err(e) => {
                warn!("Error reading RAG response: {e}");
                QueryOutcome::failed()
            }
        }
    }
}

fn round3<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((value * 1000.0).round() / 1000.0)
}

/// One row of the results CSV.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub query_id: String,
    pub query: String,
    pub expected_pdf: String,
    pub keywords: String,
    pub generated_answer: String,
    pub retrieved_sources: String,
    pub retrieval_hit: bool,
    #[serde(serialize_with = "round3")]
    pub keyword_score: f64,
    pub is_correct: bool,
    pub status: RecordStatus,
}

/// Score one record against the service's response.
pub fn score_record(record: &EvalRecord, outcome: &QueryOutcome) -> ResultRecord {
    let retrieval_hit = check_retrieval_hit(&outcome.sources, &record.pdf_filename);
    let keyword_score = keyword_match_score(&outcome.answer, &record.keywords);
    let retrieved_sources = outcome
        .sources
        .iter()
        .map(|s| s.filename.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    ResultRecord {
        query_id: record.query_id.clone(),
        query: record.query.clone(),
        expected_pdf: record.pdf_filename.clone(),
        keywords: record.keywords.clone(),
        generated_answer: truncate_chars(&outcome.answer, ANSWER_PREVIEW_CHARS),
        retrieved_sources,
        retrieval_hit,
        keyword_score,
        is_correct: is_correct(keyword_score),
        status: outcome.status,
    }
}

/// Percentages over all records and over reachable (non-failed) ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalSummary {
    pub total: usize,
    pub success: usize,
    pub degraded: usize,
    pub failed: usize,
    pub hit_rate: f64,
    pub avg_keyword_score: f64,
    pub correctness_rate: f64,
    pub reachable_hit_rate: f64,
    pub reachable_keyword_score: f64,
    pub reachable_correctness_rate: f64,
}

fn rates<'a>(results: impl Iterator<Item = &'a ResultRecord>) -> (f64, f64, f64) {
    let (mut n, mut hits, mut score, mut correct) = (0usize, 0usize, 0.0f64, 0usize);
    for r in results {
        n += 1;
        hits += usize::from(r.retrieval_hit);
        score += r.keyword_score;
        correct += usize::from(r.is_correct);
    }
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }
    let pct = |v: f64| v / n as f64 * 100.0;
    (pct(hits as f64), pct(score), pct(correct as f64))
}

pub fn summarize(results: &[ResultRecord]) -> EvalSummary {
    let count = |status: RecordStatus| results.iter().filter(|r| r.status == status).count();
    let (hit_rate, avg_keyword_score, correctness_rate) = rates(results.iter());
    let (reachable_hit_rate, reachable_keyword_score, reachable_correctness_rate) =
        rates(results.iter().filter(|r| r.status != RecordStatus::Failed));

    EvalSummary {
        total: results.len(),
        success: count(RecordStatus::Success),
        degraded: count(RecordStatus::Degraded),
        failed: count(RecordStatus::Failed),
        hit_rate,
        avg_keyword_score,
        correctness_rate,
        reachable_hit_rate,
        reachable_keyword_score,
        reachable_correctness_rate,
    }
}

pub fn write_results(path: &Path, results: &[ResultRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for r in results {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(summary: &EvalSummary) {
    let rule = "=".repeat(50);
    println!("\n{rule}");
    println!("=== RAG Evaluation Results ===");
    println!("{rule}");
    println!("Questions Evaluated:    {}", summary.total);
    println!(
        "  success / degraded / failed: {} / {} / {}",
        summary.success, summary.degraded, summary.failed
    );
    println!("Retrieval Hit Rate:     {:.1}%", summary.hit_rate);
    println!("Avg Keyword Match:      {:.1}%", summary.avg_keyword_score);
    println!(
        "Answer Correctness:     {:.1}% (>={:.0}% keyword match)",
        summary.correctness_rate,
        CORRECTNESS_THRESHOLD * 100.0
    );
    if summary.failed > 0 && summary.failed < summary.total {
        println!(
            "Reachable only:         hit {:.1}% | keywords {:.1}% | correct {:.1}%",
            summary.reachable_hit_rate,
            summary.reachable_keyword_score,
            summary.reachable_correctness_rate
        );
    }
    println!("{rule}");
}

fn print_incorrect_samples(results: &[ResultRecord]) {
    println!("\n--- Sample Results (first {INCORRECT_SAMPLES} incorrect answers) ---");
    for r in results.iter().filter(|r| !r.is_correct).take(INCORRECT_SAMPLES) {
        println!("\nQuery: {}...", truncate_chars(&r.query, 80));
        println!("Expected keywords: {}", r.keywords);
        println!("Keyword score: {:.3}", r.keyword_score);
        println!("Retrieval hit: {}", r.retrieval_hit);
        println!("Status: {}", r.status);
    }
}

/// Run the whole evaluation described by `cfg`.
pub async fn run(cfg: &EvalConfig) -> Result<EvalSummary> {
    let dataset_path = Path::new(&cfg.dataset_path);
    let dataset = Dataset::read(dataset_path)?;
    println!("Loaded {} evaluation questions", dataset.len());

    if dataset.column(KEYWORDS_COLUMN).is_none() {
        bail!(
            "'{KEYWORDS_COLUMN}' column not found in {}. Run `docrag extract-keywords` first.",
            dataset_path.display()
        );
    }
    if dataset.is_empty() {
        warn!("{} has no evaluation rows", dataset_path.display());
    }
    let records = dataset.records()?;

    let client = RagClient::new(&cfg.api_url, Duration::from_secs(cfg.timeout_secs))?;
    info!(api_url = %cfg.api_url, records = records.len(), "Starting RAG evaluation");

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Evaluating {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .context("Invalid progress template")?,
    );

    let mut results = Vec::with_capacity(records.len());
    for record in &records {
        let outcome = client.query(&record.query).await;
        results.push(score_record(record, &outcome));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let summary = summarize(&results);
    print_summary(&summary);

    let results_path = Path::new(&cfg.results_path);
    write_results(results_path, &results)?;
    println!("\nDetailed results saved to: {}", results_path.display());

    print_incorrect_samples(&results);

    if summary.total > 0 && summary.failed == summary.total {
        bail!(
            "All {} queries failed; is the service running at {}?",
            summary.total,
            cfg.api_url
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keywords: &str, pdf: &str) -> EvalRecord {
        EvalRecord {
            query_id: "7".into(),
            query: "What grew?".into(),
            pdf_filename: pdf.into(),
            answer: "Revenue grew".into(),
            keywords: keywords.into(),
        }
    }

    #[test]
    fn test_from_body_statuses() {
        let ok = QueryOutcome::from_body(
            r#"{"query":"q","answer":"yes","sources":[{"text":"t","score":0.9,"filename":"a.pdf","metadata":{}}]}"#,
        );
        assert_eq!(ok.status, RecordStatus::Success);
        assert_eq!(ok.sources[0].filename, "a.pdf");

        let no_sources = QueryOutcome::from_body(r#"{"answer":"yes"}"#);
        assert_eq!(no_sources.status, RecordStatus::Degraded);
        assert!(no_sources.sources.is_empty());

        let no_answer = QueryOutcome::from_body(r#"{"sources":[]}"#);
        assert_eq!(no_answer.status, RecordStatus::Degraded);
        assert_eq!(no_answer.answer, "");

        assert_eq!(QueryOutcome::from_body("<html>").status, RecordStatus::Failed);
        assert_eq!(QueryOutcome::from_body("[1,2]").status, RecordStatus::Failed);
        assert_eq!(
            QueryOutcome::from_body(r#"{"answer":"a","sources":"oops"}"#).status,
            RecordStatus::Failed
        );
    }

    #[test]
    fn test_score_record() {
        let outcome = QueryOutcome {
            answer: "This mentions Alpha and Gamma only.".into(),
            sources: vec![
                Source {
                    filename: "data/Report_2023.pdf".into(),
                    ..Source::default()
                },
                Source::default(),
            ],
            status: RecordStatus::Success,
        };
        let result = score_record(&record("alpha, beta, gamma", "report_2023.PDF"), &outcome);

        assert!(result.retrieval_hit);
        assert!(result.is_correct);
        assert!((result.keyword_score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.retrieved_sources, "data/Report_2023.pdf, ");
    }

    #[test]
    fn test_summarize_separates_reachable() {
        let hit = QueryOutcome {
            answer: "alpha".into(),
            sources: vec![Source {
                filename: "a.pdf".into(),
                ..Source::default()
            }],
            status: RecordStatus::Success,
        };
        let results = vec![
            score_record(&record("alpha", "a.pdf"), &hit),
            score_record(&record("alpha", "a.pdf"), &QueryOutcome::failed()),
        ];

        let summary = summarize(&results);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.hit_rate, 50.0);
        assert_eq!(summary.correctness_rate, 50.0);
        assert_eq!(summary.reachable_hit_rate, 100.0);
        assert_eq!(summary.reachable_keyword_score, 100.0);
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), EvalSummary::default());
    }

    #[test]
    fn test_write_results_rounds_score() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("results.csv");
        let outcome = QueryOutcome {
            answer: "alpha".into(),
            sources: vec![],
            status: RecordStatus::Degraded,
        };
        write_results(&path, &[score_record(&record("alpha, beta, gamma", "a.pdf"), &outcome)])
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "query_id,query,expected_pdf,keywords,generated_answer,retrieved_sources,retrieval_hit,keyword_score,is_correct,status"
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",0.333,false,degraded"));
    }
}
