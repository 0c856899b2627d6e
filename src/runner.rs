//! Resumable batch query runner.
//!
//! Drives one model over a question set, timing each backend call and
//! appending one row per question to the answer sink as soon as it is
//! produced. A killed run therefore leaves a valid prefix of results, and a
//! later run with `--range` and append mode picks up where it stopped.

use crate::backend::Generator;
use crate::dataset::{QuestionRecord, RowRange, select};
use crate::error::{EvalError, Result};
use crate::interrupt::Interrupt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How the prompt template reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptMode {
    /// Template and question are joined into a single prompt, template first.
    #[default]
    Inline,
    /// Template is sent as the system prompt, the question as the prompt.
    System,
}

impl PromptMode {
    /// Returns `(prompt, system_prompt)` for one question.
    pub fn build<'a>(&self, template: &'a str, question: &str) -> (String, Option<&'a str>) {
        match self {
            PromptMode::Inline if template.is_empty() => (question.to_string(), None),
            PromptMode::Inline => (format!("{}\n\n{}", template, question), None),
            PromptMode::System => (question.to_string(), Some(template)),
        }
    }
}

/// Outcome of one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The backend returned text (possibly empty).
    Completed(String),
    /// The backend call failed; the reason is kept for the output file.
    Failed(String),
}

impl Response {
    pub fn is_failure(&self) -> bool {
        matches!(self, Response::Failed(_))
    }

    /// Text written to the `response` column.
    pub fn to_field(&self) -> String {
        match self {
            Response::Completed(text) => text.clone(),
            Response::Failed(reason) => format!("Error: {}", reason),
        }
    }
}

/// One (question, model) result.
#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub question_id: String,
    pub question_text: String,
    pub model_id: String,
    pub response: Response,
    elapsed: Duration,
}

impl AnswerRow {
    pub fn completed(question: &QuestionRecord, model: &str, text: String, elapsed: Duration) -> Self {
        Self {
            question_id: question.id.clone(),
            question_text: question.prompt_text.clone(),
            model_id: model.to_string(),
            response: Response::Completed(text),
            elapsed,
        }
    }

    /// A failed call. Its latency is recorded as zero.
    pub fn failed(question: &QuestionRecord, model: &str, reason: String) -> Self {
        Self {
            question_id: question.id.clone(),
            question_text: question.prompt_text.clone(),
            model_id: model.to_string(),
            response: Response::Failed(reason),
            elapsed: Duration::ZERO,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Truncate-and-rewrite or extend an existing output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Reset,
    Append,
}

impl WriteMode {
    pub fn from_reset_flag(reset: bool) -> Self {
        if reset { WriteMode::Reset } else { WriteMode::Append }
    }
}

/// Column layout of an answer file. Datasets differ in what they call the
/// identifier and whether they repeat the question text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkLayout {
    pub id_column: String,
    pub include_question: bool,
}

impl Default for SinkLayout {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            include_question: false,
        }
    }
}

impl SinkLayout {
    pub fn header(&self) -> Vec<&str> {
        let mut header = vec![self.id_column.as_str()];
        if self.include_question {
            header.push("question");
        }
        header.extend(["response", "model", "time_taken_seconds"]);
        header
    }

    fn record(&self, row: &AnswerRow) -> Vec<String> {
        let mut record = vec![row.question_id.clone()];
        if self.include_question {
            record.push(row.question_text.clone());
        }
        record.push(row.response.to_field());
        record.push(row.model_id.clone());
        record.push(format!("{:.1}", row.elapsed_seconds()));
        record
    }
}

/// Destination for answer rows.
pub trait AnswerWriter {
    fn write_row(&mut self, row: &AnswerRow) -> Result<()>;
}

impl AnswerWriter for Vec<AnswerRow> {
    fn write_row(&mut self, row: &AnswerRow) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

/// CSV answer file, flushed after every row.
pub struct AnswerSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    layout: SinkLayout,
}

impl AnswerSink {
    /// Open `path` for writing.
    ///
    /// [`WriteMode::Reset`] truncates the file and writes a header.
    /// [`WriteMode::Append`] writes a header only if the file is absent or
    /// empty. An existing header must match `layout`, otherwise the rows
    /// would land under the wrong columns.
    pub fn open(path: &Path, mode: WriteMode, layout: SinkLayout) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
        }

        let write_header = match mode {
            WriteMode::Reset => true,
            WriteMode::Append => std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true),
        };
        if mode == WriteMode::Append && !write_header {
            check_existing_header(path, &layout)?;
        }

        let mut options = OpenOptions::new();
        match mode {
            WriteMode::Reset => options.write(true).create(true).truncate(true),
            WriteMode::Append => options.append(true).create(true),
        };
        let file = options.open(path).map_err(|e| EvalError::io(path, e))?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
            layout,
        };

        if write_header {
            let header = sink.layout.header();
            sink.writer.write_record(&header)?;
            sink.flush()?;
        }

        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| EvalError::io(&self.path, e))
    }
}

fn check_existing_header(path: &Path, layout: &SinkLayout) -> Result<()> {
    let file = File::open(path).map_err(|e| EvalError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut existing = csv::StringRecord::new();
    reader.read_record(&mut existing)?;
    let existing: Vec<&str> = existing.iter().map(|h| h.trim_start_matches('\u{feff}')).collect();

    let expected = layout.header();
    if existing != expected {
        return Err(EvalError::Config(format!(
            "cannot append to '{}': its header is [{}] but this run writes [{}]; use --reset-output or matching column options",
            path.display(),
            existing.join(", "),
            expected.join(", ")
        )));
    }
    Ok(())
}

impl AnswerWriter for AnswerSink {
    fn write_row(&mut self, row: &AnswerRow) -> Result<()> {
        let record = self.layout.record(row);
        self.writer.write_record(&record)?;
        self.flush()
    }
}

/// Counts for one runner invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows written (successful and failed).
    pub processed: usize,
    /// Rows whose backend call failed.
    pub failed: usize,
    /// The run stopped early on a user interrupt.
    pub interrupted: bool,
}

/// Sends every question in a range to one model.
pub struct BatchRunner<G: Generator> {
    backend: G,
    prompt_mode: PromptMode,
    interrupt: Interrupt,
}

impl<G: Generator> BatchRunner<G> {
    /// Create a runner with inline prompts and no interrupt handling.
    pub fn new(backend: G) -> Self {
        Self {
            backend,
            prompt_mode: PromptMode::default(),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_prompt_mode(mut self, mode: PromptMode) -> Self {
        self.prompt_mode = mode;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Run `model` over the questions selected by `range`.
    ///
    /// Backend failures are recorded as failed rows and never stop the run.
    /// Only a sink write error aborts it.
    pub async fn run<W: AnswerWriter>(
        &self,
        model: &str,
        questions: &[QuestionRecord],
        template: &str,
        range: Option<RowRange>,
        sink: &mut W,
    ) -> Result<RunSummary> {
        let selected = select(questions, range);
        let offset = range.map(|r| r.start()).unwrap_or(0);
        let mut summary = RunSummary::default();

        if selected.is_empty() {
            warn!(total = questions.len(), "No questions selected; check --range against the question count");
            return Ok(summary);
        }

        info!(model, count = selected.len(), "Starting batch run");

        for (i, question) in selected.iter().enumerate() {
            if self.interrupt.is_triggered() {
                summary.interrupted = true;
                break;
            }

            info!(
                question_id = %question.id,
                row = offset + i,
                "Processing question ({}/{})",
                i + 1,
                selected.len()
            );

            let (prompt, system) = self.prompt_mode.build(template, &question.prompt_text);

            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => None,
                result = self.backend.generate(model, &prompt, system) => Some(result),
            };
            let elapsed = start.elapsed();

            let row = match result {
                None => {
                    summary.interrupted = true;
                    break;
                }
                Some(Ok(text)) => {
                    info!(question_id = %question.id, "Response received in {:.2} seconds", elapsed.as_secs_f64());
                    AnswerRow::completed(question, model, text, elapsed)
                }
                Some(Err(e)) => {
                    warn!(question_id = %question.id, error = %e, "Failed to get response");
                    summary.failed += 1;
                    AnswerRow::failed(question, model, e.to_string())
                }
            };

            sink.write_row(&row)?;
            summary.processed += 1;
        }

        if summary.interrupted {
            warn!(processed = summary.processed, "Run interrupted; rows written so far are kept");
        }

        Ok(summary)
    }
}
