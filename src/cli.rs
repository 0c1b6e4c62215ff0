use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docqa::{
    config::{
        DEFAULT_BIND,
        DEFAULT_CHUNK_SIZE,
        DEFAULT_CONTEXT_TURNS,
        DEFAULT_EMBED_BATCH_SIZE,
        DEFAULT_EMBED_TIMEOUT,
        DEFAULT_HISTORY_TURNS,
        DEFAULT_QA_TIMEOUT,
        DEFAULT_TOP_K,
        RagConfig,
    },
    ocr::{DEFAULT_DPI, DEFAULT_OCR_LANG},
};

#[derive(Debug, Parser)]
#[command(
    name = "docqa",
    version,
    about = "Question answering over a single scanned document"
)]
pub struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the question-answering HTTP API
    Serve(ServeArgs),
    /// Answer a single question and exit
    Ask(AskArgs),
    /// Show the chunks retrieved for a query
    Search(SearchArgs),
    /// Show how the corpus splits into chunks
    Chunks(ChunksArgs),
    /// OCR a scanned PDF into a text file
    Extract(ExtractArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Shared arguments --

#[derive(Debug, Args)]
pub struct CorpusArgs {
    /// Cleaned document text to answer from
    #[arg(long, env = "DOCQA_CORPUS", default_value = "cleaned_text.txt")]
    pub corpus: PathBuf,

    /// Non-empty lines per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Embedding model ID (HuggingFace) or local model directory
    #[arg(long, env = "DOCQA_MODEL")]
    pub model: Option<String>,

    /// Chunks embedded per model call while indexing
    #[arg(long, default_value_t = DEFAULT_EMBED_BATCH_SIZE)]
    pub embed_batch_size: usize,
}

impl CorpusArgs {
    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            chunk_size: self.chunk_size,
            embed_batch_size: self.embed_batch_size,
            ..RagConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct QaArgs {
    /// Chunks retrieved per question
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Past exchanges added to the QA context
    #[arg(long, default_value_t = DEFAULT_CONTEXT_TURNS)]
    pub context_turns: usize,

    /// Past exchanges returned as chat history
    #[arg(long, default_value_t = DEFAULT_HISTORY_TURNS)]
    pub history_turns: usize,

    /// Seconds to wait for a query embedding
    #[arg(long, default_value_t = DEFAULT_EMBED_TIMEOUT.as_secs())]
    pub embed_timeout: u64,

    /// Seconds to wait for the QA model
    #[arg(long, default_value_t = DEFAULT_QA_TIMEOUT.as_secs())]
    pub qa_timeout: u64,

    /// QA model ID (HuggingFace) or local model directory
    #[arg(long, env = "DOCQA_QA_MODEL")]
    pub qa_model: Option<String>,

    /// URL of a question-answering inference endpoint to call instead of
    /// running the QA model locally
    #[arg(long, env = "DOCQA_QA_ENDPOINT")]
    pub qa_endpoint: Option<String>,

    /// Call the hosted inference API for --qa-model
    #[arg(long, conflicts_with = "qa_endpoint")]
    pub remote_qa: bool,

    /// Bearer token for the QA endpoint
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,
}

impl QaArgs {
    /// Overlay the answering settings on a corpus configuration.
    pub fn apply(&self, config: RagConfig) -> RagConfig {
        RagConfig {
            top_k: self.top_k,
            context_turns: self.context_turns,
            history_turns: self.history_turns,
            embed_timeout: Duration::from_secs(self.embed_timeout),
            qa_timeout: Duration::from_secs(self.qa_timeout),
            ..config
        }
    }
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "DOCQA_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub qa: QaArgs,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Output the answer as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the retrieved chunks
    #[arg(long)]
    pub show_chunks: bool,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub qa: QaArgs,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of chunks to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_K)]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub corpus: CorpusArgs,
}

// -- Chunks --

#[derive(Debug, Parser)]
pub struct ChunksArgs {
    /// Cleaned document text to chunk
    #[arg(long, env = "DOCQA_CORPUS", default_value = "cleaned_text.txt")]
    pub corpus: PathBuf,

    /// Non-empty lines per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Output chunks as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Extract --

#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Scanned PDF to recognize
    pub pdf: PathBuf,

    /// Where to write the raw OCR text
    #[arg(short, long, default_value = "text.txt")]
    pub output: PathBuf,

    /// Also write a cleaned copy ready for indexing
    #[arg(long)]
    pub cleaned_output: Option<PathBuf>,

    /// Tesseract language
    #[arg(long, default_value = DEFAULT_OCR_LANG)]
    pub lang: String,

    /// Rasterization resolution
    #[arg(long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docqa",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::parse_from(["docqa", "serve", "--corpus", "doc.txt"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(args.corpus.corpus, PathBuf::from("doc.txt"));

        let config = args.qa.apply(args.corpus.rag_config());
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.top_k, 6);
        assert_eq!(config.context_turns, 3);
        assert_eq!(config.history_turns, 5);
        assert_eq!(config.qa_timeout, Duration::from_secs(60));
    }

    #[test]
    fn parse_ask_overrides() {
        let cli = Cli::parse_from([
            "docqa",
            "ask",
            "কে?",
            "--corpus",
            "doc.txt",
            "-k",
            "3",
            "--chunk-size",
            "5",
            "--qa-timeout",
            "5",
            "--json",
        ]);
        let Command::Ask(args) = cli.command else {
            panic!("expected ask command");
        };
        assert_eq!(args.question, "কে?");
        assert!(args.json);

        let config = args.qa.apply(args.corpus.rag_config());
        assert_eq!(config.top_k, 3);
        assert_eq!(config.chunk_size, 5);
        assert_eq!(config.qa_timeout, Duration::from_secs(5));
    }

    #[test]
    fn parse_extract_defaults() {
        let cli = Cli::parse_from(["docqa", "extract", "scan.pdf"]);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract command");
        };
        assert_eq!(args.output, PathBuf::from("text.txt"));
        assert_eq!(args.lang, "ben");
        assert_eq!(args.dpi, 300);
        assert!(args.cleaned_output.is_none());
    }

    #[test]
    fn remote_qa_conflicts_with_endpoint() {
        let result = Cli::try_parse_from([
            "docqa",
            "ask",
            "q",
            "--remote-qa",
            "--qa-endpoint",
            "http://localhost:8080",
        ]);
        assert!(result.is_err());
    }
}
