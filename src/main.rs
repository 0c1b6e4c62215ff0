use std::sync::Arc;

use clap::Parser;
use docqa::{
    api::{self, AppState},
    chunking::chunk_lines,
    corpus::Corpus,
    embedding::Embedder,
    error::{self, Error},
    generator::AnswerGenerator,
    model_manager::ModelManager,
    ocr,
    qa::QaModel,
    qa_http::HttpQaModel,
    reader::{DEFAULT_QA_MODEL_ID, ExtractiveReader},
    retriever::retrieve_query,
    text_util::{DEFAULT_PREVIEW_MAX_CHARS, clean_ocr_text, preview},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{
    AskArgs,
    ChunksArgs,
    Cli,
    Command,
    CorpusArgs,
    ExtractArgs,
    QaArgs,
    SearchArgs,
    ServeArgs,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCQA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve(args) => cmd_serve(args)?,
        Command::Ask(args) => cmd_ask(&args)?,
        Command::Search(args) => cmd_search(&args)?,
        Command::Chunks(args) => cmd_chunks(&args)?,
        Command::Extract(args) => cmd_extract(&args)?,
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })
}

fn embedding_model(args: &CorpusArgs) -> ModelManager {
    match &args.model {
        Some(model) => ModelManager::with_model_id(model.clone()),
        None => ModelManager::new(),
    }
}

fn qa_model(args: &QaArgs) -> error::Result<Arc<dyn QaModel>> {
    let timeout = std::time::Duration::from_secs(args.qa_timeout);
    let model_id = args.qa_model.as_deref().unwrap_or(DEFAULT_QA_MODEL_ID);

    let endpoint = match &args.qa_endpoint {
        Some(endpoint) => Some(endpoint.clone()),
        None if args.remote_qa => Some(HttpQaModel::hosted_endpoint(model_id)),
        None => None,
    };

    if let Some(endpoint) = endpoint {
        let model = HttpQaModel::new(endpoint, args.hf_token.clone(), timeout)?;
        info!(endpoint = model.endpoint(), "using remote QA model");
        return Ok(Arc::new(model));
    }

    let reader = ExtractiveReader::with_model_id(model_id.to_string());
    reader.preload()?;
    Ok(Arc::new(reader))
}

/// Load the models and corpus shared by `serve` and `ask`.
fn build_generator(
    corpus_args: &CorpusArgs,
    qa_args: &QaArgs,
) -> error::Result<AnswerGenerator> {
    let config = qa_args.apply(corpus_args.rag_config());
    config.validate()?;

    let embedder: Arc<dyn Embedder> = Arc::new(embedding_model(corpus_args));
    let corpus = Corpus::load(&corpus_args.corpus, &config, embedder.as_ref())?;
    let qa = qa_model(qa_args)?;

    Ok(AnswerGenerator::new(Arc::new(corpus), embedder, qa, config))
}

fn cmd_serve(args: ServeArgs) -> error::Result<()> {
    let generator = build_generator(&args.corpus, &args.qa)?;
    let state = AppState::new(generator);

    runtime()?.block_on(api::serve(state, args.bind))
}

fn cmd_ask(args: &AskArgs) -> error::Result<()> {
    let generator = build_generator(&args.corpus, &args.qa)?;
    let result =
        runtime()?.block_on(generator.answer_or_fallback(&args.question));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    println!(
        "grounded: {}  relevance: {:.4}",
        result.grounded, result.relevance
    );
    if args.show_chunks {
        for (i, chunk) in result.top_chunks.iter().enumerate() {
            println!(
                "\n[{}] {}",
                i + 1,
                preview(chunk, DEFAULT_PREVIEW_MAX_CHARS)
            );
        }
    }
    Ok(())
}

fn cmd_search(args: &SearchArgs) -> error::Result<()> {
    let config = args.corpus.rag_config();
    config.validate()?;

    let embedder = embedding_model(&args.corpus);
    let corpus = Corpus::load(&args.corpus.corpus, &config, &embedder)?;
    let (_, retrieved) =
        retrieve_query(&corpus, &embedder, &args.query, args.count)?;

    if args.json {
        let items: Vec<serde_json::Value> = retrieved
            .iter()
            .map(|chunk| {
                serde_json::json!({
                    "position": chunk.position,
                    "score": chunk.score,
                    "text": chunk.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if retrieved.is_empty() {
        println!("No results.");
    }
    for chunk in &retrieved {
        println!(
            "#{:<4} {:.4}  {}",
            chunk.position,
            chunk.score,
            preview(&chunk.text, DEFAULT_PREVIEW_MAX_CHARS)
        );
    }
    Ok(())
}

fn cmd_chunks(args: &ChunksArgs) -> error::Result<()> {
    let text = std::fs::read_to_string(&args.corpus).map_err(|e| {
        Error::Config(format!(
            "cannot read corpus file {}: {e}",
            args.corpus.display()
        ))
    })?;
    let chunks = chunk_lines(&text, args.chunk_size);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!("#{i:<4} {}", preview(chunk, DEFAULT_PREVIEW_MAX_CHARS));
    }
    println!("{} chunks", chunks.len());
    Ok(())
}

fn cmd_extract(args: &ExtractArgs) -> error::Result<()> {
    let raw = ocr::extract_pdf_text(&args.pdf, &args.lang, args.dpi)?;
    std::fs::write(&args.output, &raw)?;
    info!(path = %args.output.display(), chars = raw.chars().count(), "wrote OCR text");

    if let Some(cleaned_path) = &args.cleaned_output {
        let cleaned = clean_ocr_text(&raw);
        std::fs::write(cleaned_path, &cleaned)?;
        info!(
            path = %cleaned_path.display(),
            lines = cleaned.lines().count(),
            "wrote cleaned text"
        );
    }
    Ok(())
}
