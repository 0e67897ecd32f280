//! Binary for the markdown conversion tool.
//!
//! A thin shim over the library: maps CLI flags onto `ServiceConfig` and
//! `VisionConfig`, wires the platform client and converters into a
//! `ConversionJob`, and serves it over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use markdown_conversion::converter::pdf_text::PdfTextConverter;
use markdown_conversion::platform::http::PlatformClient;
use markdown_conversion::schema::tool_description;
use markdown_conversion::server::{self, AppState};
use markdown_conversion::{ConversionJob, ConverterRegistry, ServiceConfig};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve against a platform deployment
  md-conversion-service --platform-url https://platform.example.com --auth-token "$JWT"

  # Print the tool description and exit
  md-conversion-service --print-tool-description

  # Invoke
  curl -s -X POST localhost:8090/ -H 'content-type: application/json' -H 'Timeout: 300' \
       -d '{"$schema":"urn:sd:schema.markdown-conversion.request.2","document":"urn:ivcap:artifact:..."}'

ENVIRONMENT VARIABLES:
  PLATFORM_URL            Platform API base URL
  PLATFORM_TOKEN          Bearer token for platform calls
  OPENAI_API_KEY          OpenAI API key (PDF conversion)
  ANTHROPIC_API_KEY       Anthropic API key (PDF conversion)
  GEMINI_API_KEY          Google Gemini API key (PDF conversion)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         pdfium shared library (file or directory)
  RUST_LOG                Log filter, overrides --verbose/--quiet
"#;

/// Convert stored documents to Markdown, caching results by source document.
#[derive(Parser, Debug)]
#[command(
    name = "md-conversion-service",
    version,
    about = "Convert stored documents to Markdown, caching results by source document",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8090)]
    port: u16,

    /// Platform API base URL.
    #[arg(long, env = "PLATFORM_URL", default_value = "http://localhost:8080")]
    platform_url: String,

    /// Bearer token for platform calls.
    #[arg(long, env = "PLATFORM_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Policy for created artifacts when the request names none.
    #[arg(long, env = "DEFAULT_POLICY", default_value = markdown_conversion::DEFAULT_POLICY)]
    default_policy: String,

    /// Timeout of a single platform HTTP call, in seconds.
    #[arg(long, env = "PLATFORM_TIMEOUT", default_value_t = 120)]
    platform_timeout: u64,

    /// Invocation timeout when the caller sends no Timeout header (0 = none).
    #[arg(long, env = "INVOCATION_TIMEOUT", default_value_t = 600)]
    invocation_timeout: u64,

    /// Vision model ID for PDF pages (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision model provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Concurrent page calls per PDF.
    #[arg(short, long, env = "MD_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Retries per page on model failure.
    #[arg(long, env = "MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Max model output tokens per page.
    #[arg(long, env = "MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Skip PDF pages that fail instead of failing the document.
    #[arg(long, env = "MD_ALLOW_PARTIAL")]
    allow_partial: bool,

    /// Path to a text file containing a custom page prompt.
    #[arg(long, env = "MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Extract PDF text locally instead of transcribing pages with a vision model.
    #[arg(long, env = "MD_PDF_TEXT_ONLY")]
    pdf_text_only: bool,

    /// Print the tool description as JSON and exit.
    #[arg(long)]
    print_tool_description: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD_VERBOSE")]
    verbose: bool,

    /// Log errors only.
    #[arg(short, long, env = "MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.print_tool_description {
        let desc = serde_json::to_string_pretty(&tool_description())
            .context("Failed to serialise tool description")?;
        println!("{desc}");
        return Ok(());
    }

    let config = build_config(&cli)?;
    info!("Starting with {:?}", config);

    // ── Collaborators ────────────────────────────────────────────────────
    let platform =
        Arc::new(PlatformClient::new(&config).context("Failed to create platform client")?);
    let converter = build_converters(&cli).await?;
    let job = ConversionJob::new(
        platform.clone(),
        platform,
        Arc::new(converter),
        config.default_policy.clone(),
    );

    // ── Serve ────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    server::serve(listener, AppState::new(job, config.invocation_timeout_secs))
        .await
        .context("Server error")?;
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .host(cli.host)
        .port(cli.port)
        .platform_url(cli.platform_url.clone())
        .default_policy(cli.default_policy.clone())
        .platform_timeout_secs(cli.platform_timeout)
        .invocation_timeout_secs(cli.invocation_timeout);
    if let Some(ref token) = cli.auth_token {
        builder = builder.auth_token(token.clone());
    }
    builder.build().context("Invalid configuration")
}

#[cfg(feature = "vision")]
async fn build_converters(cli: &Cli) -> Result<ConverterRegistry> {
    use markdown_conversion::converter::vision::{VisionConfig, VisionPdfConverter};

    let registry = ConverterRegistry::with_defaults();
    if cli.pdf_text_only {
        info!("PDF conversion: local text extraction (--pdf-text-only)");
        return Ok(registry.register(PdfTextConverter));
    }

    let mut builder = VisionConfig::builder()
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .allow_partial(cli.allow_partial);
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_library_path(path.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    let config = builder.build().context("Invalid vision configuration")?;

    match VisionPdfConverter::new(config) {
        Ok(pdf) => {
            info!("PDF conversion: vision model");
            Ok(registry.register(pdf))
        }
        // An explicitly named provider that fails to resolve is a setup error.
        Err(e) if cli.provider.is_some() => {
            Err(e).context("Failed to set up the requested vision model provider")
        }
        Err(e) => {
            tracing::warn!(
                "No vision model available ({e}); PDFs fall back to local text extraction"
            );
            Ok(registry.register(PdfTextConverter))
        }
    }
}

#[cfg(not(feature = "vision"))]
async fn build_converters(cli: &Cli) -> Result<ConverterRegistry> {
    let _ = cli.pdf_text_only;
    info!("PDF conversion: local text extraction (built without `vision`)");
    Ok(ConverterRegistry::with_defaults().register(PdfTextConverter))
}
