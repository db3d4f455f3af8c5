use clap::{Args, Parser, Subcommand};
use docql::{get_structure, test_datasource, Executor, InMemoryBackend, Settings};
use docql_core::{extjson, Bindings, CommandKind, CommandRequest, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docql")]
#[command(about = "Parameterized document-store query compiler", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./docql.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a templated command and print the assembled document
    Compile(RequestArgs),
    /// Compile and run a command against a fixture-backed store
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Extended-JSON object mapping collection names to document arrays
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Execution deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the sampled structure of a fixture-backed store
    Structure {
        #[arg(long)]
        fixture: Option<PathBuf>,

        /// Documents sampled per collection
        #[arg(long)]
        sample_size: Option<usize>,
    },
    /// Validate datasource settings and ping the store
    Test {
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Command kind (find, insert, update, delete, count, distinct, aggregate, find_and_modify, raw)
    #[arg(long, default_value = "raw")]
    kind: CommandKind,

    /// Raw command body, shorthand for --field body=...
    #[arg(long)]
    body: Option<String>,

    /// Form field as name=text
    #[arg(long = "field", value_parser = parse_key_val)]
    fields: Vec<(String, String)>,

    /// Binding as key=value
    #[arg(long = "bind", value_parser = parse_key_val)]
    bindings: Vec<(String, String)>,

    /// Replace placeholders verbatim
    #[arg(long)]
    no_smart: bool,
}

impl RequestArgs {
    fn request(&self) -> CommandRequest {
        let mut request = CommandRequest::new(self.kind);
        if let Some(body) = &self.body {
            request = request.with("body", body.as_str());
        }
        for (name, text) in &self.fields {
            request = request.with(name.as_str(), text.as_str());
        }
        request
    }

    fn bindings(&self) -> Bindings {
        self.bindings.iter().cloned().collect()
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn load_fixture(path: Option<&Path>, database: &str) -> anyhow::Result<InMemoryBackend> {
    let mut backend = InMemoryBackend::new(database);
    let Some(path) = path else {
        return Ok(backend);
    };

    let content = std::fs::read_to_string(path)?;
    let fixture = extjson::parse_document(&content)?;
    for (collection, docs) in fixture {
        let docs = match docs {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Document(doc) => Some(doc),
                    _ => None,
                })
                .collect(),
            _ => anyhow::bail!("Fixture collection '{}' must be an array", collection),
        };
        backend = backend.with_collection(&collection, docs);
    }
    tracing::info!(path = %path.display(), "Loaded fixture");
    Ok(backend)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let database = settings.datasource.database.clone();

    match cli.command {
        Commands::Compile(args) => {
            let compiler = settings
                .compiler()
                .with_smart_substitution(settings.compiler.smart_substitution && !args.no_smart);
            let compiled = compiler.compile(&args.request(), &args.bindings())?;
            let rendered: serde_json::Map<String, serde_json::Value> = compiled
                .rendered
                .iter()
                .map(|(name, text)| (name.clone(), serde_json::Value::String(text.clone())))
                .collect();
            print_json(&serde_json::json!({
                "command": compiled.document().to_json(),
                "text": compiled.document().to_string(),
                "rendered": rendered,
                "smart-substitution-parameters": compiled.trace,
            }))?;
        }
        Commands::Run {
            request,
            fixture,
            timeout_ms,
        } => {
            let backend = load_fixture(fixture.as_deref(), &database)?;
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.timeout());
            let compiler = settings
                .compiler()
                .with_smart_substitution(settings.compiler.smart_substitution && !request.no_smart);
            let executor = Executor::new(Arc::new(backend))
                .with_compiler(compiler)
                .with_timeout(timeout);

            match executor.execute(&request.request(), &request.bindings()).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(err) => print_json(&serde_json::json!({
                    "success": false,
                    "title": err.title(),
                    "readableError": err,
                }))?,
            }
        }
        Commands::Structure {
            fixture,
            sample_size,
        } => {
            let backend = load_fixture(fixture.as_deref(), &database)?;
            let sample_size = sample_size.unwrap_or(settings.structure.sample_size);
            let structure = get_structure(&backend, sample_size).await?;
            print_json(&structure)?;
        }
        Commands::Test { fixture } => {
            let backend = load_fixture(fixture.as_deref(), &database)?;
            let result = test_datasource(&backend, &settings.datasource, settings.timeout()).await;
            print_json(&result)?;
        }
    }

    Ok(())
}
