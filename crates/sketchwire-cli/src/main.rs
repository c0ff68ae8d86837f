use serde::Serialize;
use sketchwire::generate::{
    CodeBuffer, GenerationManager, Notice, Notifier, RenderTrigger, SharedBuffer,
};
use sketchwire::http::{HttpGenerationBackend, HttpPromptSource, HttpRemoteClient, resolve_endpoint};
use sketchwire::render::{
    Format, PlantUmlServer, RemoteClient, RenderOutcome, RenderSink, RenderedArtifact, Renderer,
    remote_request, svg,
};
use sketchwire::{
    DiagramSource, DiagramType, DiagramTypeRegistry, Encoder, GenerationRequest, PromptSource,
    Settings, SettingsStore, StaticPrompts, Transport,
};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Sketchwire(sketchwire::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Sketchwire(err) => write!(f, "{err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<sketchwire::Error> for CliError {
    fn from(value: sketchwire::Error) -> Self {
        Self::Sketchwire(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Command {
    #[default]
    Types,
    Encode,
    Decode,
    Url,
    Repair,
    Render,
    Generate,
}

#[derive(Debug, Clone, Copy, Default)]
struct OutputFormat(Format);

impl FromStr for OutputFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self(Format::Svg)),
            "png" => Ok(Self(Format::Png)),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    diagram_type: Option<String>,
    format: OutputFormat,
    settings: Option<PathBuf>,
    base_url: Option<String>,
    api_key: Option<String>,
    endpoint: Option<String>,
    origin: Option<String>,
    template_hint: Option<String>,
    out: Option<String>,
    pretty: bool,
    remote: bool,
}

fn usage() -> &'static str {
    "sketchwire-cli\n\
\n\
USAGE:\n\
  sketchwire-cli types [--pretty]\n\
  sketchwire-cli encode [<path>|-]\n\
  sketchwire-cli decode [<path>|-]\n\
  sketchwire-cli url --type <id> [--format svg|png] [--base-url <url>] [--settings <json>] [<path>|-]\n\
  sketchwire-cli repair --type <id> [--out <path>] [<path>|-]\n\
  sketchwire-cli render --type <id> [--remote] [--base-url <url>] [--settings <json>] [--out <path>] [<path>|-]\n\
  sketchwire-cli generate --type <id> [--hint <draw-type>] [--api-key <key>] [--endpoint <url>] [--origin <url>] [--settings <json>] [--out <path>] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - encode/decode use the compact transport form (zlib + base64url).\n\
  - url prints the request line; POST types print the method and the empty-path URL.\n\
  - repair applies the SVG fixups used for remote renders to a local SVG file.\n\
  - render prints SVG to stdout by default; a PNG fallback is written to --out (or ./out.png).\n\
  - PlantUML renders through the PlantUML server unless --remote sends it to --base-url.\n\
  - generate reads a natural-language description and prints the generated diagram code.\n\
  - Set SKETCHWIRE_LOG (e.g. debug) to see diagnostics on stderr.\n\
"
}

fn value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<String, CliError> {
    it.next().cloned().ok_or(CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();
    let mut command_seen = false;

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "types" | "encode" | "decode" | "url" | "repair" | "render" | "generate"
                if !command_seen =>
            {
                command_seen = true;
                args.command = match a.as_str() {
                    "types" => Command::Types,
                    "encode" => Command::Encode,
                    "decode" => Command::Decode,
                    "url" => Command::Url,
                    "repair" => Command::Repair,
                    "render" => Command::Render,
                    _ => Command::Generate,
                };
            }
            "--pretty" => args.pretty = true,
            "--remote" => args.remote = true,
            "--type" | "-t" => args.diagram_type = Some(value(&mut it)?),
            "--format" => {
                args.format = value(&mut it)?
                    .parse::<OutputFormat>()
                    .map_err(|_| CliError::Usage(usage()))?;
            }
            "--settings" => args.settings = Some(PathBuf::from(value(&mut it)?)),
            "--base-url" => args.base_url = Some(value(&mut it)?),
            "--api-key" => args.api_key = Some(value(&mut it)?),
            "--endpoint" => args.endpoint = Some(value(&mut it)?),
            "--origin" => args.origin = Some(value(&mut it)?),
            "--hint" => args.template_hint = Some(value(&mut it)?),
            "--out" | "-o" => args.out = Some(value(&mut it)?),
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            "-" if args.input.is_none() => args.input = Some("-".to_string()),
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    if !command_seen {
        return Err(CliError::Usage(usage()));
    }
    let needs_type = matches!(
        args.command,
        Command::Url | Command::Repair | Command::Render | Command::Generate
    );
    if needs_type && args.diagram_type.is_none() {
        return Err(CliError::Usage(usage()));
    }
    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_text(text: &str, out: Option<&str>) -> Result<(), CliError> {
    match out {
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            if !text.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
        Some(path) => {
            std::fs::write(path, text)?;
            Ok(())
        }
    }
}

/// Settings file first, then command-line overrides.
fn load_settings(args: &Args) -> Result<Settings, CliError> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(base) = &args.base_url {
        settings.render_base_url = base.clone();
    }
    if let Some(key) = &args.api_key {
        settings.api_key = key.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        settings.generation_endpoint = endpoint.clone();
    }
    if args.remote {
        settings.force_remote = true;
    }
    Ok(settings)
}

fn lookup<'a>(registry: &'a DiagramTypeRegistry, args: &Args) -> Result<&'a DiagramType, CliError> {
    let id = args.diagram_type.as_deref().ok_or(CliError::Usage(usage()))?;
    Ok(registry.lookup(id)?)
}

#[derive(Serialize)]
struct TypeOut<'a> {
    id: &'a str,
    name: &'a str,
    method: &'a str,
    content_type: &'a str,
    local_render: bool,
    file_extension: &'a str,
}

fn list_types(registry: &DiagramTypeRegistry, pretty: bool) -> Result<(), CliError> {
    let out: Vec<_> = registry
        .iter()
        .map(|t| TypeOut {
            id: t.id,
            name: t.name,
            method: if t.requires_encoding { "GET" } else { "POST" },
            content_type: t.content_type,
            local_render: t.local_render,
            file_extension: t.file_extension,
        })
        .collect();
    let text = if pretty {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    write_text(&text, None)
}

/// Keeps the last thing the renderer showed.
#[derive(Default)]
struct CaptureSink {
    artifact: Mutex<Option<RenderedArtifact>>,
}

impl CaptureSink {
    fn take(&self) -> Option<RenderedArtifact> {
        self.artifact.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl RenderSink for CaptureSink {
    fn clear(&self) {
        if let Ok(mut slot) = self.artifact.lock() {
            *slot = None;
        }
    }

    fn show_loading(&self, diagram_type: &DiagramType) {
        tracing::info!(diagram_type = diagram_type.id, "rendering");
    }

    fn show_error(&self, error: &sketchwire::Error) {
        tracing::warn!(%error, "render attempt failed");
    }

    fn show_artifact(&self, artifact: RenderedArtifact) {
        if let Ok(mut slot) = self.artifact.lock() {
            *slot = Some(artifact);
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn render(args: &Args, text: String) -> Result<(), CliError> {
    let settings = load_settings(args)?;
    let registry = Arc::new(DiagramTypeRegistry::with_defaults());
    let diagram_type = lookup(&registry, args)?.id;
    let client: Arc<dyn RemoteClient> = Arc::new(HttpRemoteClient::new());
    let renderer = Renderer::new(registry, SettingsStore::shared(settings), client.clone())
        .with_local_renderer("plantuml", Arc::new(PlantUmlServer::new(client)?));
    let sink = CaptureSink::default();
    let source = DiagramSource::new(text, diagram_type);

    let outcome = runtime()?.block_on(renderer.render(&source, &sink));
    match outcome {
        RenderOutcome::Failed(err) => return Err(err.into()),
        RenderOutcome::PngFallback { error } => {
            eprintln!("SVG render failed ({error}); wrote PNG fallback instead");
        }
        RenderOutcome::Rendered { .. } | RenderOutcome::Superseded => {}
    }

    match sink.take() {
        Some(RenderedArtifact::Svg { svg, .. }) => write_text(&svg.markup, args.out.as_deref()),
        Some(RenderedArtifact::Local { markup }) => write_text(&markup, args.out.as_deref()),
        Some(RenderedArtifact::Png { bytes }) => {
            let path = args.out.clone().unwrap_or_else(|| "out.png".to_string());
            std::fs::write(path, bytes)?;
            Ok(())
        }
        None => Err(sketchwire::Error::malformed("renderer produced no output").into()),
    }
}

#[derive(Default)]
struct LastNotice(Mutex<Option<Notice>>);

impl Notifier for LastNotice {
    fn notify(&self, notice: Notice) {
        let mut slot = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(notice);
    }
}

/// The CLI prints the buffer itself once the session ends.
struct NoRender;

impl RenderTrigger for NoRender {
    fn render(&self, source: DiagramSource) {
        tracing::debug!(diagram_type = %source.diagram_type, "generation finished");
    }
}

fn generate(args: &Args, description: String) -> Result<(), CliError> {
    let settings = load_settings(args)?;
    let registry = DiagramTypeRegistry::with_defaults();
    let diagram_type = lookup(&registry, args)?.id;

    let mut request = GenerationRequest::new(settings.api_key.clone(), description.trim(), diagram_type);
    if let Some(hint) = &args.template_hint {
        request = request.with_template_hint(hint.clone());
    }
    request.validate()?;

    let endpoint = resolve_endpoint(&settings.generation_endpoint, args.origin.as_deref())?;
    let prompts: Arc<dyn PromptSource> = match &settings.prompt_templates_url {
        Some(url) => Arc::new(HttpPromptSource::new(resolve_endpoint(url, args.origin.as_deref())?)),
        None => Arc::new(StaticPrompts::default()),
    };
    let buffer = Arc::new(SharedBuffer::default());
    let notices = Arc::new(LastNotice::default());

    runtime()?.block_on(async {
        let manager = GenerationManager::new(
            Arc::new(HttpGenerationBackend::new(endpoint)),
            prompts,
            buffer.clone(),
            notices.clone(),
            Arc::new(NoRender),
        );
        manager.submit(request)?;
        manager.wait_idle().await;
        Ok::<_, CliError>(())
    })?;

    let notice = notices.0.lock().ok().and_then(|mut slot| slot.take());
    match notice {
        Some(Notice::Completed) => write_text(&buffer.code(), args.out.as_deref()),
        Some(Notice::Failed(message)) => Err(sketchwire::Error::transport(message).into()),
        None => Err(sketchwire::Error::Aborted.into()),
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let registry = DiagramTypeRegistry::with_defaults();
    let encoder = Encoder::default();

    match args.command {
        Command::Types => list_types(&registry, args.pretty),
        Command::Encode => {
            let text = read_input(args.input.as_deref())?;
            write_text(&encoder.encode_compact(&text)?, args.out.as_deref())
        }
        Command::Decode => {
            let encoded = read_input(args.input.as_deref())?;
            let text = encoder.decode_compact(&encoded)?;
            match args.out.as_deref() {
                Some(path) => Ok(std::fs::write(path, text)?),
                None => {
                    std::io::stdout().lock().write_all(text.as_bytes())?;
                    Ok(())
                }
            }
        }
        Command::Url => {
            let settings = load_settings(&args)?;
            let diagram_type = lookup(&registry, &args)?;
            let text = read_input(args.input.as_deref())?;
            let transport = encoder.encode(&text, diagram_type)?;
            let request = remote_request(
                &settings.render_base_url,
                diagram_type,
                &transport,
                args.format.0,
            )?;
            let line = match transport {
                Transport::Path(_) => request.url.to_string(),
                Transport::Body(_) => format!("POST {}", request.url),
            };
            write_text(&line, args.out.as_deref())
        }
        Command::Repair => {
            let diagram_type = lookup(&registry, &args)?;
            let raw = read_input(args.input.as_deref())?;
            let processed = svg::process(&raw, diagram_type)?;
            write_text(&processed.markup, args.out.as_deref())
        }
        Command::Render => {
            let text = read_input(args.input.as_deref())?;
            render(&args, text)
        }
        Command::Generate => {
            let description = read_input(args.input.as_deref())?;
            generate(&args, description)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SKETCHWIRE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    init_tracing();

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
