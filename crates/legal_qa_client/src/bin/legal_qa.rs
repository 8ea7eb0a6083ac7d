//! legal-qa: CLI front-end for the legal Q&A backend.
//! Reads config, takes the question from an argument or stdin, streams the
//! answer to stdout and prints the cited sources at the end.

use legal_qa_client::config;
use legal_qa_client::{QueryClient, QueryRequest, ResponseMetadata, SessionController, Source};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

struct CliArgs {
    config_path: Option<String>,
    model: Option<String>,
    no_stream: bool,
    question: Option<String>,
}

fn parse_args() -> CliArgs {
    let mut parsed = CliArgs {
        config_path: None,
        model: None,
        no_stream: false,
        question: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config_path = args.next(),
            "--model" => parsed.model = args.next(),
            "--no-stream" => parsed.no_stream = true,
            _ => {
                if parsed.question.is_none() {
                    parsed.question = Some(arg);
                }
            }
        }
    }
    parsed
}

fn resolve_config_path(flag: Option<String>) -> PathBuf {
    // 1. --config <path> flag
    if let Some(path) = flag {
        return PathBuf::from(path);
    }
    // 2. LEGAL_QA_CONFIG env var
    if let Ok(val) = std::env::var("LEGAL_QA_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.legal-qa/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or LEGAL_QA_CONFIG)");
        process::exit(1);
    })
}

fn print_sources(out: &mut impl Write, sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nSources:");
    for src in sources {
        let _ = writeln!(out, "  {} - {}", src.title, src.url);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config_path = resolve_config_path(args.config_path);

    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Error: failed to load config from {}: {}",
                config_path.display(),
                e
            );
            process::exit(1);
        }
    };

    // Question from the first positional argument, else stdin.
    let question = match args.question {
        Some(q) => q,
        None => {
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line).unwrap_or(0);
            line.trim().to_string()
        }
    };

    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    let model = args
        .model
        .unwrap_or_else(|| cfg.default_model().to_string());
    let mut request = QueryRequest::new(question, model);
    request.strategy = cfg.chat.strategy.clone();
    request.max_tokens = cfg.chat.max_tokens;
    request.temperature = cfg.chat.temperature;

    let client = match QueryClient::new(cfg.base_url(), cfg.timeout()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    // Run the async query on a tokio runtime.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    if args.no_stream {
        rt.block_on(async {
            match client.send_once(&request).await {
                Ok(reply) => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    let _ = writeln!(out, "{}", reply.response);
                    print_sources(&mut out, &reply.context_sources);
                }
                Err(e) => {
                    eprintln!("Error: query failed: {}", e);
                    process::exit(1);
                }
            }
        });
        return;
    }

    rt.block_on(async {
        type Outcome = Result<(Vec<Source>, Option<ResponseMetadata>), String>;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Outcome>();
        let done_tx = tx.clone();

        let controller = SessionController::new(client);
        controller
            .submit(
                request,
                |delta, _full| {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    let _ = write!(out, "{}", delta);
                    let _ = out.flush();
                },
                move |sources, metadata| {
                    let _ = done_tx.send(Ok((sources.to_vec(), metadata.cloned())));
                },
                move |err| {
                    let _ = tx.send(Err(err.to_string()));
                },
            )
            .await;

        match rx.recv().await {
            Some(Ok((sources, _metadata))) => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                // Newline after the streamed answer text.
                let _ = writeln!(out);
                print_sources(&mut out, &sources);
            }
            Some(Err(msg)) => {
                eprintln!("Error: query failed: {}", msg);
                process::exit(1);
            }
            None => {
                eprintln!("Error: session ended without a result");
                process::exit(1);
            }
        }
    });
}
