use clap::Parser;
use tower_lsp::{LspService, Server};

use robot_ast::RobotVersion;
use robot_lsp::server::RobotLanguageServer;
use robot_lsp::state::Overrides;

#[derive(Parser, Debug)]
#[command(author, version, about = "Robot Framework Language Server")]
struct Cli {
    /// Serve over TCP on this port instead of stdio
    #[arg(long)]
    tcp: Option<u16>,

    /// Python interpreter used for libdoc loading (overrides configuration)
    #[arg(long)]
    python: Option<String>,

    /// Robot Framework version, e.g. "7.0" (skips probing the interpreter)
    #[arg(long)]
    robot_version: Option<RobotVersion>,
}

#[tokio::main]
async fn main() {
    init_logging();

    let args = Cli::parse();
    let overrides = Overrides {
        python: args.python,
        robot_version: args.robot_version,
    };

    let (service, socket) =
        LspService::new(|client| RobotLanguageServer::new(client, overrides));

    match args.tcp {
        Some(port) => {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
                .await
                .unwrap_or_else(|err| panic!("cannot listen on port {port}: {err}"));
            log::info!("listening on 127.0.0.1:{port}");
            let (stream, peer) = listener
                .accept()
                .await
                .expect("failed to accept connection");
            log::info!("client connected from {peer}");
            let (read, write) = stream.into_split();
            Server::new(read, write, socket).serve(service).await;
        }
        None => {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            Server::new(stdin, stdout, socket).serve(service).await;
        }
    }
}

/// `RUST_LOG` wins; the call-tracing knobs raise verbosity for debugging
/// sessions started from the editor extension.
fn init_logging() {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err()
        && std::env::var("ROBOT_CALL_TRACING_ENABLED").is_ok_and(|v| v == "1" || v == "true")
    {
        let level = std::env::var("ROBOT_CALL_TRACING_LEVEL")
            .ok()
            .and_then(|v| v.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Debug);
        builder.filter_level(level);
    }
    builder.init();
}
