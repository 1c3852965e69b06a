mod api;
mod app;
mod capture;
mod config;
mod domain;
mod infrastructure;
mod proxy;
mod tasks;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::{Parser, Subcommand};
use url::Url;

use domain::Rule;
use infrastructure::{directories, logging, shutdown, token_store::TokenStore};

#[derive(Debug, Parser)]
#[command(name = "screen-shock", version, about = "Screen habit monitor with stimulus feedback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP proxy in front of the evaluation service and Pavlok.
    Proxy {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generate a configuration, then sample the screen until interrupted.
    Monitor {
        #[arg(long, short)]
        description: String,
        /// Stored for later runs.
        #[arg(long)]
        token: Option<String>,
        /// Extra allowlist entry, `website=intent`.
        #[arg(long = "allow", value_name = "RULE")]
        allow: Vec<Rule>,
        /// Extra blocklist entry, `website=intent`.
        #[arg(long = "block", value_name = "RULE")]
        block: Vec<Rule>,
        /// Drop a generated allowlist entry by its logged index.
        #[arg(long = "remove-allow", value_name = "INDEX")]
        remove_allow: Vec<usize>,
        /// Drop a generated blocklist entry by its logged index.
        #[arg(long = "remove-block", value_name = "INDEX")]
        remove_block: Vec<usize>,
        #[arg(long)]
        proxy_url: Option<Url>,
        /// Generate and evaluate offline instead of calling the proxy.
        #[arg(long)]
        mock: bool,
        /// Dump the capture history on exit.
        #[arg(long)]
        debug: bool,
    },
    /// Inspect or edit the stored Pavlok token.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Debug, Subcommand)]
enum TokenAction {
    Show,
    Set { token: String },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    let log_file = match &cli.command {
        Command::Proxy { .. } => "proxy.log",
        Command::Monitor { .. } => "monitor.log",
        Command::Token { .. } => "token.log",
    };
    logging::init_tracing(&config, &paths, log_file)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    match cli.command {
        Command::Proxy { port } => {
            if let Some(port) = port {
                config.proxy.port = port;
            }
            proxy::serve(&config.proxy, app::http_client()?, shutdown.subscribe()).await
        }
        Command::Monitor {
            description,
            token,
            allow,
            block,
            remove_allow,
            remove_block,
            proxy_url,
            mock,
            debug,
        } => {
            if let Some(url) = proxy_url {
                config.monitor.proxy_url = url;
            }
            let request = app::MonitorRequest {
                description,
                token,
                allow,
                block,
                remove_allow,
                remove_block,
                debug,
            };
            app::MonitorApp::initialize(config, paths, shutdown, mock)?
                .run(request)
                .await
        }
        Command::Token { action } => {
            let tokens = TokenStore::new(paths.token_path);
            match action {
                TokenAction::Show => app::show_token(&tokens),
                TokenAction::Set { token } => app::set_token(&tokens, &token),
                TokenAction::Clear => app::clear_token(&tokens),
            }
        }
    }
}
