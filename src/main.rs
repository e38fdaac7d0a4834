//! Chat relay consoles
//!
//! Usage:
//!   cargo run -- server [port]
//!   cargo run -- client [login-id] [host] [port]

use std::env;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use parley::client::handle_user_line;
use parley::server::handle_console_line;
use parley::{
    ChatClient, ChatServer, ClientConfig, ConsoleOutcome, ConsoleSink, ServerConfig,
    StdoutConsole, DEFAULT_PORT,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => run_server(&args[2..]).await?,
        "client" => run_client(&args[2..]).await?,
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Parley - login-gated chat relay");
    println!();
    println!("USAGE:");
    println!("    cargo run -- server [port]");
    println!("    cargo run -- client [login-id] [host] [port]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the relay server and operator console");
    println!("    client              Start the chat client console");
    println!("    help                Show this help message");
    println!();
    println!("The port defaults to {} when absent or unparsable.", DEFAULT_PORT);
    println!();
    println!("CONSOLE COMMANDS (server):");
    println!("    #quit #stop #close #setport <n> #start #getport");
    println!("CONSOLE COMMANDS (client):");
    println!("    #quit #logoff #sethost <h> #setport <n> #login #gethost #getport");
}

/// Parse an optional positional port, falling back to the default
fn parse_port(arg: Option<&String>) -> u16 {
    arg.and_then(|a| a.parse().ok()).unwrap_or(DEFAULT_PORT)
}

async fn run_server(args: &[String]) -> anyhow::Result<()> {
    let console: Arc<dyn ConsoleSink> = Arc::new(StdoutConsole);
    let config = ServerConfig {
        port: parse_port(args.first()),
    };
    let mut server = ChatServer::new(config, Arc::clone(&console));

    if let Err(e) = server.listen().await {
        error!(error = %e, "could not start listening");
        console.display("ERROR - Could not listen for clients!");
    }

    // Operator console loop: one line at a time until #quit
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if handle_console_line(&mut server, &line).await == ConsoleOutcome::Quit {
            break;
        }
    }

    Ok(())
}

async fn run_client(args: &[String]) -> anyhow::Result<()> {
    let console: Arc<dyn ConsoleSink> = Arc::new(StdoutConsole);
    let config = ClientConfig {
        login_id: args.first().cloned(),
        host: args
            .get(1)
            .cloned()
            .unwrap_or_else(|| "localhost".to_string()),
        port: parse_port(args.get(2)),
    };
    let mut client = ChatClient::new(config, Arc::clone(&console));

    // Initial connection attempt; a failure is reported and the user can
    // retry with #login once the server is reachable.
    if let Err(e) = client.connect().await {
        console.display(&format!("Error connecting to the server: {}", e));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if handle_user_line(&mut client, &line).await == ConsoleOutcome::Quit {
            break;
        }
    }

    Ok(())
}
