use clap::Parser;
use server::game::{GameConfig, GameServer};
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and runs the game
/// engine until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Path to the question-bank file
        #[clap(short, long)]
        questions: PathBuf,
        /// Number of questions per game (1-100)
        #[clap(short, long, default_value = "10")]
        num_questions: u32,
        /// Players required in the lobby before a game starts
        #[clap(short, long, default_value = "2")]
        min_players: usize,
    }

    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();
    if args.min_players < 2 {
        return Err("minimum player count must be at least 2".into());
    }

    let address = format!("{}:{}", args.host, args.port);
    let config = GameConfig {
        bank_path: args.questions,
        num_questions: args.num_questions,
        min_players: args.min_players,
    };

    let mut server = GameServer::bind(&address, config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
