use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Minimal interactive client for manual server testing: performs the join
/// handshake, prints everything the server sends and forwards stdin lines
/// as answers.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to connect to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Username to join with
    #[clap(short, long)]
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut stream = TcpStream::connect(&address).await?;
    println!("Connected to {} as '{}'", address, args.username);

    // The first payload on the socket is the whole username.
    stream.write_all(args.username.as_bytes()).await?;

    let (mut reader, mut writer) = stream.into_split();

    // Print server output as it arrives
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    println!("Server closed the connection");
                    std::process::exit(0);
                }
                Ok(n) => {
                    print!("{}", String::from_utf8_lossy(&buf[..n]));
                }
            }
        }
    });

    // Forward stdin lines (typically a single answer letter)
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}
