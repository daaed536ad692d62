use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use image_relay::relay::Sentinel;

#[derive(Parser)]
#[command(name = "relay-client")]
#[command(about = "Fetch one image from a running image relay", long_about = None)]
struct Cli {
    /// Relay address
    #[arg(short, long, default_value = "127.0.0.1:1249")]
    addr: String,

    /// Where to write the image; defaults to <term>.img
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Only check that the relay accepts connections, then report the latency
    #[arg(long)]
    health: bool,

    /// Search term
    #[arg(required_unless_present = "health")]
    term: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let limit = Duration::from_secs(cli.timeout);

    if cli.health {
        match check_health(&cli.addr, limit).await {
            Ok(latency) => {
                println!("{} is reachable ({:.1} ms to connect)", cli.addr, latency.as_secs_f64() * 1000.0);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {} is unreachable: {}", cli.addr, e);
                std::process::exit(1);
            }
        }
    }

    let term = cli.term.unwrap_or_default();
    let reply = tokio::time::timeout(limit, fetch(&cli.addr, &term))
        .await
        .map_err(|_| format!("no complete reply within {}s", cli.timeout))??;

    if let Some(sentinel) = Sentinel::from_reply(&reply) {
        eprintln!("Error: relay answered {}", sentinel);
        std::process::exit(1);
    }
    if reply.is_empty() {
        eprintln!("Error: relay closed the connection without a reply");
        std::process::exit(1);
    }

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.img", file_stem(&term))));
    tokio::fs::write(&output, &reply).await?;
    println!("Wrote {} bytes to {}", reply.len(), output.display());
    Ok(())
}

/// Open and immediately close a connection; no request is sent, so the relay
/// never calls upstream.
async fn check_health(addr: &str, limit: Duration) -> Result<Duration, std::io::Error> {
    let started = Instant::now();
    let mut stream = tokio::time::timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    let latency = started.elapsed();
    let _ = stream.shutdown().await;
    Ok(latency)
}

async fn fetch(addr: &str, term: &str) -> Result<Vec<u8>, std::io::Error> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(term.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

fn file_stem(term: &str) -> String {
    let stem: String = term
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_listening_relay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let latency = check_health(&addr, Duration::from_secs(2)).await.unwrap();
        assert!(latency < Duration::from_secs(2));

        // The check never writes a request line.
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        conn.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn health_check_fails_on_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(check_health(&addr, Duration::from_secs(2)).await.is_err());
    }

    #[test]
    fn term_is_optional_only_with_health() {
        assert!(Cli::try_parse_from(["relay-client"]).is_err());

        let cli = Cli::try_parse_from(["relay-client", "--health"]).unwrap();
        assert!(cli.health && cli.term.is_none());

        let cli = Cli::try_parse_from(["relay-client", "red panda"]).unwrap();
        assert_eq!(cli.term.as_deref(), Some("red panda"));
    }

    #[test]
    fn file_stem_replaces_punctuation() {
        assert_eq!(file_stem(" red panda! "), "red_panda_");
        assert_eq!(file_stem("   "), "image");
    }
}
