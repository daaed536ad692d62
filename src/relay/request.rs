//! Request framing.
//!
//! A request is one UTF-8 line holding the search term, terminated by `\n`
//! (an optional `\r` before it is dropped). A client that half-closes without
//! a terminator has whatever it sent treated as the line. Reads are capped in
//! size and each individual read has an idle deadline.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{RelayError, RelayResult};
use crate::resilience::timeouts::deadline;
use crate::security::ByteBudget;

const READ_CHUNK: usize = 1024;

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    term: String,
}

impl SearchRequest {
    /// Validate a raw line (terminator optional).
    pub fn parse(line: &[u8]) -> RelayResult<Self> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let text = std::str::from_utf8(line)
            .map_err(|_| RelayError::BadRequest("request is not valid UTF-8".into()))?;
        let term = text.trim();
        if term.is_empty() {
            return Err(RelayError::BadRequest("empty search term".into()));
        }

        Ok(Self {
            term: term.to_string(),
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }
}

/// Read one request line from `reader`.
pub async fn read_request<R>(
    reader: &mut R,
    max_line_bytes: usize,
    idle_timeout: Duration,
) -> RelayResult<SearchRequest>
where
    R: AsyncRead + Unpin,
{
    let mut budget = ByteBudget::new(max_line_bytes as u64);
    let mut line = Vec::with_capacity(READ_CHUNK.min(max_line_bytes));
    let mut chunk = [0u8; READ_CHUNK];
    let idle_ms = idle_timeout.as_millis() as u64;

    loop {
        let n = deadline(
            idle_timeout,
            async { reader.read(&mut chunk).await.map_err(RelayError::ClientDisconnected) },
            || RelayError::ReadTimeout(idle_ms),
        )
        .await?;

        if n == 0 {
            return SearchRequest::parse(&line);
        }

        let received = &chunk[..n];
        let (taken, complete) = match received.iter().position(|&b| b == b'\n') {
            Some(pos) => (&received[..=pos], true),
            None => (received, false),
        };

        if !budget.consume(taken.len()) {
            return Err(RelayError::RequestTooLarge {
                limit: max_line_bytes,
            });
        }
        line.extend_from_slice(taken);

        if complete {
            return SearchRequest::parse(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const IDLE: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn reads_newline_terminated_term() {
        let mut input: &[u8] = b"  mountain lake \r\nignored";
        let request = read_request(&mut input, 1024, IDLE).await.unwrap();
        assert_eq!(request.term(), "mountain lake");
    }

    #[tokio::test]
    async fn eof_terminates_unframed_term() {
        let mut input: &[u8] = b"cats";
        assert_eq!(read_request(&mut input, 1024, IDLE).await.unwrap().term(), "cats");
    }

    #[tokio::test]
    async fn whitespace_only_is_bad_request() {
        let mut input: &[u8] = b" \t \n";
        assert!(matches!(
            read_request(&mut input, 1024, IDLE).await,
            Err(RelayError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn closed_without_data_is_bad_request() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            read_request(&mut input, 1024, IDLE).await,
            Err(RelayError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_bad_request() {
        let mut input: &[u8] = b"\xff\xfe\n";
        assert!(matches!(
            read_request(&mut input, 1024, IDLE).await,
            Err(RelayError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn oversized_line_is_rejected() {
        let long = vec![b'a'; 5000];
        let mut input: &[u8] = &long;
        assert!(matches!(
            read_request(&mut input, 4096, IDLE).await,
            Err(RelayError::RequestTooLarge { limit: 4096 })
        ));
    }

    #[tokio::test]
    async fn line_at_exact_limit_is_accepted() {
        let mut line = vec![b'a'; 9];
        line.push(b'\n');
        let mut input: &[u8] = &line;
        assert!(read_request(&mut input, 10, IDLE).await.is_ok());
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"half a ter").await.unwrap();

        let result = read_request(&mut server, 1024, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(RelayError::ReadTimeout(50))));
    }

    #[tokio::test]
    async fn term_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            client.write_all(b"north").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"ern lights\n").await.unwrap();
            client
        });

        let request = read_request(&mut server, 1024, IDLE).await.unwrap();
        assert_eq!(request.term(), "northern lights");
        drop(writer.await.unwrap());
    }
}
