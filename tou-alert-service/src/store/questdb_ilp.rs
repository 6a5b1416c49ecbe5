use std::{net::SocketAddr, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::Mutex,
    time::{timeout_at, Instant},
};
use tou_client::TouRecord;

use super::{event_id, RateStore, StoreError};

/// Escape measurement/tag keys/tag values/field keys for ILP.
///
/// ILP requires escaping commas, spaces and equals with a backslash.
fn ilp_escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    ilp_escape_ident(key, out);
    out.push('=');
    ilp_escape_ident(value, out);
}

/// One `tou_rates` line, newline-terminated.
pub fn encode_line(record: &TouRecord) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("tou_rates");
    push_tag(&mut out, "category", record.category.as_str());
    push_tag(&mut out, "event_id", &event_id(record));

    out.push(' ');
    ilp_escape_ident("rate", &mut out);
    out.push('=');
    out.push_str(&record.rate.to_string());

    out.push(' ');
    out.push_str(&record.timestamp.unix_timestamp_nanos().to_string());
    out.push('\n');
    out
}

/// Appends rates over QuestDB's InfluxDB line protocol (TCP).
///
/// One connection is shared by all ticks. A failed or timed-out write drops it
/// and the next append reconnects.
pub struct QuestDbIlpRateStore {
    addr: SocketAddr,
    append_timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl QuestDbIlpRateStore {
    pub fn new(addr: SocketAddr, append_timeout: Duration) -> Self {
        Self {
            addr,
            append_timeout,
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<TcpStream, StoreError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| StoreError::Transient(format!("failed to connect to QuestDB ILP: {e}")))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Connect if needed and write one line, all within the append timeout.
    ///
    /// A timed-out or failed write may have left part of the line on the socket,
    /// so the connection is discarded and the next append starts on a fresh one.
    async fn write_line(&self, line: &[u8]) -> Result<(), StoreError> {
        let deadline = Instant::now() + self.append_timeout;
        let Ok(mut guard) = timeout_at(deadline, self.conn.lock()).await else {
            return Err(StoreError::Timeout(self.append_timeout));
        };

        let res = timeout_at(deadline, async {
            if guard.is_none() {
                match self.connect().await {
                    Ok(stream) => *guard = Some(stream),
                    Err(e) => return Err(e),
                }
            }
            let Some(stream) = guard.as_mut() else {
                return Err(StoreError::Transient("ILP connection unavailable".to_string()));
            };
            stream
                .write_all(line)
                .await
                .map_err(|e| StoreError::Transient(format!("ilp write failed: {e}")))
        })
        .await;

        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(StoreError::Timeout(self.append_timeout))
            }
        }
    }
}

#[async_trait::async_trait]
impl RateStore for QuestDbIlpRateStore {
    async fn append(&self, record: &TouRecord) -> Result<(), StoreError> {
        let line = encode_line(record);
        let res = self.write_line(line.as_bytes()).await;

        match &res {
            Ok(()) => {
                metrics::counter!("questdb_appended_records_total").increment(1);
                metrics::counter!("questdb_ilp_bytes_total").increment(line.len() as u64);
            }
            Err(e) => {
                tracing::error!(error = %e, category = %record.category, "QuestDB ILP rate append failed");
                metrics::counter!("tou_store_append_errors_total").increment(1);
            }
        }
        res
    }
}
