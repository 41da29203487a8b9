use std::{marker::PhantomData, net::SocketAddr, time::Duration};

use energy_client::domain::{Point, ToPoint};
use futures::{Stream, StreamExt};
use tokio::{io::AsyncWriteExt, net::TcpStream};

use crate::{
    compensation::TimeSeriesWriter,
    pipeline::{Envelope, PipelineError, Sink, SinkSummary},
};

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

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

fn push_field_str(out: &mut String, first: &mut bool, key: &str, value: &str) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push_str("=\"");
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
}

/// Appends one ILP line (without the trailing newline) for `point`.
///
/// Tags become SYMBOL columns; QuestDB deduplicates on the designated
/// timestamp plus these symbols, so re-sending a point overwrites it.
pub fn write_ilp_line(point: &Point, out: &mut String) {
    ilp_escape_ident(point.measurement, out);

    for (key, value) in &point.tags {
        if !value.is_empty() {
            push_tag(out, key, value);
        }
    }

    out.push(' ');
    let mut first = true;
    for (key, value) in &point.fields {
        push_field_f64(out, &mut first, key, *value);
    }
    for (key, value) in &point.text_fields {
        push_field_str(out, &mut first, key, value);
    }

    out.push(' ');
    out.push_str(&point.ts.unix_timestamp_nanos().to_string());
}

/// Buffers points as ILP lines and ships them over a single TCP connection.
///
/// Lines are sent once `batch_size` of them are buffered and on `flush`.
/// A failed write reconnects and retries with linear backoff.
pub struct IlpWriter {
    addr: SocketAddr,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    stream: Option<TcpStream>,
    buffer: String,
    buffered: usize,
}

impl IlpWriter {
    pub fn new(addr: SocketAddr, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            addr,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
            stream: None,
            // Heuristic capacity: ~160 bytes per line.
            buffer: String::with_capacity(batch_size.saturating_mul(160)),
            buffered: 0,
        }
    }

    async fn connect(&self) -> Result<TcpStream, PipelineError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to connect to QuestDB ILP: {e}")))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    async fn send_buffer(&mut self) -> Result<(), PipelineError> {
        if self.buffered == 0 {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let sent = match self.stream.take() {
                Some(s) => Ok(s),
                None => self.connect().await,
            };
            let sent = match sent {
                Ok(mut stream) => match stream.write_all(self.buffer.as_bytes()).await {
                    Ok(()) => Ok(stream),
                    Err(e) => Err(PipelineError::Sink(format!("ilp write failed: {e}"))),
                },
                Err(e) => Err(e),
            };

            match sent {
                Ok(stream) => {
                    metrics::counter!("questdb_ingested_records_total").increment(self.buffered as u64);
                    metrics::counter!("questdb_ilp_bytes_total").increment(self.buffer.len() as u64);

                    self.stream = Some(stream);
                    self.buffer.clear();
                    self.buffered = 0;
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "QuestDB ILP flush failed, reconnecting and retrying"
                    );
                    metrics::counter!("questdb_ilp_retry_total").increment(1);

                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, lines = self.buffered, "QuestDB ILP flush failed, giving up");
                    metrics::counter!("questdb_ilp_sink_errors_total").increment(1);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl TimeSeriesWriter for IlpWriter {
    async fn write(&mut self, point: Point) -> Result<(), PipelineError> {
        write_ilp_line(&point, &mut self.buffer);
        self.buffer.push('\n');
        self.buffered += 1;

        if self.buffered >= self.batch_size {
            self.send_buffer().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.send_buffer().await?;
        if let Some(stream) = self.stream.as_mut() {
            stream
                .flush()
                .await
                .map_err(|e| PipelineError::Sink(format!("ilp flush failed: {e}")))?;
        }
        Ok(())
    }
}

/// Drains a pipeline stream into `writer`.
///
/// Records rejected by a transform are logged, counted and skipped. Any other
/// upstream error aborts without flushing what is still buffered.
pub async fn write_stream<T, S, W>(mut input: S, writer: &mut W) -> Result<SinkSummary, PipelineError>
where
    T: ToPoint,
    S: Stream<Item = Result<Envelope<T>, PipelineError>> + Unpin,
    W: TimeSeriesWriter + ?Sized,
{
    let mut summary = SinkSummary::default();

    while let Some(item) = input.next().await {
        match item {
            Ok(env) => {
                writer.write(env.payload.to_point()).await?;
                summary.written += 1;
            }
            Err(PipelineError::Transform(reason)) => {
                tracing::warn!(%reason, "record rejected");
                metrics::counter!("ingest_rejected_records_total").increment(1);
                summary.rejected += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "error in upstream pipeline, aborting load");
                return Err(e);
            }
        }
    }

    writer.flush().await?;
    Ok(summary)
}

/// Pipeline sink writing any [`ToPoint`] record to QuestDB over ILP.
pub struct QuestDbIlpSink<T> {
    addr: SocketAddr,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QuestDbIlpSink<T> {
    pub fn new(addr: SocketAddr, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            addr,
            batch_size,
            max_retries,
            retry_backoff,
            _marker: PhantomData,
        }
    }

    pub fn writer(&self) -> IlpWriter {
        IlpWriter::new(self.addr, self.batch_size, self.max_retries, self.retry_backoff)
    }
}

#[async_trait::async_trait]
impl<T> Sink<T> for QuestDbIlpSink<T>
where
    T: ToPoint + Send + Sync + 'static,
{
    async fn run<S>(&self, input: S) -> Result<SinkSummary, PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut writer = self.writer();
        write_stream(input, &mut writer).await
    }
}
