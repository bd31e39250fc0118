// src/pipeline/batch.rs

//! Batched conversion of line delimited JSON.
//!
//! One reader groups input lines into batches, a pool of workers parses,
//! converts, tags and serializes them, and a single collector writes the
//! results. Stages are connected by bounded queues:
//!
//! ```text
//! reader --batches--> worker x N --docs--> collector --done--> run()
//! ```
//!
//! Output order across batches is not preserved.

use std::io::{BufRead, BufWriter, Write};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::error::{AppError, Result, TransformError};
use crate::models::{Importer, PipelineConfig};
use crate::services::{IsilTagger, MemberNames};

/// Raw input lines with their 1-based line numbers.
type Batch = Vec<(usize, Vec<u8>)>;

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Lines read, blank ones included
    pub lines: usize,
    /// Batches handed to workers
    pub batches: usize,
    /// Records written
    pub written: usize,
    /// Records left out because of conversion errors or skips
    pub skipped: usize,
}

/// Converts single lines into serialized, tagged intermediate schema records.
pub struct RecordConverter<D> {
    tagger: Arc<IsilTagger>,
    members: Arc<MemberNames>,
    ignore_errors: bool,
    verbose: bool,
    _source: PhantomData<fn() -> D>,
}

/// Output of one batch.
#[derive(Debug, Default)]
struct Converted {
    docs: Vec<Vec<u8>>,
    skipped: usize,
}

impl<D> RecordConverter<D>
where
    D: Importer + DeserializeOwned,
{
    pub fn new(tagger: Arc<IsilTagger>, members: Arc<MemberNames>, config: &PipelineConfig) -> Self {
        Self {
            tagger,
            members,
            ignore_errors: config.ignore_errors,
            verbose: config.verbose,
            _source: PhantomData,
        }
    }

    /// Parse, convert, tag and serialize one input line.
    ///
    /// Lines are taken as raw bytes, so invalid UTF-8 fails this record only.
    pub fn convert_line(&self, line: &[u8]) -> std::result::Result<Vec<u8>, TransformError> {
        let doc: D = serde_json::from_slice(line)
            .map_err(|e| TransformError::invalid(format!("cannot parse document: {e}")))?;
        let mut is = doc.to_intermediate_schema(&self.members)?;
        is.set_labels(self.tagger.tags(&is));
        serde_json::to_vec(&is)
            .map_err(|e| TransformError::invalid(format!("cannot serialize record: {e}")))
    }

    /// Convert a batch in order. Fails on the first broken record unless
    /// errors are ignored; skips never fail.
    fn convert_batch(&self, batch: Batch) -> Result<Converted> {
        let mut out = Converted {
            docs: Vec::with_capacity(batch.len()),
            skipped: 0,
        };
        for (number, line) in batch {
            match self.convert_line(&line) {
                Ok(doc) => out.docs.push(doc),
                Err(TransformError::Skip(reason)) => {
                    log::debug!("line {}: [skip] {}", number, reason);
                    out.skipped += 1;
                }
                Err(err) => {
                    if self.verbose {
                        log::warn!("line {}: {}", number, err);
                    }
                    if !self.ignore_errors {
                        return Err(AppError::Transform {
                            line: number,
                            source: err,
                        });
                    }
                    out.skipped += 1;
                }
            }
        }
        Ok(out)
    }
}

/// Runs the reader, worker and collector stages over one input.
pub struct BatchProcessor<D> {
    config: PipelineConfig,
    converter: Arc<RecordConverter<D>>,
}

impl<D> BatchProcessor<D>
where
    D: Importer + DeserializeOwned + 'static,
{
    pub fn new(config: PipelineConfig, tagger: Arc<IsilTagger>, members: Arc<MemberNames>) -> Self {
        let converter = Arc::new(RecordConverter::new(tagger, members, &config));
        Self { config, converter }
    }

    pub fn converter(&self) -> &RecordConverter<D> {
        &self.converter
    }

    /// Convert every line of `input`, writing one record per line to `output`.
    ///
    /// The first fatal error (I/O, or a conversion error when errors are not
    /// ignored) stops all stages and is returned once they have shut down.
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<RunStats>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let workers = self.config.workers.max(1);
        let batch_size = self.config.batch_size.max(1);
        let capacity = self.config.capacity();

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(capacity);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let (doc_tx, doc_rx) = mpsc::channel::<Vec<u8>>(batch_size);
        let (done_tx, done_rx) = oneshot::channel::<Result<usize>>();
        let abort = Arc::new(AtomicBool::new(false));

        log::debug!(
            "Starting pipeline: {} workers, batch size {}, queue capacity {}",
            workers,
            batch_size,
            capacity
        );

        let collector_abort = Arc::clone(&abort);
        tokio::task::spawn_blocking(move || {
            let result = collect(doc_rx, output);
            if result.is_err() {
                collector_abort.store(true, Ordering::SeqCst);
            }
            let _ = done_tx.send(result);
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            handles.push(tokio::spawn(work(
                id,
                Arc::clone(&batch_rx),
                doc_tx.clone(),
                Arc::clone(&self.converter),
                Arc::clone(&abort),
            )));
        }
        // Workers hold the only senders; the queue closes when the last one exits
        drop(doc_tx);
        drop(batch_rx);

        let reader_abort = Arc::clone(&abort);
        let read = tokio::task::spawn_blocking(move || {
            let result = read_batches(input, batch_size, batch_tx, &reader_abort);
            if result.is_err() {
                reader_abort.store(true, Ordering::SeqCst);
            }
            result
        })
        .await
        .map_err(AppError::pipeline)?;

        log::debug!("Input exhausted, draining workers");
        let outcomes = futures::future::join_all(handles).await;

        let written = done_rx
            .await
            .map_err(|_| AppError::pipeline("collector stopped without signalling"))?;

        // Reader and collector errors take precedence over their effect on workers
        let (lines, batches) = read?;
        let written = written?;
        let mut skipped = 0;
        for outcome in outcomes {
            skipped += outcome.map_err(AppError::pipeline)??;
        }

        log::debug!("Pipeline done: {} records written", written);
        Ok(RunStats {
            lines,
            batches,
            written,
            skipped,
        })
    }
}

/// Read lines into batches of `batch_size`, handing off each full batch and
/// the final, possibly short or empty, one. Returns lines and batches sent.
fn read_batches(
    mut input: impl BufRead,
    batch_size: usize,
    batches: mpsc::Sender<Batch>,
    abort: &AtomicBool,
) -> Result<(usize, usize)> {
    let mut lines = 0;
    let mut sent = 0;
    let mut batch = Batch::with_capacity(batch_size);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lines += 1;
        if abort.load(Ordering::SeqCst) {
            return Ok((lines, sent));
        }
        let line = buf.trim_ascii_end();
        if line.is_empty() {
            continue;
        }
        batch.push((lines, line.to_vec()));
        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Batch::with_capacity(batch_size));
            if batches.blocking_send(full).is_err() {
                // All workers are gone
                return Ok((lines, sent));
            }
            sent += 1;
        }
    }

    if batches.blocking_send(batch).is_ok() {
        sent += 1;
    }
    Ok((lines, sent))
}

/// Receive batches until the queue is closed or the run is aborted.
/// Returns the number of skipped records.
async fn work<D>(
    id: usize,
    batches: Arc<Mutex<mpsc::Receiver<Batch>>>,
    docs: mpsc::Sender<Vec<u8>>,
    converter: Arc<RecordConverter<D>>,
    abort: Arc<AtomicBool>,
) -> Result<usize>
where
    D: Importer + DeserializeOwned + 'static,
{
    let mut skipped = 0;
    loop {
        if abort.load(Ordering::SeqCst) {
            log::debug!("Worker {} stopping early", id);
            break;
        }
        let batch = {
            let mut rx = batches.lock().await;
            rx.recv().await
        };
        let Some(batch) = batch else {
            break;
        };

        let converter = Arc::clone(&converter);
        let converted = tokio::task::spawn_blocking(move || converter.convert_batch(batch))
            .await
            .map_err(AppError::pipeline)
            .and_then(|result| result);
        let converted = match converted {
            Ok(converted) => converted,
            Err(e) => {
                abort.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        skipped += converted.skipped;
        for doc in converted.docs {
            if docs.send(doc).await.is_err() {
                abort.store(true, Ordering::SeqCst);
                return Err(AppError::pipeline("output queue closed"));
            }
        }
    }
    Ok(skipped)
}

/// Write every received record followed by a newline.
fn collect(mut docs: mpsc::Receiver<Vec<u8>>, output: impl Write) -> Result<usize> {
    let mut writer = BufWriter::new(output);
    let mut written = 0;
    while let Some(doc) = docs.blocking_recv() {
        writer.write_all(&doc)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntermediateSchema;
    use crate::models::crossref::Document;
    use crate::services::{Filter, HoldingsFilter};
    use std::collections::BTreeSet;
    use std::io::Cursor;

    /// Cloneable sink so output can be inspected after the run.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    fn article(doi: &str, issn: &str, year: i32, volume: u32, issue: u32) -> String {
        serde_json::json!({
            "DOI": doi,
            "ISSN": [issn],
            "title": ["An Article"],
            "issued": {"date-parts": [[year, 1, 1]]},
            "volume": volume.to_string(),
            "issue": issue.to_string(),
            "type": "journal-article",
        })
        .to_string()
    }

    fn input(lines: &[String]) -> Cursor<Vec<u8>> {
        let mut data = lines.join("\n");
        data.push('\n');
        Cursor::new(data.into_bytes())
    }

    fn config(batch_size: usize, workers: usize, ignore_errors: bool) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            workers,
            ignore_errors,
            verbose: true,
            channel_capacity: None,
        }
    }

    fn processor(config: PipelineConfig, tagger: IsilTagger) -> BatchProcessor<Document> {
        BatchProcessor::new(config, Arc::new(tagger), Arc::new(MemberNames::default()))
    }

    fn source_tagger() -> IsilTagger {
        let mut tagger = IsilTagger::new();
        tagger.add("DE-49", Filter::Source("49".into()));
        tagger.register("DE-0");
        tagger
    }

    #[tokio::test]
    async fn test_zero_input_yields_zero_output() {
        let out = SharedBuf::default();
        let stats = processor(config(10, 4, false), source_tagger())
            .run(Cursor::new(Vec::new()), out.clone())
            .await
            .unwrap();

        assert_eq!(stats.lines, 0);
        assert_eq!(stats.written, 0);
        // The empty final batch is still handed off
        assert_eq!(stats.batches, 1);
        assert!(out.lines().is_empty());
    }

    #[tokio::test]
    async fn test_output_matches_sequential_conversion() {
        let lines: Vec<String> = (0..50)
            .map(|i| article(&format!("10.1/{i}"), "1234-5678", 2000 + i % 20, 1, 1))
            .collect();
        let processor = processor(config(7, 4, false), source_tagger());

        let expected: BTreeSet<String> = lines
            .iter()
            .map(|l| String::from_utf8(processor.converter().convert_line(l.as_bytes()).unwrap()).unwrap())
            .collect();

        let out = SharedBuf::default();
        let stats = processor.run(input(&lines), out.clone()).await.unwrap();

        assert_eq!(stats.lines, 50);
        assert_eq!(stats.written, 50);
        assert_eq!(stats.batches, 8);
        let got: BTreeSet<String> = out.lines().into_iter().collect();
        assert_eq!(got, expected);

        let first: IntermediateSchema = serde_json::from_str(&out.lines()[0]).unwrap();
        assert_eq!(first.labels, vec!["DE-49"]);
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let lines: Vec<String> = (0..10)
            .map(|i| article(&format!("10.1/{i}"), "1234-5678", 2010, i, 1))
            .collect();
        let processor = processor(config(3, 1, false), IsilTagger::new());

        let expected: Vec<String> = lines
            .iter()
            .map(|l| String::from_utf8(processor.converter().convert_line(l.as_bytes()).unwrap()).unwrap())
            .collect();

        let out = SharedBuf::default();
        let stats = processor.run(input(&lines), out.clone()).await.unwrap();

        assert_eq!(stats.batches, 4);
        assert_eq!(out.lines(), expected);
    }

    #[tokio::test]
    async fn test_ignore_errors_skips_bad_lines() {
        let lines = vec![
            article("10.1/a", "1234-5678", 2010, 1, 1),
            "{not json".to_string(),
            r#"{"title": ["No DOI"], "issued": {"date-parts": [[2010]]}}"#.to_string(),
            String::new(),
            r#"{"DOI": "10.1/j", "title": ["J"], "type": "journal", "issued": {"date-parts": [[2010]]}}"#
                .to_string(),
            article("10.1/b", "1234-5678", 2011, 1, 1),
        ];

        let out = SharedBuf::default();
        let stats = processor(config(2, 3, true), source_tagger())
            .run(input(&lines), out.clone())
            .await
            .unwrap();

        assert_eq!(stats.lines, 6);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.skipped, 3);

        let dois: BTreeSet<String> = out
            .lines()
            .iter()
            .map(|l| serde_json::from_str::<IntermediateSchema>(l).unwrap().doi)
            .collect();
        assert_eq!(dois, BTreeSet::from(["10.1/a".to_string(), "10.1/b".to_string()]));
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_a_record_error() {
        let mut data = Vec::new();
        data.extend_from_slice(article("10.1/a", "1234-5678", 2010, 1, 1).as_bytes());
        data.extend_from_slice(b"\n\xff\xfe broken\n");
        data.extend_from_slice(article("10.1/b", "1234-5678", 2011, 1, 1).as_bytes());
        data.push(b'\n');

        let out = SharedBuf::default();
        let stats = processor(config(1, 2, true), IsilTagger::new())
            .run(Cursor::new(data.clone()), out.clone())
            .await
            .unwrap();

        assert_eq!(stats.lines, 3);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(out.lines().len(), 2);

        let err = processor(config(1, 2, false), IsilTagger::new())
            .run(Cursor::new(data), SharedBuf::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Transform {
                line: 2,
                source: TransformError::Invalid(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_skips_are_never_fatal() {
        let lines = vec![
            r#"{"DOI": "10.1/j", "title": ["J"], "type": "journal", "issued": {"date-parts": [[2010]]}}"#
                .to_string(),
            article("10.1/a", "1234-5678", 2010, 1, 1),
        ];

        let stats = processor(config(10, 2, false), IsilTagger::new())
            .run(input(&lines), SharedBuf::default())
            .await
            .unwrap();

        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_transform_error_is_fatal_without_ignore() {
        let lines = vec![
            article("10.1/a", "1234-5678", 2010, 1, 1),
            "{broken".to_string(),
            article("10.1/b", "1234-5678", 2010, 1, 1),
        ];

        let err = processor(config(1, 2, false), IsilTagger::new())
            .run(input(&lines), SharedBuf::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Transform {
                line: 2,
                source: TransformError::Invalid(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_write_error_is_fatal() {
        let lines = vec![article("10.1/a", "1234-5678", 2010, 1, 1)];

        let err = processor(config(10, 2, false), IsilTagger::new())
            .run(input(&lines), BrokenPipe)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Io(_)));
    }

    #[tokio::test]
    async fn test_holdings_scenario() {
        let holdings = r#"<institutional_holdings>
  <holding ezb_id="1">
    <title>Journal of Tests</title>
    <EZBIssns><p-issn>1234-5678</p-issn></EZBIssns>
    <entitlements>
      <entitlement status="subscribed">
        <begin><year>2000</year><volume>1</volume><issue>1</issue></begin>
        <end><year>2020</year><volume>50</volume><issue>12</issue></end>
      </entitlement>
    </entitlements>
  </holding>
</institutional_holdings>"#;
        let (filter, errors) = HoldingsFilter::from_reader(Cursor::new(holdings));
        assert!(errors.is_empty());

        let mut tagger = IsilTagger::new();
        tagger.add("ISIL-1", Filter::Holdings(filter));

        let lines = vec![
            article("10.1/in", "1234-5678", 2010, 10, 5),
            article("10.1/after", "1234-5678", 2021, 10, 5),
            article("10.1/other", "8765-4321", 2010, 10, 5),
        ];

        let out = SharedBuf::default();
        processor(config(2, 2, false), tagger)
            .run(input(&lines), out.clone())
            .await
            .unwrap();

        let labels: std::collections::HashMap<String, Vec<String>> = out
            .lines()
            .iter()
            .map(|l| serde_json::from_str::<IntermediateSchema>(l).unwrap())
            .map(|is| (is.doi, is.labels))
            .collect();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels["10.1/in"], vec!["ISIL-1"]);
        assert!(labels["10.1/after"].is_empty());
        assert!(labels["10.1/other"].is_empty());
    }
}
