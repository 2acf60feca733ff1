use std::{marker::PhantomData, path::PathBuf, time::SystemTime};

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, PipelineError, Source};

/// Newline-delimited JSON file of raw records, one record per line.
///
/// A line that fails to parse is yielded as an error and reading continues;
/// blank lines are skipped.
pub struct NdjsonFileSource<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NdjsonFileSource<T> {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T> Source<T> for NdjsonFileSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open NDJSON file '{}': {e}",
                        path.display()
                    )));
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            let mut line_no: usize = 0;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!("failed to read NDJSON line: {e}")));
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<T>(&line) {
                    Ok(payload) => yield Ok(Envelope {
                        payload,
                        received_at: SystemTime::now(),
                    }),
                    Err(e) => {
                        metrics::counter!("ndjson_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!(
                            "failed to parse NDJSON line {line_no}: {e}"
                        )));
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::collect_records;
    use crate::sources::raw::RawSdatDocument;
    use std::io::Write;

    #[tokio::test]
    async fn bad_lines_do_not_stop_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"documentID":"ID735","interval":{{"startDateTime":"2020-04-08T22:00:00Z","endDateTime":"2020-04-09T22:00:00Z"}},"totalDaily":42.5}}"#
        )
        .unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"documentID":"ID742","interval":{{"startDateTime":"2020-04-08T22:00:00Z","endDateTime":"2020-04-09T22:00:00Z"}},"totalDaily":28.3}}"#
        )
        .unwrap();

        let source = NdjsonFileSource::<RawSdatDocument>::new(file.path());
        let (records, errors) = collect_records(&source).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].document_id, "ID742");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let source = NdjsonFileSource::<RawSdatDocument>::new("/nonexistent/records.ndjson");
        let (records, errors) = collect_records(&source).await;
        assert!(records.is_empty());
        assert!(matches!(errors[..], [PipelineError::Source(_)]));
    }
}
