use std::io;

use csv::QuoteStyle;

use super::{ExportRecord, FieldValue, SeriesSink};
use crate::pipeline::PipelineError;

/// Delimited-text export.
///
/// The header is the field list of the first record; every row follows that
/// order, leaving fields a record lacks empty. With `escape` off values are
/// written verbatim even when they contain the delimiter or line breaks.
pub struct DelimitedTextSink {
    delimiter: u8,
    escape: bool,
}

impl DelimitedTextSink {
    pub fn new(delimiter: u8, escape: bool) -> Self {
        Self { delimiter, escape }
    }
}

impl SeriesSink for DelimitedTextSink {
    fn write_records(&self, records: &[ExportRecord], out: &mut dyn io::Write) -> Result<(), PipelineError> {
        let Some(first) = records.first() else {
            return Ok(());
        };

        let quote_style = if self.escape {
            QuoteStyle::Necessary
        } else {
            QuoteStyle::Never
        };
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(quote_style)
            .from_writer(out);

        let header: Vec<&str> = first.names().collect();
        wtr.write_record(&header)
            .map_err(|e| PipelineError::Sink(format!("failed to write header: {e}")))?;

        for record in records {
            let row = header
                .iter()
                .map(|name| record.get(name).map(FieldValue::to_cell).unwrap_or_default());
            wtr.write_record(row)
                .map_err(|e| PipelineError::Sink(format!("failed to write row: {e}")))?;
        }

        wtr.flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush delimited output: {e}")))
    }
}
