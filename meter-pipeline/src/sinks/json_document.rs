use std::io;

use super::{ExportRecord, SeriesSink};
use crate::pipeline::PipelineError;

/// JSON array-of-objects export; object keys keep record field order.
pub struct JsonDocumentSink {
    pretty: bool,
}

impl JsonDocumentSink {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl SeriesSink for JsonDocumentSink {
    fn write_records(&self, records: &[ExportRecord], out: &mut dyn io::Write) -> Result<(), PipelineError> {
        let res = if self.pretty {
            serde_json::to_writer_pretty(out, records)
        } else {
            serde_json::to_writer(out, records)
        };
        res.map_err(|e| PipelineError::Sink(format!("failed to write JSON document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::FieldValue;

    #[test]
    fn compact_document_keeps_field_order() {
        let records = vec![ExportRecord {
            fields: vec![
                ("timestamp", FieldValue::Text("2020-04-08T22:00:00Z".to_string())),
                ("purchase", FieldValue::Number(0.25)),
                ("feed_in", FieldValue::Number(0.5)),
            ],
        }];
        let mut buf = Vec::new();
        JsonDocumentSink::new(false).write_records(&records, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            r#"[{"timestamp":"2020-04-08T22:00:00Z","purchase":0.25,"feed_in":0.5}]"#
        );
    }
}
