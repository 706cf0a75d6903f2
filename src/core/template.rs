//! Prompt templates and the variable records that feed them.
//!
//! Placeholders are `{{ name }}` or `{{ a.b.0 }}`. A string value is
//! inserted as-is, any other JSON value as compact JSON. Rendering never
//! fails the batch: a record that cannot be rendered becomes a malformed job.

use std::io::{self, BufRead};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::core::batch::{PreparedJob, TemplateJob};
use crate::core::error::{BatchError, MalformedInputError};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn render(template: &str, record: &Value) -> Result<String, MalformedInputError> {
    let mut missing = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let path = &caps[1];
        match lookup(record, path) {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| path.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(MalformedInputError::MissingVariable(name)),
        None => Ok(rendered.into_owned()),
    }
}

/// Where each job's template comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// One template for every record.
    Text(String),
    /// Each record carries its own template in this field.
    Field(String),
}

impl TemplateSource {
    pub fn render(&self, record: &Value) -> Result<String, MalformedInputError> {
        match self {
            TemplateSource::Text(template) => render(template, record),
            TemplateSource::Field(field) => {
                let template = record
                    .get(field)
                    .and_then(Value::as_str)
                    .ok_or_else(|| MalformedInputError::MissingTemplateField(field.clone()))?;
                render(template, record)
            }
        }
    }
}

/// One variable record, or the reason it could not be decoded.
pub type Record = Result<Value, MalformedInputError>;

/// Inline `--variables`: a JSON object or an array of objects.
pub fn parse_inline(text: &str) -> Result<Vec<Record>, BatchError> {
    let value: Value = serde_json::from_str(text).map_err(BatchError::InlineVariables)?;
    match value {
        Value::Object(_) => Ok(vec![Ok(value)]),
        Value::Array(items) => {
            if items.iter().all(Value::is_object) {
                Ok(items.into_iter().map(Ok).collect())
            } else {
                Err(BatchError::InlineShape)
            }
        }
        _ => Err(BatchError::InlineShape),
    }
}

/// Streams JSONL records lazily. Blank lines are skipped; a line that is not
/// a JSON object becomes a malformed record, an I/O failure ends the source.
pub struct JsonlRecords<R> {
    reader: R,
    line: usize,
}

impl<R: BufRead> JsonlRecords<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: 0 }
    }
}

impl<R: BufRead> Iterator for JsonlRecords<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = String::new();
        loop {
            buf.clear();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let trimmed = buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let record = match serde_json::from_str::<Value>(trimmed) {
                        Ok(value @ Value::Object(_)) => Ok(value),
                        Ok(_) => Err(MalformedInputError::Record {
                            line: self.line,
                            reason: "expected a JSON object".to_string(),
                        }),
                        Err(e) => Err(MalformedInputError::Record {
                            line: self.line,
                            reason: e.to_string(),
                        }),
                    };
                    return Some(Ok(record));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Pairs each record with its rendered prompt, numbering jobs in input order.
pub fn prepare_jobs<I>(
    records: I,
    template: TemplateSource,
) -> impl Iterator<Item = Result<PreparedJob, BatchError>>
where
    I: Iterator<Item = io::Result<Record>>,
{
    records.enumerate().map(move |(ordinal, record)| {
        let record = record.map_err(BatchError::Source)?;
        Ok(match record {
            Ok(variables) => match template.render(&variables) {
                Ok(prompt) => PreparedJob::Ready(TemplateJob {
                    ordinal,
                    prompt,
                    variables,
                }),
                Err(error) => PreparedJob::Malformed {
                    ordinal,
                    variables,
                    error,
                },
            },
            Err(error) => PreparedJob::Malformed {
                ordinal,
                variables: Value::Null,
                error,
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn renders_strings_raw_and_other_values_as_json() {
        let record = json!({
            "name": "Ada",
            "n": 3,
            "meta": {"lang": "en", "tags": ["x", "y"]}
        });
        let text = render(
            "Hi {{name}}, n={{ n }}, lang={{ meta.lang }}, tag={{meta.tags.1}}, all={{ meta.tags }}",
            &record,
        )
        .expect("render");
        assert_eq!(text, r#"Hi Ada, n=3, lang=en, tag=y, all=["x","y"]"#);
    }

    #[test]
    fn missing_variable_is_malformed_input() {
        let err = render("{{ a }} {{ b.c }}", &json!({"a": 1})).expect_err("missing");
        assert_eq!(err, MalformedInputError::MissingVariable("b.c".to_string()));
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(render("{ not } {{", &json!({})).expect("render"), "{ not } {{");
    }

    #[test]
    fn field_source_reads_template_from_record() {
        let source = TemplateSource::Field("tpl".to_string());
        let record = json!({"tpl": "Say {{ word }}", "word": "hi"});
        assert_eq!(source.render(&record).expect("render"), "Say hi");

        let err = source.render(&json!({"word": "hi"})).expect_err("missing field");
        assert_eq!(err, MalformedInputError::MissingTemplateField("tpl".to_string()));
    }

    #[test]
    fn inline_variables_accept_object_or_array() {
        assert_eq!(parse_inline(r#"{"a":1}"#).expect("object").len(), 1);
        assert_eq!(parse_inline(r#"[{"a":1},{"a":2}]"#).expect("array").len(), 2);
        assert!(matches!(parse_inline("[1,2]"), Err(BatchError::InlineShape)));
        assert!(matches!(parse_inline("{"), Err(BatchError::InlineVariables(_))));
    }

    #[test]
    fn jsonl_records_isolate_bad_lines() {
        let input = "{\"a\":1}\n\nnot json\n[1]\n{\"a\":2}";
        let records: Vec<Record> = JsonlRecords::new(Cursor::new(input))
            .collect::<io::Result<_>>()
            .expect("read");

        assert_eq!(records.len(), 4);
        assert_eq!(records[0], Ok(json!({"a": 1})));
        assert!(matches!(records[1], Err(MalformedInputError::Record { line: 3, .. })));
        assert!(matches!(records[2], Err(MalformedInputError::Record { line: 4, .. })));
        assert_eq!(records[3], Ok(json!({"a": 2})));
    }

    #[test]
    fn prepare_jobs_numbers_records_and_keeps_failures() {
        let records = parse_inline(r#"[{"q":"one"},{"x":1},{"q":"three"}]"#).expect("inline");
        let jobs: Vec<PreparedJob> = prepare_jobs(
            records.into_iter().map(Ok),
            TemplateSource::Text("Q: {{ q }}".to_string()),
        )
        .collect::<Result<_, _>>()
        .expect("prepare");

        assert_eq!(jobs.len(), 3);
        match &jobs[0] {
            PreparedJob::Ready(job) => {
                assert_eq!(job.ordinal, 0);
                assert_eq!(job.prompt, "Q: one");
            }
            other => panic!("expected ready job, got {other:?}"),
        }
        assert!(matches!(
            &jobs[1],
            PreparedJob::Malformed { ordinal: 1, .. }
        ));
        assert_eq!(jobs[2].ordinal(), 2);
    }
}
