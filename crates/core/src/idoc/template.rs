//! Segment-file templates with `{{ field }}` placeholders.

use std::collections::BTreeMap;
use std::path::Path;

use regex_lite::Regex;
use tracing::debug;

use super::{AssemblyError, Idoc, IdocAssembler};
use crate::config::DataConfig;
use crate::cursor::Uid;
use crate::invoice::Invoice;

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}";

/// The three IDOC segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdocTemplate {
    pub start: String,
    pub dynamic: String,
    pub end: String,
}

impl IdocTemplate {
    /// Read the configured segment files.
    pub fn load(data: &DataConfig) -> Result<Self, AssemblyError> {
        Ok(Self {
            start: read_segment(&data.resolve(&data.start_segment))?,
            dynamic: read_segment(&data.resolve(&data.dynamic_segment))?,
            end: read_segment(&data.resolve(&data.end_segment))?,
        })
    }
}

fn read_segment(path: &Path) -> Result<String, AssemblyError> {
    std::fs::read_to_string(path).map_err(|e| AssemblyError::Template {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

enum TemplateSource {
    /// Re-read from disk for every document.
    Files(DataConfig),
    Fixed(IdocTemplate),
}

/// Assembler rendering the dynamic segment from invoice fields.
pub struct TemplateAssembler {
    source: TemplateSource,
    placeholder: Regex,
}

impl TemplateAssembler {
    /// Assembler reading segment files from the data directory.
    pub fn new(data: DataConfig) -> Result<Self, AssemblyError> {
        Self::build(TemplateSource::Files(data))
    }

    /// Assembler with an in-memory template.
    pub fn with_template(template: IdocTemplate) -> Result<Self, AssemblyError> {
        Self::build(TemplateSource::Fixed(template))
    }

    fn build(source: TemplateSource) -> Result<Self, AssemblyError> {
        let placeholder = Regex::new(PLACEHOLDER).map_err(|e| AssemblyError::Template {
            path: "<placeholder>".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source,
            placeholder,
        })
    }

    fn template(&self) -> Result<IdocTemplate, AssemblyError> {
        match &self.source {
            TemplateSource::Files(data) => IdocTemplate::load(data),
            TemplateSource::Fixed(t) => Ok(t.clone()),
        }
    }

    /// Replace every placeholder in `segment` with its XML-escaped value.
    pub fn render(
        &self,
        segment: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, AssemblyError> {
        let mut out = String::with_capacity(segment.len());
        let mut last = 0;
        for caps in self.placeholder.captures_iter(segment) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = values
                .get(name.as_str())
                .ok_or_else(|| AssemblyError::MissingField(name.as_str().to_string()))?;
            out.push_str(&segment[last..whole.start()]);
            out.push_str(&xml_escape(value));
            last = whole.end();
        }
        out.push_str(&segment[last..]);
        Ok(out)
    }
}

impl IdocAssembler for TemplateAssembler {
    fn name(&self) -> &str {
        "template"
    }

    fn new_idoc(&self, uid: Uid) -> Idoc {
        Idoc::new(uid, format!("INVOIC_{}_{}.xml", uid, uuid::Uuid::new_v4().simple()))
    }

    fn configure_idoc(&self, idoc: &mut Idoc, invoice: &Invoice) -> Result<(), AssemblyError> {
        if invoice.invoice_type().is_none() {
            return Err(AssemblyError::Unclassified(invoice.uid));
        }
        let template = self.template()?;
        let body = self.render(&template.dynamic, &invoice.template_values())?;

        debug!(uid = invoice.uid, file = %idoc.file_name, "Rendered IDOC");
        idoc.start = template.start;
        idoc.body = Some(body);
        idoc.end = template.end;
        Ok(())
    }
}
