//! Template binder.
//!
//! The slip template is compiled once at startup. Binding a record merges the
//! process-wide [`SharedContext`] into a copy of it and renders the template,
//! so the same record always produces the same markup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use handlebars::{handlebars_helper, Handlebars, RenderError};
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rows::{number_value, Record};

const TEMPLATE_NAME: &str = "slip";

/// Key under which the logo data URL is exposed to the template.
pub const LOGO_FIELD: &str = "logoUrl";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile template: {0}")]
    Compile(#[from] Box<handlebars::TemplateError>),
}

/// Read-only data merged into every record of every batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedContext {
    logo_url: Option<String>,
}

impl SharedContext {
    pub fn new(logo_url: Option<String>) -> Self {
        Self { logo_url }
    }

    /// Load the logo as a `data:` URL. A missing or unreadable file leaves the
    /// logo absent instead of failing startup.
    pub fn load(logo_path: &Path) -> Self {
        match fs::read(logo_path) {
            Ok(bytes) => {
                let mime = mime_guess::from_path(logo_path).first_or_octet_stream();
                info!("Loaded logo from {:?} ({} bytes)", logo_path, bytes.len());
                Self::new(Some(format!("data:{};base64,{}", mime, STANDARD.encode(bytes))))
            }
            Err(e) => {
                warn!(
                    "Logo file {:?} not available ({}), slips will be generated without logo",
                    logo_path, e
                );
                Self::default()
            }
        }
    }

    pub fn logo_url(&self) -> Option<&str> {
        self.logo_url.as_deref()
    }

    /// Overwrites any same-named column from the spreadsheet.
    fn merge_into(&self, record: &mut Record) {
        let logo = self
            .logo_url
            .as_ref()
            .map_or(Value::Null, |url| Value::String(url.clone()));
        record.insert(LOGO_FIELD.to_string(), logo);
    }
}

/// JavaScript-style `parseFloat`: the longest numeric prefix, else `None`.
fn parse_leading_float(text: &str) -> Option<f64> {
    let bytes = text.trim_start().as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    std::str::from_utf8(&bytes[..end]).ok()?.parse().ok()
}

/// Numeric value of a template argument; anything non-numeric counts as zero.
pub fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_float(s),
        _ => None,
    };
    n.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn number_json(n: f64) -> Value {
    number_value(n).unwrap_or_else(|| Value::from(0))
}

pub fn sum_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    number_json(values.into_iter().map(coerce_number).sum())
}

pub fn difference(a: Option<&Value>, b: Option<&Value>) -> Value {
    let a = a.map_or(0.0, coerce_number);
    let b = b.map_or(0.0, coerce_number);
    number_json(a - b)
}

handlebars_helper!(add: |*args| sum_values(args.iter().copied()));
handlebars_helper!(subtract: |*args| difference(args.first().copied(), args.get(1).copied()));

/// Compiled slip template with the numeric helpers registered.
pub struct SlipTemplate {
    registry: Handlebars<'static>,
}

impl SlipTemplate {
    pub fn compile(path: &Path) -> Result<Self, TemplateError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let template = Self::from_source(&source)?;
        info!("Compiled slip template {:?}", path);
        Ok(template)
    }

    pub fn from_source(source: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_helper("add", Box::new(add));
        registry.register_helper("subtract", Box::new(subtract));
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(Box::new)?;
        Ok(Self { registry })
    }

    /// Render one record with the shared context merged in.
    pub fn bind(&self, record: &Record, shared: &SharedContext) -> Result<String, RenderError> {
        let mut data = record.clone();
        shared.merge_into(&mut data);
        self.registry.render(TEMPLATE_NAME, &Value::Object(data))
    }
}
