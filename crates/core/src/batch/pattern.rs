use regex_lite::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::job::{RenderJobSpec, ValidationError};

const PLACEHOLDER: &str = r"\{([^{}]*)\}";
const INDEX_FIELD: &str = "_index";
const COMPOSITION_FIELD: &str = "compositionId";

/// Output file name template for batch rows.
///
/// Literal text plus placeholders:
/// - `{field}`: the row's value for `field`
/// - `{_index}`: the row index, zero-padded to the digit count of the row count
/// - `{compositionId}`: the composition being rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPattern {
    pattern: String,
}

impl Default for OutputPattern {
    fn default() -> Self {
        Self {
            pattern: "{compositionId}-{_index}".to_string(),
        }
    }
}

impl std::str::FromStr for OutputPattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl OutputPattern {
    /// Checks that every brace belongs to a named placeholder.
    pub fn parse(pattern: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let re = placeholder_regex(pattern)?;
        for caps in re.captures_iter(pattern) {
            if caps.get(1).map_or(true, |m| m.as_str().trim().is_empty()) {
                return Err(invalid("placeholder has no field name"));
            }
        }
        let literal = re.replace_all(pattern, "");
        if literal.contains('{') || literal.contains('}') {
            return Err(invalid("unbalanced braces"));
        }

        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Resolves the file name of row `index` out of `total` rows.
    ///
    /// `extension` is appended unless the result already ends with it.
    pub fn resolve(
        &self,
        row: &Value,
        index: usize,
        total: usize,
        composition_id: &str,
        extension: Option<&str>,
    ) -> Result<String, ValidationError> {
        let Some(fields) = row.as_object() else {
            return Err(ValidationError::InvalidRow { row: index });
        };
        let width = total.max(1).to_string().len();
        let re = placeholder_regex(&self.pattern)?;

        let mut resolved = String::with_capacity(self.pattern.len());
        let mut last = 0;
        for caps in re.captures_iter(&self.pattern) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            resolved.push_str(&self.pattern[last..whole.start()]);
            let field = name.as_str().trim();
            let value = match field {
                INDEX_FIELD => format!("{:0width$}", index, width = width),
                COMPOSITION_FIELD => composition_id.to_string(),
                _ => match fields.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                    _ => {
                        return Err(ValidationError::UnknownPatternField {
                            field: field.to_string(),
                            row: index,
                        })
                    }
                },
            };
            resolved.push_str(&value);
            last = whole.end();
        }
        resolved.push_str(&self.pattern[last..]);

        if resolved.trim().is_empty() || resolved.contains('/') || resolved.contains('\\') {
            return Err(ValidationError::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: format!("row {} resolves to unusable file name '{}'", index, resolved),
            });
        }

        if let Some(ext) = extension {
            let suffix = format!(".{}", ext);
            if !resolved.to_lowercase().ends_with(&suffix.to_lowercase()) {
                resolved.push_str(&suffix);
            }
        }
        Ok(resolved)
    }

    /// Resolves every row, rejecting unknown fields and duplicate names.
    pub fn resolve_all(
        &self,
        rows: &[Value],
        composition_id: &str,
        extension: Option<&str>,
    ) -> Result<Vec<String>, ValidationError> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut names = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let name = self.resolve(row, index, rows.len(), composition_id, extension)?;
            if let Some(first) = seen.insert(name.clone(), index) {
                return Err(ValidationError::DuplicateOutput {
                    filename: name,
                    first,
                    second: index,
                });
            }
            names.push(name);
        }
        Ok(names)
    }
}

fn placeholder_regex(pattern: &str) -> Result<Regex, ValidationError> {
    Regex::new(PLACEHOLDER).map_err(|e| ValidationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Builds one job per row from `base`.
///
/// Row fields are merged over the base props. Output names come from
/// `pattern` inside `output_dir`. Every job is validated, and duplicates are
/// rejected, before anything renders.
pub fn plan_batch(
    base: &RenderJobSpec,
    rows: &[Value],
    pattern: &OutputPattern,
    output_dir: &Path,
) -> Result<Vec<RenderJobSpec>, ValidationError> {
    let extension = (!base.sequence).then(|| base.codec.profile().container_extension);
    let names = pattern.resolve_all(rows, &base.composition_id, extension)?;

    rows.iter()
        .zip(names)
        .map(|(row, name)| {
            let mut props = match &base.input_props {
                Value::Object(map) => map.clone(),
                _ => Default::default(),
            };
            if let Value::Object(fields) = row {
                for (key, value) in fields {
                    props.insert(key.clone(), value.clone());
                }
            }

            let job = RenderJobSpec {
                input_props: Value::Object(props),
                output_path: output_dir.join(name),
                ..base.clone()
            };
            job.validate()?;
            Ok(job)
        })
        .collect()
}
