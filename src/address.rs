use std::str::FromStr;

use crate::errors::{AppError, AppResult};
use crate::table::Row;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Column(String),
}

/// Address pattern such as `{{street}}, {{city}}, {{state}}`, parsed once into
/// literal text and column placeholders. Literal text, separators included, is
/// copied as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    segments: Vec<Segment>,
}

impl AddressTemplate {
    pub fn parse(template: &str) -> AppResult<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| {
                AppError::Template(format!(
                    "unterminated placeholder at byte {}",
                    offset + start
                ))
            })?;
            let name = after_open[..end].trim();
            if name.is_empty() {
                return Err(AppError::Template(format!(
                    "empty placeholder at byte {}",
                    offset + start
                )));
            }
            segments.push(Segment::Column(name.to_string()));

            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        if !segments
            .iter()
            .any(|segment| matches!(segment, Segment::Column(_)))
        {
            return Err(AppError::Template(format!(
                "`{template}` has no {OPEN}column{CLOSE} placeholders"
            )));
        }

        Ok(Self { segments })
    }

    /// Column names in the order they appear.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Column(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Fails on the first placeholder that names none of `columns`.
    pub fn ensure_columns(&self, columns: &[String]) -> AppResult<()> {
        match self
            .columns()
            .find(|name| !columns.iter().any(|column| column == name))
        {
            Some(missing) => Err(AppError::MissingColumn {
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Fills each placeholder with the row's value, trimmed of surrounding
    /// whitespace.
    pub fn render(&self, row: &Row) -> AppResult<String> {
        let mut address = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => address.push_str(text),
                Segment::Column(name) => {
                    let value = row.get(name).ok_or_else(|| AppError::MissingColumn {
                        column: name.clone(),
                    })?;
                    address.push_str(value.trim());
                }
            }
        }
        Ok(address)
    }
}

impl FromStr for AddressTemplate {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
