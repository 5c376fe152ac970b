//! Insertion Formatter
//!
//! Renders a [`CallRecord`] into the text block pasted into the survey form's
//! comment field. Wording is a template, not code.

use crate::capture::duration::DurationSource;
use crate::error::FormatError;
use crate::history::CallRecord;
use chrono::{DateTime, Local};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

/// Variables: `phone`, `duration`, `region`, `completed_at`, `source`.
pub const DEFAULT_TEMPLATE: &str = "--------------------------------
Данные о звонке:
- Номер телефона: {{ phone }}
- Длительность: {{ duration }}
- Регион: {{ region }}
- Время фиксации: {{ completed_at }}
--------------------------------";

/// How inserted text combines with what the agent already typed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// Block first, then a blank line, then the existing text.
    #[default]
    Prepend,
    Replace,
}

impl InsertMode {
    pub fn apply(self, existing: &str, block: &str) -> String {
        match self {
            InsertMode::Replace => block.to_string(),
            InsertMode::Prepend if existing.trim().is_empty() => block.to_string(),
            InsertMode::Prepend => format!("{}\n\n{}", block, existing),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertionFormatter {
    env: Environment<'static>,
    template: String,
}

impl Default for InsertionFormatter {
    fn default() -> Self {
        Self {
            env: Environment::new(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl InsertionFormatter {
    /// Fails if `template` does not parse.
    pub fn new(template: impl Into<String>) -> Result<Self, FormatError> {
        let env = Environment::new();
        let template = template.into();
        // syntax only; variables are not known until a record is rendered
        let check = Environment::new();
        check.template_from_str(&template)?;
        Ok(Self { env, template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Pure rendering of one record. No page access.
    pub fn format(&self, record: &CallRecord) -> Result<String, FormatError> {
        let completed_at = record
            .completed_at
            .parse::<DateTime<chrono::FixedOffset>>()
            .map(|t| t.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S").to_string())
            .unwrap_or_else(|_| record.completed_at.clone());

        let source = match record.source {
            DurationSource::FromInterface => "interface",
            DurationSource::Computed => "computed",
        };

        let rendered = self.env.render_str(
            &self.template,
            context! {
                phone => &record.phone,
                duration => &record.duration,
                region => &record.region,
                completed_at => completed_at,
                source => source,
            },
        )?;

        Ok(rendered.trim().to_string())
    }
}
